//! Paged "list all, filter client-side" lookups
//!
//! Provider list filters are unreliable for names and tags, so resolvers walk
//! the plain listing and filter locally. Singular lookups stop at the first
//! page holding a match; gathers always exhaust every page.

use std::future::Future;

/// One page of a provider listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    pub items: Vec<T>,

    /// Cursor of the next page; `None` on the last page
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn new(items: Vec<T>, next: Option<C>) -> Self {
        Self { items, next }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// First item across all pages matching `matches`, fetching no further
/// pages once one is found.
pub async fn find_first<T, C, E, F, Fut, P>(mut fetch: F, mut matches: P) -> Result<Option<T>, E>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, E>>,
    P: FnMut(&T) -> bool,
{
    let mut cursor = None;
    loop {
        let page = fetch(cursor.take()).await?;
        if let Some(found) = page.items.into_iter().find(|item| matches(item)) {
            return Ok(Some(found));
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(None),
        }
    }
}

/// Every item across all pages matching `matches`, in listing order.
pub async fn collect_matching<T, C, E, F, Fut, P>(mut fetch: F, mut matches: P) -> Result<Vec<T>, E>
where
    F: FnMut(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, E>>,
    P: FnMut(&T) -> bool,
{
    let mut found = Vec::new();
    let mut cursor = None;
    loop {
        let page = fetch(cursor.take()).await?;
        found.extend(page.items.into_iter().filter(|item| matches(item)));
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(found),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn pages() -> Vec<Page<u32, usize>> {
        vec![
            Page::new(vec![1, 2, 3], Some(1)),
            Page::new(vec![4, 5, 6], Some(2)),
            Page::last(vec![7, 8]),
        ]
    }

    #[tokio::test]
    async fn test_find_first_stops_early() {
        let pages = pages();
        let fetched = Cell::new(0);

        let found = find_first(
            |cursor: Option<usize>| {
                fetched.set(fetched.get() + 1);
                let page = pages[cursor.unwrap_or(0)].clone();
                async move { Ok::<_, ()>(page) }
            },
            |n| *n == 5,
        )
        .await
        .unwrap();

        assert_eq!(found, Some(5));
        assert_eq!(fetched.get(), 2);
    }

    #[tokio::test]
    async fn test_find_first_none() {
        let pages = pages();
        let found = find_first(
            |cursor: Option<usize>| {
                let page = pages[cursor.unwrap_or(0)].clone();
                async move { Ok::<_, ()>(page) }
            },
            |n| *n == 42,
        )
        .await
        .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_collect_matching_exhausts_pages() {
        let pages = pages();
        let fetched = Cell::new(0);

        let even = collect_matching(
            |cursor: Option<usize>| {
                fetched.set(fetched.get() + 1);
                let page = pages[cursor.unwrap_or(0)].clone();
                async move { Ok::<_, ()>(page) }
            },
            |n| n % 2 == 0,
        )
        .await
        .unwrap();

        assert_eq!(even, vec![2, 4, 6, 8]);
        assert_eq!(fetched.get(), 3);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let result: Result<Option<u32>, &str> =
            find_first(|_: Option<usize>| async { Err("listing failed") }, |_| true).await;
        assert_eq!(result, Err("listing failed"));
    }
}
