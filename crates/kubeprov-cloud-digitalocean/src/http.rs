//! DigitalOcean v2 API client
//!
//! Bearer token authentication, page-numbered listings (`page`/`per_page`,
//! `links.pages.next`).

use crate::api::{
    BlockVolume, Connector, CreateDroplet, CreateLoadBalancer, CreateVolume, DigitalOceanApi,
    Droplet, ForwardingRule, LoadBalancer, NumberedPage,
};
use crate::error::{DigitalOceanError, Result};
use async_trait::async_trait;
use kubeprov_cloud::{Credentials, Page};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

/// Connector producing [`DigitalOceanClient`]s
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    api_base: String,
    page_size: u32,
}

impl HttpConnector {
    pub fn new(api_base: impl Into<String>, page_size: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            page_size,
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn DigitalOceanApi>> {
        let token = credentials
            .get("token")
            .filter(|t| !t.is_empty())
            .ok_or(DigitalOceanError::MissingToken)?;
        Ok(Arc::new(DigitalOceanClient {
            http: self.http.clone(),
            api_base: self.api_base.trim_end_matches('/').to_string(),
            token: token.clone(),
            page_size: self.page_size.max(1),
        }))
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Client bound to one API token
pub struct DigitalOceanClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    page_size: u32,
}

impl DigitalOceanClient {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let method = request.method().to_string();
        let url = request.url().to_string();

        let response = self.http.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        tracing::debug!(%method, %url, status = status.as_u16(), "DigitalOcean request failed");
        Err(DigitalOceanError::Http {
            method,
            url,
            status: status.as_u16(),
            message,
        })
    }

    async fn send_for<T: DeserializeOwned>(&self, builder: RequestBuilder, key: &str) -> Result<T> {
        let mut body: Value = self.send(builder).await?.json().await?;
        let item = body.get_mut(key).map(Value::take).unwrap_or(Value::Null);
        Ok(serde_json::from_value(item)?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        self.send(builder).await?;
        Ok(())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        page: Option<u32>,
    ) -> Result<NumberedPage<T>> {
        let page = page.unwrap_or(1);
        let builder = self
            .request(Method::GET, path)
            .query(&[("page", page), ("per_page", self.page_size)]);

        let mut body: Value = self.send(builder).await?.json().await?;
        let items: Vec<T> = serde_json::from_value(
            body.get_mut(key)
                .map(Value::take)
                .unwrap_or_else(|| Value::Array(Vec::new())),
        )?;
        let has_next = body
            .pointer("/links/pages/next")
            .is_some_and(|next| next.is_string());

        Ok(Page::new(items, has_next.then_some(page + 1)))
    }
}

#[async_trait]
impl DigitalOceanApi for DigitalOceanClient {
    async fn account_status(&self) -> Result<()> {
        self.send_empty(self.request(Method::GET, "/account")).await
    }

    async fn list_droplets(&self, page: Option<u32>) -> Result<NumberedPage<Droplet>> {
        self.list("/droplets", "droplets", page).await
    }

    async fn get_droplet(&self, id: u64) -> Result<Droplet> {
        let path = format!("/droplets/{}", id);
        self.send_for(self.request(Method::GET, &path), "droplet")
            .await
    }

    async fn create_droplet(&self, droplet: &CreateDroplet) -> Result<Droplet> {
        self.send_for(
            self.request(Method::POST, "/droplets").json(droplet),
            "droplet",
        )
        .await
    }

    async fn delete_droplet(&self, id: u64) -> Result<()> {
        let path = format!("/droplets/{}", id);
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn create_tag(&self, name: &str) -> Result<()> {
        let body = json!({ "name": name });
        self.send_empty(self.request(Method::POST, "/tags").json(&body))
            .await
    }

    async fn delete_tag(&self, name: &str) -> Result<()> {
        let path = format!("/tags/{}", name);
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn list_volumes(&self, page: Option<u32>) -> Result<NumberedPage<BlockVolume>> {
        self.list("/volumes", "volumes", page).await
    }

    async fn get_volume(&self, id: &str) -> Result<BlockVolume> {
        let path = format!("/volumes/{}", id);
        self.send_for(self.request(Method::GET, &path), "volume")
            .await
    }

    async fn create_volume(&self, volume: &CreateVolume) -> Result<BlockVolume> {
        self.send_for(self.request(Method::POST, "/volumes").json(volume), "volume")
            .await
    }

    async fn resize_volume(&self, id: &str, size_gigabytes: u32, region: &str) -> Result<()> {
        let path = format!("/volumes/{}/actions", id);
        let body = json!({
            "type": "resize",
            "size_gigabytes": size_gigabytes,
            "region": region,
        });
        self.send_empty(self.request(Method::POST, &path).json(&body))
            .await
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        let path = format!("/volumes/{}", id);
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn list_load_balancers(&self, page: Option<u32>) -> Result<NumberedPage<LoadBalancer>> {
        self.list("/load_balancers", "load_balancers", page).await
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        let path = format!("/load_balancers/{}", id);
        self.send_for(self.request(Method::GET, &path), "load_balancer")
            .await
    }

    async fn create_load_balancer(&self, lb: &CreateLoadBalancer) -> Result<LoadBalancer> {
        self.send_for(
            self.request(Method::POST, "/load_balancers").json(lb),
            "load_balancer",
        )
        .await
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let path = format!("/load_balancers/{}", id);
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn add_forwarding_rules(&self, id: &str, rules: &[ForwardingRule]) -> Result<()> {
        let path = format!("/load_balancers/{}/forwarding_rules", id);
        let body = json!({ "forwarding_rules": rules });
        self.send_empty(self.request(Method::POST, &path).json(&body))
            .await
    }

    async fn remove_forwarding_rules(&self, id: &str, rules: &[ForwardingRule]) -> Result<()> {
        let path = format!("/load_balancers/{}/forwarding_rules", id);
        let body = json!({ "forwarding_rules": rules });
        self.send_empty(self.request(Method::DELETE, &path).json(&body))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_requires_token() {
        let connector = HttpConnector::new("https://api.digitalocean.com/v2", 50);

        let err = connector.connect(&Credentials::new()).err().unwrap();
        assert!(matches!(err, DigitalOceanError::MissingToken));

        let mut credentials = Credentials::new();
        credentials.insert("token".into(), "dop_v1_abc".into());
        assert!(connector.connect(&credentials).is_ok());
    }
}
