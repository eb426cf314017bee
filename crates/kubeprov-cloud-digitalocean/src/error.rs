//! DigitalOcean provider error types

use kubeprov_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitalOceanError {
    #[error("Missing credential: token")]
    MissingToken,

    #[error("{method} {url} returned {status}: {message}")]
    Http {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{resource} entered {status} state")]
    Fault { resource: String, status: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DigitalOceanError {
    pub fn status(&self) -> Option<u16> {
        match self {
            DigitalOceanError::Http { status, .. } => Some(*status),
            DigitalOceanError::NotFound(_) => Some(404),
            DigitalOceanError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<DigitalOceanError> for CloudError {
    fn from(e: DigitalOceanError) -> Self {
        match e.status() {
            Some(404) => CloudError::NotFound(e.to_string()),
            Some(401) | Some(403) => CloudError::Validation(e.to_string()),
            _ => match e {
                DigitalOceanError::MissingToken => CloudError::Validation(e.to_string()),
                DigitalOceanError::InvalidConfig(_) => CloudError::InvalidConfig(e.to_string()),
                DigitalOceanError::JsonError(e) => CloudError::Json(e),
                DigitalOceanError::Http { status, .. } => CloudError::Api {
                    status,
                    message: e.to_string(),
                },
                other => CloudError::Api {
                    status: other.status().unwrap_or(500),
                    message: other.to_string(),
                },
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, DigitalOceanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let http = |status| DigitalOceanError::Http {
            method: "GET".into(),
            url: "https://api.digitalocean.com/v2/account".into(),
            status,
            message: "Unable to authenticate you".into(),
        };

        assert!(matches!(CloudError::from(http(401)), CloudError::Validation(_)));
        assert!(CloudError::from(http(404)).is_not_found());
        assert!(matches!(
            CloudError::from(http(422)),
            CloudError::Api { status: 422, .. }
        ));
        assert!(matches!(
            CloudError::from(DigitalOceanError::MissingToken),
            CloudError::Validation(_)
        ));
    }
}
