//! OpenStack provider error types

use kubeprov_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenStackError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("No {service} endpoint in the service catalog for region {region:?}")]
    EndpointNotFound { service: String, region: String },

    #[error("{method} {url} returned {status}: {message}")]
    Http {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Server {name} entered ERROR state: {message}")]
    ServerFault { name: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OpenStackError {
    pub fn status(&self) -> Option<u16> {
        match self {
            OpenStackError::Http { status, .. } => Some(*status),
            OpenStackError::NotFound(_) => Some(404),
            OpenStackError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<OpenStackError> for CloudError {
    fn from(e: OpenStackError) -> Self {
        match e.status() {
            Some(404) => CloudError::NotFound(e.to_string()),
            Some(401) | Some(403) => CloudError::Validation(e.to_string()),
            _ => match e {
                OpenStackError::AuthenticationFailed(_) | OpenStackError::MissingCredential(_) => {
                    CloudError::Validation(e.to_string())
                }
                OpenStackError::EndpointNotFound { .. } | OpenStackError::InvalidConfig(_) => {
                    CloudError::InvalidConfig(e.to_string())
                }
                OpenStackError::JsonError(e) => CloudError::Json(e),
                OpenStackError::Http { status, .. } => CloudError::Api {
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

pub type Result<T> = std::result::Result<T, OpenStackError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> OpenStackError {
        OpenStackError::Http {
            method: "DELETE".into(),
            url: "http://neutron/v2.0/routers/r-1".into(),
            status,
            message: "body".into(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(CloudError::from(http(404)).is_not_found());
        assert!(matches!(CloudError::from(http(401)), CloudError::Validation(_)));
        assert!(matches!(CloudError::from(http(403)), CloudError::Validation(_)));
        assert!(matches!(
            CloudError::from(http(409)),
            CloudError::Api { status: 409, .. }
        ));
        let err = CloudError::from(OpenStackError::NotFound("network demo-network".into()));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_auth_errors_are_validation() {
        let err = CloudError::from(OpenStackError::MissingCredential("tenant_id"));
        assert!(matches!(err, CloudError::Validation(msg) if msg.contains("tenant_id")));

        let err = CloudError::from(OpenStackError::EndpointNotFound {
            service: "network".into(),
            region: "RegionTwo".into(),
        });
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }
}
