//! OpenStack HTTP client
//!
//! Authenticates against Keystone v2 (`POST /tokens`) and talks to Neutron and
//! Nova through the endpoints the service catalog advertises for the region.

use crate::api::{
    Connector, CreateServer, CreateSubnet, FloatingIp, ListPage, Network, OpenStackApi, Router,
    Server, Subnet,
};
use crate::error::{OpenStackError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kubeprov_cloud::{Credentials, Page};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

const AUTH_HEADER: &str = "X-Auth-Token";

fn credential<'a>(credentials: &'a Credentials, key: &'static str) -> Result<&'a str> {
    credentials
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(OpenStackError::MissingCredential(key))
}

/// Connector producing [`OpenStackClient`]s
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: reqwest::Client,
    page_size: u32,
}

impl HttpConnector {
    pub fn new(page_size: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            page_size,
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
        region: &str,
    ) -> Result<Arc<dyn OpenStackApi>> {
        let client =
            OpenStackClient::authenticate(self.http.clone(), credentials, region, self.page_size)
                .await?;
        Ok(Arc::new(client))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,

    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,

    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Endpoint {
    #[serde(default)]
    region: String,

    #[serde(rename = "publicURL")]
    public_url: String,
}

impl Access {
    fn endpoint(&self, service: &str, region: &str) -> Result<String> {
        self.service_catalog
            .iter()
            .filter(|entry| entry.service_type == service)
            .flat_map(|entry| entry.endpoints.iter())
            .find(|endpoint| region.is_empty() || endpoint.region == region)
            .map(|endpoint| endpoint.public_url.trim_end_matches('/').to_string())
            .ok_or_else(|| OpenStackError::EndpointNotFound {
                service: service.to_string(),
                region: region.to_string(),
            })
    }
}

#[derive(Deserialize)]
struct NamedRef {
    id: String,
    name: String,
}

trait Identified {
    fn id(&self) -> &str;
}

macro_rules! identified {
    ($($ty:ty),*) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

identified!(Network, Subnet, Router, FloatingIp, Server);

/// Authenticated client for one tenant and region
pub struct OpenStackClient {
    http: reqwest::Client,
    token: String,
    network_url: String,
    compute_url: String,
    page_size: u32,
}

impl OpenStackClient {
    /// Request a token and resolve the network and compute endpoints
    pub async fn authenticate(
        http: reqwest::Client,
        credentials: &Credentials,
        region: &str,
        page_size: u32,
    ) -> Result<Self> {
        let identity_endpoint = credential(credentials, "identity_endpoint")?;
        let username = credential(credentials, "username")?;
        let password = credential(credentials, "password")?;
        let tenant_id = credential(credentials, "tenant_id")?;

        if !identity_endpoint.starts_with("http://") && !identity_endpoint.starts_with("https://") {
            return Err(OpenStackError::InvalidConfig(format!(
                "identity_endpoint is not an http(s) URL: {}",
                identity_endpoint
            )));
        }

        let url = format!("{}/tokens", identity_endpoint.trim_end_matches('/'));
        let body = json!({
            "auth": {
                "passwordCredentials": {
                    "username": username,
                    "password": password,
                },
                "tenantId": tenant_id,
            }
        });

        tracing::debug!(%url, %username, "Authenticating with Keystone");
        let response = http.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let message = response.text().await.unwrap_or_default();
            return Err(OpenStackError::AuthenticationFailed(message));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Http {
                method: "POST".into(),
                url,
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response.json().await?;
        let network_url = token.access.endpoint("network", region)?;
        let compute_url = token.access.endpoint("compute", region)?;
        let network_url = if network_url.ends_with("/v2.0") {
            network_url
        } else {
            format!("{}/v2.0", network_url)
        };

        tracing::info!(%network_url, %compute_url, "Authenticated with OpenStack");

        Ok(Self {
            http,
            token: token.access.token.id,
            network_url,
            compute_url,
            page_size: page_size.max(1),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).header(AUTH_HEADER, &self.token)
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

        let message = response.text().await.unwrap_or_default();
        tracing::debug!(%method, %url, status = status.as_u16(), "OpenStack request failed");
        Err(OpenStackError::Http {
            method,
            url,
            status: status.as_u16(),
            message,
        })
    }

    /// Send and unwrap the single resource under `key`
    async fn send_for<T: DeserializeOwned>(&self, builder: RequestBuilder, key: &str) -> Result<T> {
        let mut body: Value = self.send(builder).await?.json().await?;
        let item = body.get_mut(key).map(Value::take).unwrap_or(Value::Null);
        Ok(serde_json::from_value(item)?)
    }

    async fn list<T>(&self, url: String, key: &str, marker: Option<String>) -> Result<ListPage<T>>
    where
        T: DeserializeOwned + Identified,
    {
        let mut builder = self
            .request(Method::GET, &url)
            .query(&[("limit", self.page_size.to_string())]);
        if let Some(marker) = marker {
            builder = builder.query(&[("marker", marker)]);
        }

        let mut body: Value = self.send(builder).await?.json().await?;
        let items: Vec<T> = serde_json::from_value(
            body.get_mut(key)
                .map(Value::take)
                .unwrap_or_else(|| Value::Array(Vec::new())),
        )?;

        let has_next = body
            .get(format!("{}_links", key))
            .and_then(Value::as_array)
            .is_some_and(|links| links.iter().any(|link| link["rel"] == "next"));
        let next = if has_next {
            items.last().map(|item| item.id().to_string())
        } else {
            None
        };

        Ok(Page::new(items, next))
    }

    async fn delete(&self, url: String) -> Result<()> {
        self.send(self.request(Method::DELETE, &url)).await?;
        Ok(())
    }

    async fn lookup_id(&self, path: &str, key: &str, name: &str) -> Result<String> {
        let url = format!("{}/{}", self.compute_url, path);
        let refs: Vec<NamedRef> = self.send_for(self.request(Method::GET, &url), key).await?;
        refs.into_iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
            .ok_or_else(|| {
                OpenStackError::NotFound(format!("{} {}", path.trim_end_matches('s'), name))
            })
    }
}

#[async_trait]
impl OpenStackApi for OpenStackClient {
    async fn list_networks(&self, marker: Option<String>) -> Result<ListPage<Network>> {
        self.list(format!("{}/networks", self.network_url), "networks", marker)
            .await
    }

    async fn create_network(&self, name: &str) -> Result<Network> {
        let url = format!("{}/networks", self.network_url);
        let body = json!({"network": {"name": name, "admin_state_up": true}});
        self.send_for(self.request(Method::POST, &url).json(&body), "network")
            .await
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.delete(format!("{}/networks/{}", self.network_url, id))
            .await
    }

    async fn list_subnets(&self, marker: Option<String>) -> Result<ListPage<Subnet>> {
        self.list(format!("{}/subnets", self.network_url), "subnets", marker)
            .await
    }

    async fn create_subnet(&self, subnet: &CreateSubnet) -> Result<Subnet> {
        let url = format!("{}/subnets", self.network_url);
        let body = json!({ "subnet": subnet });
        self.send_for(self.request(Method::POST, &url).json(&body), "subnet")
            .await
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        self.delete(format!("{}/subnets/{}", self.network_url, id))
            .await
    }

    async fn list_routers(&self, marker: Option<String>) -> Result<ListPage<Router>> {
        self.list(format!("{}/routers", self.network_url), "routers", marker)
            .await
    }

    async fn create_router(&self, name: &str, external_network_id: &str) -> Result<Router> {
        let url = format!("{}/routers", self.network_url);
        let body = json!({
            "router": {
                "name": name,
                "admin_state_up": true,
                "external_gateway_info": {"network_id": external_network_id},
            }
        });
        self.send_for(self.request(Method::POST, &url).json(&body), "router")
            .await
    }

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        let url = format!(
            "{}/routers/{}/add_router_interface",
            self.network_url, router_id
        );
        let body = json!({ "subnet_id": subnet_id });
        self.send(self.request(Method::PUT, &url).json(&body)).await?;
        Ok(())
    }

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        let url = format!(
            "{}/routers/{}/remove_router_interface",
            self.network_url, router_id
        );
        let body = json!({ "subnet_id": subnet_id });
        self.send(self.request(Method::PUT, &url).json(&body)).await?;
        Ok(())
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        self.delete(format!("{}/routers/{}", self.network_url, id))
            .await
    }

    async fn list_floating_ips(&self, marker: Option<String>) -> Result<ListPage<FloatingIp>> {
        self.list(
            format!("{}/floatingips", self.network_url),
            "floatingips",
            marker,
        )
        .await
    }

    async fn create_floating_ip(&self, external_network_id: &str) -> Result<FloatingIp> {
        let url = format!("{}/floatingips", self.network_url);
        let body = json!({"floatingip": {"floating_network_id": external_network_id}});
        self.send_for(self.request(Method::POST, &url).json(&body), "floatingip")
            .await
    }

    async fn delete_floating_ip(&self, id: &str) -> Result<()> {
        self.delete(format!("{}/floatingips/{}", self.network_url, id))
            .await
    }

    async fn list_servers(&self, marker: Option<String>) -> Result<ListPage<Server>> {
        self.list(format!("{}/servers/detail", self.compute_url), "servers", marker)
            .await
    }

    async fn get_server(&self, id: &str) -> Result<Server> {
        let url = format!("{}/servers/{}", self.compute_url, id);
        self.send_for(self.request(Method::GET, &url), "server").await
    }

    async fn create_server(&self, server: &CreateServer) -> Result<Server> {
        let flavor_id = self.lookup_id("flavors", "flavors", &server.flavor_name).await?;
        let image_id = self.lookup_id("images", "images", &server.image_name).await?;

        let url = format!("{}/servers", self.compute_url);
        let body = json!({
            "server": {
                "name": server.name,
                "flavorRef": flavor_id,
                "imageRef": image_id,
                "networks": [{"uuid": server.network_id}],
                "metadata": server.metadata,
                "user_data": STANDARD.encode(server.user_data.as_bytes()),
            }
        });

        let created: CreatedServer = self
            .send_for(self.request(Method::POST, &url).json(&body), "server")
            .await?;

        Ok(Server {
            id: created.id,
            name: server.name.clone(),
            status: "BUILD".to_string(),
            metadata: server.metadata.clone(),
        })
    }

    async fn associate_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        let url = format!("{}/servers/{}/action", self.compute_url, server_id);
        let body = json!({"addFloatingIp": {"address": address}});
        self.send(self.request(Method::POST, &url).json(&body)).await?;
        Ok(())
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.delete(format!("{}/servers/{}", self.compute_url, id))
            .await
    }
}

/// Nova only returns the id (plus links) of a server it accepted
#[derive(Deserialize)]
struct CreatedServer {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access() -> Access {
        serde_json::from_value(json!({
            "token": {"id": "tok-1"},
            "serviceCatalog": [
                {
                    "type": "network",
                    "endpoints": [
                        {"region": "RegionOne", "publicURL": "http://neutron-1:9696/"},
                        {"region": "RegionTwo", "publicURL": "http://neutron-2:9696"}
                    ]
                },
                {
                    "type": "compute",
                    "endpoints": [
                        {"region": "RegionOne", "publicURL": "http://nova-1:8774/v2.1/t-1"}
                    ]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_endpoint_by_region() {
        let access = access();
        assert_eq!(access.token.id, "tok-1");
        assert_eq!(
            access.endpoint("network", "RegionTwo").unwrap(),
            "http://neutron-2:9696"
        );
        // empty region takes the first listed endpoint
        assert_eq!(access.endpoint("network", "").unwrap(), "http://neutron-1:9696");
        assert!(matches!(
            access.endpoint("compute", "RegionTwo"),
            Err(OpenStackError::EndpointNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_request() {
        let mut credentials = Credentials::new();
        credentials.insert("identity_endpoint".into(), "http://keystone:5000/v2.0".into());
        credentials.insert("username".into(), "admin".into());

        let err = HttpConnector::new(100)
            .connect(&credentials, "")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OpenStackError::MissingCredential("password")));
    }

    #[tokio::test]
    async fn test_identity_endpoint_must_be_url() {
        let credentials: Credentials = [
            ("identity_endpoint", "keystone:5000"),
            ("username", "admin"),
            ("password", "secret"),
            ("tenant_id", "t-1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let err = HttpConnector::new(100)
            .connect(&credentials, "")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OpenStackError::InvalidConfig(_)));
    }
}
