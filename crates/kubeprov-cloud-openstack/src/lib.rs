//! OpenStack provider for kubeprov
//!
//! This crate implements the `Provider` trait for OpenStack, building each
//! cluster out of a private network, subnet and router, a master with a
//! floating IP, and minions.
//!
//! # Features
//!
//! - Cluster create/delete (Neutron networking + Nova servers)
//! - Node create/delete
//! - Keystone v2 authentication as account validation
//!
//! # Credentials
//!
//! `identity_endpoint`, `username`, `password`, `tenant_id` and optionally
//! `region`.
//!
//! # Example
//!
//! ```ignore
//! use kubeprov_cloud::{LogAction, Provider};
//! use kubeprov_cloud_openstack::OpenStackProvider;
//!
//! let provider = OpenStackProvider::http(settings.openstack.clone())?;
//! provider.create_kube(&mut kube, &LogAction::new("create demo")).await?;
//! println!("master at {:?}", kube.master_public_ip);
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod memory;
pub mod provider;
pub mod recipe;
pub mod resolver;

pub use api::{Connector, OpenStackApi};
pub use error::{OpenStackError, Result};
pub use http::{HttpConnector, OpenStackClient};
pub use memory::{InMemoryConnector, InMemoryOpenStack};
pub use provider::OpenStackProvider;
pub use resolver::OpenStackResolver;
