//! DigitalOcean provider for kubeprov
//!
//! This crate implements the `Provider` trait for DigitalOcean. A cluster is
//! a set of droplets sharing a `kubernetes-cluster:<name>` tag; volumes are
//! block storage volumes and entrypoints are load balancers targeting that
//! tag.
//!
//! # Features
//!
//! - Cluster create/delete (droplets and tags)
//! - Node create/delete
//! - Block storage volumes (create, resize, wait, delete)
//! - Load balancers as entrypoints, listeners as forwarding rules
//!
//! # Credentials
//!
//! `token`: a personal access token with read/write scope.
//!
//! # Example
//!
//! ```ignore
//! use kubeprov_cloud::{LogAction, Provider, Volume};
//! use kubeprov_cloud_digitalocean::DigitalOceanProvider;
//!
//! let provider = DigitalOceanProvider::http(settings.digitalocean.clone())?;
//! let mut volume = Volume::new("data", 20);
//! provider.create_volume(&kube, &mut volume, &LogAction::new("create data")).await?;
//! provider.wait_for_volume_available(&kube, &volume).await?;
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod memory;
pub mod provider;
pub mod recipe;
pub mod resolver;

pub use api::{Connector, DigitalOceanApi};
pub use error::{DigitalOceanError, Result};
pub use http::{DigitalOceanClient, HttpConnector};
pub use memory::{InMemoryConnector, InMemoryDigitalOcean};
pub use provider::DigitalOceanProvider;
pub use resolver::DigitalOceanResolver;
