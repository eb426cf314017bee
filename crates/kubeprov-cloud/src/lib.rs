//! kubeprov cloud core
//!
//! This crate provides the provider abstraction and the orchestration engine
//! used to provision and tear down Kubernetes clusters on several clouds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        account / cluster management              │
//! │     (CloudAccounts, KubeGateway)                 │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               kubeprov-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider contract                │   │
//! │  │  trait Provider { ... }                   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Procedure   │  │   Resolver   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   openstack   │ │ digitalocean  │
//! │   provider    │ │   provider    │
//! └───────────────┘ └───────────────┘
//! ```
//!
//! Resources are always found again by name or tag (see [`naming`]); teardown
//! treats a missing resource as already deleted (see [`tolerate_not_found`]).

pub mod action;
pub mod boot;
pub mod error;
pub mod gateway;
pub mod model;
pub mod naming;
pub mod outputs;
pub mod poll;
pub mod procedure;
pub mod provider;
pub mod registry;
pub mod resolver;

// Re-exports
pub use action::{ActionSink, LogAction, RecordingAction};
pub use boot::{BootConfig, BootParams};
pub use error::{CloudError, Result, tolerate_not_found};
pub use gateway::{AccountStore, CloudAccounts, KubeGateway};
pub use model::{
    CloudAccount, Credentials, DigitalOceanKubeConfig, Entrypoint, EntrypointListener, FlexVolume,
    Kube, Node, NodeRole, OpenStackKubeConfig, ProviderKind, Volume, VolumeMount,
};
pub use outputs::{EntrypointOutputs, KubeOutputs, NodeOutputs, VolumeOutputs};
pub use poll::{PollPolicy, poll_until};
pub use procedure::{Procedure, StepOutputs};
pub use provider::{Provider, unsupported};
pub use registry::ProviderRegistry;
pub use resolver::{Page, collect_matching, find_first};
