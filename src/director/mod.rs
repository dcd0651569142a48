//! Director deployment and client surface.
//!
//! The orchestrator hands resolved infrastructure outputs to a `Deployer`
//! and talks to the running director through `DirectorClient`; both are
//! capability traits so the workflow can be exercised without a live
//! director.

pub mod client;
pub mod deployer;
pub mod manifest;

pub use client::{DirectorClient, DirectorClientProvider, HttpClientProvider};
pub use deployer::BoshInitDeployer;
pub use manifest::ManifestProperties;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfrastructureConfigurationGcp {
    pub zone: String,
    pub network_name: String,
    pub subnetwork_name: String,
    pub bosh_tag: String,
    pub internal_tag: String,
    pub project: String,
    pub json_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfrastructureConfiguration {
    pub external_ip: String,
    pub gcp: InfrastructureConfigurationGcp,
}

/// Everything a deploy needs: director identity, prior opaque deployment
/// state, and the resolved infrastructure configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployInput {
    pub iaas: String,
    pub director_name: String,
    pub director_username: String,
    pub director_password: String,
    pub state: serde_json::Map<String, serde_json::Value>,
    pub infrastructure: InfrastructureConfiguration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslKeyPair {
    pub ca: String,
    pub certificate: String,
    pub private_key: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployOutput {
    pub director_ssl: SslKeyPair,
    pub state: serde_json::Map<String, serde_json::Value>,
    pub manifest: String,
    pub credentials: BTreeMap<String, String>,
}

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, input: DeployInput) -> Result<DeployOutput>;
}
