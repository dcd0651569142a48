//! Capability interfaces for the GCP account the environment lives in.
//!
//! The orchestrator depends on these traits, never on concrete SDK types;
//! out-of-band operations (key-pair registration, zone listing) happen
//! through them so tests can substitute doubles.

pub mod gcloud;
pub mod keypair;
pub mod zones;

pub use gcloud::GcloudClient;
pub use keypair::{Ed25519KeyPairUpdater, KeyPairUpdater, MetadataClient};
pub use zones::{RegionZones, Zones};

use anyhow::Result;

/// Authenticates the cloud client with the supplied credentials. Called
/// while resolving identity, before any out-of-band operation.
pub trait ClientProvider: Send + Sync {
    fn set_config(&self, service_account_key: &str, project_id: &str, zone: &str) -> Result<()>;
}
