//! # Plinth
//!
//! A CLI tool that provisions a BOSH director on GCP: one idempotent
//! `up` command walks an environment through infrastructure, director
//! deployment, and cloud-config upload, checkpointing after each phase
//! so interrupted runs resume instead of re-creating.
//!
//! ## Usage
//!
//! ```bash
//! plinth up --service-account-key key.json --project-id my-project \
//!     --zone us-west1-a --region us-west1
//! ```
//!
//! ## Modules
//!
//! - `cloud` - GCP capability traits (key pairs, zones) and the gcloud-backed client
//! - `cloudconfig` - Cloud-config document generation from provisioned infrastructure
//! - `commands` - Top-level workflows invoked from the CLI
//! - `director` - Director manifest generation and bosh-init deployment
//! - `error` - Multi-error aggregation for dual-failure paths
//! - `storage` - Environment state model with JSON persistence
//! - `subprocess` - Unified subprocess abstraction layer for testing
//! - `terraform` - Terraform invocation, templates, and output extraction
//! - `util` - Random string generation for names and credentials
pub mod cloud;
pub mod cloudconfig;
pub mod commands;
pub mod director;
pub mod error;
pub mod storage;
pub mod subprocess;
pub mod terraform;
pub mod util;

pub mod testing;
