//! The persisted environment state record and its store.
//!
//! One record describes everything provisioned for one target environment.
//! The record is updated through whole-group overwrites at workflow
//! checkpoints, never merged field by field, so each persisted write is
//! atomic with respect to its group.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Identity of the target GCP account. Set once on the first successful
/// checkpoint; immutable for the life of the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpState {
    #[serde(default)]
    pub service_account_key: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub region: String,
}

impl GcpState {
    pub fn is_empty(&self) -> bool {
        self.service_account_key.is_empty()
            && self.project_id.is_empty()
            && self.zone.is_empty()
            && self.region.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub public_key: String,
}

impl KeyPair {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.private_key.is_empty() && self.public_key.is_empty()
    }
}

/// Everything known about the deployed director. Identity fields
/// (name/username/password) are generated once and preserved across
/// re-runs; manifest, address and the opaque deployment state are
/// refreshed by every successful deploy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Director {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ssl_ca: String,
    #[serde(default)]
    pub ssl_certificate: String,
    #[serde(default)]
    pub ssl_private_key: String,
    #[serde(default)]
    pub credentials: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub state: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub manifest: String,
}

impl Director {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.username.is_empty() && self.password.is_empty()
    }
}

/// Load-balancer configuration, supplied externally. Read-only input to
/// template selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lb {
    #[serde(rename = "type", default)]
    pub lb_type: String,
    #[serde(default)]
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub domain: String,
}

/// The single persistent record for one bootstrapped environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub iaas: String,
    #[serde(default)]
    pub env_id: String,
    #[serde(default)]
    pub gcp: GcpState,
    #[serde(default)]
    pub key_pair: KeyPair,
    #[serde(default)]
    pub tf_state: String,
    #[serde(default)]
    pub director: Director,
    #[serde(default)]
    pub lb: Lb,
}

/// Checkpoint sink. Invoked multiple times per orchestrator run, once per
/// checkpoint; implementations must persist the whole record each call.
pub trait StateStore: Send + Sync {
    fn set(&self, state: &State) -> Result<()>;
}

/// JSON file persistence with atomic replace.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn load(&self) -> Result<State> {
        let path = self.root.join("state.json");
        if !path.exists() {
            return Ok(State::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse state file {}", path.display()))
    }
}

impl StateStore for FileStateStore {
    fn set(&self, state: &State) -> Result<()> {
        fs::create_dir_all(&self.root).context("failed to create state directory")?;

        let temp_file = self.root.join("state.json.tmp");
        let final_file = self.root.join("state.json");

        let json = serde_json::to_string_pretty(state).context("failed to serialize state")?;
        fs::write(&temp_file, json).context("failed to write temp state file")?;
        fs::rename(temp_file, final_file).context("failed to rename state file")?;

        Ok(())
    }
}

/// In-memory store that records every checkpoint, for tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    checkpoints: Arc<Mutex<Vec<State>>>,
    failures: Arc<Mutex<Vec<Option<String>>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of successive `set` calls; `None` entries
    /// succeed. Calls beyond the scripted list succeed.
    pub fn fail_on(&self, outcomes: Vec<Option<String>>) {
        *self.failures.lock().unwrap() = outcomes;
    }

    pub fn checkpoints(&self) -> Vec<State> {
        self.checkpoints.lock().unwrap().clone()
    }

    pub fn set_call_count(&self) -> usize {
        self.checkpoints.lock().unwrap().len()
    }

    pub fn latest(&self) -> Option<State> {
        self.checkpoints.lock().unwrap().last().cloned()
    }
}

impl StateStore for InMemoryStateStore {
    fn set(&self, state: &State) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().unwrap();
        checkpoints.push(state.clone());
        let call_index = checkpoints.len() - 1;
        drop(checkpoints);

        let failures = self.failures.lock().unwrap();
        if let Some(Some(message)) = failures.get(call_index) {
            return Err(anyhow::anyhow!("{message}"));
        }
        Ok(())
    }
}
