//! Mock collaborators with call recording.
//!
//! Each mock follows the same shape: scripted responses configured up
//! front, received arguments captured behind an `Arc<Mutex<…>>` so tests
//! can assert on them after the workflow runs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cloud::{ClientProvider, KeyPairUpdater, Zones};
use crate::cloudconfig::{CloudConfig, CloudConfigInput, Generator};
use crate::director::{DeployInput, DeployOutput, Deployer, DirectorClient, DirectorClientProvider};
use crate::storage::KeyPair;
use crate::terraform::{ApplyError, ApplyRequest, Executor, Outputter};
use crate::util::StringGenerator;

#[derive(Clone, Default)]
pub struct MockKeyPairUpdater {
    key_pair: Arc<Mutex<KeyPair>>,
    error: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockKeyPairUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(&self, key_pair: KeyPair) {
        *self.key_pair.lock().unwrap() = key_pair;
    }

    pub fn fails_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl KeyPairUpdater for MockKeyPairUpdater {
    async fn update(&self) -> Result<KeyPair> {
        *self.calls.lock().unwrap() += 1;
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(self.key_pair.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
pub struct MockClientProvider {
    received: Arc<Mutex<Vec<(String, String, String)>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl MockClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fails_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn received_configs(&self) -> Vec<(String, String, String)> {
        self.received.lock().unwrap().clone()
    }
}

impl ClientProvider for MockClientProvider {
    fn set_config(&self, service_account_key: &str, project_id: &str, zone: &str) -> Result<()> {
        self.received.lock().unwrap().push((
            service_account_key.to_string(),
            project_id.to_string(),
            zone.to_string(),
        ));
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockExecutor {
    tf_state: Arc<Mutex<String>>,
    error: Arc<Mutex<Option<(Option<String>, String)>>>,
    received: Arc<Mutex<Vec<ApplyRequest>>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns_tf_state(&self, tf_state: &str) {
        *self.tf_state.lock().unwrap() = tf_state.to_string();
    }

    /// Fail the apply, optionally still carrying a partial state payload.
    pub fn fails_with(&self, partial_tf_state: Option<&str>, message: &str) {
        *self.error.lock().unwrap() =
            Some((partial_tf_state.map(str::to_string), message.to_string()));
    }

    pub fn received_requests(&self) -> Vec<ApplyRequest> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn apply(&self, request: ApplyRequest) -> Result<String, ApplyError> {
        self.received.lock().unwrap().push(request);
        if let Some((tf_state, message)) = self.error.lock().unwrap().clone() {
            return Err(ApplyError::new(tf_state, anyhow!("{message}")));
        }
        Ok(self.tf_state.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
pub struct MockOutputter {
    outputs: Arc<Mutex<HashMap<String, String>>>,
    failing_output: Arc<Mutex<Option<(String, String)>>>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockOutputter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(&self, name: &str, value: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn fails_on(&self, name: &str, message: &str) {
        *self.failing_output.lock().unwrap() = Some((name.to_string(), message.to_string()));
    }

    pub fn requested_outputs(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Outputter for MockOutputter {
    async fn get(&self, _tf_state: &str, name: &str) -> Result<String> {
        self.received.lock().unwrap().push(name.to_string());
        if let Some((failing, message)) = self.failing_output.lock().unwrap().as_ref() {
            if failing == name {
                return Err(anyhow!("{message}"));
            }
        }
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Clone, Default)]
pub struct MockDeployer {
    output: Arc<Mutex<DeployOutput>>,
    error: Arc<Mutex<Option<String>>>,
    received: Arc<Mutex<Vec<DeployInput>>>,
}

impl MockDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(&self, output: DeployOutput) {
        *self.output.lock().unwrap() = output;
    }

    pub fn fails_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn received_inputs(&self) -> Vec<DeployInput> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn deploy(&self, input: DeployInput) -> Result<DeployOutput> {
        self.received.lock().unwrap().push(input);
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(self.output.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
pub struct MockDirectorClient {
    uploaded: Arc<Mutex<Vec<Vec<u8>>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl MockDirectorClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fails_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn uploaded_configs(&self) -> Vec<Vec<u8>> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectorClient for MockDirectorClient {
    async fn update_cloud_config(&self, cloud_config: &[u8]) -> Result<()> {
        self.uploaded.lock().unwrap().push(cloud_config.to_vec());
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockDirectorClientProvider {
    client: MockDirectorClient,
    received: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl MockDirectorClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_mock(&self) -> MockDirectorClient {
        self.client.clone()
    }

    pub fn received_credentials(&self) -> Vec<(String, String, String)> {
        self.received.lock().unwrap().clone()
    }
}

impl DirectorClientProvider for MockDirectorClientProvider {
    fn client(
        &self,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn DirectorClient>> {
        self.received.lock().unwrap().push((
            address.to_string(),
            username.to_string(),
            password.to_string(),
        ));
        Ok(Arc::new(self.client.clone()))
    }
}

#[derive(Clone, Default)]
pub struct MockZones {
    zones: Arc<Mutex<Vec<String>>>,
    received_regions: Arc<Mutex<Vec<String>>>,
}

impl MockZones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(&self, zones: Vec<&str>) {
        *self.zones.lock().unwrap() = zones.into_iter().map(str::to_string).collect();
    }

    pub fn received_regions(&self) -> Vec<String> {
        self.received_regions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Zones for MockZones {
    async fn get(&self, region: &str) -> Result<Vec<String>> {
        self.received_regions.lock().unwrap().push(region.to_string());
        Ok(self.zones.lock().unwrap().clone())
    }
}

#[derive(Clone, Default)]
pub struct MockCloudConfigGenerator {
    error: Arc<Mutex<Option<String>>>,
    received: Arc<Mutex<Vec<CloudConfigInput>>>,
}

impl MockCloudConfigGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fails_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn received_inputs(&self) -> Vec<CloudConfigInput> {
        self.received.lock().unwrap().clone()
    }
}

impl Generator for MockCloudConfigGenerator {
    fn generate(&self, input: CloudConfigInput) -> Result<CloudConfig> {
        self.received.lock().unwrap().push(input);
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(CloudConfig::default())
    }
}

/// Deterministic string generator: appends `some-random-string` to the
/// prefix, matching the fixtures used throughout the workflow tests.
#[derive(Clone, Default)]
pub struct StubStringGenerator {
    error: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<usize>>,
}

impl StubStringGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fails_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl StringGenerator for StubStringGenerator {
    fn generate(&self, prefix: &str, _length: usize) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        if let Some(message) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{message}"));
        }
        Ok(format!("{prefix}some-random-string"))
    }
}
