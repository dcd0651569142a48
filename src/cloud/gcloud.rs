//! Production GCP access through the `gcloud` CLI.
//!
//! Authentication is deferred: `set_config` only records the credentials,
//! and each metadata operation activates the service account before it
//! touches the project. This keeps `set_config` free of side effects
//! outside the process.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::cloud::{ClientProvider, MetadataClient};
use crate::subprocess::{ProcessCommand, ProcessRunner};

#[derive(Clone)]
struct ActiveConfig {
    service_account_key: String,
    project_id: String,
}

pub struct GcloudClient {
    runner: Arc<dyn ProcessRunner>,
    config: Mutex<Option<ActiveConfig>>,
}

impl GcloudClient {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            config: Mutex::new(None),
        }
    }

    fn active_config(&self) -> Result<ActiveConfig> {
        self.config
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("gcloud client has not been configured"))
    }

    async fn run_gcloud(&self, args: Vec<String>) -> Result<()> {
        let output = self
            .runner
            .run(ProcessCommand::new("gcloud").args(args))
            .await?;
        if !output.status.success() {
            return Err(anyhow!("gcloud failed: {}", output.stderr.trim()));
        }
        Ok(())
    }
}

impl ClientProvider for GcloudClient {
    fn set_config(&self, service_account_key: &str, project_id: &str, _zone: &str) -> Result<()> {
        debug!("configuring gcloud client for project {project_id}");
        *self.config.lock().unwrap() = Some(ActiveConfig {
            service_account_key: service_account_key.to_string(),
            project_id: project_id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl MetadataClient for GcloudClient {
    async fn register_ssh_public_key(&self, user: &str, public_key: &str) -> Result<()> {
        let config = self.active_config()?;

        let mut key_file = tempfile::NamedTempFile::new()?;
        key_file.write_all(config.service_account_key.as_bytes())?;

        self.run_gcloud(vec![
            "auth".to_string(),
            "activate-service-account".to_string(),
            format!("--key-file={}", key_file.path().display()),
            "--quiet".to_string(),
        ])
        .await?;

        self.run_gcloud(vec![
            "compute".to_string(),
            "project-info".to_string(),
            "add-metadata".to_string(),
            "--project".to_string(),
            config.project_id,
            "--metadata".to_string(),
            format!("ssh-keys={user}:{public_key}"),
            "--quiet".to_string(),
        ])
        .await
    }
}
