use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::cmd::{Cmd, OutputSink};
use crate::subprocess::ProcessRunner;

/// Everything a single apply needs: identity, credentials, prior state and
/// the parameterized template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyRequest {
    pub credentials: String,
    pub env_id: String,
    pub project_id: String,
    pub zone: String,
    pub region: String,
    pub cert: String,
    pub key: String,
    pub domain: String,
    pub template: String,
    pub tf_state: String,
}

/// Apply failure that still carries whatever state terraform managed to
/// emit before failing, so the caller can checkpoint it and resume later.
/// Displays as the underlying failure only.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApplyError {
    message: String,
    pub tf_state: Option<String>,
}

impl ApplyError {
    pub fn new(tf_state: Option<String>, source: anyhow::Error) -> Self {
        Self {
            message: source.to_string(),
            tf_state,
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn apply(&self, request: ApplyRequest) -> Result<String, ApplyError>;
}

#[async_trait]
pub trait Outputter: Send + Sync {
    async fn get(&self, tf_state: &str, name: &str) -> Result<String>;
}

/// Production executor: materializes the template into a scratch
/// directory, runs `terraform init` and `terraform apply` through the
/// invocation wrapper, and reads the emitted state back whether or not
/// the apply succeeded.
pub struct CmdExecutor {
    cmd: Cmd,
    stdout: OutputSink,
    debug: bool,
}

impl CmdExecutor {
    pub fn new(cmd: Cmd, stdout: OutputSink, debug: bool) -> Self {
        Self { cmd, stdout, debug }
    }

    fn write_workspace(dir: &Path, request: &ApplyRequest) -> Result<()> {
        fs::write(dir.join("template.tf"), &request.template)
            .context("failed to write terraform template")?;
        fs::write(dir.join("credentials.json"), &request.credentials)
            .context("failed to write credentials file")?;
        if !request.tf_state.is_empty() {
            fs::write(dir.join("terraform.tfstate"), &request.tf_state)
                .context("failed to write prior terraform state")?;
        }
        Ok(())
    }

    fn apply_args(request: &ApplyRequest) -> Vec<String> {
        let mut args = vec![
            "apply".to_string(),
            "-auto-approve".to_string(),
            "-var".to_string(),
            format!("project_id={}", request.project_id),
            "-var".to_string(),
            format!("env_id={}", request.env_id),
            "-var".to_string(),
            format!("region={}", request.region),
            "-var".to_string(),
            format!("zone={}", request.zone),
            "-var".to_string(),
            "credentials=credentials.json".to_string(),
        ];
        if !request.cert.is_empty() {
            args.push("-var".to_string());
            args.push(format!("ssl_certificate={}", request.cert));
        }
        if !request.key.is_empty() {
            args.push("-var".to_string());
            args.push(format!("ssl_certificate_private_key={}", request.key));
        }
        if !request.domain.is_empty() {
            args.push("-var".to_string());
            args.push(format!("system_domain={}", request.domain));
        }
        args
    }

    fn read_tf_state(dir: &Path) -> Option<String> {
        fs::read_to_string(dir.join("terraform.tfstate")).ok()
    }
}

#[async_trait]
impl Executor for CmdExecutor {
    async fn apply(&self, request: ApplyRequest) -> Result<String, ApplyError> {
        let dir = tempfile::tempdir()
            .context("failed to create terraform working directory")
            .map_err(|e| ApplyError::new(None, e))?;

        Self::write_workspace(dir.path(), &request).map_err(|e| ApplyError::new(None, e))?;

        let init_args = vec!["init".to_string()];
        if let Err(e) = self
            .cmd
            .run(Arc::clone(&self.stdout), dir.path(), &init_args, self.debug)
            .await
        {
            return Err(ApplyError::new(Self::read_tf_state(dir.path()), e));
        }

        let apply_args = Self::apply_args(&request);
        match self
            .cmd
            .run(Arc::clone(&self.stdout), dir.path(), &apply_args, self.debug)
            .await
        {
            Ok(()) => Self::read_tf_state(dir.path())
                .ok_or_else(|| anyhow!("terraform did not emit a state file"))
                .map_err(|e| ApplyError::new(None, e)),
            Err(e) => Err(ApplyError::new(Self::read_tf_state(dir.path()), e)),
        }
    }
}

/// Extracts a single named output from a terraform state by replaying it
/// into a scratch directory and asking terraform for the value.
pub struct CmdOutputter {
    runner: Arc<dyn ProcessRunner>,
}

impl CmdOutputter {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Outputter for CmdOutputter {
    async fn get(&self, tf_state: &str, name: &str) -> Result<String> {
        use crate::subprocess::ProcessCommand;

        let dir = tempfile::tempdir().context("failed to create terraform working directory")?;
        fs::write(dir.path().join("terraform.tfstate"), tf_state)
            .context("failed to write terraform state")?;

        let command = ProcessCommand::new("terraform")
            .args(["output", "-raw", name])
            .current_dir(dir.path());

        let output = self.runner.run(command).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "failed to get terraform output {}: {}",
                name,
                output.stderr.trim()
            ));
        }

        Ok(output.stdout.trim().to_string())
    }
}
