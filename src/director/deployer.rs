use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fs;
use std::sync::Arc;

use super::manifest::{
    AgentProperties, BlobstoreJobProperties, DirectorJobProperties, HmJobProperties,
    ManifestProperties, NatsJobProperties, PostgresJobProperties, RegistryJobProperties,
};
use super::{DeployInput, DeployOutput, Deployer, SslKeyPair};
use crate::subprocess::{ProcessCommand, ProcessRunner};
use crate::util::StringGenerator;

const STATE_FILE: &str = "director-state.json";
const MANIFEST_FILE: &str = "director.yml";

#[derive(Serialize)]
struct ManifestDocument {
    name: String,
    properties: PropertiesBlock,
    cloud_provider: CloudProvider,
}

#[derive(Serialize)]
struct PropertiesBlock {
    nats: NatsJobProperties,
    postgres: PostgresJobProperties,
    registry: RegistryJobProperties,
    blobstore: BlobstoreJobProperties,
    director: DirectorJobProperties,
    hm: HmJobProperties,
    agent: AgentProperties,
    google: GoogleProperties,
}

#[derive(Serialize)]
struct GoogleProperties {
    project: String,
    json_key: String,
    default_zone: String,
    network: String,
    subnetwork: String,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct CloudProvider {
    mbus: String,
}

/// Deploys the director by rendering a manifest and handing it to the
/// `bosh-init` CLI; the opaque deployment state round-trips through the
/// state file bosh-init maintains next to the manifest.
pub struct BoshInitDeployer {
    runner: Arc<dyn ProcessRunner>,
    strings: Arc<dyn StringGenerator>,
}

impl BoshInitDeployer {
    pub fn new(runner: Arc<dyn ProcessRunner>, strings: Arc<dyn StringGenerator>) -> Self {
        Self { runner, strings }
    }

    fn render_manifest(input: &DeployInput, properties: &ManifestProperties) -> Result<String> {
        let document = ManifestDocument {
            name: input.director_name.clone(),
            properties: PropertiesBlock {
                nats: properties.nats(),
                postgres: properties.postgres(),
                registry: properties.registry(),
                blobstore: properties.blobstore(),
                director: properties.director(
                    &input.director_name,
                    &input.director_username,
                    &input.director_password,
                ),
                hm: properties.hm(),
                agent: properties.agent(),
                google: GoogleProperties {
                    project: input.infrastructure.gcp.project.clone(),
                    json_key: input.infrastructure.gcp.json_key.clone(),
                    default_zone: input.infrastructure.gcp.zone.clone(),
                    network: input.infrastructure.gcp.network_name.clone(),
                    subnetwork: input.infrastructure.gcp.subnetwork_name.clone(),
                    tags: vec![
                        input.infrastructure.gcp.bosh_tag.clone(),
                        input.infrastructure.gcp.internal_tag.clone(),
                    ],
                },
            },
            cloud_provider: CloudProvider {
                mbus: format!(
                    "https://{}:{}@{}:6868",
                    properties.mbus_username, properties.mbus_password,
                    input.infrastructure.external_ip
                ),
            },
        };

        serde_yaml::to_string(&document).context("failed to render director manifest")
    }

    fn extract_ssl(state: &serde_json::Map<String, serde_json::Value>) -> SslKeyPair {
        let field = |name: &str| {
            state
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        SslKeyPair {
            ca: field("director_ssl_ca"),
            certificate: field("director_ssl_certificate"),
            private_key: field("director_ssl_private_key"),
        }
    }
}

#[async_trait]
impl Deployer for BoshInitDeployer {
    async fn deploy(&self, input: DeployInput) -> Result<DeployOutput> {
        let properties = ManifestProperties::generate(self.strings.as_ref())?;
        let manifest = Self::render_manifest(&input, &properties)?;

        let dir = tempfile::tempdir().context("failed to create deploy working directory")?;
        fs::write(dir.path().join(MANIFEST_FILE), &manifest)
            .context("failed to write director manifest")?;
        if !input.state.is_empty() {
            let state = serde_json::to_string(&input.state)
                .context("failed to serialize prior deployment state")?;
            fs::write(dir.path().join(STATE_FILE), state)
                .context("failed to write prior deployment state")?;
        }

        let command = ProcessCommand::new("bosh-init")
            .args(["deploy", MANIFEST_FILE])
            .current_dir(dir.path());

        let output = self.runner.run(command).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "bosh-init deploy failed: {}",
                output.stderr.trim()
            ));
        }

        let state: serde_json::Map<String, serde_json::Value> =
            match fs::read_to_string(dir.path().join(STATE_FILE)) {
                Ok(contents) => serde_json::from_str(&contents)
                    .context("failed to parse deployment state emitted by bosh-init")?,
                Err(_) => serde_json::Map::new(),
            };

        Ok(DeployOutput {
            director_ssl: Self::extract_ssl(&state),
            state,
            manifest,
            credentials: properties.credentials_map(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::{InfrastructureConfiguration, InfrastructureConfigurationGcp};

    struct StubStrings;

    impl StringGenerator for StubStrings {
        fn generate(&self, prefix: &str, _length: usize) -> Result<String> {
            Ok(format!("{prefix}some-random-string"))
        }
    }

    fn deploy_input() -> DeployInput {
        DeployInput {
            iaas: "gcp".to_string(),
            director_name: "bosh-some-env".to_string(),
            director_username: "user-some-random-string".to_string(),
            director_password: "p-some-random-string".to_string(),
            state: serde_json::Map::new(),
            infrastructure: InfrastructureConfiguration {
                external_ip: "some-external-ip".to_string(),
                gcp: InfrastructureConfigurationGcp {
                    zone: "some-zone".to_string(),
                    network_name: "some-network".to_string(),
                    subnetwork_name: "some-subnet".to_string(),
                    bosh_tag: "some-bosh-open".to_string(),
                    internal_tag: "some-internal".to_string(),
                    project: "some-project-id".to_string(),
                    json_key: "{}".to_string(),
                },
            },
        }
    }

    #[test]
    fn manifest_names_the_director_and_wires_gcp() {
        let properties = ManifestProperties::generate(&StubStrings).unwrap();
        let manifest = BoshInitDeployer::render_manifest(&deploy_input(), &properties).unwrap();

        assert!(manifest.contains("name: bosh-some-env"));
        assert!(manifest.contains("project: some-project-id"));
        assert!(manifest.contains("network: some-network"));
        assert!(manifest.contains("subnetwork: some-subnet"));
        assert!(manifest.contains("- some-bosh-open"));
        assert!(manifest.contains("- some-internal"));
        assert!(manifest.contains("some-external-ip:6868"));
        assert!(manifest.contains("name: user-some-random-string"));
    }

    #[test]
    fn extract_ssl_tolerates_missing_fields() {
        let mut state = serde_json::Map::new();
        state.insert(
            "director_ssl_ca".to_string(),
            serde_json::Value::String("some-ca".to_string()),
        );
        let ssl = BoshInitDeployer::extract_ssl(&state);
        assert_eq!(ssl.ca, "some-ca");
        assert_eq!(ssl.certificate, "");
        assert_eq!(ssl.private_key, "");
    }

    #[tokio::test]
    async fn failed_bosh_init_surfaces_stderr() {
        let (subprocess, mock) = crate::subprocess::SubprocessManager::mock();
        mock.expect_command("bosh-init")
            .returns_exit_code(1)
            .returns_stderr("failed to deploy\n")
            .finish();

        let deployer = BoshInitDeployer::new(subprocess.runner(), Arc::new(StubStrings));
        let err = deployer.deploy(deploy_input()).await.unwrap_err();
        assert!(err.to_string().contains("failed to deploy"));
    }
}
