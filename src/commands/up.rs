//! The `up` workflow: a five-phase checkpointed saga that takes an empty
//! (or partially provisioned) environment to a running, configured
//! director.
//!
//! Phases run strictly in order, each completing its checkpoint before the
//! next begins. Every failure is terminal for the run and leaves the
//! persisted state at the last successful checkpoint so a re-run resumes
//! instead of re-creating.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cloud::{ClientProvider, KeyPairUpdater, Zones};
use crate::cloudconfig::{CloudConfigInput, Generator};
use crate::director::{
    DeployInput, Deployer, DirectorClientProvider, InfrastructureConfiguration,
    InfrastructureConfigurationGcp,
};
use crate::error::Errors;
use crate::storage::{GcpState, State, StateStore};
use crate::terraform::{templates, ApplyRequest, Executor, Outputter};
use crate::util::StringGenerator;

const CREDENTIAL_LENGTH: usize = 15;
const ENV_ID_LENGTH: usize = 8;

/// User-supplied inputs for one run. Empty fields mean "use the value
/// already persisted for this environment".
#[derive(Debug, Clone, Default)]
pub struct UpConfig {
    pub service_account_key_path: String,
    pub project_id: String,
    pub zone: String,
    pub region: String,
}

/// Collaborators the workflow depends on; all substitutable by doubles.
pub struct GcpUpDeps {
    pub state_store: Arc<dyn StateStore>,
    pub key_pair_updater: Arc<dyn KeyPairUpdater>,
    pub client_provider: Arc<dyn ClientProvider>,
    pub executor: Arc<dyn Executor>,
    pub outputter: Arc<dyn Outputter>,
    pub deployer: Arc<dyn Deployer>,
    pub strings: Arc<dyn StringGenerator>,
    pub director_clients: Arc<dyn DirectorClientProvider>,
    pub cloud_config_generator: Arc<dyn Generator>,
    pub zones: Arc<dyn Zones>,
}

pub struct GcpUp {
    deps: GcpUpDeps,
}

impl GcpUp {
    pub fn new(deps: GcpUpDeps) -> Self {
        Self { deps }
    }

    pub async fn execute(&self, config: UpConfig, mut state: State) -> Result<()> {
        // Phase 1: validate and resolve. Nothing is written until both the
        // required-field check and the drift check pass.
        check_required_fields(&config, &state.gcp)?;
        check_drift(&config, &state.gcp)?;

        let service_account_key = resolve_service_account_key(&config, &state.gcp)?;
        let gcp = GcpState {
            service_account_key: service_account_key.clone(),
            project_id: resolve(&config.project_id, &state.gcp.project_id),
            zone: resolve(&config.zone, &state.gcp.zone),
            region: resolve(&config.region, &state.gcp.region),
        };

        state.iaas = "gcp".to_string();
        state.gcp = gcp;
        if state.env_id.is_empty() {
            state.env_id = self.deps.strings.generate("plinth-", ENV_ID_LENGTH)?;
        }

        self.deps.client_provider.set_config(
            &state.gcp.service_account_key,
            &state.gcp.project_id,
            &state.gcp.zone,
        )?;

        // Phase 2: ensure a key pair exists, persisting it together with
        // the resolved identity as one checkpoint. Existing key material
        // is never regenerated.
        if state.key_pair.is_empty() {
            info!("creating key pair for environment {}", state.env_id);
            state.key_pair = self.deps.key_pair_updater.update().await?;
            self.deps.state_store.set(&state)?;
        }

        // Phase 3: terraform apply. The emitted state is checkpointed
        // whether or not the apply succeeded; a double failure aggregates.
        let selection = templates::select(&state.lb);
        let request = ApplyRequest {
            credentials: state.gcp.service_account_key.clone(),
            env_id: state.env_id.clone(),
            project_id: state.gcp.project_id.clone(),
            zone: state.gcp.zone.clone(),
            region: state.gcp.region.clone(),
            cert: selection.cert,
            key: selection.key,
            domain: selection.domain,
            template: selection.body,
            tf_state: state.tf_state.clone(),
        };

        info!("applying terraform template for environment {}", state.env_id);
        match self.deps.executor.apply(request).await {
            Ok(tf_state) => {
                state.tf_state = tf_state;
                self.deps.state_store.set(&state)?;
            }
            Err(apply_error) => {
                let mut errors = Errors::new();
                if let Some(partial) = &apply_error.tf_state {
                    state.tf_state = partial.clone();
                }
                errors.push(anyhow!(apply_error));
                if let Err(set_error) = self.deps.state_store.set(&state) {
                    errors.push(set_error);
                }
                return errors.into_result();
            }
        }

        // Phase 4: deploy the director. Outputs are extracted one at a
        // time; the first failure aborts with no checkpoint.
        let external_ip = self.output(&state, "external_ip").await?;
        let network_name = self.output(&state, "network_name").await?;
        let subnetwork_name = self.output(&state, "subnetwork_name").await?;
        let bosh_open_tag = self.output(&state, "bosh_open_tag_name").await?;
        let internal_tag = self.output(&state, "internal_tag_name").await?;
        let director_address = self.output(&state, "director_address").await?;

        let director_name = if state.director.name.is_empty() {
            format!("bosh-{}", state.env_id)
        } else {
            state.director.name.clone()
        };
        let director_username = if state.director.username.is_empty() {
            self.deps.strings.generate("user-", CREDENTIAL_LENGTH)?
        } else {
            state.director.username.clone()
        };
        let director_password = if state.director.password.is_empty() {
            self.deps.strings.generate("p-", CREDENTIAL_LENGTH)?
        } else {
            state.director.password.clone()
        };

        info!("deploying director {director_name}");
        let deploy_output = self
            .deps
            .deployer
            .deploy(DeployInput {
                iaas: "gcp".to_string(),
                director_name: director_name.clone(),
                director_username: director_username.clone(),
                director_password: director_password.clone(),
                state: state.director.state.clone(),
                infrastructure: InfrastructureConfiguration {
                    external_ip,
                    gcp: InfrastructureConfigurationGcp {
                        zone: state.gcp.zone.clone(),
                        network_name: network_name.clone(),
                        subnetwork_name: subnetwork_name.clone(),
                        bosh_tag: bosh_open_tag,
                        internal_tag: internal_tag.clone(),
                        project: state.gcp.project_id.clone(),
                        json_key: state.gcp.service_account_key.clone(),
                    },
                },
            })
            .await?;

        // Director identity (name, credentials, address, SSL material) is
        // written once and preserved on re-runs; the manifest and opaque
        // deployment state always reflect the latest deploy.
        if state.director.is_empty() {
            state.director.name = director_name;
            state.director.username = director_username;
            state.director.password = director_password;
            state.director.address = director_address;
            state.director.ssl_ca = deploy_output.director_ssl.ca;
            state.director.ssl_certificate = deploy_output.director_ssl.certificate;
            state.director.ssl_private_key = deploy_output.director_ssl.private_key;
            state.director.credentials = deploy_output.credentials;
        }
        state.director.manifest = deploy_output.manifest;
        state.director.state = deploy_output.state;
        self.deps.state_store.set(&state)?;

        // Phase 5: derive and upload the cloud config. No checkpoint of
        // its own; a failed sync re-runs from the director checkpoint.
        let client = self.deps.director_clients.client(
            &state.director.address,
            &state.director.username,
            &state.director.password,
        )?;

        let azs = self.deps.zones.get(&state.gcp.region).await?;
        debug!("generating cloud config across {} zones", azs.len());
        let cloud_config = self.deps.cloud_config_generator.generate(CloudConfigInput {
            azs,
            tags: vec![internal_tag],
            network_name,
            subnetwork_name,
        })?;
        let document = serde_yaml::to_string(&cloud_config)
            .context("failed to serialize cloud config")?;

        info!("uploading cloud config to {}", state.director.address);
        client.update_cloud_config(document.as_bytes()).await?;

        Ok(())
    }

    async fn output(&self, state: &State, name: &str) -> Result<String> {
        self.deps.outputter.get(&state.tf_state, name).await
    }
}

fn resolve(supplied: &str, existing: &str) -> String {
    if supplied.is_empty() {
        existing.to_string()
    } else {
        supplied.to_string()
    }
}

/// First missing required field in canonical order:
/// service account key, project id, zone, region.
fn check_required_fields(config: &UpConfig, existing: &GcpState) -> Result<()> {
    let checks = [
        (
            !config.service_account_key_path.is_empty()
                || !existing.service_account_key.is_empty(),
            "GCP service account key must be provided",
        ),
        (
            !config.project_id.is_empty() || !existing.project_id.is_empty(),
            "GCP project ID must be provided",
        ),
        (
            !config.zone.is_empty() || !existing.zone.is_empty(),
            "GCP zone must be provided",
        ),
        (
            !config.region.is_empty() || !existing.region.is_empty(),
            "GCP region must be provided",
        ),
    ];

    for (present, message) in checks {
        if !present {
            return Err(anyhow!(message));
        }
    }
    Ok(())
}

/// Identity fields are immutable once persisted: a supplied value that
/// conflicts with the stored one fails the run before any side effect.
fn check_drift(config: &UpConfig, existing: &GcpState) -> Result<()> {
    let checks = [
        ("project id", &config.project_id, &existing.project_id),
        ("zone", &config.zone, &existing.zone),
        ("region", &config.region, &existing.region),
    ];

    for (field, supplied, persisted) in checks {
        if !supplied.is_empty() && !persisted.is_empty() && supplied != persisted {
            return Err(anyhow!(
                "The {field} cannot be changed for an existing environment. The current {field} is {persisted}."
            ));
        }
    }
    Ok(())
}

fn resolve_service_account_key(config: &UpConfig, existing: &GcpState) -> Result<String> {
    if config.service_account_key_path.is_empty() {
        return Ok(existing.service_account_key.clone());
    }

    let contents = fs::read_to_string(&config.service_account_key_path)
        .map_err(|e| anyhow!("error reading service account key: {e}"))?;
    serde_json::from_str::<serde_json::Value>(&contents)
        .map_err(|e| anyhow!("error parsing service account key: {e}"))?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::{DeployOutput, SslKeyPair};
    use crate::storage::{Director, InMemoryStateStore, KeyPair, Lb};
    use crate::testing::mocks::{
        MockClientProvider, MockCloudConfigGenerator, MockDeployer, MockDirectorClientProvider,
        MockExecutor, MockKeyPairUpdater, MockOutputter, MockZones, StubStringGenerator,
    };
    use std::collections::BTreeMap;
    use std::io::Write;

    struct Fixture {
        up: GcpUp,
        state_store: InMemoryStateStore,
        key_pair_updater: MockKeyPairUpdater,
        client_provider: MockClientProvider,
        executor: MockExecutor,
        outputter: MockOutputter,
        deployer: MockDeployer,
        strings: StubStringGenerator,
        director_clients: MockDirectorClientProvider,
        cloud_config_generator: MockCloudConfigGenerator,
        zones: MockZones,
    }

    fn fixture() -> Fixture {
        let state_store = InMemoryStateStore::new();
        let key_pair_updater = MockKeyPairUpdater::new();
        let client_provider = MockClientProvider::new();
        let executor = MockExecutor::new();
        let outputter = MockOutputter::new();
        let deployer = MockDeployer::new();
        let strings = StubStringGenerator::new();
        let director_clients = MockDirectorClientProvider::new();
        let cloud_config_generator = MockCloudConfigGenerator::new();
        let zones = MockZones::new();

        executor.returns_tf_state("some-tf-state");
        key_pair_updater.returns(KeyPair {
            name: "some-key-name".to_string(),
            private_key: "some-private-key".to_string(),
            public_key: "some-public-key".to_string(),
        });

        for (name, value) in [
            ("external_ip", "some-external-ip"),
            ("network_name", "plinth-lake-network"),
            ("subnetwork_name", "plinth-lake-subnet"),
            ("bosh_open_tag_name", "plinth-lake-bosh-open"),
            ("internal_tag_name", "plinth-lake-internal"),
            ("director_address", "some-director-address"),
        ] {
            outputter.with_output(name, value);
        }

        deployer.returns(DeployOutput {
            director_ssl: SslKeyPair {
                ca: "updated-ca".to_string(),
                certificate: "updated-certificate".to_string(),
                private_key: "updated-private-key".to_string(),
            },
            state: serde_json::json!({"updated-key": "updated-value"})
                .as_object()
                .unwrap()
                .clone(),
            manifest: "name: bosh".to_string(),
            credentials: BTreeMap::from([(
                "natsUsername".to_string(),
                "some-nats-username".to_string(),
            )]),
        });

        zones.returns(vec!["zone-1", "zone-2", "zone-3"]);

        let up = GcpUp::new(GcpUpDeps {
            state_store: Arc::new(state_store.clone()),
            key_pair_updater: Arc::new(key_pair_updater.clone()),
            client_provider: Arc::new(client_provider.clone()),
            executor: Arc::new(executor.clone()),
            outputter: Arc::new(outputter.clone()),
            deployer: Arc::new(deployer.clone()),
            strings: Arc::new(strings.clone()),
            director_clients: Arc::new(director_clients.clone()),
            cloud_config_generator: Arc::new(cloud_config_generator.clone()),
            zones: Arc::new(zones.clone()),
        });

        Fixture {
            up,
            state_store,
            key_pair_updater,
            client_provider,
            executor,
            outputter,
            deployer,
            strings,
            director_clients,
            cloud_config_generator,
            zones,
        }
    }

    fn service_account_key_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn valid_config(key_file: &tempfile::NamedTempFile) -> UpConfig {
        UpConfig {
            service_account_key_path: key_file.path().to_string_lossy().to_string(),
            project_id: "some-project-id".to_string(),
            zone: "some-zone".to_string(),
            region: "us-west1".to_string(),
        }
    }

    fn provisioned_state() -> State {
        State {
            iaas: "gcp".to_string(),
            env_id: "plinth-lake".to_string(),
            gcp: GcpState {
                service_account_key: r#"{"real": "json"}"#.to_string(),
                project_id: "some-project-id".to_string(),
                zone: "some-zone".to_string(),
                region: "us-west1".to_string(),
            },
            key_pair: KeyPair {
                name: "some-key-name".to_string(),
                private_key: "some-private-key".to_string(),
                public_key: "some-public-key".to_string(),
            },
            tf_state: "prior-tf-state".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_run_saves_identity_and_key_pair_in_one_checkpoint() {
        let f = fixture();
        let key_file = service_account_key_file(r#"{"real": "json"}"#);

        f.up.execute(valid_config(&key_file), State::default())
            .await
            .unwrap();

        let first = &f.state_store.checkpoints()[0];
        assert_eq!(first.iaas, "gcp");
        assert_eq!(
            first.gcp,
            GcpState {
                service_account_key: r#"{"real": "json"}"#.to_string(),
                project_id: "some-project-id".to_string(),
                zone: "some-zone".to_string(),
                region: "us-west1".to_string(),
            }
        );
        assert_eq!(first.key_pair.private_key, "some-private-key");
        assert_eq!(first.key_pair.public_key, "some-public-key");
        assert_eq!(first.env_id, "plinth-some-random-string");

        let configs = f.client_provider.received_configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(
            configs[0],
            (
                r#"{"real": "json"}"#.to_string(),
                "some-project-id".to_string(),
                "some-zone".to_string()
            )
        );
    }

    #[tokio::test]
    async fn clean_first_run_checkpoints_three_times() {
        let f = fixture();
        let key_file = service_account_key_file(r#"{"real": "json"}"#);

        f.up.execute(valid_config(&key_file), State::default())
            .await
            .unwrap();

        assert_eq!(f.state_store.set_call_count(), 3);
    }

    #[tokio::test]
    async fn does_not_regenerate_an_existing_key_pair() {
        let f = fixture();

        f.up.execute(UpConfig::default(), provisioned_state())
            .await
            .unwrap();

        assert_eq!(f.key_pair_updater.call_count(), 0);
    }

    #[tokio::test]
    async fn apply_receives_template_credentials_and_prior_state() {
        let f = fixture();

        f.up.execute(UpConfig::default(), provisioned_state())
            .await
            .unwrap();

        let requests = f.executor.received_requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.credentials, r#"{"real": "json"}"#);
        assert_eq!(request.env_id, "plinth-lake");
        assert_eq!(request.project_id, "some-project-id");
        assert_eq!(request.zone, "some-zone");
        assert_eq!(request.region, "us-west1");
        assert_eq!(request.tf_state, "prior-tf-state");
        assert_eq!(request.template, templates::select(&Lb::default()).body);

        assert_eq!(f.state_store.latest().unwrap().tf_state, "some-tf-state");
    }

    #[tokio::test]
    async fn cf_lb_type_selects_cf_template_with_cert_material() {
        let f = fixture();
        let mut state = provisioned_state();
        state.lb = Lb {
            lb_type: "cf".to_string(),
            cert: "some-cert".to_string(),
            key: "some-key".to_string(),
            domain: "some-domain".to_string(),
        };

        f.up.execute(UpConfig::default(), state.clone()).await.unwrap();

        let request = &f.executor.received_requests()[0];
        assert_eq!(request.template, templates::select(&state.lb).body);
        assert_eq!(request.cert, "some-cert");
        assert_eq!(request.key, "some-key");
        assert_eq!(request.domain, "some-domain");
    }

    #[tokio::test]
    async fn concourse_lb_type_omits_cert_material() {
        let f = fixture();
        let mut state = provisioned_state();
        state.lb.lb_type = "concourse".to_string();

        f.up.execute(UpConfig::default(), state.clone()).await.unwrap();

        let request = &f.executor.received_requests()[0];
        assert_eq!(request.template, templates::select(&state.lb).body);
        assert_eq!(request.cert, "");
        assert_eq!(request.key, "");
        assert_eq!(request.domain, "");
    }

    #[tokio::test]
    async fn saves_partial_tf_state_when_apply_fails() {
        let f = fixture();
        f.executor
            .fails_with(Some("some-tf-state"), "failed to apply");

        let err =
            f.up.execute(UpConfig::default(), provisioned_state())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "failed to apply");
        assert_eq!(f.state_store.set_call_count(), 1);
        assert_eq!(f.state_store.latest().unwrap().tf_state, "some-tf-state");
    }

    #[tokio::test]
    async fn aggregates_apply_and_checkpoint_failures_in_order() {
        let f = fixture();
        f.executor
            .fails_with(Some("some-tf-state"), "failed to apply");
        f.state_store
            .fail_on(vec![Some("state failed to be set".to_string())]);

        let err =
            f.up.execute(UpConfig::default(), provisioned_state())
                .await
                .unwrap_err();

        assert_eq!(
            err.to_string(),
            "the following errors occurred:\nfailed to apply,\nstate failed to be set"
        );
        assert_eq!(f.state_store.latest().unwrap().tf_state, "some-tf-state");
    }

    #[tokio::test]
    async fn deploys_the_director_with_resolved_infrastructure() {
        let f = fixture();

        f.up.execute(UpConfig::default(), provisioned_state())
            .await
            .unwrap();

        let inputs = f.deployer.received_inputs();
        assert_eq!(inputs.len(), 1);
        let input = &inputs[0];
        assert_eq!(input.iaas, "gcp");
        assert_eq!(input.director_name, "bosh-plinth-lake");
        assert_eq!(input.director_username, "user-some-random-string");
        assert_eq!(input.director_password, "p-some-random-string");
        assert!(input.state.is_empty());
        assert_eq!(input.infrastructure.external_ip, "some-external-ip");
        assert_eq!(input.infrastructure.gcp.zone, "some-zone");
        assert_eq!(input.infrastructure.gcp.network_name, "plinth-lake-network");
        assert_eq!(
            input.infrastructure.gcp.subnetwork_name,
            "plinth-lake-subnet"
        );
        assert_eq!(input.infrastructure.gcp.bosh_tag, "plinth-lake-bosh-open");
        assert_eq!(input.infrastructure.gcp.internal_tag, "plinth-lake-internal");
        assert_eq!(input.infrastructure.gcp.project, "some-project-id");
        assert_eq!(input.infrastructure.gcp.json_key, r#"{"real": "json"}"#);
    }

    #[tokio::test]
    async fn first_deploy_persists_full_director_state() {
        let f = fixture();

        f.up.execute(UpConfig::default(), provisioned_state())
            .await
            .unwrap();

        let director = f.state_store.latest().unwrap().director;
        assert_eq!(director.name, "bosh-plinth-lake");
        assert_eq!(director.username, "user-some-random-string");
        assert_eq!(director.password, "p-some-random-string");
        assert_eq!(director.address, "some-director-address");
        assert_eq!(director.ssl_ca, "updated-ca");
        assert_eq!(director.ssl_certificate, "updated-certificate");
        assert_eq!(director.ssl_private_key, "updated-private-key");
        assert_eq!(director.credentials["natsUsername"], "some-nats-username");
        assert_eq!(director.manifest, "name: bosh");
        assert_eq!(
            director.state.get("updated-key").unwrap(),
            &serde_json::Value::String("updated-value".to_string())
        );
    }

    #[tokio::test]
    async fn rerun_preserves_director_identity_but_refreshes_manifest_and_state() {
        let f = fixture();
        let mut state = provisioned_state();
        state.director = Director {
            name: "old-director-name".to_string(),
            username: "old-director-username".to_string(),
            password: "old-director-password".to_string(),
            address: "some-old-external-ip".to_string(),
            ssl_ca: "old-ca".to_string(),
            ssl_certificate: "old-certificate".to_string(),
            ssl_private_key: "old-private-key".to_string(),
            credentials: BTreeMap::from([("old".to_string(), "credentials".to_string())]),
            state: serde_json::json!({"old-key": "old-value"})
                .as_object()
                .unwrap()
                .clone(),
            manifest: "name: old-bosh".to_string(),
        };

        f.up.execute(UpConfig::default(), state).await.unwrap();

        let director = f.state_store.latest().unwrap().director;
        assert_eq!(director.name, "old-director-name");
        assert_eq!(director.username, "old-director-username");
        assert_eq!(director.password, "old-director-password");
        assert_eq!(director.address, "some-old-external-ip");
        assert_eq!(director.ssl_ca, "old-ca");
        assert_eq!(director.credentials["old"], "credentials");
        assert_eq!(director.manifest, "name: bosh");
        assert!(director.state.contains_key("updated-key"));
        assert!(!director.state.contains_key("old-key"));

        // existing credentials also flow into the deploy input
        let input = &f.deployer.received_inputs()[0];
        assert_eq!(input.director_name, "old-director-name");
        assert_eq!(input.director_username, "old-director-username");
        assert_eq!(input.director_password, "old-director-password");
        assert!(input.state.contains_key("old-key"));
    }

    #[tokio::test]
    async fn generates_and_uploads_a_cloud_config() {
        let f = fixture();

        f.up.execute(UpConfig::default(), provisioned_state())
            .await
            .unwrap();

        let credentials = f.director_clients.received_credentials();
        assert_eq!(
            credentials,
            vec![(
                "some-director-address".to_string(),
                "user-some-random-string".to_string(),
                "p-some-random-string".to_string()
            )]
        );

        assert_eq!(f.zones.received_regions(), vec!["us-west1"]);

        let inputs = f.cloud_config_generator.received_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].azs, vec!["zone-1", "zone-2", "zone-3"]);
        assert_eq!(inputs[0].tags, vec!["plinth-lake-internal"]);
        assert_eq!(inputs[0].network_name, "plinth-lake-network");
        assert_eq!(inputs[0].subnetwork_name, "plinth-lake-subnet");

        assert_eq!(f.director_clients.client_mock().uploaded_configs().len(), 1);
    }

    #[tokio::test]
    async fn extraction_failures_abort_the_deploy_phase_verbatim() {
        for output in [
            "external_ip",
            "network_name",
            "subnetwork_name",
            "bosh_open_tag_name",
            "internal_tag_name",
            "director_address",
        ] {
            let f = fixture();
            f.outputter.fails_on(output, "failed to get output");

            let err =
                f.up.execute(UpConfig::default(), provisioned_state())
                    .await
                    .unwrap_err();

            assert_eq!(err.to_string(), "failed to get output");
            assert!(f.deployer.received_inputs().is_empty());
            // only the tf-state checkpoint happened
            assert_eq!(f.state_store.set_call_count(), 1);
        }
    }

    #[tokio::test]
    async fn missing_fields_are_reported_in_canonical_order() {
        let key_file = service_account_key_file(r#"{"real": "json"}"#);
        let key_path = key_file.path().to_string_lossy().to_string();

        let cases = [
            (UpConfig::default(), "GCP service account key must be provided"),
            (
                UpConfig {
                    project_id: "p".to_string(),
                    zone: "z".to_string(),
                    region: "us-west1".to_string(),
                    ..Default::default()
                },
                "GCP service account key must be provided",
            ),
            (
                UpConfig {
                    service_account_key_path: key_path.clone(),
                    zone: "z".to_string(),
                    region: "us-west1".to_string(),
                    ..Default::default()
                },
                "GCP project ID must be provided",
            ),
            (
                UpConfig {
                    service_account_key_path: key_path.clone(),
                    project_id: "p".to_string(),
                    region: "us-west1".to_string(),
                    ..Default::default()
                },
                "GCP zone must be provided",
            ),
            (
                UpConfig {
                    service_account_key_path: key_path.clone(),
                    project_id: "p".to_string(),
                    zone: "z".to_string(),
                    ..Default::default()
                },
                "GCP region must be provided",
            ),
        ];

        for (config, expected) in cases {
            let f = fixture();
            let err = f.up.execute(config, State::default()).await.unwrap_err();
            assert_eq!(err.to_string(), expected);
            assert_eq!(f.state_store.set_call_count(), 0);
        }
    }

    #[tokio::test]
    async fn absent_inputs_fall_back_to_persisted_identity() {
        let f = fixture();

        f.up.execute(UpConfig::default(), provisioned_state())
            .await
            .unwrap();

        let latest = f.state_store.latest().unwrap();
        assert_eq!(latest.gcp.project_id, "some-project-id");
        assert_eq!(latest.gcp.region, "us-west1");
    }

    #[tokio::test]
    async fn drift_on_any_identity_field_fails_before_any_side_effect() {
        let cases = [
            (
                UpConfig {
                    project_id: "some-other-project-id".to_string(),
                    zone: "some-zone".to_string(),
                    region: "us-west1".to_string(),
                    ..Default::default()
                },
                "The project id cannot be changed for an existing environment. The current project id is some-project-id.",
            ),
            (
                UpConfig {
                    project_id: "some-project-id".to_string(),
                    zone: "some-other-zone".to_string(),
                    region: "us-west1".to_string(),
                    ..Default::default()
                },
                "The zone cannot be changed for an existing environment. The current zone is some-zone.",
            ),
            (
                UpConfig {
                    project_id: "some-project-id".to_string(),
                    zone: "some-zone".to_string(),
                    region: "some-other-region".to_string(),
                    ..Default::default()
                },
                "The region cannot be changed for an existing environment. The current region is us-west1.",
            ),
        ];

        for (config, expected) in cases {
            let f = fixture();
            let err =
                f.up.execute(config, provisioned_state()).await.unwrap_err();
            assert_eq!(err.to_string(), expected);
            assert_eq!(f.state_store.set_call_count(), 0);
            assert_eq!(f.executor.received_requests().len(), 0);
            assert_eq!(f.key_pair_updater.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn missing_service_account_key_file_fails_with_read_error() {
        let f = fixture();
        let config = UpConfig {
            service_account_key_path: "/some/non/existent/file".to_string(),
            project_id: "p".to_string(),
            zone: "z".to_string(),
            region: "us-west1".to_string(),
        };

        let err = f.up.execute(config, State::default()).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("error reading service account key:"));
        assert_eq!(f.state_store.set_call_count(), 0);
    }

    #[tokio::test]
    async fn invalid_service_account_key_fails_with_parse_error() {
        let f = fixture();
        let key_file = service_account_key_file("%%%not-valid-json%%%");

        let err =
            f.up.execute(valid_config(&key_file), State::default())
                .await
                .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("error parsing service account key:"));
        assert_eq!(f.state_store.set_call_count(), 0);
    }

    #[tokio::test]
    async fn key_pair_failure_persists_nothing() {
        let f = fixture();
        f.key_pair_updater.fails_with("keypair update failed");
        let key_file = service_account_key_file(r#"{"real": "json"}"#);

        let err =
            f.up.execute(valid_config(&key_file), State::default())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "keypair update failed");
        assert_eq!(f.state_store.set_call_count(), 0);
    }

    #[tokio::test]
    async fn set_config_failure_surfaces_verbatim() {
        let f = fixture();
        f.client_provider.fails_with("setting config failed");
        let key_file = service_account_key_file(r#"{"real": "json"}"#);

        let err =
            f.up.execute(valid_config(&key_file), State::default())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "setting config failed");
        assert_eq!(f.state_store.set_call_count(), 0);
    }

    #[tokio::test]
    async fn credential_generation_failure_aborts_the_deploy() {
        let f = fixture();
        let mut state = provisioned_state();
        state.director.username = "some-username".to_string();
        f.strings.fails_with("failed to generate string");

        let err = f.up.execute(UpConfig::default(), state).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to generate string");
        // tf-state checkpoint only; the deploy never checkpoints
        assert_eq!(f.state_store.set_call_count(), 1);
    }

    #[tokio::test]
    async fn deployer_failure_surfaces_verbatim_without_checkpoint() {
        let f = fixture();
        f.deployer.fails_with("failed to deploy");

        let err =
            f.up.execute(UpConfig::default(), provisioned_state())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "failed to deploy");
        assert_eq!(f.state_store.set_call_count(), 1);
    }

    #[tokio::test]
    async fn checkpoint_failure_after_deploy_surfaces_verbatim() {
        let f = fixture();
        f.state_store
            .fail_on(vec![None, Some("state failed to be set".to_string())]);

        let err =
            f.up.execute(UpConfig::default(), provisioned_state())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "state failed to be set");
    }

    #[tokio::test]
    async fn cloud_config_generation_failure_surfaces_verbatim() {
        let f = fixture();
        f.cloud_config_generator
            .fails_with("failed to generate cloud config");

        let err =
            f.up.execute(UpConfig::default(), provisioned_state())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "failed to generate cloud config");
    }

    #[tokio::test]
    async fn cloud_config_upload_failure_surfaces_verbatim() {
        let f = fixture();
        f.director_clients
            .client_mock()
            .fails_with("failed to update cloud config");

        let err =
            f.up.execute(UpConfig::default(), provisioned_state())
                .await
                .unwrap_err();

        assert_eq!(err.to_string(), "failed to update cloud config");
    }

    #[tokio::test]
    async fn end_to_end_first_run_populates_every_state_group() {
        let f = fixture();
        let key_file = service_account_key_file(r#"{"real": "json"}"#);

        f.up.execute(valid_config(&key_file), State::default())
            .await
            .unwrap();

        let latest = f.state_store.latest().unwrap();
        assert_eq!(latest.iaas, "gcp");
        assert!(!latest.env_id.is_empty());
        assert!(!latest.gcp.is_empty());
        assert!(!latest.key_pair.is_empty());
        assert_eq!(latest.tf_state, "some-tf-state");
        assert!(!latest.director.is_empty());
        assert_eq!(latest.director.manifest, "name: bosh");
    }
}
