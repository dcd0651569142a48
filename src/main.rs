use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, trace};

use plinth::cloud::{Ed25519KeyPairUpdater, GcloudClient, RegionZones};
use plinth::cloudconfig::GcpCloudConfigGenerator;
use plinth::commands::{GcpUp, GcpUpDeps, UpConfig};
use plinth::director::{BoshInitDeployer, HttpClientProvider};
use plinth::storage::FileStateStore;
use plinth::subprocess::SubprocessManager;
use plinth::terraform::{sink, Cmd, CmdExecutor, CmdOutputter};
use plinth::util::RandStringGenerator;

/// Provision BOSH directors on GCP
#[derive(Parser)]
#[command(name = "plinth")]
#[command(about = "Plinth - Provision a BOSH director on GCP", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or resume an environment
    Up {
        /// Path to a GCP service account key file
        #[arg(long)]
        service_account_key: Option<PathBuf>,

        /// GCP project to provision into
        #[arg(long)]
        project_id: Option<String>,

        /// Zone the director VM lives in
        #[arg(long)]
        zone: Option<String>,

        /// Region the network spans
        #[arg(long)]
        region: Option<String>,

        /// Directory holding state.json
        #[arg(long, default_value = ".")]
        state_dir: PathBuf,

        /// Mirror terraform output to the console
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,tower=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("plinth started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Up {
            service_account_key,
            project_id,
            zone,
            region,
            state_dir,
            debug,
        } => {
            run_up(
                service_account_key,
                project_id,
                zone,
                region,
                state_dir,
                debug,
            )
            .await
        }
    };

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_up(
    service_account_key: Option<PathBuf>,
    project_id: Option<String>,
    zone: Option<String>,
    region: Option<String>,
    state_dir: PathBuf,
    debug: bool,
) -> anyhow::Result<()> {
    let store = FileStateStore::new(&state_dir);
    let state = store.load()?;

    let subprocess = SubprocessManager::production();
    let runner = subprocess.runner();

    let gcloud = Arc::new(GcloudClient::new(runner.clone()));
    let strings = Arc::new(RandStringGenerator);
    let terraform_cmd = Cmd::new(runner.clone(), sink(io::stderr()));

    let up = GcpUp::new(GcpUpDeps {
        state_store: Arc::new(store),
        key_pair_updater: Arc::new(Ed25519KeyPairUpdater::new(gcloud.clone())),
        client_provider: gcloud,
        executor: Arc::new(CmdExecutor::new(terraform_cmd, sink(io::stdout()), debug)),
        outputter: Arc::new(CmdOutputter::new(runner.clone())),
        deployer: Arc::new(BoshInitDeployer::new(runner, strings.clone())),
        strings,
        director_clients: Arc::new(HttpClientProvider),
        cloud_config_generator: Arc::new(GcpCloudConfigGenerator),
        zones: Arc::new(RegionZones),
    });

    let config = UpConfig {
        service_account_key_path: service_account_key
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default(),
        project_id: project_id.unwrap_or_default(),
        zone: zone.unwrap_or_default(),
        region: region.unwrap_or_default(),
    };

    up.execute(config, state).await
}
