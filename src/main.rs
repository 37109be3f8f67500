//! Nodepool labeler - controller entrypoint

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use kube::Client;
use nodepool_labeler::config::Settings;
use nodepool_labeler::runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodepool-labeler")]
#[command(author, version, about = "Labels downstream cluster nodes with their nodepool", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// default: WARN, -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Label key written with the nodepool hostname prefix
    #[arg(long, env = "NODEPOOL_LABEL", default_value = "cattle.io/nodepool")]
    nodepool_label: String,

    /// Manage the preemptible label/taint lifecycle
    #[arg(long, env = "PREEMPTIBLE")]
    preemptible: bool,

    /// Gate label a node must carry to enter preemptible handling
    #[arg(long, env = "PREPARE_LABEL", default_value = "prepare-preemptible")]
    prepare_label: String,

    /// Label key marking a node as preemptible
    #[arg(long, env = "PREEMPTIBLE_LABEL", default_value = "preemptible")]
    preemptible_label: String,

    /// Hours after node creation before the preemptible transition fires
    #[arg(long, env = "PREEMPTIBLE_DELAY_HOURS", default_value_t = 23)]
    preemptible_delay_hours: u32,

    /// Budget in seconds for one bounded cache-refresh watch pass
    #[arg(long, env = "WATCH_TIMEOUT_SECONDS", default_value_t = 10)]
    watch_timeout_seconds: u64,

    /// Budget in seconds for a single downstream node patch
    #[arg(long, env = "PATCH_TIMEOUT_SECONDS", default_value_t = 30)]
    patch_timeout_seconds: u64,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            nodepool_label: self.nodepool_label.clone(),
            preemptible: self.preemptible,
            prepare_label: self.prepare_label.clone(),
            preemptible_label: self.preemptible_label.clone(),
            preemptible_delay_hours: self.preemptible_delay_hours,
            watch_timeout: Duration::from_secs(self.watch_timeout_seconds),
            patch_timeout: Duration::from_secs(self.patch_timeout_seconds),
            ..Default::default()
        }
    }
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity level; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(cli.verbose)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = cli.settings();
    info!(
        nodepool_label = %settings.nodepool_label,
        preemptible = settings.preemptible,
        "starting nodepool-labeler"
    );

    // In-cluster service account config, or kubeconfig when run locally
    let client = Client::try_default().await?;
    runtime::run(client, settings).await
}
