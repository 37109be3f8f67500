//! Startup and task orchestration
//!
//! Phase 1 refreshes both caches once, sequentially, so the node stream
//! starts against populated lookup tables (best effort; an empty hub is
//! still valid). Phase 2 runs the three long-lived tasks: two cache refresh
//! loops and the node watch loop.

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::task::JoinHandle;
use tokio::try_join;
use tracing::{info, warn};

use crate::cache::{CredentialCache, NodepoolCache};
use crate::config::Settings;
use crate::downstream::DownstreamPatcher;
use crate::reconcile::{self, NodeReconciler};

/// Pause between refresh passes after one fails, so an unreachable hub is
/// retried at a measured pace instead of back-to-back
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Spawn the credential cache refresh loop
pub fn spawn_credential_refresher(
    client: Client,
    cache: CredentialCache,
    settings: Settings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if !cache.refresh(client.clone(), settings.watch_timeout).await {
                tokio::time::sleep(REFRESH_RETRY_DELAY).await;
            }
        }
    })
}

/// Spawn the nodepool cache refresh loop
pub fn spawn_nodepool_refresher(
    client: Client,
    cache: NodepoolCache,
    settings: Settings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if !cache.refresh(client.clone(), settings.watch_timeout).await {
                tokio::time::sleep(REFRESH_RETRY_DELAY).await;
            }
        }
    })
}

/// Spawn the node watch loop
pub fn spawn_node_watcher(
    client: Client,
    reconciler: Arc<NodeReconciler<DownstreamPatcher>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        reconcile::run_node_stream(client, reconciler).await;
    })
}

/// Run the controller until one of its tasks stops
pub async fn run(client: Client, settings: Settings) -> anyhow::Result<()> {
    let credentials = CredentialCache::new();
    let pools = NodepoolCache::new();

    // Phase 1: one bounded refresh of each cache before any node decision
    info!("bootstrapping caches");
    credentials
        .refresh(client.clone(), settings.watch_timeout)
        .await;
    pools.refresh(client.clone(), settings.watch_timeout).await;
    if credentials.is_empty() {
        warn!("no member cluster credentials observed during bootstrap");
    }

    let patcher = DownstreamPatcher::new(&settings);
    let reconciler = Arc::new(NodeReconciler::new(
        pools.clone(),
        credentials.clone(),
        settings.clone(),
        patcher,
    ));

    // Phase 2: long-lived tasks, one per watched resource kind
    info!(
        clusters = credentials.len(),
        nodepools = pools.len(),
        "starting watch tasks"
    );
    let cred_task = spawn_credential_refresher(client.clone(), credentials, settings.clone());
    let pool_task = spawn_nodepool_refresher(client.clone(), pools, settings.clone());
    let node_task = spawn_node_watcher(client, reconciler);

    try_join!(cred_task, pool_task, node_task)?;
    Ok(())
}
