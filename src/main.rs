//! src/main.rs
//!
//! Binary entry point. Wires a demo node around the in-memory consensus
//! core and echo application proxy, backed by the real QUIC transport, and
//! runs it until Ctrl+C.

use anyhow::Context;
use lachesis_node::api::ApiServer;
use lachesis_node::config::Config;
use lachesis_node::identity::Identity;
use lachesis_node::node::NodeRuntime;
use lachesis_node::testkit::{EchoAppProxy, InMemoryCore};
use lachesis_node::transport::QuicTransport;
use lachesis_node::wire::ParticipantSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load().context("failed to load configuration")?;
    let identity = Identity::from_file(&config.identity_path).context("failed to load identity")?;

    tracing::info!(node_id = %identity.node_id, bind_addr = %config.bind_addr, "starting node");

    let mut participants = vec![(config.bind_addr.to_string(), 0u64)];
    for (i, peer) in config.bootstrap_peers.iter().enumerate() {
        participants.push((peer.to_string(), (i + 1) as u64));
    }
    let participants = ParticipantSet::new(participants);
    let self_id = participants.id_for(&config.bind_addr.to_string()).unwrap_or(0);

    let shutdown = CancellationToken::new();
    let transport = QuicTransport::new(config.bind_addr, shutdown.clone()).context("failed to start transport")?;

    let (commit_tx, commit_rx) = mpsc::channel(400);
    let core = InMemoryCore::new(self_id, participants).with_commit_channel(commit_tx);

    let (submit_tx, submit_rx) = mpsc::channel(64);
    let proxy = EchoAppProxy::new(submit_rx);
    drop(submit_tx);

    let runtime = NodeRuntime::new(
        self_id,
        core,
        transport,
        proxy,
        commit_rx,
        Duration::from_millis(config.heartbeat_timeout_ms),
        config.sync_limit,
        shutdown.clone(),
    );

    runtime
        .init(!config.bootstrap_peers.is_empty())
        .await
        .context("failed to initialize core")?;

    let api_task = config.stats_api.as_ref().map(|api_config| {
        let api = ApiServer::new(api_config.bind_addr, runtime.stats_handle());
        let api_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api.run(api_shutdown).await {
                tracing::error!(error = %e, "stats API server failed");
            }
        })
    });

    let node_task = tokio::spawn(runtime.run());

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    tracing::info!("received Ctrl+C, shutting down");
    shutdown.cancel();

    let _ = node_task.await;
    if let Some(api_task) = api_task {
        let _ = api_task.await;
    }

    Ok(())
}
