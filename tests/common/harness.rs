//! tests/common/harness.rs
//!
//! An in-process test harness for exercising full `NodeRuntime` instances
//! against one another without the cost of real QUIC connections and
//! certificates. Each node gets an `InProcessTransport` that looks peers up
//! by address in a registry shared across the cluster and delivers RPCs
//! directly onto the target node's inbound channel.

use lachesis_node::error::{Error, Result};
use lachesis_node::node::NodeRuntime;
use lachesis_node::stats::Stats;
use lachesis_node::testkit::{EchoAppProxy, InMemoryCore};
use lachesis_node::transport::Transport;
use lachesis_node::wire::{
    Command, EagerSyncRequest, EagerSyncResponse, ParticipantId, ParticipantSet, Rpc, RpcResponse,
    SyncRequest, SyncResponse,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

type Registry = Arc<StdMutex<HashMap<String, mpsc::Sender<Rpc>>>>;

/// A `Transport` that routes calls through an in-memory registry instead of
/// a real socket. Removing a node's entry from the registry simulates it
/// going unreachable without tearing its task down.
pub struct InProcessTransport {
    local_addr: String,
    registry: Registry,
    inbound_rx: Option<mpsc::Receiver<Rpc>>,
}

impl InProcessTransport {
    async fn call(&self, target: &str, command: Command) -> Result<RpcResponse> {
        let sender = {
            let registry = self.registry.lock().unwrap();
            registry.get(target).cloned()
        }
        .ok_or(Error::NoPeer)?;

        let (respond_to, response_rx) = oneshot::channel();
        sender
            .send(Rpc { command, respond_to })
            .await
            .map_err(|_| Error::ChannelClosed)?;

        tokio::time::timeout(Duration::from_secs(2), response_rx)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::ChannelClosed)
    }
}

#[async_trait::async_trait]
impl Transport for InProcessTransport {
    fn local_addr(&self) -> String {
        self.local_addr.clone()
    }

    fn consumer(&mut self) -> mpsc::Receiver<Rpc> {
        self.inbound_rx.take().expect("consumer taken more than once")
    }

    async fn sync(&self, target: &str, req: SyncRequest) -> Result<SyncResponse> {
        match self.call(target, Command::Sync(req)).await? {
            RpcResponse::Sync(resp) => Ok(resp),
            _ => Err(Error::Core("peer returned mismatched response variant".into())),
        }
    }

    async fn eager_sync(&self, target: &str, req: EagerSyncRequest) -> Result<EagerSyncResponse> {
        match self.call(target, Command::EagerSync(req)).await? {
            RpcResponse::EagerSync(resp) => Ok(resp),
            _ => Err(Error::Core("peer returned mismatched response variant".into())),
        }
    }

    async fn close(&self) {}
}

/// A running cluster member: its own consensus core (for assertions), a way
/// to submit transactions, and the handles needed to tear it down or sever
/// it from the rest of the cluster.
pub struct TestNode {
    pub id: ParticipantId,
    pub address: String,
    pub core: Arc<Mutex<InMemoryCore>>,
    pub stats: Arc<Stats<InMemoryCore>>,
    pub submit_tx: mpsc::Sender<Vec<u8>>,
    pub shutdown: CancellationToken,
    pub task: tokio::task::JoinHandle<()>,
    registry: Registry,
}

impl TestNode {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Removes this node from the shared registry so peers calling it
    /// observe `Error::NoPeer`, without touching its own task.
    pub fn sever(&self) {
        self.registry.lock().unwrap().remove(&self.address);
    }
}

/// Builds and starts a cluster of `n` nodes sharing one `ParticipantSet`,
/// wired together through an in-process RPC registry. All nodes use the
/// in-memory consensus core and the echoing application proxy.
pub async fn build_cluster(n: usize, heartbeat: Duration, sync_limit: usize) -> Vec<TestNode> {
    let addresses: Vec<String> = (0..n).map(|i| format!("node-{i}")).collect();
    let participants = ParticipantSet::new(addresses.iter().cloned().zip(0..n as ParticipantId));

    let registry: Registry = Arc::new(StdMutex::new(HashMap::new()));
    let mut nodes = Vec::with_capacity(n);

    for (i, address) in addresses.iter().enumerate() {
        let id = i as ParticipantId;
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        registry.lock().unwrap().insert(address.clone(), inbound_tx);

        let transport = InProcessTransport {
            local_addr: address.clone(),
            registry: registry.clone(),
            inbound_rx: Some(inbound_rx),
        };

        let (submit_tx, submit_rx) = mpsc::channel(64);
        let proxy = EchoAppProxy::new(submit_rx);

        let (commit_tx, commit_rx) = mpsc::channel(400);
        let core = InMemoryCore::new(id, participants.clone()).with_commit_channel(commit_tx);

        let shutdown = CancellationToken::new();
        let runtime = NodeRuntime::new(id, core, transport, proxy, commit_rx, heartbeat, sync_limit, shutdown.clone());
        runtime.init(false).await.expect("init should not fail");
        let core_handle = runtime.core_handle();
        let stats_handle = runtime.stats_handle();

        let task = tokio::spawn(runtime.run());

        nodes.push(TestNode {
            id,
            address: address.clone(),
            core: core_handle,
            stats: stats_handle,
            submit_tx,
            shutdown,
            task,
            registry: registry.clone(),
        });
    }

    nodes
}

/// Polls `condition` until it returns `true` or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration, poll_every: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll_every).await;
    }
}
