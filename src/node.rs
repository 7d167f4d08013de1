//! src/node.rs
//!
//! `NodeRuntime`: wires the consensus core, transport, application proxy,
//! and control timer into two cooperating loops. A background dispatcher
//! answers inbound RPCs, drains submitted transactions, and feeds decided
//! blocks to the commit pipeline. Concurrently, a state-machine loop drives
//! outbound gossip rounds while `Gossiping`, or runs the fast-forward stub
//! while `CatchingUp`.

use crate::commit::CommitPipeline;
use crate::core::Core;
use crate::error::Result;
use crate::gossip::GossipDriver;
use crate::peer::PeerSelector;
use crate::proxy::AppProxy;
use crate::rpc::RpcHandler;
use crate::state::{NodeState, State};
use crate::stats::{Counters, Stats};
use crate::timer::{self, ControlTimerCommands};
use crate::transport::Transport;
use crate::wire::{Block, ParticipantId, Rpc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tracks spawned gossip-round tasks so shutdown can await their completion
/// instead of leaving them detached.
#[derive(Default)]
struct RoutineTracker {
    handles: Vec<JoinHandle<()>>,
}

impl RoutineTracker {
    fn new() -> Self {
        Self::default()
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.handles.retain(|h| !h.is_finished());
        self.handles.push(handle);
    }

    async fn join_all(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "gossip round task panicked");
            }
        }
    }
}

/// A single participant's node runtime: the consensus core plus the gossip,
/// RPC, commit, and stats machinery wrapped around it.
pub struct NodeRuntime<C: Core, T: Transport, A: AppProxy> {
    id: ParticipantId,
    core: Arc<Mutex<C>>,
    state: Arc<NodeState>,
    peer_selector: Arc<PeerSelector>,
    transport: Arc<T>,
    rpc_handler: Arc<RpcHandler<C>>,
    gossip_driver: Arc<GossipDriver<C, T>>,
    commit_pipeline: Arc<CommitPipeline<C, A>>,
    stats: Arc<Stats<C>>,
    heartbeat: Duration,
    rpc_rx: mpsc::Receiver<Rpc>,
    submit_rx: mpsc::Receiver<Vec<u8>>,
    commit_rx: mpsc::Receiver<Block>,
    shutdown: CancellationToken,
}

impl<C: Core, T: Transport, A: AppProxy> NodeRuntime<C, T, A> {
    /// Builds a runtime from an already-constructed core, transport, and
    /// app proxy. Takes the transport's inbound-RPC receiver and the proxy's
    /// submit receiver, so neither must be taken by the caller beforehand.
    pub fn new(
        id: ParticipantId,
        core: C,
        mut transport: T,
        mut proxy: A,
        commit_rx: mpsc::Receiver<Block>,
        heartbeat: Duration,
        sync_limit: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let participants = core.participants().clone();
        let state = Arc::new(NodeState::new());
        let counters = Arc::new(Counters::new());

        let rpc_rx = transport.consumer();
        let submit_rx = proxy.submit_ch();

        let core = Arc::new(Mutex::new(core));
        let transport = Arc::new(transport);
        let proxy = Arc::new(proxy);

        let peer_selector = Arc::new(PeerSelector::new(&participants, id));
        let num_peers = peer_selector.peers().len();

        let rpc_handler = Arc::new(RpcHandler::new(id, core.clone(), state.clone(), sync_limit));
        let gossip_driver = Arc::new(GossipDriver::new(
            id,
            core.clone(),
            transport.clone(),
            state.clone(),
            sync_limit,
            counters.clone(),
        ));
        let commit_pipeline = Arc::new(CommitPipeline::new(core.clone(), proxy));
        let stats = Arc::new(Stats::new(
            id,
            core.clone(),
            state.clone(),
            counters,
            num_peers,
            heartbeat.as_secs_f64(),
        ));

        Self {
            id,
            core,
            state,
            peer_selector,
            transport,
            rpc_handler,
            gossip_driver,
            commit_pipeline,
            stats,
            heartbeat,
            rpc_rx,
            submit_rx,
            commit_rx,
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state_handle(&self) -> Arc<NodeState> {
        self.state.clone()
    }

    pub fn stats_handle(&self) -> Arc<Stats<C>> {
        self.stats.clone()
    }

    /// Exposes the shared core lock, mainly for test and demo introspection
    /// of committed state.
    pub fn core_handle(&self) -> Arc<Mutex<C>> {
        self.core.clone()
    }

    /// Brings the consensus core up: replays persisted events when
    /// `bootstrap` is set, otherwise starts from an empty state.
    pub async fn init(&self, bootstrap: bool) -> Result<()> {
        let mut core = self.core.lock().await;
        if bootstrap {
            core.bootstrap().await
        } else {
            core.init().await
        }
    }

    /// Requests shutdown. Idempotent; safe to call from any task holding a
    /// clone of the shutdown token.
    pub fn request_shutdown(&self) {
        self.state.set(State::Shutdown);
        self.shutdown.cancel();
    }

    /// Runs the node until shutdown is requested, then closes the
    /// transport. Consumes the runtime.
    pub async fn run(self) {
        let (timer_commands, ticks) = timer::spawn(self.heartbeat, self.shutdown.clone());

        let dispatcher = tokio::spawn(Self::background_dispatcher(
            self.core.clone(),
            self.rpc_handler.clone(),
            self.commit_pipeline.clone(),
            self.rpc_rx,
            self.submit_rx,
            self.commit_rx,
            timer_commands.clone(),
            self.shutdown.clone(),
        ));

        Self::state_machine_loop(
            self.core.clone(),
            self.state.clone(),
            self.peer_selector.clone(),
            self.gossip_driver.clone(),
            timer_commands,
            ticks,
            self.shutdown.clone(),
        )
        .await;

        if let Err(e) = dispatcher.await {
            tracing::warn!(error = %e, "background dispatcher task panicked");
        }

        self.transport.close().await;
        tracing::info!(id = self.id, "node runtime shut down");
    }

    async fn background_dispatcher(
        core: Arc<Mutex<C>>,
        rpc_handler: Arc<RpcHandler<C>>,
        commit_pipeline: Arc<CommitPipeline<C, A>>,
        mut rpc_rx: mpsc::Receiver<Rpc>,
        mut submit_rx: mpsc::Receiver<Vec<u8>>,
        mut commit_rx: mpsc::Receiver<Block>,
        timer_commands: ControlTimerCommands,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("background dispatcher received shutdown signal");
                    break;
                }
                Some(rpc) = rpc_rx.recv() => {
                    rpc_handler.process_rpc(rpc).await;
                    Self::reset_if_needed(&core, &timer_commands).await;
                }
                Some(tx) = submit_rx.recv() => {
                    if let Err(e) = core.lock().await.submit_transaction(tx).await {
                        tracing::warn!(error = %e, "failed to submit transaction");
                    }
                    Self::reset_if_needed(&core, &timer_commands).await;
                }
                Some(mut block) = commit_rx.recv() => {
                    commit_pipeline.process_block(&mut block).await;
                }
                else => {
                    tracing::info!("all dispatcher channels closed, background dispatcher exiting");
                    break;
                }
            }
        }
    }

    /// Resets the control timer when fresh activity has made the core worth
    /// gossiping about sooner than the next scheduled tick.
    async fn reset_if_needed(core: &Arc<Mutex<C>>, timer_commands: &ControlTimerCommands) {
        if core.lock().await.need_gossip() {
            timer_commands.reset().await;
        }
    }

    async fn state_machine_loop(
        core: Arc<Mutex<C>>,
        state: Arc<NodeState>,
        peer_selector: Arc<PeerSelector>,
        gossip_driver: Arc<GossipDriver<C, T>>,
        timer_commands: ControlTimerCommands,
        mut ticks: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) {
        let mut tracker = RoutineTracker::new();
        loop {
            match state.get() {
                State::Gossiping => {
                    Self::lachesis_loop(
                        &core,
                        &state,
                        &peer_selector,
                        &gossip_driver,
                        &timer_commands,
                        &mut ticks,
                        &shutdown,
                        &mut tracker,
                    )
                    .await;
                }
                State::CatchingUp => Self::fast_forward(&state).await,
                State::Shutdown => break,
            }
        }
        tracker.join_all().await;
    }

    /// Drives outbound gossip rounds while the node remains in the
    /// `Gossiping` state, returning as soon as the state changes.
    #[allow(clippy::too_many_arguments)]
    async fn lachesis_loop(
        core: &Arc<Mutex<C>>,
        state: &Arc<NodeState>,
        peer_selector: &Arc<PeerSelector>,
        gossip_driver: &Arc<GossipDriver<C, T>>,
        timer_commands: &ControlTimerCommands,
        ticks: &mut mpsc::Receiver<()>,
        shutdown: &CancellationToken,
        tracker: &mut RoutineTracker,
    ) {
        while state.get() == State::Gossiping {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    state.set(State::Shutdown);
                    return;
                }
                tick = ticks.recv() => {
                    if tick.is_none() {
                        return;
                    }

                    match gossip_driver.pre_gossip().await {
                        Ok(true) => {
                            if let Some((peer_id, addr)) = peer_selector.next() {
                                peer_selector.update_last(peer_id);
                                let driver = gossip_driver.clone();
                                tracker.track(tokio::spawn(async move {
                                    if let Err(e) = driver.gossip(&addr).await {
                                        tracing::debug!(peer = peer_id, error = %e, "gossip round ended with an error");
                                    }
                                }));
                            }
                        }
                        Ok(false) => {}
                        Err(e) => tracing::warn!(error = %e, "pre-gossip step failed"),
                    }

                    if core.lock().await.need_gossip() {
                        timer_commands.reset().await;
                    } else {
                        timer_commands.stop().await;
                    }
                }
            }
        }
    }

    /// Catch-up is a stub: real nodes would transfer a state snapshot here.
    /// This simply returns to ordinary gossip, relying on the sync protocol
    /// to close the gap one round at a time.
    async fn fast_forward(state: &Arc<NodeState>) {
        tracing::info!("fast-forward requested; resuming ordinary gossip instead of a state transfer");
        state.set(State::Gossiping);
    }
}
