//! src/gossip.rs
//!
//! The outbound gossip round (pull-then-push) and the `sync` helper shared
//! with the inbound eager-sync path.

use crate::core::Core;
use crate::error::Result;
use crate::state::{NodeState, State};
use crate::stats::Counters;
use crate::transport::Transport;
use crate::wire::{EagerSyncRequest, ParticipantId, SyncRequest, WireEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Inserts a batch of peer-supplied events and advances consensus ordering.
/// The caller must already hold the core lock; this is not itself
/// re-entrant.
pub async fn sync<C: Core>(core: &mut C, events: Vec<WireEvent>) -> Result<()> {
    core.sync(events).await?;
    core.run_consensus().await?;
    Ok(())
}

pub struct GossipDriver<C: Core, T: Transport> {
    id: ParticipantId,
    core: Arc<Mutex<C>>,
    transport: Arc<T>,
    state: Arc<NodeState>,
    sync_limit: usize,
    counters: Arc<Counters>,
}

impl<C: Core, T: Transport> GossipDriver<C, T> {
    pub fn new(
        id: ParticipantId,
        core: Arc<Mutex<C>>,
        transport: Arc<T>,
        state: Arc<NodeState>,
        sync_limit: usize,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            id,
            core,
            transport,
            state,
            sync_limit,
            counters,
        }
    }

    /// Folds pending transactions into a new self-event if there is
    /// anything worth gossiping. Returns `false` when the round should be
    /// skipped entirely.
    pub async fn pre_gossip(&self) -> Result<bool> {
        let mut core = self.core.lock().await;
        if !core.need_gossip() && !self.state.is_starting() {
            return Ok(false);
        }
        core.add_self_event().await?;
        Ok(true)
    }

    /// Runs one full pull-then-push round against `peer_addr`.
    pub async fn gossip(&self, peer_addr: &str) -> Result<()> {
        let result = self.run_round(peer_addr).await;
        if let Err(e) = &result {
            self.counters.sync_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(peer = peer_addr, error = %e, "gossip round failed");
        }
        self.state.clear_starting();
        result
    }

    async fn run_round(&self, peer_addr: &str) -> Result<()> {
        let known = { self.core.lock().await.known_events() };

        self.counters.sync_requests.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .transport
            .sync(peer_addr, SyncRequest { from_id: self.id, known })
            .await?;

        if resp.sync_limit {
            tracing::info!(peer = peer_addr, "peer reports we are over the sync limit");
            self.state.set(State::CatchingUp);
            return Ok(());
        }

        {
            let mut core = self.core.lock().await;
            sync(&mut *core, resp.events).await?;
        }

        let (over_limit, wire_events) = {
            let core = self.core.lock().await;
            let over_limit = core.over_sync_limit(&resp.known, self.sync_limit);
            if over_limit {
                (true, Vec::new())
            } else {
                let diff = core.event_diff(&resp.known)?;
                (false, core.to_wire(&diff)?)
            }
        };

        if over_limit {
            tracing::debug!(peer = peer_addr, "peer is over the sync limit, skipping push");
            return Ok(());
        }

        match self
            .transport
            .eager_sync(peer_addr, EagerSyncRequest { from_id: self.id, events: wire_events })
            .await
        {
            Ok(eager_resp) if !eager_resp.success => {
                tracing::warn!(peer = peer_addr, "peer reported an eager sync failure");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(peer = peer_addr, error = %e, "eager sync call failed");
            }
        }

        Ok(())
    }
}
