//! src/rpc.rs
//!
//! `RPCHandler`: dispatches inbound sync / eager-sync requests against the
//! shared consensus core. Each RPC is answered exactly once; outside the
//! `Gossiping` state the core is never touched.

use crate::core::Core;
use crate::state::{NodeState, State};
use crate::wire::{
    Command, EagerSyncRequest, EagerSyncResponse, ParticipantId, Rpc, RpcResponse, SyncRequest,
    SyncResponse,
};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct RpcHandler<C: Core> {
    id: ParticipantId,
    core: Arc<Mutex<C>>,
    state: Arc<NodeState>,
    sync_limit: usize,
}

impl<C: Core> RpcHandler<C> {
    pub fn new(id: ParticipantId, core: Arc<Mutex<C>>, state: Arc<NodeState>, sync_limit: usize) -> Self {
        Self {
            id,
            core,
            state,
            sync_limit,
        }
    }

    /// Handles one inbound RPC and sends exactly one response.
    pub async fn process_rpc(&self, rpc: Rpc) {
        let response = match rpc.command {
            Command::Sync(req) => RpcResponse::Sync(self.process_sync_request(req).await),
            Command::EagerSync(req) => {
                RpcResponse::EagerSync(self.process_eager_sync_request(req).await)
            }
        };
        if rpc.respond_to.send(response).is_err() {
            tracing::debug!("RPC caller dropped response channel before reply was sent");
        }
    }

    async fn process_sync_request(&self, req: SyncRequest) -> SyncResponse {
        if self.state.get() != State::Gossiping {
            tracing::debug!(from = req.from_id, state = %self.state.get(), "sync request rejected: not ready");
            return SyncResponse {
                from_id: self.id,
                ..Default::default()
            };
        }

        let mut first_error: Option<String> = None;

        let over_limit = {
            let core = self.core.lock().await;
            core.over_sync_limit(&req.known, self.sync_limit)
        };

        let events = if over_limit {
            Vec::new()
        } else {
            let diff = {
                let core = self.core.lock().await;
                core.event_diff(&req.known)
            };
            match diff {
                Ok(events) => {
                    let core = self.core.lock().await;
                    match core.to_wire(&events) {
                        Ok(wire) => wire,
                        Err(e) => {
                            first_error = Some(e.to_string());
                            Vec::new()
                        }
                    }
                }
                Err(e) => {
                    first_error = Some(e.to_string());
                    Vec::new()
                }
            }
        };

        let known = {
            let core = self.core.lock().await;
            core.known_events()
        };

        if let Some(err) = &first_error {
            tracing::warn!(peer = req.from_id, error = %err, "sync request produced an error");
        }

        SyncResponse {
            from_id: self.id,
            known,
            sync_limit: over_limit,
            events,
        }
    }

    async fn process_eager_sync_request(&self, req: EagerSyncRequest) -> EagerSyncResponse {
        if self.state.get() != State::Gossiping {
            tracing::debug!(from = req.from_id, state = %self.state.get(), "eager sync rejected: not ready");
            return EagerSyncResponse {
                from_id: self.id,
                success: false,
            };
        }

        let result = {
            let mut core = self.core.lock().await;
            crate::gossip::sync(&mut *core, req.events).await
        };

        match result {
            Ok(()) => EagerSyncResponse {
                from_id: self.id,
                success: true,
            },
            Err(e) => {
                tracing::warn!(from = req.from_id, error = %e, "eager sync failed");
                EagerSyncResponse {
                    from_id: self.id,
                    success: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::InMemoryCore;
    use crate::wire::ParticipantSet;

    fn core(sync_limit: usize) -> (Arc<Mutex<InMemoryCore>>, RpcHandler<InMemoryCore>) {
        let participants = ParticipantSet::new([("a".to_string(), 0), ("b".to_string(), 1)]);
        let core = Arc::new(Mutex::new(InMemoryCore::new(0, participants)));
        let state = Arc::new(NodeState::new());
        let handler = RpcHandler::new(0, core.clone(), state, sync_limit);
        (core, handler)
    }

    #[tokio::test]
    async fn sync_request_rejected_outside_gossiping() {
        let (_core, handler) = core(10);
        handler.state.set(State::CatchingUp);
        let resp = handler
            .process_sync_request(SyncRequest {
                from_id: 1,
                known: Default::default(),
            })
            .await;
        assert_eq!(resp.from_id, 0);
        assert!(resp.events.is_empty());
    }

    #[tokio::test]
    async fn eager_sync_applies_events() {
        let (core, handler) = core(10);
        let resp = handler
            .process_eager_sync_request(EagerSyncRequest {
                from_id: 1,
                events: Vec::new(),
            })
            .await;
        assert!(resp.success);
        assert_eq!(core.lock().await.consensus_events().len(), 0);
    }
}
