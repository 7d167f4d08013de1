//! src/wire.rs
//!
//! Data model exchanged between nodes and with the consensus core: the
//! participant set, known-events digests, blocks, and the RPC envelope
//! carried over the transport.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// A participant's id within a fixed, ordered participant set.
pub type ParticipantId = u64;

/// The fixed mapping from participant network address to participant id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantSet {
    by_address: BTreeMap<String, ParticipantId>,
}

impl ParticipantSet {
    pub fn new(participants: impl IntoIterator<Item = (String, ParticipantId)>) -> Self {
        Self {
            by_address: participants.into_iter().collect(),
        }
    }

    pub fn id_for(&self, addr: &str) -> Option<ParticipantId> {
        self.by_address.get(addr).copied()
    }

    pub fn address_for(&self, id: ParticipantId) -> Option<&str> {
        self.by_address
            .iter()
            .find(|(_, &pid)| pid == id)
            .map(|(addr, _)| addr.as_str())
    }

    pub fn addresses(&self) -> impl Iterator<Item = (&str, ParticipantId)> {
        self.by_address.iter().map(|(a, &id)| (a.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Per-participant highest known event index. `-1` means "nothing known yet".
pub type KnownEvents = BTreeMap<ParticipantId, i64>;

/// The wire encoding of a consensus event, opaque to the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent(pub Vec<u8>);

/// Signature over a decided block, attached after the application commits it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub validator: ParticipantId,
    pub block_index: u64,
    pub signature: Vec<u8>,
}

/// The mutable, application-populated part of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub state_hash: Vec<u8>,
}

/// A decided block as handed to the application and back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub round_received: i64,
    pub transactions: Vec<Vec<u8>>,
    pub body: BlockBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from_id: ParticipantId,
    pub known: KnownEvents,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    pub from_id: ParticipantId,
    pub known: KnownEvents,
    pub sync_limit: bool,
    pub events: Vec<WireEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EagerSyncRequest {
    pub from_id: ParticipantId,
    pub events: Vec<WireEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EagerSyncResponse {
    pub from_id: ParticipantId,
    pub success: bool,
}

/// The command carried by an inbound RPC.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    Sync(SyncRequest),
    EagerSync(EagerSyncRequest),
}

/// The response to an inbound RPC, sent back exactly once.
#[derive(Debug)]
pub enum RpcResponse {
    Sync(SyncResponse),
    EagerSync(EagerSyncResponse),
}

/// An inbound RPC paired with a one-shot channel for its single response.
#[derive(Debug)]
pub struct Rpc {
    pub command: Command,
    pub respond_to: oneshot::Sender<RpcResponse>,
}
