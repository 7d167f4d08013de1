//! src/core.rs
//!
//! The `Core` trait: the consensus engine boundary. Everything about how
//! events are ordered, witnesses elected, and rounds decided lives behind
//! this trait; the runtime treats `Event`, `Round`, `Root`, and `RoundInfo`
//! as opaque and only moves them around.

use crate::error::Result;
use crate::wire::{Block, BlockSignature, KnownEvents, ParticipantSet, WireEvent};

/// The consensus core consumed by the node runtime. All mutating methods are
/// expected to be called with the caller already holding the single core
/// lock (see `node::NodeRuntime`); `Core` itself performs no locking.
#[async_trait::async_trait]
pub trait Core: Send + Sync + 'static {
    type Event: Send + Sync;
    type Round: Send + Sync;
    type Root: Send + Sync;
    type RoundInfo: Send + Sync;

    fn participants(&self) -> &ParticipantSet;

    /// Fresh start: no persisted events to replay.
    async fn init(&mut self) -> Result<()>;

    /// Recompute consensus state from persisted events.
    async fn bootstrap(&mut self) -> Result<()>;

    /// Fold any pending transactions into a new self-event, emptying the pool.
    async fn add_self_event(&mut self) -> Result<()>;

    /// Insert a batch of peer-supplied events into the DAG.
    async fn sync(&mut self, events: Vec<WireEvent>) -> Result<()>;

    /// Advance consensus ordering; may emit decided blocks as a side effect.
    async fn run_consensus(&mut self) -> Result<()>;

    /// Produce this node's signature over a decided block.
    async fn sign_block(&mut self, block: &Block) -> Result<BlockSignature>;

    /// Attach a (possibly remote) signature for eventual gossip.
    async fn add_block_signature(&mut self, sig: BlockSignature) -> Result<()>;

    /// Append a raw transaction payload to the pending pool.
    async fn submit_transaction(&mut self, tx: Vec<u8>) -> Result<()>;

    /// Whether there is anything worth gossiping right now.
    fn need_gossip(&self) -> bool;

    /// This node's own "have" digest.
    fn known_events(&self) -> KnownEvents;

    /// Whether a peer described by `known` is far enough behind that a
    /// normal diff would be wasteful.
    fn over_sync_limit(&self, known: &KnownEvents, limit: usize) -> bool;

    /// Events this node has that the peer (described by `known`) does not.
    fn event_diff(&self, known: &KnownEvents) -> Result<Vec<Self::Event>>;

    /// Serialize events to their wire form.
    fn to_wire(&self, events: &[Self::Event]) -> Result<Vec<WireEvent>>;

    fn get_event(&self, id: &str) -> Option<Self::Event>;
    fn last_event_from(&self, participant: crate::wire::ParticipantId) -> Option<String>;
    fn consensus_events(&self) -> Vec<String>;
    fn get_round(&self, round: i64) -> Option<Self::RoundInfo>;
    fn last_round(&self) -> i64;
    fn round_witnesses(&self, round: i64) -> Vec<String>;
    fn round_events(&self, round: i64) -> usize;
    fn get_root(&self, participant: crate::wire::ParticipantId) -> Option<Self::Root>;
    fn get_block(&self, index: u64) -> Option<Block>;
    fn transaction_pool_len(&self) -> usize;

    /// Index of the most recently decided block. `None` until the first
    /// block has been decided; distinct from the DAG's total event count.
    fn last_block_index(&self) -> Option<u64>;

    /// `None` until the first round has been decided.
    fn last_consensus_round(&self) -> Option<i64>;
    fn consensus_transactions(&self) -> usize;
    fn undetermined_events(&self) -> usize;
}
