//! src/testkit.rs
//!
//! An in-memory, non-production `Core` and `AppProxy` used to exercise the
//! runtime end to end in tests and in the demo binary. This is explicitly
//! NOT a hashgraph implementation: consensus is approximated by "a round is
//! decided once every participant has contributed an event since the last
//! one", which is enough to drive the commit pipeline without claiming to
//! be a real ordering algorithm.

use crate::core::Core;
use crate::error::Result;
use crate::proxy::{AppProxy, CommitResult};
use crate::wire::{Block, BlockBody, BlockSignature, KnownEvents, ParticipantId, ParticipantSet, WireEvent};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::mpsc;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEvent {
    pub creator: ParticipantId,
    pub index: i64,
    pub transactions: Vec<Vec<u8>>,
}

impl StoredEvent {
    fn wire_id(&self) -> String {
        format!("{}:{}", self.creator, self.index)
    }
}

pub struct InMemoryCore {
    id: ParticipantId,
    participants: ParticipantSet,
    events: Vec<StoredEvent>,
    pending_tx: Vec<Vec<u8>>,
    blocks: Vec<Block>,
    signatures: HashMap<u64, Vec<BlockSignature>>,
    last_committed_event_count: usize,
    last_consensus_round: Option<i64>,
    commit_tx: Option<mpsc::Sender<Block>>,
    /// Highest self-authored event index known to have been included in a
    /// diff handed to some peer or sync requester. Tracks "seen by anyone
    /// else" separately from "exists locally" so `need_gossip` can settle
    /// once everything we have has actually gone out at least once.
    last_pushed_index: AtomicI64,
}

impl InMemoryCore {
    pub fn new(id: ParticipantId, participants: ParticipantSet) -> Self {
        Self {
            id,
            participants,
            events: Vec::new(),
            pending_tx: Vec::new(),
            blocks: Vec::new(),
            signatures: HashMap::new(),
            last_committed_event_count: 0,
            last_consensus_round: None,
            commit_tx: None,
            last_pushed_index: AtomicI64::new(-1),
        }
    }

    pub fn with_commit_channel(mut self, commit_tx: mpsc::Sender<Block>) -> Self {
        self.commit_tx = Some(commit_tx);
        self
    }

    fn last_index_from(&self, creator: ParticipantId) -> i64 {
        self.events
            .iter()
            .filter(|e| e.creator == creator)
            .map(|e| e.index)
            .max()
            .unwrap_or(-1)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

#[async_trait::async_trait]
impl Core for InMemoryCore {
    type Event = StoredEvent;
    type Round = ();
    type Root = ();
    type RoundInfo = ();

    fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn bootstrap(&mut self) -> Result<()> {
        Ok(())
    }

    async fn add_self_event(&mut self) -> Result<()> {
        let index = self.last_index_from(self.id) + 1;
        let transactions = std::mem::take(&mut self.pending_tx);
        self.events.push(StoredEvent {
            creator: self.id,
            index,
            transactions,
        });
        Ok(())
    }

    async fn sync(&mut self, events: Vec<WireEvent>) -> Result<()> {
        for wire in events {
            let event: StoredEvent = bincode::deserialize(&wire.0)?;
            if !self.events.iter().any(|e| e.wire_id() == event.wire_id()) {
                self.events.push(event);
            }
        }
        Ok(())
    }

    async fn run_consensus(&mut self) -> Result<()> {
        if self.participants.is_empty() {
            return Ok(());
        }
        let new_events = self.events.len() - self.last_committed_event_count;
        if new_events < self.participants.len() {
            return Ok(());
        }
        self.last_committed_event_count = self.events.len();

        let transactions: Vec<Vec<u8>> = self
            .events
            .iter()
            .flat_map(|e| e.transactions.clone())
            .collect();
        if transactions.is_empty() {
            return Ok(());
        }

        let round = self.last_consensus_round.map(|r| r + 1).unwrap_or(0);
        self.last_consensus_round = Some(round);

        let block = Block {
            index: self.blocks.len() as u64,
            round_received: round,
            transactions,
            body: BlockBody::default(),
        };
        self.blocks.push(block.clone());

        if let Some(tx) = &self.commit_tx {
            let _ = tx.send(block).await;
        }
        Ok(())
    }

    async fn sign_block(&mut self, block: &Block) -> Result<BlockSignature> {
        let mut hasher = DefaultHasher::new();
        block.index.hash(&mut hasher);
        block.body.state_hash.hash(&mut hasher);
        let digest = hasher.finish();
        Ok(BlockSignature {
            validator: self.id,
            block_index: block.index,
            signature: digest.to_be_bytes().to_vec(),
        })
    }

    async fn add_block_signature(&mut self, sig: BlockSignature) -> Result<()> {
        self.signatures.entry(sig.block_index).or_default().push(sig);
        Ok(())
    }

    async fn submit_transaction(&mut self, tx: Vec<u8>) -> Result<()> {
        self.pending_tx.push(tx);
        Ok(())
    }

    fn need_gossip(&self) -> bool {
        let last_self_index = self.last_index_from(self.id);
        !self.pending_tx.is_empty() || last_self_index > self.last_pushed_index.load(Ordering::Relaxed)
    }

    fn known_events(&self) -> KnownEvents {
        let mut known = KnownEvents::new();
        for (_, id) in self.participants.addresses() {
            known.insert(id, self.last_index_from(id));
        }
        known
    }

    fn over_sync_limit(&self, known: &KnownEvents, limit: usize) -> bool {
        let our_total = self.events.len();
        let their_known: i64 = known.values().map(|v| v + 1).sum();
        our_total as i64 - their_known > limit as i64
    }

    fn event_diff(&self, known: &KnownEvents) -> Result<Vec<Self::Event>> {
        let diff: Vec<Self::Event> = self
            .events
            .iter()
            .filter(|e| e.index > *known.get(&e.creator).unwrap_or(&-1))
            .cloned()
            .collect();

        if let Some(pushed) = diff.iter().filter(|e| e.creator == self.id).map(|e| e.index).max() {
            self.last_pushed_index.fetch_max(pushed, Ordering::Relaxed);
        }

        Ok(diff)
    }

    fn to_wire(&self, events: &[Self::Event]) -> Result<Vec<WireEvent>> {
        events
            .iter()
            .map(|e| Ok(WireEvent(bincode::serialize(e)?)))
            .collect()
    }

    fn get_event(&self, id: &str) -> Option<Self::Event> {
        self.events.iter().find(|e| e.wire_id() == id).cloned()
    }

    fn last_event_from(&self, participant: ParticipantId) -> Option<String> {
        self.events
            .iter()
            .filter(|e| e.creator == participant)
            .max_by_key(|e| e.index)
            .map(|e| e.wire_id())
    }

    fn consensus_events(&self) -> Vec<String> {
        self.events.iter().map(|e| e.wire_id()).collect()
    }

    fn get_round(&self, _round: i64) -> Option<Self::RoundInfo> {
        None
    }

    fn last_round(&self) -> i64 {
        self.last_consensus_round.unwrap_or(-1)
    }

    fn round_witnesses(&self, _round: i64) -> Vec<String> {
        Vec::new()
    }

    fn round_events(&self, _round: i64) -> usize {
        0
    }

    fn get_root(&self, _participant: ParticipantId) -> Option<Self::Root> {
        None
    }

    fn get_block(&self, index: u64) -> Option<Block> {
        self.blocks.get(index as usize).cloned()
    }

    fn transaction_pool_len(&self) -> usize {
        self.pending_tx.len()
    }

    fn last_block_index(&self) -> Option<u64> {
        self.blocks.len().checked_sub(1).map(|i| i as u64)
    }

    fn last_consensus_round(&self) -> Option<i64> {
        self.last_consensus_round
    }

    fn consensus_transactions(&self) -> usize {
        self.blocks.iter().map(|b| b.transactions.len()).sum()
    }

    fn undetermined_events(&self) -> usize {
        self.events.len().saturating_sub(self.last_committed_event_count)
    }
}

/// A trivial application proxy that echoes a cheap digest of the block's
/// transactions back as the state hash. Used by the demo binary and tests.
pub struct EchoAppProxy {
    submit_rx: Option<mpsc::Receiver<Vec<u8>>>,
}

impl EchoAppProxy {
    pub fn new(submit_rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            submit_rx: Some(submit_rx),
        }
    }
}

#[async_trait::async_trait]
impl AppProxy for EchoAppProxy {
    fn submit_ch(&mut self) -> mpsc::Receiver<Vec<u8>> {
        self.submit_rx.take().expect("submit_ch taken more than once")
    }

    async fn commit_block(&self, block: &Block) -> CommitResult {
        let mut hasher = DefaultHasher::new();
        for tx in &block.transactions {
            tx.hash(&mut hasher);
        }
        CommitResult {
            state_hash: hasher.finish().to_be_bytes().to_vec(),
            error: None,
        }
    }
}
