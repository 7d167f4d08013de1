//! src/stats.rs
//!
//! Observable counters and the `Stats` snapshot exposed over the HTTP
//! surface in `api.rs`.

use crate::core::Core;
use crate::state::NodeState;
use crate::wire::ParticipantId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex;

/// Shared counters mutated by the gossip driver, read by `Stats`.
#[derive(Default)]
pub struct Counters {
    pub sync_requests: AtomicU64,
    pub sync_errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A best-effort cached snapshot of core-derived stats, refreshed whenever
/// the core lock is uncontended so the stats endpoint never blocks behind
/// consensus work.
#[derive(Clone, Default)]
struct CachedCoreStats {
    last_consensus_round: Option<i64>,
    consensus_events: usize,
    consensus_transactions: usize,
    undetermined_events: usize,
    transaction_pool: usize,
    last_block_index: Option<u64>,
    round_events: usize,
}

pub struct Stats<C: Core> {
    id: ParticipantId,
    core: Arc<Mutex<C>>,
    state: Arc<NodeState>,
    counters: Arc<Counters>,
    start: Instant,
    num_peers: usize,
    heartbeat_secs: f64,
    cache: StdMutex<CachedCoreStats>,
}

impl<C: Core> Stats<C> {
    pub fn new(
        id: ParticipantId,
        core: Arc<Mutex<C>>,
        state: Arc<NodeState>,
        counters: Arc<Counters>,
        num_peers: usize,
        heartbeat_secs: f64,
    ) -> Self {
        Self {
            id,
            core,
            state,
            counters,
            start: Instant::now(),
            num_peers,
            heartbeat_secs,
            cache: StdMutex::new(CachedCoreStats::default()),
        }
    }

    /// Builds the full stats map described for the HTTP surface.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        let core_stats = match self.core.try_lock() {
            Ok(core) => {
                let fresh = CachedCoreStats {
                    last_consensus_round: core.last_consensus_round(),
                    consensus_events: core.consensus_events().len(),
                    consensus_transactions: core.consensus_transactions(),
                    undetermined_events: core.undetermined_events(),
                    transaction_pool: core.transaction_pool_len(),
                    last_block_index: core.last_block_index(),
                    round_events: core.round_events(core.last_round()),
                };
                *self.cache.lock().unwrap() = fresh.clone();
                fresh
            }
            Err(_) => self.cache.lock().unwrap().clone(),
        };

        let elapsed = self.start.elapsed().as_secs_f64();
        let sync_requests = self.counters.sync_requests.load(Ordering::Relaxed);
        let sync_errors = self.counters.sync_errors.load(Ordering::Relaxed);
        let sync_rate = if sync_requests == 0 {
            1.0
        } else {
            1.0 - (sync_errors as f64 / sync_requests as f64)
        };

        let mut map = BTreeMap::new();
        map.insert(
            "last_consensus_round".to_string(),
            core_stats
                .last_consensus_round
                .map(|r| r.to_string())
                .unwrap_or_else(|| "nil".to_string()),
        );
        map.insert("time_elapsed".to_string(), format2(elapsed));
        map.insert("heartbeat".to_string(), format2(self.heartbeat_secs));
        map.insert("node_current".to_string(), now_millis().to_string());
        map.insert("node_start".to_string(), epoch_millis_at(self.start).to_string());
        map.insert(
            "last_block_index".to_string(),
            core_stats
                .last_block_index
                .map(|i| i.to_string())
                .unwrap_or_else(|| "nil".to_string()),
        );
        map.insert("consensus_events".to_string(), core_stats.consensus_events.to_string());
        map.insert("consensus_transactions".to_string(), core_stats.consensus_transactions.to_string());
        map.insert("undetermined_events".to_string(), core_stats.undetermined_events.to_string());
        map.insert("transaction_pool".to_string(), core_stats.transaction_pool.to_string());
        map.insert("num_peers".to_string(), self.num_peers.to_string());
        map.insert("sync_rate".to_string(), format2(sync_rate));
        map.insert(
            "transactions_per_second".to_string(),
            format2(rate(core_stats.consensus_transactions as f64, elapsed)),
        );
        map.insert(
            "events_per_second".to_string(),
            format2(rate(core_stats.consensus_events as f64, elapsed)),
        );
        map.insert(
            "rounds_per_second".to_string(),
            format2(rate(
                core_stats.last_consensus_round.map(|r| r + 1).unwrap_or(0) as f64,
                elapsed,
            )),
        );
        map.insert("round_events".to_string(), core_stats.round_events.to_string());
        map.insert("id".to_string(), self.id.to_string());
        map.insert("state".to_string(), self.state.get().to_string());
        // sync_limit is a configured value, not derivable from the core or
        // counters; callers that need it read it straight from Config.
        map
    }
}

fn rate(count: f64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        0.0
    } else {
        count / elapsed_secs
    }
}

fn format2(v: f64) -> String {
    format!("{:.2}", v)
}

fn now_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn epoch_millis_at(instant: Instant) -> u128 {
    let elapsed = instant.elapsed();
    now_millis().saturating_sub(elapsed.as_millis())
}
