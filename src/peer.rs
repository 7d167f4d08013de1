//! src/peer.rs
//!
//! `PeerSelector`: chooses the next gossip partner. Default policy is
//! uniform random selection over all participants except self and except
//! the last peer chosen (when more than two participants exist).

use crate::wire::{ParticipantId, ParticipantSet};
use rand::seq::SliceRandom;
use std::sync::Mutex;

pub struct PeerSelector {
    peers: Vec<(ParticipantId, String)>,
    last: Mutex<Option<ParticipantId>>,
}

impl PeerSelector {
    pub fn new(participants: &ParticipantSet, self_id: ParticipantId) -> Self {
        let peers = participants
            .addresses()
            .filter(|(_, id)| *id != self_id)
            .map(|(addr, id)| (id, addr.to_string()))
            .collect();
        Self {
            peers,
            last: Mutex::new(None),
        }
    }

    pub fn peers(&self) -> &[(ParticipantId, String)] {
        &self.peers
    }

    /// Picks the next peer, excluding the previously chosen one when there
    /// are enough candidates to do so. Returns `None` with zero peers.
    pub fn next(&self) -> Option<(ParticipantId, String)> {
        if self.peers.is_empty() {
            return None;
        }
        let last = *self.last.lock().unwrap();
        let candidates: Vec<&(ParticipantId, String)> = if self.peers.len() > 1 {
            self.peers.iter().filter(|(id, _)| Some(*id) != last).collect()
        } else {
            self.peers.iter().collect()
        };
        let mut rng = rand::thread_rng();
        candidates.choose(&mut rng).map(|p| (*p).clone())
    }

    pub fn update_last(&self, id: ParticipantId) {
        *self.last.lock().unwrap() = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n: usize) -> ParticipantSet {
        ParticipantSet::new((0..n).map(|i| (format!("127.0.0.1:{}", 9000 + i), i as ParticipantId)))
    }

    #[test]
    fn excludes_self() {
        let selector = PeerSelector::new(&set(3), 0);
        assert_eq!(selector.peers().len(), 2);
        for _ in 0..10 {
            let (id, _) = selector.next().unwrap();
            assert_ne!(id, 0);
        }
    }

    #[test]
    fn avoids_repeating_last_peer_when_possible() {
        let selector = PeerSelector::new(&set(3), 0);
        let (first, _) = selector.next().unwrap();
        selector.update_last(first);
        for _ in 0..20 {
            let (id, _) = selector.next().unwrap();
            assert_ne!(id, first);
        }
    }

    #[test]
    fn returns_none_with_zero_peers() {
        let selector = PeerSelector::new(&set(1), 0);
        assert!(selector.next().is_none());
    }

    #[test]
    fn two_peers_may_repeat_last() {
        let selector = PeerSelector::new(&set(2), 0);
        let (only, _) = selector.next().unwrap();
        selector.update_last(only);
        assert!(selector.next().is_some());
    }
}
