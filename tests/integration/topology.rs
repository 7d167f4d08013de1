//! tests/integration/topology.rs
//!
//! Tests gossip convergence across a larger fully-connected cluster, where
//! `PeerSelector`'s randomized choice of partner must still reach every
//! node within a bounded number of heartbeats.

use crate::common::harness;
use std::time::Duration;
use test_log::test;

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn four_node_cluster_converges_on_a_single_commit() {
    let test_timeout = Duration::from_secs(15);
    let result = tokio::time::timeout(test_timeout, async {
        let nodes = harness::build_cluster(4, Duration::from_millis(15), 500).await;

        for (i, node) in nodes.iter().enumerate() {
            node.submit_tx.send(format!("tx-from-{i}").into_bytes()).await.unwrap();
        }

        let converged = harness::wait_until(
            || {
                nodes.iter().all(|n| {
                    n.core
                        .try_lock()
                        .map(|c| !c.blocks().is_empty())
                        .unwrap_or(false)
                })
            },
            Duration::from_secs(10),
            Duration::from_millis(25),
        )
        .await;

        assert!(converged, "all four nodes should decide at least one block");

        // Gossip should have carried each node's transaction to every other
        // node by the time consensus decides: every node's ledger should
        // contain all four submitted transactions, not just its own.
        let expected: Vec<Vec<u8>> = (0..4).map(|i| format!("tx-from-{i}").into_bytes()).collect();
        for node in &nodes {
            let core = node.core.lock().await;
            let seen: Vec<&Vec<u8>> = core.blocks().iter().flat_map(|b| &b.transactions).collect();
            for tx in &expected {
                assert!(seen.contains(&tx), "node {} never saw transaction {:?}", node.id, tx);
            }
        }

        for node in &nodes {
            node.shutdown.cancel();
        }
        for node in nodes {
            let _ = node.task.await;
        }
    })
    .await;

    assert!(result.is_ok(), "test timed out");
}
