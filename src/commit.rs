//! src/commit.rs
//!
//! `CommitPipeline`: drains decided blocks, hands each to the application
//! outside the core lock, then signs it and attaches the signature for
//! eventual gossip.

use crate::core::Core;
use crate::proxy::AppProxy;
use crate::wire::Block;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct CommitPipeline<C: Core, A: AppProxy> {
    core: Arc<Mutex<C>>,
    proxy: Arc<A>,
}

impl<C: Core, A: AppProxy> CommitPipeline<C, A> {
    pub fn new(core: Arc<Mutex<C>>, proxy: Arc<A>) -> Self {
        Self { core, proxy }
    }

    /// Drains `commit_rx` until it closes or `shutdown` fires. A single
    /// failed block is logged and does not stall the pipeline.
    pub async fn run(&self, mut commit_rx: mpsc::Receiver<Block>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("commit pipeline received shutdown signal");
                    break;
                }
                maybe_block = commit_rx.recv() => {
                    match maybe_block {
                        Some(mut block) => self.process_block(&mut block).await,
                        None => {
                            tracing::info!("commit channel closed, commit pipeline exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    pub(crate) async fn process_block(&self, block: &mut Block) {
        let result = self.proxy.commit_block(block).await;
        if let Some(err) = &result.error {
            tracing::warn!(index = block.index, error = %err, "application reported a commit error");
        }
        block.body.state_hash = result.state_hash;

        let mut core = self.core.lock().await;
        match core.sign_block(block).await {
            Ok(sig) => {
                if let Err(e) = core.add_block_signature(sig).await {
                    tracing::warn!(index = block.index, error = %e, "failed to attach block signature");
                }
            }
            Err(e) => tracing::warn!(index = block.index, error = %e, "failed to sign block"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::InMemoryCore;
    use crate::wire::{BlockBody, ParticipantSet};
    use tokio::sync::mpsc;

    struct FailingProxy;

    #[async_trait::async_trait]
    impl AppProxy for FailingProxy {
        fn submit_ch(&mut self) -> mpsc::Receiver<Vec<u8>> {
            let (_tx, rx) = mpsc::channel(1);
            rx
        }
        async fn commit_block(&self, _block: &Block) -> crate::proxy::CommitResult {
            crate::proxy::CommitResult {
                state_hash: Vec::new(),
                error: Some("application unavailable".into()),
            }
        }
    }

    #[tokio::test]
    async fn failed_commit_still_attaches_signature() {
        let participants = ParticipantSet::new([("a".to_string(), 0)]);
        let core = Arc::new(Mutex::new(InMemoryCore::new(0, participants)));
        let pipeline = CommitPipeline::new(core.clone(), Arc::new(FailingProxy));

        let (tx, rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        tx.send(Block {
            index: 0,
            round_received: 0,
            transactions: vec![b"tx".to_vec()],
            body: BlockBody::default(),
        })
        .await
        .unwrap();
        drop(tx);

        pipeline.run(rx, shutdown).await;
    }
}
