//! src/proxy.rs
//!
//! The `AppProxy` trait: the boundary to the external application that
//! submits transactions and receives decided blocks.

use crate::wire::Block;
use tokio::sync::mpsc;

/// The result of handing a decided block to the application.
#[derive(Clone, Debug, Default)]
pub struct CommitResult {
    pub state_hash: Vec<u8>,
    pub error: Option<String>,
}

#[async_trait::async_trait]
pub trait AppProxy: Send + Sync + 'static {
    /// Transactions pushed by the application. Taken once by the runtime.
    fn submit_ch(&mut self) -> mpsc::Receiver<Vec<u8>>;

    /// Hand a decided block to the application; it replies with a
    /// post-execution state digest and an optional error.
    async fn commit_block(&self, block: &Block) -> CommitResult;
}
