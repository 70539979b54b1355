//! Snapshot Sink: publishes each cycle's observations to a worksheet for
//! human review.

pub mod auth;
pub mod sheets;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CycleSnapshot;

pub use sheets::SheetsSink;

#[async_trait]
pub trait SnapshotSink: Send {
    /// Overwrite rows 2..=N+1 with the snapshot's (price, balance, link)
    /// columns in one batch. Rows past N from a longer earlier snapshot are
    /// left as they are.
    async fn publish(&mut self, snapshot: &CycleSnapshot) -> Result<()>;
}
