//! Persistence engine: typed reads, single and batch writes, change flushing.
//!
//! # Responsibility
//! - Own the connection and run every write inside one transaction per call.
//! - Merge committed change records into the store's aggregator and flush them.
//!
//! # Invariants
//! - A failed batch commits nothing and yields one `DbError::Batch`.
//! - A cancelled batch commits its processed prefix.
//! - Notifications are emitted only after commit.

mod batch;
mod engine;
mod session;

pub use batch::{BatchOp, BatchOutcome};
pub use engine::Store;
pub use session::Session;
