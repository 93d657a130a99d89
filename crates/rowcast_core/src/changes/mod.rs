//! Per-table change aggregation and notification fan-out.
//!
//! # Responsibility
//! - Coalesce writes into one `ChangeRecord` per touched table.
//! - Deliver drained records to the listeners registered on a `ChangeBus`.
//!
//! # Invariants
//! - A write that affected zero rows never creates a record.
//! - `flush` drains under the aggregator lock: each record is emitted once.

mod aggregator;
mod bus;
mod record;

pub use aggregator::ChangeAggregator;
pub use bus::{ChangeBus, ChangeListener};
pub use record::{ChangeKind, ChangeRecord, ChangeSet};
