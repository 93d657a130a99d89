//! Typed row snapshots exchanged between the engine and entities.
//!
//! # Invariants
//! - Column names are unique within one snapshot; `put` replaces.
//! - Values keep the engine's storage class; nothing is stringified.

mod snapshot;

pub use rusqlite::types::Value;
pub use snapshot::RowSnapshot;
