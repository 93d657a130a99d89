//! Object-relational persistence over SQLite.
//!
//! Maps typed entities to rows, runs multi-row writes inside one transaction
//! per call, and coalesces writes into one change notification per table.

pub mod changes;
pub mod db;
pub mod entity;
pub mod logging;
pub mod progress;
pub mod query;
pub mod row;
pub mod store;

pub use changes::{ChangeAggregator, ChangeBus, ChangeKind, ChangeListener, ChangeRecord, ChangeSet};
pub use db::{DbError, DbResult, PublishPolicy, StoreConfig};
pub use entity::{CastObserver, Entity, LoadObserver, MappingError};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LogConfig};
pub use progress::{Progress, ProgressFn, ProgressReporter};
pub use query::{Columns, QueryDescriptor};
pub use row::{RowSnapshot, Value};
pub use store::{BatchOp, BatchOutcome, Session, Store};
