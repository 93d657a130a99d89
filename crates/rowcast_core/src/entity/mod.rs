//! Mappable entity contract.
//!
//! # Responsibility
//! - Describe how a domain object becomes a row and back.
//! - Give objects lifecycle hooks that run inside the active transaction.
//!
//! # Invariants
//! - `identity()` selects at most one row.
//! - Entities own no resources; dropping one never touches the database.

use crate::db::DbResult;
use crate::query::QueryDescriptor;
use crate::row::RowSnapshot;
use crate::store::Session;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure turning a row snapshot into a typed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    MissingColumn(String),
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    Invalid(String),
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(column) => write!(f, "row has no column `{column}`"),
            Self::TypeMismatch {
                column,
                expected,
                found,
            } => write!(f, "column `{column}` holds {found}, expected {expected}"),
            Self::Invalid(message) => write!(f, "invalid row: {message}"),
        }
    }
}

impl Error for MappingError {}

/// A domain object persisted as exactly one row of one table.
///
/// Hooks default to no-ops. They receive the transaction-scoped [`Session`],
/// so cascading reads and writes join the caller's transaction and their
/// change records are flushed with it.
pub trait Entity {
    /// Context handed to lifecycle hooks, e.g. the logical owner of the entity.
    type Parent;

    /// Descriptor selecting this entity's row; its table is the write target.
    fn identity(&self) -> QueryDescriptor;

    /// Current field values, used as the insert row and as update assignments.
    fn values(&self) -> RowSnapshot;

    /// Populates fields from a row read back from the engine.
    ///
    /// # Errors
    /// - `MappingError` when a column is missing or holds an unexpected type.
    fn reconstruct(&mut self, row: &RowSnapshot) -> Result<(), MappingError>;

    fn on_create(&mut self, session: &Session<'_>, parent: Option<&Self::Parent>) -> DbResult<()> {
        let _ = (session, parent);
        Ok(())
    }

    fn on_update(&mut self, session: &Session<'_>, parent: Option<&Self::Parent>) -> DbResult<()> {
        let _ = (session, parent);
        Ok(())
    }

    fn on_remove(&mut self, session: &Session<'_>, parent: Option<&Self::Parent>) -> DbResult<()> {
        let _ = (session, parent);
        Ok(())
    }
}

/// Per-row observer for `cast_query`.
pub trait CastObserver<T> {
    fn on_reconstructed(&mut self, row: &RowSnapshot, entity: &T) {
        let _ = (row, entity);
    }

    /// Called for rows dropped from the result because reconstruction failed.
    fn on_skipped(&mut self, row: &RowSnapshot, error: &MappingError) {
        let _ = (row, error);
    }
}

/// Per-row observer for plain `query` reads.
pub trait LoadObserver {
    /// Called once, before the first row, with the result's column names.
    fn on_open(&mut self, columns: &[String]) {
        let _ = columns;
    }

    /// Called for every row before it joins the result; may rewrite it.
    fn on_load(&mut self, row: &mut RowSnapshot) {
        let _ = row;
    }
}
