//! SQLite connection bootstrap, store configuration and the crate-wide error.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the store.
//! - Define `DbError`, the single error type surfaced by store operations.
//!
//! # Invariants
//! - Every failure reaching a caller is typed; nothing is swallowed.
//! - `NotFound` messages always carry table, predicate and arguments.

use crate::entity::MappingError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod config;
mod open;

pub use config::{PublishPolicy, StoreConfig};
pub use open::{open_connection, open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Connection or transaction level failure.
    Sqlite(rusqlite::Error),
    /// A read failed, typically because the table or a column does not exist.
    Query {
        table: String,
        source: rusqlite::Error,
    },
    /// Reconstruction found no row for an identity predicate.
    NotFound {
        table: String,
        predicate: String,
        args: Vec<String>,
    },
    /// A row could not be turned into a typed object.
    Mapping(MappingError),
    /// The engine rejected a write (constraint violation, missing column, ...).
    WriteConflict {
        table: String,
        source: rusqlite::Error,
    },
    /// Descriptor or snapshot failed validation before reaching the engine.
    InvalidDescriptor(String),
    /// Store configuration is not usable.
    InvalidConfig(String),
    /// A batch failed and its transaction was rolled back.
    Batch {
        operation: &'static str,
        processed: usize,
        source: Box<DbError>,
    },
    /// A lock guarding shared store state was poisoned by a panicking thread.
    LockPoisoned(&'static str),
}

impl DbError {
    pub(crate) fn not_found(table: &str, predicate: Option<&str>, args: &[String]) -> Self {
        Self::NotFound {
            table: table.to_string(),
            predicate: predicate.unwrap_or_default().to_string(),
            args: args.to_vec(),
        }
    }

    /// Returns whether this error (or the batch failure it wraps) is a write conflict.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            Self::WriteConflict { .. } => true,
            Self::Batch { source, .. } => source.is_write_conflict(),
            _ => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Query { table, source } => write!(f, "query on `{table}` failed: {source}"),
            Self::NotFound {
                table,
                predicate,
                args,
            } => write!(
                f,
                "no row returned; table: {table}; predicate: {predicate}; args: [{}]",
                args.join(", ")
            ),
            Self::Mapping(err) => write!(f, "{err}"),
            Self::WriteConflict { table, source } => {
                write!(f, "write to `{table}` rejected: {source}")
            }
            Self::InvalidDescriptor(message) => write!(f, "invalid query descriptor: {message}"),
            Self::InvalidConfig(message) => write!(f, "invalid store config: {message}"),
            Self::Batch {
                operation,
                processed,
                source,
            } => write!(
                f,
                "{operation} rolled back after {processed} processed item(s): {source}"
            ),
            Self::LockPoisoned(what) => write!(f, "{what} lock poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Query { source, .. } => Some(source),
            Self::WriteConflict { source, .. } => Some(source),
            Self::Mapping(err) => Some(err),
            Self::Batch { source, .. } => Some(source.as_ref()),
            Self::NotFound { .. } => None,
            Self::InvalidDescriptor(_) => None,
            Self::InvalidConfig(_) => None,
            Self::LockPoisoned(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<MappingError> for DbError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;

    #[test]
    fn not_found_message_names_table_predicate_and_args() {
        let err = DbError::not_found("files", Some("id = ?"), &["2".to_string()]);
        let message = err.to_string();
        assert!(message.contains("files"));
        assert!(message.contains("id = ?"));
        assert!(message.contains("[2]"));
    }

    #[test]
    fn batch_error_reports_wrapped_write_conflict() {
        let inner = DbError::WriteConflict {
            table: "files".to_string(),
            source: rusqlite::Error::QueryReturnedNoRows,
        };
        let err = DbError::Batch {
            operation: "insert_all",
            processed: 2,
            source: Box::new(inner),
        };
        assert!(err.is_write_conflict());
        assert!(err.to_string().contains("insert_all"));
    }
}
