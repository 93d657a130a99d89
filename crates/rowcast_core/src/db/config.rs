//! Store configuration.
//!
//! # Invariants
//! - Every field has a default, so partial documents deserialize.
//! - `journal_mode` is validated before it reaches `PRAGMA journal_mode`.

use super::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

/// Existence test used by single-object `publish`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Update first; insert when the update reports zero affected rows.
    ///
    /// Saves one round trip, but an engine reporting zero rows for a no-op
    /// update on an existing row turns the fallback insert into a conflict.
    #[default]
    UpdateThenInsert,
    /// Probe the identity predicate, then either update or insert.
    ProbeFirst,
}

/// Connection and behavior settings for a `Store`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    /// One of SQLite's journal modes, case-insensitive. `None` keeps the default.
    pub journal_mode: Option<String>,
    pub publish_policy: PublishPolicy,
    /// Reorder batch items so rows of one table are written together.
    pub group_by_table: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            journal_mode: None,
            publish_policy: PublishPolicy::default(),
            group_by_table: true,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    pub fn group_by_table(mut self, enabled: bool) -> Self {
        self.group_by_table = enabled;
        self
    }

    pub(crate) fn journal_mode_pragma(&self) -> DbResult<Option<&'static str>> {
        let Some(requested) = self.journal_mode.as_deref() else {
            return Ok(None);
        };
        let normalized = requested.trim().to_ascii_uppercase();
        JOURNAL_MODES
            .iter()
            .find(|mode| **mode == normalized)
            .map(|mode| Some(*mode))
            .ok_or_else(|| {
                DbError::InvalidConfig(format!(
                    "unsupported journal_mode `{requested}`; expected one of {}",
                    JOURNAL_MODES.join("|")
                ))
            })
    }
}
