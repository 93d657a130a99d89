//! Change records and the unlocked per-table accumulator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Remove,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

/// Aggregated write summary for one table; the notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub table: String,
    pub inserted: bool,
    pub removed: bool,
    pub updated: bool,
    pub affected_row_count: u64,
}

impl ChangeRecord {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            inserted: false,
            removed: false,
            updated: false,
            affected_row_count: 0,
        }
    }

    fn apply(&mut self, kind: ChangeKind, affected_rows: u64) {
        match kind {
            ChangeKind::Insert => self.inserted = true,
            ChangeKind::Update => self.updated = true,
            ChangeKind::Remove => self.removed = true,
        }
        self.affected_row_count += affected_rows;
    }

    fn absorb(&mut self, other: &ChangeRecord) {
        self.inserted |= other.inserted;
        self.updated |= other.updated;
        self.removed |= other.removed;
        self.affected_row_count += other.affected_row_count;
    }
}

/// Ordered set of change records keyed by table, in first-touch order.
///
/// Not synchronized; `ChangeAggregator` wraps one in a mutex, sessions stage
/// their own until commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one write into the table's record.
    ///
    /// Returns `false` (and records nothing) when `affected_rows <= 0`.
    pub fn record(&mut self, table: &str, kind: ChangeKind, affected_rows: i64) -> bool {
        if affected_rows <= 0 {
            return false;
        }
        self.entry(table).apply(kind, affected_rows.unsigned_abs());
        true
    }

    /// Folds every record of `other` into this set.
    pub fn merge(&mut self, other: ChangeSet) {
        for record in other.records {
            self.entry(&record.table).absorb(&record);
        }
    }

    pub fn get(&self, table: &str) -> Option<&ChangeRecord> {
        self.records.iter().find(|record| record.table == table)
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn take(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.records)
    }

    fn entry(&mut self, table: &str) -> &mut ChangeRecord {
        let index = match self.records.iter().position(|record| record.table == table) {
            Some(index) => index,
            None => {
                self.records.push(ChangeRecord::new(table));
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }
}
