//! Lock-protected pending change set owned by one store.

use super::bus::ChangeBus;
use super::record::{ChangeKind, ChangeRecord, ChangeSet};
use crate::db::{DbError, DbResult};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct ChangeAggregator {
    pending: Mutex<ChangeSet>,
    bus: Arc<ChangeBus>,
}

impl ChangeAggregator {
    pub fn new(bus: Arc<ChangeBus>) -> Self {
        Self {
            pending: Mutex::new(ChangeSet::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    /// Merges one write into the pending record of `table`; no-op when
    /// `affected_rows <= 0`.
    pub fn record(&self, table: &str, kind: ChangeKind, affected_rows: i64) -> DbResult<()> {
        if !self.lock()?.record(table, kind, affected_rows) {
            debug!(
                "event=change_skip module=changes status=skip table={table} kind={} affected_rows={affected_rows}",
                kind.as_str()
            );
        }
        Ok(())
    }

    /// Folds a committed session's staged records into the pending set.
    pub fn absorb(&self, staged: ChangeSet) -> DbResult<()> {
        if staged.is_empty() {
            return Ok(());
        }
        self.lock()?.merge(staged);
        Ok(())
    }

    /// Copy of the records waiting for the next flush.
    pub fn pending(&self) -> DbResult<Vec<ChangeRecord>> {
        Ok(self.lock()?.records().to_vec())
    }

    /// Drains every pending record and publishes one notification per table.
    ///
    /// Returns the emitted records. Concurrent flushes never emit a record twice.
    pub fn flush(&self) -> DbResult<Vec<ChangeRecord>> {
        let drained = self.lock()?.take();
        for record in &drained {
            self.bus.publish(record);
        }
        if !drained.is_empty() {
            info!(
                "event=change_flush module=changes status=ok records={} listeners={}",
                drained.len(),
                self.bus.listener_count()
            );
        }
        Ok(drained)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, ChangeSet>> {
        self.pending
            .lock()
            .map_err(|_| DbError::LockPoisoned("change aggregator"))
    }
}
