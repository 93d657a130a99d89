//! Shared, thread-safe store front end.

use super::batch::{BatchOp, BatchOutcome};
use super::session::Session;
use crate::changes::{ChangeAggregator, ChangeBus, ChangeRecord, ChangeSet};
use crate::db::{open_connection, DbError, DbResult, StoreConfig};
use crate::entity::{CastObserver, Entity, LoadObserver};
use crate::progress::{Progress, ProgressReporter};
use crate::query::QueryDescriptor;
use crate::row::RowSnapshot;
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Persistence engine shared by concurrent callers.
///
/// Calls block the invoking thread; the connection mutex serializes them.
pub struct Store {
    conn: Mutex<Connection>,
    config: StoreConfig,
    changes: ChangeAggregator,
}

impl Store {
    /// Opens the database described by `config` and wires notifications to `bus`.
    pub fn open(config: StoreConfig, bus: Arc<ChangeBus>) -> DbResult<Self> {
        let conn = open_connection(&config)?;
        Ok(Self::from_connection(conn, config, bus))
    }

    /// Opens a private in-memory database with default settings.
    pub fn open_in_memory(bus: Arc<ChangeBus>) -> DbResult<Self> {
        Self::open(StoreConfig::in_memory(), bus)
    }

    /// Wraps an already configured connection; `config.path` is ignored.
    pub fn from_connection(conn: Connection, config: StoreConfig, bus: Arc<ChangeBus>) -> Self {
        Self {
            conn: Mutex::new(conn),
            config,
            changes: ChangeAggregator::new(bus),
        }
    }

    /// Settings this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Pending change records; writes made outside this crate can be
    /// recorded here and emitted with the next flush.
    pub fn changes(&self) -> &ChangeAggregator {
        &self.changes
    }

    /// Emits every pending change record; see [`ChangeAggregator::flush`].
    pub fn flush(&self) -> DbResult<Vec<ChangeRecord>> {
        self.changes.flush()
    }

    /// Runs caller-owned SQL such as schema DDL. Produces no change records.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.lock_connection().execute_batch(sql)?;
        Ok(())
    }

    /// Runs `work` in one transaction.
    ///
    /// `Ok` commits and flushes the staged change records; `Err` rolls back
    /// and discards them. The rollback happens when the transaction guard is
    /// dropped, so early returns and panics are covered too.
    pub fn transaction<R, F>(&self, work: F) -> DbResult<R>
    where
        F: FnOnce(&Session<'_>) -> DbResult<R>,
    {
        let (value, staged) = {
            let mut conn = self.lock_connection();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let session = Session::new(&tx, &self.config);
            let value = work(&session)?;
            let staged = session.into_changes();
            tx.commit()?;
            (value, staged)
        };
        self.publish_committed(staged)?;
        Ok(value)
    }

    /// Every row matching `descriptor`; see [`Session::query`].
    pub fn query(&self, descriptor: &QueryDescriptor) -> DbResult<Vec<RowSnapshot>> {
        self.read(|session| session.query(descriptor))
    }

    /// Reads rows while reporting each one to `observer`.
    pub fn query_observed(
        &self,
        descriptor: &QueryDescriptor,
        observer: &mut dyn LoadObserver,
    ) -> DbResult<Vec<RowSnapshot>> {
        self.read(|session| session.query_observed(descriptor, Some(observer)))
    }

    /// First matching row, `None` when nothing matches.
    pub fn query_one(&self, descriptor: &QueryDescriptor) -> DbResult<Option<RowSnapshot>> {
        self.read(|session| session.query_one(descriptor))
    }

    /// Whether at least one row matches `descriptor`.
    pub fn exists(&self, descriptor: &QueryDescriptor) -> DbResult<bool> {
        self.read(|session| session.exists(descriptor))
    }

    /// Reads rows as entities built by `factory`; see [`Session::cast_query`].
    pub fn cast_query<T, F>(&self, descriptor: &QueryDescriptor, factory: F) -> DbResult<Vec<T>>
    where
        T: Entity,
        F: FnMut() -> T,
    {
        self.read(|session| session.cast_query(descriptor, factory, None))
    }

    /// [`Store::cast_query`] reporting built and skipped rows to `observer`.
    pub fn cast_query_observed<T, F>(
        &self,
        descriptor: &QueryDescriptor,
        factory: F,
        observer: &mut dyn CastObserver<T>,
    ) -> DbResult<Vec<T>>
    where
        T: Entity,
        F: FnMut() -> T,
    {
        self.read(|session| session.cast_query(descriptor, factory, Some(observer)))
    }

    /// Reloads `entity` from its identity row.
    ///
    /// # Errors
    /// - `DbError::NotFound` naming table, predicate and arguments.
    pub fn reconstruct<T: Entity>(&self, entity: &mut T) -> DbResult<()> {
        self.read(|session| session.reconstruct(entity))
    }

    /// Inserts one entity in its own transaction; returns the new rowid, if any.
    pub fn insert<T: Entity>(
        &self,
        entity: &mut T,
        parent: Option<&T::Parent>,
    ) -> DbResult<Option<i64>> {
        self.transaction(|session| session.insert(entity, parent))
    }

    /// Updates the row selected by the entity's identity; returns rows affected.
    pub fn update<T: Entity>(&self, entity: &mut T, parent: Option<&T::Parent>) -> DbResult<usize> {
        self.transaction(|session| session.update(entity, parent))
    }

    /// Removes the row selected by the entity's identity; returns rows affected.
    pub fn remove<T: Entity>(&self, entity: &mut T, parent: Option<&T::Parent>) -> DbResult<usize> {
        self.transaction(|session| session.remove(entity, parent))
    }

    /// Upserts one entity following [`StoreConfig::publish_policy`].
    pub fn publish<T: Entity>(&self, entity: &mut T, parent: Option<&T::Parent>) -> DbResult<usize> {
        self.transaction(|session| session.publish(entity, parent))
    }

    /// Inserts a raw row; `None` for tables without a rowid.
    pub fn insert_row(&self, table: &str, values: &RowSnapshot) -> DbResult<Option<i64>> {
        self.transaction(|session| session.insert_row(table, values))
    }

    /// Assigns `values` to every row selected by `target`.
    pub fn update_rows(&self, target: &QueryDescriptor, values: &RowSnapshot) -> DbResult<usize> {
        self.transaction(|session| session.update_rows(target, values))
    }

    /// Deletes every row selected by `target`.
    pub fn remove_rows(&self, target: &QueryDescriptor) -> DbResult<usize> {
        self.transaction(|session| session.remove_rows(target))
    }

    /// Inserts every entity in one transaction.
    ///
    /// A reporter that stops the batch commits the processed prefix; any
    /// failure rolls back the whole batch and returns `DbError::Batch`.
    pub fn insert_all<T: Entity>(
        &self,
        entities: &mut [T],
        parent: Option<&T::Parent>,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> DbResult<BatchOutcome> {
        self.run_batch(BatchOp::InsertAll, progress, |session, progress, outcome| {
            session.insert_each(entities.iter_mut().collect(), parent, progress, outcome)
        })
    }

    /// Batch form of [`Store::update`]; same transaction rules as `insert_all`.
    pub fn update_all<T: Entity>(
        &self,
        entities: &mut [T],
        parent: Option<&T::Parent>,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> DbResult<BatchOutcome> {
        self.run_batch(BatchOp::UpdateAll, progress, |session, progress, outcome| {
            session.update_each(entities.iter_mut().collect(), parent, progress, outcome)
        })
    }

    /// Batch form of [`Store::remove`]; same transaction rules as `insert_all`.
    pub fn remove_all<T: Entity>(
        &self,
        entities: &mut [T],
        parent: Option<&T::Parent>,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> DbResult<BatchOutcome> {
        self.run_batch(BatchOp::RemoveAll, progress, |session, progress, outcome| {
            session.remove_each(entities.iter_mut().collect(), parent, progress, outcome)
        })
    }

    /// Batch upsert: existence is probed per entity before any write happens.
    pub fn publish_all<T: Entity>(
        &self,
        entities: &mut [T],
        parent: Option<&T::Parent>,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> DbResult<BatchOutcome> {
        self.run_batch(BatchOp::PublishAll, progress, |session, progress, outcome| {
            session.publish_each(entities.iter_mut().collect(), parent, progress, outcome)
        })
    }

    /// Removes, hooks included, every entity selected by `descriptor`.
    ///
    /// Rows that fail to cast are reported to `observer` and left in place.
    pub fn remove_matching<T, F>(
        &self,
        descriptor: &QueryDescriptor,
        factory: F,
        observer: Option<&mut dyn CastObserver<T>>,
        parent: Option<&T::Parent>,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> DbResult<BatchOutcome>
    where
        T: Entity,
        F: FnMut() -> T,
    {
        self.run_batch(BatchOp::RemoveMatching, progress, |session, progress, outcome| {
            session.remove_matching_each(descriptor, factory, observer, parent, progress, outcome)
        })
    }

    fn run_batch<F>(
        &self,
        op: BatchOp,
        reporter: Option<&mut dyn ProgressReporter>,
        work: F,
    ) -> DbResult<BatchOutcome>
    where
        F: FnOnce(&Session<'_>, &mut Progress<'_>, &mut BatchOutcome) -> DbResult<()>,
    {
        let started_at = Instant::now();
        let mut progress = Progress::new(reporter);
        let mut outcome = BatchOutcome::default();

        let result = self.transaction(|session| work(session, &mut progress, &mut outcome));
        match result {
            Ok(()) => {
                info!(
                    "event=batch module=store status=ok op={} total={} processed={} affected_rows={} cancelled={} duration_ms={}",
                    op.as_str(),
                    outcome.total,
                    outcome.processed,
                    outcome.affected_rows,
                    outcome.cancelled,
                    started_at.elapsed().as_millis()
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(
                    "event=batch module=store status=error op={} processed={} duration_ms={} error={}",
                    op.as_str(),
                    outcome.processed,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(DbError::Batch {
                    operation: op.as_str(),
                    processed: outcome.processed,
                    source: Box::new(err),
                })
            }
        }
    }

    fn read<R, F>(&self, work: F) -> DbResult<R>
    where
        F: FnOnce(&Session<'_>) -> DbResult<R>,
    {
        let conn = self.lock_connection();
        work(&Session::new(&conn, &self.config))
    }

    fn publish_committed(&self, staged: ChangeSet) -> DbResult<()> {
        self.changes.absorb(staged)?;
        self.changes.flush()?;
        Ok(())
    }

    /// A panic inside `transaction` drops the `Transaction` (rolling back)
    /// before the guard, so a poisoned connection is still consistent.
    fn lock_connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("event=lock_recover module=store status=ok lock=connection");
            poisoned.into_inner()
        })
    }
}
