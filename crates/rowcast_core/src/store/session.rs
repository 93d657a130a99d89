//! Connection-scoped read/write operations.
//!
//! # Responsibility
//! - Execute descriptors and turn result rows into snapshots or entities.
//! - Run entity lifecycle hooks around raw writes.
//! - Stage change records until the owning store commits.
//!
//! # Invariants
//! - Staged records are discarded with the session on rollback.
//! - Batch loops consult progress before every item.

use super::batch::{group_by_table, BatchOutcome};
use crate::changes::{ChangeKind, ChangeSet};
use crate::db::{DbError, DbResult, PublishPolicy, StoreConfig};
use crate::entity::{CastObserver, Entity, LoadObserver};
use crate::progress::Progress;
use crate::query::{sql, QueryDescriptor};
use crate::row::{RowSnapshot, Value};
use log::{debug, warn};
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};
use std::cell::RefCell;
use std::time::Instant;

/// Engine operations bound to one connection, usually inside a transaction.
///
/// Sessions are handed out by [`Store`](super::Store) and passed to entity
/// hooks; everything done through one joins the caller's transaction.
pub struct Session<'conn> {
    conn: &'conn Connection,
    config: &'conn StoreConfig,
    staged: RefCell<ChangeSet>,
}

impl<'conn> Session<'conn> {
    pub(crate) fn new(conn: &'conn Connection, config: &'conn StoreConfig) -> Self {
        Self {
            conn,
            config,
            staged: RefCell::new(ChangeSet::new()),
        }
    }

    /// Raw handle of the active transaction, for statements this crate does not model.
    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    /// Records staged by this session so far.
    pub fn staged_changes(&self) -> ChangeSet {
        self.staged.borrow().clone()
    }

    pub(crate) fn into_changes(self) -> ChangeSet {
        self.staged.into_inner()
    }

    /// Runs `descriptor` and returns every matching row; empty when none match.
    ///
    /// # Errors
    /// - `DbError::InvalidDescriptor` when the descriptor fails validation.
    /// - `DbError::Query` when the table or a column does not exist.
    pub fn query(&self, descriptor: &QueryDescriptor) -> DbResult<Vec<RowSnapshot>> {
        self.query_observed(descriptor, None)
    }

    /// [`Session::query`] with a per-row `observer`.
    ///
    /// `on_open` runs once before the first row, `on_load` for every row
    /// before it joins the result. Neither runs for an empty result.
    pub fn query_observed(
        &self,
        descriptor: &QueryDescriptor,
        mut observer: Option<&mut dyn LoadObserver>,
    ) -> DbResult<Vec<RowSnapshot>> {
        descriptor.validate()?;
        let started_at = Instant::now();
        let table = descriptor.table();
        let statement = sql::select_sql(descriptor);

        let mut prepared = self
            .conn
            .prepare_cached(&statement)
            .map_err(|source| query_failed(table, source))?;
        let names: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = prepared
            .query(params_from_iter(descriptor.args()))
            .map_err(|source| query_failed(table, source))?;

        let mut snapshots = Vec::new();
        while let Some(row) = rows.next().map_err(|source| query_failed(table, source))? {
            let mut snapshot =
                RowSnapshot::from_row(row, &names).map_err(|source| query_failed(table, source))?;
            if let Some(observer) = observer.as_deref_mut() {
                if snapshots.is_empty() {
                    observer.on_open(&names);
                }
                observer.on_load(&mut snapshot);
            }
            snapshots.push(snapshot);
        }

        debug!(
            "event=query module=store status=ok table={table} rows={} duration_ms={}",
            snapshots.len(),
            started_at.elapsed().as_millis()
        );
        Ok(snapshots)
    }

    /// First row matching `descriptor`; the descriptor itself is left unchanged.
    pub fn query_one(&self, descriptor: &QueryDescriptor) -> DbResult<Option<RowSnapshot>> {
        Ok(self.query(&descriptor.with_limit(1))?.into_iter().next())
    }

    pub fn exists(&self, descriptor: &QueryDescriptor) -> DbResult<bool> {
        let probe = descriptor.clone().columns(["1"]);
        Ok(self.query_one(&probe)?.is_some())
    }

    /// Builds one entity per row via `factory` and its `reconstruct`.
    ///
    /// Rows that fail reconstruction are skipped, logged and reported to
    /// `observer`; row order follows the descriptor's `order_by`.
    pub fn cast_query<T, F>(
        &self,
        descriptor: &QueryDescriptor,
        mut factory: F,
        mut observer: Option<&mut dyn CastObserver<T>>,
    ) -> DbResult<Vec<T>>
    where
        T: Entity,
        F: FnMut() -> T,
    {
        let rows = self.query(descriptor)?;
        let mut entities = Vec::with_capacity(rows.len());
        let mut skipped = 0_usize;

        for row in rows {
            let mut entity = factory();
            match entity.reconstruct(&row) {
                Ok(()) => {
                    if let Some(observer) = observer.as_deref_mut() {
                        observer.on_reconstructed(&row, &entity);
                    }
                    entities.push(entity);
                }
                Err(err) => {
                    skipped += 1;
                    warn!(
                        "event=cast_query module=store status=skip table={} error={}",
                        descriptor.table(),
                        err
                    );
                    if let Some(observer) = observer.as_deref_mut() {
                        observer.on_skipped(&row, &err);
                    }
                }
            }
        }

        debug!(
            "event=cast_query module=store status=ok table={} entities={} skipped={skipped}",
            descriptor.table(),
            entities.len()
        );
        Ok(entities)
    }

    /// Reloads `entity` from the row selected by its identity.
    ///
    /// # Errors
    /// - `DbError::NotFound` naming table, predicate and arguments.
    /// - `DbError::Mapping` when the row cannot populate the entity.
    pub fn reconstruct<T: Entity>(&self, entity: &mut T) -> DbResult<()> {
        let identity = entity.identity();
        let row = self.query_one(&identity)?.ok_or_else(|| {
            DbError::not_found(identity.table(), identity.predicate(), identity.args())
        })?;
        entity.reconstruct(&row)?;
        Ok(())
    }

    /// Inserts `values` into `table`; returns the new rowid.
    ///
    /// `None` when no row was written or when `table` has no rowid
    /// (`WITHOUT ROWID` tables, views).
    pub fn insert_row(&self, table: &str, values: &RowSnapshot) -> DbResult<Option<i64>> {
        Ok(self.insert_counted(table, values)?.1)
    }

    /// Assigns `values` to every row selected by `target`; returns the affected count.
    pub fn update_rows(&self, target: &QueryDescriptor, values: &RowSnapshot) -> DbResult<usize> {
        target.validate()?;
        let table = target.table();
        sql::ensure_column_names(table, values.column_names())?;
        if values.is_empty() {
            debug!("event=update module=store status=skip table={table} reason=no_values");
            return Ok(0);
        }

        let statement = sql::update_sql(target, values.column_names());
        let args: Vec<Value> = target.args().iter().cloned().map(Value::Text).collect();
        let affected = self.execute_write(table, &statement, values.values().chain(args.iter()))?;
        self.stage(table, ChangeKind::Update, affected);
        Ok(affected)
    }

    /// Deletes every row selected by `target`; returns the affected count.
    pub fn remove_rows(&self, target: &QueryDescriptor) -> DbResult<usize> {
        target.validate()?;
        let table = target.table();
        let statement = sql::delete_sql(target);
        let affected = self.execute_write(table, &statement, target.args())?;
        self.stage(table, ChangeKind::Remove, affected);
        Ok(affected)
    }

    /// Runs `on_create`, then inserts the entity's values into its table.
    pub fn insert<T: Entity>(
        &self,
        entity: &mut T,
        parent: Option<&T::Parent>,
    ) -> DbResult<Option<i64>> {
        entity.on_create(self, parent)?;
        let identity = entity.identity();
        self.insert_row(identity.table(), &entity.values())
    }

    /// Runs `on_update`, then rewrites the row selected by the entity's identity.
    pub fn update<T: Entity>(&self, entity: &mut T, parent: Option<&T::Parent>) -> DbResult<usize> {
        entity.on_update(self, parent)?;
        self.update_rows(&entity.identity(), &entity.values())
    }

    /// Runs `on_remove`, then deletes the row selected by the entity's identity.
    pub fn remove<T: Entity>(&self, entity: &mut T, parent: Option<&T::Parent>) -> DbResult<usize> {
        entity.on_remove(self, parent)?;
        self.remove_rows(&entity.identity())
    }

    /// Upsert following the configured [`PublishPolicy`]; returns rows written.
    pub fn publish<T: Entity>(&self, entity: &mut T, parent: Option<&T::Parent>) -> DbResult<usize> {
        match self.config.publish_policy {
            PublishPolicy::UpdateThenInsert => {
                let updated = self.update(entity, parent)?;
                if updated > 0 {
                    return Ok(updated);
                }
                self.insert_written(entity, parent)
            }
            PublishPolicy::ProbeFirst => {
                if self.exists(&entity.identity())? {
                    self.update(entity, parent)
                } else {
                    self.insert_written(entity, parent)
                }
            }
        }
    }

    pub fn insert_each<T: Entity>(
        &self,
        entities: Vec<&mut T>,
        parent: Option<&T::Parent>,
        progress: &mut Progress<'_>,
        outcome: &mut BatchOutcome,
    ) -> DbResult<()> {
        announce(entities.len(), progress, outcome);
        self.write_each(entities, progress, outcome, |entity| {
            self.insert_written(entity, parent)
        })
    }

    pub fn update_each<T: Entity>(
        &self,
        entities: Vec<&mut T>,
        parent: Option<&T::Parent>,
        progress: &mut Progress<'_>,
        outcome: &mut BatchOutcome,
    ) -> DbResult<()> {
        announce(entities.len(), progress, outcome);
        self.write_each(entities, progress, outcome, |entity| self.update(entity, parent))
    }

    pub fn remove_each<T: Entity>(
        &self,
        entities: Vec<&mut T>,
        parent: Option<&T::Parent>,
        progress: &mut Progress<'_>,
        outcome: &mut BatchOutcome,
    ) -> DbResult<()> {
        announce(entities.len(), progress, outcome);
        self.write_each(entities, progress, outcome, |entity| self.remove(entity, parent))
    }

    /// Splits entities into existing and new by probing each identity, then
    /// updates the former and inserts the latter.
    ///
    /// Two new entities sharing one identity both land in the insert phase,
    /// so a unique key on that identity fails the batch.
    pub fn publish_each<T: Entity>(
        &self,
        entities: Vec<&mut T>,
        parent: Option<&T::Parent>,
        progress: &mut Progress<'_>,
        outcome: &mut BatchOutcome,
    ) -> DbResult<()> {
        announce(entities.len(), progress, outcome);

        let mut updates = Vec::new();
        let mut inserts = Vec::new();
        for entity in entities {
            if self.exists(&entity.identity())? {
                updates.push(entity);
            } else {
                inserts.push(entity);
            }
        }
        debug!(
            "event=publish_partition module=store status=ok updates={} inserts={}",
            updates.len(),
            inserts.len()
        );

        self.write_each(updates, progress, outcome, |entity| self.update(entity, parent))?;
        self.write_each(inserts, progress, outcome, |entity| {
            self.insert_written(entity, parent)
        })
    }

    /// Casts the rows selected by `descriptor` and removes each resulting entity.
    ///
    /// `observer` sees the cast exactly as in [`Session::cast_query`]; skipped
    /// rows are left in place.
    pub fn remove_matching_each<T, F>(
        &self,
        descriptor: &QueryDescriptor,
        factory: F,
        observer: Option<&mut dyn CastObserver<T>>,
        parent: Option<&T::Parent>,
        progress: &mut Progress<'_>,
        outcome: &mut BatchOutcome,
    ) -> DbResult<()>
    where
        T: Entity,
        F: FnMut() -> T,
    {
        let mut entities = self.cast_query(descriptor, factory, observer)?;
        self.remove_each(entities.iter_mut().collect(), parent, progress, outcome)
    }

    fn write_each<'e, T, W>(
        &self,
        entities: Vec<&'e mut T>,
        progress: &mut Progress<'_>,
        outcome: &mut BatchOutcome,
        mut write: W,
    ) -> DbResult<()>
    where
        T: Entity + 'e,
        W: FnMut(&mut T) -> DbResult<usize>,
    {
        let entities = if self.config.group_by_table {
            group_by_table(entities)
        } else {
            entities
        };

        for entity in entities {
            if outcome.cancelled || !progress.should_continue() {
                outcome.cancelled = true;
                break;
            }
            let affected = write(entity)?;
            outcome.processed += 1;
            outcome.affected_rows += affected as u64;
            progress.advance();
        }
        Ok(())
    }

    fn execute_write<I>(&self, table: &str, statement: &str, params: I) -> DbResult<usize>
    where
        I: IntoIterator,
        I::Item: ToSql,
    {
        let mut prepared = self
            .conn
            .prepare_cached(statement)
            .map_err(|source| write_conflict(table, source))?;
        prepared
            .execute(params_from_iter(params))
            .map_err(|source| write_conflict(table, source))
    }

    /// `insert` yielding the affected row count, which stays correct for
    /// tables without a rowid.
    fn insert_written<T: Entity>(
        &self,
        entity: &mut T,
        parent: Option<&T::Parent>,
    ) -> DbResult<usize> {
        entity.on_create(self, parent)?;
        let identity = entity.identity();
        Ok(self.insert_counted(identity.table(), &entity.values())?.0)
    }

    fn insert_counted(&self, table: &str, values: &RowSnapshot) -> DbResult<(usize, Option<i64>)> {
        QueryDescriptor::new(table).validate()?;
        sql::ensure_column_names(table, values.column_names())?;

        let statement = sql::insert_sql(table, values.column_names());
        let affected = self.execute_write(table, &statement, values.values())?;
        self.stage(table, ChangeKind::Insert, affected);
        if affected == 0 || !self.has_rowid(table)? {
            return Ok((affected, None));
        }
        Ok((affected, Some(self.conn.last_insert_rowid())))
    }

    /// `last_insert_rowid` is only meaningful for rowid tables; other targets
    /// leave the previous insert's value in place.
    fn has_rowid(&self, table: &str) -> DbResult<bool> {
        let mut prepared = self
            .conn
            .prepare_cached(
                "SELECT type, wr FROM pragma_table_list WHERE name = ?1 \
                 ORDER BY schema = 'main' DESC LIMIT 1",
            )
            .map_err(|source| query_failed(table, source))?;
        let kind = prepared
            .query_row([table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()
            .map_err(|source| query_failed(table, source))?;
        Ok(matches!(kind, Some((kind, 0)) if kind == "table" || kind == "virtual"))
    }

    fn stage(&self, table: &str, kind: ChangeKind, affected: usize) {
        let affected = i64::try_from(affected).unwrap_or(i64::MAX);
        if !self.staged.borrow_mut().record(table, kind, affected) {
            debug!(
                "event=change_skip module=store status=skip table={table} kind={} affected_rows=0",
                kind.as_str()
            );
        }
    }
}

fn announce(count: usize, progress: &mut Progress<'_>, outcome: &mut BatchOutcome) {
    progress.add_to_total(count);
    outcome.total += count;
}

fn query_failed(table: &str, source: rusqlite::Error) -> DbError {
    DbError::Query {
        table: table.to_string(),
        source,
    }
}

fn write_conflict(table: &str, source: rusqlite::Error) -> DbError {
    DbError::WriteConflict {
        table: table.to_string(),
        source,
    }
}
