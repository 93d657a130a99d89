//! Query descriptor value type.

use super::sql::{count_placeholders, is_identifier};
use crate::db::{DbError, DbResult};

/// Column projection of a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Columns {
    #[default]
    All,
    /// Plain names are quoted when rendered; anything else (`COUNT(*)`,
    /// `1`) passes through verbatim.
    Only(Vec<String>),
}

/// Description of a table read or of the rows a write targets.
///
/// Built with consuming builder methods; `with_limit` copies instead, so a
/// shared descriptor can be narrowed without affecting other readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    table: String,
    columns: Columns,
    predicate: Option<String>,
    args: Vec<String>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl QueryDescriptor {
    /// Targets every row of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Columns::All,
            predicate: None,
            args: Vec::new(),
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Columns::Only(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the predicate (`id = ? AND kind = ?`) and its positional arguments.
    pub fn filter<I, S>(mut self, predicate: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicate = Some(predicate.into());
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    pub fn having(mut self, clause: impl Into<String>) -> Self {
        self.having = Some(clause.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns a copy of this descriptor with `limit` replaced.
    pub fn with_limit(&self, limit: u32) -> Self {
        self.clone().limit(limit)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn selected_columns(&self) -> &Columns {
        &self.columns
    }

    pub fn predicate(&self) -> Option<&str> {
        self.predicate.as_deref()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn group_by_clause(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    pub fn having_clause(&self) -> Option<&str> {
        self.having.as_deref()
    }

    pub fn order_by_clause(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    /// Checks the table name, the placeholder/argument balance and the limit.
    ///
    /// # Errors
    /// - `DbError::InvalidDescriptor` describing the first violated rule.
    pub fn validate(&self) -> DbResult<()> {
        if !is_identifier(&self.table) {
            return Err(DbError::InvalidDescriptor(format!(
                "table name `{}` is not a plain identifier",
                self.table
            )));
        }

        if let Columns::Only(columns) = &self.columns {
            if columns.is_empty() {
                return Err(DbError::InvalidDescriptor(format!(
                    "empty column list for `{}`",
                    self.table
                )));
            }
        }

        let placeholders = self
            .predicate
            .as_deref()
            .map_or(Ok(0), count_placeholders)
            .map_err(DbError::InvalidDescriptor)?;
        if placeholders != self.args.len() {
            return Err(DbError::InvalidDescriptor(format!(
                "predicate `{}` has {placeholders} placeholder(s) but {} argument(s) were given",
                self.predicate.as_deref().unwrap_or_default(),
                self.args.len()
            )));
        }

        if self.limit == Some(0) {
            return Err(DbError::InvalidDescriptor("limit must be positive".to_string()));
        }

        Ok(())
    }
}
