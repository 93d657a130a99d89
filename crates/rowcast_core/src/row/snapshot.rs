//! Ordered column-to-value mapping.

use crate::entity::MappingError;
use rusqlite::types::Value;
use rusqlite::Row;

/// One row, as an ordered list of uniquely named typed scalars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSnapshot {
    columns: Vec<(String, Value)>,
}

impl RowSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RowSnapshot::put`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    /// Sets `column`, replacing an existing value in place so column order is kept.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(index).1)
    }

    /// Returns a copy without `column`; handy for comparing rows minus generated keys.
    pub fn without(&self, column: &str) -> Self {
        let mut copy = self.clone();
        copy.remove(column);
        copy
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_null(&self, column: &str) -> Result<bool, MappingError> {
        Ok(matches!(self.require(column)?, Value::Null))
    }

    pub fn i64(&self, column: &str) -> Result<i64, MappingError> {
        match self.require(column)? {
            Value::Integer(value) => Ok(*value),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, MappingError> {
        self.optional(column, |snapshot| snapshot.i64(column))
    }

    /// Reads a float; integer storage is widened since SQLite may keep
    /// integral REAL values as integers.
    pub fn f64(&self, column: &str) -> Result<f64, MappingError> {
        match self.require(column)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            other => Err(mismatch(column, "float", other)),
        }
    }

    pub fn opt_f64(&self, column: &str) -> Result<Option<f64>, MappingError> {
        self.optional(column, |snapshot| snapshot.f64(column))
    }

    pub fn text(&self, column: &str) -> Result<&str, MappingError> {
        match self.require(column)? {
            Value::Text(value) => Ok(value.as_str()),
            other => Err(mismatch(column, "text", other)),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<&str>, MappingError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.as_str())),
            other => Err(mismatch(column, "text", other)),
        }
    }

    pub fn blob(&self, column: &str) -> Result<&[u8], MappingError> {
        match self.require(column)? {
            Value::Blob(value) => Ok(value.as_slice()),
            other => Err(mismatch(column, "blob", other)),
        }
    }

    pub fn opt_blob(&self, column: &str) -> Result<Option<&[u8]>, MappingError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Blob(value) => Ok(Some(value.as_slice())),
            other => Err(mismatch(column, "blob", other)),
        }
    }

    pub fn bool(&self, column: &str) -> Result<bool, MappingError> {
        match self.i64(column)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MappingError::Invalid(format!(
                "column `{column}` holds {other}, expected 0 or 1"
            ))),
        }
    }

    /// Copies the current row of a result set, keeping each column's storage class.
    pub(crate) fn from_row(row: &Row<'_>, names: &[String]) -> rusqlite::Result<Self> {
        let mut snapshot = Self {
            columns: Vec::with_capacity(names.len()),
        };
        for (index, name) in names.iter().enumerate() {
            let value = Value::from(row.get_ref(index)?);
            snapshot.put(name.as_str(), value);
        }
        Ok(snapshot)
    }

    fn require(&self, column: &str) -> Result<&Value, MappingError> {
        self.get(column)
            .ok_or_else(|| MappingError::MissingColumn(column.to_string()))
    }

    fn optional<T>(
        &self,
        column: &str,
        read: impl FnOnce(&Self) -> Result<T, MappingError>,
    ) -> Result<Option<T>, MappingError> {
        if self.is_null(column)? {
            return Ok(None);
        }
        read(self).map(Some)
    }
}

impl FromIterator<(String, Value)> for RowSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (column, value) in iter {
            snapshot.put(column, value);
        }
        snapshot
    }
}

fn mismatch(column: &str, expected: &'static str, found: &Value) -> MappingError {
    MappingError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: storage_class(found),
    }
}

fn storage_class(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "float",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}
