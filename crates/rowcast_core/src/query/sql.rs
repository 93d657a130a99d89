//! SQL text rendering for descriptors and snapshots.
//!
//! Identifiers are always double-quoted; predicate, grouping and ordering
//! fragments are caller-authored SQL and are emitted verbatim.

use super::descriptor::{Columns, QueryDescriptor};
use crate::db::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub(crate) fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Counts `?` placeholders that are not inside quoted literals or identifiers.
///
/// Only anonymous `?` is accepted. Numbered (`?1`) and named (`:id`, `@id`,
/// `$id`) parameters are rejected: arguments bind positionally, and update
/// statements place the assigned values ahead of the predicate's.
pub(crate) fn count_placeholders(fragment: &str) -> Result<usize, String> {
    let mut count = 0;
    let mut closing: Option<char> = None;
    let mut previous: Option<char> = None;
    let mut chars = fragment.chars().peekable();
    while let Some(ch) = chars.next() {
        match closing {
            Some(end) if ch == end => closing = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => closing = Some(ch),
                '[' => closing = Some(']'),
                '?' => {
                    if chars.peek().is_some_and(char::is_ascii_digit) {
                        return Err(format!(
                            "numbered parameters are not supported in `{fragment}`; use `?`"
                        ));
                    }
                    count += 1;
                }
                ':' | '@' | '$'
                    if !previous.is_some_and(is_identifier_char)
                        && chars.peek().is_some_and(|next| is_identifier_char(*next)) =>
                {
                    return Err(format!(
                        "named parameters are not supported in `{fragment}`; use `?`"
                    ));
                }
                _ => {}
            },
        }
        previous = Some(ch);
    }
    Ok(count)
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

pub(crate) fn ensure_column_names<'a>(
    table: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> DbResult<()> {
    for name in names {
        if !is_identifier(name) {
            return Err(DbError::InvalidDescriptor(format!(
                "column name `{name}` for `{table}` is not a plain identifier"
            )));
        }
    }
    Ok(())
}

pub(crate) fn select_sql(descriptor: &QueryDescriptor) -> String {
    let projection = match descriptor.selected_columns() {
        Columns::All => "*".to_string(),
        Columns::Only(columns) => columns
            .iter()
            .map(|column| {
                if is_identifier(column) {
                    quote_identifier(column)
                } else {
                    column.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!(
        "SELECT {projection} FROM {}",
        quote_identifier(descriptor.table())
    );
    push_where(&mut sql, descriptor);
    if let Some(group_by) = descriptor.group_by_clause() {
        sql.push_str(" GROUP BY ");
        sql.push_str(group_by);
    }
    if let Some(having) = descriptor.having_clause() {
        sql.push_str(" HAVING ");
        sql.push_str(having);
    }
    if let Some(order_by) = descriptor.order_by_clause() {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    if let Some(limit) = descriptor.limit_value() {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql
}

pub(crate) fn insert_sql<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = columns.into_iter().map(quote_identifier).collect();
    if quoted.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table));
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        quoted.join(", "),
        vec!["?"; quoted.len()].join(", ")
    )
}

pub(crate) fn update_sql<'a>(
    descriptor: &QueryDescriptor,
    columns: impl IntoIterator<Item = &'a str>,
) -> String {
    let assignments: Vec<String> = columns
        .into_iter()
        .map(|column| format!("{} = ?", quote_identifier(column)))
        .collect();
    let mut sql = format!(
        "UPDATE {} SET {}",
        quote_identifier(descriptor.table()),
        assignments.join(", ")
    );
    push_where(&mut sql, descriptor);
    sql
}

pub(crate) fn delete_sql(descriptor: &QueryDescriptor) -> String {
    let mut sql = format!("DELETE FROM {}", quote_identifier(descriptor.table()));
    push_where(&mut sql, descriptor);
    sql
}

fn push_where(sql: &mut String, descriptor: &QueryDescriptor) {
    if let Some(predicate) = descriptor.predicate().filter(|value| !value.trim().is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
}
