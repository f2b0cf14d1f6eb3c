//! Row statements.

use crate::error::{Error, Result};
use crate::expression::ColumnExpression;

/// Whether a statement inserts a new row or updates an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// INSERT a new row.
    Insert,
    /// UPDATE the row identified by `key_column = key_value`.
    Update {
        /// Column of the WHERE clause.
        key_column: String,
        /// Value of the WHERE clause.
        key_value: ColumnExpression,
    },
}

/// A mutable row builder for one table.
///
/// A statement accumulates ordered column assignments and is handed to a
/// [`crate::StatementSink`] once fully populated. Assigning the same column
/// twice is a caller error, never a silent merge. Statements carry no SQL
/// text; rendering happens at the sink boundary via [`crate::Dialect`].
#[derive(Debug, Clone, PartialEq)]
pub struct TableStatement {
    table: String,
    kind: StatementKind,
    assignments: Vec<(String, ColumnExpression)>,
}

impl TableStatement {
    /// Start an INSERT statement for the given table.
    pub fn insert(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Insert,
            assignments: Vec::new(),
        }
    }

    /// Start an UPDATE statement for the row where `key_column = key_value`.
    pub fn update(
        table: impl Into<String>,
        key_column: impl Into<String>,
        key_value: ColumnExpression,
    ) -> Self {
        Self {
            table: table.into(),
            kind: StatementKind::Update {
                key_column: key_column.into(),
                key_value,
            },
            assignments: Vec::new(),
        }
    }

    /// Assign a column. Returns an error if the column was already assigned.
    pub fn set(&mut self, column: impl Into<String>, expr: ColumnExpression) -> Result<()> {
        let column = column.into();
        if self.assignments.iter().any(|(c, _)| *c == column) {
            return Err(Error::DuplicateColumn {
                table: self.table.clone(),
                column,
            });
        }
        self.assignments.push((column, expr));
        Ok(())
    }

    /// The target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert or update.
    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// The column assignments, in assignment order.
    pub fn assignments(&self) -> &[(String, ColumnExpression)] {
        &self.assignments
    }

    /// Whether no column has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_insert_accumulates_in_order() {
        let mut stmt = TableStatement::insert("organisations");
        stmt.set("id", ColumnExpression::Literal(Value::BigInt(1))).unwrap();
        stmt.set("name", ColumnExpression::Literal(Value::Text("acme".into()))).unwrap();
        let cols: Vec<&str> = stmt.assignments().iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(cols, vec!["id", "name"]);
        assert_eq!(stmt.kind(), &StatementKind::Insert);
    }

    #[test]
    fn test_duplicate_column_is_an_error() {
        let mut stmt = TableStatement::insert("organisations");
        stmt.set("name", ColumnExpression::Literal(Value::Text("a".into()))).unwrap();
        let err = stmt
            .set("name", ColumnExpression::Literal(Value::Text("b".into())))
            .unwrap_err();
        match err {
            Error::DuplicateColumn { table, column } => {
                assert_eq!(table, "organisations");
                assert_eq!(column, "name");
            }
            other => panic!("expected DuplicateColumn, got {other:?}"),
        }
        // The first assignment is untouched.
        assert_eq!(stmt.assignments().len(), 1);
    }

    #[test]
    fn test_update_carries_key() {
        let stmt = TableStatement::update(
            "organisations",
            "id",
            ColumnExpression::Literal(Value::BigInt(7)),
        );
        match stmt.kind() {
            StatementKind::Update { key_column, key_value } => {
                assert_eq!(key_column, "id");
                assert_eq!(key_value, &ColumnExpression::Literal(Value::BigInt(7)));
            }
            StatementKind::Insert => panic!("expected update"),
        }
        assert!(stmt.is_empty());
    }
}
