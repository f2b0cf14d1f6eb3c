//! Column expressions.

use crate::value::Value;

/// An opaque rendering of a single column value.
///
/// Expressions are what statements carry: either a plain literal, a raw SQL
/// fragment (a sequence reference, a subselect) or NULL. Identity
/// expressions of persisted entities are `ColumnExpression`s too, so a
/// foreign-key column and an ordinary column go through the same path.
///
/// Rendering is done by [`crate::Dialect`] and is deterministic: the same
/// expression renders to the same text every time.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnExpression {
    /// The literal NULL marker.
    Null,
    /// A literal value, rendered per dialect.
    Literal(Value),
    /// A pre-rendered SQL fragment, emitted verbatim.
    Raw(String),
}

impl ColumnExpression {
    /// Check whether this expression renders as NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnExpression::Null | ColumnExpression::Literal(Value::Null))
    }

    /// Wrap a raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        ColumnExpression::Raw(sql.into())
    }
}

impl From<Value> for ColumnExpression {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ColumnExpression::Null,
            other => ColumnExpression::Literal(other),
        }
    }
}
