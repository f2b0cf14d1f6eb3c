//! SQL dialect rendering.
//!
//! This module is the only place SQL text is produced: identifier quoting,
//! literal rendering and full statement rendering for the supported
//! databases. Rendering is deterministic — the same statement renders to the
//! same text every time.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expression::ColumnExpression;
use crate::statement::{StatementKind, TableStatement};
use crate::value::Value;

/// A supported database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// The dialect name, as used in logs and configuration.
    pub const fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
        }
    }

    /// Quote an identifier (table/column name).
    ///
    /// SQLite and PostgreSQL use double quotes, MySQL uses backticks;
    /// embedded quote characters are escaped by doubling. Safe for any
    /// input string.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Render a value as a SQL literal.
    ///
    /// Fails with an unsupported-value error for values that have no
    /// representation (non-finite floats, malformed decimals).
    pub fn render_value(&self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bool(b) => Ok(match self {
                // SQLite has no boolean literals.
                Dialect::Sqlite => if *b { "1" } else { "0" }.to_string(),
                Dialect::Postgres | Dialect::Mysql => {
                    if *b { "TRUE" } else { "FALSE" }.to_string()
                }
            }),
            Value::Int(v) => Ok(v.to_string()),
            Value::BigInt(v) => Ok(v.to_string()),
            Value::Double(v) => {
                if !v.is_finite() {
                    return Err(Error::unsupported(
                        value.type_name(),
                        None,
                        format!("{v} has no SQL literal"),
                    ));
                }
                Ok(v.to_string())
            }
            Value::Decimal(s) => {
                // Validated rather than escaped: a decimal is emitted unquoted.
                if s.parse::<f64>().is_err() {
                    return Err(Error::unsupported(
                        value.type_name(),
                        None,
                        format!("{s:?} is not a numeric literal"),
                    ));
                }
                Ok(s.clone())
            }
            Value::Text(s) => Ok(self.quote_string(s)),
            Value::Bytes(bytes) => Ok(self.render_bytes(bytes)),
            Value::Uuid(bytes) => Ok(self.quote_string(&format_uuid(bytes))),
            Value::Json(json) => {
                let text = serde_json::to_string(json).map_err(|e| {
                    Error::unsupported(value.type_name(), None, e.to_string())
                })?;
                Ok(self.quote_string(&text))
            }
        }
    }

    /// Render a column expression.
    pub fn render_expression(&self, expr: &ColumnExpression) -> Result<String> {
        match expr {
            ColumnExpression::Null => Ok("NULL".to_string()),
            ColumnExpression::Literal(value) => self.render_value(value),
            ColumnExpression::Raw(sql) => Ok(sql.clone()),
        }
    }

    /// Render a complete statement as SQL text, without trailing terminator.
    pub fn render(&self, statement: &TableStatement) -> Result<String> {
        let sql = match statement.kind() {
            StatementKind::Insert => self.render_insert(statement)?,
            StatementKind::Update { key_column, key_value } => {
                self.render_update(statement, key_column, key_value)?
            }
        };
        tracing::trace!(dialect = self.name(), sql = %sql, "rendered statement");
        Ok(sql)
    }

    fn render_insert(&self, statement: &TableStatement) -> Result<String> {
        let mut columns = String::new();
        let mut values = String::new();
        for (i, (column, expr)) in statement.assignments().iter().enumerate() {
            if i > 0 {
                columns.push_str(", ");
                values.push_str(", ");
            }
            columns.push_str(&self.quote_ident(column));
            values.push_str(&self.column_expression(column, expr)?);
        }
        Ok(format!(
            "INSERT INTO {} ({columns}) VALUES ({values})",
            self.quote_ident(statement.table())
        ))
    }

    fn render_update(
        &self,
        statement: &TableStatement,
        key_column: &str,
        key_value: &ColumnExpression,
    ) -> Result<String> {
        let mut sets = String::new();
        for (i, (column, expr)) in statement.assignments().iter().enumerate() {
            if i > 0 {
                sets.push_str(", ");
            }
            let _ = write!(
                sets,
                "{} = {}",
                self.quote_ident(column),
                self.column_expression(column, expr)?
            );
        }
        Ok(format!(
            "UPDATE {} SET {sets} WHERE {} = {}",
            self.quote_ident(statement.table()),
            self.quote_ident(key_column),
            self.column_expression(key_column, key_value)?
        ))
    }

    /// Render an expression, attributing conversion failures to the column.
    fn column_expression(&self, column: &str, expr: &ColumnExpression) -> Result<String> {
        self.render_expression(expr).map_err(|e| match e {
            Error::UnsupportedValue(mut inner) => {
                inner.column = Some(column.to_string());
                Error::UnsupportedValue(inner)
            }
            other => other,
        })
    }

    fn quote_string(&self, s: &str) -> String {
        match self {
            // MySQL treats backslash as an escape character by default.
            Dialect::Mysql => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
            Dialect::Sqlite | Dialect::Postgres => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn render_bytes(&self, bytes: &[u8]) -> String {
        let mut hex = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(hex, "{b:02X}");
        }
        match self {
            Dialect::Sqlite | Dialect::Mysql => format!("X'{hex}'"),
            Dialect::Postgres => format!("'\\x{hex}'"),
        }
    }
}

/// Canonical hyphenated UUID form.
fn format_uuid(bytes: &[u8; 16]) -> String {
    let mut hex = String::with_capacity(32);
    for b in bytes {
        let _ = write!(hex, "{b:02x}");
    }
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Identifier Quoting ====================

    #[test]
    fn test_quote_ident_ansi() {
        assert_eq!(Dialect::Sqlite.quote_ident("users"), "\"users\"");
        assert_eq!(Dialect::Postgres.quote_ident("us\"ers"), "\"us\"\"ers\"");
    }

    #[test]
    fn test_quote_ident_mysql() {
        assert_eq!(Dialect::Mysql.quote_ident("users"), "`users`");
        assert_eq!(Dialect::Mysql.quote_ident("us`ers"), "`us``ers`");
    }

    // ==================== Literal Rendering ====================

    #[test]
    fn test_render_booleans_per_dialect() {
        assert_eq!(Dialect::Sqlite.render_value(&Value::Bool(true)).unwrap(), "1");
        assert_eq!(Dialect::Postgres.render_value(&Value::Bool(true)).unwrap(), "TRUE");
        assert_eq!(Dialect::Mysql.render_value(&Value::Bool(false)).unwrap(), "FALSE");
    }

    #[test]
    fn test_render_text_escaping() {
        assert_eq!(
            Dialect::Postgres.render_value(&Value::Text("O'Brien".into())).unwrap(),
            "'O''Brien'"
        );
        assert_eq!(
            Dialect::Mysql.render_value(&Value::Text("a\\b'c".into())).unwrap(),
            "'a\\\\b''c'"
        );
    }

    #[test]
    fn test_render_bytes_per_dialect() {
        let v = Value::Bytes(vec![0xDE, 0xAD]);
        assert_eq!(Dialect::Sqlite.render_value(&v).unwrap(), "X'DEAD'");
        assert_eq!(Dialect::Postgres.render_value(&v).unwrap(), "'\\xDEAD'");
    }

    #[test]
    fn test_render_uuid() {
        let v = Value::Uuid([0; 16]);
        assert_eq!(
            Dialect::Postgres.render_value(&v).unwrap(),
            "'00000000-0000-0000-0000-000000000000'"
        );
    }

    #[test]
    fn test_non_finite_double_is_unsupported() {
        let err = Dialect::Sqlite.render_value(&Value::Double(f64::NAN)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(_)));
    }

    #[test]
    fn test_malformed_decimal_is_unsupported() {
        let err = Dialect::Sqlite
            .render_value(&Value::Decimal("12;DROP TABLE".into()))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValue(_)));
    }

    // ==================== Statement Rendering ====================

    fn sample_insert() -> TableStatement {
        let mut stmt = TableStatement::insert("organisations");
        stmt.set("id", ColumnExpression::Literal(Value::BigInt(1))).unwrap();
        stmt.set("name", ColumnExpression::Literal(Value::Text("acme".into()))).unwrap();
        stmt.set("parent", ColumnExpression::Null).unwrap();
        stmt
    }

    #[test]
    fn test_render_insert() {
        let sql = Dialect::Sqlite.render(&sample_insert()).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"organisations\" (\"id\", \"name\", \"parent\") VALUES (1, 'acme', NULL)"
        );
    }

    #[test]
    fn test_render_update() {
        let mut stmt = TableStatement::update(
            "organisations",
            "id",
            ColumnExpression::Literal(Value::BigInt(2)),
        );
        stmt.set("parent", ColumnExpression::Literal(Value::BigInt(1))).unwrap();
        let sql = Dialect::Mysql.render(&stmt).unwrap();
        assert_eq!(sql, "UPDATE `organisations` SET `parent` = 1 WHERE `id` = 2");
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let stmt = sample_insert();
        let first = Dialect::Postgres.render(&stmt).unwrap();
        let second = Dialect::Postgres.render(&stmt).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unsupported_value_names_the_column() {
        let mut stmt = TableStatement::insert("organisations");
        stmt.set("profit", ColumnExpression::Literal(Value::Double(f64::INFINITY))).unwrap();
        let err = Dialect::Sqlite.render(&stmt).unwrap_err();
        match err {
            Error::UnsupportedValue(e) => assert_eq!(e.column.as_deref(), Some("profit")),
            other => panic!("expected UnsupportedValue, got {other:?}"),
        }
    }
}
