//! Statement sinks.
//!
//! A sink is an ordered, append-only destination for finished statements.
//! The append order is the only thing that encodes referential correctness,
//! so sinks must never reorder, deduplicate or batch across caller
//! boundaries.

use std::io::Write;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::statement::TableStatement;

/// An ordered, append-only destination for finished statements.
pub trait StatementSink {
    /// Accept a completed statement. Statements must be preserved in call
    /// order; a statement handed over here is never mutated again.
    fn write(&mut self, statement: TableStatement) -> Result<()>;

    /// Accept a pre-rendered statement (e.g. a sequence alignment) that has
    /// no row structure. Ordered like any other statement.
    fn write_raw(&mut self, sql: &str) -> Result<()>;
}

/// Renders statements and writes them to any [`io::Write`] as a SQL script,
/// one `<statement>;` per line.
///
/// Statements are fully rendered before the first byte is written, so a
/// failed conversion never leaves a partial row in the output.
pub struct ScriptWriter<W: Write> {
    dialect: Dialect,
    out: W,
    written: usize,
}

impl<W: Write> ScriptWriter<W> {
    /// Create a writer targeting the given dialect.
    pub fn new(dialect: Dialect, out: W) -> Self {
        Self {
            dialect,
            out,
            written: 0,
        }
    }

    /// Number of statements written so far.
    pub fn count(&self) -> usize {
        self.written
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatementSink for ScriptWriter<W> {
    fn write(&mut self, statement: TableStatement) -> Result<()> {
        let sql = self.dialect.render(&statement)?;
        self.write_raw(&sql)
    }

    fn write_raw(&mut self, sql: &str) -> Result<()> {
        writeln!(self.out, "{sql};")?;
        self.written += 1;
        Ok(())
    }
}

/// Collects rendered statements in memory, in append order.
///
/// Used by tests and by callers that post-process the script themselves.
#[derive(Debug)]
pub struct StatementBuffer {
    dialect: Dialect,
    statements: Vec<String>,
}

impl StatementBuffer {
    /// Create an empty buffer targeting the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// The rendered statements, in append order, without terminators.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Consume the buffer.
    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }

    /// Number of statements accepted.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether no statement was accepted yet.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl StatementSink for StatementBuffer {
    fn write(&mut self, statement: TableStatement) -> Result<()> {
        let sql = self.dialect.render(&statement)?;
        self.statements.push(sql);
        Ok(())
    }

    fn write_raw(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ColumnExpression;
    use crate::value::Value;

    fn stmt(table: &str, id: i64) -> TableStatement {
        let mut s = TableStatement::insert(table);
        s.set("id", ColumnExpression::Literal(Value::BigInt(id))).unwrap();
        s
    }

    #[test]
    fn test_buffer_preserves_order() {
        let mut sink = StatementBuffer::new(Dialect::Sqlite);
        sink.write(stmt("a", 1)).unwrap();
        sink.write(stmt("b", 2)).unwrap();
        sink.write(stmt("a", 3)).unwrap();
        let out = sink.into_statements();
        assert_eq!(out.len(), 3);
        assert!(out[0].contains("\"a\""));
        assert!(out[1].contains("\"b\""));
        assert!(out[2].ends_with("(3)"));
    }

    #[test]
    fn test_script_writer_terminates_statements() {
        let mut sink = ScriptWriter::new(Dialect::Sqlite, Vec::new());
        sink.write(stmt("a", 1)).unwrap();
        sink.write_raw("UPDATE sqlite_sequence SET seq = 1 WHERE name = 'a'").unwrap();
        assert_eq!(sink.count(), 2);
        let script = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            script,
            "INSERT INTO \"a\" (\"id\") VALUES (1);\nUPDATE sqlite_sequence SET seq = 1 WHERE name = 'a';\n"
        );
    }

    #[test]
    fn test_failed_render_writes_nothing() {
        let mut sink = ScriptWriter::new(Dialect::Sqlite, Vec::new());
        let mut bad = TableStatement::insert("a");
        bad.set("x", ColumnExpression::Literal(Value::Double(f64::NAN))).unwrap();
        assert!(sink.write(bad).is_err());
        assert_eq!(sink.count(), 0);
        assert!(sink.into_inner().is_empty());
    }
}
