//! Core types for sqlseed.
//!
//! This crate provides the leaf abstractions of the generator:
//!
//! - `Value` and `ColumnExpression` for single column values
//! - `TableStatement` as the mutable row builder
//! - `StatementSink` with script and buffer implementations
//! - `Dialect` for SQLite / PostgreSQL / MySQL rendering
//! - the shared `Error` type

pub mod dialect;
pub mod error;
pub mod expression;
pub mod sink;
pub mod statement;
pub mod value;

pub use dialect::Dialect;
pub use error::{
    Error, ModelError, ModelErrorKind, Result, UnresolvedReference, UnsupportedValueError,
};
pub use expression::ColumnExpression;
pub use sink::{ScriptWriter, StatementBuffer, StatementSink};
pub use statement::{StatementKind, TableStatement};
pub use value::Value;
