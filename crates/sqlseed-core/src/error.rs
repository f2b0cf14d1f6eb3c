//! Error types for script generation.

use std::fmt;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for all generation operations.
#[derive(Debug)]
pub enum Error {
    /// The entity model is structurally invalid or misused.
    /// Raised during registration or at the start of a run, before any
    /// statement for the offending entity is produced.
    Model(ModelError),
    /// A non-reference value cannot be converted to a column expression.
    UnsupportedValue(UnsupportedValueError),
    /// The same column was assigned twice in one statement.
    DuplicateColumn {
        /// Table of the statement being built.
        table: String,
        /// The column that was assigned a second time.
        column: String,
    },
    /// Pending references that were never flushed, collected at end-of-run.
    UnresolvedReferences(Vec<UnresolvedReference>),
    /// The statement sink failed to accept a statement.
    /// Statements already accepted remain valid; no rollback is attempted.
    Sink(std::io::Error),
}

/// A structural problem in the registered entity model.
#[derive(Debug)]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// A table, column or sequence name is not a valid SQL identifier.
    InvalidIdentifier,
    /// A referenced entity type is not registered.
    UnknownType,
    /// A property lookup (e.g. `mapped_by`) named a property that does
    /// not exist or has the wrong shape.
    UnknownProperty,
    /// A property descriptor combination is not allowed.
    InvalidMapping,
    /// An entity instance does not match its declared property kind.
    ValueMismatch,
    /// The same entity was handed to the driver more than once.
    AlreadyPersisted,
    /// Internal bookkeeping no longer matches the model; a bug, not bad input.
    Inconsistent,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A value that has no representation as a column expression.
#[derive(Debug)]
pub struct UnsupportedValueError {
    /// The value's type name, as reported by `Value::type_name`.
    pub type_name: &'static str,
    /// The column the value was destined for, when known.
    pub column: Option<String>,
    /// Why the conversion failed.
    pub reason: String,
}

/// One dangling reference, reported at end-of-run.
///
/// Labels are display strings (`Type#index`) because the referenced
/// instances no longer matter once the run is over; only the caller-facing
/// description does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// The entity that was referenced but never persisted.
    pub target: String,
    /// The entity that holds the reference.
    pub context: String,
    /// The property on the context entity that produced the reference.
    pub property: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Model(e) => write!(f, "model error ({:?}): {}", e.kind, e.message),
            Error::UnsupportedValue(e) => {
                write!(f, "unsupported {} value", e.type_name)?;
                if let Some(column) = &e.column {
                    write!(f, " for column {column}")?;
                }
                write!(f, ": {}", e.reason)
            }
            Error::DuplicateColumn { table, column } => {
                write!(f, "column {column} assigned twice in statement for table {table}")
            }
            Error::UnresolvedReferences(refs) => {
                write!(f, "{} unresolved reference(s):", refs.len())?;
                for r in refs {
                    write!(f, " [{} referenced by {}.{}]", r.target, r.context, r.property)?;
                }
                Ok(())
            }
            Error::Sink(e) => write!(f, "sink error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Sink(e)
    }
}

impl Error {
    /// Shorthand for a model error.
    pub fn model(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Error::Model(ModelError::new(kind, message))
    }

    /// Shorthand for an unsupported-value error.
    pub fn unsupported(
        type_name: &'static str,
        column: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Error::UnsupportedValue(UnsupportedValueError {
            type_name,
            column: column.map(str::to_string),
            reason: reason.into(),
        })
    }
}
