//! Offline SQL seed-script generation from in-memory entity graphs.
//!
//! An [`EntityGraph`] holds plain data entities that may reference each other
//! freely, cycles included. A [`Generator`] turns the graph into an ordered
//! stream of INSERT and UPDATE statements without ever sorting it: a
//! reference whose target already has an identity is inlined into the row,
//! and any other reference is deferred and emitted as an UPDATE the moment
//! the target is persisted. References that never resolve are reported
//! together when the run finishes.
//!
//! ```
//! use sqlseed::{
//!     Dialect, Entity, EntityGraph, EntityType, Generator, IdentityStrategy, PropertyKind,
//!     Registry, StatementBuffer,
//! };
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     EntityType::new("Organisation", "organisations", "id", IdentityStrategy::AutoIncrement)
//!         .property("name", PropertyKind::Scalar { column: "name".into(), required: true }),
//! )?;
//!
//! let mut graph = EntityGraph::new();
//! let org = graph.add(Entity::new("Organisation").scalar("name", "acme"));
//!
//! let mut sink = StatementBuffer::new(Dialect::Sqlite);
//! let mut generator = Generator::new(registry, Dialect::Sqlite, &mut sink)?;
//! generator.write_entity(&mut graph, org)?;
//! generator.finish(&graph)?;
//!
//! assert_eq!(
//!     sink.statements(),
//!     ["INSERT INTO \"organisations\" (\"id\", \"name\") VALUES (1, 'acme')"]
//! );
//! # Ok::<(), sqlseed::Error>(())
//! ```

mod generator;
mod graph;
mod identity;
mod pending;
mod property;
mod schema;

pub use sqlseed_core::{
    ColumnExpression, Dialect, Error, ModelError, ModelErrorKind, Result, ScriptWriter,
    StatementBuffer, StatementKind, StatementSink, TableStatement, UnresolvedReference,
    UnsupportedValueError, Value,
};

pub use generator::{GenerationReport, Generator};
pub use graph::{ElementValue, EmbeddedValue, Entity, EntityGraph, EntityId, PropertyValue};
pub use identity::IdentityStrategy;
pub use schema::{
    ElementKind, EntityType, PropertyDescriptor, PropertyKind, Registry, StorageMode,
};
