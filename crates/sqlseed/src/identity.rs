//! Identity allocation.
//!
//! Ids are allocated as absolute numbers while the script is generated, so
//! every reference can be rendered as a plain literal. For databases that
//! maintain their own counters, [`IdentityAllocator::alignment_statements`]
//! produces the end-of-run statements that bring the live counter up to the
//! highest allocated id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlseed_core::{ColumnExpression, Dialect, Error, ModelErrorKind, Result, Value};

use crate::graph::{EntityGraph, EntityId, PropertyValue};
use crate::schema::{EntityType, Registry};

/// How an entity type obtains its persistent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Ids allocated by the generator and written explicitly; the table's
    /// auto-increment counter is aligned at end-of-run.
    AutoIncrement,
    /// Like auto-increment, but the counter lives in a named sequence.
    Sequence {
        /// The sequence name.
        name: String,
    },
    /// The id is taken from a scalar property of the entity, so it is
    /// computable before the entity's own insert appears.
    Assigned {
        /// The property holding the id value.
        property: String,
    },
}

/// Resolve the identity expression of an entity, if it is computable now.
///
/// An entity is resolvable once the driver has assigned its id — or, for
/// assigned-identity types, as soon as the id property carries a value.
pub(crate) fn resolve_identity(
    registry: &Registry,
    graph: &EntityGraph,
    id: EntityId,
) -> Result<Option<ColumnExpression>> {
    if let Some(expr) = graph.identity(id) {
        return Ok(Some(expr.clone()));
    }
    let entity = graph.entity(id);
    let ty = registry.require(entity.type_name())?;
    if let IdentityStrategy::Assigned { property } = &ty.identity {
        match entity.get(property) {
            Some(PropertyValue::Scalar(value)) if !value.is_null() => {
                return Ok(Some(ColumnExpression::Literal(value.clone())));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Per-run id allocator with one counter per table.
#[derive(Debug, Default)]
pub(crate) struct IdentityAllocator {
    next: HashMap<String, i64>,
}

impl IdentityAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate or compute the identity expression for one entity.
    pub(crate) fn allocate(
        &mut self,
        ty: &EntityType,
        registry: &Registry,
        graph: &EntityGraph,
        id: EntityId,
    ) -> Result<ColumnExpression> {
        match &ty.identity {
            IdentityStrategy::AutoIncrement | IdentityStrategy::Sequence { .. } => {
                let counter = self.next.entry(ty.table.clone()).or_insert(1);
                let allocated = *counter;
                *counter += 1;
                Ok(ColumnExpression::Literal(Value::BigInt(allocated)))
            }
            IdentityStrategy::Assigned { property } => {
                resolve_identity(registry, graph, id)?.ok_or_else(|| {
                    Error::model(
                        ModelErrorKind::ValueMismatch,
                        format!(
                            "{}: assigned identity property {property} has no value",
                            graph.label(id)
                        ),
                    )
                })
            }
        }
    }

    /// The highest id allocated for a table, if any was.
    fn high_water(&self, table: &str) -> Option<i64> {
        self.next.get(table).map(|next| next - 1).filter(|n| *n > 0)
    }

    /// Statements that align database-side counters with the allocated ids.
    pub(crate) fn alignment_statements(&self, registry: &Registry, dialect: Dialect) -> Vec<String> {
        let mut statements = Vec::new();
        for ty in registry.types() {
            let Some(max) = self.high_water(&ty.table) else {
                continue;
            };
            let sql = match (&ty.identity, dialect) {
                (IdentityStrategy::Assigned { .. }, _) => continue,
                (IdentityStrategy::Sequence { name }, Dialect::Postgres) => {
                    format!("SELECT setval('{name}', {max})")
                }
                (IdentityStrategy::AutoIncrement, Dialect::Postgres) => format!(
                    "SELECT setval(pg_get_serial_sequence('{}', '{}'), {max})",
                    ty.table, ty.id_column
                ),
                (_, Dialect::Sqlite) => format!(
                    "UPDATE sqlite_sequence SET seq = {max} WHERE name = '{}'",
                    ty.table
                ),
                (_, Dialect::Mysql) => format!(
                    "ALTER TABLE {} AUTO_INCREMENT = {}",
                    dialect.quote_ident(&ty.table),
                    max + 1
                ),
            };
            tracing::debug!(table = %ty.table, max, "aligning identity counter");
            statements.push(sql);
        }
        statements
    }
}
