//! The generation driver.
//!
//! Entities are handed over one at a time, in whatever order the caller
//! likes; each call appends the entity's own statements to the sink and then
//! flushes every update that was waiting for this entity's identity. No
//! topological sort happens anywhere: forward references and cycles are
//! absorbed by the pending ledger and resolved as UPDATEs.

use sqlseed_core::{
    Dialect, Error, ModelErrorKind, Result, StatementSink, TableStatement, UnresolvedReference,
};

use crate::graph::{EntityGraph, EntityId};
use crate::identity::{IdentityAllocator, IdentityStrategy};
use crate::pending::{Ledgers, PendingUpdate};
use crate::property::EmitCtx;
use crate::schema::Registry;

/// Counters describing one finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationReport {
    /// Entities persisted.
    pub entities: usize,
    /// Deferred references flushed as UPDATEs or late rows.
    pub flushed: usize,
    /// Identity alignment statements appended at end-of-run.
    pub alignment_statements: usize,
}

/// Drives one generation run against a borrowed sink.
///
/// The ledger and the id counters live inside the generator, so dropping it
/// discards all deferred state; independent runs cannot interfere.
#[derive(Debug)]
pub struct Generator<'s, S: StatementSink> {
    registry: Registry,
    dialect: Dialect,
    sink: &'s mut S,
    ledgers: Ledgers,
    allocator: IdentityAllocator,
    entities: usize,
    flushed: usize,
}

impl<'s, S: StatementSink> Generator<'s, S> {
    /// Create a generator. The registry is validated up front; a structurally
    /// broken model never produces a single statement.
    pub fn new(registry: Registry, dialect: Dialect, sink: &'s mut S) -> Result<Self> {
        registry.validate()?;
        Ok(Self {
            registry,
            dialect,
            sink,
            ledgers: Ledgers::new(),
            allocator: IdentityAllocator::new(),
            entities: 0,
            flushed: 0,
        })
    }

    /// Persist one entity: allocate its identity, append its INSERT and its
    /// plural-property rows, then flush everything that was waiting for it.
    ///
    /// Handing over the same entity twice is an error.
    pub fn write_entity(&mut self, graph: &mut EntityGraph, id: EntityId) -> Result<()> {
        if graph.is_persisted(id) {
            return Err(Error::model(
                ModelErrorKind::AlreadyPersisted,
                format!("{} was already persisted", graph.label(id)),
            ));
        }
        let type_name = graph.entity(id).type_name().to_string();
        let ty = self.registry.require(&type_name)?;
        let identity = self.allocator.allocate(ty, &self.registry, graph, id)?;
        graph.set_identity(id, identity.clone());
        graph.mark_persisted(id);
        tracing::debug!(
            entity = %graph.label(id),
            table = %ty.table,
            identity = ?identity,
            "persisting entity"
        );

        let graph = &*graph;
        let mut ctx = EmitCtx {
            registry: &self.registry,
            graph,
            ledgers: &mut self.ledgers,
            sink: &mut *self.sink,
        };

        let mut statement = TableStatement::insert(&ty.table);
        // Assigned ids reach the row through their own scalar property.
        if !matches!(ty.identity, IdentityStrategy::Assigned { .. }) {
            statement.set(&ty.id_column, identity.clone())?;
        }
        for (index, property) in ty.properties.iter().enumerate() {
            if property.kind.is_singular() {
                ctx.contribute_inline(ty, index, id, &mut statement)?;
            }
        }
        ctx.sink.write(statement)?;

        for (index, property) in ty.properties.iter().enumerate() {
            if !property.kind.is_singular() {
                ctx.emit_own_rows(ty, index, id, &identity)?;
            }
        }

        // The identity is now on record: replay everything registered
        // against this entity, in registration order. A flush may itself
        // defer again (embedded rows with several unresolved references).
        let waiting = ctx.ledgers.take(&type_name, id);
        for update in waiting {
            ctx.flush_pending(id, update)?;
            self.flushed += 1;
        }
        self.entities += 1;
        Ok(())
    }

    /// Persist every not-yet-persisted entity of the graph, in insertion
    /// order. Entities already written through [`Generator::write_entity`]
    /// are skipped, not rejected.
    pub fn write_all(&mut self, graph: &mut EntityGraph) -> Result<()> {
        for id in graph.ids().collect::<Vec<_>>() {
            if !graph.is_persisted(id) {
                self.write_entity(graph, id)?;
            }
        }
        Ok(())
    }

    /// Finish the run: reject dangling references, then append the identity
    /// alignment statements.
    ///
    /// Every dangling reference is reported at once, so the caller sees the
    /// full extent of the problem in one error.
    pub fn finish(mut self, graph: &EntityGraph) -> Result<GenerationReport> {
        if !self.ledgers.is_empty() {
            let dangling = self
                .ledgers
                .drain_remaining()
                .into_iter()
                .map(|(target, update)| self.describe_dangling(graph, target, &update))
                .collect();
            return Err(Error::UnresolvedReferences(dangling));
        }
        let alignment = self.allocator.alignment_statements(&self.registry, self.dialect);
        for sql in &alignment {
            self.sink.write_raw(sql)?;
        }
        tracing::info!(
            entities = self.entities,
            flushed = self.flushed,
            alignment = alignment.len(),
            "generation run finished"
        );
        Ok(GenerationReport {
            entities: self.entities,
            flushed: self.flushed,
            alignment_statements: alignment.len(),
        })
    }

    fn describe_dangling(
        &self,
        graph: &EntityGraph,
        target: EntityId,
        update: &PendingUpdate,
    ) -> UnresolvedReference {
        let property = self
            .registry
            .get(&update.property.owner_type)
            .and_then(|ty| ty.properties.get(update.property.index))
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("property {}", update.property.index));
        UnresolvedReference {
            target: graph.label(target),
            context: graph.label(update.context),
            property,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlseed_core::StatementBuffer;

    use crate::graph::Entity;
    use crate::schema::{EntityType, PropertyKind};

    fn organisation_registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                EntityType::new("Organisation", "organisations", "id", IdentityStrategy::AutoIncrement)
                    .property("name", PropertyKind::Scalar { column: "name".into(), required: true })
                    .property(
                        "parent",
                        PropertyKind::Reference {
                            column: "parent_id".into(),
                            target: "Organisation".into(),
                            required: false,
                        },
                    ),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_forward_reference_becomes_update() {
        let mut graph = EntityGraph::new();
        let child = graph.add(Entity::new("Organisation").scalar("name", "child"));
        let parent = graph.add(Entity::new("Organisation").scalar("name", "parent"));
        graph.set(child, "parent", crate::graph::PropertyValue::Reference(parent));

        let mut sink = StatementBuffer::new(Dialect::Sqlite);
        let mut generator =
            Generator::new(organisation_registry(), Dialect::Sqlite, &mut sink).unwrap();
        generator.write_entity(&mut graph, child).unwrap();
        generator.write_entity(&mut graph, parent).unwrap();
        let report = generator.finish(&graph).unwrap();

        assert_eq!(report.entities, 2);
        assert_eq!(report.flushed, 1);
        let statements = sink.statements();
        // The child's insert omits the parent column entirely.
        assert_eq!(
            statements[0],
            "INSERT INTO \"organisations\" (\"id\", \"name\") VALUES (1, 'child')"
        );
        assert_eq!(
            statements[1],
            "INSERT INTO \"organisations\" (\"id\", \"name\") VALUES (2, 'parent')"
        );
        assert_eq!(
            statements[2],
            "UPDATE \"organisations\" SET \"parent_id\" = 2 WHERE \"id\" = 1"
        );
    }

    #[test]
    fn test_resolved_reference_is_inlined() {
        let mut graph = EntityGraph::new();
        let parent = graph.add(Entity::new("Organisation").scalar("name", "parent"));
        let child = graph.add(
            Entity::new("Organisation").scalar("name", "child").reference("parent", parent),
        );

        let mut sink = StatementBuffer::new(Dialect::Sqlite);
        let mut generator =
            Generator::new(organisation_registry(), Dialect::Sqlite, &mut sink).unwrap();
        generator.write_entity(&mut graph, parent).unwrap();
        generator.write_entity(&mut graph, child).unwrap();
        generator.finish(&graph).unwrap();

        assert_eq!(
            sink.statements()[1],
            "INSERT INTO \"organisations\" (\"id\", \"name\", \"parent_id\") VALUES (2, 'child', 1)"
        );
    }

    #[test]
    fn test_double_persist_is_rejected() {
        let mut graph = EntityGraph::new();
        let id = graph.add(Entity::new("Organisation").scalar("name", "a"));
        let mut sink = StatementBuffer::new(Dialect::Sqlite);
        let mut generator =
            Generator::new(organisation_registry(), Dialect::Sqlite, &mut sink).unwrap();
        generator.write_entity(&mut graph, id).unwrap();
        let err = generator.write_entity(&mut graph, id).unwrap_err();
        assert!(matches!(
            err,
            Error::Model(ref e) if e.kind == ModelErrorKind::AlreadyPersisted
        ));
    }

    #[test]
    fn test_dangling_reference_reported_at_finish() {
        let mut graph = EntityGraph::new();
        let never = graph.add(Entity::new("Organisation").scalar("name", "never"));
        let child = graph.add(
            Entity::new("Organisation").scalar("name", "child").reference("parent", never),
        );

        let mut sink = StatementBuffer::new(Dialect::Sqlite);
        let mut generator =
            Generator::new(organisation_registry(), Dialect::Sqlite, &mut sink).unwrap();
        generator.write_entity(&mut graph, child).unwrap();
        let err = generator.finish(&graph).unwrap_err();
        match err {
            Error::UnresolvedReferences(refs) => {
                assert_eq!(refs.len(), 1);
                assert_eq!(refs[0].target, "Organisation#0");
                assert_eq!(refs[0].context, "Organisation#1");
                assert_eq!(refs[0].property, "parent");
            }
            other => panic!("expected UnresolvedReferences, got {other:?}"),
        }
    }

    #[test]
    fn test_write_all_skips_already_persisted() {
        let mut graph = EntityGraph::new();
        let a = graph.add(Entity::new("Organisation").scalar("name", "a"));
        let _b = graph.add(Entity::new("Organisation").scalar("name", "b"));
        let mut sink = StatementBuffer::new(Dialect::Sqlite);
        let mut generator =
            Generator::new(organisation_registry(), Dialect::Sqlite, &mut sink).unwrap();
        generator.write_entity(&mut graph, a).unwrap();
        generator.write_all(&mut graph).unwrap();
        let report = generator.finish(&graph).unwrap();
        assert_eq!(report.entities, 2);
    }
}
