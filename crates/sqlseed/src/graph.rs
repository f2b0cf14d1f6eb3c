//! The in-memory entity graph.
//!
//! Entities live in an arena and reference each other through plain
//! [`EntityId`]s, so cyclic graphs need no reference counting and no interior
//! mutability. The persistent identity of an entity is an explicit
//! `Option<ColumnExpression>` set once by the generation driver, never
//! inferred from the entity's field state.

use std::collections::HashMap;

use sqlseed_core::{ColumnExpression, Value};

/// Handle to one entity inside an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(usize);

impl EntityId {
    /// The arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The value of one property slot on an entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A scalar column value. `Value::Null` is an explicit null; an absent
    /// slot means "leave the column out entirely".
    Scalar(Value),
    /// A singular reference to another entity in the same graph.
    Reference(EntityId),
    /// An ordered collection of elements.
    Collection(Vec<ElementValue>),
    /// A keyed collection. Keys may be `Value::Null`; null keys are written
    /// as literal NULL, never dropped.
    Map(Vec<(Value, ElementValue)>),
}

/// One element of a plural property.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// A null element. Produces a row with a NULL value column in
    /// join-table storage, preserving collection cardinality.
    Null,
    /// A primitive element.
    Scalar(Value),
    /// A reference to another entity.
    Entity(EntityId),
    /// A flat value object written inline into the container row.
    Embedded(EmbeddedValue),
}

/// A flat bundle of singular values with no identity of its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedValue {
    values: HashMap<String, PropertyValue>,
}

impl EmbeddedValue {
    /// Create an empty embedded value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar field.
    #[must_use]
    pub fn scalar(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), PropertyValue::Scalar(value.into()));
        self
    }

    /// Set a reference field.
    #[must_use]
    pub fn reference(mut self, field: impl Into<String>, target: EntityId) -> Self {
        self.values.insert(field.into(), PropertyValue::Reference(target));
        self
    }

    /// Read a field, if present.
    pub fn get(&self, field: &str) -> Option<&PropertyValue> {
        self.values.get(field)
    }
}

/// One entity instance: a type name plus named property slots.
#[derive(Debug, Clone)]
pub struct Entity {
    type_name: String,
    values: HashMap<String, PropertyValue>,
}

impl Entity {
    /// Create an entity of the given registered type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            values: HashMap::new(),
        }
    }

    /// The entity type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Set a scalar property.
    #[must_use]
    pub fn scalar(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(property.into(), PropertyValue::Scalar(value.into()));
        self
    }

    /// Set a singular reference property.
    #[must_use]
    pub fn reference(mut self, property: impl Into<String>, target: EntityId) -> Self {
        self.values.insert(property.into(), PropertyValue::Reference(target));
        self
    }

    /// Set a collection property.
    #[must_use]
    pub fn collection(
        mut self,
        property: impl Into<String>,
        elements: Vec<ElementValue>,
    ) -> Self {
        self.values.insert(property.into(), PropertyValue::Collection(elements));
        self
    }

    /// Set a map property.
    #[must_use]
    pub fn map(
        mut self,
        property: impl Into<String>,
        entries: Vec<(Value, ElementValue)>,
    ) -> Self {
        self.values.insert(property.into(), PropertyValue::Map(entries));
        self
    }

    /// Read a property slot, if set.
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.values.get(property)
    }
}

struct EntityEntry {
    entity: Entity,
    identity: Option<ColumnExpression>,
    persisted: bool,
}

/// Arena of entity instances.
#[derive(Default)]
pub struct EntityGraph {
    entities: Vec<EntityEntry>,
}

impl EntityGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity and return its handle.
    pub fn add(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(EntityEntry {
            entity,
            identity: None,
            persisted: false,
        });
        id
    }

    /// Access an entity by handle.
    ///
    /// # Panics
    /// Panics if `id` did not come from this graph.
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0].entity
    }

    /// Set a property slot after the fact. Needed to close cycles: the
    /// referenced entity may not exist yet when the referencing one is built.
    pub fn set(&mut self, id: EntityId, property: impl Into<String>, value: PropertyValue) {
        self.entities[id.0].entity.values.insert(property.into(), value);
    }

    /// The identity expression assigned so far, if any.
    pub fn identity(&self, id: EntityId) -> Option<&ColumnExpression> {
        self.entities[id.0].identity.as_ref()
    }

    pub(crate) fn set_identity(&mut self, id: EntityId, expr: ColumnExpression) {
        self.entities[id.0].identity = Some(expr);
    }

    pub(crate) fn is_persisted(&self, id: EntityId) -> bool {
        self.entities[id.0].persisted
    }

    pub(crate) fn mark_persisted(&mut self, id: EntityId) {
        self.entities[id.0].persisted = true;
    }

    /// Human-readable label for error reporting: `Type#index`.
    pub fn label(&self, id: EntityId) -> String {
        format!("{}{id}", self.entities[id.0].entity.type_name)
    }

    /// Number of entities in the graph.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the graph holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entity handles, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.entities.len()).map(EntityId)
    }
}
