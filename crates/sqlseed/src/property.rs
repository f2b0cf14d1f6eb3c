//! Property emission.
//!
//! Implements the per-property contract: singular properties contribute zero
//! or one column to the owner's row, plural properties emit their own rows,
//! and any reference whose target has no identity yet registers a pending
//! update instead of producing output. `flush_pending` replays a registered
//! emission with the captured arguments and must produce exactly the
//! statement the inline path would have produced.

use sqlseed_core::{
    ColumnExpression, Error, ModelErrorKind, Result, StatementSink, TableStatement, Value,
};

use crate::graph::{ElementValue, EmbeddedValue, EntityGraph, EntityId, PropertyValue};
use crate::identity::resolve_identity;
use crate::pending::{Ledgers, PendingUpdate, PropertyHandle};
use crate::schema::{ElementKind, EntityType, PropertyDescriptor, PropertyKind, Registry, StorageMode};

/// Borrowed emission state for one driver call.
pub(crate) struct EmitCtx<'a, S: StatementSink> {
    pub registry: &'a Registry,
    pub graph: &'a EntityGraph,
    pub ledgers: &'a mut Ledgers,
    pub sink: &'a mut S,
}

impl<S: StatementSink> EmitCtx<'_, S> {
    /// Write a singular property into the owner's in-progress row.
    ///
    /// Plural properties contribute nothing here; their values never share
    /// the owner's row.
    pub(crate) fn contribute_inline(
        &mut self,
        owner_ty: &EntityType,
        index: usize,
        owner: EntityId,
        statement: &mut TableStatement,
    ) -> Result<()> {
        let property = &owner_ty.properties[index];
        let value = self.graph.entity(owner).get(&property.name);
        match &property.kind {
            PropertyKind::Scalar { column, required } => match value {
                None => self.require_absent(owner, property, *required, column),
                Some(PropertyValue::Scalar(v)) => {
                    if v.is_null() && *required {
                        return Err(self.required_missing(owner, property, column));
                    }
                    statement.set(column, ColumnExpression::from(v.clone()))
                }
                Some(_) => Err(self.value_mismatch(owner, property, "a scalar")),
            },
            PropertyKind::Reference { column, target, required } => match value {
                None => self.require_absent(owner, property, *required, column),
                Some(PropertyValue::Scalar(Value::Null)) => {
                    if *required {
                        return Err(self.required_missing(owner, property, column));
                    }
                    statement.set(column, ColumnExpression::Null)
                }
                Some(PropertyValue::Reference(referenced)) => {
                    self.check_target(owner, property, target, *referenced)?;
                    match resolve_identity(self.registry, self.graph, *referenced)? {
                        Some(expr) => statement.set(column, expr),
                        None => {
                            // Column stays out of the insert; an UPDATE is
                            // produced once the target is persisted.
                            self.defer(owner_ty, index, owner, *referenced, None, None);
                            Ok(())
                        }
                    }
                }
                Some(_) => Err(self.value_mismatch(owner, property, "a reference")),
            },
            PropertyKind::Collection { .. } | PropertyKind::Map { .. } => Ok(()),
        }
    }

    /// Emit the rows owned by a plural property, one per element.
    pub(crate) fn emit_own_rows(
        &mut self,
        owner_ty: &EntityType,
        index: usize,
        owner: EntityId,
        owner_id: &ColumnExpression,
    ) -> Result<()> {
        let property = &owner_ty.properties[index];
        let value = self.graph.entity(owner).get(&property.name);
        match &property.kind {
            PropertyKind::Scalar { .. } | PropertyKind::Reference { .. } => Ok(()),
            PropertyKind::Collection { key_column, .. } => {
                let elements = match value {
                    None => return Ok(()),
                    Some(PropertyValue::Collection(elements)) => elements,
                    Some(_) => return Err(self.value_mismatch(owner, property, "a collection")),
                };
                for (position, element) in elements.iter().enumerate() {
                    let key = key_column
                        .as_ref()
                        .map(|_| ColumnExpression::Literal(Value::BigInt(position as i64)));
                    self.emit_element(owner_ty, index, owner, owner_id, key, element)?;
                }
                Ok(())
            }
            PropertyKind::Map { .. } => {
                let entries = match value {
                    None => return Ok(()),
                    Some(PropertyValue::Map(entries)) => entries,
                    Some(_) => return Err(self.value_mismatch(owner, property, "a map")),
                };
                for (key, element) in entries {
                    // A null key is written as literal NULL, not dropped.
                    let key = ColumnExpression::from(key.clone());
                    self.emit_element(owner_ty, index, owner, owner_id, Some(key), element)?;
                }
                Ok(())
            }
        }
    }

    /// Replay one deferred emission. Invoked by the driver when the target's
    /// identity becomes available; arguments are the ones captured at
    /// registration time.
    pub(crate) fn flush_pending(&mut self, target: EntityId, update: PendingUpdate) -> Result<()> {
        let owner_ty = self.registry.require(&update.property.owner_type)?;
        let index = update.property.index;
        let property = owner_ty.properties.get(index).ok_or_else(|| {
            Error::model(
                ModelErrorKind::Inconsistent,
                format!("pending update names property {index} of {}", owner_ty.name),
            )
        })?;
        let owner_id = resolve_identity(self.registry, self.graph, update.context)?
            .ok_or_else(|| {
                Error::model(
                    ModelErrorKind::Inconsistent,
                    format!(
                        "{} registered a pending update before receiving an identity",
                        self.graph.label(update.context)
                    ),
                )
            })?;
        tracing::debug!(
            target = %self.graph.label(target),
            context = %self.graph.label(update.context),
            property = %property.name,
            "flushing deferred reference"
        );
        match &property.kind {
            PropertyKind::Reference { column, .. } => {
                let target_expr = resolve_identity(self.registry, self.graph, target)?
                    .ok_or_else(|| self.flush_without_identity(target))?;
                let mut statement =
                    TableStatement::update(&owner_ty.table, &owner_ty.id_column, owner_id);
                statement.set(column, target_expr)?;
                self.sink.write(statement)
            }
            PropertyKind::Collection { .. } | PropertyKind::Map { .. } => {
                let element = update.element.ok_or_else(|| {
                    Error::model(
                        ModelErrorKind::Inconsistent,
                        format!(
                            "pending update for {}.{} lost its element",
                            owner_ty.name, property.name
                        ),
                    )
                })?;
                self.emit_element(owner_ty, index, update.context, &owner_id, update.key, &element)
            }
            PropertyKind::Scalar { .. } => Err(Error::model(
                ModelErrorKind::Inconsistent,
                format!("scalar property {}.{} cannot defer", owner_ty.name, property.name),
            )),
        }
    }

    /// Emit one element of a plural property, or defer it.
    fn emit_element(
        &mut self,
        owner_ty: &EntityType,
        index: usize,
        owner: EntityId,
        owner_id: &ColumnExpression,
        key: Option<ColumnExpression>,
        element: &ElementValue,
    ) -> Result<()> {
        let property = &owner_ty.properties[index];
        let (element_kind, storage, key_column) = plural_parts(property);
        if let ElementValue::Embedded(embedded) = element {
            return self.emit_embedded_row(
                owner_ty, index, owner, owner_id, key, key_column, embedded,
            );
        }

        // The owning side of a mapped-by association writes nothing: the
        // target's own reference property produces the column.
        if matches!(storage, StorageMode::MappedBy { .. }) {
            return Ok(());
        }

        let value_expr = match (element_kind, element) {
            (_, ElementValue::Null) => ColumnExpression::Null,
            (ElementKind::Scalar { .. }, ElementValue::Scalar(v)) => {
                ColumnExpression::from(v.clone())
            }
            (ElementKind::Entity { target, .. }, ElementValue::Entity(referenced)) => {
                self.check_target(owner, property, target, *referenced)?;
                match resolve_identity(self.registry, self.graph, *referenced)? {
                    Some(expr) => expr,
                    None => {
                        self.defer(owner_ty, index, owner, *referenced, key, Some(element.clone()));
                        return Ok(());
                    }
                }
            }
            _ => return Err(self.value_mismatch(owner, property, "a matching element")),
        };

        match storage {
            StorageMode::JoinTable { table, id_column } => {
                let mut statement = TableStatement::insert(table);
                statement.set(id_column, owner_id.clone())?;
                if let (Some(column), Some(key_expr)) = (key_column, &key) {
                    statement.set(column, key_expr.clone())?;
                }
                statement.set(value_column(element_kind)?, value_expr)?;
                self.sink.write(statement)
            }
            StorageMode::TargetTable { id_column } => {
                // No row exists for a null element; nothing to update.
                if value_expr.is_null() {
                    return Ok(());
                }
                let ElementKind::Entity { target, .. } = element_kind else {
                    return Err(self.value_mismatch(owner, property, "an entity element"));
                };
                let target_ty = self.registry.require(target)?;
                let mut statement =
                    TableStatement::update(&target_ty.table, &target_ty.id_column, value_expr);
                statement.set(id_column, owner_id.clone())?;
                if let (Some(column), Some(key_expr)) = (key_column, &key) {
                    statement.set(column, key_expr.clone())?;
                }
                self.sink.write(statement)
            }
            StorageMode::MappedBy { .. } => Ok(()),
        }
    }

    /// Emit one embedded-value row, or defer it while any of its reference
    /// fields is unresolved. Deferral captures the whole element, so a flush
    /// re-checks the remaining references and may defer again.
    fn emit_embedded_row(
        &mut self,
        owner_ty: &EntityType,
        index: usize,
        owner: EntityId,
        owner_id: &ColumnExpression,
        key: Option<ColumnExpression>,
        key_column: Option<&str>,
        embedded: &EmbeddedValue,
    ) -> Result<()> {
        let property = &owner_ty.properties[index];
        let (element_kind, storage, _) = plural_parts(property);
        let ElementKind::Embedded { fields } = element_kind else {
            return Err(self.value_mismatch(owner, property, "an embedded element"));
        };
        let StorageMode::JoinTable { table, id_column } = storage else {
            return Err(self.value_mismatch(owner, property, "join-table storage"));
        };

        for field in fields {
            if let PropertyKind::Reference { .. } = field.kind {
                if let Some(PropertyValue::Reference(referenced)) = embedded.get(&field.name) {
                    if resolve_identity(self.registry, self.graph, *referenced)?.is_none() {
                        self.defer(
                            owner_ty,
                            index,
                            owner,
                            *referenced,
                            key,
                            Some(ElementValue::Embedded(embedded.clone())),
                        );
                        return Ok(());
                    }
                }
            }
        }

        let mut statement = TableStatement::insert(table);
        statement.set(id_column, owner_id.clone())?;
        if let (Some(column), Some(key_expr)) = (key_column, &key) {
            statement.set(column, key_expr.clone())?;
        }
        for field in fields {
            self.inline_embedded_field(owner, property, field, embedded, &mut statement)?;
        }
        self.sink.write(statement)
    }

    fn inline_embedded_field(
        &mut self,
        owner: EntityId,
        property: &PropertyDescriptor,
        field: &PropertyDescriptor,
        embedded: &EmbeddedValue,
        statement: &mut TableStatement,
    ) -> Result<()> {
        let value = embedded.get(&field.name);
        match &field.kind {
            PropertyKind::Scalar { column, required } => match value {
                None => self.require_absent(owner, field, *required, column),
                Some(PropertyValue::Scalar(v)) => {
                    if v.is_null() && *required {
                        return Err(self.required_missing(owner, field, column));
                    }
                    statement.set(column, ColumnExpression::from(v.clone()))
                }
                Some(_) => Err(self.value_mismatch(owner, field, "a scalar")),
            },
            PropertyKind::Reference { column, target, required } => match value {
                None => self.require_absent(owner, field, *required, column),
                Some(PropertyValue::Scalar(Value::Null)) => {
                    if *required {
                        return Err(self.required_missing(owner, field, column));
                    }
                    statement.set(column, ColumnExpression::Null)
                }
                Some(PropertyValue::Reference(referenced)) => {
                    self.check_target(owner, field, target, *referenced)?;
                    // All reference fields were checked before the row was
                    // started, so the identity must be available here.
                    let expr = resolve_identity(self.registry, self.graph, *referenced)?
                        .ok_or_else(|| self.flush_without_identity(*referenced))?;
                    statement.set(column, expr)
                }
                Some(_) => Err(self.value_mismatch(owner, field, "a reference")),
            },
            _ => Err(self.value_mismatch(owner, property, "singular embedded fields")),
        }
    }

    fn defer(
        &mut self,
        owner_ty: &EntityType,
        index: usize,
        owner: EntityId,
        target: EntityId,
        key: Option<ColumnExpression>,
        element: Option<ElementValue>,
    ) {
        let target_type = self.graph.entity(target).type_name().to_string();
        self.ledgers.register(
            &target_type,
            target,
            PendingUpdate {
                context: owner,
                property: PropertyHandle { owner_type: owner_ty.name.clone(), index },
                key,
                element,
            },
        );
    }

    fn check_target(
        &self,
        owner: EntityId,
        property: &PropertyDescriptor,
        declared: &str,
        referenced: EntityId,
    ) -> Result<()> {
        let actual = self.graph.entity(referenced).type_name();
        if actual == declared {
            Ok(())
        } else {
            Err(Error::model(
                ModelErrorKind::ValueMismatch,
                format!(
                    "{}.{} declares target {declared} but references {}",
                    self.graph.label(owner),
                    property.name,
                    self.graph.label(referenced)
                ),
            ))
        }
    }

    fn require_absent(
        &self,
        owner: EntityId,
        property: &PropertyDescriptor,
        required: bool,
        column: &str,
    ) -> Result<()> {
        if required {
            Err(self.required_missing(owner, property, column))
        } else {
            Ok(())
        }
    }

    fn required_missing(
        &self,
        owner: EntityId,
        property: &PropertyDescriptor,
        column: &str,
    ) -> Error {
        Error::unsupported(
            "NULL",
            Some(column),
            format!("required value {}.{} is missing", self.graph.label(owner), property.name),
        )
    }

    fn value_mismatch(&self, owner: EntityId, property: &PropertyDescriptor, expected: &str) -> Error {
        Error::model(
            ModelErrorKind::ValueMismatch,
            format!("{}.{} expected {expected}", self.graph.label(owner), property.name),
        )
    }

    fn flush_without_identity(&self, target: EntityId) -> Error {
        Error::model(
            ModelErrorKind::Inconsistent,
            format!("{} has no identity at flush time", self.graph.label(target)),
        )
    }
}

/// Destructure the plural parts of a property descriptor.
fn plural_parts(property: &PropertyDescriptor) -> (&ElementKind, &StorageMode, Option<&str>) {
    match &property.kind {
        PropertyKind::Collection { element, storage, key_column } => {
            (element, storage, key_column.as_deref())
        }
        PropertyKind::Map { key_column, element, storage } => {
            (element, storage, Some(key_column.as_str()))
        }
        // Callers only reach this for plural kinds.
        PropertyKind::Scalar { .. } | PropertyKind::Reference { .. } => {
            unreachable!("plural_parts called for a singular property")
        }
    }
}

fn value_column(element: &ElementKind) -> Result<&str> {
    match element {
        ElementKind::Scalar { value_column } => Ok(value_column),
        ElementKind::Entity { value_column: Some(column), .. } => Ok(column),
        ElementKind::Entity { value_column: None, .. } | ElementKind::Embedded { .. } => {
            Err(Error::model(
                ModelErrorKind::Inconsistent,
                "join-table element without a value column".to_string(),
            ))
        }
    }
}
