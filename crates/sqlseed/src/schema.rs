//! Entity descriptors and the schema registry.
//!
//! The registry is an explicit table of property descriptors per entity
//! type, populated from code or from a JSON schema file. There is no runtime
//! type introspection: everything the generator knows about a type is
//! declared here, and structural problems are rejected before any statement
//! is produced.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlseed_core::{Error, ModelErrorKind, Result};

use crate::identity::IdentityStrategy;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"));

/// How the rows of a plural property are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StorageMode {
    /// An independent table holding `(owner id, key, value)` rows.
    JoinTable {
        /// The join table name.
        table: String,
        /// Column holding the owner's id.
        id_column: String,
    },
    /// The association column lives in the referenced entity's own table;
    /// rows are emitted as UPDATEs against it.
    TargetTable {
        /// Column in the target table holding the owner's id.
        id_column: String,
    },
    /// The association is owned by a singular reference property on the
    /// target type; the target writes the column itself when persisted.
    MappedBy {
        /// Name of the owning property on the target type.
        property: String,
    },
}

/// The element type of a plural property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    /// Primitive elements.
    Scalar {
        /// Column holding the element value.
        value_column: String,
    },
    /// Entity references.
    Entity {
        /// The registered target type.
        target: String,
        /// Column holding the target's id. Required for join-table
        /// storage, absent for target-table and mapped-by storage.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_column: Option<String>,
    },
    /// Flat value objects written inline into the container row.
    Embedded {
        /// The singular fields of the embedded value, in declaration order.
        fields: Vec<PropertyDescriptor>,
    },
}

/// The closed set of property shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyKind {
    /// A singular primitive column.
    Scalar {
        column: String,
        #[serde(default)]
        required: bool,
    },
    /// A singular reference column holding another entity's id.
    Reference {
        column: String,
        target: String,
        #[serde(default)]
        required: bool,
    },
    /// An ordered collection. With a key column the element index is
    /// written; without one the rows carry no positional information.
    Collection {
        element: ElementKind,
        storage: StorageMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_column: Option<String>,
    },
    /// A keyed collection; the key column is always present.
    Map {
        key_column: String,
        element: ElementKind,
        storage: StorageMode,
    },
}

impl PropertyKind {
    /// Whether this property contributes to the owner's own row.
    pub fn is_singular(&self) -> bool {
        matches!(self, PropertyKind::Scalar { .. } | PropertyKind::Reference { .. })
    }
}

/// One named attribute of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Per-type descriptor: table, identity handling and the ordered property
/// list. Property order is emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    pub id_column: String,
    pub identity: IdentityStrategy,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl EntityType {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        id_column: impl Into<String>,
        identity: IdentityStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_column: id_column.into(),
            identity,
            properties: Vec::new(),
        }
    }

    /// Append a property. Declaration order is emission order.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor::new(name, kind));
        self
    }

    /// Find a property by name.
    pub fn find_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// The registry of entity types for one generation run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Registry {
    types: BTreeMap<String, EntityType>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one entity type. Identifier syntax is checked immediately;
    /// cross-type references are checked by [`Registry::validate`], since
    /// the target type may be registered later.
    pub fn register(&mut self, ty: EntityType) -> Result<()> {
        check_identifier("table", &ty.table)?;
        check_identifier("id column", &ty.id_column)?;
        for property in &ty.properties {
            check_property_identifiers(&ty.name, property)?;
        }
        if self.types.contains_key(&ty.name) {
            return Err(Error::model(
                ModelErrorKind::InvalidMapping,
                format!("entity type {} registered twice", ty.name),
            ));
        }
        tracing::debug!(
            entity_type = %ty.name,
            table = %ty.table,
            properties = ty.properties.len(),
            "registered entity type"
        );
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    /// Load a registry from a JSON schema document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let loaded: Registry = serde_json::from_str(json).map_err(|e| {
            Error::model(ModelErrorKind::InvalidMapping, format!("schema file: {e}"))
        })?;
        // Re-register to run the per-type checks serde skipped.
        let mut registry = Registry::new();
        for ty in loaded.types.into_values() {
            registry.register(ty)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&EntityType> {
        self.types.get(name).ok_or_else(|| {
            Error::model(ModelErrorKind::UnknownType, format!("entity type {name} is not registered"))
        })
    }

    /// All registered types, in name order.
    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.values()
    }

    /// Check every cross-type relationship. Fatal before any statement is
    /// produced; the generator runs this once at construction.
    pub fn validate(&self) -> Result<()> {
        for ty in self.types.values() {
            self.validate_identity(ty)?;
            for property in &ty.properties {
                self.validate_property(ty, property)?;
            }
        }
        Ok(())
    }

    fn validate_identity(&self, ty: &EntityType) -> Result<()> {
        if let IdentityStrategy::Assigned { property } = &ty.identity {
            match ty.find_property(property).map(|p| &p.kind) {
                Some(PropertyKind::Scalar { .. }) => Ok(()),
                Some(_) => Err(Error::model(
                    ModelErrorKind::UnknownProperty,
                    format!("{}.{property}: assigned identity must be a scalar property", ty.name),
                )),
                None => Err(Error::model(
                    ModelErrorKind::UnknownProperty,
                    format!("{}.{property}: assigned identity property does not exist", ty.name),
                )),
            }
        } else {
            Ok(())
        }
    }

    fn validate_property(&self, ty: &EntityType, property: &PropertyDescriptor) -> Result<()> {
        let at = || format!("{}.{}", ty.name, property.name);
        match &property.kind {
            PropertyKind::Scalar { .. } => Ok(()),
            PropertyKind::Reference { target, .. } => self.require(target).map(|_| ()),
            PropertyKind::Collection { element, storage, key_column } => {
                if key_column.is_some() && matches!(storage, StorageMode::MappedBy { .. }) {
                    return Err(Error::model(
                        ModelErrorKind::InvalidMapping,
                        format!("{}: mapped-by storage cannot carry a key column", at()),
                    ));
                }
                self.validate_element(&at, element, storage)
            }
            PropertyKind::Map { element, storage, .. } => {
                // The map key has nowhere to go when the target owns the
                // association column.
                if matches!(storage, StorageMode::MappedBy { .. }) {
                    return Err(Error::model(
                        ModelErrorKind::InvalidMapping,
                        format!("{}: maps require join-table or target-table storage", at()),
                    ));
                }
                self.validate_element(&at, element, storage)
            }
        }
    }

    fn validate_element(
        &self,
        at: &dyn Fn() -> String,
        element: &ElementKind,
        storage: &StorageMode,
    ) -> Result<()> {
        match element {
            ElementKind::Scalar { .. } => {
                if !matches!(storage, StorageMode::JoinTable { .. }) {
                    return Err(Error::model(
                        ModelErrorKind::InvalidMapping,
                        format!("{}: scalar elements require join-table storage", at()),
                    ));
                }
                Ok(())
            }
            ElementKind::Entity { target, value_column } => {
                let target_type = self.require(target)?;
                match storage {
                    StorageMode::JoinTable { .. } => {
                        if value_column.is_none() {
                            return Err(Error::model(
                                ModelErrorKind::InvalidMapping,
                                format!("{}: join-table storage needs a value column", at()),
                            ));
                        }
                    }
                    StorageMode::TargetTable { .. } => {
                        if value_column.is_some() {
                            return Err(Error::model(
                                ModelErrorKind::InvalidMapping,
                                format!("{}: target-table storage derives the value column", at()),
                            ));
                        }
                    }
                    StorageMode::MappedBy { property } => {
                        match target_type.find_property(property).map(|p| &p.kind) {
                            Some(PropertyKind::Reference { .. }) => {}
                            Some(_) => {
                                return Err(Error::model(
                                    ModelErrorKind::UnknownProperty,
                                    format!(
                                        "{}: mapped-by property {}.{property} is not a singular reference",
                                        at(),
                                        target
                                    ),
                                ));
                            }
                            None => {
                                return Err(Error::model(
                                    ModelErrorKind::UnknownProperty,
                                    format!(
                                        "{}: mapped-by property {property} does not exist on {}",
                                        at(),
                                        target
                                    ),
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
            ElementKind::Embedded { fields } => {
                if !matches!(storage, StorageMode::JoinTable { .. }) {
                    return Err(Error::model(
                        ModelErrorKind::InvalidMapping,
                        format!("{}: embedded elements require join-table storage", at()),
                    ));
                }
                if fields.is_empty() {
                    return Err(Error::model(
                        ModelErrorKind::InvalidMapping,
                        format!("{}: embedded element has no fields", at()),
                    ));
                }
                for field in fields {
                    match &field.kind {
                        PropertyKind::Scalar { .. } => {}
                        PropertyKind::Reference { target, .. } => {
                            self.require(target)?;
                        }
                        _ => {
                            return Err(Error::model(
                                ModelErrorKind::InvalidMapping,
                                format!(
                                    "{}: embedded field {} must be singular",
                                    at(),
                                    field.name
                                ),
                            ));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::model(
            ModelErrorKind::InvalidIdentifier,
            format!("{what} {name:?} is not a valid SQL identifier"),
        ))
    }
}

fn check_property_identifiers(type_name: &str, property: &PropertyDescriptor) -> Result<()> {
    let at = format!("{type_name}.{}", property.name);
    match &property.kind {
        PropertyKind::Scalar { column, .. } | PropertyKind::Reference { column, .. } => {
            check_identifier(&at, column)
        }
        PropertyKind::Collection { element, storage, key_column } => {
            if let Some(key) = key_column {
                check_identifier(&at, key)?;
            }
            check_element_identifiers(&at, element, storage)
        }
        PropertyKind::Map { key_column, element, storage } => {
            check_identifier(&at, key_column)?;
            check_element_identifiers(&at, element, storage)
        }
    }
}

fn check_element_identifiers(at: &str, element: &ElementKind, storage: &StorageMode) -> Result<()> {
    match storage {
        StorageMode::JoinTable { table, id_column } => {
            check_identifier(at, table)?;
            check_identifier(at, id_column)?;
        }
        StorageMode::TargetTable { id_column } => {
            check_identifier(at, id_column)?;
        }
        StorageMode::MappedBy { .. } => {}
    }
    match element {
        ElementKind::Scalar { value_column } => check_identifier(at, value_column),
        ElementKind::Entity { value_column, .. } => {
            if let Some(column) = value_column {
                check_identifier(at, column)?;
            }
            Ok(())
        }
        ElementKind::Embedded { fields } => {
            for field in fields {
                match &field.kind {
                    PropertyKind::Scalar { column, .. }
                    | PropertyKind::Reference { column, .. } => {
                        check_identifier(at, column)?;
                    }
                    _ => {} // shape is rejected by validate()
                }
            }
            Ok(())
        }
    }
}
