//! Attribute model: immutable entity and attribute descriptors.
//!
//! Descriptors are built once at schema-load time and shared (`Arc`) across
//! every compilation. An attribute's identity is the pair of its declaring
//! entity and property name, so a polymorphic subtype that extends a parent
//! shares the parent's attribute identities.
//!
//! ```ignore
//! use strata::schema::{AttributeDescriptor, EntitySchema};
//! use strata::value::JdbcType;
//!
//! let inner = EntitySchema::builder("Inner", "inner")
//!     .attribute(AttributeDescriptor::scalar("id", "id", JdbcType::BigInt).primary_key())
//!     .attribute(AttributeDescriptor::scalar("value", "value", JdbcType::Varchar))
//!     .build()?;
//! ```

mod registry;

pub use registry::SchemaRegistry;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ViewError, ViewResult};
use crate::value::{JdbcType, Value};

// ============================================================================
// Attributes
// ============================================================================

/// Identity of an attribute: declaring entity plus property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId {
    pub entity: String,
    pub property: String,
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.property)
    }
}

/// One local-column to target-column pair of an association mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumn {
    pub local: String,
    pub target: String,
}

/// Association metadata carried by association attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    /// Target entity name, resolved through the [`SchemaRegistry`].
    pub target: String,
    /// Table joined for the target entity.
    pub join_table: String,
    /// Ordered local→target column pairs.
    pub join_columns: Vec<JoinColumn>,
    #[serde(default)]
    pub collection: bool,
}

/// Immutable description of one entity column or association.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub id: AttributeId,
    /// Column name; `None` for virtual attributes (associations).
    pub column: Option<String>,
    pub value_type: String,
    pub jdbc_type: JdbcType,
    pub primary_key: bool,
    pub nullable: bool,
    pub dictionary: bool,
    pub association: Option<Association>,
}

impl AttributeDescriptor {
    /// A plain column attribute. The declaring entity is filled in by the entity builder.
    pub fn scalar(property: &str, column: &str, jdbc_type: JdbcType) -> Self {
        Self {
            id: AttributeId {
                entity: String::new(),
                property: property.to_string(),
            },
            column: Some(column.to_string()),
            value_type: default_value_type(jdbc_type).to_string(),
            jdbc_type,
            primary_key: false,
            nullable: true,
            dictionary: false,
            association: None,
        }
    }

    /// A one-to-one association to `target`, joined on `join_columns` (local, target).
    pub fn association(
        property: &str,
        target: &str,
        join_table: &str,
        join_columns: &[(&str, &str)],
    ) -> Self {
        Self {
            id: AttributeId {
                entity: String::new(),
                property: property.to_string(),
            },
            column: None,
            value_type: target.to_string(),
            jdbc_type: JdbcType::Other,
            primary_key: false,
            nullable: true,
            dictionary: false,
            association: Some(Association {
                target: target.to_string(),
                join_table: join_table.to_string(),
                join_columns: join_columns
                    .iter()
                    .map(|(local, target)| JoinColumn {
                        local: local.to_string(),
                        target: target.to_string(),
                    })
                    .collect(),
                collection: false,
            }),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn dictionary(mut self) -> Self {
        self.dictionary = true;
        self
    }

    /// Mark an association as one-to-many.
    pub fn collection(mut self) -> Self {
        if let Some(assoc) = self.association.as_mut() {
            assoc.collection = true;
        }
        self
    }

    pub fn with_value_type(mut self, value_type: &str) -> Self {
        self.value_type = value_type.to_string();
        self
    }

    pub fn property(&self) -> &str {
        &self.id.property
    }

    pub fn entity(&self) -> &str {
        &self.id.entity
    }

    pub fn is_association(&self) -> bool {
        self.association.is_some()
    }

    pub fn is_collection(&self) -> bool {
        self.association.as_ref().is_some_and(|a| a.collection)
    }

    /// Column name of a scalar attribute.
    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }
}

fn default_value_type(jdbc_type: JdbcType) -> &'static str {
    match jdbc_type {
        JdbcType::Boolean => "bool",
        JdbcType::SmallInt | JdbcType::Integer | JdbcType::BigInt => "i64",
        JdbcType::Decimal | JdbcType::Double => "f64",
        JdbcType::Char | JdbcType::Varchar => "String",
        JdbcType::Date | JdbcType::Timestamp => "NaiveDateTime",
        JdbcType::Other => "Value",
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Discriminator attribute plus the literal identifying this subtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    pub attribute: Arc<AttributeDescriptor>,
    pub value: Value,
}

/// Bitemporal validity interval columns: `[from, to)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionPair {
    pub from: Arc<AttributeDescriptor>,
    pub to: Arc<AttributeDescriptor>,
}

/// Immutable attribute set of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    name: String,
    table: String,
    parent: Option<String>,
    attributes: Vec<Arc<AttributeDescriptor>>,
    discriminator: Option<Discriminator>,
    version: Option<VersionPair>,
}

impl EntitySchema {
    pub fn builder(name: &str, table: &str) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            name: name.to_string(),
            table: table.to_string(),
            parent: None,
            inherited: Vec::new(),
            attributes: Vec::new(),
            discriminator: None,
            version: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the entity this one extends, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn attributes(&self) -> &[Arc<AttributeDescriptor>] {
        &self.attributes
    }

    /// Look up an attribute by property name.
    pub fn attribute(&self, property: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.attributes.iter().find(|a| a.property() == property)
    }

    /// Look up a scalar attribute by column name.
    pub fn attribute_by_column(&self, column: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.attributes
            .iter()
            .find(|a| a.column_name() == Some(column))
    }

    /// Whether this entity carries the attribute with the given identity.
    pub fn has_attribute(&self, id: &AttributeId) -> bool {
        self.attributes.iter().any(|a| &a.id == id)
    }

    /// Attributes backed by a column on this entity's table.
    pub fn scalar_attributes(&self) -> impl Iterator<Item = &Arc<AttributeDescriptor>> {
        self.attributes
            .iter()
            .filter(|a| !a.is_association() && a.column.is_some())
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Arc<AttributeDescriptor>> {
        self.attributes.iter().filter(|a| a.primary_key)
    }

    /// Primary keys identifying a row across versions (excludes the version columns).
    pub fn identity_keys(&self) -> Vec<&Arc<AttributeDescriptor>> {
        self.primary_keys()
            .filter(|a| !self.is_version_attribute(a))
            .collect()
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub fn version(&self) -> Option<&VersionPair> {
        self.version.as_ref()
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    pub fn is_version_attribute(&self, attr: &AttributeDescriptor) -> bool {
        self.version
            .as_ref()
            .is_some_and(|v| v.from.id == attr.id || v.to.id == attr.id)
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    name: String,
    table: String,
    parent: Option<String>,
    inherited: Vec<Arc<AttributeDescriptor>>,
    attributes: Vec<AttributeDescriptor>,
    discriminator: Option<(String, Value)>,
    version: Option<(String, String)>,
}

impl EntitySchemaBuilder {
    pub fn attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Share the parent's table, attributes and version columns.
    pub fn extends(mut self, parent: &EntitySchema) -> Self {
        self.table = parent.table.clone();
        self.parent = Some(parent.name.clone());
        self.inherited = parent.attributes.clone();
        if self.version.is_none() {
            self.version = parent
                .version
                .as_ref()
                .map(|v| (v.from.id.property.clone(), v.to.id.property.clone()));
        }
        self
    }

    pub fn discriminator(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.discriminator = Some((property.to_string(), value.into()));
        self
    }

    pub fn versioned(mut self, from: &str, to: &str) -> Self {
        self.version = Some((from.to_string(), to.to_string()));
        self
    }

    pub fn build(self) -> ViewResult<EntitySchema> {
        let mut attributes = self.inherited;
        for mut attr in self.attributes {
            if attributes.iter().any(|a| a.property() == attr.property()) {
                return Err(ViewError::Schema(format!(
                    "{} declares property '{}' twice",
                    self.name,
                    attr.property()
                )));
            }
            attr.id.entity = self.name.clone();
            attributes.push(Arc::new(attr));
        }

        let find = |property: &str| -> ViewResult<Arc<AttributeDescriptor>> {
            attributes
                .iter()
                .find(|a| a.property() == property && a.column.is_some())
                .cloned()
                .ok_or_else(|| {
                    ViewError::Schema(format!(
                        "{} has no column attribute '{}'",
                        self.name, property
                    ))
                })
        };

        let discriminator = match &self.discriminator {
            Some((property, value)) => {
                let attribute = find(property)?;
                let value = attribute.jdbc_type.coerce(value.clone());
                Some(Discriminator { attribute, value })
            }
            None => None,
        };

        let version = match &self.version {
            Some((from, to)) => Some(VersionPair {
                from: find(from)?,
                to: find(to)?,
            }),
            None => None,
        };

        if !attributes.iter().any(|a| a.primary_key) {
            return Err(ViewError::Schema(format!(
                "{} has no primary key attribute",
                self.name
            )));
        }

        Ok(EntitySchema {
            name: self.name,
            table: self.table,
            parent: self.parent,
            attributes,
            discriminator,
            version,
        })
    }
}
