//! Load-time registry mapping entity names to their attribute sets.
//!
//! Schema files describe the descriptor set an external generator produces:
//!
//! ```toml
//! [[entity]]
//! name = "Sample"
//! table = "sample"
//!
//! [[entity.attribute]]
//! property = "id"
//! column = "id"
//! jdbc_type = "big_int"
//! primary_key = true
//!
//! [[entity.attribute]]
//! property = "inner"
//! association = { target = "Inner", join_table = "inner", join_columns = [{ local = "inner_id", target = "id" }] }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::{Association, AttributeDescriptor, AttributeId, EntitySchema};
use crate::error::{ViewError, ViewResult};
use crate::value::{JdbcType, Value};

/// Registry of entity schemas, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any previous one with the same name.
    pub fn register(&mut self, schema: EntitySchema) -> Arc<EntitySchema> {
        let schema = Arc::new(schema);
        self.entities
            .insert(schema.name().to_string(), Arc::clone(&schema));
        schema
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntitySchema>> {
        self.entities.get(name)
    }

    /// Look up an entity, failing with a schema error when unknown.
    pub fn entity(&self, name: &str) -> ViewResult<&Arc<EntitySchema>> {
        self.entities
            .get(name)
            .ok_or_else(|| ViewError::Schema(format!("unknown entity '{}'", name)))
    }

    /// Target entity of an association attribute.
    pub fn target_of(&self, attr: &AttributeDescriptor) -> ViewResult<&Arc<EntitySchema>> {
        match &attr.association {
            Some(assoc) => self.entity(&assoc.target),
            None => Err(ViewError::Schema(format!(
                "{} is not an association",
                attr.id
            ))),
        }
    }

    /// Find the attribute with the given identity on any registered entity.
    pub fn attribute(&self, id: &AttributeId) -> Option<&Arc<AttributeDescriptor>> {
        self.entities
            .get(&id.entity)
            .and_then(|e| e.attribute(&id.property))
            .filter(|a| &a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check that every association resolves to a registered target whose
    /// join columns exist.
    pub fn validate(&self) -> ViewResult<()> {
        for entity in self.entities.values() {
            for attr in entity.attributes() {
                let Some(assoc) = &attr.association else {
                    continue;
                };
                let target = self.entity(&assoc.target).map_err(|_| {
                    ViewError::Schema(format!(
                        "{} targets unknown entity '{}'",
                        attr.id, assoc.target
                    ))
                })?;
                if assoc.join_columns.is_empty() {
                    return Err(ViewError::Schema(format!(
                        "{} has no join columns",
                        attr.id
                    )));
                }
                for pair in &assoc.join_columns {
                    if entity.attribute_by_column(&pair.local).is_none() {
                        return Err(ViewError::Schema(format!(
                            "{} maps unknown local column '{}'",
                            attr.id, pair.local
                        )));
                    }
                    if target.attribute_by_column(&pair.target).is_none() {
                        return Err(ViewError::Schema(format!(
                            "{} maps unknown column '{}' on {}",
                            attr.id,
                            pair.target,
                            target.name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse a schema document and validate it.
    pub fn from_toml(content: &str) -> ViewResult<Self> {
        let doc: SchemaDoc = toml::from_str(content)
            .map_err(|e| ViewError::Schema(format!("invalid schema document: {}", e)))?;

        let mut registry = SchemaRegistry::new();
        let mut pending = doc.entities;

        // Parents must be built before their subtypes; entities may appear in any order.
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for def in pending {
                match &def.extends {
                    Some(parent) if registry.get(parent).is_none() => deferred.push(def),
                    _ => {
                        let schema = def.into_schema(&registry)?;
                        registry.register(schema);
                    }
                }
            }
            if deferred.len() == before {
                let names: Vec<_> = deferred.iter().map(|d| d.name.as_str()).collect();
                return Err(ViewError::Schema(format!(
                    "unresolvable parent entity for: {}",
                    names.join(", ")
                )));
            }
            pending = deferred;
        }

        registry.validate()?;
        Ok(registry)
    }

    /// Load a schema document from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ViewResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ViewError::Schema(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }
}

// ============================================================================
// Schema document
// ============================================================================

#[derive(Debug, Deserialize)]
struct SchemaDoc {
    #[serde(rename = "entity", default)]
    entities: Vec<EntityDef>,
}

#[derive(Debug, Deserialize)]
struct EntityDef {
    name: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    discriminator: Option<DiscriminatorDef>,
    #[serde(default)]
    version: Option<VersionDef>,
    #[serde(rename = "attribute", default)]
    attributes: Vec<AttributeDef>,
}

#[derive(Debug, Deserialize)]
struct DiscriminatorDef {
    property: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct VersionDef {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct AttributeDef {
    property: String,
    #[serde(default)]
    column: Option<String>,
    #[serde(default)]
    value_type: Option<String>,
    #[serde(default)]
    jdbc_type: JdbcType,
    #[serde(default)]
    primary_key: bool,
    #[serde(default = "default_true")]
    nullable: bool,
    #[serde(default)]
    dictionary: bool,
    #[serde(default)]
    association: Option<Association>,
}

fn default_true() -> bool {
    true
}

impl EntityDef {
    fn into_schema(self, registry: &SchemaRegistry) -> ViewResult<EntitySchema> {
        let table = self.table.clone().unwrap_or_else(|| self.name.to_lowercase());
        let mut builder = EntitySchema::builder(&self.name, &table);

        if let Some(parent) = &self.extends {
            builder = builder.extends(registry.entity(parent)?);
        }

        for def in self.attributes {
            let mut attr = match (def.association, def.column) {
                (Some(assoc), _) => {
                    let mut attr = AttributeDescriptor::association(
                        &def.property,
                        &assoc.target,
                        &assoc.join_table,
                        &[],
                    );
                    attr.association = Some(assoc);
                    attr
                }
                (None, Some(column)) => {
                    AttributeDescriptor::scalar(&def.property, &column, def.jdbc_type)
                }
                (None, None) => {
                    return Err(ViewError::Schema(format!(
                        "{}.{} needs a column or an association",
                        self.name, def.property
                    )))
                }
            };
            if let Some(value_type) = &def.value_type {
                attr = attr.with_value_type(value_type);
            }
            attr.primary_key = def.primary_key;
            attr.nullable = def.nullable && !def.primary_key;
            attr.dictionary = def.dictionary;
            builder = builder.attribute(attr);
        }

        if let Some(d) = self.discriminator {
            builder = builder.discriminator(&d.property, d.value);
        }
        if let Some(v) = self.version {
            builder = builder.versioned(&v.from, &v.to);
        }

        builder.build()
    }
}
