//! Declarative view documents (TOML) turned into filter trees.
//!
//! ```toml
//! entity = "Sample"
//! limit = 20
//!
//! [[filter]]
//! path = "inner.value"
//! operator = "equals"
//! value = "hi1"
//!
//! [[filter]]
//! path = "listParameter"
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Aggregate, FilterTree, Operator, Predicate};
use crate::error::{ViewError, ViewResult};
use crate::schema::SchemaRegistry;
use crate::value::Value;

/// A view over one entity (or several polymorphic ones) with its filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewDefinition {
    #[serde(default)]
    pub entity: Option<String>,
    /// Polymorphic roots sharing one table.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(rename = "filter", default)]
    pub filters: Vec<FilterSpec>,
}

/// One `[[filter]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub path: String,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub range_end: Option<Value>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub sort_ascending: Option<bool>,
}

impl FilterSpec {
    fn predicate(&self) -> ViewResult<Option<Predicate>> {
        let Some(operator) = self.operator else {
            return Ok(None);
        };
        let value = self.value.clone().unwrap_or(Value::Null);
        let predicate = match (operator.arity(), &self.range_end) {
            (0, _) => Predicate::unary(operator)?,
            (2, Some(end)) => Predicate::between(value, end.clone())?,
            (2, None) => {
                return Err(ViewError::Composition(format!(
                    "{} needs a range_end",
                    self.path
                )))
            }
            _ => Predicate::new(operator, value)?,
        };
        Ok(Some(predicate))
    }
}

impl ViewDefinition {
    pub fn from_toml(content: &str) -> ViewResult<Self> {
        toml::from_str(content)
            .map_err(|e| ViewError::Schema(format!("invalid view document: {}", e)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ViewResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ViewError::Schema(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Root entity names, `entity` first.
    pub fn root_names(&self) -> Vec<&str> {
        self.entity
            .iter()
            .chain(self.entities.iter())
            .map(String::as_str)
            .collect()
    }

    /// Build the filter tree against a registry.
    pub fn to_tree(&self, registry: &SchemaRegistry) -> ViewResult<FilterTree> {
        let roots = self
            .root_names()
            .into_iter()
            .map(|name| registry.entity(name).map(Arc::clone))
            .collect::<ViewResult<Vec<_>>>()?;
        let mut tree = FilterTree::new(roots)?;

        for spec in &self.filters {
            let node = tree.add_path(registry, &spec.path, spec.predicate()?)?;
            if let Some(aggregate) = spec.aggregate {
                node.set_aggregate(aggregate)?;
            }
            if spec.output_name.is_some() {
                node.set_output_name(spec.output_name.clone());
            }
            if spec.sort_ascending.is_some() {
                node.set_sort(spec.sort_ascending);
            }
        }

        Ok(tree)
    }
}
