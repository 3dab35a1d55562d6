//! Filter tree: caller-built projections and predicates over an attribute model.
//!
//! A [`FilterNode`] references exactly one attribute. Association nodes hold
//! child nodes (a bare association node just fetches the association); leaf
//! nodes carry a [`Predicate`]. The [`FilterTree`] is the distinguished root:
//! it holds the top-level filter list and the root entities it applies to.

mod definition;

pub use definition::{FilterSpec, ViewDefinition};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ViewError, ViewResult};
use crate::schema::{AttributeDescriptor, EntitySchema, SchemaRegistry};
use crate::value::Value;

// ============================================================================
// Operators
// ============================================================================

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    IsNull,
    IsNotNull,
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    In,
    NotIn,
    Like,
    StartsWith,
    EndsWith,
    NotLike,
    Between,
    EqualsOrNull,
    NotEqualsOrNull,
    LessOrNull,
    GreaterOrNull,
}

impl Operator {
    /// Number of operands the operator takes.
    pub fn arity(self) -> usize {
        match self {
            Operator::IsNull | Operator::IsNotNull => 0,
            Operator::Between => 2,
            _ => 1,
        }
    }

    /// Operators that also match rows where the column is NULL.
    pub fn allows_null(self) -> bool {
        matches!(
            self,
            Operator::EqualsOrNull
                | Operator::NotEqualsOrNull
                | Operator::LessOrNull
                | Operator::GreaterOrNull
        )
    }

    pub fn takes_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

/// Aggregations applied to an association node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl Aggregate {
    pub fn function_name(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
            Aggregate::Avg => "AVG",
        }
    }
}

/// Operator with its operand(s).
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub operator: Operator,
    pub value: Value,
    pub range_end: Option<Value>,
}

impl Predicate {
    /// A one-operand predicate (or a list for `In`/`NotIn`).
    pub fn new(operator: Operator, value: impl Into<Value>) -> ViewResult<Self> {
        let predicate = Self {
            operator,
            value: value.into(),
            range_end: None,
        };
        predicate.check_arity()?;
        Ok(predicate)
    }

    /// `IsNull` / `IsNotNull`.
    pub fn unary(operator: Operator) -> ViewResult<Self> {
        let predicate = Self {
            operator,
            value: Value::Null,
            range_end: None,
        };
        predicate.check_arity()?;
        Ok(predicate)
    }

    /// Open range `low < column < high`.
    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> ViewResult<Self> {
        let predicate = Self {
            operator: Operator::Between,
            value: low.into(),
            range_end: Some(high.into()),
        };
        predicate.check_arity()?;
        Ok(predicate)
    }

    pub fn equals(value: impl Into<Value>) -> ViewResult<Self> {
        Self::new(Operator::Equals, value)
    }

    fn check_arity(&self) -> ViewResult<()> {
        let supplied = match (&self.value, &self.range_end) {
            (Value::Null, None) => 0,
            (Value::Null, Some(_)) => {
                return Err(ViewError::Composition(format!(
                    "{:?} has a range end but no value",
                    self.operator
                )))
            }
            (_, None) => 1,
            (_, Some(_)) => 2,
        };
        if supplied != self.operator.arity() {
            return Err(ViewError::Composition(format!(
                "{:?} takes {} operand(s), got {}",
                self.operator,
                self.operator.arity(),
                supplied
            )));
        }
        if let Value::List(_) = self.value {
            if !self.operator.takes_list() {
                return Err(ViewError::Composition(format!(
                    "{:?} does not accept a list",
                    self.operator
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Filter nodes
// ============================================================================

/// A projection or predicate on one attribute.
///
/// Equality is attribute identity only: two leaves on the same attribute with
/// different operators compare equal.
#[derive(Debug, Clone)]
pub struct FilterNode {
    attribute: Arc<AttributeDescriptor>,
    children: Vec<FilterNode>,
    predicate: Option<Predicate>,
    aggregate: Option<Aggregate>,
    output_name: Option<String>,
    sort_ascending: Option<bool>,
}

impl PartialEq for FilterNode {
    fn eq(&self, other: &Self) -> bool {
        self.attribute.id == other.attribute.id
    }
}

impl FilterNode {
    /// Project an attribute, or fetch an association when it has no children.
    pub fn project(attribute: Arc<AttributeDescriptor>) -> Self {
        Self {
            attribute,
            children: Vec::new(),
            predicate: None,
            aggregate: None,
            output_name: None,
            sort_ascending: None,
        }
    }

    /// A leaf predicate on a column attribute.
    pub fn leaf(attribute: Arc<AttributeDescriptor>, predicate: Predicate) -> ViewResult<Self> {
        if attribute.is_association() {
            return Err(ViewError::Composition(format!(
                "predicate on association {}",
                attribute.id
            )));
        }
        let mut node = Self::project(attribute);
        node.predicate = Some(predicate);
        Ok(node)
    }

    /// Aggregate the rows of an association.
    pub fn aggregate(attribute: Arc<AttributeDescriptor>, aggregate: Aggregate) -> ViewResult<Self> {
        let mut node = Self::project(attribute);
        node.set_aggregate(aggregate)?;
        Ok(node)
    }

    pub fn with_output_name(mut self, name: &str) -> Self {
        self.output_name = Some(name.to_string());
        self
    }

    pub fn with_sort(mut self, ascending: bool) -> Self {
        self.sort_ascending = Some(ascending);
        self
    }

    pub fn set_output_name(&mut self, name: Option<String>) {
        self.output_name = name;
    }

    pub fn set_sort(&mut self, ascending: Option<bool>) {
        self.sort_ascending = ascending;
    }

    pub fn set_aggregate(&mut self, aggregate: Aggregate) -> ViewResult<()> {
        if !self.attribute.is_association() {
            return Err(ViewError::Composition(format!(
                "{:?} on non-association {}",
                aggregate, self.attribute.id
            )));
        }
        self.aggregate = Some(aggregate);
        Ok(())
    }

    /// Add a child; the child's attribute must exist on this association's target.
    pub fn add_child(&mut self, child: FilterNode, registry: &SchemaRegistry) -> ViewResult<()> {
        if !self.attribute.is_association() {
            return Err(ViewError::Composition(format!(
                "{} is not an association and cannot have children",
                self.attribute.id
            )));
        }
        let target = registry
            .target_of(&self.attribute)
            .map_err(|e| ViewError::Composition(e.to_string()))?;
        if !target.has_attribute(&child.attribute.id) {
            return Err(ViewError::Composition(format!(
                "{} does not belong to {} (target of {})",
                child.attribute.id,
                target.name(),
                self.attribute.id
            )));
        }
        self.children.push(child);
        Ok(())
    }

    /// Builder-style [`FilterNode::add_child`].
    pub fn with_child(mut self, child: FilterNode, registry: &SchemaRegistry) -> ViewResult<Self> {
        self.add_child(child, registry)?;
        Ok(self)
    }

    pub fn attribute(&self) -> &Arc<AttributeDescriptor> {
        &self.attribute
    }

    pub fn children(&self) -> &[FilterNode] {
        &self.children
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn aggregate_op(&self) -> Option<Aggregate> {
        self.aggregate
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    pub fn sort_ascending(&self) -> Option<bool> {
        self.sort_ascending
    }

    pub fn is_association(&self) -> bool {
        self.attribute.is_association()
    }

    pub fn property(&self) -> &str {
        self.attribute.property()
    }
}

// ============================================================================
// Filter tree
// ============================================================================

/// Root of a filter tree: root entities plus the top-level filter list.
#[derive(Debug, Clone)]
pub struct FilterTree {
    roots: Vec<Arc<EntitySchema>>,
    filters: Vec<FilterNode>,
}

impl FilterTree {
    /// A tree over one or more polymorphic roots sharing a table.
    pub fn new(roots: Vec<Arc<EntitySchema>>) -> ViewResult<Self> {
        let Some(first) = roots.first() else {
            return Err(ViewError::Schema("a filter tree needs at least one root entity".into()));
        };
        if let Some(other) = roots.iter().find(|r| r.table() != first.table()) {
            return Err(ViewError::Schema(format!(
                "root entities {} and {} do not share a table",
                first.name(),
                other.name()
            )));
        }
        Ok(Self {
            roots,
            filters: Vec::new(),
        })
    }

    /// A tree over a single registered entity.
    pub fn for_entity(registry: &SchemaRegistry, name: &str) -> ViewResult<Self> {
        Self::new(vec![Arc::clone(registry.entity(name)?)])
    }

    /// Add a top-level filter; its attribute must belong to at least one root.
    pub fn add(&mut self, node: FilterNode) -> ViewResult<&mut Self> {
        if !self.roots.iter().any(|r| r.has_attribute(&node.attribute.id)) {
            return Err(ViewError::Schema(format!(
                "{} does not apply to {}",
                node.attribute.id,
                self.root_names().join(" | ")
            )));
        }
        self.filters.push(node);
        Ok(self)
    }

    /// Add nested nodes for a dotted path such as `inner.value`.
    ///
    /// Intermediate association nodes are merged with existing nodes on the
    /// same attribute. Returns the node created (or found) for the last segment.
    pub fn add_path(
        &mut self,
        registry: &SchemaRegistry,
        path: &str,
        predicate: Option<Predicate>,
    ) -> ViewResult<&mut FilterNode> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ViewError::Schema(format!("malformed filter path '{}'", path)));
        }

        let mut chain: Vec<Arc<AttributeDescriptor>> = Vec::with_capacity(segments.len());
        let mut current = self
            .roots
            .iter()
            .find_map(|r| r.attribute(segments[0]))
            .cloned()
            .ok_or_else(|| {
                ViewError::Schema(format!(
                    "'{}' does not apply to {}",
                    segments[0],
                    self.root_names().join(" | ")
                ))
            })?;
        for segment in &segments[1..] {
            let target = registry.target_of(&current)?;
            let next = target.attribute(segment).cloned().ok_or_else(|| {
                ViewError::Schema(format!("{} has no attribute '{}'", target.name(), segment))
            })?;
            chain.push(std::mem::replace(&mut current, next));
        }

        let mut level = &mut self.filters;
        for attr in chain {
            let pos = match level.iter().position(|n| n.attribute.id == attr.id) {
                Some(pos) => pos,
                None => {
                    level.push(FilterNode::project(attr));
                    level.len() - 1
                }
            };
            level = &mut level[pos].children;
        }

        let existing = if predicate.is_none() {
            level
                .iter()
                .position(|n| n.attribute.id == current.id && n.predicate.is_none())
        } else {
            None
        };
        let pos = match existing {
            Some(pos) => pos,
            None => {
                let node = match predicate {
                    Some(p) => FilterNode::leaf(current, p)?,
                    None => FilterNode::project(current),
                };
                level.push(node);
                level.len() - 1
            }
        };
        Ok(&mut level[pos])
    }

    pub fn roots(&self) -> &[Arc<EntitySchema>] {
        &self.roots
    }

    /// The first root; its table is shared by all roots.
    pub fn primary_root(&self) -> &Arc<EntitySchema> {
        &self.roots[0]
    }

    pub fn filters(&self) -> &[FilterNode] {
        &self.filters
    }

    fn root_names(&self) -> Vec<&str> {
        self.roots.iter().map(|r| r.name()).collect()
    }
}
