//! Update planner: recorded view mutations → per-entity write statements.
//!
//! Modified scalar paths are grouped by the node they belong to. Each node
//! maps to one entity through the join plan of the compiled view (the root
//! node maps to the root entity matching the row's discriminator). For every
//! node the entity's attributes split into:
//!
//! - filtered attributes: the modified ones, written by the statement,
//! - join-mapping attributes: non-key join columns on either side of the
//!   node's associations, kept consistent with the neighbouring nodes,
//! - unmodified attributes: everything else, carried forward unchanged.
//!
//! Plain entities get one batched `UPDATE ... SET <filtered+mapping> WHERE
//! <keys>`. Bitemporal entities close the current interval and open a new
//! one per row:
//!
//! ```sql
//! UPDATE t SET version_to = :now
//!   WHERE id = :k_id AND version_from = :k_version_from AND version_to IS NULL
//! INSERT INTO t (id, <unmodified>, <filtered+mapping>, version_from)
//! SELECT id, <unmodified>, :v_.., :now FROM t WHERE id = :k_id AND version_from = :k_version_from
//! ```
//!
//! A close must match exactly one open row; the session fails the flush
//! before the successor is inserted when it matches none.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, trace, warn};

use super::compiler::{CompiledView, JoinPlanEntry};
use super::row::{entity_path, node_at, node_at_mut, split_property, View, ViewRow, NEW_ROW_MARKER};
use crate::config::ViewSettings;
use crate::context::QueryContext;
use crate::error::{ViewError, ViewResult};
use crate::schema::{AttributeDescriptor, EntitySchema};
use crate::sql::builder::{SqlBuilder, StatementKind};
use crate::sql::expr::{col, param, ExprExt};
use crate::sql::Dialect;
use crate::value::{JdbcType, Row, Value};

const NOW_PARAM: &str = "now";

/// A named bind value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub value: Value,
    pub jdbc_type: JdbcType,
}

impl BoundParam {
    /// Bind `value` coerced to the column type.
    pub fn new(name: impl Into<String>, value: Value, jdbc_type: JdbcType) -> Self {
        Self {
            name: name.into(),
            value: jdbc_type.coerce(value),
            jdbc_type,
        }
    }
}

/// One statement and the parameter sets it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStatement {
    pub entity_path: String,
    pub kind: StatementKind,
    pub sql: String,
    pub batch: Vec<Vec<BoundParam>>,
    /// Every execution must affect at least one row.
    pub requires_match: bool,
}

/// Ordered statements of one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub statements: Vec<PlannedStatement>,
    /// Write clock used to close and open validity intervals.
    pub now: NaiveDateTime,
    reopened: Vec<(usize, String, String)>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// (row, node path, versionFrom property) slots that start a new interval.
    pub(crate) fn reopened(&self) -> &[(usize, String, String)] {
        &self.reopened
    }
}

type BatchKey = (String, &'static str, Vec<String>);

/// Statement accumulator of one planning run.
struct Planning {
    dialect: Dialect,
    now: NaiveDateTime,
    statements: Vec<PlannedStatement>,
    batches: HashMap<BatchKey, usize>,
    reopened: Vec<(usize, String, String)>,
}

impl Planning {
    fn now_param(&self) -> BoundParam {
        BoundParam::new(NOW_PARAM, Value::Timestamp(self.now), JdbcType::Timestamp)
    }

    /// Add a parameter set to the statement sharing `key`, creating it if needed.
    /// Returns the statement's position.
    fn batched(
        &mut self,
        key: BatchKey,
        kind: StatementKind,
        builder: &SqlBuilder,
        params: Vec<BoundParam>,
    ) -> usize {
        if let Some(&position) = self.batches.get(&key) {
            self.statements[position].batch.push(params);
            return position;
        }
        let entity_path = key.0.clone();
        self.batches.insert(key, self.statements.len());
        self.single(entity_path, kind, builder, params)
    }

    fn single(
        &mut self,
        entity_path: String,
        kind: StatementKind,
        builder: &SqlBuilder,
        params: Vec<BoundParam>,
    ) -> usize {
        self.statements.push(PlannedStatement {
            entity_path,
            kind,
            sql: builder.to_sql(self.dialect),
            batch: vec![params],
            requires_match: false,
        });
        self.statements.len() - 1
    }
}

/// Plans the writes of a modified view.
#[derive(Debug, Clone)]
pub struct UpdatePlanner<'a> {
    settings: &'a ViewSettings,
}

impl<'a> UpdatePlanner<'a> {
    pub fn new(settings: &'a ViewSettings) -> Self {
        Self { settings }
    }

    /// Propagate join columns between nodes, then plan every pending write.
    pub fn plan(&self, view: &mut View, ctx: &QueryContext) -> ViewResult<WritePlan> {
        let now = ctx.write_timestamp();
        let mut planning = Planning {
            dialect: view.compiled().dialect,
            now,
            statements: Vec::new(),
            batches: HashMap::new(),
            reopened: Vec::new(),
        };

        let (compiled, rows) = view.parts_mut();
        for row in rows.iter_mut().filter(|r| !r.is_new()) {
            self.propagate(compiled, row)?;
        }
        for (index, row) in rows.iter().enumerate() {
            if row.is_new() {
                self.plan_insert(compiled, index, &row.data, &mut planning)?;
            } else {
                self.plan_updates(compiled, index, row, ctx, &mut planning)?;
            }
        }
        for (index, row) in view.removed().iter().enumerate() {
            self.plan_removal(view.compiled(), index, row, &mut planning)?;
        }

        debug!(
            statements = planning.statements.len(),
            reopened = planning.reopened.len(),
            "planned view flush"
        );
        Ok(WritePlan {
            statements: planning.statements,
            now,
            reopened: planning.reopened,
        })
    }

    /// Keep foreign keys consistent between a modified node and its parent.
    ///
    /// A non-key parent-side column takes the child's value; otherwise a
    /// non-key child-side column takes the parent's value.
    fn propagate(&self, compiled: &CompiledView, row: &mut ViewRow) -> ViewResult<()> {
        let nodes: BTreeSet<String> = row
            .dirty()
            .map(|p| split_property(p).0.to_string())
            .filter(|n| !n.is_empty())
            .collect();

        for node in nodes {
            let path = entity_path(&node);
            let Some(entry) = compiled.join_plan.by_path(&path) else {
                self.unresolved(&path, &node)?;
                continue;
            };
            let Some(association) = &entry.attribute.association else {
                continue;
            };
            let (parent, _) = split_property(&node);

            for pair in &association.join_columns {
                let local = entry.source_entity.attribute_by_column(&pair.local);
                let remote = entry.entity.attribute_by_column(&pair.target);
                let (Some(local), Some(remote)) = (local, remote) else {
                    let column = if local.is_none() { &pair.local } else { &pair.target };
                    self.unresolved(&path, column)?;
                    continue;
                };
                if local.primary_key && remote.primary_key {
                    debug!(path = %path, local = %pair.local, target = %pair.target, "join columns are both keys, nothing to propagate");
                    continue;
                }

                let child = node_at(&row.data, &node)?.and_then(|n| n.get(remote.property()).cloned());
                let upper = node_at(&row.data, parent)?.and_then(|n| n.get(local.property()).cloned());

                if !local.primary_key {
                    if let Some(value) = child.filter(|v| Some(v) != upper.as_ref()) {
                        trace!(path = %path, column = %pair.local, "child key flows to parent");
                        node_at_mut(&mut row.data, parent)?.insert(local.property(), value);
                        row.mark_dirty(join_path(parent, local.property()));
                    }
                } else if let Some(value) = upper.filter(|v| Some(v) != child.as_ref()) {
                    trace!(path = %path, column = %pair.target, "parent key flows to child");
                    node_at_mut(&mut row.data, &node)?.insert(remote.property(), value);
                    row.mark_dirty(join_path(&node, remote.property()));
                }
            }
        }
        Ok(())
    }

    fn plan_updates(
        &self,
        compiled: &CompiledView,
        index: usize,
        row: &ViewRow,
        ctx: &QueryContext,
        planning: &mut Planning,
    ) -> ViewResult<()> {
        let mut nodes: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for path in row.dirty() {
            let (node, property) = split_property(path);
            nodes.entry(node).or_default().insert(property);
        }

        for (node, properties) in nodes {
            let path = entity_path(node);
            let (entity, link) = if path.is_empty() {
                (root_entity(compiled, &row.data), None)
            } else {
                match compiled.join_plan.by_path(&path) {
                    Some(entry) => (&entry.entity, Some(entry)),
                    None => {
                        self.unresolved(&path, node)?;
                        continue;
                    }
                }
            };
            let Some(data) = node_at(&row.data, node)? else {
                continue;
            };

            let mut columns: Vec<&Arc<AttributeDescriptor>> = Vec::new();
            for property in properties {
                let Some(attr) = entity.attribute(property) else {
                    self.unresolved(&path, property)?;
                    continue;
                };
                if is_writable(entity, attr) && !columns.iter().any(|c| c.id == attr.id) {
                    columns.push(attr);
                }
            }
            if columns.is_empty() {
                trace!(path = %path, row = index, "no writable columns changed");
                continue;
            }
            for attr in mapping_attributes(compiled, entity, &path, link) {
                if data.contains_key(attr.property()) && !columns.iter().any(|c| c.id == attr.id) {
                    columns.push(attr);
                }
            }

            let keys = key_values(entity, data, &path, index)?;
            if entity.is_versioned() && !ctx.fast_update {
                self.close_and_insert(entity, node, &path, index, data, &columns, &keys, planning)?;
            } else {
                let mut builder = SqlBuilder::update(entity.table());
                let mut params = Vec::new();
                for attr in &columns {
                    let column = attr.column_name().unwrap_or_default();
                    let name = param_name("v", column);
                    builder.set(column, param(&name));
                    params.push(BoundParam::new(
                        name,
                        data.get(attr.property()).cloned().unwrap_or_default(),
                        attr.jdbc_type,
                    ));
                }
                bind_keys(&mut builder, &mut params, &keys);
                let key = (path.clone(), "update", column_names(&columns));
                planning.batched(key, StatementKind::Update, &builder, params);
            }
        }
        Ok(())
    }

    /// Close the current interval and insert its successor sourced from the old row.
    #[allow(clippy::too_many_arguments)]
    fn close_and_insert(
        &self,
        entity: &EntitySchema,
        node: &str,
        path: &str,
        index: usize,
        data: &Row,
        columns: &[&Arc<AttributeDescriptor>],
        keys: &[(&Arc<AttributeDescriptor>, Value)],
        planning: &mut Planning,
    ) -> ViewResult<()> {
        let Some(version) = entity.version() else {
            return Ok(());
        };
        let (Some(from), Some(to)) = (version.from.column_name(), version.to.column_name()) else {
            return Err(ViewError::Schema(format!(
                "{} has a version attribute without a column",
                entity.name()
            )));
        };

        let mut close = SqlBuilder::update(entity.table());
        close.set(to, param(NOW_PARAM));
        let mut params = vec![planning.now_param()];
        bind_keys(&mut close, &mut params, keys);
        close.filter(col(to).is_null());
        let position = planning.single(path.to_string(), StatementKind::Update, &close, params);
        planning.statements[position].requires_match = true;

        let mut insert = SqlBuilder::insert_into(entity.table());
        let mut source = SqlBuilder::select();
        source.from_unaliased(entity.table());
        let mut params = Vec::new();

        for key in entity.identity_keys() {
            if let Some(column) = key.column_name() {
                insert.insert_column(column);
                source.column(col(column), None);
            }
        }
        for attr in entity.scalar_attributes() {
            let carried = is_writable(entity, attr) && !columns.iter().any(|c| c.id == attr.id);
            if let (true, Some(column)) = (carried, attr.column_name()) {
                insert.insert_column(column);
                source.column(col(column), None);
            }
        }
        for attr in columns {
            let column = attr.column_name().unwrap_or_default();
            let name = param_name("v", column);
            insert.insert_column(column);
            source.column(param(&name), None);
            params.push(BoundParam::new(
                name,
                data.get(attr.property()).cloned().unwrap_or_default(),
                attr.jdbc_type,
            ));
        }
        insert.insert_column(from);
        source.column(param(NOW_PARAM), None);
        params.push(planning.now_param());
        bind_keys(&mut source, &mut params, keys);
        insert.insert_select(source);
        planning.single(path.to_string(), StatementKind::Insert, &insert, params);

        planning
            .reopened
            .push((index, node.to_string(), version.from.property().to_string()));
        Ok(())
    }

    /// INSERT for an appended root row.
    fn plan_insert(
        &self,
        compiled: &CompiledView,
        index: usize,
        data: &Row,
        planning: &mut Planning,
    ) -> ViewResult<()> {
        let entity = root_entity(compiled, data);
        let mut values: Vec<(&Arc<AttributeDescriptor>, Value)> = Vec::new();

        for (property, value) in data.iter() {
            if property == NEW_ROW_MARKER || property == &compiled.root_key_alias {
                continue;
            }
            if matches!(value, Value::Row(_) | Value::List(_)) {
                trace!(property = %property, "nested values of an appended row are not inserted");
                continue;
            }
            let Some(attr) = entity.attribute(property) else {
                self.unresolved("", property)?;
                continue;
            };
            if attr.column_name().is_some() && !attr.is_association() && !entity.is_version_attribute(attr) {
                values.push((attr, value.clone()));
            }
        }
        if let Some(d) = entity.discriminator() {
            if !values.iter().any(|(a, _)| a.id == d.attribute.id) {
                values.push((&d.attribute, d.value.clone()));
            }
        }
        if let Some(version) = entity.version() {
            values.push((&version.from, Value::Timestamp(planning.now)));
            planning
                .reopened
                .push((index, String::new(), version.from.property().to_string()));
        }
        if values.is_empty() {
            return Ok(());
        }

        let mut builder = SqlBuilder::insert_into(entity.table());
        let mut params = Vec::new();
        for (attr, value) in &values {
            let column = attr.column_name().unwrap_or_default();
            let name = param_name("v", column);
            builder.value(column, param(&name));
            params.push(BoundParam::new(name, value.clone(), attr.jdbc_type));
        }
        let columns: Vec<&Arc<AttributeDescriptor>> = values.iter().map(|(a, _)| *a).collect();
        let key = (String::new(), "insert", column_names(&columns));
        planning.batched(key, StatementKind::Insert, &builder, params);
        Ok(())
    }

    /// DELETE for plain roots, a close-only UPDATE for bitemporal ones.
    fn plan_removal(
        &self,
        compiled: &CompiledView,
        index: usize,
        data: &Row,
        planning: &mut Planning,
    ) -> ViewResult<()> {
        let entity = root_entity(compiled, data);
        let keys = key_values(entity, data, "", index)?;
        let mut params = Vec::new();

        match entity.version().and_then(|v| v.to.column_name()) {
            Some(to) => {
                let mut builder = SqlBuilder::update(entity.table());
                builder.set(to, param(NOW_PARAM));
                params.push(planning.now_param());
                bind_keys(&mut builder, &mut params, &keys);
                builder.filter(col(to).is_null());
                let key = (String::new(), "close", Vec::new());
                let position = planning.batched(key, StatementKind::Update, &builder, params);
                planning.statements[position].requires_match = true;
            }
            None => {
                let mut builder = SqlBuilder::delete_from(entity.table());
                bind_keys(&mut builder, &mut params, &keys);
                let key = (String::new(), "delete", Vec::new());
                planning.batched(key, StatementKind::Delete, &builder, params);
            }
        }
        Ok(())
    }

    /// Report a property or column that cannot be resolved during write-back.
    fn unresolved(&self, entity_path: &str, column: &str) -> ViewResult<()> {
        if self.settings.strict_write_back {
            return Err(ViewError::Resolution {
                entity_path: entity_path.to_string(),
                column: column.to_string(),
            });
        }
        warn!(entity_path, column, "cannot resolve write-back column, skipped");
        Ok(())
    }
}

fn join_path(node: &str, property: &str) -> String {
    if node.is_empty() {
        property.to_string()
    } else {
        format!("{}.{}", node, property)
    }
}

/// Root entity of a row: the root whose discriminator matches, else the first.
fn root_entity<'c>(compiled: &'c CompiledView, data: &Row) -> &'c Arc<EntitySchema> {
    let matching = compiled.roots.iter().find(|root| {
        root.discriminator().is_some_and(|d| {
            data.get(d.attribute.property())
                .is_some_and(|v| d.attribute.jdbc_type.coerce(v.clone()) == d.value)
        })
    });
    match matching {
        Some(root) => root,
        None => &compiled.roots[0],
    }
}

/// Columns a statement may set: scalar, non-key, not part of the version pair.
fn is_writable(entity: &EntitySchema, attr: &AttributeDescriptor) -> bool {
    attr.column_name().is_some()
        && !attr.is_association()
        && !attr.primary_key
        && !entity.is_version_attribute(attr)
}

/// Non-key join columns of `entity` linking it to its parent and children.
fn mapping_attributes<'c>(
    compiled: &'c CompiledView,
    entity: &'c EntitySchema,
    path: &str,
    link: Option<&'c JoinPlanEntry>,
) -> Vec<&'c Arc<AttributeDescriptor>> {
    let mut columns: Vec<&str> = Vec::new();
    if let Some(assoc) = link.and_then(|l| l.attribute.association.as_ref()) {
        columns.extend(assoc.join_columns.iter().map(|p| p.target.as_str()));
    }
    for entry in compiled.join_plan.iter() {
        if split_property(&entry.path).0 != path {
            continue;
        }
        if let Some(assoc) = &entry.attribute.association {
            columns.extend(assoc.join_columns.iter().map(|p| p.local.as_str()));
        }
    }
    columns
        .into_iter()
        .filter_map(|c| entity.attribute_by_column(c))
        .filter(|a| is_writable(entity, a))
        .collect()
}

/// Identity keys plus `versionFrom` with their current values.
fn key_values<'e>(
    entity: &'e EntitySchema,
    data: &Row,
    path: &str,
    row: usize,
) -> ViewResult<Vec<(&'e Arc<AttributeDescriptor>, Value)>> {
    let mut keys = entity.identity_keys();
    if let Some(version) = entity.version() {
        keys.push(&version.from);
    }
    keys.into_iter()
        .map(|attr| match data.get(attr.property()) {
            Some(value) if !value.is_null() => Ok((attr, value.clone())),
            _ => Err(ViewError::MissingKey {
                entity_path: if path.is_empty() { entity.name().to_string() } else { path.to_string() },
                row,
                column: attr.column_name().unwrap_or(attr.property()).to_string(),
            }),
        })
        .collect()
}

fn bind_keys(
    builder: &mut SqlBuilder,
    params: &mut Vec<BoundParam>,
    keys: &[(&Arc<AttributeDescriptor>, Value)],
) {
    for (attr, value) in keys {
        let column = attr.column_name().unwrap_or_default();
        let name = param_name("k", column);
        builder.filter(col(column).eq(param(&name)));
        params.push(BoundParam::new(name, value.clone(), attr.jdbc_type));
    }
}

fn column_names(columns: &[&Arc<AttributeDescriptor>]) -> Vec<String> {
    columns
        .iter()
        .filter_map(|a| a.column_name())
        .map(str::to_string)
        .collect()
}

/// `v_inner_id` style parameter names, safe for any column spelling.
fn param_name(prefix: &str, column: &str) -> String {
    let column: String = column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", prefix, column)
}
