//! View compiler: filter tree → primary SELECT plus correlated sub-selects.
//!
//! The compiler walks the filter tree depth first. One-to-one associations
//! are inlined as `LEFT OUTER JOIN`s, deduplicated by (path, attribute).
//! Collection associations are never joined into the primary query; each
//! distinct collection path becomes a sub-select that starts from the root
//! table, replays the join chain leading to the collection and selects the
//! synthetic root key next to the element columns. Sub-selects are keyed by
//! that root key and restricted to the keys of the primary result at
//! execution time.
//!
//! A collection inside a collection element gets its own sub-select. It
//! replays the enclosing collection joins and also projects the identity
//! of every enclosing element, so the merger can place each row inside the
//! element it belongs to.
//!
//! Every joined entity and the root receive their version constraint
//! (`versionFrom <= T AND (versionTo > T OR versionTo IS NULL)`, or
//! `versionTo IS NULL` without a point in time) and discriminator constraint.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Page;
use crate::config::ViewSettings;
use crate::context::QueryContext;
use crate::error::{ViewError, ViewResult};
use crate::filter::{FilterNode, FilterTree, Operator, Predicate};
use crate::schema::{AttributeDescriptor, AttributeId, EntitySchema, SchemaRegistry};
use crate::sql::builder::{Join, JoinKind, SortDir, SqlBuilder, TableRef};
use crate::sql::expr::{cast_text, func, lit_bool, lit_null, lit_str, row_ref, table_col, Expr, ExprExt};
use crate::sql::Dialect;
use crate::value::{JdbcType, Value};

// ============================================================================
// Compiled output
// ============================================================================

/// One deduplicated join of a compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlanEntry {
    /// Dotted property path of the association (`inner`, `inner.owner`).
    pub path: String,
    /// Association attribute traversed by the join.
    pub attribute: Arc<AttributeDescriptor>,
    /// Entity the join starts from.
    pub source_entity: Arc<EntitySchema>,
    /// Target entity of the association.
    pub entity: Arc<EntitySchema>,
    /// Table index the join starts from.
    pub source: usize,
    /// Newly allocated table index.
    pub alias: usize,
    /// Rendered join clause (base mapping plus version/discriminator predicates).
    pub join: Join,
}

/// Join registry of one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinPlan {
    entries: Vec<JoinPlanEntry>,
}

impl JoinPlan {
    /// Entry for a dedup key.
    pub fn find(&self, path: &str, attribute: &AttributeId) -> Option<&JoinPlanEntry> {
        self.entries
            .iter()
            .find(|e| e.path == path && &e.attribute.id == attribute)
    }

    /// Entry for an association path.
    pub fn by_path(&self, path: &str) -> Option<&JoinPlanEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn by_alias(&self, alias: usize) -> Option<&JoinPlanEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JoinPlanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Joins leading from the root to `alias`, root side first.
    fn chain_to(&self, alias: usize) -> Vec<Join> {
        let mut chain = Vec::new();
        let mut current = alias;
        while let Some(entry) = self.by_alias(current) {
            chain.push(entry.join.clone());
            current = entry.source;
        }
        chain.reverse();
        chain
    }
}

/// What a projected column carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    RootKey,
    Value,
    Aggregate,
}

/// Output alias of a projected column and the attribute it reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub alias: String,
    pub attribute: Option<Arc<AttributeDescriptor>>,
    pub kind: ColumnKind,
}

impl ColumnBinding {
    /// Type used to coerce values read back for this column.
    pub fn jdbc_type(&self) -> Option<JdbcType> {
        self.attribute.as_ref().map(|a| a.jdbc_type)
    }
}

/// A collection that encloses a nested collection path.
#[derive(Debug, Clone, PartialEq)]
pub struct EnclosingCollection {
    pub path: String,
    /// Identity properties of the enclosing element (keys and `versionFrom`).
    pub keys: Vec<String>,
}

/// Correlated sub-select for one collection path.
#[derive(Debug, Clone, PartialEq)]
pub struct SubSelect {
    /// Collection path (`listParameter`, `inner.items`, `items.subs`).
    pub path: String,
    /// Statement without the root-key restriction.
    pub builder: SqlBuilder,
    pub columns: Vec<ColumnBinding>,
    /// Enclosing collections, outermost first; empty for a top-level collection.
    pub enclosing: Vec<EnclosingCollection>,
    root_key: Expr,
    root_key_type: JdbcType,
    dialect: Dialect,
}

impl SubSelect {
    /// SQL text before the root keys are known.
    pub fn template_sql(&self) -> String {
        self.builder.to_sql(self.dialect)
    }

    /// SQL text restricted to `rootKey IN (keys)`.
    pub fn sql_for_keys(&self, keys: &[Value]) -> String {
        let values = keys
            .iter()
            .map(|k| self.root_key_type.literal(k))
            .collect();
        let mut builder = self.builder.clone();
        builder.filter(self.root_key.clone().in_list(values));
        builder.to_sql(self.dialect)
    }
}

/// Output of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledView {
    pub roots: Vec<Arc<EntitySchema>>,
    pub primary: SqlBuilder,
    pub columns: Vec<ColumnBinding>,
    pub sub_selects: Vec<SubSelect>,
    pub join_plan: JoinPlan,
    pub root_key_alias: String,
    pub root_key_type: JdbcType,
    pub dialect: Dialect,
}

impl CompiledView {
    pub fn primary_sql(&self) -> String {
        self.primary.to_sql(self.dialect)
    }

    pub fn sub_select(&self, path: &str) -> Option<&SubSelect> {
        self.sub_selects.iter().find(|s| s.path == path)
    }

    /// Whether `path` names a collection of this view.
    pub fn is_collection(&self, path: &str) -> bool {
        self.sub_select(path).is_some()
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles filter trees against a schema registry.
#[derive(Debug, Clone)]
pub struct ViewCompiler<'a> {
    registry: &'a SchemaRegistry,
    settings: &'a ViewSettings,
    dialect: Dialect,
}

impl<'a> ViewCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry, settings: &'a ViewSettings) -> Self {
        Self {
            registry,
            settings,
            dialect: Dialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Compile a filter tree into a primary statement and its sub-selects.
    pub fn compile(
        &self,
        tree: &FilterTree,
        ctx: &QueryContext,
        page: Page,
    ) -> ViewResult<CompiledView> {
        let mut compilation = Compilation {
            registry: self.registry,
            ctx,
            next_alias: 1,
            plan: JoinPlan::default(),
            collections: Vec::new(),
        };
        let view = compilation.run(tree, self.settings, self.dialect, page)?;

        debug!(
            sql = %view.primary_sql(),
            joins = view.join_plan.len(),
            sub_selects = view.sub_selects.len(),
            "compiled view"
        );
        for sub in &view.sub_selects {
            debug!(path = %sub.path, sql = %sub.template_sql(), "compiled collection sub-select");
        }
        Ok(view)
    }
}

/// A collection projection waiting for its sub-select.
#[derive(Debug, Clone)]
struct CollectionColumn {
    path: String,
    attribute: Arc<AttributeDescriptor>,
    source_entity: Arc<EntitySchema>,
    source_alias: usize,
    nodes: Vec<FilterNode>,
    enclosing: Vec<ScopeCollection>,
}

/// A collection joined into a sub-select scope.
#[derive(Debug, Clone)]
struct ScopeCollection {
    path: String,
    entity: Arc<EntitySchema>,
    alias: usize,
}

impl ScopeCollection {
    fn describe(&self) -> EnclosingCollection {
        let mut keys: Vec<String> = self
            .entity
            .identity_keys()
            .iter()
            .map(|k| k.property().to_string())
            .collect();
        if let Some(version) = self.entity.version() {
            keys.push(version.from.property().to_string());
        }
        EnclosingCollection {
            path: self.path.clone(),
            keys,
        }
    }
}

/// Statement being filled by a walk (primary query or one sub-select).
struct Scope {
    builder: SqlBuilder,
    columns: Vec<ColumnBinding>,
    aliases: HashSet<String>,
    plain: Vec<Expr>,
    aggregated: bool,
    /// Collections joined so far, outermost first.
    enclosing: Vec<ScopeCollection>,
}

impl Scope {
    fn new(builder: SqlBuilder, enclosing: Vec<ScopeCollection>) -> Self {
        Self {
            builder,
            columns: Vec::new(),
            aliases: HashSet::new(),
            plain: Vec::new(),
            aggregated: false,
            enclosing,
        }
    }

    fn project(
        &mut self,
        expr: Expr,
        alias: String,
        attribute: Option<Arc<AttributeDescriptor>>,
        kind: ColumnKind,
    ) {
        if !self.aliases.insert(alias.clone()) {
            return;
        }
        self.builder.column(expr.clone(), Some(&alias));
        if kind == ColumnKind::Aggregate {
            self.aggregated = true;
        } else {
            self.plain.push(expr);
        }
        self.columns.push(ColumnBinding {
            alias,
            attribute,
            kind,
        });
    }

    fn finish(mut self) -> (SqlBuilder, Vec<ColumnBinding>) {
        if self.aggregated {
            for expr in self.plain.drain(..) {
                self.builder.group_by(expr);
            }
        }
        (self.builder, self.columns)
    }
}

/// Per-invocation state: alias counter, join registry, collection accumulator.
struct Compilation<'c> {
    registry: &'c SchemaRegistry,
    ctx: &'c QueryContext,
    next_alias: usize,
    plan: JoinPlan,
    collections: Vec<CollectionColumn>,
}

fn child_path(prefix: &str, property: &str) -> String {
    if prefix.is_empty() {
        property.to_string()
    } else {
        format!("{}.{}", prefix, property)
    }
}

impl<'c> Compilation<'c> {
    fn run(
        &mut self,
        tree: &FilterTree,
        settings: &ViewSettings,
        dialect: Dialect,
        page: Page,
    ) -> ViewResult<CompiledView> {
        let roots = tree.roots().to_vec();
        let root = Arc::clone(tree.primary_root());
        let root_key = root_key_expr(&root, &settings.key_delimiter);
        let root_key_type = root_key_type(&root);

        let mut primary = SqlBuilder::select();
        primary.from_table(root.table(), 0);
        let mut scope = Scope::new(primary, Vec::new());
        scope.project(
            root_key.clone(),
            settings.root_key_alias.clone(),
            None,
            ColumnKind::RootKey,
        );

        if tree.filters().is_empty() {
            for attr in root.scalar_attributes() {
                self.project_column(&mut scope, attr, 0, "");
            }
        }
        self.walk(&mut scope, tree.filters(), &roots, 0, "")?;
        self.project_identity(&mut scope, &root, 0, "");
        if roots.iter().any(|r| r.discriminator().is_some()) {
            if let Some(d) = root.discriminator() {
                self.project_column(&mut scope, &d.attribute, 0, "");
            }
        }
        self.constrain_root(&mut scope.builder, &roots);

        if let Some(offset) = page.offset {
            scope.builder.offset(offset);
        }
        if let Some(limit) = page.limit.or(settings.default_limit) {
            scope.builder.limit(limit);
        }
        let (primary, columns) = scope.finish();

        // Sub-selects may defer collections nested in their elements.
        let mut sub_selects = Vec::new();
        while !self.collections.is_empty() {
            for collection in std::mem::take(&mut self.collections) {
                sub_selects.push(self.sub_select(
                    collection,
                    &roots,
                    &root_key,
                    &settings.root_key_alias,
                    root_key_type,
                    dialect,
                )?);
            }
        }

        Ok(CompiledView {
            roots,
            primary,
            columns,
            sub_selects,
            join_plan: std::mem::take(&mut self.plan),
            root_key_alias: settings.root_key_alias.clone(),
            root_key_type,
            dialect,
        })
    }

    /// Depth-first walk of `nodes` against the entities at table index `alias`.
    fn walk(
        &mut self,
        scope: &mut Scope,
        nodes: &[FilterNode],
        entities: &[Arc<EntitySchema>],
        alias: usize,
        prefix: &str,
    ) -> ViewResult<()> {
        for node in nodes {
            let resolved = entities.iter().find_map(|e| {
                e.attribute(node.property())
                    .filter(|a| a.id == node.attribute().id)
                    .map(|a| (Arc::clone(e), Arc::clone(a)))
            });
            let Some((entity, attr)) = resolved else {
                trace!(attribute = %node.attribute().id, path = prefix, "filter does not apply here, skipped");
                continue;
            };
            let path = child_path(prefix, attr.property());

            if let Some(aggregate) = node.aggregate_op() {
                let target = Arc::clone(self.registry.target_of(&attr)?);
                let joined = self.join(scope, &path, &attr, &entity, alias)?;
                let key = target
                    .identity_keys()
                    .first()
                    .and_then(|k| k.column_name())
                    .unwrap_or_default()
                    .to_string();
                let name = node.output_name().unwrap_or(&path).to_string();
                scope.project(
                    func(aggregate.function_name(), vec![row_ref(joined, &key)]),
                    name,
                    None,
                    ColumnKind::Aggregate,
                );
                continue;
            }

            if attr.is_collection() {
                self.project_join_side(scope, &entity, local_columns(&attr), alias, prefix);
                self.defer_collection(&path, &attr, &entity, alias, node, &scope.enclosing);
                continue;
            }

            if attr.is_association() {
                let target = Arc::clone(self.registry.target_of(&attr)?);
                let joined = self.join(scope, &path, &attr, &entity, alias)?;
                if node.children().is_empty() {
                    for column in target.scalar_attributes() {
                        self.project_column(scope, column, joined, &path);
                    }
                } else {
                    self.walk(scope, node.children(), std::slice::from_ref(&target), joined, &path)?;
                }
                self.project_identity(scope, &target, joined, &path);
                self.project_join_side(scope, &entity, local_columns(&attr), alias, prefix);
                self.project_join_side(scope, &target, target_columns(&attr), joined, &path);
                continue;
            }

            let Some(column) = attr.column_name() else {
                trace!(attribute = %attr.id, "virtual attribute has no column, skipped");
                continue;
            };
            let expr = table_col(alias, column);
            if let Some(predicate) = node.predicate() {
                scope.builder.filter(predicate_expr(expr.clone(), &attr, predicate));
            }
            let name = node.output_name().unwrap_or(&path).to_string();
            scope.project(expr.clone(), name, Some(Arc::clone(&attr)), ColumnKind::Value);
            if let Some(ascending) = node.sort_ascending() {
                let dir = if ascending { SortDir::Asc } else { SortDir::Desc };
                scope.builder.order_by(expr, dir);
            }
        }
        Ok(())
    }

    /// Join an association once per (path, attribute); returns the table index.
    fn join(
        &mut self,
        scope: &mut Scope,
        path: &str,
        attr: &Arc<AttributeDescriptor>,
        source_entity: &Arc<EntitySchema>,
        source: usize,
    ) -> ViewResult<usize> {
        if let Some(entry) = self.plan.find(path, &attr.id) {
            trace!(path, alias = entry.alias, "reusing join");
            let alias = entry.alias;
            scope.builder.add_join(entry.join.clone());
            return Ok(alias);
        }

        let target = Arc::clone(self.registry.target_of(attr)?);
        let alias = self.next_alias;
        self.next_alias += 1;

        let join = Join {
            kind: JoinKind::LeftOuter,
            table: TableRef {
                table: association_table(attr, &target),
                alias: Some(alias),
            },
            on: self.join_condition(attr, &target, source, alias),
        };
        scope.builder.add_join(join.clone());
        self.plan.entries.push(JoinPlanEntry {
            path: path.to_string(),
            attribute: Arc::clone(attr),
            source_entity: Arc::clone(source_entity),
            entity: target,
            source,
            alias,
            join,
        });
        Ok(alias)
    }

    fn join_condition(
        &self,
        attr: &AttributeDescriptor,
        target: &EntitySchema,
        source: usize,
        alias: usize,
    ) -> Expr {
        let mut predicates: Vec<Expr> = attr
            .association
            .iter()
            .flat_map(|a| a.join_columns.iter())
            .map(|pair| table_col(source, &pair.local).eq(table_col(alias, &pair.target)))
            .collect();
        predicates.extend(self.version_constraint(target, alias));
        predicates.extend(discriminator_constraint(target, alias));
        predicates
            .into_iter()
            .reduce(|acc, next| acc.and(next))
            .unwrap_or_else(|| lit_bool(true))
    }

    fn version_constraint(&self, entity: &EntitySchema, alias: usize) -> Option<Expr> {
        let version = entity.version()?;
        let (from, to) = (version.from.column_name()?, version.to.column_name()?);
        let open = table_col(alias, to).is_null();
        Some(match self.ctx.point_in_time {
            Some(at) => {
                let at = Value::Timestamp(at);
                table_col(alias, from)
                    .lte(version.from.jdbc_type.literal(&at))
                    .and(table_col(alias, to).gt(version.to.jdbc_type.literal(&at)).or(open))
            }
            None => open,
        })
    }

    /// Root version constraint plus the discriminator (or subtype disjunction).
    fn constrain_root(&self, builder: &mut SqlBuilder, roots: &[Arc<EntitySchema>]) {
        let Some(root) = roots.first() else {
            return;
        };
        if let Some(version) = self.version_constraint(root, 0) {
            builder.filter(version);
        }
        if roots.len() == 1 {
            if let Some(d) = discriminator_constraint(root, 0) {
                builder.filter(d);
            }
            return;
        }
        // A root without a discriminator already covers every subtype row.
        let constraints: Option<Vec<Expr>> = roots
            .iter()
            .map(|r| discriminator_constraint(r, 0))
            .collect();
        if let Some(constraints) = constraints {
            let mut types = SqlBuilder::select();
            for (i, constraint) in constraints.into_iter().enumerate() {
                if i > 0 {
                    types.or();
                }
                types.filter(constraint);
            }
            builder.compose_where(types);
        }
    }

    fn project_column(
        &self,
        scope: &mut Scope,
        attr: &Arc<AttributeDescriptor>,
        alias: usize,
        prefix: &str,
    ) {
        if let Some(column) = attr.column_name() {
            scope.project(
                table_col(alias, column),
                child_path(prefix, attr.property()),
                Some(Arc::clone(attr)),
                ColumnKind::Value,
            );
        }
    }

    /// Identity keys and `versionFrom` give every joined entity a stable row identity.
    fn project_identity(&self, scope: &mut Scope, entity: &EntitySchema, alias: usize, prefix: &str) {
        for key in entity.identity_keys() {
            self.project_column(scope, key, alias, prefix);
        }
        if let Some(version) = entity.version() {
            self.project_column(scope, &version.from, alias, prefix);
        }
    }

    /// Project the non-key join columns of one side of an association so
    /// foreign keys can be written back without another query.
    fn project_join_side<'m>(
        &self,
        scope: &mut Scope,
        entity: &EntitySchema,
        columns: impl Iterator<Item = &'m str>,
        alias: usize,
        prefix: &str,
    ) {
        for column in columns {
            match entity.attribute_by_column(column) {
                Some(attr) if !attr.primary_key => self.project_column(scope, attr, alias, prefix),
                Some(_) => {}
                None => warn!(
                    column,
                    entity = entity.name(),
                    "join column has no attribute, not projected"
                ),
            }
        }
    }

    fn defer_collection(
        &mut self,
        path: &str,
        attr: &Arc<AttributeDescriptor>,
        entity: &Arc<EntitySchema>,
        alias: usize,
        node: &FilterNode,
        enclosing: &[ScopeCollection],
    ) {
        if let Some(existing) = self.collections.iter_mut().find(|c| c.path == path) {
            existing.nodes.extend(node.children().iter().cloned());
            return;
        }
        if !enclosing.is_empty() {
            trace!(path, depth = enclosing.len(), "deferring nested collection");
        }
        self.collections.push(CollectionColumn {
            path: path.to_string(),
            attribute: Arc::clone(attr),
            source_entity: Arc::clone(entity),
            source_alias: alias,
            nodes: node.children().to_vec(),
            enclosing: enclosing.to_vec(),
        });
    }

    fn sub_select(
        &mut self,
        collection: CollectionColumn,
        roots: &[Arc<EntitySchema>],
        root_key: &Expr,
        root_key_alias: &str,
        root_key_type: JdbcType,
        dialect: Dialect,
    ) -> ViewResult<SubSelect> {
        let Some(root) = roots.first() else {
            return Err(ViewError::Schema("no root entity".into()));
        };
        let mut builder = SqlBuilder::select();
        builder.from_table(root.table(), 0);
        for join in self.plan.chain_to(collection.source_alias) {
            builder.add_join(join);
        }

        let mut scope = Scope::new(builder, collection.enclosing.clone());
        scope.project(
            root_key.clone(),
            root_key_alias.to_string(),
            None,
            ColumnKind::RootKey,
        );
        for outer in &collection.enclosing {
            self.project_identity(&mut scope, &outer.entity, outer.alias, &outer.path);
        }

        let target = Arc::clone(self.registry.target_of(&collection.attribute)?);
        let alias = self.join(
            &mut scope,
            &collection.path,
            &collection.attribute,
            &collection.source_entity,
            collection.source_alias,
        )?;
        scope.enclosing.push(ScopeCollection {
            path: collection.path.clone(),
            entity: Arc::clone(&target),
            alias,
        });

        if collection.nodes.is_empty() {
            for column in target.scalar_attributes() {
                self.project_column(&mut scope, column, alias, &collection.path);
            }
        } else {
            self.walk(
                &mut scope,
                &collection.nodes,
                std::slice::from_ref(&target),
                alias,
                &collection.path,
            )?;
        }
        self.project_identity(&mut scope, &target, alias, &collection.path);
        self.project_join_side(
            &mut scope,
            &target,
            target_columns(&collection.attribute),
            alias,
            &collection.path,
        );
        self.constrain_root(&mut scope.builder, roots);

        let enclosing = collection.enclosing.iter().map(ScopeCollection::describe).collect();
        let (builder, columns) = scope.finish();
        Ok(SubSelect {
            path: collection.path,
            builder,
            columns,
            enclosing,
            root_key: root_key.clone(),
            root_key_type,
            dialect,
        })
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Synthetic root key: the single identity column, or a delimiter-joined
/// concatenation of each identity column cast to text.
pub fn root_key_expr(root: &EntitySchema, delimiter: &str) -> Expr {
    let columns: Vec<&str> = root
        .identity_keys()
        .iter()
        .filter_map(|k| k.column_name())
        .collect();
    match columns.as_slice() {
        [single] => table_col(0, single),
        many => many
            .iter()
            .map(|c| cast_text(table_col(0, c)))
            .reduce(|acc, next| acc.concat(lit_str(delimiter)).concat(next))
            .unwrap_or_else(lit_null),
    }
}

fn root_key_type(root: &EntitySchema) -> JdbcType {
    match root.identity_keys().as_slice() {
        [single] => single.jdbc_type,
        _ => JdbcType::Varchar,
    }
}

fn association_table(attr: &AttributeDescriptor, target: &EntitySchema) -> String {
    attr.association
        .as_ref()
        .map(|a| a.join_table.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| target.table().to_string())
}

fn local_columns(attr: &AttributeDescriptor) -> impl Iterator<Item = &str> {
    attr.association
        .iter()
        .flat_map(|a| a.join_columns.iter())
        .map(|pair| pair.local.as_str())
}

fn target_columns(attr: &AttributeDescriptor) -> impl Iterator<Item = &str> {
    attr.association
        .iter()
        .flat_map(|a| a.join_columns.iter())
        .map(|pair| pair.target.as_str())
}

fn discriminator_constraint(entity: &EntitySchema, alias: usize) -> Option<Expr> {
    let d = entity.discriminator()?;
    let column = d.attribute.column_name()?;
    Some(table_col(alias, column).eq(d.attribute.jdbc_type.literal(&d.value)))
}

/// Render a leaf predicate against a column.
pub fn predicate_expr(column: Expr, attr: &AttributeDescriptor, predicate: &Predicate) -> Expr {
    let lit = |v: &Value| attr.jdbc_type.literal(v);
    let like = |pattern: String| column.clone().like(lit_str(&pattern));
    let text = predicate.value.to_string();

    let base = match predicate.operator {
        Operator::IsNull => column.clone().is_null(),
        Operator::IsNotNull => column.clone().is_not_null(),
        Operator::Equals | Operator::EqualsOrNull => column.clone().eq(lit(&predicate.value)),
        Operator::NotEquals | Operator::NotEqualsOrNull => {
            column.clone().ne(lit(&predicate.value))
        }
        Operator::Greater | Operator::GreaterOrNull => column.clone().gt(lit(&predicate.value)),
        Operator::GreaterOrEqual => column.clone().gte(lit(&predicate.value)),
        Operator::Less | Operator::LessOrNull => column.clone().lt(lit(&predicate.value)),
        Operator::LessOrEqual => column.clone().lte(lit(&predicate.value)),
        Operator::In | Operator::NotIn => {
            let values = match &predicate.value {
                Value::List(items) => items.iter().map(lit).collect(),
                single => vec![lit(single)],
            };
            if predicate.operator == Operator::In {
                column.clone().in_list(values)
            } else {
                column.clone().not_in_list(values)
            }
        }
        Operator::Like => like(format!("%{}%", text)),
        Operator::StartsWith => like(format!("{}%", text)),
        Operator::EndsWith => like(format!("%{}", text)),
        Operator::NotLike => like(format!("%{}%", text)).not(),
        Operator::Between => {
            let high = predicate.range_end.as_ref().unwrap_or(&Value::Null);
            column
                .clone()
                .gt(lit(&predicate.value))
                .and(column.clone().lt(lit(high)))
                .parenthesized()
        }
    };

    if predicate.operator.allows_null() {
        base.or(column.is_null())
    } else {
        base
    }
}
