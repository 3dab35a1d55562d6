//! Execution boundary and the view session built on it.
//!
//! The engine never opens connections or manages transactions. It hands SQL
//! text and named parameters to a [`SqlExecutor`] and reads back flat rows
//! keyed by column alias. [`ViewSession`] strings the pieces together:
//! compile, query, merge, then plan and execute writes on flush.

pub mod sqlite;

pub use sqlite::SqliteExecutor;

use std::sync::Arc;

use tracing::debug;

use crate::config::ViewSettings;
use crate::context::QueryContext;
use crate::error::{ViewError, ViewResult};
use crate::filter::{FilterTree, Predicate};
use crate::schema::SchemaRegistry;
use crate::sql::Dialect;
use crate::value::{Row, Value};
use crate::view::{BoundParam, CompiledView, Page, ResultMerger, UpdatePlanner, View, ViewCompiler};

/// Error reported by an execution collaborator, propagated unmodified.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// Handle of a prepared statement.
pub type StatementId = usize;

/// Synchronous database access used by [`ViewSession`].
pub trait SqlExecutor {
    /// Dialect the SQL text is rendered in.
    fn dialect(&self) -> Dialect;

    /// Run a SELECT and return its rows keyed by column alias.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, ExecutorError>;

    /// Prepare a statement for repeated execution.
    fn prepare(&mut self, sql: &str) -> Result<StatementId, ExecutorError>;

    /// Execute a prepared statement with one parameter set; returns affected rows.
    fn execute(&mut self, statement: StatementId, params: &[BoundParam]) -> Result<usize, ExecutorError>;

    /// Release a prepared statement.
    fn release(&mut self, statement: StatementId);
}

/// Prepared statement released when dropped, on success or error.
struct Prepared<'e, E: SqlExecutor> {
    executor: &'e mut E,
    id: StatementId,
}

impl<'e, E: SqlExecutor> Prepared<'e, E> {
    fn new(executor: &'e mut E, sql: &str) -> ViewResult<Self> {
        let id = executor.prepare(sql).map_err(ViewError::Execution)?;
        Ok(Self { executor, id })
    }

    fn execute(&mut self, params: &[BoundParam]) -> ViewResult<usize> {
        self.executor
            .execute(self.id, params)
            .map_err(ViewError::Execution)
    }
}

impl<E: SqlExecutor> Drop for Prepared<'_, E> {
    fn drop(&mut self) {
        self.executor.release(self.id);
    }
}

/// Reads and writes views through one executor.
pub struct ViewSession<'a, E: SqlExecutor> {
    executor: E,
    registry: &'a SchemaRegistry,
    settings: &'a ViewSettings,
}

impl<'a, E: SqlExecutor> ViewSession<'a, E> {
    pub fn new(executor: E, registry: &'a SchemaRegistry, settings: &'a ViewSettings) -> Self {
        Self {
            executor,
            registry,
            settings,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Compile a tree in the executor's dialect.
    pub fn compile(&self, tree: &FilterTree, ctx: &QueryContext, page: Page) -> ViewResult<CompiledView> {
        ViewCompiler::new(self.registry, self.settings)
            .with_dialect(self.executor.dialect())
            .compile(tree, ctx, page)
    }

    /// Run the primary query, then each collection sub-select restricted to
    /// the root keys already fetched, and merge the results.
    pub fn select(&mut self, tree: &FilterTree, ctx: &QueryContext, page: Page) -> ViewResult<View> {
        let compiled = self.compile(tree, ctx, page)?;
        let primary = self.query(&compiled.primary_sql())?;

        let mut merger = ResultMerger::new(&compiled, primary);
        let keys = merger.root_keys();
        if !keys.is_empty() {
            for sub in &compiled.sub_selects {
                let rows = self.query(&sub.sql_for_keys(&keys))?;
                merger.merge_collection(sub, rows);
            }
        }
        let rows = merger.finish();

        debug!(rows = rows.len(), sub_selects = compiled.sub_selects.len(), "selected view");
        Ok(View::new(compiled, rows))
    }

    /// Full view of one entity row with every attribute and association.
    ///
    /// Single-key entities take the key value; composite keys take a
    /// [`Value::Row`] of key properties.
    pub fn get(&mut self, entity: &str, key: impl Into<Value>, ctx: &QueryContext) -> ViewResult<View> {
        let schema = Arc::clone(self.registry.entity(entity)?);
        let mut tree = FilterTree::new(vec![Arc::clone(&schema)])?;
        let identity = schema.identity_keys();

        match (identity.as_slice(), key.into()) {
            (_, Value::Row(values)) => {
                for attr in &identity {
                    let value = values
                        .get(attr.property())
                        .cloned()
                        .ok_or_else(|| ViewError::MissingKey {
                            entity_path: entity.to_string(),
                            row: 0,
                            column: attr.property().to_string(),
                        })?;
                    tree.add_path(self.registry, attr.property(), Some(Predicate::equals(value)?))?;
                }
            }
            ([single], value) => {
                tree.add_path(self.registry, single.property(), Some(Predicate::equals(value)?))?;
            }
            _ => {
                return Err(ViewError::Composition(format!(
                    "{} has a composite key; pass a row of key values",
                    entity
                )))
            }
        }

        for attr in schema.attributes() {
            let is_key = identity.iter().any(|k| k.id == attr.id);
            if !is_key && (attr.is_association() || attr.column_name().is_some()) {
                tree.add_path(self.registry, attr.property(), None)?;
            }
        }

        self.select(&tree, ctx, Page::default())
    }

    /// Plan and execute the pending writes of a view, then reconcile it.
    ///
    /// Returns the number of affected rows. The first failing statement
    /// aborts the flush; statements already executed stay applied. Closing
    /// a validity interval that is no longer open fails with
    /// [`ViewError::StaleVersion`] before its successor is inserted.
    pub fn flush(&mut self, view: &mut View, ctx: &QueryContext) -> ViewResult<usize> {
        let plan = UpdatePlanner::new(self.settings).plan(view, ctx)?;
        let mut affected = 0;

        for statement in &plan.statements {
            let mut prepared = Prepared::new(&mut self.executor, &statement.sql)?;
            for params in &statement.batch {
                let rows = prepared.execute(params)?;
                if rows == 0 && statement.requires_match {
                    return Err(ViewError::StaleVersion {
                        entity_path: statement.entity_path.clone(),
                        keys: describe_keys(params),
                    });
                }
                affected += rows;
            }
            debug!(
                path = %statement.entity_path,
                kind = ?statement.kind,
                rows = statement.batch.len(),
                sql = %statement.sql,
                "executed write"
            );
        }

        view.reconcile(plan.now, plan.reopened());
        debug!(statements = plan.len(), affected, "flushed view");
        Ok(affected)
    }

    fn query(&mut self, sql: &str) -> ViewResult<Vec<Row>> {
        debug!(sql, "query");
        self.executor.query(sql).map_err(ViewError::Execution)
    }
}

/// `k_id=1, k_version_from=2017-01-02 00:00:00`
fn describe_keys(params: &[BoundParam]) -> String {
    params
        .iter()
        .filter(|p| p.name.starts_with("k_"))
        .map(|p| format!("{}={}", p.name, p.value))
        .collect::<Vec<_>>()
        .join(", ")
}
