//! Mutable SQL statement accumulator.
//!
//! A [`SqlBuilder`] collects named clause lists (select, from, joins, where,
//! having, group-by, order-by, set, columns, values) and renders them in a
//! fixed clause order for its statement kind.
//!
//! WHERE and HAVING entries are conjuncted with AND. Calling [`SqlBuilder::or`]
//! (or [`SqlBuilder::and`]) between two entries overrides the connector for that
//! one boundary only:
//!
//! ```ignore
//! use strata::sql::builder::SqlBuilder;
//! use strata::sql::expr::{table_col, ExprExt};
//!
//! let mut types = SqlBuilder::select();
//! types.filter(table_col(0, "kind").eq("A"));
//! types.or();
//! types.filter(table_col(0, "kind").eq("B"));
//!
//! let mut root = SqlBuilder::select();
//! root.from_table("shape", 0).filter(table_col(0, "version_to").is_null());
//! root.compose_where(types);
//! // ... WHERE t0."version_to" IS NULL AND (t0."kind" = 'A' OR t0."kind" = 'B')
//! ```

use super::dialect::Dialect;
use super::expr::{BinaryOperator, Expr, ExprExt};
use super::token::{Token, TokenStream};

// =============================================================================
// Clause items
// =============================================================================

/// Statement kind, fixing which clauses render and in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A SELECT list item: expression with optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// A table reference with an optional generated alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<usize>,
}

impl TableRef {
    fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.table.clone()));
        if let Some(alias) = self.alias {
            ts.space().push(Token::TableAlias(alias));
        }
        ts
    }
}

/// Join variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// A JOIN clause. The ON predicate is always rendered in parentheses.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Expr,
}

impl Join {
    fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(match self.kind {
            JoinKind::Inner => Token::InnerJoin,
            JoinKind::LeftOuter => Token::LeftOuterJoin,
        });
        ts.space().append(&self.table.to_tokens());
        ts.space().push(Token::On).space();
        ts.append(&self.on.clone().parenthesized().to_tokens());
        ts
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

/// One entry of a WHERE/HAVING list.
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Predicate(Expr),
    Or,
    And,
}

/// Fold a condition list into one expression, honouring OR/AND markers.
fn fold_conditions(conditions: &[Condition]) -> Option<Expr> {
    let mut acc: Option<Expr> = None;
    let mut connector = BinaryOperator::And;

    for condition in conditions {
        match condition {
            Condition::Or => connector = BinaryOperator::Or,
            Condition::And => connector = BinaryOperator::And,
            Condition::Predicate(expr) => {
                let expr = if expr.is_disjunction() {
                    expr.clone().parenthesized()
                } else {
                    expr.clone()
                };
                acc = Some(match acc {
                    None => expr,
                    Some(left) => left.binary(connector, expr),
                });
                connector = BinaryOperator::And;
            }
        }
    }

    acc
}

// =============================================================================
// Builder
// =============================================================================

/// Mutable SQL statement accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlBuilder {
    kind: StatementKind,
    distinct: bool,
    select: Vec<SelectItem>,
    from: Vec<TableRef>,
    joins: Vec<Join>,
    where_clause: Vec<Condition>,
    having: Vec<Condition>,
    group_by: Vec<Expr>,
    order_by: Vec<OrderByExpr>,
    set: Vec<(String, Expr)>,
    columns: Vec<String>,
    values: Vec<Expr>,
    source: Option<Box<SqlBuilder>>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl SqlBuilder {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            distinct: false,
            select: Vec::new(),
            from: Vec::new(),
            joins: Vec::new(),
            where_clause: Vec::new(),
            having: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            set: Vec::new(),
            columns: Vec::new(),
            values: Vec::new(),
            source: None,
            offset: None,
            limit: None,
        }
    }

    /// Start a SELECT statement.
    pub fn select() -> Self {
        Self::new(StatementKind::Select)
    }

    /// Start an INSERT statement.
    pub fn insert_into(table: impl Into<String>) -> Self {
        let mut builder = Self::new(StatementKind::Insert);
        builder.from.push(TableRef {
            table: table.into(),
            alias: None,
        });
        builder
    }

    /// Start an UPDATE statement.
    pub fn update(table: impl Into<String>) -> Self {
        let mut builder = Self::new(StatementKind::Update);
        builder.from.push(TableRef {
            table: table.into(),
            alias: None,
        });
        builder
    }

    /// Start a DELETE statement.
    pub fn delete_from(table: impl Into<String>) -> Self {
        let mut builder = Self::new(StatementKind::Delete);
        builder.from.push(TableRef {
            table: table.into(),
            alias: None,
        });
        builder
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    // =========================================================================
    // SELECT clauses
    // =========================================================================

    /// Add a projection with an optional output alias.
    pub fn column(&mut self, expr: Expr, alias: Option<&str>) -> &mut Self {
        self.select.push(SelectItem {
            expr,
            alias: alias.map(String::from),
        });
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    /// Add a FROM table with a generated alias.
    pub fn from_table(&mut self, table: impl Into<String>, alias: usize) -> &mut Self {
        self.from.push(TableRef {
            table: table.into(),
            alias: Some(alias),
        });
        self
    }

    /// Add a FROM table without an alias.
    pub fn from_unaliased(&mut self, table: impl Into<String>) -> &mut Self {
        self.from.push(TableRef {
            table: table.into(),
            alias: None,
        });
        self
    }

    pub fn join(&mut self, kind: JoinKind, table: impl Into<String>, alias: usize, on: Expr) -> &mut Self {
        self.joins.push(Join {
            kind,
            table: TableRef {
                table: table.into(),
                alias: Some(alias),
            },
            on,
        });
        self
    }

    pub fn left_outer_join(&mut self, table: impl Into<String>, alias: usize, on: Expr) -> &mut Self {
        self.join(JoinKind::LeftOuter, table, alias, on)
    }

    /// Add a prepared join unless an identical one is present.
    pub fn add_join(&mut self, join: Join) -> &mut Self {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
        self
    }

    pub fn inner_join(&mut self, table: impl Into<String>, alias: usize, on: Expr) -> &mut Self {
        self.join(JoinKind::Inner, table, alias, on)
    }

    pub fn group_by(&mut self, expr: Expr) -> &mut Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(&mut self, expr: Expr, dir: SortDir) -> &mut Self {
        self.order_by.push(OrderByExpr { expr, dir });
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    // =========================================================================
    // WHERE / HAVING
    // =========================================================================

    /// Add a WHERE entry, conjuncted with the previous one unless a marker says otherwise.
    pub fn filter(&mut self, predicate: Expr) -> &mut Self {
        self.where_clause.push(Condition::Predicate(predicate));
        self
    }

    /// Join the next WHERE entry with OR.
    pub fn or(&mut self) -> &mut Self {
        self.where_clause.push(Condition::Or);
        self
    }

    /// Join the next WHERE entry with AND (the default).
    pub fn and(&mut self) -> &mut Self {
        self.where_clause.push(Condition::And);
        self
    }

    pub fn having(&mut self, predicate: Expr) -> &mut Self {
        self.having.push(Condition::Predicate(predicate));
        self
    }

    /// Join the next HAVING entry with OR.
    pub fn or_having(&mut self) -> &mut Self {
        self.having.push(Condition::Or);
        self
    }

    /// Splice another builder's WHERE into this one.
    ///
    /// The child's joins are merged into this builder (skipping identical
    /// ones) and its predicate is wrapped in parentheses and ANDed on.
    pub fn compose_where(&mut self, child: SqlBuilder) -> &mut Self {
        let predicate = child.where_expr();
        for join in child.joins {
            self.add_join(join);
        }
        if let Some(predicate) = predicate {
            self.where_clause.push(Condition::And);
            self.where_clause
                .push(Condition::Predicate(predicate.parenthesized()));
        }
        self
    }

    /// The WHERE list folded into a single expression.
    pub fn where_expr(&self) -> Option<Expr> {
        fold_conditions(&self.where_clause)
    }

    pub fn having_expr(&self) -> Option<Expr> {
        fold_conditions(&self.having)
    }

    // =========================================================================
    // DML clauses
    // =========================================================================

    /// UPDATE ... SET column = value
    pub fn set(&mut self, column: impl Into<String>, value: Expr) -> &mut Self {
        self.set.push((column.into(), value));
        self
    }

    /// INSERT column with its VALUES entry.
    pub fn value(&mut self, column: impl Into<String>, value: Expr) -> &mut Self {
        self.columns.push(column.into());
        self.values.push(value);
        self
    }

    /// INSERT column list entry without a VALUES entry (for INSERT ... SELECT).
    pub fn insert_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.columns.push(column.into());
        self
    }

    /// INSERT ... SELECT source.
    pub fn insert_select(&mut self, source: SqlBuilder) -> &mut Self {
        self.source = Some(Box::new(source));
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn set_columns(&self) -> impl Iterator<Item = &str> {
        self.set.iter().map(|(c, _)| c.as_str())
    }

    pub fn insert_columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether an output alias is already projected.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.select
            .iter()
            .any(|item| item.alias.as_deref() == Some(alias))
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Convert to a token stream in the fixed clause order of the statement kind.
    pub fn to_tokens(&self) -> TokenStream {
        match self.kind {
            StatementKind::Select => self.select_tokens(),
            StatementKind::Insert => self.insert_tokens(),
            StatementKind::Update => self.update_tokens(),
            StatementKind::Delete => self.delete_tokens(),
        }
    }

    /// Generate SQL text for a dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens().serialize(dialect)
    }

    fn select_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }

        for (i, item) in self.select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&item.expr.to_tokens());
            if let Some(alias) = &item.alias {
                ts.space()
                    .push(Token::As)
                    .space()
                    .push(Token::Ident(alias.clone()));
            }
        }

        if !self.from.is_empty() {
            ts.newline().push(Token::From).space();
            for (i, table) in self.from.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&table.to_tokens());
            }
        }

        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens());
        }

        self.emit_where(&mut ts);

        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens());
            }
        }

        if let Some(having) = self.having_expr() {
            ts.newline().push(Token::Having).space();
            ts.append(&having.to_tokens());
        }

        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order.expr.to_tokens());
                ts.space().push(match order.dir {
                    SortDir::Asc => Token::Asc,
                    SortDir::Desc => Token::Desc,
                });
            }
        }

        if self.offset.is_some() || self.limit.is_some() {
            ts.newline().push(Token::Pagination {
                offset: self.offset,
                limit: self.limit,
            });
        }

        ts
    }

    fn insert_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Insert).space().push(Token::Into).space();
        self.emit_target(&mut ts);

        if !self.columns.is_empty() {
            ts.space().lparen();
            for (i, column) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(column.clone()));
            }
            ts.rparen();
        }

        if let Some(source) = &self.source {
            ts.newline().append(&source.to_tokens());
        } else {
            ts.newline().push(Token::Values).space().lparen();
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&value.to_tokens());
            }
            ts.rparen();
        }

        ts
    }

    fn update_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update).space();
        self.emit_target(&mut ts);

        ts.newline().push(Token::Set).space();
        for (i, (column, value)) in self.set.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(column.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&value.to_tokens());
        }

        self.emit_where(&mut ts);
        ts
    }

    fn delete_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Delete).space().push(Token::From).space();
        self.emit_target(&mut ts);
        self.emit_where(&mut ts);
        ts
    }

    fn emit_target(&self, ts: &mut TokenStream) {
        if let Some(target) = self.from.first() {
            ts.append(&target.to_tokens());
        }
    }

    fn emit_where(&self, ts: &mut TokenStream) {
        if let Some(predicate) = self.where_expr() {
            ts.newline().push(Token::Where).space();
            ts.append(&predicate.to_tokens());
        }
    }
}

impl std::fmt::Display for SqlBuilder {
    /// Formats the statement using the default dialect (PostgreSQL).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(Dialect::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================
