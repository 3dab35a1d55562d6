//! SQL generation module.
//!
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations
//! - [`expr`] - Expression AST and builder DSL
//! - [`builder`] - Mutable statement accumulator (SELECT, INSERT, UPDATE, DELETE)

pub mod builder;
pub mod dialect;
pub mod expr;
pub mod token;


pub use builder::{Join, JoinKind, SortDir, SqlBuilder, StatementKind};
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    cast_text, col, conjunction, func, lit_bool, lit_float, lit_int, lit_null, lit_str, param, table_col,
    row_ref, table_star, BinaryOperator, Expr, ExprExt, Literal,
};
pub use token::{Token, TokenStream};
