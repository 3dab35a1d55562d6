//! SQL Dialect definitions and formatting rules.
//!
//! The engine emits one SQL grammar; the dialect trait only covers the
//! rendering details that differ between the collaborators it talks to:
//!
//! - Identifier quoting
//! - Boolean literals: true/false vs 1/0
//! - Pagination: `OFFSET n LIMIT m` vs `LIMIT m OFFSET n`
//! - Bind parameter placeholders
//!
//! # Usage
//!
//! ```ignore
//! use strata::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```

pub mod helpers;
mod postgres;
mod sqlite;

pub use postgres::Postgres;
pub use sqlite::Sqlite;

use super::token::TokenStream;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Render a named bind parameter.
    fn param_placeholder(&self, name: &str) -> String {
        format!(":{}", name)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit the trailing pagination clause.
    fn emit_pagination(&self, offset: Option<u64>, limit: Option<u64>) -> TokenStream {
        helpers::emit_offset_limit(offset, limit)
    }

    // =========================================================================
    // Operators and types
    // =========================================================================

    /// String concatenation operator.
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Type name used when casting key columns to text.
    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    /// Whole-row reference used as an aggregate argument (`t1.*`).
    fn row_reference(&self, alias: &str, _key_column: &str) -> String {
        format!("{}.*", alias)
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn param_placeholder(&self, name: &str) -> String {
        self.dialect().param_placeholder(name)
    }

    fn emit_pagination(&self, offset: Option<u64>, limit: Option<u64>) -> TokenStream {
        self.dialect().emit_pagination(offset, limit)
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn text_type(&self) -> &'static str {
        self.dialect().text_type()
    }

    fn row_reference(&self, alias: &str, key_column: &str) -> String {
        self.dialect().row_reference(alias, key_column)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}
