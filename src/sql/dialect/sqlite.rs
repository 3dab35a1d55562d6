//! SQLite SQL dialect.
//!
//! SQLite features:
//! - ANSI identifier quoting (`"`)
//! - Booleans stored as integers (1/0)
//! - `LIMIT` must precede `OFFSET`, and `OFFSET` needs a `LIMIT`
//! - No `tN.*` inside aggregate calls

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// SQLite SQL dialect, used by the bundled reference executor.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_pagination(&self, offset: Option<u64>, limit: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset(offset, limit)
    }

    fn row_reference(&self, alias: &str, key_column: &str) -> String {
        format!("{}.{}", alias, self.quote_identifier(key_column))
    }
}
