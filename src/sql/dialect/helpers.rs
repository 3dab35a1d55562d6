//! Shared formatting helpers for dialect implementations.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI standard).
/// Used by: PostgreSQL, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: PostgreSQL
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: SQLite
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// `OFFSET n LIMIT m`, either part optional.
pub fn emit_offset_limit(offset: Option<u64>, limit: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(off) = offset {
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    if let Some(lim) = limit {
        if offset.is_some() {
            ts.space();
        }
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    ts
}

/// `LIMIT m OFFSET n`; an offset without a limit uses `LIMIT -1`.
pub fn emit_limit_offset(offset: Option<u64>, limit: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    match (limit, offset) {
        (None, None) => {}
        (Some(lim), None) => {
            ts.push(Token::Limit)
                .space()
                .push(Token::LitInt(lim as i64));
        }
        (lim, Some(off)) => {
            ts.push(Token::Limit)
                .space()
                .push(Token::LitInt(lim.map(|l| l as i64).unwrap_or(-1)))
                .space()
                .push(Token::Offset)
                .space()
                .push(Token::LitInt(off as i64));
        }
    }

    ts
}
