//! SQLite executor over `rusqlite`.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;

use super::{ExecutorError, SqlExecutor, StatementId};
use crate::sql::Dialect;
use crate::value::{format_timestamp, Row, Value};
use crate::view::BoundParam;

/// Executes view SQL against a SQLite database.
pub struct SqliteExecutor {
    conn: Connection,
    statements: HashMap<StatementId, String>,
    next_id: StatementId,
}

impl SqliteExecutor {
    /// Open or create a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExecutorError> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, ExecutorError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            statements: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a batch of SQL statements (schema setup, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), ExecutorError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Number of statements currently prepared.
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }
}

impl SqlExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, ExecutorError> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut out = Row::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.as_str(), read_value(row.get_ref(i)?));
                }
                Ok(out)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn prepare(&mut self, sql: &str) -> Result<StatementId, ExecutorError> {
        // Compile once up front so syntax errors surface before any row is written.
        self.conn.prepare_cached(sql)?;
        self.next_id += 1;
        self.statements.insert(self.next_id, sql.to_string());
        Ok(self.next_id)
    }

    fn execute(&mut self, statement: StatementId, params: &[BoundParam]) -> Result<usize, ExecutorError> {
        let sql = self
            .statements
            .get(&statement)
            .ok_or_else(|| format!("statement {} is not prepared", statement))?;
        let mut stmt = self.conn.prepare_cached(sql)?;

        let names: Vec<String> = params.iter().map(|p| format!(":{}", p.name)).collect();
        let named: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .zip(params)
            .map(|(name, p)| (name.as_str(), &p.value as &dyn ToSql))
            .collect();

        Ok(stmt.execute(named.as_slice())?)
    }

    fn release(&mut self, statement: StatementId) {
        self.statements.remove(&statement);
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(n) => ToSqlOutput::from(*n),
            Value::Float(x) => ToSqlOutput::from(*x),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::from(format_timestamp(ts)),
            other @ (Value::List(_) | Value::Row(_)) => ToSqlOutput::from(other.to_string()),
        })
    }
}
