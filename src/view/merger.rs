//! Result merger: assembles primary and sub-select result sets into nested rows.
//!
//! Flat result columns are nested by their dotted alias (`inner.value` lands
//! in `row["inner"]["value"]`). Sub-select rows are matched to primary rows
//! through the synthetic root key and appended to the collection slot at
//! their path. Rows of a nested collection first descend into the enclosing
//! element whose identity they carry.

use std::collections::HashMap;

use tracing::{trace, warn};

use super::compiler::{ColumnBinding, CompiledView, SubSelect};
use crate::value::{Row, Value};

/// Accumulates the nested rows of one view fetch.
#[derive(Debug)]
pub struct ResultMerger<'v> {
    view: &'v CompiledView,
    rows: Vec<Row>,
    index: HashMap<String, usize>,
}

impl<'v> ResultMerger<'v> {
    /// Nest the primary result set and index it by root key.
    pub fn new(view: &'v CompiledView, primary: Vec<Row>) -> Self {
        let mut rows = Vec::with_capacity(primary.len());
        let mut index = HashMap::with_capacity(primary.len());

        for raw in primary {
            let mut row = nest(&view.columns, &raw);
            collapse_null_associations(&mut row);
            for sub in view.sub_selects.iter().filter(|s| s.enclosing.is_empty()) {
                init_collection(&mut row, &sub.path);
            }
            let key = row
                .get(&view.root_key_alias)
                .map(Value::to_string)
                .unwrap_or_default();
            index.insert(key, rows.len());
            rows.push(row);
        }

        trace!(rows = rows.len(), "merged primary result");
        Self { view, rows, index }
    }

    /// Root keys of the primary rows, in result order.
    pub fn root_keys(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|r| r.get(&self.view.root_key_alias).cloned())
            .collect()
    }

    /// Merge one sub-select result into the collection slots of the primary rows.
    ///
    /// Nested collections must be merged after the collections enclosing them.
    pub fn merge_collection(&mut self, sub: &SubSelect, result: Vec<Row>) {
        let mut merged = 0usize;

        for raw in result {
            let mut nested = nest(&sub.columns, &raw);
            let key = nested
                .remove(&self.view.root_key_alias)
                .map(|v| v.to_string())
                .unwrap_or_default();
            let Some(&position) = self.index.get(&key) else {
                warn!(path = %sub.path, root_key = %key, "sub-select row has no primary row");
                continue;
            };

            let Some(mut element) = value_at(&nested, &sub.path).cloned() else {
                continue;
            };
            if let Value::Row(row) = &mut element {
                collapse_null_associations(row);
            }
            if element.is_all_null() {
                continue;
            }
            if let Value::Row(row) = &mut element {
                for inner in self.view.sub_selects.iter() {
                    let encloses = inner.enclosing.last().is_some_and(|e| e.path == sub.path);
                    if encloses {
                        init_collection(row, relative_path(&inner.path, &sub.path));
                    }
                }
            }

            match collection_slot(&mut self.rows[position], &nested, sub) {
                Some(slot) => {
                    append(slot, element);
                    merged += 1;
                }
                None => trace!(path = %sub.path, root_key = %key, "no enclosing element, row skipped"),
            }
        }

        trace!(path = %sub.path, rows = merged, "merged collection");
    }

    pub fn finish(self) -> Vec<Row> {
        self.rows
    }
}

/// Build a nested row from a flat result row using the column bindings.
fn nest(columns: &[ColumnBinding], raw: &Row) -> Row {
    let mut row = Row::new();
    for binding in columns {
        let value = raw.get(&binding.alias).cloned().unwrap_or_default();
        let value = match binding.jdbc_type() {
            Some(jdbc_type) => jdbc_type.coerce(value),
            None => value,
        };

        let mut target = &mut row;
        let mut segments = binding.alias.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                target.insert(segment, value);
                break;
            }
            let slot = target.slot(segment);
            if !matches!(slot, Value::Row(_)) {
                *slot = Value::Row(Row::new());
            }
            match slot.as_row_mut() {
                Some(next) => target = next,
                None => break,
            }
        }
    }
    row
}

/// Replace association maps whose every value is null (unmatched LEFT JOIN) with null.
fn collapse_null_associations(row: &mut Row) {
    let keys: Vec<String> = row.keys().cloned().collect();
    for key in keys {
        if let Some(value) = row.get_mut(&key) {
            if let Value::Row(nested) = value {
                collapse_null_associations(nested);
                if nested.is_all_null() {
                    *value = Value::Null;
                }
            }
        }
    }
}

/// Start every collection of a loaded row as an empty list.
fn init_collection(row: &mut Row, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut target = row;
    for segment in parents {
        match target.get_mut(segment).and_then(Value::as_row_mut) {
            Some(next) => target = next,
            None => return,
        }
    }
    target.insert(*last, Value::List(Vec::new()));
}

fn value_at<'r>(row: &'r Row, path: &str) -> Option<&'r Value> {
    let (parents, last) = match path.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, path),
    };
    let mut target = row;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        target = target.get(segment)?.as_row()?;
    }
    target.get(last)
}

/// `path` below `ancestor` (`items.subs` below `items` is `subs`).
fn relative_path<'p>(path: &'p str, ancestor: &str) -> &'p str {
    if ancestor.is_empty() {
        return path;
    }
    path.strip_prefix(ancestor)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(path)
}

/// Collection slot of `sub` inside `row`, descending through the enclosing
/// elements whose identity matches the nested result row.
fn collection_slot<'r>(row: &'r mut Row, nested: &Row, sub: &SubSelect) -> Option<&'r mut Value> {
    let mut target = row;
    let mut consumed = "";
    for outer in &sub.enclosing {
        let identity = value_at(nested, &outer.path)?.as_row()?;
        let segments: Vec<&str> = relative_path(&outer.path, consumed).split('.').collect();
        let (last, parents) = segments.split_last()?;
        for segment in parents {
            target = target.get_mut(segment)?.as_row_mut()?;
        }
        let Value::List(items) = target.get_mut(last)? else {
            return None;
        };
        target = items.iter_mut().filter_map(Value::as_row_mut).find(|element| {
            outer.keys.iter().all(|k| element.get(k) == identity.get(k))
        })?;
        consumed = outer.path.as_str();
    }
    let segments: Vec<&str> = relative_path(&sub.path, consumed).split('.').collect();
    slot_at(target, &segments)
}

fn slot_at<'r>(row: &'r mut Row, segments: &[&str]) -> Option<&'r mut Value> {
    let (last, parents) = segments.split_last()?;
    let mut target = row;
    for segment in parents {
        target = target.get_mut(segment)?.as_row_mut()?;
    }
    Some(target.slot(last))
}

/// Append to a collection slot; a lone value already in the slot is promoted to a list.
fn append(slot: &mut Value, element: Value) {
    match slot {
        Value::List(items) => items.push(element),
        Value::Null => *slot = Value::List(vec![element]),
        other => {
            let previous = std::mem::take(other);
            *other = Value::List(vec![previous, element]);
        }
    }
}
