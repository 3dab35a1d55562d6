//! Path-addressable view rows with recorded mutations.
//!
//! Paths are dotted property paths relative to a root row. A segment that
//! passes through a collection carries the element position in brackets:
//!
//! ```text
//! value                   scalar of the root entity
//! inner.value             scalar of a one-to-one association
//! listParameter[1].value  scalar of the second collection element
//! ```
//!
//! On a view holding a single root row, one collection segment may omit
//! its position; the row index argument then selects the element, so
//! `listParameter.value` at index 1 addresses `listParameter[1].value` of
//! that row.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::compiler::CompiledView;
use crate::error::{ViewError, ViewResult};
use crate::value::{Row, Value};

/// Reserved key flagging a root row as appended rather than loaded.
pub const NEW_ROW_MARKER: &str = "$new";

static NULL: Value = Value::Null;

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment<'p> {
    pub property: &'p str,
    pub element: Option<usize>,
}

/// Split `a.b[2].c` into segments.
pub(crate) fn parse_path(path: &str) -> ViewResult<Vec<Segment<'_>>> {
    if path.is_empty() {
        return Err(ViewError::invalid_path(path, "empty path"));
    }
    path.split('.')
        .map(|raw| match raw.split_once('[') {
            None if !raw.is_empty() => Ok(Segment {
                property: raw,
                element: None,
            }),
            None => Err(ViewError::invalid_path(path, "empty segment")),
            Some((property, rest)) => {
                let position = rest
                    .strip_suffix(']')
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| ViewError::invalid_path(path, "malformed element index"))?;
                if property.is_empty() {
                    return Err(ViewError::invalid_path(path, "empty segment"));
                }
                Ok(Segment {
                    property,
                    element: Some(position),
                })
            }
        })
        .collect()
}

/// Entity path of an addressed node with element positions removed.
pub(crate) fn entity_path(node_path: &str) -> String {
    let mut out = String::with_capacity(node_path.len());
    let mut skipping = false;
    for c in node_path.chars() {
        match c {
            '[' => skipping = true,
            ']' => skipping = false,
            c if !skipping => out.push(c),
            _ => {}
        }
    }
    out
}

/// Node path and property of a scalar path (`inner.value` → (`inner`, `value`)).
pub(crate) fn split_property(path: &str) -> (&str, &str) {
    match path.rsplit_once('.') {
        Some((node, property)) => (node, property),
        None => ("", path),
    }
}

/// Walk `segments` below `row`, returning the addressed node.
pub(crate) fn node_at<'r>(row: &'r Row, path: &str) -> ViewResult<Option<&'r Row>> {
    if path.is_empty() {
        return Ok(Some(row));
    }
    let mut current = row;
    for segment in parse_path(path)? {
        let value = current.get(segment.property).unwrap_or(&NULL);
        let value = match (value, segment.element) {
            (Value::List(items), Some(i)) => items
                .get(i)
                .ok_or_else(|| ViewError::invalid_path(path, "element index out of range"))?,
            (Value::List(_), None) => {
                return Err(ViewError::invalid_path(path, "collection segment needs an element index"))
            }
            (_, Some(_)) => return Err(ViewError::invalid_path(path, "segment is not a collection")),
            (value, None) => value,
        };
        match value {
            Value::Row(next) => current = next,
            Value::Null => return Ok(None),
            _ => return Err(ViewError::invalid_path(path, "segment is not an association")),
        }
    }
    Ok(Some(current))
}

pub(crate) fn node_at_mut<'r>(row: &'r mut Row, path: &str) -> ViewResult<&'r mut Row> {
    if path.is_empty() {
        return Ok(row);
    }
    let mut current = row;
    for segment in parse_path(path)? {
        let slot = current.slot(segment.property);
        let slot = match segment.element {
            Some(i) => match slot {
                Value::List(items) => items
                    .get_mut(i)
                    .ok_or_else(|| ViewError::invalid_path(path, "element index out of range"))?,
                _ => return Err(ViewError::invalid_path(path, "segment is not a collection")),
            },
            None => slot,
        };
        if slot.is_null() {
            *slot = Value::Row(Row::new());
        }
        current = match slot {
            Value::Row(next) => next,
            Value::List(_) => {
                return Err(ViewError::invalid_path(path, "collection segment needs an element index"))
            }
            _ => return Err(ViewError::invalid_path(path, "segment is not an association")),
        };
    }
    Ok(current)
}

/// A root row plus the scalar paths modified since it was loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewRow {
    pub data: Row,
    #[serde(skip)]
    dirty: BTreeSet<String>,
}

impl ViewRow {
    fn new(data: Row) -> Self {
        Self {
            data,
            dirty: BTreeSet::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.data.contains_key(NEW_ROW_MARKER)
    }

    /// Modified scalar paths, in path order.
    pub fn dirty(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    pub(crate) fn mark_dirty(&mut self, path: String) {
        self.dirty.insert(path);
    }
}

/// The nested result of a view fetch.
#[derive(Debug, Clone)]
pub struct View {
    compiled: CompiledView,
    rows: Vec<ViewRow>,
    removed: Vec<Row>,
}

impl View {
    pub fn new(compiled: CompiledView, rows: Vec<Row>) -> Self {
        Self {
            compiled,
            rows: rows.into_iter().map(ViewRow::new).collect(),
            removed: Vec::new(),
        }
    }

    pub fn compiled(&self) -> &CompiledView {
        &self.compiled
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index).map(|r| &r.data)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().map(|r| &r.data)
    }

    pub(crate) fn view_rows(&self) -> &[ViewRow] {
        &self.rows
    }

    /// Compiled metadata alongside mutable rows.
    pub(crate) fn parts_mut(&mut self) -> (&CompiledView, &mut [ViewRow]) {
        (&self.compiled, &mut self.rows)
    }

    pub(crate) fn removed(&self) -> &[Row] {
        &self.removed
    }

    /// Whether any row has pending changes.
    pub fn is_dirty(&self) -> bool {
        !self.removed.is_empty() || self.rows.iter().any(|r| r.is_new() || !r.dirty.is_empty())
    }

    /// Read the value at `path` of root row `index`.
    ///
    /// A path through an unmatched association reads as null. A collection
    /// segment without `[i]` is accepted only on a single-row view, where
    /// `index` picks the element.
    pub fn get_column_value(&self, index: usize, path: &str) -> ViewResult<&Value> {
        let (index, resolved) = self.resolve(index, path)?;
        let path = resolved.as_str();
        let row = self
            .rows
            .get(index)
            .ok_or_else(|| ViewError::invalid_path(path, "row index out of range"))?;
        let (node, property) = split_property(path);
        let property = parse_path(property)?
            .pop()
            .ok_or_else(|| ViewError::invalid_path(path, "empty path"))?;
        let Some(node) = node_at(&row.data, node)? else {
            return Ok(&NULL);
        };
        let value = node.get(property.property).unwrap_or(&NULL);
        match (value, property.element) {
            (Value::List(items), Some(i)) => items
                .get(i)
                .ok_or_else(|| ViewError::invalid_path(path, "element index out of range")),
            (_, Some(_)) => Err(ViewError::invalid_path(path, "segment is not a collection")),
            (value, None) => Ok(value),
        }
    }

    /// Write `value` at `path` of root row `index` and record the change.
    ///
    /// Addresses resolve as in [`View::get_column_value`]; the change is
    /// recorded under the positional form of the path.
    pub fn set_column_value(
        &mut self,
        value: impl Into<Value>,
        index: usize,
        path: &str,
    ) -> ViewResult<()> {
        let (index, resolved) = self.resolve(index, path)?;
        let path = resolved.as_str();
        let row = self
            .rows
            .get_mut(index)
            .ok_or_else(|| ViewError::invalid_path(path, "row index out of range"))?;
        let (node, property) = split_property(path);
        if property.contains('[') {
            return Err(ViewError::invalid_path(path, "a collection cannot be assigned as a whole"));
        }
        node_at_mut(&mut row.data, node)?.insert(property, value);
        row.dirty.insert(path.to_string());
        Ok(())
    }

    /// Root row and positional path of an address.
    fn resolve(&self, index: usize, path: &str) -> ViewResult<(usize, String)> {
        let segments = parse_path(path)?;
        let Some((_, parents)) = segments.split_last() else {
            return Ok((index, path.to_string()));
        };

        let mut prefix = String::new();
        let mut open = None;
        for (position, segment) in parents.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment.property);
            if segment.element.is_none() && self.compiled.is_collection(&prefix) && open.replace(position).is_some() {
                return Err(ViewError::invalid_path(
                    path,
                    "only one collection segment may omit its element index",
                ));
            }
        }
        let Some(open) = open else {
            return Ok((index, path.to_string()));
        };
        if self.rows.len() != 1 {
            return Err(ViewError::invalid_path(path, "collection segment needs an element index"));
        }

        let positional = segments
            .iter()
            .enumerate()
            .map(|(position, segment)| match segment.element {
                Some(i) => format!("{}[{}]", segment.property, i),
                None if position == open => format!("{}[{}]", segment.property, index),
                None => segment.property.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        Ok((0, positional))
    }

    /// Append an empty root row flagged as new; returns its index.
    pub fn append_row(&mut self) -> usize {
        let mut data = Row::new();
        data.insert(NEW_ROW_MARKER, true);
        self.rows.push(ViewRow::new(data));
        self.rows.len() - 1
    }

    /// Schedule root row `index` for removal.
    pub fn remove_row(&mut self, index: usize) -> ViewResult<Row> {
        if index >= self.rows.len() {
            return Err(ViewError::invalid_path(&index.to_string(), "row index out of range"));
        }
        let row = self.rows.remove(index);
        // An appended row never reached storage.
        if !row.is_new() {
            self.removed.push(row.data.clone());
        }
        Ok(row.data)
    }

    /// Align the view with storage after a successful flush.
    ///
    /// `reopened` lists (row, node path, property) slots whose validity
    /// interval now starts at `now`.
    pub(crate) fn reconcile(&mut self, now: NaiveDateTime, reopened: &[(usize, String, String)]) {
        for (index, node, property) in reopened {
            if let Some(row) = self.rows.get_mut(*index) {
                if let Ok(node) = node_at_mut(&mut row.data, node) {
                    node.insert(property.as_str(), now);
                }
            }
        }
        for row in &mut self.rows {
            row.data.remove(NEW_ROW_MARKER);
            row.dirty.clear();
        }
        self.removed.clear();
    }
}
