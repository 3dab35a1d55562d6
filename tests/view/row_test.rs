//! Path addressing and mutation tracking of view rows.

#[path = "../common/mod.rs"]
mod common;

use strata::context::QueryContext;
use strata::error::ViewError;
use strata::value::{Row, Value};
use strata::view::{Page, UpdatePlanner, View, ViewCompiler, NEW_ROW_MARKER};

fn inner(id: i64, value: &str) -> Value {
    Value::Row(
        Row::new()
            .with("id", id)
            .with("value", value)
            .with("sampleId", 1i64),
    )
}

fn sample_view() -> View {
    let registry = common::registry();
    let settings = common::settings();
    let tree = common::tree(&registry, "Sample", &["id", "innerId", "inner", "listParameter"]);
    let compiled = ViewCompiler::new(&registry, &settings)
        .compile(&tree, &QueryContext::new(), Page::default())
        .unwrap();

    let loaded = Row::new()
        .with("rootKey", 1i64)
        .with("id", 1i64)
        .with("innerId", 1001i64)
        .with("inner", inner(1001, "hi1"))
        .with(
            "listParameter",
            Value::List(vec![inner(1001, "hi1"), inner(1002, "hi2")]),
        );
    let orphan = Row::new()
        .with("rootKey", 2i64)
        .with("id", 2i64)
        .with("innerId", Value::Null)
        .with("inner", Value::Null)
        .with("listParameter", Value::List(Vec::new()));

    View::new(compiled, vec![loaded, orphan])
}

/// Only the first sample row.
fn single_sample_view() -> View {
    let view = sample_view();
    let first = view.row(0).unwrap().clone();
    View::new(view.compiled().clone(), vec![first])
}

#[test]
fn test_read_nested_paths() {
    let view = sample_view();

    assert_eq!(view.len(), 2);
    assert_eq!(view.get_column_value(0, "id").unwrap(), &Value::Int(1));
    assert_eq!(view.get_column_value(0, "inner.value").unwrap(), &Value::from("hi1"));
    assert_eq!(
        view.get_column_value(0, "listParameter[1].value").unwrap(),
        &Value::from("hi2")
    );
    assert_eq!(view.get_column_value(0, "listParameter[0]").unwrap(), &inner(1001, "hi1"));
    assert_eq!(view.get_column_value(1, "inner.value").unwrap(), &Value::Null);
    assert_eq!(view.get_column_value(0, "missing").unwrap(), &Value::Null);
}

#[test]
fn test_invalid_paths_are_rejected() {
    let view = sample_view();

    for path in [
        "listParameter.value",
        "listParameter[9].value",
        "id.value",
        "inner..value",
        "inner[0].value",
    ] {
        assert!(
            matches!(view.get_column_value(0, path), Err(ViewError::InvalidPath { .. })),
            "{} should be rejected",
            path
        );
    }
    assert!(matches!(
        view.get_column_value(5, "id"),
        Err(ViewError::InvalidPath { .. })
    ));
}

#[test]
fn test_index_selects_element_on_single_row_view() {
    let mut view = single_sample_view();

    assert_eq!(view.get_column_value(1, "listParameter.value").unwrap(), &Value::from("hi2"));
    assert_eq!(view.get_column_value(0, "listParameter.id").unwrap(), &Value::Int(1001));
    assert_eq!(view.get_column_value(0, "inner.value").unwrap(), &Value::from("hi1"));
    assert!(matches!(
        view.get_column_value(4, "listParameter.value"),
        Err(ViewError::InvalidPath { .. })
    ));

    view.set_column_value("edited", 1, "listParameter.value").unwrap();
    assert_eq!(view.get_column_value(1, "listParameter.value").unwrap(), &Value::from("edited"));
    assert_eq!(
        view.get_column_value(0, "listParameter[1].value").unwrap(),
        &Value::from("edited")
    );

    let plan = UpdatePlanner::new(&common::settings())
        .plan(&mut view, &QueryContext::new())
        .unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.statements[0].entity_path, "listParameter");
    assert_eq!(plan.statements[0].batch[0].last().unwrap().value, Value::Int(1002));
}

#[test]
fn test_set_records_change() {
    let mut view = sample_view();
    assert!(!view.is_dirty());

    view.set_column_value("changed", 0, "inner.value").unwrap();
    view.set_column_value("edited", 0, "listParameter[1].value").unwrap();

    assert!(view.is_dirty());
    assert_eq!(view.get_column_value(0, "inner.value").unwrap(), &Value::from("changed"));
    assert_eq!(
        view.get_column_value(0, "listParameter[1].value").unwrap(),
        &Value::from("edited")
    );
}

#[test]
fn test_set_through_null_association_creates_node() {
    let mut view = sample_view();

    view.set_column_value(1003i64, 1, "inner.id").unwrap();
    assert_eq!(view.get_column_value(1, "inner.id").unwrap(), &Value::Int(1003));
    assert!(view.row(1).unwrap().get("inner").and_then(Value::as_row).is_some());
}

#[test]
fn test_collection_cannot_be_assigned_whole() {
    let mut view = sample_view();

    let err = view
        .set_column_value(Value::Null, 0, "listParameter[0]")
        .unwrap_err();
    assert!(matches!(err, ViewError::InvalidPath { .. }));
    assert!(view.set_column_value("x", 0, "listParameter[7].value").is_err());
    assert!(!view.is_dirty());
}

#[test]
fn test_append_and_remove() {
    let mut view = sample_view();

    let appended = view.append_row();
    assert_eq!(appended, 2);
    assert_eq!(view.row(appended).unwrap().get(NEW_ROW_MARKER), Some(&Value::Bool(true)));
    assert!(view.is_dirty());

    // Dropping an appended row leaves nothing to write.
    view.remove_row(appended).unwrap();
    assert!(!view.is_dirty());

    let removed = view.remove_row(0).unwrap();
    assert_eq!(removed.get("id"), Some(&Value::Int(1)));
    assert_eq!(view.len(), 1);
    assert!(view.is_dirty());

    assert!(view.remove_row(5).is_err());
}

#[test]
fn test_rows_serialize_as_nested_json() {
    let view = sample_view();
    let json = serde_json::to_value(view.row(0).unwrap()).unwrap();

    assert_eq!(json["inner"]["value"], "hi1");
    assert_eq!(json["listParameter"][1]["id"], 1002);
    assert!(serde_json::to_value(view.row(1).unwrap()).unwrap()["inner"].is_null());
}
