//! Write-back of modified views against SQLite.

#[path = "../common/mod.rs"]
mod common;

use strata::context::QueryContext;
use strata::error::ViewError;
use strata::executor::{SqliteExecutor, ViewSession};
use strata::value::Value;
use strata::view::Page;

fn scalar(executor: &SqliteExecutor, sql: &str) -> rusqlite::types::Value {
    executor
        .connection()
        .query_row(sql, [], |row| row.get(0))
        .unwrap()
}

fn element_index(view: &strata::view::View, id: i64) -> usize {
    view.get_column_value(0, "listParameter")
        .unwrap()
        .as_list()
        .unwrap()
        .iter()
        .position(|e| e.as_row().and_then(|r| r.get("id")) == Some(&Value::Int(id)))
        .unwrap()
}

#[test]
fn test_update_association_scalar() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let mut view = session.get("Sample", 1i64, &ctx).unwrap();
    view.set_column_value("changed", 0, "inner.value").unwrap();
    assert!(view.is_dirty());
    assert_eq!(session.flush(&mut view, &ctx).unwrap(), 1);

    let reread = session.get("Sample", 1i64, &ctx).unwrap();
    assert_eq!(reread.get_column_value(0, "inner.value").unwrap(), &Value::from("changed"));
    assert_eq!(
        scalar(session.executor(), "SELECT value FROM inner_item WHERE id = 1003"),
        rusqlite::types::Value::Text("hi3".into())
    );
}

#[test]
fn test_reassigning_association_updates_foreign_key() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let mut view = session.get("Sample", 1i64, &ctx).unwrap();
    view.set_column_value(1002i64, 0, "inner.id").unwrap();
    session.flush(&mut view, &ctx).unwrap();
    assert_eq!(view.get_column_value(0, "innerId").unwrap(), &Value::Int(1002));

    let reread = session.get("Sample", 1i64, &ctx).unwrap();
    assert_eq!(reread.get_column_value(0, "inner.value").unwrap(), &Value::from("hi2"));
    // The old target row keeps its key.
    assert_eq!(
        scalar(session.executor(), "SELECT COUNT(*) FROM inner_item WHERE id = 1001"),
        rusqlite::types::Value::Integer(1)
    );
}

#[test]
fn test_update_collection_element() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let mut view = session.get("Sample", 1i64, &ctx).unwrap();
    let position = element_index(&view, 1002);
    let path = format!("listParameter[{}].value", position);
    view.set_column_value("edited", 0, &path).unwrap();
    assert_eq!(session.flush(&mut view, &ctx).unwrap(), 1);

    assert_eq!(
        scalar(session.executor(), "SELECT value FROM inner_item WHERE id = 1002"),
        rusqlite::types::Value::Text("edited".into())
    );
    assert_eq!(
        scalar(session.executor(), "SELECT sample_id FROM inner_item WHERE id = 1002"),
        rusqlite::types::Value::Integer(1)
    );
}

#[test]
fn test_update_nested_collection_element() {
    let registry = common::nested_registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::nested_executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let tree = common::tree(&registry, "Parent", &["id", "items.name", "items.subs.label"]);
    let mut view = session.select(&tree, &ctx, Page::default()).unwrap();
    let parent = view
        .rows()
        .position(|r| r.get("id") == Some(&Value::Int(1)))
        .unwrap();
    let items = view.get_column_value(parent, "items").unwrap().as_list().unwrap();
    let child = items
        .iter()
        .position(|e| e.as_row().and_then(|r| r.get("id")) == Some(&Value::Int(11)))
        .unwrap();
    view.set_column_value("edited", parent, &format!("items[{}].subs[0].label", child))
        .unwrap();
    assert_eq!(session.flush(&mut view, &ctx).unwrap(), 1);

    assert_eq!(
        scalar(session.executor(), "SELECT label FROM sub WHERE id = 110"),
        rusqlite::types::Value::Text("edited".into())
    );
    assert_eq!(
        scalar(session.executor(), "SELECT child_id FROM sub WHERE id = 110"),
        rusqlite::types::Value::Integer(11)
    );
}

#[test]
fn test_append_and_remove_rows() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let tree = common::tree(&registry, "Sample", &["id", "innerId"]);
    let mut view = session.select(&tree, &ctx, Page::default()).unwrap();
    let appended = view.append_row();
    view.set_column_value(3i64, appended, "id").unwrap();
    view.set_column_value(1002i64, appended, "innerId").unwrap();

    let second = view
        .rows()
        .position(|r| r.get("id") == Some(&Value::Int(2)))
        .unwrap();
    view.remove_row(second).unwrap();

    assert_eq!(session.flush(&mut view, &ctx).unwrap(), 2);
    assert_eq!(common::count(session.executor(), "sample"), 2);
    assert_eq!(
        scalar(session.executor(), "SELECT inner_id FROM sample WHERE id = 3"),
        rusqlite::types::Value::Integer(1002)
    );
    assert!(view.rows().all(|r| !r.contains_key("$new")));
    assert!(!view.is_dirty());
}

#[test]
fn test_removing_appended_row_writes_nothing() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let tree = common::tree(&registry, "Sample", &["id"]);
    let mut view = session.select(&tree, &ctx, Page::default()).unwrap();
    let appended = view.append_row();
    view.set_column_value(9i64, appended, "id").unwrap();
    view.remove_row(appended).unwrap();

    assert!(!view.is_dirty());
    assert_eq!(session.flush(&mut view, &ctx).unwrap(), 0);
    assert_eq!(common::count(session.executor(), "sample"), 2);
}

#[test]
fn test_removing_bitemporal_row_closes_interval() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let mut view = session.get("HistSample", 1i64, &QueryContext::new()).unwrap();
    view.remove_row(0).unwrap();
    let write = QueryContext::new().with_now(common::ts("2020-01-01 00:00:00"));
    assert_eq!(session.flush(&mut view, &write).unwrap(), 1);

    assert!(session
        .get("HistSample", 1i64, &QueryContext::new())
        .unwrap()
        .is_empty());
    assert_eq!(common::count(session.executor(), "hist_sample"), 2);
}

#[test]
fn test_writing_through_past_point_in_time_is_rejected() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let past = QueryContext::at(common::ts("2017-01-01 00:00:00"));
    let mut view = session.get("HistSample", 1i64, &past).unwrap();
    assert_eq!(view.get_column_value(0, "value").unwrap(), &Value::from("h1"));
    view.set_column_value("v1", 0, "value").unwrap();

    let write = QueryContext::new().with_now(common::ts("2020-01-01 00:00:00"));
    let err = session.flush(&mut view, &write).unwrap_err();
    assert!(matches!(err, ViewError::StaleVersion { .. }));
    assert!(view.is_dirty());

    assert_eq!(common::count(session.executor(), "hist_sample"), 2);
    assert_eq!(
        scalar(session.executor(), "SELECT COUNT(*) FROM hist_sample WHERE version_to IS NULL"),
        rusqlite::types::Value::Integer(1)
    );
    assert_eq!(
        scalar(session.executor(), "SELECT version_to FROM hist_sample WHERE value = 'h1'"),
        rusqlite::types::Value::Text("2017-01-02 00:00:00".into())
    );
}

#[test]
fn test_removing_already_closed_interval_is_rejected() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let past = QueryContext::at(common::ts("2017-01-01 00:00:00"));
    let mut view = session.get("HistSample", 1i64, &past).unwrap();
    view.remove_row(0).unwrap();

    let write = QueryContext::new().with_now(common::ts("2020-01-01 00:00:00"));
    let err = session.flush(&mut view, &write).unwrap_err();
    assert!(matches!(err, ViewError::StaleVersion { ref entity_path, .. } if entity_path.is_empty()));
    assert_eq!(
        scalar(session.executor(), "SELECT version_to FROM hist_sample WHERE value = 'h1'"),
        rusqlite::types::Value::Text("2017-01-02 00:00:00".into())
    );
}

#[test]
fn test_fast_update_corrects_in_place() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let mut view = session.get("HistSample", 1i64, &QueryContext::new()).unwrap();
    view.set_column_value("fixed", 0, "value").unwrap();
    let write = QueryContext::new().with_fast_update(true);
    assert_eq!(session.flush(&mut view, &write).unwrap(), 1);

    assert_eq!(common::count(session.executor(), "hist_sample"), 2);
    let reread = session.get("HistSample", 1i64, &QueryContext::new()).unwrap();
    assert_eq!(reread.get_column_value(0, "value").unwrap(), &Value::from("fixed"));
    assert_eq!(
        reread.get_column_value(0, "versionFrom").unwrap(),
        &Value::Timestamp(common::ts("2017-01-02 00:00:00"))
    );
}

#[test]
fn test_appended_subtype_row_gets_discriminator() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let tree = common::tree(&registry, "Dog", &["name"]);
    let mut view = session.select(&tree, &ctx, Page::default()).unwrap();
    let appended = view.append_row();
    view.set_column_value(4i64, appended, "id").unwrap();
    view.set_column_value("Fido", appended, "name").unwrap();
    session.flush(&mut view, &ctx).unwrap();

    assert_eq!(
        scalar(session.executor(), "SELECT kind FROM animal WHERE id = 4"),
        rusqlite::types::Value::Text("dog".into())
    );
    assert_eq!(session.get("Dog", 4i64, &ctx).unwrap().len(), 1);
}

#[test]
fn test_unresolved_property_is_skipped_unless_strict() {
    let registry = common::registry();
    let lenient = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &lenient);
    let ctx = QueryContext::new();

    let mut view = session.get("Sample", 1i64, &ctx).unwrap();
    view.set_column_value("x", 0, "inner.bogus").unwrap();
    assert_eq!(session.flush(&mut view, &ctx).unwrap(), 0);

    let strict = common::strict_settings();
    let mut session = ViewSession::new(common::executor(), &registry, &strict);
    let mut view = session.get("Sample", 1i64, &ctx).unwrap();
    view.set_column_value("x", 0, "inner.bogus").unwrap();
    let err = session.flush(&mut view, &ctx).unwrap_err();
    assert!(matches!(err, ViewError::Resolution { ref column, .. } if column == "bogus"));
}

#[test]
fn test_execution_failure_propagates_and_releases_statements() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let mut view = session.get("Dog", 1i64, &ctx).unwrap();
    view.set_column_value(Value::Null, 0, "kind").unwrap();
    let err = session.flush(&mut view, &ctx).unwrap_err();

    assert!(matches!(err, ViewError::Execution(_)));
    assert_eq!(session.executor().open_statements(), 0);
    // A failed flush leaves the pending change in place.
    assert!(view.is_dirty());
}
