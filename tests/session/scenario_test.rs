//! End-to-end reads and writes through a SQLite-backed view session.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use strata::context::QueryContext;
use strata::executor::ViewSession;
use strata::filter::{Aggregate, FilterNode, Predicate};
use strata::value::{Row, Value};
use strata::view::Page;

fn collection_values(value: &Value, property: &str) -> Vec<Value> {
    let mut values: Vec<Value> = value
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|element| element.as_row().and_then(|r| r.get(property)).cloned())
        .collect();
    values.sort_by_key(|v| v.to_string());
    values
}

// ============================================================================
// Associations and collections
// ============================================================================

#[test]
fn test_get_sample_with_association_and_collection() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let first = session.get("Sample", 1i64, &ctx).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first.get_column_value(0, "inner.id").unwrap(), &Value::Int(1001));
    assert_eq!(first.get_column_value(0, "inner.value").unwrap(), &Value::from("hi1"));
    let list = first.get_column_value(0, "listParameter").unwrap();
    assert_eq!(list.as_list().map(|l| l.len()), Some(2));
    assert_eq!(
        collection_values(list, "id"),
        vec![Value::Int(1001), Value::Int(1002)]
    );

    let second = session.get("Sample", 2i64, &ctx).unwrap();
    assert_eq!(second.get_column_value(0, "inner.id").unwrap(), &Value::Int(1003));
    let list = second.get_column_value(0, "listParameter").unwrap();
    assert_eq!(list.as_list().map(|l| l.len()), Some(1));
}

#[test]
fn test_get_unknown_key_returns_empty_view() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let view = session.get("Sample", 99i64, &QueryContext::new()).unwrap();
    assert!(view.is_empty());
}

#[test]
fn test_collection_does_not_multiply_primary_rows() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let tree = common::tree(&registry, "Sample", &["id", "listParameter"]);
    let view = session.select(&tree, &QueryContext::new(), Page::default()).unwrap();

    assert_eq!(view.len(), 2);
    let sizes: Vec<usize> = view
        .rows()
        .map(|r| r.get("listParameter").and_then(Value::as_list).map_or(0, |l| l.len()))
        .collect();
    assert_eq!(sizes.iter().sum::<usize>(), 3);
    assert!(!view.compiled().primary_sql().contains("sample_id"));
}

#[test]
fn test_nested_collection_is_merged_into_its_element() {
    let registry = common::nested_registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::nested_executor(), &registry, &settings);

    let tree = common::tree(&registry, "Parent", &["id", "items.name", "items.subs.label"]);
    let view = session.select(&tree, &QueryContext::new(), Page::default()).unwrap();
    assert_eq!(view.len(), 2);

    let first = view
        .rows()
        .position(|r| r.get("id") == Some(&Value::Int(1)))
        .unwrap();
    let items = view.get_column_value(first, "items").unwrap().as_list().unwrap();
    assert_eq!(items.len(), 2);
    let labels_of = |id: i64| {
        let element = items
            .iter()
            .filter_map(Value::as_row)
            .find(|e| e.get("id") == Some(&Value::Int(id)))
            .unwrap();
        collection_values(element.get("subs").unwrap(), "label")
    };
    assert_eq!(labels_of(10), vec![Value::from("x"), Value::from("y")]);
    assert_eq!(labels_of(11), vec![Value::from("z")]);

    // An element without nested rows holds an empty list, not null.
    let second = 1 - first;
    assert_eq!(
        view.get_column_value(second, "items[0].subs").unwrap(),
        &Value::List(Vec::new())
    );
}

#[test]
fn test_unmatched_association_reads_as_null() {
    let registry = common::registry();
    let settings = common::settings();
    let executor = common::executor();
    executor
        .execute_batch("INSERT INTO sample (id, inner_id) VALUES (3, NULL);")
        .unwrap();
    let mut session = ViewSession::new(executor, &registry, &settings);

    let view = session.get("Sample", 3i64, &QueryContext::new()).unwrap();
    assert_eq!(view.row(0).unwrap().get("inner"), Some(&Value::Null));
    assert_eq!(view.get_column_value(0, "inner.value").unwrap(), &Value::Null);
    assert_eq!(
        view.get_column_value(0, "listParameter").unwrap(),
        &Value::List(Vec::new())
    );
}

// ============================================================================
// Bitemporal reads and writes
// ============================================================================

#[test]
fn test_bitemporal_read_and_update() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let past = QueryContext::at(common::ts("2017-01-01 00:00:00"));
    let historic = session.get("HistSample", 1i64, &past).unwrap();
    assert_eq!(historic.len(), 1);
    assert_eq!(historic.get_column_value(0, "value").unwrap(), &Value::from("h1"));

    let mut current = session.get("HistSample", 1i64, &QueryContext::new()).unwrap();
    assert_eq!(current.get_column_value(0, "value").unwrap(), &Value::from("h1v1"));

    current.set_column_value("v1", 0, "value").unwrap();
    let write = QueryContext::new().with_now(common::ts("2020-01-01 00:00:00"));
    let affected = session.flush(&mut current, &write).unwrap();
    assert_eq!(affected, 2);
    assert_eq!(
        current.get_column_value(0, "versionFrom").unwrap(),
        &Value::Timestamp(common::ts("2020-01-01 00:00:00"))
    );
    assert!(!current.is_dirty());

    let now = session.get("HistSample", 1i64, &QueryContext::new()).unwrap();
    assert_eq!(now.len(), 1);
    assert_eq!(now.get_column_value(0, "value").unwrap(), &Value::from("v1"));

    // The old interval is closed, not overwritten.
    assert_eq!(common::count(session.executor(), "hist_sample"), 3);
    let between = QueryContext::at(common::ts("2019-06-01 00:00:00"));
    let closed = session.get("HistSample", 1i64, &between).unwrap();
    assert_eq!(closed.get_column_value(0, "value").unwrap(), &Value::from("h1v1"));
    assert_eq!(
        closed.get_column_value(0, "versionTo").unwrap(),
        &Value::Timestamp(common::ts("2020-01-01 00:00:00"))
    );
    let first = session.get("HistSample", 1i64, &past).unwrap();
    assert_eq!(first.get_column_value(0, "value").unwrap(), &Value::from("h1"));
}

#[test]
fn test_versioned_association_follows_point_in_time() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let tree = common::tree(&registry, "Sample", &["id", "hist.value"]);
    let ctx = QueryContext::at(common::ts("2017-01-01 12:00:00"));
    let view = session.select(&tree, &ctx, Page::default()).unwrap();
    let first = view.rows().find(|r| r.get("id") == Some(&Value::Int(1))).unwrap();
    assert_eq!(
        first.get("hist").and_then(Value::as_row).and_then(|h| h.get("value")),
        Some(&Value::from("h1"))
    );

    let view = session.select(&tree, &QueryContext::new(), Page::default()).unwrap();
    let first = view.rows().find(|r| r.get("id") == Some(&Value::Int(1))).unwrap();
    assert_eq!(
        first.get("hist").and_then(Value::as_row).and_then(|h| h.get("value")),
        Some(&Value::from("h1v1"))
    );
}

// ============================================================================
// Composite keys
// ============================================================================

#[test]
fn test_composite_key_filtered_by_association_value() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let mut tree = common::tree(&registry, "CompositeSample", &[]);
    tree.add_path(&registry, "inner.value", Some(Predicate::equals("hi1").unwrap()))
        .unwrap();
    let view = session.select(&tree, &QueryContext::new(), Page::default()).unwrap();

    assert_eq!(view.len(), 1);
    assert_eq!(view.get_column_value(0, "rootKey").unwrap(), &Value::from("1-a"));
    assert_eq!(view.get_column_value(0, "keyB").unwrap(), &Value::from("a"));
    assert_eq!(view.get_column_value(0, "inner.value").unwrap(), &Value::from("hi1"));
}

#[test]
fn test_get_composite_key_by_row() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let key = Row::new().with("keyA", 1i64).with("keyB", "b");
    let view = session.get("CompositeSample", key, &QueryContext::new()).unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view.get_column_value(0, "inner.value").unwrap(), &Value::from("hi2"));

    let single = session.get("CompositeSample", 1i64, &QueryContext::new());
    assert!(single.is_err());
}

// ============================================================================
// Polymorphic roots
// ============================================================================

#[test]
fn test_polymorphic_roots_share_a_table() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let tree = common::polymorphic_tree(&registry, &["Dog", "Cat"], &["name"]);
    let view = session.select(&tree, &QueryContext::new(), Page::default()).unwrap();

    let mut names: Vec<String> = view
        .rows()
        .filter_map(|r| r.get("name").map(Value::to_string))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Rex", "Tom"]);
    assert!(view.rows().all(|r| r.contains_key("kind")));
}

#[test]
fn test_subtype_get_honours_discriminator() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);
    let ctx = QueryContext::new();

    let dog = session.get("Dog", 1i64, &ctx).unwrap();
    assert_eq!(dog.len(), 1);
    assert_eq!(dog.get_column_value(0, "goodBoy").unwrap(), &Value::Bool(true));

    assert!(session.get("Dog", 2i64, &ctx).unwrap().is_empty());
}

// ============================================================================
// Aggregation and pagination
// ============================================================================

#[test]
fn test_count_over_collection() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let sample = registry.entity("Sample").unwrap();
    let mut tree = common::tree(&registry, "Sample", &["id"]);
    let count = FilterNode::aggregate(
        Arc::clone(sample.attribute("listParameter").unwrap()),
        Aggregate::Count,
    )
    .unwrap()
    .with_output_name("items");
    tree.add(count).unwrap();

    let view = session.select(&tree, &QueryContext::new(), Page::default()).unwrap();
    assert_eq!(view.len(), 2);
    for row in view.rows() {
        let expected = match row.get("id") {
            Some(Value::Int(1)) => 2,
            _ => 1,
        };
        assert_eq!(row.get("items"), Some(&Value::Int(expected)));
    }
}

#[test]
fn test_pagination_is_applied_to_primary_query() {
    let registry = common::registry();
    let settings = common::settings();
    let mut session = ViewSession::new(common::executor(), &registry, &settings);

    let mut tree = common::tree(&registry, "Sample", &["listParameter"]);
    tree.add_path(&registry, "id", None).unwrap().set_sort(Some(true));
    let ctx = QueryContext::new();

    let first = session.select(&tree, &ctx, Page::limit(1)).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first.get_column_value(0, "id").unwrap(), &Value::Int(1));
    assert_eq!(
        first.get_column_value(0, "listParameter").unwrap().as_list().map(|l| l.len()),
        Some(2)
    );

    let second = session.select(&tree, &ctx, Page::new(Some(1), Some(1))).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.get_column_value(0, "id").unwrap(), &Value::Int(2));
    assert_eq!(
        second.get_column_value(0, "listParameter").unwrap().as_list().map(|l| l.len()),
        Some(1)
    );
}
