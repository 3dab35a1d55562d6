//! SQL shape of compiled views.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use insta::assert_snapshot;
use strata::context::QueryContext;
use strata::filter::{Aggregate, FilterNode, FilterTree, Operator, Predicate};
use strata::sql::Dialect;
use strata::value::Value;
use strata::view::{ColumnKind, CompiledView, Page, ViewCompiler};

fn compile(tree: &FilterTree, ctx: &QueryContext, page: Page) -> CompiledView {
    let registry = common::registry();
    let settings = common::settings();
    ViewCompiler::new(&registry, &settings)
        .compile(tree, ctx, page)
        .unwrap()
}

// ============================================================================
// Primary query
// ============================================================================

#[test]
fn test_association_filter_snapshot() {
    let registry = common::registry();
    let mut tree = common::tree(&registry, "Sample", &["id"]);
    tree.add_path(&registry, "inner.value", Some(Predicate::equals("hi1").unwrap()))
        .unwrap();

    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();
    assert_snapshot!(sql, @r#"
    SELECT
      t0."id" AS "rootKey",
      t0."id" AS "id",
      t1."value" AS "inner.value",
      t1."id" AS "inner.id",
      t0."inner_id" AS "innerId"
    FROM "sample" t0
    LEFT OUTER JOIN "inner_item" t1 ON (t0."inner_id" = t1."id")
    WHERE t1."value" = 'hi1'
    "#);
    common::validate_sql(&sql, Dialect::Postgres);
}

#[test]
fn test_no_filters_projects_root_scalars() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Inner", &[]);
    let view = compile(&tree, &QueryContext::new(), Page::default());

    let aliases: Vec<&str> = view.columns.iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(aliases, vec!["rootKey", "id", "value", "sampleId"]);
    assert_eq!(view.columns[0].kind, ColumnKind::RootKey);
    assert!(view.sub_selects.is_empty());
}

#[test]
fn test_join_is_deduplicated_per_path() {
    let registry = common::registry();
    let sample = registry.entity("Sample").unwrap();
    let inner = registry.entity("Inner").unwrap();
    let mut tree = common::tree(&registry, "Sample", &["inner.value"]);
    let id_filter = FilterNode::leaf(
        Arc::clone(inner.attribute("id").unwrap()),
        Predicate::new(Operator::Greater, 1000i64).unwrap(),
    )
    .unwrap();
    let second = FilterNode::project(Arc::clone(sample.attribute("inner").unwrap()))
        .with_child(id_filter, &registry)
        .unwrap();
    tree.add(second).unwrap();

    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();
    assert_eq!(sql.matches("LEFT OUTER JOIN").count(), 1);
    assert_eq!(view.join_plan.len(), 1);
    assert_eq!(view.join_plan.by_path("inner").unwrap().alias, 1);
    assert!(sql.contains("WHERE t1.\"id\" > 1000"));
}

#[test]
fn test_compilation_is_deterministic() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Sample", &["inner", "listParameter", "hist.value"]);
    let ctx = QueryContext::at(common::ts("2017-01-01 00:00:00"));

    let first = compile(&tree, &ctx, Page::default());
    let second = compile(&tree, &ctx, Page::default());
    assert_eq!(first.primary_sql(), second.primary_sql());
    assert_eq!(
        first.sub_selects[0].template_sql(),
        second.sub_selects[0].template_sql()
    );
    assert_eq!(first, second);
}

#[test]
fn test_version_constraint_on_join() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Sample", &["hist.value"]);

    let at = compile(
        &tree,
        &QueryContext::at(common::ts("2017-01-01 00:00:00")),
        Page::default(),
    );
    assert!(at.primary_sql().contains(
        "LEFT OUTER JOIN \"hist_sample\" t1 ON (t0.\"id\" = t1.\"id\" AND t1.\"version_from\" <= '2017-01-01 00:00:00' AND (t1.\"version_to\" > '2017-01-01 00:00:00' OR t1.\"version_to\" IS NULL))"
    ));

    let open = compile(&tree, &QueryContext::new(), Page::default());
    assert!(open
        .primary_sql()
        .contains("ON (t0.\"id\" = t1.\"id\" AND t1.\"version_to\" IS NULL)"));
}

#[test]
fn test_version_constraint_on_root() {
    let registry = common::registry();
    let tree = common::tree(&registry, "HistSample", &["value"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();

    assert!(sql.ends_with("WHERE t0.\"version_to\" IS NULL"));
    assert!(sql.contains("t0.\"version_from\" AS \"versionFrom\""));
}

#[test]
fn test_single_subtype_root_gets_discriminator() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Cat", &["lives"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();

    assert!(sql.contains("WHERE t0.\"kind\" = 'cat'"));
    assert!(sql.contains("t0.\"kind\" AS \"kind\""));
}

#[test]
fn test_polymorphic_roots_get_discriminator_disjunction() {
    let registry = common::registry();
    let tree = common::polymorphic_tree(&registry, &["Dog", "Cat"], &["name", "lives"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();

    assert!(sql.contains("WHERE (t0.\"kind\" = 'dog' OR t0.\"kind\" = 'cat')"));
    assert!(sql.contains("t0.\"lives\" AS \"lives\""));
    common::validate_sql(&sql, Dialect::Postgres);

    // A root without a discriminator already covers every row.
    let mixed = common::polymorphic_tree(&registry, &["Animal", "Dog"], &["name"]);
    let view = compile(&mixed, &QueryContext::new(), Page::default());
    assert!(!view.primary_sql().contains("WHERE"));
}

#[test]
fn test_aggregate_groups_by_plain_columns() {
    let registry = common::registry();
    let sample = registry.entity("Sample").unwrap();
    let mut tree = common::tree(&registry, "Sample", &["id"]);
    tree.add(
        FilterNode::aggregate(
            Arc::clone(sample.attribute("listParameter").unwrap()),
            Aggregate::Count,
        )
        .unwrap(),
    )
    .unwrap();

    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();
    assert!(sql.contains("COUNT(t1.*) AS \"listParameter\""));
    assert!(sql.contains("LEFT OUTER JOIN \"inner_item\" t1 ON (t0.\"id\" = t1.\"sample_id\")"));
    assert!(sql.contains("GROUP BY t0.\"id\""));
    assert!(view.sub_selects.is_empty());
    assert!(view
        .columns
        .iter()
        .any(|c| c.alias == "listParameter" && c.kind == ColumnKind::Aggregate));

    let sqlite = ViewCompiler::new(&registry, &common::settings())
        .with_dialect(Dialect::Sqlite)
        .compile(&tree, &QueryContext::new(), Page::default())
        .unwrap();
    assert!(sqlite.primary_sql().contains("COUNT(t1.\"id\")"));
}

#[test]
fn test_sort_and_pagination() {
    let registry = common::registry();
    let mut tree = common::tree(&registry, "Sample", &[]);
    tree.add_path(&registry, "id", None).unwrap().set_sort(Some(false));

    let view = compile(&tree, &QueryContext::new(), Page::new(Some(20), Some(10)));
    assert!(view
        .primary_sql()
        .ends_with("ORDER BY t0.\"id\" DESC\nOFFSET 20 LIMIT 10"));

    let settings = strata::config::ViewSettings {
        default_limit: Some(500),
        ..common::settings()
    };
    let view = ViewCompiler::new(&registry, &settings)
        .with_dialect(Dialect::Sqlite)
        .compile(&tree, &QueryContext::new(), Page::default())
        .unwrap();
    assert!(view.primary_sql().ends_with("LIMIT 500"));
}

#[test]
fn test_output_name_and_allows_null_predicate() {
    let registry = common::registry();
    let mut tree = common::tree(&registry, "Inner", &[]);
    tree.add_path(
        &registry,
        "value",
        Some(Predicate::new(Operator::EqualsOrNull, "hi1").unwrap()),
    )
    .unwrap()
    .set_output_name(Some("label".into()));
    tree.add_path(&registry, "sampleId", Some(Predicate::between(0i64, 5i64).unwrap()))
        .unwrap();

    let view = compile(&tree, &QueryContext::new(), Page::default());
    let sql = view.primary_sql();
    assert!(sql.contains("t0.\"value\" AS \"label\""));
    assert!(sql.contains(
        "WHERE (t0.\"value\" = 'hi1' OR t0.\"value\" IS NULL) AND (t0.\"sample_id\" > 0 AND t0.\"sample_id\" < 5)"
    ));
}

#[test]
fn test_composite_root_key() {
    let registry = common::registry();
    let tree = common::tree(&registry, "CompositeSample", &["innerId"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());

    assert!(view.primary_sql().starts_with(
        "SELECT\n  CAST(t0.\"key_a\" AS TEXT) || '-' || CAST(t0.\"key_b\" AS TEXT) AS \"rootKey\""
    ));
    assert!(view.primary_sql().contains("t0.\"key_a\" AS \"keyA\""));
    assert!(view.primary_sql().contains("t0.\"key_b\" AS \"keyB\""));
}

// ============================================================================
// Collection sub-selects
// ============================================================================

#[test]
fn test_collection_sub_select_snapshot() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Sample", &["id", "listParameter.value"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());

    assert_snapshot!(view.primary_sql(), @r#"
    SELECT
      t0."id" AS "rootKey",
      t0."id" AS "id"
    FROM "sample" t0
    "#);

    let sub = view.sub_select("listParameter").unwrap();
    assert!(view.is_collection("listParameter"));
    assert_snapshot!(sub.template_sql(), @r#"
    SELECT
      t0."id" AS "rootKey",
      t1."value" AS "listParameter.value",
      t1."id" AS "listParameter.id",
      t1."sample_id" AS "listParameter.sampleId"
    FROM "sample" t0
    LEFT OUTER JOIN "inner_item" t1 ON (t0."id" = t1."sample_id")
    "#);

    let restricted = sub.sql_for_keys(&[Value::Int(1), Value::Int(2)]);
    assert!(restricted.ends_with("WHERE t0.\"id\" IN (1, 2)"));
    common::validate_sql(&restricted, Dialect::Postgres);
}

#[test]
fn test_collection_paths_merge_into_one_sub_select() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Sample", &["listParameter.value", "listParameter.id"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());

    assert_eq!(view.sub_selects.len(), 1);
    assert_eq!(view.sub_selects[0].template_sql().matches("LEFT OUTER JOIN").count(), 1);
}

#[test]
fn test_collection_is_not_joined_in_primary() {
    let registry = common::registry();
    let tree = common::tree(&registry, "Sample", &["listParameter"]);
    let view = compile(&tree, &QueryContext::new(), Page::default());

    assert!(!view.primary_sql().contains("inner_item"));
    let sub = view.sub_select("listParameter").unwrap();
    assert!(!sub.template_sql().contains("WHERE"));
    assert!(sub.template_sql().contains("t1.\"value\" AS \"listParameter.value\""));
    assert_eq!(view.join_plan.by_path("listParameter").unwrap().entity.name(), "Inner");
}

#[test]
fn test_nested_collection_gets_its_own_sub_select() {
    let registry = common::nested_registry();
    let settings = common::settings();
    let tree = common::tree(&registry, "Parent", &["id", "items.name", "items.subs.label"]);
    let view = ViewCompiler::new(&registry, &settings)
        .compile(&tree, &QueryContext::new(), Page::default())
        .unwrap();

    assert_eq!(view.sub_selects.len(), 2);
    let items = view.sub_select("items").unwrap();
    assert!(items.enclosing.is_empty());
    assert!(!items.template_sql().contains("\"sub\""));

    let subs = view.sub_select("items.subs").unwrap();
    assert_eq!(subs.enclosing.len(), 1);
    assert_eq!(subs.enclosing[0].path, "items");
    assert_eq!(subs.enclosing[0].keys, vec!["id".to_string()]);
    assert_snapshot!(subs.template_sql(), @r#"
    SELECT
      t0."id" AS "rootKey",
      t1."id" AS "items.id",
      t2."label" AS "items.subs.label",
      t2."id" AS "items.subs.id",
      t2."child_id" AS "items.subs.childId"
    FROM "parent" t0
    LEFT OUTER JOIN "child" t1 ON (t0."id" = t1."parent_id")
    LEFT OUTER JOIN "sub" t2 ON (t1."id" = t2."child_id")
    "#);
    assert_eq!(view.join_plan.by_path("items.subs").unwrap().entity.name(), "Sub");
    common::validate_sql(&subs.sql_for_keys(&[Value::Int(1)]), Dialect::Sqlite);
}
