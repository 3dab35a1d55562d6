//! Loading schema and view documents.

#[path = "../common/mod.rs"]
mod common;

use strata::context::QueryContext;
use strata::error::ViewError;
use strata::filter::ViewDefinition;
use strata::schema::SchemaRegistry;
use strata::value::{JdbcType, Value};
use strata::view::{Page, ViewCompiler};

fn schema_error(document: &str) -> String {
    match SchemaRegistry::from_toml(document) {
        Err(ViewError::Schema(message)) => message,
        Err(other) => panic!("expected a schema error, got {:?}", other),
        Ok(_) => panic!("document should be rejected"),
    }
}

#[test]
fn test_fixture_schema_loads() {
    let registry = common::registry();
    assert_eq!(registry.len(), 7);

    let sample = registry.entity("Sample").unwrap();
    assert_eq!(sample.table(), "sample");
    assert!(sample.attribute("listParameter").unwrap().is_collection());
    assert_eq!(
        registry.target_of(sample.attribute("inner").unwrap()).unwrap().name(),
        "Inner"
    );

    let hist = registry.entity("HistSample").unwrap();
    assert!(hist.is_versioned());
    assert_eq!(hist.identity_keys().len(), 1);
    assert_eq!(hist.attribute("versionFrom").unwrap().jdbc_type, JdbcType::Timestamp);
}

#[test]
fn test_subtypes_share_the_parent_table() {
    let registry = common::registry();
    let dog = registry.entity("Dog").unwrap();

    assert_eq!(dog.table(), "animal");
    assert_eq!(dog.parent(), Some("Animal"));
    assert!(dog.attribute("name").is_some());
    assert!(dog.attribute("lives").is_none());
    let discriminator = dog.discriminator().unwrap();
    assert_eq!(discriminator.attribute.property(), "kind");
    assert_eq!(discriminator.value, Value::from("dog"));
}

#[test]
fn test_subtype_may_precede_its_parent() {
    let registry = SchemaRegistry::from_toml(
        r#"
[[entity]]
name = "Circle"
extends = "Shape"
discriminator = { property = "kind", value = "circle" }

[[entity.attribute]]
property = "radius"
column = "radius"
jdbc_type = "double"

[[entity]]
name = "Shape"
table = "shape"

[[entity.attribute]]
property = "id"
column = "id"
primary_key = true

[[entity.attribute]]
property = "kind"
column = "kind"
"#,
    )
    .unwrap();

    assert_eq!(registry.entity("Circle").unwrap().table(), "shape");
}

#[test]
fn test_invalid_documents_are_rejected() {
    let duplicate = schema_error(
        r#"
[[entity]]
name = "Thing"

[[entity.attribute]]
property = "id"
column = "id"
primary_key = true

[[entity.attribute]]
property = "id"
column = "other_id"
"#,
    );
    assert!(duplicate.contains("twice"));

    let keyless = schema_error(
        r#"
[[entity]]
name = "Thing"

[[entity.attribute]]
property = "label"
column = "label"
"#,
    );
    assert!(keyless.contains("no primary key"));

    let orphan = schema_error(
        r#"
[[entity]]
name = "Child"
extends = "Missing"

[[entity.attribute]]
property = "id"
column = "id"
primary_key = true
"#,
    );
    assert!(orphan.contains("Child"));

    let virtual_only = schema_error(
        r#"
[[entity]]
name = "Thing"

[[entity.attribute]]
property = "id"
primary_key = true
"#,
    );
    assert!(virtual_only.contains("Thing.id"));
}

#[test]
fn test_association_mapping_is_validated() {
    let unknown_local = schema_error(
        r#"
[[entity]]
name = "Thing"

[[entity.attribute]]
property = "id"
column = "id"
primary_key = true

[[entity.attribute]]
property = "self"
association = { target = "Thing", join_table = "thing", join_columns = [{ local = "parent_id", target = "id" }] }
"#,
    );
    assert!(unknown_local.contains("parent_id"));

    let unknown_target = schema_error(
        r#"
[[entity]]
name = "Thing"

[[entity.attribute]]
property = "id"
column = "id"
primary_key = true

[[entity.attribute]]
property = "other"
association = { target = "Nowhere", join_table = "nowhere", join_columns = [{ local = "id", target = "id" }] }
"#,
    );
    assert!(unknown_target.contains("Nowhere"));
}

#[test]
fn test_view_document_builds_a_tree() {
    let registry = common::registry();
    let definition = ViewDefinition::from_toml(
        r#"
entity = "Sample"
limit = 20

[[filter]]
path = "id"
sort_ascending = true

[[filter]]
path = "inner.value"
operator = "equals"
value = "hi1"

[[filter]]
path = "listParameter"
"#,
    )
    .unwrap();
    assert_eq!(definition.root_names(), vec!["Sample"]);

    let tree = definition.to_tree(&registry).unwrap();
    assert_eq!(tree.filters().len(), 3);

    let settings = common::settings();
    let view = ViewCompiler::new(&registry, &settings)
        .compile(
            &tree,
            &QueryContext::new(),
            Page::new(definition.offset, definition.limit),
        )
        .unwrap();
    let sql = view.primary_sql();
    assert!(sql.contains("WHERE t1.\"value\" = 'hi1'"));
    assert!(sql.contains("ORDER BY t0.\"id\" ASC"));
    assert!(sql.ends_with("LIMIT 20"));
    assert!(view.sub_select("listParameter").is_some());
}

#[test]
fn test_view_document_errors() {
    let registry = common::registry();

    let unknown = ViewDefinition::from_toml("entity = \"Sample\"\n[[filter]]\npath = \"nope\"\n").unwrap();
    assert!(matches!(unknown.to_tree(&registry), Err(ViewError::Schema(_))));

    let open_range = ViewDefinition::from_toml(
        "entity = \"Inner\"\n[[filter]]\npath = \"sampleId\"\noperator = \"between\"\nvalue = 1\n",
    )
    .unwrap();
    assert!(matches!(open_range.to_tree(&registry), Err(ViewError::Composition(_))));

    let mixed = ViewDefinition::from_toml("entities = [\"Sample\", \"Dog\"]\n").unwrap();
    assert!(mixed.to_tree(&registry).is_err());
}

#[test]
fn test_demo_documents_compile() {
    let demos = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let registry = SchemaRegistry::from_file(demos.join("schema.toml")).unwrap();
    let settings = common::settings();

    for name in ["samples.toml", "history.toml"] {
        let definition = ViewDefinition::from_file(demos.join(name)).unwrap();
        let tree = definition.to_tree(&registry).unwrap();
        let view = ViewCompiler::new(&registry, &settings)
            .compile(&tree, &QueryContext::new(), Page::new(definition.offset, definition.limit))
            .unwrap();
        common::validate_sql(&view.primary_sql(), strata::sql::Dialect::Postgres);
    }
}
