mod common;

use fdep_mcp::db::Database;
use fdep_mcp::errors::FdepError;
use fdep_mcp::query::*;
use fdep_mcp::types::EntityKind;
use serde_json::json;

fn setup_db() -> Database {
    let db = Database::open_in_memory().expect("failed to open in-memory database");
    common::seed(&db);
    db.insert_function(1, "ParseConfig", Some("FilePath -> IO Config")).unwrap();
    db
}

fn function_names(db: &Database, conditions: &[Condition]) -> Vec<String> {
    let schema = EntitySchema::for_kind(EntityKind::Function);
    let predicate = translate_all(schema, conditions).expect("translation failed");
    db.run_predicate_query(EntityKind::Function, &predicate, 100)
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect()
}

// ---------------------------------------------------------------------------
// Pattern normalization
// ---------------------------------------------------------------------------

#[test]
fn test_normalize_is_idempotent() {
    for p in ["*Parser*", "a*b", "%x%", "plain", ""] {
        let once = normalize(p);
        assert_eq!(normalize(&once), once);
    }
}

#[test]
fn test_normalized_pattern_never_has_user_wildcard() {
    for p in ["*", "**", "a*", "*a*b*"] {
        assert!(!normalize(p).contains('*'));
        assert!(!build_contains_pattern(p).contains('*'));
    }
}

// ---------------------------------------------------------------------------
// Conditions against the store
// ---------------------------------------------------------------------------

#[test]
fn test_startswith_is_case_sensitive() {
    let db = setup_db();
    let names = function_names(&db, &[Condition::new("name", Operator::StartsWith, "parse")]);
    assert_eq!(names, vec!["parseExpr", "parseTerm"]);
}

#[test]
fn test_like_versus_ilike() {
    let db = setup_db();
    let like = function_names(&db, &[Condition::new("name", Operator::Like, "*arse*")]);
    assert_eq!(like.len(), 4);
    assert!(like.contains(&"reparse".to_string()));

    let like_upper = function_names(&db, &[Condition::new("name", Operator::Like, "Parse*")]);
    assert_eq!(like_upper, vec!["ParseConfig"]);

    let ilike = function_names(&db, &[Condition::new("name", Operator::Ilike, "parse*")]);
    assert_eq!(ilike, vec!["parseExpr", "parseTerm", "ParseConfig"]);
}

#[test]
fn test_contains_and_endswith() {
    let db = setup_db();
    let contains = function_names(&db, &[Condition::new("name", Operator::Contains, "Ter")]);
    assert_eq!(contains, vec!["parseTerm"]);
    let ends = function_names(&db, &[Condition::new("name", Operator::EndsWith, "ize")]);
    assert_eq!(ends, vec!["tokenize"]);
}

#[test]
fn test_between_is_inclusive() {
    let db = setup_db();
    let names = function_names(&db, &[Condition::new("id", Operator::Between, json!([2, 3]))]);
    assert_eq!(names, vec!["parseTerm", "tokenize"]);
}

#[test]
fn test_in_and_not_in() {
    let db = setup_db();
    let inside = function_names(
        &db,
        &[Condition::new("name", Operator::In, json!(["main", "tokenize", "absent"]))],
    );
    assert_eq!(inside, vec!["tokenize", "main"]);

    let outside = function_names(
        &db,
        &[Condition::new("name", Operator::NotIn, json!(["main", "tokenize"]))],
    );
    assert_eq!(outside.len(), 4);
    assert!(!outside.contains(&"main".to_string()));
}

#[test]
fn test_empty_in_list_matches_nothing() {
    let db = setup_db();
    assert!(function_names(&db, &[Condition::new("name", Operator::In, json!([]))]).is_empty());
    assert_eq!(
        function_names(&db, &[Condition::new("name", Operator::NotIn, json!([]))]).len(),
        6
    );
}

#[test]
fn test_eq_null_means_is_null() {
    let db = setup_db();
    let names = function_names(
        &db,
        &[Condition::new("function_signature", Operator::Eq, serde_json::Value::Null)],
    );
    assert_eq!(names, vec!["reparse"]);
}

#[test]
fn test_filter_by_module_name_field() {
    let db = setup_db();
    let names = function_names(&db, &[Condition::new("module", Operator::Eq, "App.Lexer")]);
    assert_eq!(names, vec!["tokenize"]);
}

#[test]
fn test_conditions_are_anded_in_order() {
    let db = setup_db();
    let names = function_names(
        &db,
        &[
            Condition::new("name", Operator::StartsWith, "parse"),
            Condition::new("function_signature", Operator::Contains, "Term"),
        ],
    );
    assert_eq!(names, vec!["parseTerm"]);
}

#[test]
fn test_unknown_field_matches_everything() {
    let db = setup_db();
    let names = function_names(&db, &[Condition::new("colour", Operator::Eq, "red")]);
    assert_eq!(names.len(), 6);
}

#[test]
fn test_pattern_on_integer_field_rejected() {
    let schema = EntitySchema::for_kind(EntityKind::Function);
    let err = translate(schema, &Condition::new("id", Operator::Contains, "1")).unwrap_err();
    assert!(matches!(err, FdepError::Validation { .. }));
}

#[test]
fn test_between_requires_two_bounds() {
    let schema = EntitySchema::for_kind(EntityKind::Function);
    assert!(translate(schema, &Condition::new("id", Operator::Between, json!([1]))).is_err());
    assert!(translate(schema, &Condition::new("id", Operator::Between, 4)).is_err());
}

#[test]
fn test_in_list_size_is_bounded() {
    let schema = EntitySchema::for_kind(EntityKind::Function);
    let values: Vec<i64> = (0..=MAX_IN_LIST as i64).collect();
    assert!(translate(schema, &Condition::new("id", Operator::In, json!(values))).is_err());
}

#[test]
fn test_values_are_bound_not_inlined() {
    let schema = EntitySchema::for_kind(EntityKind::Function);
    let hostile = "x'; DROP TABLE functions; --";
    let p = translate(schema, &Condition::new("name", Operator::Eq, hostile))
        .unwrap()
        .unwrap();
    assert!(!p.sql().contains("DROP"));
    assert_eq!(p.params().len(), 1);
}

// ---------------------------------------------------------------------------
// Entity queries
// ---------------------------------------------------------------------------

#[test]
fn test_entity_query_parses_and_clamps() {
    let q = EntityQuery::from_json(
        &json!({"type": "functions", "conditions": [{"field": "name", "operator": "eq", "value": "main"}], "limit": 5000}),
        1000,
    )
    .unwrap();
    assert_eq!(q.kind, EntityKind::Function);
    assert_eq!(q.conditions.len(), 1);
    assert_eq!(q.limit, 1000);
}

#[test]
fn test_entity_query_defaults_limit() {
    let q = EntityQuery::from_json(&json!({"type": "class"}), 1000).unwrap();
    assert_eq!(q.limit, DEFAULT_QUERY_LIMIT);
    assert!(q.predicate().unwrap().is_match_all());
}

#[test]
fn test_entity_query_rejects_unknown_kind_and_operator() {
    let kind = EntityQuery::from_json(&json!({"type": "widget"}), 10).unwrap_err();
    assert!(matches!(kind, FdepError::UnsupportedEntity { .. }));

    let op = EntityQuery::from_json(
        &json!({"type": "function", "conditions": [{"field": "name", "operator": "matches", "value": "x"}]}),
        10,
    )
    .unwrap_err();
    assert!(matches!(op, FdepError::Validation { .. }));
}

#[test]
fn test_condition_without_operator_is_dropped() {
    let q = EntityQuery::from_json(
        &json!({"type": "function", "conditions": [{"field": "name", "value": "x"}]}),
        10,
    )
    .unwrap();
    assert!(q.conditions.is_empty());
}

#[test]
fn test_import_boolean_field() {
    let db = setup_db();
    let schema = EntitySchema::for_kind(EntityKind::Import);
    let p = translate_all(schema, &[Condition::new("is_hiding", Operator::Eq, false)]).unwrap();
    assert_eq!(db.count_entities(EntityKind::Import, &p).unwrap(), 2);
    assert!(translate(schema, &Condition::new("is_hiding", Operator::Gt, 0)).is_err());
}
