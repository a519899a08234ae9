mod common;

use fdep_mcp::config::ServerConfig;
use fdep_mcp::mcp::tools::*;
use fdep_mcp::mcp::McpServer;
use fdep_mcp::service::CodeService;
use fdep_mcp::types::EntityKind;
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{config_for, seeded_db_file, seeded_service};

fn call(service: &mut CodeService, tool: &str, args: Value) -> ToolOutcome {
    handle_tool_call(service, tool, args)
}

fn success(service: &mut CodeService, tool: &str, args: Value) -> String {
    match call(service, tool, args) {
        ToolOutcome::Success(text) => text,
        other => panic!("{tool} failed: {other:?}"),
    }
}

/// A seeded service whose result cap is `max_results`.
fn capped_service(max_results: usize) -> (CodeService, TempDir) {
    let (db_path, dir) = seeded_db_file();
    let config = ServerConfig {
        max_results,
        ..config_for(&db_path)
    };
    let mut service = CodeService::new(config);
    service.initialize().unwrap();
    (service, dir)
}

fn rpc(server: &mut McpServer, message: Value) -> Value {
    let line = server
        .handle_line(&message.to_string())
        .expect("expected a response");
    serde_json::from_str(&line).unwrap()
}

// ---------------------------------------------------------------------------
// Tool registry
// ---------------------------------------------------------------------------

#[test]
fn test_tool_definitions() {
    let tools = get_tool_definitions();
    assert_eq!(tools.len(), 38);

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    for expected in [
        "list_modules",
        "get_function_callers",
        "execute_query",
        "execute_advanced_query",
        "analyze_function_complexity",
        "build_type_dependency_graph",
        "search_classes",
        "get_class_details",
        "get_import_graph",
        "get_import_details",
        "get_nested_types",
        "find_element_by_location",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
}

#[test]
fn test_tool_definition_serializes_input_schema() {
    let json = serde_json::to_value(&get_tool_definitions()[0]).unwrap();
    assert!(json.get("inputSchema").is_some());
    assert!(json.get("input_schema").is_none());
}

// ---------------------------------------------------------------------------
// Argument validation
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_tool_is_invalid() {
    let (mut service, _dir) = seeded_service();
    let outcome = call(&mut service, "drop_tables", json!({}));
    assert!(matches!(outcome, ToolOutcome::Invalid(ref t) if t.contains("drop_tables")));
}

#[test]
fn test_missing_required_argument() {
    let (mut service, _dir) = seeded_service();
    let outcome = call(&mut service, "get_function_details", json!({}));
    assert!(
        matches!(outcome, ToolOutcome::Invalid(ref t) if t.contains("missing required parameter: function_name"))
    );
}

#[test]
fn test_unexpected_property_rejected() {
    let (mut service, _dir) = seeded_service();
    let outcome = call(&mut service, "list_modules", json!({"limit": 5, "verbose": true}));
    assert!(matches!(outcome, ToolOutcome::Invalid(_)));
}

#[test]
fn test_enum_and_minimum_enforced() {
    let (mut service, _dir) = seeded_service();
    let bad_format = call(
        &mut service,
        "enhanced_function_call_graph",
        json!({"function_name": "parseExpr", "graph_format": "dot"}),
    );
    assert!(matches!(bad_format, ToolOutcome::Invalid(_)));

    let bad_limit = call(&mut service, "list_modules", json!({"limit": 0}));
    assert!(matches!(bad_limit, ToolOutcome::Invalid(_)));
}

// ---------------------------------------------------------------------------
// Modules and functions
// ---------------------------------------------------------------------------

#[test]
fn test_list_and_search_modules() {
    let (mut service, _dir) = seeded_service();
    let listed = success(&mut service, "list_modules", json!({}));
    assert!(listed.starts_with("Found 3 modules"));

    let found = success(&mut service, "search_modules", json!({"pattern": "Pars"}));
    assert!(found.contains("App.Parser"));
    assert!(!found.contains("App.Lexer"));
}

#[test]
fn test_module_details_counts() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_module_details", json!({"module_name": "App.Parser"}));
    assert!(out.contains("Functions: 3"));
    assert!(out.contains("Types: 2"));
    assert!(out.contains("Classes: 1"));
    assert!(out.contains("- parseExpr"));
}

#[test]
fn test_module_dependencies_both_directions() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "get_module_dependencies",
        json!({"module_name": "App.Parser", "include_dependents": true}),
    );
    assert!(out.contains("→ App.Lexer"));
    assert!(out.contains("← App.Main"));
}

#[test]
fn test_unknown_function_is_not_found() {
    let (mut service, _dir) = seeded_service();
    let outcome = call(&mut service, "get_function_details", json!({"function_name": "nope"}));
    assert_eq!(
        outcome,
        ToolOutcome::NotFound("Function not found: nope".to_string())
    );
}

#[test]
fn test_unknown_module_filter_is_not_found() {
    let (mut service, _dir) = seeded_service();
    let outcome = call(
        &mut service,
        "get_function_details",
        json!({"function_name": "parseExpr", "module_name": "App.Nowhere"}),
    );
    assert!(matches!(outcome, ToolOutcome::NotFound(ref t) if t == "Module not found: App.Nowhere"));
}

#[test]
fn test_callers_and_callees() {
    let (mut service, _dir) = seeded_service();
    let callers = success(&mut service, "get_function_callers", json!({"function_name": "parseExpr"}));
    assert!(callers.contains("parseTerm"));
    assert!(callers.contains("main"));

    let callees = success(&mut service, "get_function_callees", json!({"function_name": "main"}));
    assert!(callees.contains("parseExpr (in App.Parser)"));
    assert!(callees.contains("putStrLn (in System.IO)"));
}

#[test]
fn test_call_graph_tree_marks_recursion() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "enhanced_function_call_graph",
        json!({"function_name": "parseExpr", "max_depth": 4}),
    );
    assert!(out.contains("└─ parseTerm [App.Parser]"));
    assert!(out.contains("parseExpr (recursive)"));
    assert!(out.contains("tokenize [App.Lexer]"));
}

#[test]
fn test_call_graph_module_filter_keeps_root() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "enhanced_function_call_graph",
        json!({"function_name": "parseExpr", "filter_modules": ["Lexer"]}),
    );
    assert!(out.contains("parseExpr [App.Parser]"));
    assert!(out.contains("tokenize"));
    assert!(!out.contains("parseTerm"));
}

#[test]
fn test_call_graph_edge_list_includes_back_edge() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "enhanced_function_call_graph",
        json!({"function_name": "parseExpr", "graph_format": "graph"}),
    );
    assert!(out.contains("parseExpr -> parseTerm"));
    assert!(out.contains("parseTerm -> parseExpr"));
}

#[test]
fn test_cross_module_calls() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "find_cross_module_calls", json!({"source_module": "Main"}));
    assert!(out.contains("App.Main.main → App.Parser.parseExpr"));
    assert!(out.contains("System.IO.putStrLn"));
    assert!(!out.contains("App.Parser.parseExpr → App.Lexer.tokenize"));
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[test]
fn test_execute_query_by_name_pattern() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "execute_query",
        json!({"query_type": "functions", "filters": {"name_pattern": "parse*"}}),
    );
    assert!(out.starts_with("Found 2 functions"));
}

#[test]
fn test_advanced_query_startswith() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "execute_advanced_query",
        json!({"query": {
            "type": "function",
            "conditions": [{"field": "name", "operator": "startswith", "value": "parse"}]
        }}),
    );
    assert!(out.contains("parseExpr"));
    assert!(out.contains("parseTerm"));
    assert!(!out.contains("reparse"));
}

#[test]
fn test_advanced_query_rejects_unknown_operator() {
    let (mut service, _dir) = seeded_service();
    let outcome = call(
        &mut service,
        "execute_advanced_query",
        json!({"query": {
            "type": "function",
            "conditions": [{"field": "name", "operator": "regex", "value": "p.*"}]
        }}),
    );
    assert!(matches!(outcome, ToolOutcome::Invalid(_)));
}

#[test]
fn test_advanced_query_null_signature() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "execute_advanced_query",
        json!({"query": {
            "type": "function",
            "conditions": [{"field": "function_signature", "operator": "is_null"}]
        }}),
    );
    assert!(out.starts_with("Found 1 functions"));
    assert!(out.contains("reparse"));
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[test]
fn test_complexity_report() {
    let (mut service, _dir) = seeded_service();
    // 42 chars -> 2, two arrows -> 4, two calls -> 0, one local -> 2
    let out = success(
        &mut service,
        "analyze_function_complexity",
        json!({"min_complexity": 8}),
    );
    assert!(out.contains("parseExpr (complexity: 8)"));
    assert!(!out.contains("tokenize"));
}

#[test]
fn test_complexity_ranks_before_limiting() {
    let (mut service, _dir) = capped_service(2);
    let parser = service.db().unwrap().get_module_by_name("App.Parser").unwrap().unwrap();
    // 20 chars -> 1, four arrows -> 8
    service
        .db()
        .unwrap()
        .insert_function(parser.id, "render", Some("a -> b -> c -> d -> e"))
        .unwrap();

    let out = success(
        &mut service,
        "analyze_function_complexity",
        json!({"min_complexity": 3}),
    );
    assert!(out.contains("render (complexity: 9)"));
    assert!(out.contains("parseExpr (complexity: 8)"));
    assert!(!out.contains("parseTerm"));
}

#[test]
fn test_cross_module_dependencies() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "analyze_cross_module_dependencies", json!({}));
    assert!(out.contains("Found 3 cross-module dependencies:"));
    assert!(out.contains("• App.Main → System.IO (1 calls)"));
    assert!(out.contains("• App.Parser → App.Lexer (1 calls)"));

    let filtered = success(
        &mut service,
        "analyze_cross_module_dependencies",
        json!({"module_pattern": "Lexer"}),
    );
    assert!(filtered.contains("App.Parser → App.Lexer"));
    assert!(!filtered.contains("System.IO"));

    let none = success(
        &mut service,
        "analyze_cross_module_dependencies",
        json!({"threshold": 2}),
    );
    assert_eq!(none, "No cross-module dependencies found matching criteria");
}

#[test]
fn test_cross_module_coupling_and_complexity() {
    let (mut service, _dir) = seeded_service();
    let coupling = success(
        &mut service,
        "analyze_cross_module_dependencies",
        json!({"analysis_type": "coupling"}),
    );
    assert!(coupling.contains("Total Modules: 4"));
    assert!(coupling.contains("Total Cross-Module Calls: 3"));
    assert!(coupling.contains("• App.Main:\n    Incoming: 0 calls\n    Outgoing: 2 calls"));

    let complexity = success(
        &mut service,
        "analyze_cross_module_dependencies",
        json!({"analysis_type": "complexity", "module_pattern": "Parser", "threshold": 8}),
    );
    assert!(complexity.contains("• parseExpr (in App.Parser)"));
    assert!(complexity.contains("Total Complexity: 8"));
    assert!(!complexity.contains("tokenize"));
}

#[test]
fn test_code_statistics() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_code_statistics", json!({"include_details": true}));
    assert!(out.contains("• Modules: 3"));
    assert!(out.contains("• Functions: 5"));
    assert!(out.contains("Functions with signatures: 4"));
    assert!(out.contains("• DATA: 2"));
}

#[test]
fn test_similar_functions() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "find_similar_functions",
        json!({"function_name": "parseTerm", "similarity_threshold": 0.5}),
    );
    assert!(out.contains("parseExpr"));
    assert!(!out.contains("- parseTerm"));
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[test]
fn test_type_details_with_constructors() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_type_details", json!({"type_name": "Expr"}));
    assert!(out.contains("Category: DATA"));
    assert!(out.contains("Constructors (2):"));
    assert!(out.contains("_ :: Expr"));
}

#[test]
fn test_type_dependency_tree() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "get_type_dependencies",
        json!({"type_name": "Expr", "include_dependents": true}),
    );
    assert!(out.contains("└─ Term [App.Parser]"));
    assert!(out.contains("Expr (recursive)"));
    assert!(out.contains("← Term"));
}

#[test]
fn test_type_dependency_graph_overview() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "build_type_dependency_graph", json!({}));
    assert!(out.contains("• Total types: 3"));
    assert!(out.contains("• Total dependencies: 3"));
    assert!(out.contains("• Expr (in App.Parser) - 2 dependencies"));
}

#[test]
fn test_list_types_by_category() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "list_types", json!({"type_category": "SUMTYPE"}));
    assert!(out.contains("Token"));
    assert!(!out.contains("Expr"));
}

#[test]
fn test_search_classes() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "search_classes", json!({"pattern": "Pret"}));
    assert!(out.contains("Pretty (in App.Parser)"));
}

#[test]
fn test_type_dependency_graph_root_outside_result_cap() {
    let (mut service, _dir) = capped_service(2);
    let out = success(
        &mut service,
        "build_type_dependency_graph",
        json!({"root_type": "Token"}),
    );
    assert!(out.contains("Dependencies for type 'Token'"));
    assert!(out.contains("Token [App.Lexer]"));

    let missing = call(
        &mut service,
        "build_type_dependency_graph",
        json!({"root_type": "Nope"}),
    );
    assert!(matches!(missing, ToolOutcome::NotFound(_)));
}

#[test]
fn test_class_details_with_instances() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_class_details", json!({"class_name": "Pretty"}));
    assert!(out.contains("Name: Pretty"));
    assert!(out.contains("Module: App.Parser"));
    assert!(out.contains("Instances (1 found):"));
    assert!(out.contains("• instance Pretty Expr (in App.Parser)"));
    assert!(out.contains("Signature: Pretty Expr"));

    let missing = call(&mut service, "get_class_details", json!({"class_name": "Show"}));
    assert!(matches!(missing, ToolOutcome::NotFound(ref t) if t.contains("Show")));
}

#[test]
fn test_type_usage_for_one_type() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "analyze_type_usage", json!({"type_name": "Token"}));
    assert!(out.contains("Category: SUMTYPE"));
    assert!(out.contains("Defined in: App.Lexer"));
    assert!(out.contains("Used in function signatures (1 functions):"));
    assert!(out.contains("• tokenize (in App.Lexer)"));
    assert!(out.contains("Referenced by 1 types"));

    // "Exprs" in parseExpr's signature is another type
    let expr = success(&mut service, "analyze_type_usage", json!({"type_name": "Expr"}));
    assert!(expr.contains("Not used in any function signature."));
}

#[test]
fn test_type_usage_overview_threshold() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "analyze_type_usage", json!({"usage_threshold": 1}));
    assert!(out.contains("Type Usage Analysis (3 types):"));
    assert!(out.contains("DATA: 2 types"));
    assert!(out.contains("• Token (in App.Lexer) - referenced by 1 types"));

    let parser_only = success(
        &mut service,
        "analyze_type_usage",
        json!({"module_name": "App.Parser"}),
    );
    assert!(!parser_only.contains("Token"));
}

#[test]
fn test_nested_types_stay_within_gateway() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "get_nested_types",
        json!({"type_names": ["Expr"], "gateway_name": "App.Parser"}),
    );
    assert!(out.contains("Found 2 type definitions:"));
    assert!(out.contains("data Expr = Add Expr Expr | Lit Term"));
    assert!(out.contains("data Term = Paren Expr"));
    assert!(!out.contains("Token"));

    let excluded = success(
        &mut service,
        "get_nested_types",
        json!({
            "type_names": ["Expr"],
            "gateway_name": "App",
            "exclude_pattern": "Term",
            "include_raw_definitions": false
        }),
    );
    assert!(excluded.contains("1. data Expr = Add Expr Expr | Lit Term"));
    assert!(excluded.contains("2. Token"));
    assert!(!excluded.contains("Paren"));

    let none = success(
        &mut service,
        "get_nested_types",
        json!({"type_names": ["Token"], "gateway_name": "App.Parser"}),
    );
    assert!(none.starts_with("No nested types found for [Token]"));
}

#[test]
fn test_type_relationships_with_reverse_dependencies() {
    let (mut service, _dir) = seeded_service();
    let out = success(
        &mut service,
        "analyze_type_relationships",
        json!({"type_name": "Term", "source_module": "App.Parser", "analysis_depth": 1}),
    );
    assert!(out.contains("Found 2 related types:"));
    assert!(out.contains("1. Term (in App.Parser)"));
    assert!(out.contains("→ Expr (in App.Parser)"));
    assert!(out.contains("No types found that depend on 'Term'"));

    let token = success(
        &mut service,
        "analyze_type_relationships",
        json!({"type_name": "Token", "source_module": "App.Lexer"}),
    );
    assert!(token.contains("Found 1 types that depend on 'Token':"));
    assert!(token.contains("• Expr (in App.Parser)"));
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

/// Adds an aliased external import and a hiding import to App.Main.
fn add_external_imports(service: &CodeService) {
    let db = service.db().unwrap();
    let main_mod = db.get_module_by_name("App.Main").unwrap().unwrap();
    let text = db.insert_import(main_mod.id, "Data.Text", Some("text"), true).unwrap();
    let prelude = db.insert_import(main_mod.id, "Prelude", Some("base"), false).unwrap();
    db.conn()
        .execute("UPDATE imports SET as_module_name = 'T' WHERE id = ?1", [text])
        .unwrap();
    db.conn()
        .execute("UPDATE imports SET is_hiding = 1 WHERE id = ?1", [prelude])
        .unwrap();
}

#[test]
fn test_analyze_imports_grouped_by_module() {
    let (mut service, _dir) = seeded_service();
    add_external_imports(&service);
    let out = success(&mut service, "analyze_imports", json!({}));
    assert!(out.contains("Import Analysis (4 imports found):"));
    assert!(out.contains("Module: App.Main (3 imports)"));
    assert!(out.contains("• Data.Text (from text) [qualified] as T"));
    assert!(out.contains("• Prelude (from base) [hiding]"));

    let lexer = success(&mut service, "analyze_imports", json!({"import_pattern": "Lexer"}));
    assert!(lexer.contains("Module: App.Parser (1 imports)"));
    assert!(!lexer.contains("App.Main"));
}

#[test]
fn test_import_details_sections() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_import_details", json!({"module_name": "App.Parser"}));
    assert!(out.contains("Import Details for Module 'App.Parser' (1 imports):"));
    assert!(out.contains("Internal Imports (1):\n  • App.Lexer"));
    assert!(!out.contains("External Imports"));

    add_external_imports(&service);
    let main = success(&mut service, "get_import_details", json!({"module_name": "App.Main"}));
    assert!(main.contains("External Imports (2):"));
    assert!(main.contains("• Data.Text (from text) as T"));
    assert!(main.contains("Qualified Imports (2):"));
    assert!(main.contains("• Prelude hiding"));

    let missing = call(&mut service, "get_import_details", json!({"module_name": "App.Nope"}));
    assert!(matches!(missing, ToolOutcome::NotFound(_)));
}

#[test]
fn test_import_graph_from_root() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_import_graph", json!({"root_module": "App.Main"}));
    assert!(out.contains("Import Graph starting from 'App.Main':"));
    assert!(out.contains("└─ App.Parser [app]"));
    assert!(out.contains("  └─ App.Lexer [app]"));

    let shallow = success(
        &mut service,
        "get_import_graph",
        json!({"root_module": "App.Main", "depth": 1}),
    );
    assert!(!shallow.contains("App.Lexer"));
}

#[test]
fn test_import_graph_overview_skips_external_by_default() {
    let (mut service, _dir) = seeded_service();
    add_external_imports(&service);
    let out = success(&mut service, "get_import_graph", json!({}));
    assert!(out.contains("Import Graph Overview (2 imports of 2 modules):"));
    assert!(out.contains("• App.Parser: imported 1 times"));
    assert!(!out.contains("Data.Text"));

    let all = success(&mut service, "get_import_graph", json!({"include_external": true}));
    assert!(all.contains("• Data.Text: imported 1 times"));
}

#[test]
fn test_find_unused_imports_flags_structural_reasons() {
    let (mut service, _dir) = seeded_service();
    let clean = success(&mut service, "find_unused_imports", json!({}));
    assert!(clean.contains("No obviously suspicious imports found."));

    add_external_imports(&service);
    let out = success(&mut service, "find_unused_imports", json!({"module_name": "App.Main"}));
    assert!(out.contains("Found 2 potentially unused imports:"));
    assert!(out.contains("Import: Data.Text (from text)"));
    assert!(out.contains("- qualified import (needs usage verification)"));
    assert!(out.contains("- hiding import (check if necessary)"));
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// Places parseExpr at lines 10-20 and Expr at lines 3-5 of Parser.hs.
fn add_source_spans(service: &CodeService) {
    let db = service.db().unwrap();
    let parse_expr = db
        .get_entity_by_name(EntityKind::Function, "parseExpr", None)
        .unwrap()
        .remove(0);
    let expr = db.get_entity_by_name(EntityKind::Type, "Expr", None).unwrap().remove(0);
    db.set_source_span(EntityKind::Function, parse_expr.id, "src/App/Parser.hs:10", 10, 20)
        .unwrap();
    db.set_source_span(EntityKind::Type, expr.id, "src/App/Parser.hs:3", 3, 5)
        .unwrap();
}

#[test]
fn test_find_element_by_location() {
    let (mut service, _dir) = seeded_service();
    add_source_spans(&service);

    let out = success(
        &mut service,
        "find_element_by_location",
        json!({"file_path": "/repo/src/App/Parser.hs", "line_number": 12, "base_directory": "/repo"}),
    );
    assert!(out.contains("• Function: parseExpr"));
    assert!(out.contains("Description: Config -> ParseState -> Either Error Exprs"));
    assert!(out.contains("Location: src/App/Parser.hs:10"));
    assert!(!out.contains("Type: Expr"));

    let types_only = success(
        &mut service,
        "find_element_by_location",
        json!({"file_path": "src/App/Parser.hs", "line_number": 4, "element_types": ["type"]}),
    );
    assert!(types_only.contains("• Type: Expr"));

    let nothing = success(
        &mut service,
        "find_element_by_location",
        json!({"file_path": "src/App/Lexer.hs", "line_number": 12}),
    );
    assert_eq!(nothing, "No code elements found at src/App/Lexer.hs:12");
}

#[test]
fn test_location_context_within_radius() {
    let (mut service, _dir) = seeded_service();
    add_source_spans(&service);

    let out = success(
        &mut service,
        "get_location_context",
        json!({"file_path": "./src/App/Parser.hs", "line_number": 7}),
    );
    assert!(out.contains("=== Function Context ===\nFunction: parseExpr"));
    assert!(out.contains("Local Functions Used (1):\n  • parseTerm"));
    assert!(out.contains("External Functions Used (1):\n  • tokenize (from App.Lexer)"));
    assert!(out.contains("=== Type Context ===\nType: Expr"));
    assert!(out.contains("  data Expr = Add Expr Expr | Lit Term"));

    let far = success(
        &mut service,
        "get_location_context",
        json!({"file_path": "src/App/Parser.hs", "line_number": 40, "context_radius": 2}),
    );
    assert!(far.contains("No code elements found at this location."));
}

#[test]
fn test_function_context_local_and_external() {
    let (mut service, _dir) = seeded_service();
    let out = success(&mut service, "get_function_context", json!({"function_name": "parseExpr"}));
    assert!(out.contains("Complete Context for Function 'parseExpr':"));
    assert!(out.contains("=== Local Functions Used (1) ===\n• parseTerm :: ParseState -> Either Error Term"));
    assert!(out.contains("=== External Functions Used (1) ===\n• tokenize (from App.Lexer)"));

    let tokenize = success(&mut service, "get_function_context", json!({"function_name": "tokenize"}));
    assert!(tokenize.contains("=== Local Types Used (1) ===\n• Token (SUMTYPE)"));

    let local_only = success(
        &mut service,
        "get_function_context",
        json!({"function_name": "parseExpr", "include_external_references": false}),
    );
    assert!(!local_only.contains("tokenize"));
}

// ---------------------------------------------------------------------------
// Partial data and store failures
// ---------------------------------------------------------------------------

#[test]
fn test_missing_dependency_table_is_reported_not_failed() {
    let (db_path, _dir) = seeded_db_file();
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute("DROP TABLE type_dependencies", []).unwrap();
    }
    let mut service = CodeService::new(config_for(&db_path));
    service.initialize().unwrap();

    let out = success(&mut service, "get_type_dependencies", json!({"type_name": "Expr"}));
    assert!(out.contains("not available"));

    let stats = success(&mut service, "get_code_statistics", json!({}));
    assert!(!stats.contains("Type dependencies"));
}

#[test]
fn test_uninitialized_service_recovers_on_first_call() {
    let (db_path, _dir) = seeded_db_file();
    let mut service = CodeService::new(config_for(&db_path));
    assert!(!service.is_initialized());

    let out = success(&mut service, "list_modules", json!({}));
    assert!(out.contains("App.Parser"));
    assert!(service.is_initialized());
}

#[test]
fn test_missing_database_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let mut service = CodeService::new(config_for(&dir.path().join("absent.db")));
    let outcome = call(&mut service, "list_modules", json!({}));
    assert!(matches!(outcome, ToolOutcome::Unavailable(_)));
    assert!(outcome.is_error());
}

// ---------------------------------------------------------------------------
// JSON-RPC server
// ---------------------------------------------------------------------------

#[test]
fn test_server_initialize_and_list() {
    let (service, _dir) = seeded_service();
    let mut server = McpServer::new(service);

    let init = rpc(&mut server, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}));
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "fdep-mcp");

    let listed = rpc(&mut server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
    assert_eq!(listed["result"]["tools"].as_array().unwrap().len(), 38);
}

#[test]
fn test_server_notification_gets_no_response() {
    let (service, _dir) = seeded_service();
    let mut server = McpServer::new(service);
    let msg = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    assert!(server.handle_line(&msg.to_string()).is_none());
}

#[test]
fn test_server_tool_failure_is_result_not_error() {
    let (service, _dir) = seeded_service();
    let mut server = McpServer::new(service);
    let resp = rpc(
        &mut server,
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "get_type_details", "arguments": {"type_name": "Nope"}}
        }),
    );
    assert!(resp.get("error").is_none());
    assert_eq!(resp["result"]["isError"], true);
    assert_eq!(resp["result"]["content"][0]["text"], "Type not found: Nope");
}

#[test]
fn test_server_protocol_errors() {
    let (service, _dir) = seeded_service();
    let mut server = McpServer::new(service);

    let parse = server.handle_line("{not json").unwrap();
    let parse: Value = serde_json::from_str(&parse).unwrap();
    assert_eq!(parse["error"]["code"], -32700);

    let unknown = rpc(&mut server, json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}));
    assert_eq!(unknown["error"]["code"], -32601);

    let no_name = rpc(
        &mut server,
        json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {}}),
    );
    assert_eq!(no_name["error"]["code"], -32602);

    let stats = server.server_stats_json();
    assert_eq!(stats["errors"], 3);
}

#[test]
fn test_server_answers_non_utf8_line_and_continues() {
    let (service, _dir) = seeded_service();
    let mut server = McpServer::new(service);

    let bad = server
        .handle_bytes(b"{\"jsonrpc\": \"2.0\", \"id\": 1, \"method\": \"\xff\"}\n")
        .expect("expected a parse error response");
    let bad: Value = serde_json::from_str(&bad).unwrap();
    assert_eq!(bad["error"]["code"], -32700);
    assert!(bad["id"].is_null());

    assert!(server.handle_bytes(b"  \n").is_none());

    let ping = server
        .handle_bytes(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string().as_bytes())
        .unwrap();
    let ping: Value = serde_json::from_str(&ping).unwrap();
    assert_eq!(ping["id"], 2);
    assert!(ping.get("error").is_none());
}

#[test]
fn test_server_truncates_long_output() {
    let (db_path, _dir) = seeded_db_file();
    let config = ServerConfig {
        max_response_chars: 20,
        ..config_for(&db_path)
    };
    let mut service = CodeService::new(config);
    service.initialize().unwrap();
    let mut server = McpServer::new(service);

    let resp = rpc(
        &mut server,
        json!({
            "jsonrpc": "2.0", "id": 6, "method": "tools/call",
            "params": {"name": "list_modules"}
        }),
    );
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.ends_with("[... truncated at 20 chars]"));
}
