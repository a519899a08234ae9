//! MCP tool definitions and dispatch.
//!
//! Every tool declares a JSON Schema for its arguments. Arguments are
//! validated against it before the handler runs, and every handler result is
//! turned into a [`ToolOutcome`] so that failures reach the client as text
//! instead of aborting the session.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::args::{validate_arguments, Args};
use super::handlers::{analysis, context, functions, imports, modules, queries, type_system};
use crate::errors::{FdepError, Result};
use crate::query::Operator;
use crate::service::CodeService;

/// Default maximum character length for a tool response before truncation.
pub const MAX_RESPONSE_CHARS: usize = 15_000;

/// A tool definition exposed by the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    NotFound(String),
    /// Arguments or conditions were rejected.
    Invalid(String),
    /// The store could not be reached, even after recovery.
    Unavailable(String),
}

impl ToolOutcome {
    /// Classifies a handler error.
    pub fn from_error(error: FdepError) -> Self {
        match error {
            FdepError::NotFound { .. } => ToolOutcome::NotFound(error.to_string()),
            FdepError::Validation { ref message } => {
                ToolOutcome::Invalid(format!("Invalid arguments: {message}"))
            }
            FdepError::UnsupportedEntity { .. } | FdepError::Json(_) => {
                ToolOutcome::Invalid(format!("Invalid arguments: {error}"))
            }
            other => ToolOutcome::Unavailable(format!("Error: {other}")),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ToolOutcome::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(t)
            | ToolOutcome::NotFound(t)
            | ToolOutcome::Invalid(t)
            | ToolOutcome::Unavailable(t) => t,
        }
    }

    /// MCP `tools/call` result: one text block, `isError` on failure.
    pub fn into_content(self, max_chars: usize) -> Value {
        let is_error = self.is_error();
        json!({
            "content": [{ "type": "text", "text": truncate_response(self.text(), max_chars) }],
            "isError": is_error,
        })
    }
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

fn build_tool_definitions() -> Vec<ToolDefinition> {
    let formats = json!(["tree", "graph", "flat"]);
    let categories = json!(type_system::TYPE_CATEGORIES);
    let operators: Vec<&str> = Operator::ALL.iter().map(|op| op.as_str()).collect();

    vec![
        // -- Modules -------------------------------------------------------
        tool(
            "list_modules",
            "List the modules in the codebase.",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "default": 100, "description": "Maximum number of modules to return" }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "search_modules",
            "Search modules by name pattern. '*' is a wildcard; plain text matches as a substring.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Module name pattern" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "required": ["pattern"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_module_details",
            "Entity counts and a sample of functions for one module.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string", "description": "Exact module name" }
                },
                "required": ["module_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_functions_by_module",
            "List the functions defined in a module.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 100 },
                    "include_signatures": { "type": "boolean", "default": false }
                },
                "required": ["module_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_module_dependencies",
            "Imports of a module and, optionally, the modules importing it.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "include_imports": { "type": "boolean", "default": true },
                    "include_dependents": { "type": "boolean", "default": false }
                },
                "required": ["module_name"],
                "additionalProperties": false
            }),
        ),
        // -- Functions -----------------------------------------------------
        tool(
            "get_function_details",
            "Signature, module and location of every function with the given name.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string", "description": "Restrict to this module" }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "search_functions",
            "Search functions by name pattern. '*' is a wildcard; plain text matches as a substring.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "required": ["pattern"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_most_called_functions",
            "Functions ranked by number of call sites.",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "default": 20 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_function_callers",
            "Functions that call the given function.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_function_callees",
            "Functions called by the given function.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_function_call_graph",
            "Direct callers and the callee tree of a function.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "depth": { "type": "integer", "minimum": 0, "default": 2 },
                    "include_callers": { "type": "boolean", "default": true },
                    "include_callees": { "type": "boolean", "default": true }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "enhanced_function_call_graph",
            "Call graph of a function rendered as a tree, a flat list or a node/edge listing, with optional module filters.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "max_depth": { "type": "integer", "minimum": 0, "default": 3 },
                    "graph_format": { "type": "string", "enum": formats.clone(), "default": "tree" },
                    "include_signatures": { "type": "boolean", "default": false },
                    "filter_modules": {
                        "type": "array",
                        "items": { "type": "string" },
                        "default": [],
                        "description": "Only show callees whose module contains one of these substrings"
                    }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "find_cross_module_calls",
            "Calls whose caller and callee live in different modules.",
            json!({
                "type": "object",
                "properties": {
                    "source_module": { "type": "string", "description": "Caller module pattern" },
                    "target_module": { "type": "string", "description": "Callee module pattern" },
                    "limit": { "type": "integer", "minimum": 1, "default": 100 }
                },
                "additionalProperties": false
            }),
        ),
        // -- Queries -------------------------------------------------------
        tool(
            "execute_query",
            "Count and list entities of one kind filtered by name pattern and module id.",
            json!({
                "type": "object",
                "properties": {
                    "query_type": { "type": "string", "enum": ["modules", "functions", "types", "imports"] },
                    "filters": {
                        "type": "object",
                        "properties": {
                            "name_pattern": { "type": "string" },
                            "module_id": { "type": "integer" },
                            "limit": { "type": "integer", "minimum": 1, "default": 100 }
                        },
                        "additionalProperties": false,
                        "default": {}
                    }
                },
                "required": ["query_type"],
                "additionalProperties": false
            }),
        ),
        tool(
            "execute_advanced_query",
            "Query any entity kind with a list of field conditions combined with AND.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "object",
                        "properties": {
                            "type": { "type": "string", "enum": ["function", "module", "type", "class", "import", "instance"] },
                            "conditions": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "field": { "type": "string" },
                                        "operator": { "type": "string", "enum": operators },
                                        "value": {}
                                    }
                                },
                                "default": []
                            },
                            "limit": { "type": "integer", "minimum": 1, "default": 100 }
                        },
                        "required": ["type"],
                        "additionalProperties": false
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        ),
        // -- Analysis ------------------------------------------------------
        tool(
            "analyze_function_complexity",
            "Rank functions by a heuristic complexity score (signature size, arrows, call fan-out, local definitions).",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "min_complexity": { "type": "integer", "minimum": 0, "default": 5 },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_code_statistics",
            "Entity counts for the whole codebase.",
            json!({
                "type": "object",
                "properties": {
                    "include_details": { "type": "boolean", "default": false }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "find_similar_functions",
            "Functions whose signatures resemble the given function's signature.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "similarity_threshold": { "type": "number", "minimum": 0, "maximum": 1, "default": 0.7 },
                    "limit": { "type": "integer", "minimum": 1, "default": 10 }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "group_similar_functions",
            "Partition functions into groups of similar signatures.",
            json!({
                "type": "object",
                "properties": {
                    "similarity_threshold": { "type": "number", "minimum": 0, "maximum": 1, "default": 0.7 },
                    "module_pattern": { "type": "string" },
                    "min_group_size": { "type": "integer", "minimum": 2, "default": 2 },
                    "limit": { "type": "integer", "minimum": 1, "default": 10 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "analyze_cross_module_dependencies",
            "Cross-module calls aggregated per module pair, coupling per module, or the most complex functions of matching modules.",
            json!({
                "type": "object",
                "properties": {
                    "analysis_type": { "type": "string", "enum": analysis::COUPLING_ANALYSES, "default": "dependencies" },
                    "module_pattern": { "type": "string" },
                    "include_metrics": { "type": "boolean", "default": true },
                    "threshold": { "type": "integer", "minimum": 0, "default": 1, "description": "Minimum calls, coupling total or complexity score" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "additionalProperties": false
            }),
        ),
        // -- Types and classes --------------------------------------------
        tool(
            "list_types",
            "List types, optionally by module, name pattern and category.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "pattern": { "type": "string" },
                    "type_category": { "type": "string", "enum": categories.clone() },
                    "limit": { "type": "integer", "minimum": 1, "default": 100 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "search_types",
            "Search types by name pattern.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "module_pattern": { "type": "string" },
                    "type_category": { "type": "string", "enum": categories },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "required": ["pattern"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_type_details",
            "Definition of a type with its constructors and fields.",
            json!({
                "type": "object",
                "properties": {
                    "type_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "include_constructors": { "type": "boolean", "default": true },
                    "include_fields": { "type": "boolean", "default": true }
                },
                "required": ["type_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_type_dependencies",
            "Types a type refers to, as a bounded graph, and optionally the types referring to it.",
            json!({
                "type": "object",
                "properties": {
                    "type_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "include_dependents": { "type": "boolean", "default": false },
                    "depth": { "type": "integer", "minimum": 0, "default": 2 },
                    "graph_format": { "type": "string", "enum": formats.clone(), "default": "tree" }
                },
                "required": ["type_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "build_type_dependency_graph",
            "Whole-codebase type dependency graph: statistics, or the subgraph of one root type.",
            json!({
                "type": "object",
                "properties": {
                    "root_type": { "type": "string" },
                    "module_pattern": { "type": "string", "description": "Only show types whose module contains this substring" },
                    "max_depth": { "type": "integer", "minimum": 0, "default": 3 },
                    "graph_format": { "type": "string", "enum": formats.clone(), "default": "tree" }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "list_classes",
            "List type classes, optionally within one module.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 100 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "search_classes",
            "Search type classes by name pattern.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "required": ["pattern"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_class_details",
            "Definition of a type class and the instances that mention it.",
            json!({
                "type": "object",
                "properties": {
                    "class_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "include_instances": { "type": "boolean", "default": true }
                },
                "required": ["class_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "analyze_type_usage",
            "Functions whose signatures use a type, or types per category with how many types refer to them.",
            json!({
                "type": "object",
                "properties": {
                    "type_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "usage_threshold": { "type": "integer", "minimum": 0, "default": 0, "description": "Overview only: minimum number of referring types" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_nested_types",
            "Definitions of the given types and every type they depend on within modules whose name contains gateway_name.",
            json!({
                "type": "object",
                "properties": {
                    "type_names": { "type": "array", "items": { "type": "string" } },
                    "gateway_name": { "type": "string", "description": "Substring of the module names to stay within" },
                    "exclude_pattern": { "type": "string", "description": "Skip types whose name matches this pattern" },
                    "include_raw_definitions": { "type": "boolean", "default": true }
                },
                "required": ["type_names", "gateway_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "analyze_type_relationships",
            "Types reachable from a type with their direct dependencies, and the types outside that set depending on it.",
            json!({
                "type": "object",
                "properties": {
                    "type_name": { "type": "string" },
                    "source_module": { "type": "string" },
                    "analysis_depth": { "type": "integer", "minimum": 0, "default": 2 },
                    "include_dependents": { "type": "boolean", "default": true },
                    "module_filter": { "type": "string", "description": "Only follow types whose module contains this substring" }
                },
                "required": ["type_name", "source_module"],
                "additionalProperties": false
            }),
        ),
        // -- Imports ------------------------------------------------------
        tool(
            "analyze_imports",
            "Imports grouped by importing module, optionally for one module or matching imported modules.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "import_pattern": { "type": "string" },
                    "include_qualified": { "type": "boolean", "default": true },
                    "limit": { "type": "integer", "minimum": 1, "default": 100 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "find_unused_imports",
            "Imports worth reviewing: aliased qualified imports, hiding imports and imports of modules outside the codebase.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "package_pattern": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "default": 100 }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_import_details",
            "Imports of one module split into internal, external, qualified and hiding imports.",
            json!({
                "type": "object",
                "properties": {
                    "module_name": { "type": "string" },
                    "include_source_info": { "type": "boolean", "default": true }
                },
                "required": ["module_name"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_import_graph",
            "Module import graph from a root module, or the most imported modules.",
            json!({
                "type": "object",
                "properties": {
                    "root_module": { "type": "string" },
                    "depth": { "type": "integer", "minimum": 0, "default": 3 },
                    "include_external": { "type": "boolean", "default": false },
                    "graph_format": { "type": "string", "enum": formats, "default": "tree" },
                    "limit": { "type": "integer", "minimum": 1, "default": 50 }
                },
                "additionalProperties": false
            }),
        ),
        // -- Source locations ---------------------------------------------
        tool(
            "find_element_by_location",
            "Functions, types, classes and imports whose line span contains a line of a file.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "line_number": { "type": "integer", "minimum": 1 },
                    "base_directory": { "type": "string", "description": "Prefix to strip from file_path" },
                    "element_types": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["function", "type", "class", "import", "all"] },
                        "default": ["all"]
                    }
                },
                "required": ["file_path", "line_number"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_location_context",
            "The function, type, class and import nearest a line of a file, with what the function uses.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "line_number": { "type": "integer", "minimum": 1 },
                    "context_radius": { "type": "integer", "minimum": 0, "default": 5 },
                    "include_dependencies": { "type": "boolean", "default": true }
                },
                "required": ["file_path", "line_number"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_function_context",
            "A function with the functions it calls and the types its signature names, split into local and external.",
            json!({
                "type": "object",
                "properties": {
                    "function_name": { "type": "string" },
                    "module_name": { "type": "string" },
                    "include_local_definitions": { "type": "boolean", "default": true },
                    "include_external_references": { "type": "boolean", "default": true }
                },
                "required": ["function_name"],
                "additionalProperties": false
            }),
        ),
    ]
}

/// Returns the list of all tool definitions exposed by this MCP server.
pub fn get_tool_definitions() -> &'static [ToolDefinition] {
    static TOOLS: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    TOOLS.get_or_init(build_tool_definitions)
}

fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    get_tool_definitions().iter().find(|t| t.name == name)
}

fn dispatch(service: &CodeService, tool_name: &str, args: &Args) -> Result<String> {
    match tool_name {
        "list_modules" => modules::list_modules(service, args),
        "search_modules" => modules::search_modules(service, args),
        "get_module_details" => modules::get_module_details(service, args),
        "get_functions_by_module" => modules::get_functions_by_module(service, args),
        "get_module_dependencies" => modules::get_module_dependencies(service, args),
        "get_function_details" => functions::get_function_details(service, args),
        "search_functions" => functions::search_functions(service, args),
        "get_most_called_functions" => functions::get_most_called_functions(service, args),
        "get_function_callers" => functions::get_function_callers(service, args),
        "get_function_callees" => functions::get_function_callees(service, args),
        "get_function_call_graph" => functions::get_function_call_graph(service, args),
        "enhanced_function_call_graph" => functions::enhanced_function_call_graph(service, args),
        "find_cross_module_calls" => functions::find_cross_module_calls(service, args),
        "execute_query" => queries::execute_query(service, args),
        "execute_advanced_query" => queries::execute_advanced_query(service, args),
        "analyze_function_complexity" => analysis::analyze_function_complexity(service, args),
        "get_code_statistics" => analysis::get_code_statistics(service, args),
        "find_similar_functions" => analysis::find_similar_functions(service, args),
        "group_similar_functions" => analysis::group_similar_functions(service, args),
        "list_types" => type_system::list_types(service, args),
        "search_types" => type_system::search_types(service, args),
        "get_type_details" => type_system::get_type_details(service, args),
        "get_type_dependencies" => type_system::get_type_dependencies(service, args),
        "build_type_dependency_graph" => type_system::build_type_dependency_graph(service, args),
        "list_classes" => type_system::list_classes(service, args),
        "search_classes" => type_system::search_classes(service, args),
        "get_class_details" => type_system::get_class_details(service, args),
        "analyze_type_usage" => type_system::analyze_type_usage(service, args),
        "get_nested_types" => type_system::get_nested_types(service, args),
        "analyze_type_relationships" => type_system::analyze_type_relationships(service, args),
        "analyze_cross_module_dependencies" => analysis::analyze_cross_module_dependencies(service, args),
        "analyze_imports" => imports::analyze_imports(service, args),
        "find_unused_imports" => imports::find_unused_imports(service, args),
        "get_import_details" => imports::get_import_details(service, args),
        "get_import_graph" => imports::get_import_graph(service, args),
        "find_element_by_location" => context::find_element_by_location(service, args),
        "get_location_context" => context::get_location_context(service, args),
        "get_function_context" => context::get_function_context(service, args),
        _ => Err(FdepError::validation(format!("unknown tool: {tool_name}"))),
    }
}

/// Validates the arguments and runs one tool.
///
/// A store failure triggers one [`CodeService::recover`] and one retry
/// before it is reported.
pub fn handle_tool_call(service: &mut CodeService, tool_name: &str, args: Value) -> ToolOutcome {
    let definition = match find_tool(tool_name) {
        Some(d) => d,
        None => return ToolOutcome::Invalid(format!("Unknown tool: {tool_name}")),
    };
    let args = match validate_arguments(&definition.input_schema, args) {
        Ok(a) => a,
        Err(e) => return ToolOutcome::from_error(e),
    };
    debug!(tool = tool_name, "dispatching tool call");

    match dispatch(service, tool_name, &args) {
        Ok(text) => ToolOutcome::Success(text),
        Err(e) if e.is_upstream() => {
            warn!(tool = tool_name, error = %e, "store failure, recovering session");
            if let Err(recover_err) = service.recover() {
                return ToolOutcome::Unavailable(format!(
                    "Error: {e} (recovery failed: {recover_err})"
                ));
            }
            match dispatch(service, tool_name, &args) {
                Ok(text) => ToolOutcome::Success(text),
                Err(e) => ToolOutcome::from_error(e),
            }
        }
        Err(e) => ToolOutcome::from_error(e),
    }
}

/// Truncates a string to `max_chars` bytes on a char boundary, appending a
/// truncation notice if necessary.
pub fn truncate_response(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        s.to_string()
    } else {
        let mut end = max_chars;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}\n\n[... truncated at {} chars]", &s[..end], end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definitions_complete() {
        let tools = get_tool_definitions();
        assert_eq!(tools.len(), 38);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "execute_advanced_query",
            "enhanced_function_call_graph",
            "group_similar_functions",
            "get_import_graph",
            "find_element_by_location",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_tool_definitions_have_schemas() {
        for tool in get_tool_definitions() {
            assert!(!tool.description.is_empty());
            assert_eq!(tool.input_schema["type"], "object");
            assert_eq!(tool.input_schema["additionalProperties"], false);
        }
    }

    #[test]
    fn test_every_tool_is_dispatched() {
        let service = CodeService::new(Default::default());
        for tool in get_tool_definitions() {
            let err = dispatch(&service, &tool.name, &Args::default()).unwrap_err();
            assert!(
                !matches!(err, FdepError::Validation { ref message } if message.starts_with("unknown tool")),
                "{} has no handler",
                tool.name
            );
        }
    }

    #[test]
    fn test_truncate_long_response() {
        let long = "x".repeat(20_000);
        let result = truncate_response(&long, MAX_RESPONSE_CHARS);
        assert!(result.contains("[... truncated at 15000 chars]"));
        assert_eq!(truncate_response("short", MAX_RESPONSE_CHARS), "short");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let s = "é".repeat(10);
        let result = truncate_response(&s, 5);
        assert!(result.starts_with("éé"));
        assert!(result.contains("truncated at 4 chars"));
    }

    #[test]
    fn test_outcome_classification() {
        assert!(matches!(
            ToolOutcome::from_error(FdepError::not_found("Module", "X")),
            ToolOutcome::NotFound(ref t) if t == "Module not found: X"
        ));
        assert!(matches!(
            ToolOutcome::from_error(FdepError::validation("bad")),
            ToolOutcome::Invalid(_)
        ));
        assert!(ToolOutcome::Unavailable("x".into()).is_error());
        assert!(!ToolOutcome::Success("x".into()).is_error());
    }
}
