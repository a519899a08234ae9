use std::fmt::Write as _;

use super::{in_module, name_matches, parse_format, resolve_function, resolve_functions, search_pattern};
use crate::db::function_node_id;
use crate::errors::Result;
use crate::graph::render;
use crate::mcp::args::Args;
use crate::service::CodeService;
use crate::types::{EntityKind, GraphFormat, RenderOptions};

const NO_CALL_DATA: &str = "Function call data is not available in this database.";

pub fn get_function_details(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let functions = resolve_functions(db, name, args.str("module_name"))?;

    let mut out = format!("Found {} function(s) named '{}':\n\n", functions.len(), name);
    for f in &functions {
        let _ = writeln!(out, "Function: {}", f.name);
        let _ = writeln!(out, "Module: {}", f.module.as_deref().unwrap_or("Unknown"));
        let _ = writeln!(out, "Signature: {}", f.detail.as_deref().unwrap_or("No signature"));
        let _ = writeln!(out, "Source Location: {}", f.location.as_deref().unwrap_or("Unknown"));
        out.push_str("---\n");
    }
    Ok(out)
}

pub fn search_functions(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let pattern = args.required_str("pattern")?;
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let functions = db.run_predicate_query(
        EntityKind::Function,
        &name_matches(EntityKind::Function, pattern)?,
        limit,
    )?;

    if functions.is_empty() {
        return Ok(format!("No functions found matching pattern: {pattern}"));
    }

    let mut out = format!("Found {} functions matching '{}':\n\n", functions.len(), pattern);
    for f in &functions {
        let _ = writeln!(out, "- {}{}", f.name, in_module(f));
    }
    Ok(out)
}

pub fn get_most_called_functions(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    if !db.has_table("function_calls")? {
        return Ok(NO_CALL_DATA.to_string());
    }
    let limit = service.clamp_limit(args.usize_or("limit", 20));
    let counts = db.get_most_called(limit)?;

    if counts.is_empty() {
        return Ok("No function call data found".to_string());
    }

    let mut out = format!("Top {} most called functions:\n\n", counts.len());
    for (i, c) in counts.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} - {} calls (in {})",
            i + 1,
            c.name,
            c.calls,
            c.module_name.as_deref().unwrap_or("Unknown")
        );
    }
    Ok(out)
}

pub fn get_function_callers(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let target = resolve_function(db, name, args.str("module_name"))?;
    if !db.has_table("function_calls")? {
        return Ok(NO_CALL_DATA.to_string());
    }
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let callers = db.get_callers(&target, limit)?;

    if callers.is_empty() {
        return Ok(format!("No callers found for function: {}", target.name));
    }

    let mut out = format!(
        "Functions that call '{}' ({} found):\n\n",
        target.name,
        callers.len()
    );
    for c in &callers {
        let _ = writeln!(out, "- {}{}", c.name, in_module(c));
    }
    Ok(out)
}

pub fn get_function_callees(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let target = resolve_function(db, name, args.str("module_name"))?;
    if !db.has_table("function_calls")? {
        return Ok(NO_CALL_DATA.to_string());
    }
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let callees = db.get_callees(target.id, limit)?;

    if callees.is_empty() {
        return Ok(format!("Function '{}' makes no recorded calls", target.name));
    }

    let mut out = format!(
        "Functions called by '{}' ({} found):\n\n",
        target.name,
        callees.len()
    );
    for c in &callees {
        let _ = write!(out, "- {}", c.name);
        if let Some(ref m) = c.module_name {
            let _ = write!(out, " (in {m})");
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn get_function_call_graph(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let target = resolve_function(db, name, args.str("module_name"))?;
    let depth = service.clamp_depth(args.usize_or("depth", 2));
    let include_callers = args.bool_or("include_callers", true);
    let include_callees = args.bool_or("include_callees", true);

    let mut out = format!("Call Graph for '{}'{}:\n\n", target.name, in_module(&target));
    if !db.has_table("function_calls")? {
        out.push_str(NO_CALL_DATA);
        out.push('\n');
        return Ok(out);
    }

    if include_callers {
        let callers = db.get_callers(&target, service.config().max_results)?;
        if callers.is_empty() {
            out.push_str("No callers found.\n\n");
        } else {
            let _ = writeln!(out, "Called by ({} functions):", callers.len());
            for c in &callers {
                let _ = writeln!(out, "  ← {}{}", c.name, in_module(c));
            }
            out.push('\n');
        }
    }

    if include_callees {
        let graph = db.get_call_graph(target.id, depth, service.config().max_results)?;
        if graph.edge_count() == 0 {
            out.push_str("No callees found.\n");
        } else {
            let _ = writeln!(out, "Calls (depth {depth}):");
            let options = RenderOptions {
                depth,
                format: GraphFormat::Tree,
                ..Default::default()
            };
            out.push_str(&render(&graph, Some(function_node_id(target.id).as_str()), &options));
        }
    }

    Ok(out)
}

pub fn enhanced_function_call_graph(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let target = resolve_function(db, name, args.str("module_name"))?;
    let depth = service.clamp_depth(args.usize_or("max_depth", 3));
    let options = RenderOptions {
        depth,
        format: parse_format(args.str("graph_format")),
        module_filters: args.str_list("filter_modules"),
        include_signatures: args.bool_or("include_signatures", false),
    };

    let graph = db.get_call_graph(target.id, depth, service.config().max_results)?;
    let mut out = format!(
        "Enhanced Call Graph for '{}' (depth: {}, format: {}):\n\n",
        target.name,
        depth,
        options.format.as_str()
    );
    out.push_str(&render(&graph, Some(function_node_id(target.id).as_str()), &options));
    Ok(out)
}

pub fn find_cross_module_calls(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    if !db.has_table("function_calls")? {
        return Ok(NO_CALL_DATA.to_string());
    }
    let source = args.str("source_module").map(search_pattern);
    let target = args.str("target_module").map(search_pattern);
    let limit = service.clamp_limit(args.usize_or("limit", 100));
    let calls = db.get_cross_module_calls(source.as_deref(), target.as_deref(), limit)?;

    if calls.is_empty() {
        return Ok("No cross-module function calls found matching the specified criteria".to_string());
    }

    let mut out = format!("Cross-Module Function Calls ({} found):\n\n", calls.len());
    for c in &calls {
        let _ = writeln!(
            out,
            "- {}.{} → {}.{}",
            c.caller_module, c.caller_name, c.target_module, c.target_name
        );
    }
    Ok(out)
}
