//! Source-location lookups and the context of a single function.

use std::collections::HashSet;
use std::fmt::Write as _;

use super::{in_module, resolve_function};
use crate::analysis::signature::type_names;
use crate::db::Database;
use crate::errors::Result;
use crate::mcp::args::Args;
use crate::service::CodeService;
use crate::types::{CallRecord, EntityKind, EntityRecord};

/// Kinds `find_element_by_location` reports, in report order.
const LOCATED_KINDS: [EntityKind; 4] = [
    EntityKind::Function,
    EntityKind::Type,
    EntityKind::Class,
    EntityKind::Import,
];

/// Entries listed per section by `get_location_context`.
const CONTEXT_PREVIEW: usize = 5;

/// `file_path` as it appears in stored source locations: without the
/// `base_directory` prefix and without a leading `./` or `/`.
pub fn relative_path<'a>(file_path: &'a str, base_directory: Option<&str>) -> &'a str {
    let path = base_directory
        .and_then(|base| file_path.strip_prefix(base))
        .unwrap_or(file_path);
    path.trim_start_matches("./").trim_start_matches('/')
}

/// Functions and types a function refers to, split by whether they are
/// defined in the function's own module.
#[derive(Debug, Default)]
pub struct FunctionContext {
    pub local_functions: Vec<EntityRecord>,
    pub external_functions: Vec<CallRecord>,
    pub local_types: Vec<EntityRecord>,
    pub external_types: Vec<EntityRecord>,
}

/// Collects the callees of `function` and the stored types its signature
/// names. A type name defined in several modules resolves to the one in the
/// function's module when there is one.
pub fn function_context(db: &Database, function: &EntityRecord, limit: usize) -> Result<FunctionContext> {
    let mut ctx = FunctionContext::default();

    if db.has_table("function_calls")? {
        let mut seen: HashSet<i64> = HashSet::new();
        for call in db.get_callees(function.id, limit)? {
            let local = call.module_name.is_some() && call.module_name == function.module;
            match call.callee_id {
                Some(id) if local => {
                    if seen.insert(id) {
                        if let Some(record) = db.get_entity_by_id(EntityKind::Function, id)? {
                            ctx.local_functions.push(record);
                        }
                    }
                }
                _ => {
                    let known = ctx
                        .external_functions
                        .iter()
                        .any(|c| c.name == call.name && c.module_name == call.module_name);
                    if !known {
                        ctx.external_functions.push(call);
                    }
                }
            }
        }
    }

    if let Some(signature) = function.detail.as_deref() {
        for name in type_names(signature) {
            let mut candidates = db.get_entity_by_name(EntityKind::Type, name, None)?;
            let own = candidates
                .iter()
                .position(|t| t.module_id.is_some() && t.module_id == function.module_id);
            match own {
                Some(at) => ctx.local_types.push(candidates.swap_remove(at)),
                None if !candidates.is_empty() => ctx.external_types.push(candidates.swap_remove(0)),
                None => {}
            }
        }
    }

    Ok(ctx)
}

fn write_preview<T>(out: &mut String, title: &str, items: &[T], line: impl Fn(&T) -> String) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title} ({}):", items.len());
    for item in items.iter().take(CONTEXT_PREVIEW) {
        let _ = writeln!(out, "  • {}", line(item));
    }
    if items.len() > CONTEXT_PREVIEW {
        let _ = writeln!(out, "  ... and {} more", items.len() - CONTEXT_PREVIEW);
    }
    out.push('\n');
}

fn from_module(module: Option<&str>) -> String {
    module.map(|m| format!(" (from {m})")).unwrap_or_default()
}

fn write_definition(out: &mut String, definition: &str, max_lines: usize) {
    out.push_str("Definition:\n");
    for line in definition.lines().take(max_lines) {
        let _ = writeln!(out, "  {line}");
    }
    if definition.lines().count() > max_lines {
        out.push_str("  ...\n");
    }
}

pub fn find_element_by_location(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let file_path = args.required_str("file_path")?;
    let line = args.required_i64("line_number")?;
    let path = relative_path(file_path, args.str("base_directory"));
    let requested = args.str_list("element_types");
    let wanted = |kind: EntityKind| {
        requested.is_empty()
            || requested
                .iter()
                .any(|t| t == "all" || EntityKind::from_str(t) == Some(kind))
    };

    let mut found = Vec::new();
    for kind in LOCATED_KINDS.into_iter().filter(|k| wanted(*k)) {
        if let Some(record) = db.find_at_location(kind, path, line, 0)? {
            found.push(record);
        }
    }
    if found.is_empty() {
        return Ok(format!("No code elements found at {file_path}:{line}"));
    }

    let mut out = format!("Code Elements at {file_path}:{line}:\n\n");
    for e in &found {
        let description = match e.kind {
            EntityKind::Function => e.detail.clone().unwrap_or_else(|| "No signature".to_string()),
            EntityKind::Type => e.detail.clone().unwrap_or_else(|| "Unknown category".to_string()),
            EntityKind::Import => format!("import {}{}", e.name, from_module(e.detail.as_deref())),
            _ => "Class definition".to_string(),
        };
        let kind = match e.kind {
            EntityKind::Function => "Function",
            EntityKind::Type => "Type",
            EntityKind::Class => "Class",
            _ => "Import",
        };
        let _ = writeln!(out, "• {kind}: {}", e.name);
        let _ = writeln!(out, "  Description: {description}");
        let _ = write!(out, "  Location: {}\n\n", e.location.as_deref().unwrap_or("Unknown"));
    }
    Ok(out)
}

pub fn get_location_context(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let file_path = args.required_str("file_path")?;
    let line = args.required_i64("line_number")?;
    let radius = args.usize_or("context_radius", 5) as i64;
    let include_dependencies = args.bool_or("include_dependencies", true);
    let path = relative_path(file_path, None);

    let mut out = format!("Context for {file_path}:{line} (±{radius} lines):\n\n");
    let mut any = false;

    if let Some(f) = db.find_at_location(EntityKind::Function, path, line, radius)? {
        any = true;
        out.push_str("=== Function Context ===\n");
        let _ = writeln!(out, "Function: {}", f.name);
        if let Some(ref sig) = f.detail {
            let _ = writeln!(out, "Signature: {sig}");
        }
        if let Some(ref module) = f.module {
            let _ = writeln!(out, "Module: {module}");
        }
        let _ = write!(out, "Location: {}\n\n", f.location.as_deref().unwrap_or("Unknown"));

        if include_dependencies {
            let ctx = function_context(db, &f, service.config().max_results)?;
            write_preview(&mut out, "Local Functions Used", &ctx.local_functions, |r| r.name.clone());
            write_preview(&mut out, "External Functions Used", &ctx.external_functions, |c| {
                format!("{}{}", c.name, from_module(c.module_name.as_deref()))
            });
            write_preview(&mut out, "Local Types Used", &ctx.local_types, |r| r.name.clone());
            write_preview(&mut out, "External Types Used", &ctx.external_types, |r| {
                format!("{}{}", r.name, from_module(r.module.as_deref()))
            });
        }
    }

    if let Some(t) = db.find_at_location(EntityKind::Type, path, line, radius)? {
        any = true;
        out.push_str("=== Type Context ===\n");
        let _ = writeln!(out, "Type: {}", t.name);
        let _ = writeln!(out, "Category: {}", t.detail.as_deref().unwrap_or("Unknown"));
        if let Some(ref module) = t.module {
            let _ = writeln!(out, "Module: {module}");
        }
        let _ = writeln!(out, "Location: {}", t.location.as_deref().unwrap_or("Unknown"));
        let detail = db.get_type_detail(t, false, false)?;
        if let Some(ref code) = detail.raw_code {
            write_definition(&mut out, code, 5);
        }
        out.push('\n');
    }

    if let Some(c) = db.find_at_location(EntityKind::Class, path, line, radius)? {
        any = true;
        out.push_str("=== Class Context ===\n");
        let _ = writeln!(out, "Class: {}", c.name);
        if let Some(ref module) = c.module {
            let _ = writeln!(out, "Module: {module}");
        }
        let _ = writeln!(out, "Location: {}", c.location.as_deref().unwrap_or("Unknown"));
        if let Some(ref def) = c.detail {
            write_definition(&mut out, def, 3);
        }
        out.push('\n');
    }

    if let Some(found) = db.find_at_location(EntityKind::Import, path, line, radius)? {
        if let Some(i) = db.get_import(found.id)? {
            any = true;
            out.push_str("=== Import Context ===\n");
            let _ = writeln!(out, "Import: {}", i.module_name);
            if let Some(ref pkg) = i.package_name {
                let _ = writeln!(out, "Package: {pkg}");
            }
            if i.qualified {
                out.push_str("Style: Qualified\n");
            }
            if let Some(ref alias) = i.as_module_name {
                let _ = writeln!(out, "Alias: {alias}");
            }
            let _ = write!(out, "Location: {}\n\n", i.src_loc.as_deref().unwrap_or("Unknown"));
        }
    }

    if !any {
        out.push_str("No code elements found at this location.\n");
    }
    Ok(out)
}

pub fn get_function_context(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let function = resolve_function(db, name, args.str("module_name"))?;
    let include_local = args.bool_or("include_local_definitions", true);
    let include_external = args.bool_or("include_external_references", true);

    let mut out = format!("Complete Context for Function '{}':\n\n", function.name);
    out.push_str("=== Function Information ===\n");
    let _ = writeln!(out, "Name: {}", function.name);
    if let Some(ref sig) = function.detail {
        let _ = writeln!(out, "Signature: {sig}");
    }
    if let Some(ref module) = function.module {
        let _ = writeln!(out, "Module: {module}");
    }
    let _ = write!(out, "Location: {}\n\n", function.location.as_deref().unwrap_or("Unknown"));

    let ctx = function_context(db, &function, service.config().max_results)?;
    if include_local {
        if !ctx.local_functions.is_empty() {
            let _ = writeln!(out, "=== Local Functions Used ({}) ===", ctx.local_functions.len());
            for f in &ctx.local_functions {
                let _ = write!(out, "• {}", f.name);
                if let Some(ref sig) = f.detail {
                    let _ = write!(out, " :: {sig}");
                }
                out.push('\n');
            }
            out.push('\n');
        }
        if !ctx.local_types.is_empty() {
            let _ = writeln!(out, "=== Local Types Used ({}) ===", ctx.local_types.len());
            for t in &ctx.local_types {
                let _ = write!(out, "• {}", t.name);
                if let Some(ref category) = t.detail {
                    let _ = write!(out, " ({category})");
                }
                out.push('\n');
            }
            out.push('\n');
        }
    }
    if include_external {
        if !ctx.external_functions.is_empty() {
            let _ = writeln!(out, "=== External Functions Used ({}) ===", ctx.external_functions.len());
            for c in &ctx.external_functions {
                let _ = writeln!(out, "• {}{}", c.name, from_module(c.module_name.as_deref()));
            }
            out.push('\n');
        }
        if !ctx.external_types.is_empty() {
            let _ = writeln!(out, "=== External Types Used ({}) ===", ctx.external_types.len());
            for t in &ctx.external_types {
                let _ = writeln!(out, "• {}{}", t.name, in_module(t));
            }
            out.push('\n');
        }
    }
    Ok(out)
}
