use std::fmt::Write as _;

use super::{parse_format, require_module, resolve_module, search_pattern};
use crate::db::module_node_id;
use crate::errors::Result;
use crate::graph::render;
use crate::mcp::args::Args;
use crate::service::CodeService;
use crate::types::{ImportRecord, RenderOptions};

/// Modules listed by the import graph overview.
const TOP_IMPORTED: usize = 20;

/// Imports grouped by importing module, in first-seen order.
fn group_by_module(imports: &[ImportRecord]) -> Vec<(&str, Vec<&ImportRecord>)> {
    let mut groups: Vec<(&str, Vec<&ImportRecord>)> = Vec::new();
    for import in imports {
        let module = import.importing_module.as_deref().unwrap_or("Unknown");
        match groups.iter_mut().find(|(m, _)| *m == module) {
            Some((_, members)) => members.push(import),
            None => groups.push((module, vec![import])),
        }
    }
    groups
}

/// Reasons an import deserves a second look. Purely structural: the store
/// does not record which imported names a module uses.
pub fn review_reasons(import: &ImportRecord) -> Vec<&'static str> {
    let mut reasons = Vec::new();
    if import.qualified && import.as_module_name.is_some() {
        reasons.push("qualified import (needs usage verification)");
    }
    if import.is_hiding {
        reasons.push("hiding import (check if necessary)");
    }
    let test_package = import
        .package_name
        .as_deref()
        .is_some_and(|p| p.to_lowercase().contains("test"));
    if !import.internal && !test_package {
        reasons.push("external package (verify necessity)");
    }
    reasons
}

pub fn analyze_imports(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let module = resolve_module(db, args.str("module_name"))?;
    let target = args.str("import_pattern").map(search_pattern);
    let include_qualified = args.bool_or("include_qualified", true);
    let limit = service.clamp_limit(args.usize_or("limit", 100));

    let imports = db.find_imports(module.map(|m| m.id), target.as_deref(), None, limit)?;
    if imports.is_empty() {
        return Ok("No imports found matching the specified criteria".to_string());
    }

    let mut out = format!("Import Analysis ({} imports found):\n\n", imports.len());
    for (module, members) in group_by_module(&imports) {
        let _ = writeln!(out, "Module: {module} ({} imports)", members.len());
        for i in members {
            let _ = write!(out, "  • {}", i.module_name);
            if let Some(ref pkg) = i.package_name {
                let _ = write!(out, " (from {pkg})");
            }
            if include_qualified {
                if i.qualified {
                    out.push_str(" [qualified]");
                }
                if let Some(ref alias) = i.as_module_name {
                    let _ = write!(out, " as {alias}");
                }
                if i.is_hiding {
                    out.push_str(" [hiding]");
                }
            }
            if let Some(ref loc) = i.src_loc {
                let _ = write!(out, " at {loc}");
            }
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn get_import_graph(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let depth = service.clamp_depth(args.usize_or("depth", 3));
    let include_external = args.bool_or("include_external", false);
    let limit = service.clamp_limit(args.usize_or("limit", 50));

    if let Some(root) = args.str("root_module") {
        let module = require_module(db, root)?;
        let graph = db.get_import_graph(&module.name, depth, include_external, limit)?;
        let options = RenderOptions {
            depth,
            format: parse_format(args.str("graph_format")),
            ..Default::default()
        };
        let mut out = format!("Import Graph starting from '{}':\n\n", module.name);
        out.push_str(&render(&graph, Some(module_node_id(&module.name).as_str()), &options));
        return Ok(out);
    }

    let counts = db.get_most_imported(include_external, limit)?;
    if counts.is_empty() {
        return Ok("No imports found for graph generation".to_string());
    }
    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    let mut out = format!(
        "Import Graph Overview ({} imports of {} modules):\n\nMost Imported Modules:\n",
        total,
        counts.len()
    );
    for (name, n) in counts.iter().take(TOP_IMPORTED) {
        let _ = writeln!(out, "  • {name}: imported {n} times");
    }
    Ok(out)
}

pub fn find_unused_imports(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let module = resolve_module(db, args.str("module_name"))?;
    let package = args.str("package_pattern").map(search_pattern);
    let limit = service.clamp_limit(args.usize_or("limit", 100));

    let imports = db.find_imports(module.map(|m| m.id), None, package.as_deref(), limit)?;
    if imports.is_empty() {
        return Ok("No imports found for analysis".to_string());
    }

    let mut out = format!(
        "Potentially Unused Imports Analysis ({} imports checked):\n\n",
        imports.len()
    );
    let flagged: Vec<(&ImportRecord, Vec<&str>)> = imports
        .iter()
        .map(|i| (i, review_reasons(i)))
        .filter(|(_, reasons)| !reasons.is_empty())
        .collect();

    if flagged.is_empty() {
        out.push_str("No obviously suspicious imports found.\n");
        out.push_str("Usage of imported names is not recorded; use a linter such as HLint for a full check.\n");
        return Ok(out);
    }

    let _ = write!(out, "Found {} potentially unused imports:\n\n", flagged.len());
    for (i, reasons) in flagged {
        if let Some(ref module) = i.importing_module {
            let _ = writeln!(out, "Module: {module}");
        }
        let _ = write!(out, "  Import: {}", i.module_name);
        if let Some(ref pkg) = i.package_name {
            let _ = write!(out, " (from {pkg})");
        }
        out.push('\n');
        for reason in reasons {
            let _ = writeln!(out, "    - {reason}");
        }
        if let Some(ref loc) = i.src_loc {
            let _ = writeln!(out, "    Location: {loc}");
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn get_import_details(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("module_name")?;
    let include_source_info = args.bool_or("include_source_info", true);
    let module = require_module(db, name)?;

    let imports = db.get_imports_for_module(module.id, service.config().max_results)?;
    if imports.is_empty() {
        return Ok(format!("No imports found in module: {}", module.name));
    }

    let mut out = format!(
        "Import Details for Module '{}' ({} imports):\n\n",
        module.name,
        imports.len()
    );
    let located = |i: &ImportRecord| match (&i.src_loc, include_source_info) {
        (Some(loc), true) => format!(" (at {loc})"),
        _ => String::new(),
    };
    let alias = |i: &ImportRecord| {
        i.as_module_name
            .as_deref()
            .map(|a| format!(" as {a}"))
            .unwrap_or_default()
    };

    let internal: Vec<&ImportRecord> = imports.iter().filter(|i| i.internal).collect();
    if !internal.is_empty() {
        let _ = writeln!(out, "Internal Imports ({}):", internal.len());
        for i in internal {
            let _ = writeln!(out, "  • {}{}{}", i.module_name, alias(i), located(i));
        }
        out.push('\n');
    }

    let external: Vec<&ImportRecord> = imports.iter().filter(|i| !i.internal).collect();
    if !external.is_empty() {
        let _ = writeln!(out, "External Imports ({}):", external.len());
        for i in external {
            let from = i
                .package_name
                .as_deref()
                .map(|p| format!(" (from {p})"))
                .unwrap_or_default();
            let _ = writeln!(out, "  • {}{}{}{}", i.module_name, from, alias(i), located(i));
        }
        out.push('\n');
    }

    let qualified: Vec<&ImportRecord> = imports.iter().filter(|i| i.qualified).collect();
    if !qualified.is_empty() {
        let _ = writeln!(out, "Qualified Imports ({}):", qualified.len());
        for i in qualified {
            let _ = writeln!(out, "  • qualified {}{}", i.module_name, alias(i));
        }
        out.push('\n');
    }

    let hiding: Vec<&ImportRecord> = imports.iter().filter(|i| i.is_hiding).collect();
    if !hiding.is_empty() {
        let _ = writeln!(out, "Hiding Imports ({}):", hiding.len());
        for i in hiding {
            let _ = writeln!(out, "  • {} hiding", i.module_name);
        }
        out.push('\n');
    }
    Ok(out)
}
