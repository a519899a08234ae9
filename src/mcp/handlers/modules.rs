use std::fmt::Write as _;

use super::{name_matches, require_module};
use crate::errors::Result;
use crate::mcp::args::Args;
use crate::query::Predicate;
use crate::service::CodeService;
use crate::types::EntityKind;

/// Functions listed by `get_module_details`.
const SAMPLE_FUNCTIONS: usize = 10;

pub fn list_modules(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let limit = service.clamp_limit(args.usize_or("limit", 100));
    let all = Predicate::match_all();
    let total = db.count_entities(EntityKind::Module, &all)?;
    let modules = db.run_predicate_query(EntityKind::Module, &all, limit)?;

    if modules.is_empty() {
        return Ok("No modules found".to_string());
    }

    let mut out = format!("Found {} modules (showing {}):\n\n", total, modules.len());
    for m in &modules {
        let _ = writeln!(out, "- {}", m.name);
    }
    Ok(out)
}

pub fn search_modules(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let pattern = args.required_str("pattern")?;
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let modules = db.run_predicate_query(
        EntityKind::Module,
        &name_matches(EntityKind::Module, pattern)?,
        limit,
    )?;

    if modules.is_empty() {
        return Ok(format!("No modules found matching pattern: {pattern}"));
    }

    let mut out = format!("Found {} modules matching '{}':\n\n", modules.len(), pattern);
    for m in &modules {
        let _ = write!(out, "- {}", m.name);
        if let Some(ref path) = m.location {
            let _ = write!(out, " ({path})");
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn get_module_details(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("module_name")?;
    let module = require_module(db, name)?;
    let counts = db.module_counts(module.id)?;

    let mut out = format!("Module Details: {}\n\n", module.name);
    let _ = writeln!(out, "Path: {}", module.location.as_deref().unwrap_or("Unknown"));
    let _ = writeln!(out, "Functions: {}", counts.functions);
    for (label, count) in [
        ("Types", counts.types),
        ("Classes", counts.classes),
        ("Imports", counts.imports),
        ("Instances", counts.instances),
    ] {
        if let Some(n) = count {
            let _ = writeln!(out, "{label}: {n}");
        }
    }

    let functions = db.get_entities_by_scope(EntityKind::Function, module.id, SAMPLE_FUNCTIONS)?;
    if !functions.is_empty() {
        let _ = writeln!(out, "\nFirst {} Functions:", functions.len());
        for f in &functions {
            let _ = writeln!(out, "- {}", f.name);
        }
        let shown = functions.len() as u64;
        if counts.functions > shown {
            let _ = writeln!(out, "... and {} more", counts.functions - shown);
        }
    }
    Ok(out)
}

pub fn get_functions_by_module(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("module_name")?;
    let limit = service.clamp_limit(args.usize_or("limit", 100));
    let include_signatures = args.bool_or("include_signatures", false);
    let module = require_module(db, name)?;

    let functions = db.get_entities_by_scope(EntityKind::Function, module.id, limit)?;
    if functions.is_empty() {
        return Ok(format!("No functions found in module: {name}"));
    }

    let mut out = format!(
        "Functions in module '{}' ({} shown):\n\n",
        module.name,
        functions.len()
    );
    for f in &functions {
        let _ = write!(out, "- {}", f.name);
        if include_signatures {
            if let Some(ref sig) = f.detail {
                let _ = write!(out, " :: {sig}");
            }
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn get_module_dependencies(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("module_name")?;
    let include_imports = args.bool_or("include_imports", true);
    let include_dependents = args.bool_or("include_dependents", false);
    let module = require_module(db, name)?;
    let limit = service.config().max_results;

    let mut out = format!("Module Dependencies for '{}':\n\n", module.name);

    if include_imports {
        let imports = db.get_imports_for_module(module.id, limit)?;
        if imports.is_empty() {
            out.push_str("No imports found.\n\n");
        } else {
            let _ = writeln!(out, "Imports ({}):", imports.len());
            for i in &imports {
                let _ = write!(out, "  → {}", i.module_name);
                if i.qualified {
                    out.push_str(" (qualified)");
                }
                if let Some(ref alias) = i.as_module_name {
                    let _ = write!(out, " as {alias}");
                }
                if i.is_hiding {
                    out.push_str(" (hiding)");
                }
                if let Some(ref pkg) = i.package_name {
                    let _ = write!(out, " [{pkg}]");
                }
                out.push('\n');
            }
            out.push('\n');
        }
    }

    if include_dependents {
        let dependents = db.get_module_dependents(&module.name, limit)?;
        if dependents.is_empty() {
            out.push_str("No modules import this module.\n");
        } else {
            let _ = writeln!(out, "Imported by ({}):", dependents.len());
            for d in &dependents {
                let _ = writeln!(
                    out,
                    "  ← {}",
                    d.importing_module.as_deref().unwrap_or("Unknown")
                );
            }
        }
    }

    Ok(out)
}
