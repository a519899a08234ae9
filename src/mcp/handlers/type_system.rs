use std::fmt::Write as _;

use std::collections::HashSet;

use super::{clip, field_predicate, in_module, module_matches, name_matches, parse_format, resolve_module, resolve_type};
use crate::db::type_node_id;
use crate::errors::{FdepError, Result};
use crate::graph::{passes_module_filter, render};
use crate::mcp::args::Args;
use crate::query::{matches_pattern, Operator, Predicate};
use crate::service::CodeService;
use crate::types::{EntityKind, EntityRecord, RenderOptions};

/// Type categories accepted by `type_category`.
pub const TYPE_CATEGORIES: [&str; 6] = ["DATA", "SUMTYPE", "TYPE", "NEWTYPE", "CLASS", "INSTANCE"];

/// Characters of a type definition shown by `get_type_dependencies`.
const DEFINITION_PREVIEW: usize = 300;

/// Most connected types listed by the graph overview.
const TOP_CONNECTED: usize = 10;

/// Dependencies listed per type by `analyze_type_relationships`.
const DEPENDENCY_PREVIEW: usize = 5;

/// Dependents listed by `analyze_type_relationships`.
const DEPENDENT_PREVIEW: usize = 10;

/// Functions listed by `analyze_type_usage` for one type.
const USING_FUNCTIONS: usize = 20;

/// Types listed per category by the type usage overview.
const CATEGORY_PREVIEW: usize = 10;

/// Instances listed by `get_class_details`.
const INSTANCE_PREVIEW: usize = 10;

const NO_DEPENDENCY_DATA: &str = "Type dependency data is not available in this database.";

fn category_predicate(category: Option<&str>) -> Result<Predicate> {
    match category {
        Some(c) => field_predicate(EntityKind::Type, "type_of_type", Operator::Eq, c.into()),
        None => Ok(Predicate::match_all()),
    }
}

fn write_types(out: &mut String, records: &[EntityRecord]) {
    for t in records {
        let _ = write!(out, "- {}", t.name);
        if let Some(ref category) = t.detail {
            let _ = write!(out, " [{category}]");
        }
        let _ = writeln!(out, "{}", in_module(t));
    }
}

pub fn list_types(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let limit = service.clamp_limit(args.usize_or("limit", 100));
    let mut predicate = category_predicate(args.str("type_category"))?;
    if let Some(module) = resolve_module(db, args.str("module_name"))? {
        predicate = predicate.and(field_predicate(
            EntityKind::Type,
            "module_id",
            Operator::Eq,
            module.id.into(),
        )?);
    }
    if let Some(pattern) = args.str("pattern") {
        predicate = predicate.and(name_matches(EntityKind::Type, pattern)?);
    }

    let total = db.count_entities(EntityKind::Type, &predicate)?;
    let types = db.run_predicate_query(EntityKind::Type, &predicate, limit)?;
    if types.is_empty() {
        return Ok("No types found matching the given criteria".to_string());
    }

    let mut out = format!("Found {} types (showing {}):\n\n", total, types.len());
    write_types(&mut out, &types);
    Ok(out)
}

pub fn search_types(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let pattern = args.required_str("pattern")?;
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let mut predicate = name_matches(EntityKind::Type, pattern)?
        .and(category_predicate(args.str("type_category"))?);
    if let Some(module_pattern) = args.str("module_pattern") {
        predicate = predicate.and(module_matches(EntityKind::Type, module_pattern)?);
    }

    let types = db.run_predicate_query(EntityKind::Type, &predicate, limit)?;
    if types.is_empty() {
        return Ok(format!("No types found matching pattern: {pattern}"));
    }

    let mut out = format!("Found {} types matching '{}':\n\n", types.len(), pattern);
    write_types(&mut out, &types);
    Ok(out)
}

pub fn get_type_details(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("type_name")?;
    let record = resolve_type(db, name, args.str("module_name"))?;
    let include_constructors = args.bool_or("include_constructors", true);
    let include_fields = args.bool_or("include_fields", true);
    let detail = db.get_type_detail(record, include_constructors, include_fields)?;

    let mut out = format!("Type: {}\n", detail.record.name);
    let _ = writeln!(out, "Module: {}", detail.record.module.as_deref().unwrap_or("Unknown"));
    let _ = writeln!(out, "Category: {}", detail.record.detail.as_deref().unwrap_or("Unknown"));
    if let Some(ref loc) = detail.record.location {
        let _ = writeln!(out, "Source Location: {loc}");
    }
    if let Some(ref code) = detail.raw_code {
        let _ = write!(out, "\nDefinition:\n{}\n", code.trim_end());
    }

    if let Some(ref constructors) = detail.constructors {
        if !constructors.is_empty() {
            let _ = writeln!(out, "\nConstructors ({}):", constructors.len());
            for c in constructors {
                let _ = writeln!(out, "  • {}", c.name);
                for f in &c.fields {
                    let _ = writeln!(
                        out,
                        "      {} :: {}",
                        f.name.as_deref().unwrap_or("_"),
                        f.type_raw.as_deref().unwrap_or("?")
                    );
                }
            }
        }
    }
    Ok(out)
}

pub fn get_type_dependencies(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("type_name")?;
    let target = resolve_type(db, name, args.str("module_name"))?;
    let include_dependents = args.bool_or("include_dependents", false);
    let depth = service.clamp_depth(args.usize_or("depth", 2));
    let format = parse_format(args.str("graph_format"));

    let mut out = format!("Type Dependencies for '{}'{}:\n\n", target.name, in_module(&target));
    let detail = db.get_type_detail(target, false, false)?;
    if let Some(ref code) = detail.raw_code {
        let _ = write!(out, "Definition: {}\n\n", clip(code, DEFINITION_PREVIEW));
    }
    let target = detail.record;

    if !db.has_table("type_dependencies")? {
        out.push_str(NO_DEPENDENCY_DATA);
        out.push('\n');
        return Ok(out);
    }

    let graph = db.get_type_subgraph(target.id, depth, service.config().max_results)?;
    if graph.edge_count() == 0 {
        out.push_str("No dependencies found.\n\n");
    } else {
        let options = RenderOptions {
            depth,
            format,
            ..Default::default()
        };
        let _ = writeln!(out, "Depends on (depth {depth}):");
        out.push_str(&render(&graph, Some(type_node_id(target.id).as_str()), &options));
        out.push('\n');
    }

    if include_dependents {
        let dependents = db.get_type_dependents(target.id)?.unwrap_or_default();
        if dependents.is_empty() {
            out.push_str("No types depend on this type.\n");
        } else {
            let _ = writeln!(out, "Used by ({} types):", dependents.len());
            for d in &dependents {
                let _ = writeln!(out, "  ← {}{}", d.name, in_module(d));
            }
        }
    }
    Ok(out)
}

pub fn build_type_dependency_graph(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let depth = service.clamp_depth(args.usize_or("max_depth", 3));
    let module_filters: Vec<String> = args.str("module_pattern").map(str::to_string).into_iter().collect();

    let mut out = String::from("Type Dependency Graph:\n\n");
    if !db.has_table("type_dependencies")? {
        out.push_str(NO_DEPENDENCY_DATA);
        out.push('\n');
    }

    if let Some(root) = args.str("root_type") {
        let roots = db.get_entity_by_name(EntityKind::Type, root, None)?;
        if roots.is_empty() {
            return Err(FdepError::not_found("Type", root));
        }
        let options = RenderOptions {
            depth,
            format: parse_format(args.str("graph_format")),
            module_filters,
            include_signatures: false,
        };
        let _ = write!(out, "Dependencies for type '{root}':\n\n");
        for record in &roots {
            let graph = db.get_type_subgraph(record.id, depth, service.config().max_results)?;
            out.push_str(&render(&graph, Some(type_node_id(record.id).as_str()), &options));
            out.push('\n');
        }
        return Ok(out);
    }

    let tdg = db.get_type_dependency_graph(service.config().max_results)?;
    let total_types = tdg.graph.len();
    let total_edges = tdg.graph.edge_count();
    out.push_str("Graph Statistics:\n");
    let _ = writeln!(out, "• Total types: {total_types}");
    let _ = writeln!(out, "• Total dependencies: {total_edges}");
    if total_types > 0 {
        let _ = writeln!(
            out,
            "• Average dependencies per type: {:.1}",
            total_edges as f64 / total_types as f64
        );
    }
    let shared = tdg.shared_names();
    if !shared.is_empty() {
        let shown: Vec<&str> = shared.iter().copied().take(TOP_CONNECTED).collect();
        let _ = writeln!(
            out,
            "• Type names defined more than once: {} ({})",
            shared.len(),
            shown.join(", ")
        );
    }

    let mut connected: Vec<_> = tdg
        .graph
        .nodes()
        .filter(|n| passes_module_filter(n, &module_filters))
        .filter(|n| !n.edges.is_empty())
        .collect();
    connected.sort_by(|a, b| b.edges.len().cmp(&a.edges.len()).then_with(|| a.name.cmp(&b.name)));

    if !connected.is_empty() {
        let _ = write!(out, "\nMost Connected Types (top {TOP_CONNECTED}):\n");
        for n in connected.into_iter().take(TOP_CONNECTED) {
            let _ = write!(out, "• {}", n.name);
            if let Some(ref m) = n.module {
                let _ = write!(out, " (in {m})");
            }
            let _ = writeln!(out, " - {} dependencies", n.edges.len());
        }
    }
    Ok(out)
}

pub fn list_classes(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let limit = service.clamp_limit(args.usize_or("limit", 100));
    let predicate = match resolve_module(db, args.str("module_name"))? {
        Some(module) => field_predicate(EntityKind::Class, "module_id", Operator::Eq, module.id.into())?,
        None => Predicate::match_all(),
    };

    let total = db.count_entities(EntityKind::Class, &predicate)?;
    let classes = db.run_predicate_query(EntityKind::Class, &predicate, limit)?;
    if classes.is_empty() {
        return Ok("No classes found".to_string());
    }

    let mut out = format!("Found {} classes (showing {}):\n\n", total, classes.len());
    for c in &classes {
        let _ = writeln!(out, "- {}{}", c.name, in_module(c));
    }
    Ok(out)
}

pub fn search_classes(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let pattern = args.required_str("pattern")?;
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let classes = db.run_predicate_query(
        EntityKind::Class,
        &name_matches(EntityKind::Class, pattern)?,
        limit,
    )?;
    if classes.is_empty() {
        return Ok(format!("No classes found matching pattern: {pattern}"));
    }

    let mut out = format!("Found {} classes matching '{}':\n\n", classes.len(), pattern);
    for c in &classes {
        let _ = writeln!(out, "- {}{}", c.name, in_module(c));
        if let Some(ref def) = c.detail {
            let _ = writeln!(out, "  {}", clip(def, 120));
        }
    }
    Ok(out)
}

pub fn analyze_type_usage(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;

    if let Some(name) = args.str("type_name") {
        let target = resolve_type(db, name, args.str("module_name"))?;
        let mut out = format!("Usage Analysis for Type '{}':\n\n", target.name);
        let _ = writeln!(out, "Category: {}", target.detail.as_deref().unwrap_or("Unknown"));
        if let Some(ref module) = target.module {
            let _ = writeln!(out, "Defined in: {module}");
        }

        let functions = db.functions_mentioning_type(&target.name, USING_FUNCTIONS)?;
        if functions.is_empty() {
            out.push_str("\nNot used in any function signature.\n");
        } else {
            let _ = writeln!(out, "\nUsed in function signatures ({} functions):", functions.len());
            for f in &functions {
                let _ = writeln!(out, "  • {}{}", f.name, in_module(f));
            }
        }
        if let Some(dependents) = db.get_type_dependents(target.id)? {
            let _ = writeln!(out, "\nReferenced by {} types", dependents.len());
        }
        return Ok(out);
    }

    let module = resolve_module(db, args.str("module_name"))?;
    let threshold = args.usize_or("usage_threshold", 0) as u64;
    let limit = service.clamp_limit(args.usize_or("limit", 50));
    let rows = db.type_usage_counts(module.map(|m| m.id), threshold, limit)?;
    if rows.is_empty() {
        return Ok("No types found for usage analysis".to_string());
    }

    let mut categories: Vec<(&str, Vec<&(EntityRecord, u64)>)> = Vec::new();
    for row in &rows {
        let category = row.0.detail.as_deref().unwrap_or("Unknown");
        match categories.iter_mut().find(|(c, _)| *c == category) {
            Some((_, members)) => members.push(row),
            None => categories.push((category, vec![row])),
        }
    }

    let mut out = format!("Type Usage Analysis ({} types):\n\n", rows.len());
    for (category, members) in categories {
        let _ = writeln!(out, "{category}: {} types", members.len());
        for (t, refs) in members.iter().take(CATEGORY_PREVIEW).map(|r| (&r.0, r.1)) {
            let _ = writeln!(out, "  • {}{} - referenced by {refs} types", t.name, in_module(t));
        }
        if members.len() > CATEGORY_PREVIEW {
            let _ = writeln!(out, "  ... and {} more", members.len() - CATEGORY_PREVIEW);
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn get_class_details(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("class_name")?;
    let include_instances = args.bool_or("include_instances", true);
    let module = resolve_module(db, args.str("module_name"))?;
    let classes = db.get_entity_by_name(EntityKind::Class, name, module.map(|m| m.id))?;
    if classes.is_empty() {
        return Err(FdepError::not_found("Class", name));
    }

    let mut out = format!("Class Details for '{name}':\n\n");
    for c in &classes {
        let _ = writeln!(out, "Name: {}", c.name);
        if let Some(ref module) = c.module {
            let _ = writeln!(out, "Module: {module}");
        }
        if let Some(ref loc) = c.location {
            let _ = writeln!(out, "Location: {loc}");
        }
        if let Some(ref def) = c.detail {
            let _ = writeln!(out, "Definition: {}", clip(def, DEFINITION_PREVIEW));
        }
        out.push('\n');
    }

    if include_instances {
        let instances = db.instances_mentioning(name, INSTANCE_PREVIEW)?;
        if instances.is_empty() {
            out.push_str("No instances found.\n");
        } else {
            let _ = writeln!(out, "Instances ({} found):", instances.len());
            for i in &instances {
                let _ = write!(out, "  • {}{}", i.name, in_module(i));
                if let Some(ref loc) = i.location {
                    let _ = write!(out, " at {loc}");
                }
                out.push('\n');
                if let Some(ref sig) = i.detail {
                    let _ = writeln!(out, "    Signature: {}", clip(sig, 100));
                }
            }
        }
    }
    Ok(out)
}

pub fn get_nested_types(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let names = args.str_list("type_names");
    if names.is_empty() {
        return Err(FdepError::validation("type_names must name at least one type"));
    }
    let gateway = args.required_str("gateway_name")?;
    let exclude = args.str("exclude_pattern");
    let include_raw = args.bool_or("include_raw_definitions", true);

    let keep = |r: &EntityRecord| {
        r.module.as_deref().is_some_and(|m| m.contains(gateway))
            && !exclude.is_some_and(|p| matches_pattern(&r.name, p))
    };
    let mut roots = Vec::new();
    for name in &names {
        roots.extend(db.get_entity_by_name(EntityKind::Type, name, None)?.into_iter().filter(|r| keep(r)));
    }
    if roots.is_empty() {
        return Ok(format!(
            "No nested types found for [{}] under gateway '{gateway}'",
            names.join(", ")
        ));
    }

    let config = service.config();
    let nested = db.get_type_closure(roots, config.max_depth, config.max_results, keep)?;
    let mut out = format!(
        "Nested Types for [{}] (gateway: {gateway}):\n\nFound {} type definitions:\n\n",
        names.join(", "),
        nested.len()
    );
    for (i, record) in nested.into_iter().enumerate() {
        let n = i + 1;
        let detail = db.get_type_detail(record, false, false)?;
        let t = &detail.record;
        match (include_raw, detail.raw_code.as_deref()) {
            (true, Some(code)) => {
                let _ = write!(out, "=== Type Definition {n} ===\n{}\n\n", code.trim_end());
            }
            (true, None) => {
                let _ = write!(
                    out,
                    "=== Type Definition {n} ===\n-- {}{}: no definition stored\n\n",
                    t.name,
                    in_module(t)
                );
            }
            (false, code) => {
                let first = code.and_then(|c| c.lines().next()).map(str::trim);
                let _ = writeln!(out, "{n}. {}", first.unwrap_or(t.name.as_str()));
            }
        }
    }
    if !include_raw {
        out.push_str("\nUse 'include_raw_definitions: true' to see full type definitions.\n");
    }
    Ok(out)
}

pub fn analyze_type_relationships(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("type_name")?;
    let target = resolve_type(db, name, Some(args.required_str("source_module")?))?;
    let depth = service.clamp_depth(args.usize_or("analysis_depth", 2));
    let include_dependents = args.bool_or("include_dependents", true);
    let module_filter = args.str("module_filter");

    let mut out = format!(
        "Type Relationship Analysis for '{}'{}:\n\n",
        target.name,
        in_module(&target)
    );
    if !db.has_table("type_dependencies")? {
        out.push_str(NO_DEPENDENCY_DATA);
        out.push('\n');
        return Ok(out);
    }

    let keep = |r: &EntityRecord| match (module_filter, r.module.as_deref()) {
        (Some(filter), Some(module)) => module.contains(filter),
        _ => true,
    };
    let related = db.get_type_closure(vec![target.clone()], depth, service.config().max_results, keep)?;
    let _ = write!(out, "Found {} related types:\n\n", related.len());
    for (i, t) in related.iter().enumerate() {
        let _ = writeln!(out, "{}. {}{}", i + 1, t.name, in_module(t));
        let deps = db.get_type_dependencies(t.id)?.unwrap_or_default();
        if !deps.is_empty() {
            out.push_str("   Dependencies:\n");
            for d in deps.iter().take(DEPENDENCY_PREVIEW) {
                let _ = writeln!(out, "     → {}{}", d.name, in_module(d));
            }
            if deps.len() > DEPENDENCY_PREVIEW {
                let _ = writeln!(out, "     ... and {} more", deps.len() - DEPENDENCY_PREVIEW);
            }
        }
        out.push('\n');
    }

    if include_dependents {
        out.push_str("=== Reverse Dependencies ===\n");
        let inside: HashSet<i64> = related.iter().map(|t| t.id).collect();
        let mut seen: HashSet<i64> = HashSet::new();
        let mut dependents = Vec::new();
        for t in &related {
            for d in db.get_type_dependents(t.id)?.unwrap_or_default() {
                if !inside.contains(&d.id) && seen.insert(d.id) {
                    dependents.push(d);
                }
            }
        }
        if dependents.is_empty() {
            let _ = writeln!(out, "No types found that depend on '{}'", target.name);
        } else {
            let _ = write!(
                out,
                "Found {} types that depend on '{}':\n\n",
                dependents.len(),
                target.name
            );
            for d in dependents.iter().take(DEPENDENT_PREVIEW) {
                let _ = writeln!(out, "• {}{}", d.name, in_module(d));
            }
            if dependents.len() > DEPENDENT_PREVIEW {
                let _ = writeln!(out, "... and {} more", dependents.len() - DEPENDENT_PREVIEW);
            }
        }
    }
    Ok(out)
}
