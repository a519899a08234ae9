use std::collections::HashMap;
use std::fmt::Write as _;

use serde_json::Value;

use super::{clip, field_predicate, in_module, module_matches, resolve_function, resolve_module, search_pattern};
use crate::analysis::complexity::{rank, score, score_entity, ComplexityInputs, DEFAULT_MIN_COMPLEXITY};
use crate::analysis::similarity::{group_by_similarity, rank_similar, record_similarity};
use crate::errors::{FdepError, Result};
use crate::mcp::args::Args;
use crate::query::{Operator, Predicate};
use crate::service::CodeService;
use crate::types::{EntityKind, EntityRecord, ModuleScope};

/// Signature characters shown per function in reports.
const SIGNATURE_PREVIEW: usize = 100;

/// Functions that carry a signature, optionally limited to matching modules.
fn signed_functions(service: &CodeService, module_pattern: Option<&str>) -> Result<Vec<EntityRecord>> {
    let db = service.db()?;
    let mut predicate = field_predicate(
        EntityKind::Function,
        "function_signature",
        Operator::Ne,
        Value::Null,
    )?;
    if let Some(pattern) = module_pattern {
        predicate = predicate.and(module_matches(EntityKind::Function, pattern)?);
    }
    db.run_predicate_query(EntityKind::Function, &predicate, service.config().max_results)
}

pub fn analyze_function_complexity(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let module = resolve_module(db, args.str("module_name"))?;
    let min = args.usize_or("min_complexity", DEFAULT_MIN_COMPLEXITY as usize) as u64;
    let limit = service.clamp_limit(args.usize_or("limit", 50));

    let candidates = db.complexity_candidates(
        module.map_or(ModuleScope::All, |m| ModuleScope::Module(m.id)),
        min,
        limit,
    )?;
    if candidates.is_empty() {
        return Ok(format!("No functions found with complexity >= {min}"));
    }

    let mut records: HashMap<i64, EntityRecord> = HashMap::with_capacity(candidates.len());
    let mut scores = Vec::with_capacity(candidates.len());
    for (record, calls, locals) in candidates {
        scores.push(score_entity(
            record.id,
            &ComplexityInputs {
                signature: record.detail.as_deref(),
                outgoing_calls: calls,
                local_definitions: locals,
            },
        ));
        records.insert(record.id, record);
    }
    let ranked = rank(scores, min);

    let mut out = format!(
        "Function Complexity Analysis ({} functions):\n\
         (heuristic score from signature size, arrows, call fan-out and local definitions)\n\n",
        ranked.len()
    );
    for s in &ranked {
        let Some(f) = records.get(&s.entity_id) else {
            continue;
        };
        let _ = write!(out, "- {} (complexity: {}){}", f.name, s.score, in_module(f));
        if let Some(ref sig) = f.detail {
            let _ = write!(out, "\n  Signature: {}", clip(sig, SIGNATURE_PREVIEW));
        }
        out.push_str("\n\n");
    }
    Ok(out)
}

pub fn get_code_statistics(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let include_details = args.bool_or("include_details", false);

    let mut out = String::from("Codebase Statistics:\n\n");
    for (label, table) in [
        ("Modules", "modules"),
        ("Functions", "functions"),
        ("Types", "types"),
        ("Classes", "classes"),
        ("Imports", "imports"),
        ("Instances", "instances"),
        ("Function calls", "function_calls"),
        ("Local definitions", "where_functions"),
        ("Type dependencies", "type_dependencies"),
    ] {
        if let Some(n) = db.count_table(table)? {
            let _ = writeln!(out, "• {label}: {n}");
        }
    }

    let functions = db.count_entities(EntityKind::Function, &Predicate::match_all())?;
    if functions > 0 {
        let signed = db.signed_function_count()?;
        let _ = writeln!(
            out,
            "• Functions with signatures: {} ({:.1}%)",
            signed,
            signed as f64 * 100.0 / functions as f64
        );
    }

    if include_details {
        let top = db.top_modules_by_function_count(10)?;
        if !top.is_empty() {
            out.push_str("\nLargest Modules (by function count):\n");
            for (name, n) in &top {
                let _ = writeln!(out, "• {name}: {n} functions");
            }
        }
        let categories = db.type_category_counts()?;
        if !categories.is_empty() {
            out.push_str("\nTypes by Category:\n");
            for (category, n) in &categories {
                let _ = writeln!(out, "• {category}: {n}");
            }
        }
    }

    Ok(out)
}

pub fn find_similar_functions(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let name = args.required_str("function_name")?;
    let target = resolve_function(db, name, args.str("module_name"))?;
    let threshold = args.f64_or("similarity_threshold", 0.7);
    let limit = service.clamp_limit(args.usize_or("limit", 10));

    if target.detail.as_deref().map_or(true, |s| s.trim().is_empty()) {
        return Ok(format!(
            "Function '{}' has no signature to compare against",
            target.name
        ));
    }

    let candidates = signed_functions(service, None)?;
    let ranked = rank_similar(&target, &candidates, record_similarity, threshold);
    if ranked.is_empty() {
        return Ok(format!(
            "No functions similar to '{}' (threshold {:.2})",
            target.name, threshold
        ));
    }

    let mut out = format!(
        "Functions similar to '{}'{} (threshold {:.2}):\n\n",
        target.name,
        in_module(&target),
        threshold
    );
    for (i, s) in ranked.into_iter().take(limit) {
        let f = &candidates[i];
        let _ = writeln!(out, "- {}{} (similarity: {:.2})", f.name, in_module(f), s);
        if let Some(ref sig) = f.detail {
            let _ = writeln!(out, "  Signature: {}", clip(sig, SIGNATURE_PREVIEW));
        }
    }
    Ok(out)
}

pub fn group_similar_functions(service: &CodeService, args: &Args) -> Result<String> {
    let threshold = args.f64_or("similarity_threshold", 0.7);
    let min_group_size = args.usize_or("min_group_size", 2);
    let limit = service.clamp_limit(args.usize_or("limit", 10));

    let candidates = signed_functions(service, args.str("module_pattern"))?;
    let groups = group_by_similarity(&candidates, record_similarity, threshold, min_group_size);
    if groups.is_empty() {
        return Ok(format!(
            "No groups of similar functions found (threshold {threshold:.2}, min size {min_group_size})"
        ));
    }

    let by_id: HashMap<i64, &EntityRecord> = candidates.iter().map(|r| (r.id, r)).collect();
    let mut out = format!(
        "Similar Function Groups ({} found, showing {}):\n\n",
        groups.len(),
        groups.len().min(limit)
    );
    for (n, group) in groups.iter().take(limit).enumerate() {
        let _ = writeln!(
            out,
            "Group {} ({} functions, score {:.2}):",
            n + 1,
            group.members.len(),
            group.score
        );
        for id in &group.members {
            if let Some(f) = by_id.get(id) {
                let _ = writeln!(out, "  - {}{}", f.name, in_module(f));
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Analyses accepted by `analyze_cross_module_dependencies`.
pub const COUPLING_ANALYSES: [&str; 3] = ["dependencies", "coupling", "complexity"];

pub fn analyze_cross_module_dependencies(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let analysis = args.str("analysis_type").unwrap_or("dependencies");
    let pattern = args.str("module_pattern").map(search_pattern);
    let include_metrics = args.bool_or("include_metrics", true);
    let threshold = args.usize_or("threshold", 1) as u64;
    let limit = service.clamp_limit(args.usize_or("limit", 50));

    let mut title = analysis.to_string();
    if let Some(first) = title.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    let mut out = format!("Cross-Module {title} Analysis:\n\n");

    match analysis {
        "dependencies" | "coupling" if !db.has_table("function_calls")? => {
            out.push_str("Call data is not available in this database.\n");
        }
        "dependencies" => {
            let pairs = db.get_module_call_counts(pattern.as_deref(), threshold, limit)?;
            if pairs.is_empty() {
                return Ok("No cross-module dependencies found matching criteria".to_string());
            }
            let _ = write!(out, "Found {} cross-module dependencies:\n\n", pairs.len());
            for p in &pairs {
                let _ = writeln!(out, "• {} → {} ({} calls)", p.caller_module, p.callee_module, p.calls);
            }
        }
        "coupling" => {
            let summary = db.get_coupling_summary()?;
            let _ = writeln!(out, "Total Modules: {}", summary.modules);
            let _ = writeln!(out, "Total Cross-Module Calls: {}", summary.calls);
            let _ = write!(out, "Total Dependencies: {}\n\n", summary.dependencies);
            if include_metrics {
                let modules = db.get_module_coupling(pattern.as_deref(), threshold, limit)?;
                let _ = writeln!(out, "Module Coupling Metrics (top {}):", modules.len());
                for m in &modules {
                    let _ = writeln!(out, "• {}:", m.name);
                    let _ = writeln!(out, "    Incoming: {} calls", m.incoming);
                    let _ = writeln!(out, "    Outgoing: {} calls", m.outgoing);
                    let _ = write!(out, "    Total: {} calls\n\n", m.total());
                }
            }
        }
        "complexity" => {
            let scope = pattern.as_deref().map_or(ModuleScope::All, ModuleScope::Matching);
            let candidates = db.complexity_candidates(scope, threshold, limit)?;
            if candidates.is_empty() {
                return Ok("No complex functions found matching criteria".to_string());
            }
            let _ = write!(out, "Found {} complex functions:\n\n", candidates.len());
            for (f, calls, locals) in &candidates {
                let _ = writeln!(out, "• {}{}", f.name, in_module(f));
                if include_metrics {
                    let total = score(&ComplexityInputs {
                        signature: f.detail.as_deref(),
                        outgoing_calls: *calls,
                        local_definitions: *locals,
                    });
                    let _ = writeln!(out, "    Dependencies: {calls}");
                    let _ = writeln!(out, "    Nested Functions: {locals}");
                    let _ = writeln!(out, "    Total Complexity: {total}");
                }
                out.push('\n');
            }
        }
        other => {
            return Err(FdepError::validation(format!(
                "analysis_type must be one of: {} (got {other})",
                COUPLING_ANALYSES.join(", ")
            )))
        }
    }
    Ok(out)
}
