use std::fmt::Write as _;

use serde_json::Value;
use tracing::debug;

use super::{in_module, search_pattern};
use crate::errors::{FdepError, Result};
use crate::mcp::args::Args;
use crate::query::{translate_all, Condition, EntityQuery, EntitySchema, Operator, DEFAULT_QUERY_LIMIT};
use crate::service::CodeService;
use crate::types::{EntityKind, EntityRecord};

/// Results listed in a query response; the count covers every match.
const LISTED_RESULTS: usize = 50;

fn list_records(out: &mut String, records: &[EntityRecord]) {
    for r in records.iter().take(LISTED_RESULTS) {
        let _ = write!(out, "- {}{}", r.name, in_module(r));
        if let Some(ref detail) = r.detail {
            let _ = write!(out, " :: {detail}");
        }
        out.push('\n');
    }
    if records.len() > LISTED_RESULTS {
        let _ = writeln!(out, "... and {} more", records.len() - LISTED_RESULTS);
    }
}

pub fn execute_query(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let query_type = args.required_str("query_type")?;
    let kind = EntityKind::from_str(query_type).ok_or_else(|| FdepError::UnsupportedEntity {
        kind: query_type.to_string(),
    })?;
    let filters = args.get("filters").cloned().unwrap_or(Value::Null);

    let schema = EntitySchema::for_kind(kind);
    let mut conditions = Vec::new();
    if let Some(pattern) = filters.get("name_pattern").and_then(|v| v.as_str()) {
        conditions.push(Condition::new(
            schema.name_column,
            Operator::Like,
            search_pattern(pattern),
        ));
    }
    if let Some(module_id) = filters.get("module_id").and_then(|v| v.as_i64()) {
        conditions.push(Condition::new("module_id", Operator::Eq, module_id));
    }
    let limit = service.clamp_limit(
        filters
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_QUERY_LIMIT),
    );

    let predicate = translate_all(schema, &conditions)?;
    let total = db.count_entities(kind, &predicate)?;
    let records = db.run_predicate_query(kind, &predicate, limit)?;

    let mut out = format!(
        "Found {} {} (showing {}):\n\n",
        total,
        kind.plural(),
        records.len()
    );
    list_records(&mut out, &records);
    Ok(out)
}

pub fn execute_advanced_query(service: &CodeService, args: &Args) -> Result<String> {
    let db = service.db()?;
    let raw = args
        .get("query")
        .ok_or_else(|| FdepError::validation("missing required parameter: query"))?;
    let query = EntityQuery::from_json(raw, service.config().max_results)?;
    let predicate = query.predicate()?;
    debug!(kind = query.kind.as_str(), sql = predicate.sql(), "advanced query");

    let records = db.run_predicate_query(query.kind, &predicate, query.limit)?;
    if records.is_empty() {
        return Ok(format!(
            "No {} found matching the given conditions",
            query.kind.plural()
        ));
    }

    let mut out = format!(
        "Found {} {} matching {} condition(s):\n\n",
        records.len(),
        query.kind.plural(),
        query.conditions.len()
    );
    list_records(&mut out, &records);
    Ok(out)
}
