//! Tool handlers. Each takes the service handle and validated arguments and
//! returns the response text; "not found" and validation failures are
//! returned as errors and turned into outcomes by the dispatcher.

pub mod analysis;
pub mod context;
pub mod functions;
pub mod imports;
pub mod modules;
pub mod queries;
pub mod type_system;

use crate::db::Database;
use crate::errors::{FdepError, Result};
use crate::query::{build_contains_pattern, normalize, translate, Condition, EntitySchema, Operator, Predicate};
use crate::types::{EntityKind, EntityRecord, GraphFormat};

/// Resolves an optional module name; a given but unknown name is an error.
pub(crate) fn resolve_module(db: &Database, module_name: Option<&str>) -> Result<Option<EntityRecord>> {
    match module_name {
        None => Ok(None),
        Some(name) => db
            .get_module_by_name(name)?
            .map(Some)
            .ok_or_else(|| FdepError::not_found("Module", name)),
    }
}

/// The module named `name`.
pub(crate) fn require_module(db: &Database, name: &str) -> Result<EntityRecord> {
    db.get_module_by_name(name)?
        .ok_or_else(|| FdepError::not_found("Module", name))
}

/// Functions named `name`, optionally within `module_name`. Never empty.
pub(crate) fn resolve_functions(
    db: &Database,
    name: &str,
    module_name: Option<&str>,
) -> Result<Vec<EntityRecord>> {
    let module = resolve_module(db, module_name)?;
    let found = db.get_entity_by_name(EntityKind::Function, name, module.map(|m| m.id))?;
    if found.is_empty() {
        return Err(FdepError::not_found("Function", name));
    }
    Ok(found)
}

pub(crate) fn resolve_function(db: &Database, name: &str, module_name: Option<&str>) -> Result<EntityRecord> {
    let mut found = resolve_functions(db, name, module_name)?;
    Ok(found.remove(0))
}

pub(crate) fn resolve_type(db: &Database, name: &str, module_name: Option<&str>) -> Result<EntityRecord> {
    let module = resolve_module(db, module_name)?;
    db.get_entity_by_name(EntityKind::Type, name, module.map(|m| m.id))?
        .into_iter()
        .next()
        .ok_or_else(|| FdepError::not_found("Type", name))
}

/// A user search pattern as a LIKE pattern: `*` becomes `%`, and a pattern
/// without wildcards matches as a substring.
pub(crate) fn search_pattern(pattern: &str) -> String {
    build_contains_pattern(&normalize(pattern))
}

/// Predicate on `field` of `kind` with `operator` and `value`.
pub(crate) fn field_predicate(
    kind: EntityKind,
    field: &str,
    operator: Operator,
    value: serde_json::Value,
) -> Result<Predicate> {
    let schema = EntitySchema::for_kind(kind);
    Ok(translate(schema, &Condition::new(field, operator, value))?.unwrap_or_else(Predicate::match_all))
}

/// Substring/wildcard match on the display name of `kind`.
pub(crate) fn name_matches(kind: EntityKind, pattern: &str) -> Result<Predicate> {
    let field = EntitySchema::for_kind(kind).name_column;
    field_predicate(kind, field, Operator::Like, search_pattern(pattern).into())
}

/// Substring/wildcard match on the owning module name.
pub(crate) fn module_matches(kind: EntityKind, pattern: &str) -> Result<Predicate> {
    field_predicate(kind, "module", Operator::Like, search_pattern(pattern).into())
}

pub(crate) fn parse_format(value: Option<&str>) -> GraphFormat {
    value.and_then(GraphFormat::from_str).unwrap_or(GraphFormat::Tree)
}

/// ` (in Module.Name)` or nothing.
pub(crate) fn in_module(record: &EntityRecord) -> String {
    record
        .module
        .as_deref()
        .map(|m| format!(" (in {m})"))
        .unwrap_or_default()
}

/// Truncates `s` to `max` chars with an ellipsis.
pub(crate) fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    }
}
