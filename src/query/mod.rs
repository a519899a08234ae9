//! Query building: wildcard patterns, entity schemas and condition translation.

/// Wildcard pattern normalization.
pub mod pattern;

/// Per-entity field tables.
pub mod schema;

/// Condition-to-predicate translation.
pub mod condition;

pub use condition::{
    translate, translate_all, Condition, EntityQuery, Operator, Predicate, DEFAULT_QUERY_LIMIT,
    MAX_IN_LIST,
};
pub use pattern::{build_contains_pattern, matches_pattern, normalize, prefix_pattern, suffix_pattern};
pub use schema::{EntitySchema, FieldSpec, FieldType};
