//! Translation of declarative conditions into SQL predicates.
//!
//! A [`Condition`] names a field, an [`Operator`] and a JSON value. It is
//! resolved against an [`EntitySchema`] and turned into a parameterised
//! [`Predicate`]; values are always bound, never spliced into the SQL text.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::errors::{FdepError, Result};
use crate::query::pattern::{build_contains_pattern, normalize, prefix_pattern, suffix_pattern};
use crate::query::schema::{EntitySchema, FieldSpec, FieldType};
use crate::types::EntityKind;

/// Maximum number of values accepted by `in` / `not_in`.
pub const MAX_IN_LIST: usize = 500;

/// Default row limit of an [`EntityQuery`].
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Comparison operators understood by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    Ilike,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
    IsNull,
}

#[allow(clippy::should_implement_trait)]
impl Operator {
    pub const ALL: [Operator; 15] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
        Operator::Like,
        Operator::Ilike,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::IsNull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Ge => "ge",
            Operator::Le => "le",
            Operator::Like => "like",
            Operator::Ilike => "ilike",
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Between => "between",
            Operator::IsNull => "is_null",
        }
    }

    pub fn from_str(s: &str) -> Option<Operator> {
        Operator::ALL.iter().copied().find(|op| op.as_str() == s)
    }

    /// Operators whose value is a wildcard pattern.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::Like
                | Operator::Ilike
                | Operator::Contains
                | Operator::StartsWith
                | Operator::EndsWith
        )
    }
}

/// A single `field operator value` filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Parses a `{field, operator, value}` object.
    ///
    /// Returns `Ok(None)` when `field` or `operator` is missing (the condition
    /// is dropped) and an error for an operator outside the closed set.
    pub fn from_json(value: &Value) -> Result<Option<Condition>> {
        let obj = value
            .as_object()
            .ok_or_else(|| FdepError::validation("each condition must be an object"))?;

        let field = match obj.get("field").and_then(|v| v.as_str()) {
            Some(f) if !f.is_empty() => f,
            _ => return Ok(None),
        };
        let op_name = match obj.get("operator").and_then(|v| v.as_str()) {
            Some(o) if !o.is_empty() => o,
            _ => return Ok(None),
        };
        let operator = Operator::from_str(op_name).ok_or_else(|| {
            FdepError::validation(format!(
                "unknown operator '{}' (expected one of: {})",
                op_name,
                Operator::ALL
                    .iter()
                    .map(|op| op.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        Ok(Some(Condition {
            field: field.to_string(),
            operator,
            value: obj.get("value").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// A parameterised SQL boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    sql: String,
    params: Vec<SqlValue>,
}

impl Predicate {
    fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// The identity predicate, matching every row.
    pub fn match_all() -> Self {
        Self::new("1 = 1", Vec::new())
    }

    pub fn is_match_all(&self) -> bool {
        self.sql == "1 = 1" && self.params.is_empty()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: Predicate) -> Predicate {
        if self.is_match_all() {
            return other;
        }
        if other.is_match_all() {
            return self;
        }
        let mut params = self.params;
        params.extend(other.params);
        Predicate::new(format!("({}) AND ({})", self.sql, other.sql), params)
    }
}

/// Translates one condition against `schema`.
///
/// Returns `Ok(None)` when the field is not part of the schema: unknown fields
/// are dropped rather than rejected. Operators the field type does not
/// support and malformed values are validation errors.
pub fn translate(schema: &EntitySchema, condition: &Condition) -> Result<Option<Predicate>> {
    let field = match schema.field(&condition.field) {
        Some(f) => f,
        None => return Ok(None),
    };

    let op = condition.operator;
    if !field.ty.supports(op) {
        return Err(FdepError::validation(format!(
            "operator '{}' is not supported on {} field '{}'",
            op.as_str(),
            field.ty.as_str(),
            field.name
        )));
    }

    let col = field.column;
    let value = &condition.value;

    let predicate = match op {
        Operator::Eq if value.is_null() => Predicate::new(format!("{col} IS NULL"), vec![]),
        Operator::Ne if value.is_null() => Predicate::new(format!("{col} IS NOT NULL"), vec![]),
        Operator::Eq => compare(col, "=", field, value)?,
        Operator::Ne => compare(col, "!=", field, value)?,
        Operator::Gt => compare(col, ">", field, value)?,
        Operator::Lt => compare(col, "<", field, value)?,
        Operator::Ge => compare(col, ">=", field, value)?,
        Operator::Le => compare(col, "<=", field, value)?,
        Operator::Like => like(col, normalize(pattern_value(field, value)?)),
        Operator::Ilike => Predicate::new(
            format!("LOWER({col}) LIKE LOWER(?)"),
            vec![SqlValue::Text(normalize(pattern_value(field, value)?))],
        ),
        Operator::Contains => like(col, build_contains_pattern(pattern_value(field, value)?)),
        Operator::StartsWith => like(col, prefix_pattern(pattern_value(field, value)?)),
        Operator::EndsWith => like(col, suffix_pattern(pattern_value(field, value)?)),
        Operator::In => membership(col, "IN", field, value)?,
        Operator::NotIn => membership(col, "NOT IN", field, value)?,
        Operator::Between => {
            let bounds = value
                .as_array()
                .filter(|items| items.len() == 2)
                .ok_or_else(|| {
                    FdepError::validation(format!(
                        "'between' on '{}' requires a two-element array [low, high]",
                        field.name
                    ))
                })?;
            Predicate::new(
                format!("{col} BETWEEN ? AND ?"),
                vec![scalar(field, &bounds[0])?, scalar(field, &bounds[1])?],
            )
        }
        Operator::IsNull => Predicate::new(format!("{col} IS NULL"), vec![]),
    };

    Ok(Some(predicate))
}

/// Translates and AND-combines `conditions` in order.
///
/// Skipped conditions contribute nothing; an empty list yields
/// [`Predicate::match_all`]. The first invalid condition aborts translation.
pub fn translate_all(schema: &EntitySchema, conditions: &[Condition]) -> Result<Predicate> {
    let mut combined = Predicate::match_all();
    for condition in conditions {
        if let Some(fragment) = translate(schema, condition)? {
            combined = combined.and(fragment);
        }
    }
    Ok(combined)
}

fn compare(col: &str, sql_op: &str, field: &FieldSpec, value: &Value) -> Result<Predicate> {
    Ok(Predicate::new(
        format!("{col} {sql_op} ?"),
        vec![scalar(field, value)?],
    ))
}

fn like(col: &str, pattern: String) -> Predicate {
    Predicate::new(format!("{col} LIKE ?"), vec![SqlValue::Text(pattern)])
}

fn membership(col: &str, sql_op: &str, field: &FieldSpec, value: &Value) -> Result<Predicate> {
    let items = value.as_array().ok_or_else(|| {
        FdepError::validation(format!(
            "'{}' on '{}' requires an array value",
            if sql_op == "IN" { "in" } else { "not_in" },
            field.name
        ))
    })?;

    if items.len() > MAX_IN_LIST {
        return Err(FdepError::validation(format!(
            "too many values for '{}' ({} > {})",
            field.name,
            items.len(),
            MAX_IN_LIST
        )));
    }

    // x IN () is false for every row, x NOT IN () is true.
    if items.is_empty() {
        let sql = if sql_op == "IN" { "0 = 1" } else { "1 = 1" };
        return Ok(Predicate::new(sql, vec![]));
    }

    let params = items
        .iter()
        .map(|item| scalar(field, item))
        .collect::<Result<Vec<_>>>()?;
    let placeholders = vec!["?"; params.len()].join(", ");
    Ok(Predicate::new(
        format!("{col} {sql_op} ({placeholders})"),
        params,
    ))
}

fn pattern_value<'v>(field: &FieldSpec, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        FdepError::validation(format!(
            "pattern operators on '{}' require a string value",
            field.name
        ))
    })
}

/// Converts a JSON scalar into a bound SQL value.
fn scalar(field: &FieldSpec, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                if field.ty == FieldType::Integer && f.fract() == 0.0 {
                    Ok(SqlValue::Integer(f as i64))
                } else {
                    Ok(SqlValue::Real(f))
                }
            } else {
                Err(FdepError::validation(format!(
                    "number out of range for '{}'",
                    field.name
                )))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(FdepError::validation(format!(
            "value for '{}' must be a scalar",
            field.name
        ))),
    }
}

/// A filtered, limited query over one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityQuery {
    pub kind: EntityKind,
    pub conditions: Vec<Condition>,
    pub limit: usize,
}

impl EntityQuery {
    /// Parses a `{type, conditions, limit}` object.
    ///
    /// `limit` defaults to [`DEFAULT_QUERY_LIMIT`], must be positive and is
    /// clamped to `max_limit`.
    pub fn from_json(value: &Value, max_limit: usize) -> Result<EntityQuery> {
        let obj = value
            .as_object()
            .ok_or_else(|| FdepError::validation("query must be an object"))?;

        let kind_name = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FdepError::validation("query is missing 'type'"))?;
        let kind = EntityKind::from_str(kind_name).ok_or_else(|| FdepError::UnsupportedEntity {
            kind: kind_name.to_string(),
        })?;

        let mut conditions = Vec::new();
        match obj.get("conditions") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(condition) = Condition::from_json(item)? {
                        conditions.push(condition);
                    }
                }
            }
            Some(_) => return Err(FdepError::validation("'conditions' must be an array")),
        }

        let limit = match obj.get("limit") {
            None | Some(Value::Null) => DEFAULT_QUERY_LIMIT,
            Some(v) => match v.as_u64() {
                Some(n) if n > 0 => n as usize,
                _ => {
                    return Err(FdepError::validation(
                        "'limit' must be a positive integer",
                    ))
                }
            },
        };

        Ok(EntityQuery {
            kind,
            conditions,
            limit: limit.min(max_limit),
        })
    }

    /// Translates the conditions against this kind's schema.
    pub fn predicate(&self) -> Result<Predicate> {
        translate_all(EntitySchema::for_kind(self.kind), &self.conditions)
    }
}
