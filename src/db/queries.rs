use std::collections::{HashSet, VecDeque};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::connection::{db_err, Database};
use crate::analysis::signature;
use crate::errors::{FdepError, Result};
use crate::query::{EntitySchema, Predicate};
use crate::types::*;

/// Every table the schema defines. Table names interpolated into SQL must
/// come from this list.
pub const KNOWN_TABLES: [&str; 11] = [
    "modules",
    "functions",
    "function_calls",
    "where_functions",
    "types",
    "constructors",
    "fields",
    "type_dependencies",
    "classes",
    "imports",
    "instances",
];

/// Upper bound on edges loaded per node when building a whole-store graph.
const EDGE_FANOUT: usize = 10;

/// Node id of a stored function in a call graph.
pub fn function_node_id(id: i64) -> NodeId {
    format!("fn:{id}")
}

/// Node id of a stored type in a type-dependency graph.
pub fn type_node_id(id: i64) -> NodeId {
    format!("type:{id}")
}

// ---------------------------------------------------------------------------
// Helper: map a rusqlite row to domain types
// ---------------------------------------------------------------------------

/// Maps the six columns produced by `EntitySchema::select_clause`.
fn row_to_entity(kind: EntityKind) -> impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<EntityRecord> {
    move |row| {
        Ok(EntityRecord {
            kind,
            id: row.get(0)?,
            name: row.get(1)?,
            module_id: row.get(2)?,
            module: row.get(3)?,
            detail: row.get(4)?,
            location: row.get(5)?,
        })
    }
}

fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallRecord> {
    Ok(CallRecord {
        caller_id: row.get(0)?,
        callee_id: row.get(1)?,
        name: row.get(2)?,
        module_name: row.get(3)?,
    })
}

fn row_to_import(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportRecord> {
    let style: Option<String> = row.get(5)?;
    let hiding: i64 = row.get(6)?;
    Ok(ImportRecord {
        id: row.get(0)?,
        module_id: row.get(1)?,
        importing_module: row.get(2)?,
        module_name: row.get(3)?,
        package_name: row.get(4)?,
        qualified: matches!(style.as_deref(), Some(s) if !s.is_empty() && s != "NotQualified"),
        is_hiding: hiding != 0,
        as_module_name: row.get(7)?,
        src_loc: row.get(8)?,
        internal: row.get(9)?,
    })
}

fn function_node(record: &EntityRecord) -> GraphNode {
    let mut node = GraphNode::new(function_node_id(record.id), record.name.clone());
    if let Some(ref m) = record.module {
        node = node.with_module(m.clone());
    }
    if let Some(ref sig) = record.detail {
        node = node.with_signature(sig.clone());
    }
    node
}

fn type_node(record: &EntityRecord) -> GraphNode {
    let mut node = GraphNode::new(type_node_id(record.id), record.name.clone());
    if let Some(ref m) = record.module {
        node = node.with_module(m.clone());
    }
    node
}

fn sql_limit(limit: usize) -> SqlValue {
    SqlValue::Integer(limit.min(i64::MAX as usize) as i64)
}

/// The location column of a kind that records line spans.
fn located_column(schema: &EntitySchema) -> Result<&'static str> {
    match (schema.location_column, schema.field("line_number_start")) {
        (Some(column), Some(_)) => Ok(column),
        _ => Err(FdepError::UnsupportedEntity {
            kind: format!("{} (no source lines)", schema.kind.as_str()),
        }),
    }
}

// ---------------------------------------------------------------------------
// Generic entity operations
// ---------------------------------------------------------------------------

impl Database {
    fn query_entities(
        &self,
        kind: EntityKind,
        sql: &str,
        params: Vec<SqlValue>,
        operation: &'static str,
    ) -> Result<Vec<EntityRecord>> {
        let mut stmt = self.conn().prepare(sql).map_err(db_err(operation))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_to_entity(kind))
            .map_err(db_err(operation))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err(operation))
    }

    /// Entities of `kind` whose display name equals `name`, optionally
    /// restricted to one module.
    pub fn get_entity_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        scope_id: Option<i64>,
    ) -> Result<Vec<EntityRecord>> {
        let schema = EntitySchema::for_kind(kind);
        let mut sql = format!("{} WHERE {} = ?", schema.select_clause(), schema.name_expr());
        let mut params = vec![SqlValue::Text(name.to_string())];
        if let (Some(scope), Some(id)) = (schema.scope_column, scope_id) {
            sql.push_str(&format!(" AND t.{scope} = ?"));
            params.push(SqlValue::Integer(id));
        }
        sql.push_str(" ORDER BY t.id");
        self.query_entities(kind, &sql, params, "get_entity_by_name")
    }

    /// Looks up a single entity by primary key.
    pub fn get_entity_by_id(&self, kind: EntityKind, id: i64) -> Result<Option<EntityRecord>> {
        let schema = EntitySchema::for_kind(kind);
        let sql = format!("{} WHERE t.id = ?1", schema.select_clause());
        self.conn()
            .query_row(&sql, [id], row_to_entity(kind))
            .optional()
            .map_err(db_err("get_entity_by_id"))
    }

    /// Entities of `kind` defined in module `scope_id`, in id order.
    pub fn get_entities_by_scope(
        &self,
        kind: EntityKind,
        scope_id: i64,
        limit: usize,
    ) -> Result<Vec<EntityRecord>> {
        let schema = EntitySchema::for_kind(kind);
        let scope = schema.scope_column.ok_or_else(|| FdepError::UnsupportedEntity {
            kind: format!("{} (not module-scoped)", kind.as_str()),
        })?;
        let sql = format!(
            "{} WHERE t.{scope} = ? ORDER BY t.id LIMIT ?",
            schema.select_clause()
        );
        self.query_entities(
            kind,
            &sql,
            vec![SqlValue::Integer(scope_id), sql_limit(limit)],
            "get_entities_by_scope",
        )
    }

    /// Number of entities of `kind` matching `predicate`.
    pub fn count_entities(&self, kind: EntityKind, predicate: &Predicate) -> Result<u64> {
        let schema = EntitySchema::for_kind(kind);
        let join = match schema.scope_column {
            Some(scope) => format!(" LEFT JOIN modules m ON m.id = t.{scope}"),
            None => String::new(),
        };
        let sql = format!(
            "SELECT COUNT(*) FROM {} t{} WHERE {}",
            schema.table,
            join,
            predicate.sql()
        );
        let count: i64 = self
            .conn()
            .query_row(&sql, params_from_iter(predicate.params().iter()), |row| {
                row.get(0)
            })
            .map_err(db_err("count_entities"))?;
        Ok(count as u64)
    }

    /// Entities of `kind` matching `predicate`, in id order, at most `limit`.
    pub fn run_predicate_query(
        &self,
        kind: EntityKind,
        predicate: &Predicate,
        limit: usize,
    ) -> Result<Vec<EntityRecord>> {
        let schema = EntitySchema::for_kind(kind);
        let sql = format!(
            "{} WHERE {} ORDER BY t.id LIMIT ?",
            schema.select_clause(),
            predicate.sql()
        );
        let mut params = predicate.params().to_vec();
        params.push(sql_limit(limit));
        self.query_entities(kind, &sql, params, "run_predicate_query")
    }

    /// First module named exactly `name`.
    pub fn get_module_by_name(&self, name: &str) -> Result<Option<EntityRecord>> {
        Ok(self
            .get_entity_by_name(EntityKind::Module, name, None)?
            .into_iter()
            .next())
    }
}

// ---------------------------------------------------------------------------
// Call relationships
// ---------------------------------------------------------------------------

impl Database {
    /// Functions containing a call to `target`. Calls recorded without a
    /// module name match any definition with that name.
    pub fn get_callers(&self, target: &EntityRecord, limit: usize) -> Result<Vec<EntityRecord>> {
        let sql = "SELECT DISTINCT f.id, f.name, f.module_id, m.name, f.function_signature, f.src_loc
                   FROM function_calls c
                   JOIN functions f ON f.id = c.function_id
                   LEFT JOIN modules m ON m.id = f.module_id
                   WHERE c.name = ?1
                     AND (c.module_name IS NULL OR ?2 IS NULL OR c.module_name = ?2)
                   ORDER BY f.id
                   LIMIT ?3";
        self.query_entities(
            EntityKind::Function,
            sql,
            vec![
                SqlValue::Text(target.name.clone()),
                target.module.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                sql_limit(limit),
            ],
            "get_callers",
        )
    }

    /// Calls made by function `function_id`, in call-site order. `callee_id`
    /// is resolved when the callee is a stored function.
    pub fn get_callees(&self, function_id: i64, limit: usize) -> Result<Vec<CallRecord>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT c.function_id,
                        (SELECT f2.id FROM functions f2
                           JOIN modules m2 ON m2.id = f2.module_id
                          WHERE f2.name = c.name AND m2.name = c.module_name
                          ORDER BY f2.id LIMIT 1),
                        c.name, c.module_name
                 FROM function_calls c
                 WHERE c.function_id = ?1
                 ORDER BY c.id
                 LIMIT ?2",
            )
            .map_err(db_err("get_callees"))?;
        let rows = stmt
            .query_map(params![function_id, sql_limit(limit)], row_to_call)
            .map_err(db_err("get_callees"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_callees"))
    }

    /// Callees ranked by number of call sites.
    pub fn get_most_called(&self, limit: usize) -> Result<Vec<CallCount>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT name, module_name, COUNT(*) AS calls
                 FROM function_calls
                 GROUP BY name, module_name
                 ORDER BY calls DESC, name
                 LIMIT ?1",
            )
            .map_err(db_err("get_most_called"))?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], |row| {
                Ok(CallCount {
                    name: row.get(0)?,
                    module_name: row.get(1)?,
                    calls: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(db_err("get_most_called"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_most_called"))
    }

    /// Calls whose callee module differs from the caller's module. Both
    /// filters are LIKE patterns.
    pub fn get_cross_module_calls(
        &self,
        source_pattern: Option<&str>,
        target_pattern: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CrossModuleCall>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT m.name, f.name, c.module_name, c.name
                 FROM function_calls c
                 JOIN functions f ON f.id = c.function_id
                 JOIN modules m ON m.id = f.module_id
                 WHERE c.module_name IS NOT NULL
                   AND c.module_name != m.name
                   AND (?1 IS NULL OR m.name LIKE ?1)
                   AND (?2 IS NULL OR c.module_name LIKE ?2)
                 ORDER BY c.id
                 LIMIT ?3",
            )
            .map_err(db_err("get_cross_module_calls"))?;
        let rows = stmt
            .query_map(params![source_pattern, target_pattern, sql_limit(limit)], |row| {
                Ok(CrossModuleCall {
                    caller_module: row.get(0)?,
                    caller_name: row.get(1)?,
                    target_module: row.get(2)?,
                    target_name: row.get(3)?,
                })
            })
            .map_err(db_err("get_cross_module_calls"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_cross_module_calls"))
    }

    /// Functions scoring at least `min_score`, with their outgoing call count
    /// and local definition count, highest score first (ties in id order).
    ///
    /// The score is evaluated in SQL with the same terms as
    /// [`crate::analysis::complexity::score`] so that `limit` applies after
    /// ranking. Counts read as zero when their table is absent.
    pub fn complexity_candidates(
        &self,
        scope: ModuleScope<'_>,
        min_score: u64,
        limit: usize,
    ) -> Result<Vec<(EntityRecord, u64, u64)>> {
        let calls = if self.has_table("function_calls")? {
            "(SELECT COUNT(*) FROM function_calls c WHERE c.function_id = t.id)"
        } else {
            "0"
        };
        let locals = if self.has_table("where_functions")? {
            "(SELECT COUNT(*) FROM where_functions w WHERE w.parent_function_id = t.id)"
        } else {
            "0"
        };
        let sql = format!(
            "WITH f AS (
                 SELECT t.id AS id, t.name AS name, t.module_id AS module_id, m.name AS module,
                        t.function_signature AS sig, t.src_loc AS loc,
                        {calls} AS calls, {locals} AS locals
                 FROM functions t LEFT JOIN modules m ON m.id = t.module_id
                 WHERE (?1 IS NULL OR t.module_id = ?1)
                   AND (?4 IS NULL OR m.name LIKE ?4)
             ),
             s AS (
                 SELECT f.*,
                        COALESCE(LENGTH(sig) / 20, 0)
                        + COALESCE(LENGTH(sig) - LENGTH(REPLACE(sig, '->', '')), 0)
                        + calls / 3
                        + locals * 2 AS score
                 FROM f
             )
             SELECT id, name, module_id, module, sig, loc, calls, locals
             FROM s
             WHERE score >= ?2
             ORDER BY score DESC, id
             LIMIT ?3"
        );
        let mut stmt = self
            .conn()
            .prepare(&sql)
            .map_err(db_err("complexity_candidates"))?;
        let to_entity = row_to_entity(EntityKind::Function);
        let min_score = i64::try_from(min_score).unwrap_or(i64::MAX);
        let (module_id, module_pattern) = match scope {
            ModuleScope::All => (None, None),
            ModuleScope::Module(id) => (Some(id), None),
            ModuleScope::Matching(pattern) => (None, Some(pattern)),
        };
        let rows = stmt
            .query_map(params![module_id, min_score, sql_limit(limit), module_pattern], |row| {
                Ok((
                    to_entity(row)?,
                    row.get::<_, i64>(6)? as u64,
                    row.get::<_, i64>(7)? as u64,
                ))
            })
            .map_err(db_err("complexity_candidates"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("complexity_candidates"))
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

impl Database {
    /// Row count of `table`, or `None` if the table does not exist.
    pub fn count_table(&self, table: &str) -> Result<Option<u64>> {
        if !KNOWN_TABLES.contains(&table) {
            return Err(FdepError::validation(format!("unknown table: {table}")));
        }
        if !self.has_table(table)? {
            return Ok(None);
        }
        let count: i64 = self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(db_err("count_table"))?;
        Ok(Some(count as u64))
    }

    fn count_in_module(&self, table: &str, module_id: i64) -> Result<Option<u64>> {
        if !KNOWN_TABLES.contains(&table) {
            return Err(FdepError::validation(format!("unknown table: {table}")));
        }
        if !self.has_table(table)? {
            return Ok(None);
        }
        let count: i64 = self
            .conn()
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE module_id = ?1"),
                [module_id],
                |row| row.get(0),
            )
            .map_err(db_err("count_in_module"))?;
        Ok(Some(count as u64))
    }

    /// Per-kind entity counts for one module.
    pub fn module_counts(&self, module_id: i64) -> Result<ModuleCounts> {
        Ok(ModuleCounts {
            functions: self.count_in_module("functions", module_id)?.unwrap_or(0),
            types: self.count_in_module("types", module_id)?,
            classes: self.count_in_module("classes", module_id)?,
            imports: self.count_in_module("imports", module_id)?,
            instances: self.count_in_module("instances", module_id)?,
        })
    }

    /// Modules with the most functions.
    pub fn top_modules_by_function_count(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT m.name, COUNT(f.id) AS n
                 FROM modules m JOIN functions f ON f.module_id = m.id
                 GROUP BY m.id
                 ORDER BY n DESC, m.name
                 LIMIT ?1",
            )
            .map_err(db_err("top_modules_by_function_count"))?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db_err("top_modules_by_function_count"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("top_modules_by_function_count"))
    }

    /// Number of functions with a non-empty signature.
    pub fn signed_function_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM functions
                 WHERE function_signature IS NOT NULL AND function_signature != ''",
                [],
                |row| row.get(0),
            )
            .map_err(db_err("signed_function_count"))?;
        Ok(n as u64)
    }

    /// Type counts per category (`type_of_type`).
    pub fn type_category_counts(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT COALESCE(type_of_type, 'UNKNOWN'), COUNT(*) AS n
                 FROM types GROUP BY 1 ORDER BY n DESC, 1",
            )
            .map_err(db_err("type_category_counts"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))
            .map_err(db_err("type_category_counts"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("type_category_counts"))
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

impl Database {
    /// Constructors of a type with their fields, or `None` when the store
    /// has no constructor table. Fields are left empty unless requested or
    /// when the field table is absent.
    pub fn get_constructors(
        &self,
        type_id: i64,
        include_fields: bool,
    ) -> Result<Option<Vec<ConstructorRecord>>> {
        if !self.has_table("constructors")? {
            return Ok(None);
        }
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name FROM constructors WHERE type_id = ?1 ORDER BY id")
            .map_err(db_err("get_constructors"))?;
        let rows = stmt
            .query_map([type_id], |row| {
                Ok(ConstructorRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    fields: Vec::new(),
                })
            })
            .map_err(db_err("get_constructors"))?;
        let mut constructors = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_constructors"))?;

        if include_fields && self.has_table("fields")? {
            let mut stmt = self
                .conn()
                .prepare(
                    "SELECT field_name, field_type_raw FROM fields
                     WHERE constructor_id = ?1 ORDER BY id",
                )
                .map_err(db_err("get_constructors"))?;
            for ctor in &mut constructors {
                let rows = stmt
                    .query_map([ctor.id], |row| {
                        Ok(FieldRecord {
                            name: row.get(0)?,
                            type_raw: row.get(1)?,
                        })
                    })
                    .map_err(db_err("get_constructors"))?;
                ctor.fields = rows
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err("get_constructors"))?;
            }
        }

        Ok(Some(constructors))
    }

    /// Full definition of a type record.
    pub fn get_type_detail(
        &self,
        record: EntityRecord,
        include_constructors: bool,
        include_fields: bool,
    ) -> Result<TypeDetail> {
        let raw_code: Option<String> = self
            .conn()
            .query_row("SELECT raw_code FROM types WHERE id = ?1", [record.id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err("get_type_detail"))?
            .flatten();
        let constructors = if include_constructors {
            self.get_constructors(record.id, include_fields)?
        } else {
            None
        };
        Ok(TypeDetail {
            record,
            raw_code,
            constructors,
        })
    }

    fn related_types(&self, sql: &str, type_id: i64, operation: &'static str) -> Result<Option<Vec<EntityRecord>>> {
        if !self.has_table("type_dependencies")? {
            return Ok(None);
        }
        self.query_entities(
            EntityKind::Type,
            sql,
            vec![SqlValue::Integer(type_id)],
            operation,
        )
        .map(Some)
    }

    /// Types referenced by `type_id`, or `None` without dependency data.
    pub fn get_type_dependencies(&self, type_id: i64) -> Result<Option<Vec<EntityRecord>>> {
        self.related_types(
            "SELECT t.id, t.type_name, t.module_id, m.name, t.type_of_type, t.src_loc
             FROM type_dependencies d
             JOIN types t ON t.id = d.dependency_id
             LEFT JOIN modules m ON m.id = t.module_id
             WHERE d.dependent_id = ?1
             ORDER BY d.id",
            type_id,
            "get_type_dependencies",
        )
    }

    /// Types referring to `type_id`, or `None` without dependency data.
    pub fn get_type_dependents(&self, type_id: i64) -> Result<Option<Vec<EntityRecord>>> {
        self.related_types(
            "SELECT t.id, t.type_name, t.module_id, m.name, t.type_of_type, t.src_loc
             FROM type_dependencies d
             JOIN types t ON t.id = d.dependent_id
             LEFT JOIN modules m ON m.id = t.module_id
             WHERE d.dependency_id = ?1
             ORDER BY d.id",
            type_id,
            "get_type_dependents",
        )
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

impl Database {
    /// Entities of `kind` whose `column` mentions `name` as a whole word, in
    /// id order. Rows are streamed so that `limit` counts whole-word matches.
    fn entities_mentioning(
        &self,
        kind: EntityKind,
        column: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<EntityRecord>> {
        let schema = EntitySchema::for_kind(kind);
        let sql = format!(
            "{}, t.{column} FROM {} t LEFT JOIN modules m ON m.id = t.module_id
             WHERE instr(t.{column}, ?1) > 0
             ORDER BY t.id",
            entity_columns(schema),
            schema.table,
        );
        let mut stmt = self.conn().prepare(&sql).map_err(db_err("entities_mentioning"))?;
        let mut rows = stmt.query([name]).map_err(db_err("entities_mentioning"))?;
        let to_entity = row_to_entity(kind);
        let mut out = Vec::new();
        while out.len() < limit {
            let row = match rows.next().map_err(db_err("entities_mentioning"))? {
                Some(row) => row,
                None => break,
            };
            let text: String = row.get(6).map_err(db_err("entities_mentioning"))?;
            if signature::mentions(&text, name) {
                out.push(to_entity(row).map_err(db_err("entities_mentioning"))?);
            }
        }
        Ok(out)
    }

    /// Functions whose signature mentions type `name`.
    pub fn functions_mentioning_type(&self, name: &str, limit: usize) -> Result<Vec<EntityRecord>> {
        self.entities_mentioning(EntityKind::Function, "function_signature", name, limit)
    }

    /// Instances whose head mentions `name`.
    pub fn instances_mentioning(&self, name: &str, limit: usize) -> Result<Vec<EntityRecord>> {
        if !self.has_table("instances")? {
            return Ok(Vec::new());
        }
        self.entities_mentioning(EntityKind::Instance, "instance_definition", name, limit)
    }

    /// Types, optionally of one module, with the number of types referring
    /// to them; only those referred to at least `min_refs` times, in id order.
    pub fn type_usage_counts(
        &self,
        module_id: Option<i64>,
        min_refs: u64,
        limit: usize,
    ) -> Result<Vec<(EntityRecord, u64)>> {
        let refs = if self.has_table("type_dependencies")? {
            "(SELECT COUNT(*) FROM type_dependencies d WHERE d.dependency_id = t.id)"
        } else {
            "0"
        };
        let sql = format!(
            "SELECT * FROM (
                 {}, {refs} AS refs FROM types t LEFT JOIN modules m ON m.id = t.module_id
                 WHERE (?1 IS NULL OR t.module_id = ?1)
             )
             WHERE refs >= ?2
             ORDER BY id
             LIMIT ?3",
            entity_columns(EntitySchema::for_kind(EntityKind::Type)),
        );
        let mut stmt = self.conn().prepare(&sql).map_err(db_err("type_usage_counts"))?;
        let to_entity = row_to_entity(EntityKind::Type);
        let min_refs = i64::try_from(min_refs).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![module_id, min_refs, sql_limit(limit)], |row| {
                Ok((to_entity(row)?, row.get::<_, i64>(6)? as u64))
            })
            .map_err(db_err("type_usage_counts"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("type_usage_counts"))
    }
}

/// The six entity columns of `schema`, without the FROM clause, with
/// result column names so that they can be selected from a subquery.
fn entity_columns(schema: &EntitySchema) -> String {
    let optional = |col: Option<&str>| col.map(|c| format!("t.{c}")).unwrap_or_else(|| "NULL".to_string());
    format!(
        "SELECT t.id AS id, t.{} AS name, t.module_id AS module_id, m.name AS module, {} AS detail, {} AS location",
        schema.name_column,
        optional(schema.detail_column),
        optional(schema.location_column),
    )
}

// ---------------------------------------------------------------------------
// Cross-module coupling
// ---------------------------------------------------------------------------

/// Calls grouped by caller module and callee module, for callees in another
/// module.
const MODULE_PAIRS: &str = "WITH pairs AS (
        SELECT m.name AS caller, c.module_name AS callee, COUNT(*) AS calls
        FROM function_calls c
        JOIN functions f ON f.id = c.function_id
        JOIN modules m ON m.id = f.module_id
        WHERE c.module_name IS NOT NULL AND c.module_name != m.name
        GROUP BY m.name, c.module_name
    )";

impl Database {
    /// Module pairs with at least `min_calls` calls, most calls first. The
    /// pattern is a LIKE pattern matched against either module.
    pub fn get_module_call_counts(
        &self,
        module_pattern: Option<&str>,
        min_calls: u64,
        limit: usize,
    ) -> Result<Vec<ModuleDependency>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "{MODULE_PAIRS}
                 SELECT caller, callee, calls FROM pairs
                 WHERE calls >= ?1 AND (?2 IS NULL OR caller LIKE ?2 OR callee LIKE ?2)
                 ORDER BY calls DESC, caller, callee
                 LIMIT ?3"
            ))
            .map_err(db_err("get_module_call_counts"))?;
        let min_calls = i64::try_from(min_calls).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![min_calls, module_pattern, sql_limit(limit)], |row| {
                Ok(ModuleDependency {
                    caller_module: row.get(0)?,
                    callee_module: row.get(1)?,
                    calls: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(db_err("get_module_call_counts"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_module_call_counts"))
    }

    /// Number of modules taking part in cross-module calls, of distinct
    /// module pairs, and of calls.
    pub fn get_coupling_summary(&self) -> Result<CouplingSummary> {
        self.conn()
            .query_row(
                &format!(
                    "{MODULE_PAIRS}
                     SELECT (SELECT COUNT(*) FROM (SELECT caller FROM pairs UNION SELECT callee FROM pairs)),
                            COUNT(*), COALESCE(SUM(calls), 0)
                     FROM pairs"
                ),
                [],
                |row| {
                    Ok(CouplingSummary {
                        modules: row.get::<_, i64>(0)? as u64,
                        dependencies: row.get::<_, i64>(1)? as u64,
                        calls: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .map_err(db_err("get_coupling_summary"))
    }

    /// Incoming and outgoing cross-module calls per module, for modules with
    /// at least `min_total` of them, most coupled first.
    pub fn get_module_coupling(
        &self,
        module_pattern: Option<&str>,
        min_total: u64,
        limit: usize,
    ) -> Result<Vec<ModuleCoupling>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "{MODULE_PAIRS}
                 SELECT name, SUM(incoming), SUM(outgoing), SUM(incoming) + SUM(outgoing) AS total
                 FROM (SELECT callee AS name, calls AS incoming, 0 AS outgoing FROM pairs
                       UNION ALL
                       SELECT caller, 0, calls FROM pairs)
                 WHERE ?2 IS NULL OR name LIKE ?2
                 GROUP BY name
                 HAVING total >= ?1
                 ORDER BY total DESC, name
                 LIMIT ?3"
            ))
            .map_err(db_err("get_module_coupling"))?;
        let min_total = i64::try_from(min_total).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![min_total, module_pattern, sql_limit(limit)], |row| {
                Ok(ModuleCoupling {
                    name: row.get(0)?,
                    incoming: row.get::<_, i64>(1)? as u64,
                    outgoing: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(db_err("get_module_coupling"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_module_coupling"))
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

impl Database {
    /// The entity of `kind` whose source location names `path` and whose
    /// line span is nearest to `line`. A span containing the line wins (the
    /// innermost one); otherwise the span within `radius` lines whose start
    /// is closest.
    pub fn find_at_location(
        &self,
        kind: EntityKind,
        path: &str,
        line: i64,
        radius: i64,
    ) -> Result<Option<EntityRecord>> {
        let schema = EntitySchema::for_kind(kind);
        let location = located_column(schema)?;
        let sql = format!(
            "{} WHERE instr(t.{location}, ?1) > 0
               AND t.line_number_start IS NOT NULL
               AND t.line_number_start <= ?2 + ?3
               AND COALESCE(t.line_number_end, t.line_number_start) >= ?2 - ?3
             ORDER BY CASE
                          WHEN t.line_number_start <= ?2
                           AND COALESCE(t.line_number_end, t.line_number_start) >= ?2 THEN 0
                          ELSE ABS(t.line_number_start - ?2)
                      END,
                      t.line_number_start DESC,
                      t.id
             LIMIT 1",
            schema.select_clause()
        );
        self.conn()
            .query_row(&sql, params![path, line, radius], row_to_entity(kind))
            .optional()
            .map_err(db_err("find_at_location"))
    }
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

const IMPORT_SELECT: &str = "SELECT i.id, i.module_id, m.name, i.module_name, i.package_name,
                                    i.qualified_style, i.is_hiding, i.as_module_name, i.src_loc,
                                    EXISTS (SELECT 1 FROM modules d WHERE d.name = i.module_name)
                             FROM imports i LEFT JOIN modules m ON m.id = i.module_id";

/// Node id of a module in an import graph.
pub fn module_node_id(name: &str) -> NodeId {
    format!("mod:{name}")
}

impl Database {
    fn query_imports(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<ImportRecord>> {
        let mut stmt = self.conn().prepare(sql).map_err(db_err("query_imports"))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), row_to_import)
            .map_err(db_err("query_imports"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("query_imports"))
    }

    /// Imports declared by module `module_id`.
    pub fn get_imports_for_module(&self, module_id: i64, limit: usize) -> Result<Vec<ImportRecord>> {
        self.query_imports(
            &format!("{IMPORT_SELECT} WHERE i.module_id = ?1 ORDER BY i.id LIMIT ?2"),
            vec![SqlValue::Integer(module_id), sql_limit(limit)],
        )
    }

    pub fn get_import(&self, id: i64) -> Result<Option<ImportRecord>> {
        Ok(self
            .query_imports(
                &format!("{IMPORT_SELECT} WHERE i.id = ?1"),
                vec![SqlValue::Integer(id)],
            )?
            .into_iter()
            .next())
    }

    /// Imports of `module_name` by other modules.
    pub fn get_module_dependents(&self, module_name: &str, limit: usize) -> Result<Vec<ImportRecord>> {
        self.query_imports(
            &format!("{IMPORT_SELECT} WHERE i.module_name = ?1 ORDER BY i.id LIMIT ?2"),
            vec![SqlValue::Text(module_name.to_string()), sql_limit(limit)],
        )
    }

    /// Imports, optionally declared by one module, whose imported module and
    /// package match the given LIKE patterns. Ordered by importing module.
    pub fn find_imports(
        &self,
        module_id: Option<i64>,
        target_pattern: Option<&str>,
        package_pattern: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ImportRecord>> {
        let text = |p: Option<&str>| p.map(|p| SqlValue::Text(p.to_string())).unwrap_or(SqlValue::Null);
        self.query_imports(
            &format!(
                "{IMPORT_SELECT}
                 WHERE (?1 IS NULL OR i.module_id = ?1)
                   AND (?2 IS NULL OR i.module_name LIKE ?2)
                   AND (?3 IS NULL OR i.package_name LIKE ?3)
                 ORDER BY i.module_id, i.id
                 LIMIT ?4"
            ),
            vec![
                module_id.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
                text(target_pattern),
                text(package_pattern),
                sql_limit(limit),
            ],
        )
    }

    /// Imported module names ranked by how many imports name them. Modules
    /// not defined in the store are skipped unless `include_external`.
    pub fn get_most_imported(&self, include_external: bool, limit: usize) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT i.module_name, COUNT(*) AS n
                 FROM imports i
                 WHERE ?1 OR EXISTS (SELECT 1 FROM modules d WHERE d.name = i.module_name)
                 GROUP BY i.module_name
                 ORDER BY n DESC, i.module_name
                 LIMIT ?2",
            )
            .map_err(db_err("get_most_imported"))?;
        let rows = stmt
            .query_map(params![include_external, sql_limit(limit)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db_err("get_most_imported"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("get_most_imported"))
    }
}

// ---------------------------------------------------------------------------
// Graph suppliers
// ---------------------------------------------------------------------------

impl Database {
    /// Builds the call graph reachable from `root_id` within `depth` calls,
    /// holding at most `max_nodes` nodes. Callees that are not stored
    /// functions become leaf nodes with id `ext:<module>.<name>`.
    pub fn get_call_graph(&self, root_id: i64, depth: usize, max_nodes: usize) -> Result<EntityGraph> {
        let mut graph = EntityGraph::new();
        let root = match self.get_entity_by_id(EntityKind::Function, root_id)? {
            Some(r) => r,
            None => return Ok(graph),
        };
        graph.add_node(function_node(&root));
        if !self.has_table("function_calls")? {
            return Ok(graph);
        }

        let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
        let mut expanded: HashSet<i64> = HashSet::new();
        queue.push_back((root_id, 0));

        while let Some((function_id, level)) = queue.pop_front() {
            if level >= depth || !expanded.insert(function_id) {
                continue;
            }
            let from = function_node_id(function_id);

            for call in self.get_callees(function_id, max_nodes)? {
                let to = match call.callee_id {
                    Some(callee_id) => {
                        let id = function_node_id(callee_id);
                        if !graph.contains(&id) {
                            if graph.len() >= max_nodes {
                                continue;
                            }
                            match self.get_entity_by_id(EntityKind::Function, callee_id)? {
                                Some(rec) => {
                                    graph.add_node(function_node(&rec));
                                }
                                None => continue,
                            }
                        }
                        queue.push_back((callee_id, level + 1));
                        id
                    }
                    None => {
                        let id = format!(
                            "ext:{}.{}",
                            call.module_name.as_deref().unwrap_or(""),
                            call.name
                        );
                        if !graph.contains(&id) {
                            if graph.len() >= max_nodes {
                                continue;
                            }
                            let mut node = GraphNode::new(id.clone(), call.name.clone());
                            if let Some(m) = call.module_name {
                                node = node.with_module(m);
                            }
                            graph.add_node(node);
                        }
                        id
                    }
                };
                graph.add_edge(&from, &to);
            }
        }

        Ok(graph)
    }

    /// Builds the type-dependency graph reachable from `root_id` within
    /// `depth` references, holding at most `max_nodes` nodes.
    pub fn get_type_subgraph(&self, root_id: i64, depth: usize, max_nodes: usize) -> Result<EntityGraph> {
        let mut graph = EntityGraph::new();
        let root = match self.get_entity_by_id(EntityKind::Type, root_id)? {
            Some(r) => r,
            None => return Ok(graph),
        };
        graph.add_node(type_node(&root));

        let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
        let mut expanded: HashSet<i64> = HashSet::new();
        queue.push_back((root_id, 0));

        while let Some((type_id, level)) = queue.pop_front() {
            if level >= depth || !expanded.insert(type_id) {
                continue;
            }
            let deps = match self.get_type_dependencies(type_id)? {
                Some(d) => d,
                None => break,
            };
            let from = type_node_id(type_id);
            for dep in deps {
                let to = type_node_id(dep.id);
                if !graph.contains(&to) {
                    if graph.len() >= max_nodes {
                        continue;
                    }
                    graph.add_node(type_node(&dep));
                }
                graph.add_edge(&from, &to);
                queue.push_back((dep.id, level + 1));
            }
        }

        Ok(graph)
    }

    /// Types reachable from `roots` through dependency edges within
    /// `depth` references, in breadth-first order, at most `max_nodes`.
    /// Types rejected by `keep` are neither listed nor expanded; the roots
    /// are always listed.
    pub fn get_type_closure<F>(
        &self,
        roots: Vec<EntityRecord>,
        depth: usize,
        max_nodes: usize,
        keep: F,
    ) -> Result<Vec<EntityRecord>>
    where
        F: Fn(&EntityRecord) -> bool,
    {
        let mut seen: HashSet<i64> = HashSet::new();
        let mut queue: VecDeque<(EntityRecord, usize)> = VecDeque::new();
        for root in roots {
            if seen.insert(root.id) {
                queue.push_back((root, 0));
            }
        }

        let mut out = Vec::new();
        while let Some((record, level)) = queue.pop_front() {
            if out.len() >= max_nodes {
                break;
            }
            let id = record.id;
            out.push(record);
            if level >= depth {
                continue;
            }
            for dep in self.get_type_dependencies(id)?.unwrap_or_default() {
                if keep(&dep) && seen.insert(dep.id) {
                    queue.push_back((dep, level + 1));
                }
            }
        }
        Ok(out)
    }

    /// Builds the module import graph reachable from module `root` within
    /// `depth` imports, holding at most `max_nodes` nodes. Imported modules
    /// that are not in the store are leaves, and are left out unless
    /// `include_external`.
    pub fn get_import_graph(
        &self,
        root: &str,
        depth: usize,
        include_external: bool,
        max_nodes: usize,
    ) -> Result<EntityGraph> {
        let mut graph = EntityGraph::new();
        let root_module = match self.get_module_by_name(root)? {
            Some(m) => m,
            None => return Ok(graph),
        };
        graph.add_node(GraphNode::new(module_node_id(&root_module.name), root_module.name.clone()));

        let mut queue: VecDeque<(i64, String, usize)> = VecDeque::new();
        let mut expanded: HashSet<i64> = HashSet::new();
        queue.push_back((root_module.id, root_module.name, 0));

        while let Some((module_id, name, level)) = queue.pop_front() {
            if level >= depth || !expanded.insert(module_id) {
                continue;
            }
            let from = module_node_id(&name);
            for import in self.get_imports_for_module(module_id, max_nodes)? {
                if !import.internal && !include_external {
                    continue;
                }
                let to = module_node_id(&import.module_name);
                if !graph.contains(&to) {
                    if graph.len() >= max_nodes {
                        continue;
                    }
                    let mut node = GraphNode::new(to.clone(), import.module_name.clone());
                    if let Some(ref package) = import.package_name {
                        node = node.with_module(package.clone());
                    }
                    graph.add_node(node);
                }
                graph.add_edge(&from, &to);
                if import.internal {
                    if let Some(target) = self.get_module_by_name(&import.module_name)? {
                        queue.push_back((target.id, target.name, level + 1));
                    }
                }
            }
        }

        Ok(graph)
    }

    /// Loads up to `max_nodes` types and the dependency edges among them,
    /// with a name index for root lookup.
    pub fn get_type_dependency_graph(&self, max_nodes: usize) -> Result<TypeDependencyGraph> {
        let mut tdg = TypeDependencyGraph::default();
        for record in self.run_predicate_query(EntityKind::Type, &Predicate::match_all(), max_nodes)? {
            let id = type_node_id(record.id);
            tdg.graph.add_node(type_node(&record));
            tdg.name_index.entry(record.name.clone()).or_default().push(id);
        }

        if !self.has_table("type_dependencies")? {
            return Ok(tdg);
        }

        let mut stmt = self
            .conn()
            .prepare("SELECT dependent_id, dependency_id FROM type_dependencies ORDER BY id LIMIT ?1")
            .map_err(db_err("get_type_dependency_graph"))?;
        let rows = stmt
            .query_map(params![sql_limit(max_nodes.saturating_mul(EDGE_FANOUT))], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err("get_type_dependency_graph"))?;
        for row in rows {
            let (dependent, dependency) = row.map_err(db_err("get_type_dependency_graph"))?;
            let to = type_node_id(dependency);
            if tdg.graph.contains(&to) {
                tdg.graph.add_edge(&type_node_id(dependent), &to);
            }
        }

        Ok(tdg)
    }
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

impl Database {
    fn insert(&self, sql: &str, params: &[&dyn rusqlite::ToSql], operation: &'static str) -> Result<i64> {
        self.conn().execute(sql, params).map_err(db_err(operation))?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Sets the source location and line span of a stored entity.
    pub fn set_source_span(
        &self,
        kind: EntityKind,
        id: i64,
        src_loc: &str,
        line_start: i64,
        line_end: i64,
    ) -> Result<()> {
        let schema = EntitySchema::for_kind(kind);
        let location = located_column(schema)?;
        self.conn()
            .execute(
                &format!(
                    "UPDATE {} SET {location} = ?1, line_number_start = ?2, line_number_end = ?3
                     WHERE id = ?4",
                    schema.table
                ),
                params![src_loc, line_start, line_end, id],
            )
            .map_err(db_err("set_source_span"))?;
        Ok(())
    }

    pub fn insert_module(&self, name: &str, path: Option<&str>) -> Result<i64> {
        self.insert(
            "INSERT INTO modules (name, path) VALUES (?1, ?2)",
            params![name, path],
            "insert_module",
        )
    }

    pub fn insert_function(&self, module_id: i64, name: &str, signature: Option<&str>) -> Result<i64> {
        self.insert(
            "INSERT INTO functions (name, module_id, function_signature) VALUES (?1, ?2, ?3)",
            params![name, module_id, signature],
            "insert_function",
        )
    }

    /// Records that `caller_id` calls `name` from `module_name`.
    pub fn insert_call(&self, caller_id: i64, name: &str, module_name: Option<&str>) -> Result<i64> {
        self.insert(
            "INSERT INTO function_calls (function_id, name, module_name) VALUES (?1, ?2, ?3)",
            params![caller_id, name, module_name],
            "insert_call",
        )
    }

    pub fn insert_where_function(&self, parent_id: i64, name: &str) -> Result<i64> {
        self.insert(
            "INSERT INTO where_functions (parent_function_id, name) VALUES (?1, ?2)",
            params![parent_id, name],
            "insert_where_function",
        )
    }

    pub fn insert_type(
        &self,
        module_id: i64,
        name: &str,
        category: Option<&str>,
        raw_code: Option<&str>,
    ) -> Result<i64> {
        self.insert(
            "INSERT INTO types (type_name, module_id, type_of_type, raw_code) VALUES (?1, ?2, ?3, ?4)",
            params![name, module_id, category, raw_code],
            "insert_type",
        )
    }

    pub fn insert_constructor(&self, type_id: i64, name: &str) -> Result<i64> {
        self.insert(
            "INSERT INTO constructors (type_id, name) VALUES (?1, ?2)",
            params![type_id, name],
            "insert_constructor",
        )
    }

    pub fn insert_field(&self, constructor_id: i64, name: Option<&str>, type_raw: Option<&str>) -> Result<i64> {
        self.insert(
            "INSERT INTO fields (constructor_id, field_name, field_type_raw) VALUES (?1, ?2, ?3)",
            params![constructor_id, name, type_raw],
            "insert_field",
        )
    }

    /// Records that type `dependent_id` refers to type `dependency_id`.
    pub fn insert_type_dependency(&self, dependent_id: i64, dependency_id: i64) -> Result<i64> {
        self.insert(
            "INSERT INTO type_dependencies (dependent_id, dependency_id) VALUES (?1, ?2)",
            params![dependent_id, dependency_id],
            "insert_type_dependency",
        )
    }

    pub fn insert_class(&self, module_id: i64, name: &str, definition: Option<&str>) -> Result<i64> {
        self.insert(
            "INSERT INTO classes (class_name, module_id, class_definition) VALUES (?1, ?2, ?3)",
            params![name, module_id, definition],
            "insert_class",
        )
    }

    pub fn insert_import(
        &self,
        module_id: i64,
        imported: &str,
        package: Option<&str>,
        qualified: bool,
    ) -> Result<i64> {
        let style = if qualified { "QualifiedPre" } else { "NotQualified" };
        self.insert(
            "INSERT INTO imports (module_name, module_id, package_name, qualified_style)
             VALUES (?1, ?2, ?3, ?4)",
            params![imported, module_id, package, style],
            "insert_import",
        )
    }

    pub fn insert_instance(&self, module_id: i64, definition: &str, signature: Option<&str>) -> Result<i64> {
        self.insert(
            "INSERT INTO instances (instance_definition, module_id, instance_signature) VALUES (?1, ?2, ?3)",
            params![definition, module_id, signature],
            "insert_instance",
        )
    }
}
