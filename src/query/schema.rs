//! Static per-entity schema tables.
//!
//! Each entity kind maps the field names a caller may filter on to a typed
//! column expression. Column expressions are qualified with the aliases used
//! by [`EntitySchema::select_clause`]: `t` for the entity table and `m` for the
//! owning module.

use crate::query::condition::Operator;
use crate::types::EntityKind;

/// Value domain of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
        }
    }

    /// Whether `op` is meaningful for values of this type.
    pub fn supports(&self, op: Operator) -> bool {
        match self {
            FieldType::Text => true,
            FieldType::Integer => !op.is_pattern(),
            FieldType::Boolean => matches!(
                op,
                Operator::Eq | Operator::Ne | Operator::In | Operator::NotIn | Operator::IsNull
            ),
        }
    }
}

/// A filterable field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub ty: FieldType,
}

const fn text(name: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        column,
        ty: FieldType::Text,
    }
}

const fn int(name: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        column,
        ty: FieldType::Integer,
    }
}

const fn boolean(name: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        column,
        ty: FieldType::Boolean,
    }
}

/// Schema of one entity kind.
#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Column holding the display name.
    pub name_column: &'static str,
    /// Column holding the owning module id; `None` for modules themselves.
    pub scope_column: Option<&'static str>,
    /// Kind-specific column surfaced as `EntityRecord::detail`.
    pub detail_column: Option<&'static str>,
    /// Column surfaced as `EntityRecord::location`.
    pub location_column: Option<&'static str>,
    pub fields: &'static [FieldSpec],
}

static MODULE_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Module,
    table: "modules",
    name_column: "name",
    scope_column: None,
    detail_column: None,
    location_column: Some("path"),
    fields: &[
        int("id", "t.id"),
        text("name", "t.name"),
        text("path", "t.path"),
    ],
};

static FUNCTION_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Function,
    table: "functions",
    name_column: "name",
    scope_column: Some("module_id"),
    detail_column: Some("function_signature"),
    location_column: Some("src_loc"),
    fields: &[
        int("id", "t.id"),
        text("name", "t.name"),
        int("module_id", "t.module_id"),
        text("module", "m.name"),
        text("function_signature", "t.function_signature"),
        text("src_loc", "t.src_loc"),
        text("type_enum", "t.type_enum"),
        int("line_number_start", "t.line_number_start"),
        int("line_number_end", "t.line_number_end"),
    ],
};

static TYPE_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Type,
    table: "types",
    name_column: "type_name",
    scope_column: Some("module_id"),
    detail_column: Some("type_of_type"),
    location_column: Some("src_loc"),
    fields: &[
        int("id", "t.id"),
        text("type_name", "t.type_name"),
        int("module_id", "t.module_id"),
        text("module", "m.name"),
        text("type_of_type", "t.type_of_type"),
        text("raw_code", "t.raw_code"),
        text("src_loc", "t.src_loc"),
        int("line_number_start", "t.line_number_start"),
        int("line_number_end", "t.line_number_end"),
    ],
};

static CLASS_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Class,
    table: "classes",
    name_column: "class_name",
    scope_column: Some("module_id"),
    detail_column: Some("class_definition"),
    location_column: Some("src_location"),
    fields: &[
        int("id", "t.id"),
        text("class_name", "t.class_name"),
        int("module_id", "t.module_id"),
        text("module", "m.name"),
        text("class_definition", "t.class_definition"),
        text("src_location", "t.src_location"),
        int("line_number_start", "t.line_number_start"),
        int("line_number_end", "t.line_number_end"),
    ],
};

static IMPORT_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Import,
    table: "imports",
    name_column: "module_name",
    scope_column: Some("module_id"),
    detail_column: Some("package_name"),
    location_column: Some("src_loc"),
    fields: &[
        int("id", "t.id"),
        text("module_name", "t.module_name"),
        int("module_id", "t.module_id"),
        text("module", "m.name"),
        text("package_name", "t.package_name"),
        text("src_loc", "t.src_loc"),
        boolean("is_hiding", "t.is_hiding"),
        boolean("is_boot_source", "t.is_boot_source"),
        text("qualified_style", "t.qualified_style"),
        text("as_module_name", "t.as_module_name"),
        int("line_number_start", "t.line_number_start"),
        int("line_number_end", "t.line_number_end"),
    ],
};

static INSTANCE_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Instance,
    table: "instances",
    name_column: "instance_definition",
    scope_column: Some("module_id"),
    detail_column: Some("instance_signature"),
    location_column: Some("src_loc"),
    fields: &[
        int("id", "t.id"),
        text("instance_definition", "t.instance_definition"),
        text("instance_signature", "t.instance_signature"),
        int("module_id", "t.module_id"),
        text("module", "m.name"),
        text("src_loc", "t.src_loc"),
        int("line_number_start", "t.line_number_start"),
        int("line_number_end", "t.line_number_end"),
    ],
};

impl EntitySchema {
    /// Returns the schema table for `kind`.
    pub fn for_kind(kind: EntityKind) -> &'static EntitySchema {
        match kind {
            EntityKind::Module => &MODULE_SCHEMA,
            EntityKind::Function => &FUNCTION_SCHEMA,
            EntityKind::Type => &TYPE_SCHEMA,
            EntityKind::Class => &CLASS_SCHEMA,
            EntityKind::Import => &IMPORT_SCHEMA,
            EntityKind::Instance => &INSTANCE_SCHEMA,
        }
    }

    /// Looks up a filterable field by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names, in declaration order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Column expression of the display name.
    pub fn name_expr(&self) -> String {
        format!("t.{}", self.name_column)
    }

    /// `SELECT ... FROM ...` producing the columns read by the
    /// `EntityRecord` row mapper: id, name, module id, module name, detail,
    /// location.
    pub fn select_clause(&self) -> String {
        let optional = |col: Option<&str>| match col {
            Some(c) => format!("t.{c}"),
            None => "NULL".to_string(),
        };

        match self.scope_column {
            Some(scope) => format!(
                "SELECT t.id, t.{name}, t.{scope}, m.name, {detail}, {location}
                 FROM {table} t LEFT JOIN modules m ON m.id = t.{scope}",
                name = self.name_column,
                detail = optional(self.detail_column),
                location = optional(self.location_column),
                table = self.table,
            ),
            None => format!(
                "SELECT t.id, t.{name}, NULL, NULL, {detail}, {location}
                 FROM {table} t",
                name = self.name_column,
                detail = optional(self.detail_column),
                location = optional(self.location_column),
                table = self.table,
            ),
        }
    }
}
