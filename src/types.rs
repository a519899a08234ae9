use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kinds of entities stored in the code-analysis database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Module,
    Function,
    Type,
    Class,
    Import,
    Instance,
}

#[allow(clippy::should_implement_trait)]
impl EntityKind {
    /// All kinds, in the order statistics are reported.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Module,
        EntityKind::Function,
        EntityKind::Type,
        EntityKind::Class,
        EntityKind::Import,
        EntityKind::Instance,
    ];

    /// Returns the string representation of this entity kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Function => "function",
            EntityKind::Type => "type",
            EntityKind::Class => "class",
            EntityKind::Import => "import",
            EntityKind::Instance => "instance",
        }
    }

    /// Parses a string into an `EntityKind`, returning `None` for unrecognized values.
    ///
    /// Both singular and plural spellings are accepted.
    pub fn from_str(s: &str) -> Option<EntityKind> {
        match s {
            "module" | "modules" => Some(EntityKind::Module),
            "function" | "functions" => Some(EntityKind::Function),
            "type" | "types" => Some(EntityKind::Type),
            "class" | "classes" => Some(EntityKind::Class),
            "import" | "imports" => Some(EntityKind::Import),
            "instance" | "instances" => Some(EntityKind::Instance),
            _ => None,
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Module => "modules",
            EntityKind::Function => "functions",
            EntityKind::Type => "types",
            EntityKind::Class => "classes",
            EntityKind::Import => "imports",
            EntityKind::Instance => "instances",
        }
    }
}

/// A row-like entity record returned by the store.
///
/// `detail` and `location` carry the kind-specific columns configured in the
/// entity schema table (signature for functions, category for types, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: i64,
    pub name: String,
    pub module_id: Option<i64>,
    pub module: Option<String>,
    pub detail: Option<String>,
    pub location: Option<String>,
}

/// A function call row: `caller` calls `name` in `module_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller_id: i64,
    pub callee_id: Option<i64>,
    pub name: String,
    pub module_name: Option<String>,
}

/// A call whose caller and callee live in different modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossModuleCall {
    pub caller_module: String,
    pub caller_name: String,
    pub target_module: String,
    pub target_name: String,
}

/// Call count aggregated per callee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCount {
    pub name: String,
    pub module_name: Option<String>,
    pub calls: u64,
}

/// Full definition of a type, including its constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDetail {
    pub record: EntityRecord,
    pub raw_code: Option<String>,
    pub constructors: Option<Vec<ConstructorRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorRecord {
    pub id: i64,
    pub name: String,
    pub fields: Vec<FieldRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: Option<String>,
    pub type_raw: Option<String>,
}

/// An import statement of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: i64,
    pub module_id: i64,
    pub importing_module: Option<String>,
    pub module_name: String,
    pub package_name: Option<String>,
    pub qualified: bool,
    pub is_hiding: bool,
    pub as_module_name: Option<String>,
    pub src_loc: Option<String>,
    /// The imported module is defined in the store.
    pub internal: bool,
}

/// Which modules a function query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleScope<'a> {
    All,
    Module(i64),
    /// Modules whose name matches a LIKE pattern.
    Matching(&'a str),
}

/// Number of calls from functions of `caller_module` into `callee_module`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub caller_module: String,
    pub callee_module: String,
    pub calls: u64,
}

/// Cross-module call totals of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCoupling {
    pub name: String,
    pub incoming: u64,
    pub outgoing: u64,
}

impl ModuleCoupling {
    pub fn total(&self) -> u64 {
        self.incoming + self.outgoing
    }
}

/// Store-wide cross-module call totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CouplingSummary {
    pub modules: u64,
    pub dependencies: u64,
    pub calls: u64,
}

/// Entity counts for one module. `None` means the backing table is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleCounts {
    pub functions: u64,
    pub types: Option<u64>,
    pub classes: Option<u64>,
    pub imports: Option<u64>,
    pub instances: Option<u64>,
}

/// Identifier of a node in an [`EntityGraph`].
pub type NodeId = String;

/// A node in a call graph or type-dependency graph.
///
/// Edges refer to other nodes by id; nodes are shared between parents, so the
/// graph may contain diamonds and cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    pub module: Option<String>,
    pub signature: Option<String>,
    pub edges: Vec<NodeId>,
}

impl GraphNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            module: None,
            signature: None,
            edges: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// An arena of [`GraphNode`]s keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    nodes: HashMap<NodeId, GraphNode>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node unless one with the same id already exists.
    ///
    /// Returns `true` if the node was inserted.
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    /// Appends a directed edge `from -> to`. Duplicate edges are ignored, as
    /// are edges from unknown nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        if let Some(node) = self.nodes.get_mut(from) {
            if !node.edges.iter().any(|e| e == to) {
                node.edges.push(to.to_string());
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.edges.len()).sum()
    }
}

/// The type-dependency graph plus an index from type name to node ids
/// (a name may be defined in several modules).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDependencyGraph {
    pub graph: EntityGraph,
    pub name_index: HashMap<String, Vec<NodeId>>,
}

impl TypeDependencyGraph {
    /// Type names defined by more than one type, sorted.
    pub fn shared_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .name_index
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Output format for rendered graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphFormat {
    Tree,
    Flat,
    Graph,
}

#[allow(clippy::should_implement_trait)]
impl GraphFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphFormat::Tree => "tree",
            GraphFormat::Flat => "flat",
            GraphFormat::Graph => "graph",
        }
    }

    pub fn from_str(s: &str) -> Option<GraphFormat> {
        match s {
            "tree" => Some(GraphFormat::Tree),
            "flat" => Some(GraphFormat::Flat),
            "graph" => Some(GraphFormat::Graph),
            _ => None,
        }
    }
}

/// Options controlling graph rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub depth: usize,
    pub format: GraphFormat,
    pub module_filters: Vec<String>,
    pub include_signatures: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            depth: 3,
            format: GraphFormat::Tree,
            module_filters: Vec::new(),
            include_signatures: false,
        }
    }
}

/// Heuristic complexity score of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub entity_id: i64,
    pub score: u64,
}

/// A group of entities whose similarity meets a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityGroup {
    pub members: Vec<i64>,
    pub score: f64,
}
