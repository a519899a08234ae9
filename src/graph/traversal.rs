use std::collections::{HashMap, HashSet};

use crate::types::{EntityGraph, GraphNode};

/// Why a node reached again is not expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// The node is on the current root-to-node path (a cycle).
    OnPath,
    /// The node was already expanded at this level or a shallower one.
    Expanded,
}

/// Callbacks driven by [`walk`].
pub trait GraphVisitor {
    /// A node is expanded for the first time at `level` (root is level 0).
    fn enter(&mut self, node: &GraphNode, level: usize);

    /// A node expanded before is reached at a shallower `level`. Its
    /// children are walked again with the larger depth budget.
    fn reenter(&mut self, _node: &GraphNode, _level: usize) {}

    /// A node was reached again and is not expanded.
    fn revisit(&mut self, _node: &GraphNode, _level: usize, _repeat: Repeat) {}

    /// The traversal followed `from -> to`. Called for every followed edge
    /// whose target survives the module filter, repeats included.
    fn edge(&mut self, _from: &GraphNode, _to: &GraphNode) {}
}

/// Returns `true` if `node` passes the module filters.
///
/// An empty filter list passes everything; nodes without a module are kept.
pub fn passes_module_filter(node: &GraphNode, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    match node.module.as_deref() {
        Some(module) => filters.iter().any(|f| module.contains(f.as_str())),
        None => true,
    }
}

struct Walker<'g, 'v, V: GraphVisitor + ?Sized> {
    graph: &'g EntityGraph,
    max_depth: usize,
    filters: &'g [String],
    visitor: &'v mut V,
    /// Shallowest level each node has been expanded at.
    shallowest: HashMap<&'g str, usize>,
    on_path: HashSet<&'g str>,
}

impl<'g, 'v, V: GraphVisitor + ?Sized> Walker<'g, 'v, V> {
    fn visit(&mut self, node: &'g GraphNode, level: usize, parent: Option<&'g GraphNode>) {
        // The root is always shown; anything else outside the filter is
        // pruned together with its subtree.
        if parent.is_some() && !passes_module_filter(node, self.filters) {
            return;
        }

        if let Some(p) = parent {
            self.visitor.edge(p, node);
        }

        let id = node.id.as_str();
        if self.on_path.contains(id) {
            self.visitor.revisit(node, level, Repeat::OnPath);
            return;
        }
        match self.shallowest.get(id) {
            Some(&seen) if seen <= level => {
                self.visitor.revisit(node, level, Repeat::Expanded);
                return;
            }
            Some(_) => self.visitor.reenter(node, level),
            None => self.visitor.enter(node, level),
        }
        self.shallowest.insert(id, level);

        if level >= self.max_depth {
            return;
        }

        self.on_path.insert(id);
        for child_id in &node.edges {
            if let Some(child) = self.graph.get(child_id) {
                self.visit(child, level + 1, Some(node));
            }
        }
        self.on_path.remove(id);
    }
}

/// Depth-first traversal of `graph` from `root_id`, bounded by `max_depth`
/// edges from the root.
///
/// A node is expanded again only when reached at a shallower level than
/// before, so each node is expanded at most `max_depth + 1` times and the
/// work stays proportional to `edges * depth`.
///
/// Returns `false` if the root is not in the graph.
pub fn walk<V: GraphVisitor + ?Sized>(
    graph: &EntityGraph,
    root_id: &str,
    max_depth: usize,
    module_filters: &[String],
    visitor: &mut V,
) -> bool {
    let root = match graph.get(root_id) {
        Some(r) => r,
        None => return false,
    };

    let mut walker = Walker {
        graph,
        max_depth,
        filters: module_filters,
        visitor,
        shallowest: HashMap::new(),
        on_path: HashSet::new(),
    };
    walker.visit(root, 0, None);
    true
}
