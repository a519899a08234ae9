//! Text rendering of call graphs and type-dependency graphs.
//!
//! All three formats share [`walk`]; they differ only in their visitor.

use std::collections::HashSet;

use super::traversal::{walk, GraphVisitor, Repeat};
use crate::types::{EntityGraph, GraphFormat, GraphNode, RenderOptions};

/// Output for a missing root.
pub const NO_GRAPH: &str = "No graph available.";

/// Renders the subgraph reachable from `root` according to `options`.
///
/// `root` is a node id; `None` or an id not present in the graph yields
/// [`NO_GRAPH`].
pub fn render(graph: &EntityGraph, root: Option<&str>, options: &RenderOptions) -> String {
    let root = match root {
        Some(r) if graph.contains(r) => r,
        _ => return NO_GRAPH.to_string(),
    };

    match options.format {
        GraphFormat::Tree => {
            let mut v = TreeRenderer::new(options.include_signatures);
            walk(graph, root, options.depth, &options.module_filters, &mut v);
            v.out
        }
        GraphFormat::Flat => {
            let mut v = FlatRenderer::new(options.include_signatures);
            walk(graph, root, options.depth, &options.module_filters, &mut v);
            v.out
        }
        GraphFormat::Graph => {
            let mut v = EdgeListRenderer::new(options.include_signatures);
            walk(graph, root, options.depth, &options.module_filters, &mut v);
            v.finish()
        }
    }
}

fn label(node: &GraphNode, include_signatures: bool) -> String {
    let mut s = node.name.clone();
    if let Some(ref module) = node.module {
        s.push_str(&format!(" [{}]", module));
    }
    if include_signatures {
        if let Some(ref sig) = node.signature {
            s.push_str(&format!(" :: {}", sig));
        }
    }
    s
}

fn indent(level: usize) -> String {
    "  ".repeat(level)
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Indented tree. A node on the current path becomes a `(recursive)` leaf;
/// a node already expanded elsewhere becomes a `(see above)` leaf.
struct TreeRenderer {
    include_signatures: bool,
    out: String,
}

impl TreeRenderer {
    fn new(include_signatures: bool) -> Self {
        Self {
            include_signatures,
            out: String::new(),
        }
    }

    fn line(&mut self, level: usize, text: &str) {
        if level == 0 {
            self.out.push_str(text);
        } else {
            self.out.push_str(&format!("{}└─ {}", indent(level - 1), text));
        }
        self.out.push('\n');
    }
}

impl GraphVisitor for TreeRenderer {
    fn enter(&mut self, node: &GraphNode, level: usize) {
        let text = label(node, self.include_signatures);
        self.line(level, &text);
    }

    fn reenter(&mut self, node: &GraphNode, level: usize) {
        self.enter(node, level);
    }

    fn revisit(&mut self, node: &GraphNode, level: usize, repeat: Repeat) {
        let marker = match repeat {
            Repeat::OnPath => "recursive",
            Repeat::Expanded => "see above",
        };
        let text = format!("{} ({})", node.name, marker);
        self.line(level, &text);
    }
}

// ---------------------------------------------------------------------------
// Flat
// ---------------------------------------------------------------------------

/// Each node once, indented at the level of its first visit.
struct FlatRenderer {
    include_signatures: bool,
    out: String,
}

impl FlatRenderer {
    fn new(include_signatures: bool) -> Self {
        Self {
            include_signatures,
            out: String::new(),
        }
    }
}

impl GraphVisitor for FlatRenderer {
    fn enter(&mut self, node: &GraphNode, level: usize) {
        self.out.push_str(&format!(
            "{}{}\n",
            indent(level),
            label(node, self.include_signatures)
        ));
    }
}

// ---------------------------------------------------------------------------
// Graph (node list + edge list)
// ---------------------------------------------------------------------------

struct EdgeListRenderer {
    include_signatures: bool,
    nodes: Vec<String>,
    edges: Vec<String>,
    seen_edges: HashSet<(String, String)>,
}

impl EdgeListRenderer {
    fn new(include_signatures: bool) -> Self {
        Self {
            include_signatures,
            nodes: Vec::new(),
            edges: Vec::new(),
            seen_edges: HashSet::new(),
        }
    }

    fn finish(self) -> String {
        let mut out = String::from("Nodes:\n");
        for n in &self.nodes {
            out.push_str(&format!("  {}\n", n));
        }
        out.push_str("\nEdges:\n");
        if self.edges.is_empty() {
            out.push_str("  (none)\n");
        }
        for e in &self.edges {
            out.push_str(&format!("  {}\n", e));
        }
        out
    }
}

impl GraphVisitor for EdgeListRenderer {
    fn enter(&mut self, node: &GraphNode, _level: usize) {
        self.nodes.push(label(node, self.include_signatures));
    }

    fn edge(&mut self, from: &GraphNode, to: &GraphNode) {
        // re-expanded nodes walk their edges again
        if self.seen_edges.insert((from.id.clone(), to.id.clone())) {
            self.edges.push(format!("{} -> {}", from.name, to.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle() -> EntityGraph {
        let mut g = EntityGraph::new();
        g.add_node(GraphNode::new("a", "alpha").with_module("M.A"));
        g.add_node(GraphNode::new("b", "beta").with_module("M.B"));
        g.add_node(GraphNode::new("c", "gamma").with_module("N.C"));
        g.add_edge("a", "b");
        g.add_edge("b", "c");
        g.add_edge("c", "a");
        g
    }

    fn opts(format: GraphFormat, depth: usize) -> RenderOptions {
        RenderOptions {
            depth,
            format,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_root_renders_notice() {
        let g = cycle();
        assert_eq!(render(&g, None, &RenderOptions::default()), NO_GRAPH);
        assert_eq!(render(&g, Some("nope"), &RenderOptions::default()), NO_GRAPH);
    }

    #[test]
    fn test_tree_marks_cycle() {
        let out = render(&cycle(), Some("a"), &opts(GraphFormat::Tree, 5));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "alpha [M.A]");
        assert!(lines[3].contains("alpha (recursive)"));
    }

    #[test]
    fn test_graph_lists_back_edge() {
        let out = render(&cycle(), Some("a"), &opts(GraphFormat::Graph, 5));
        assert!(out.contains("Nodes:"));
        assert!(out.contains("gamma -> alpha"));
        assert_eq!(out.matches("alpha [M.A]").count(), 1);
    }

    #[test]
    fn test_tree_collapses_shared_subtree() {
        // a -> b -> d -> e, a -> c -> d
        let mut g = EntityGraph::new();
        for id in ["a", "b", "c", "d", "e"] {
            g.add_node(GraphNode::new(id, id));
        }
        for (x, y) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("d", "e")] {
            g.add_edge(x, y);
        }
        let out = render(&g, Some("a"), &opts(GraphFormat::Tree, 5));
        assert_eq!(
            out,
            "a\n└─ b\n  └─ d\n    └─ e\n└─ c\n  └─ d (see above)\n"
        );
    }

    #[test]
    fn test_signatures_only_when_requested() {
        let mut g = EntityGraph::new();
        g.add_node(GraphNode::new("f", "f").with_signature("Int -> Int"));
        let plain = render(&g, Some("f"), &opts(GraphFormat::Flat, 1));
        assert!(!plain.contains("::"));
        let mut o = opts(GraphFormat::Flat, 1);
        o.include_signatures = true;
        assert!(render(&g, Some("f"), &o).contains(":: Int -> Int"));
    }
}
