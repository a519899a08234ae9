/// Bounded, cycle-safe depth-first traversal.
pub mod traversal;

/// Tree, flat and node/edge text rendering.
pub mod render;

pub use render::{render, NO_GRAPH};
pub use traversal::{passes_module_filter, walk, GraphVisitor, Repeat};
