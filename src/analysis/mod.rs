/// Heuristic function complexity scoring.
pub mod complexity;

/// Type names mentioned in signatures.
pub mod signature;

/// Similarity measures and threshold grouping.
pub mod similarity;

pub use complexity::{rank, score, ComplexityInputs};
pub use similarity::{group_by_similarity, rank_similar, signature_similarity, Identified};
