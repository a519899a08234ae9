//! Heuristic function complexity.
//!
//! The score is a cheap proxy built from facts already in the store, not a
//! cyclomatic complexity. Every term is additive and non-decreasing in its
//! input:
//!
//! | term              | value                          |
//! |-------------------|--------------------------------|
//! | signature bulk    | `chars(signature) / 20`        |
//! | arrows            | `2 * count("->", signature)`   |
//! | call fan-out      | `outgoing_calls / 3`           |
//! | local definitions | `2 * local_definitions`        |

use crate::types::ComplexityScore;

/// Default `min_complexity` for complexity reports.
pub const DEFAULT_MIN_COMPLEXITY: u64 = 5;

/// Facts about one function that feed the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplexityInputs<'a> {
    pub signature: Option<&'a str>,
    pub outgoing_calls: u64,
    pub local_definitions: u64,
}

/// Computes the complexity score of a function.
pub fn score(inputs: &ComplexityInputs<'_>) -> u64 {
    let (bulk, arrows) = match inputs.signature {
        Some(sig) => (
            sig.chars().count() as u64 / 20,
            sig.matches("->").count() as u64 * 2,
        ),
        None => (0, 0),
    };

    bulk + arrows + inputs.outgoing_calls / 3 + inputs.local_definitions * 2
}

/// Scores one function identified by `entity_id`.
pub fn score_entity(entity_id: i64, inputs: &ComplexityInputs<'_>) -> ComplexityScore {
    ComplexityScore {
        entity_id,
        score: score(inputs),
    }
}

/// Keeps the scores of at least `min_complexity` and orders them by
/// descending score. Ties keep their retrieval order.
pub fn rank(scores: Vec<ComplexityScore>, min_complexity: u64) -> Vec<ComplexityScore> {
    let mut kept: Vec<ComplexityScore> = scores
        .into_iter()
        .filter(|s| s.score >= min_complexity)
        .collect();
    // sort_by is stable
    kept.sort_by(|a, b| b.score.cmp(&a.score));
    kept
}
