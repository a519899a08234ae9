//! Similarity grouping of functions.
//!
//! The grouper is agnostic of the similarity measure: it receives a pairwise
//! scoring closure, links every pair scoring at or above the threshold and
//! reports the connected components. Grouping is transitive: `a~b` and `b~c`
//! put `a`, `b` and `c` in one group even when `a~c` is below the threshold.
//! A group's score is the score of the first pair that linked it.

use std::collections::HashSet;

use crate::types::{EntityRecord, SimilarityGroup};

/// Anything carrying a store entity id.
pub trait Identified {
    fn entity_id(&self) -> i64;
}

impl Identified for EntityRecord {
    fn entity_id(&self) -> i64 {
        self.id
    }
}

/// Disjoint-set forest over candidate indices, remembering for each
/// component the first pair that linked it as `(sequence, score)`.
struct Components {
    parent: Vec<usize>,
    size: Vec<usize>,
    seed: Vec<Option<(usize, f64)>>,
}

impl Components {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            seed: vec![None; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize, seq: usize, score: f64) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];

        let earliest = [self.seed[big], self.seed[small], Some((seq, score))]
            .into_iter()
            .flatten()
            .min_by_key(|(s, _)| *s);
        self.seed[big] = earliest;
    }
}

/// Partitions `candidates` into groups of mutually linked entities.
///
/// Pairs with `similarity(a, b) >= threshold` are linked; each connected
/// component with at least `min_group_size` members (never fewer than two)
/// becomes a group. Groups are ordered by descending score, members by their
/// position in `candidates`. No candidate appears in two groups.
pub fn group_by_similarity<T, F>(
    candidates: &[T],
    similarity: F,
    threshold: f64,
    min_group_size: usize,
) -> Vec<SimilarityGroup>
where
    T: Identified,
    F: Fn(&T, &T) -> f64,
{
    let n = candidates.len();
    let mut components = Components::new(n);
    let mut seq = 0usize;

    for i in 0..n {
        for j in (i + 1)..n {
            let score = similarity(&candidates[i], &candidates[j]);
            if score >= threshold {
                components.union(i, j, seq, score);
                seq += 1;
            }
        }
    }

    // Collect members per root, in candidate order; roots in order of first member.
    let mut roots: Vec<usize> = Vec::new();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        let root = components.find(i);
        if members[root].is_empty() {
            roots.push(root);
        }
        members[root].push(i);
    }

    let min_size = min_group_size.max(2);
    let mut groups: Vec<SimilarityGroup> = roots
        .into_iter()
        .filter(|root| members[*root].len() >= min_size)
        .filter_map(|root| {
            let (_, score) = components.seed[root]?;
            Some(SimilarityGroup {
                members: members[root]
                    .iter()
                    .map(|&i| candidates[i].entity_id())
                    .collect(),
                score,
            })
        })
        .collect();

    groups.sort_by(|a, b| b.score.total_cmp(&a.score));
    groups
}

/// Ranks `candidates` by similarity to `target`, keeping those at or above
/// `threshold`. The target itself (by id) is excluded. Returns candidate
/// indices with their scores, best first; ties keep candidate order.
pub fn rank_similar<T, F>(target: &T, candidates: &[T], similarity: F, threshold: f64) -> Vec<(usize, f64)>
where
    T: Identified,
    F: Fn(&T, &T) -> f64,
{
    let target_id = target.entity_id();
    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.entity_id() != target_id)
        .map(|(i, c)| (i, similarity(target, c)))
        .filter(|(_, s)| *s >= threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

/// Signature-shape similarity in `[0, 1]`.
///
/// Averages the Jaccard overlap of the identifier tokens with the agreement
/// of the arities (number of `->`-separated parts).
pub fn signature_similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    let jaccard = if ta.is_empty() && tb.is_empty() {
        1.0
    } else {
        let inter = ta.intersection(&tb).count() as f64;
        let union = ta.union(&tb).count() as f64;
        inter / union
    };

    let arity_a = a.matches("->").count() + 1;
    let arity_b = b.matches("->").count() + 1;
    let arity = 1.0 - (arity_a.abs_diff(arity_b) as f64 / arity_a.max(arity_b) as f64);

    (jaccard + arity) / 2.0
}

/// Similarity of two function records by their signatures; records without a
/// signature are never similar.
pub fn record_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    match (a.detail.as_deref(), b.detail.as_deref()) {
        (Some(sa), Some(sb)) if !sa.trim().is_empty() && !sb.trim().is_empty() => {
            signature_similarity(sa, sb)
        }
        _ => 0.0,
    }
}

fn tokens(signature: &str) -> HashSet<&str> {
    signature
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item(i64, &'static str);

    impl Identified for Item {
        fn entity_id(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_identical_signatures_score_one() {
        let s = "Int -> Int -> Bool";
        assert!((signature_similarity(s, s) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_signatures_score_low() {
        let score = signature_similarity("Int -> Int -> Bool", "Text");
        assert!(score < 0.5, "score was {score}");
    }

    #[test]
    fn test_chain_groups_transitively() {
        // a~b and b~c but a!~c
        let items = [Item(1, "a"), Item(2, "b"), Item(3, "c"), Item(4, "z")];
        let sim = |x: &Item, y: &Item| match (x.1, y.1) {
            ("a", "b") => 0.9,
            ("b", "c") => 0.8,
            _ => 0.1,
        };
        let groups = group_by_similarity(&items, sim, 0.7, 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![1, 2, 3]);
        assert!((groups[0].score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_min_group_size_filters() {
        let items = [Item(1, "a"), Item(2, "b"), Item(3, "c")];
        let sim = |x: &Item, y: &Item| if x.1 == "a" && y.1 == "b" { 1.0 } else { 0.0 };
        assert!(group_by_similarity(&items, sim, 0.5, 3).is_empty());
        assert_eq!(group_by_similarity(&items, sim, 0.5, 2).len(), 1);
    }

    #[test]
    fn test_rank_similar_excludes_target() {
        let items = [Item(1, "a"), Item(2, "b"), Item(3, "c")];
        let sim = |_: &Item, y: &Item| if y.1 == "c" { 0.9 } else { 0.75 };
        let ranked = rank_similar(&items[0], &items, sim, 0.7);
        assert_eq!(ranked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2, 1]);
    }
}
