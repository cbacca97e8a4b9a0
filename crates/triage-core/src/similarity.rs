//! Cosine similarity and top-K neighbor selection.
//!
//! Scoring is brute force: every candidate vector is compared against the
//! target. Candidate sets are bounded upstream (50 recent embeddings or a
//! 50-issue live window), so no index structure is needed.

use std::cmp::Ordering;

/// A candidate item paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub item: T,
    pub vector: Vec<f32>,
}

/// A candidate item paired with its similarity to the target.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub item: T,
    pub score: f32,
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Vectors of different lengths are compared over their overlapping
/// prefix only. If either side has zero magnitude over that prefix the
/// score is `0.0`, which is what makes zero-vector embeddings (the
/// degraded provider) rank as "no similarity" instead of failing.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
///
/// # Example
///
/// ```rust
/// use triage_core::similarity::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
/// assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Score every candidate against `target`, preserving input order.
pub fn score_all<T: Clone>(target: &[f32], candidates: &[Candidate<T>]) -> Vec<Scored<T>> {
    candidates
        .iter()
        .map(|c| Scored {
            item: c.item.clone(),
            score: cosine_similarity(target, &c.vector),
        })
        .collect()
}

/// Select the `k` highest-scoring entries, sorted by score descending.
///
/// The sort is stable, so equal scores keep their input order. Callers
/// that need a deterministic result must feed a deterministically
/// ordered input (the store orders by recency, the tracker by creation).
pub fn top_k<T>(mut scored: Vec<Scored<T>>, k: usize) -> Vec<Scored<T>> {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

/// Score and select in one step: `top_k(score_all(target, candidates), k)`.
pub fn nearest<T: Clone>(target: &[f32], candidates: &[Candidate<T>], k: usize) -> Vec<Scored<T>> {
    top_k(score_all(target, candidates), k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: u32, vector: Vec<f32>) -> Candidate<u32> {
        Candidate { item: id, vector }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_self_similarity_for_assorted_vectors() {
        let vectors = [
            vec![0.001f32, -0.002, 0.5],
            vec![-3.0, 4.0],
            vec![1e3, 1e-3, 7.5, -2.25],
        ];
        for v in &vectors {
            assert!((cosine_similarity(v, v) - 1.0).abs() < 1e-5, "{:?}", v);
        }
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.3, -1.2, 4.0];
        let b = vec![2.0, 0.5, -0.25];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_scores_zero() {
        let zero = vec![0.0; 4];
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths_uses_prefix() {
        let a = vec![1.0, 0.0, 9.0];
        let b = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_sorted_and_bounded() {
        let candidates = vec![
            cand(1, vec![0.0, 1.0]),
            cand(2, vec![1.0, 0.1]),
            cand(3, vec![-1.0, 0.0]),
            cand(4, vec![1.0, 1.0]),
        ];
        let top = nearest(&[1.0, 0.0], &candidates, 3);

        assert_eq!(top.len(), 3);
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(top[0].item, 2);
        assert_eq!(top[1].item, 4);
        assert!(top.iter().all(|s| candidates.iter().any(|c| c.item == s.item)));
    }

    #[test]
    fn test_top_k_fewer_candidates_than_k() {
        let candidates = vec![cand(1, vec![1.0]), cand(2, vec![-1.0])];
        let top = nearest(&[1.0], &candidates, 3);
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].score, -1.0);
    }

    #[test]
    fn test_top_k_ties_keep_input_order() {
        let scored = vec![
            Scored { item: "a", score: 0.5 },
            Scored { item: "b", score: 0.9 },
            Scored { item: "c", score: 0.5 },
        ];
        let top = top_k(scored, 3);
        let order: Vec<&str> = top.iter().map(|s| s.item).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_top_k_zero() {
        let candidates = vec![cand(1, vec![1.0])];
        assert!(nearest(&[1.0], &candidates, 0).is_empty());
    }
}
