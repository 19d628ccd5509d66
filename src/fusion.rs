//! Reciprocal-rank fusion and score blending.
//!
//! Merges ranked lists from the keyword and vector engines (and, in query
//! mode, across query variants) into a single list keyed by file path.
//! List weighting is positional: passing the same list twice doubles its
//! contribution.

use std::collections::HashMap;

use crate::models::SearchHit;

/// Fuse ranked lists with reciprocal-rank fusion.
///
/// Each item accumulates `Σ 1/(k + rank)` over the lists containing it,
/// with 1-based ranks. Items are deduplicated by `file_path`; the payload
/// kept for a path is the one from its best (lowest) rank across all
/// lists. Ties break by first appearance.
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchHit>], k: f64) -> Vec<SearchHit> {
    struct Fused {
        hit: SearchHit,
        score: f64,
        best_rank: usize,
        first_seen: usize,
    }

    let mut by_path: HashMap<String, Fused> = HashMap::new();
    let mut arrival = 0usize;

    for list in lists {
        for (i, hit) in list.iter().enumerate() {
            let rank = i + 1;
            let contribution = 1.0 / (k + rank as f64);
            match by_path.get_mut(&hit.file_path) {
                Some(entry) => {
                    entry.score += contribution;
                    if rank < entry.best_rank {
                        entry.best_rank = rank;
                        entry.hit = hit.clone();
                    }
                }
                None => {
                    by_path.insert(
                        hit.file_path.clone(),
                        Fused {
                            hit: hit.clone(),
                            score: contribution,
                            best_rank: rank,
                            first_seen: arrival,
                        },
                    );
                    arrival += 1;
                }
            }
        }
    }

    let mut fused: Vec<Fused> = by_path.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });

    fused
        .into_iter()
        .map(|f| {
            let mut hit = f.hit;
            hit.score = f.score;
            hit
        })
        .collect()
}

/// Min-max normalize hit scores to `[0, 1]` in place. All-equal scores
/// normalize to 1.0.
pub fn normalize_scores(hits: &mut [SearchHit]) {
    if hits.is_empty() {
        return;
    }
    let min = hits.iter().map(|h| h.score).fold(f64::INFINITY, f64::min);
    let max = hits
        .iter()
        .map(|h| h.score)
        .fold(f64::NEG_INFINITY, f64::max);

    for hit in hits.iter_mut() {
        hit.score = if (max - min).abs() < f64::EPSILON {
            1.0
        } else {
            (hit.score - min) / (max - min)
        };
    }
}

/// Blend RRF positions with reranker scores for the reranked prefix.
///
/// Both inputs are min-max normalized over the merged set; the prefix is
/// re-ordered by `α·rrf + (1−α)·rerank`, and items beyond the reranked
/// prefix keep their RRF order below it.
pub fn position_aware_blend(
    fused: Vec<SearchHit>,
    rerank_scores: &[f64],
    alpha: f64,
) -> Vec<SearchHit> {
    if fused.is_empty() || rerank_scores.is_empty() {
        return fused;
    }

    let mut fused = fused;
    normalize_scores(&mut fused);

    let r_min = rerank_scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let r_max = rerank_scores
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let norm_rerank = |s: f64| {
        if (r_max - r_min).abs() < f64::EPSILON {
            1.0
        } else {
            (s - r_min) / (r_max - r_min)
        }
    };

    let prefix_len = rerank_scores.len().min(fused.len());
    let tail = fused.split_off(prefix_len);

    for (hit, &rerank) in fused.iter_mut().zip(rerank_scores.iter()) {
        hit.score = alpha * hit.score + (1.0 - alpha) * norm_rerank(rerank);
    }
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    fused.extend(tail);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str, score: f64) -> SearchHit {
        SearchHit {
            score,
            file_path: path.to_string(),
            title: path.to_string(),
            content: format!("content of {}", path),
            excerpt: String::new(),
            date: None,
            people: Vec::new(),
            category: "notes".to_string(),
            vault: "work".to_string(),
            engine: "bm25",
        }
    }

    #[test]
    fn single_list_preserves_order() {
        let list = vec![hit("a", 3.0), hit("b", 2.0), hit("c", 1.0)];
        let fused = reciprocal_rank_fusion(&[list.clone()], 60.0);
        let order: Vec<&str> = fused.iter().map(|h| h.file_path.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn commutative_for_equal_weights() {
        let l1 = vec![hit("a", 1.0), hit("b", 1.0)];
        let l2 = vec![hit("c", 1.0), hit("a", 1.0)];
        let f12 = reciprocal_rank_fusion(&[l1.clone(), l2.clone()], 60.0);
        let f21 = reciprocal_rank_fusion(&[l2, l1], 60.0);
        let s12: Vec<(String, f64)> = f12.iter().map(|h| (h.file_path.clone(), h.score)).collect();
        let mut s21: Vec<(String, f64)> =
            f21.iter().map(|h| (h.file_path.clone(), h.score)).collect();
        s21.sort_by(|a, b| a.0.cmp(&b.0));
        let mut s12_sorted = s12.clone();
        s12_sorted.sort_by(|a, b| a.0.cmp(&b.0));
        for ((p1, v1), (p2, v2)) in s12_sorted.iter().zip(s21.iter()) {
            assert_eq!(p1, p2);
            assert!((v1 - v2).abs() < 1e-12);
        }
    }

    #[test]
    fn two_list_scores_and_tie_break() {
        // [A, B, C] and [B, A, D]: A and B tie, A appeared first.
        let l1 = vec![hit("a", 1.0), hit("b", 1.0), hit("c", 1.0)];
        let l2 = vec![hit("b", 1.0), hit("a", 1.0), hit("d", 1.0)];
        let fused = reciprocal_rank_fusion(&[l1, l2], 60.0);

        let order: Vec<&str> = fused.iter().map(|h| h.file_path.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);

        let expected_ab = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused[0].score - expected_ab).abs() < 1e-12);
        assert!((fused[1].score - expected_ab).abs() < 1e-12);
        assert!((fused[2].score - 1.0 / 63.0).abs() < 1e-12);
        assert!((fused[3].score - 1.0 / 63.0).abs() < 1e-12);
    }

    #[test]
    fn repeated_list_boosts_contribution() {
        let bm25 = vec![hit("kw", 1.0)];
        let vector = vec![hit("vec", 1.0)];
        let fused =
            reciprocal_rank_fusion(&[bm25.clone(), bm25.clone(), bm25, vector], 60.0);
        assert_eq!(fused[0].file_path, "kw");
        assert!((fused[0].score - 3.0 / 61.0).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn dedupes_by_path_keeping_best_rank_payload() {
        let mut best = hit("a", 9.0);
        best.excerpt = "best chunk".to_string();
        let mut worse = hit("a", 1.0);
        worse.excerpt = "worse chunk".to_string();
        let l1 = vec![worse.clone(), hit("b", 1.0)];
        let l2 = vec![hit("b", 1.0), best.clone()];
        // "a" ranks 1 in l1 and 2 in l2; rank-1 payload wins.
        let fused = reciprocal_rank_fusion(&[l1, l2], 60.0);
        let a = fused.iter().find(|h| h.file_path == "a").unwrap();
        assert_eq!(a.excerpt, "worse chunk");
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn normalize_full_range() {
        let mut hits = vec![hit("a", 10.0), hit("b", 5.0), hit("c", 0.0)];
        normalize_scores(&mut hits);
        assert!((hits[0].score - 1.0).abs() < 1e-12);
        assert!((hits[1].score - 0.5).abs() < 1e-12);
        assert!(hits[2].score.abs() < 1e-12);
    }

    #[test]
    fn normalize_all_equal_to_one() {
        let mut hits = vec![hit("a", 2.0), hit("b", 2.0)];
        normalize_scores(&mut hits);
        assert!(hits.iter().all(|h| (h.score - 1.0).abs() < 1e-12));
    }

    #[test]
    fn blend_reorders_prefix_only() {
        let fused = vec![
            hit("a", 0.05),
            hit("b", 0.04),
            hit("c", 0.03),
            hit("d", 0.02),
        ];
        // Reranker strongly prefers "b"; "d" is beyond the prefix and stays last.
        let blended = position_aware_blend(fused, &[0.0, 1.0, 0.0], 0.5);
        assert_eq!(blended[0].file_path, "b");
        assert_eq!(blended[3].file_path, "d");
    }

    #[test]
    fn blend_with_no_rerank_scores_is_identity() {
        let fused = vec![hit("a", 0.9), hit("b", 0.1)];
        let blended = position_aware_blend(fused.clone(), &[], 0.5);
        let order: Vec<&str> = blended.iter().map(|h| h.file_path.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }
}
