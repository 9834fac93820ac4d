//! Reciprocal Rank Fusion of the lexical and semantic candidate lists
//! (spec §4.7): `score(id) = Σ 1/(k + rank_i)` summed over every list the
//! candidate appears in, k = 60.

use std::collections::HashMap;

use crate::constants::RRF_K;

/// One ranked candidate from a single sub-query, before fusion.
#[derive(Debug, Clone, Copy)]
pub struct RankedCandidate {
    pub object_id: i64,
    /// Position in its own list, 0-based.
    pub rank: usize,
    /// The sub-query's own similarity score, kept for tie-breaking and
    /// diagnostics; not part of the RRF sum itself.
    pub sub_score: f64,
}

/// A fused result: both sub-scores (0.0 if absent from that list) survive
/// for the caller to report alongside the body text (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct FusedResult {
    pub object_id: i64,
    pub rrf_score: f64,
    pub lexical_score: f64,
    pub semantic_score: f64,
    pub byte_range_len: usize,
}

/// Fuse `lexical` and `semantic` candidate lists into a single ranking,
/// then take the top `limit`. `byte_range_len` and `path` are supplied by
/// the caller per object id for the tie-break rule (shorter range, then
/// lexicographic path order) since rerank itself has no catalog access.
pub fn rrf_fusion(
    lexical: &[RankedCandidate],
    semantic: &[RankedCandidate],
    byte_range_len: &HashMap<i64, usize>,
    path: &HashMap<i64, String>,
    limit: usize,
) -> Vec<FusedResult> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut lexical_scores: HashMap<i64, f64> = HashMap::new();
    let mut semantic_scores: HashMap<i64, f64> = HashMap::new();

    for candidate in lexical {
        *scores.entry(candidate.object_id).or_insert(0.0) += 1.0 / (RRF_K + candidate.rank as f64 + 1.0);
        lexical_scores.insert(candidate.object_id, candidate.sub_score);
    }
    for candidate in semantic {
        *scores.entry(candidate.object_id).or_insert(0.0) += 1.0 / (RRF_K + candidate.rank as f64 + 1.0);
        semantic_scores.insert(candidate.object_id, candidate.sub_score);
    }

    let mut fused: Vec<FusedResult> = scores
        .into_iter()
        .map(|(object_id, rrf_score)| FusedResult {
            object_id,
            rrf_score,
            lexical_score: lexical_scores.get(&object_id).copied().unwrap_or(0.0),
            semantic_score: semantic_scores.get(&object_id).copied().unwrap_or(0.0),
            byte_range_len: byte_range_len.get(&object_id).copied().unwrap_or(usize::MAX),
        })
        .collect();

    let empty_path = String::new();
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.semantic_score
                    .partial_cmp(&a.semantic_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.byte_range_len.cmp(&b.byte_range_len))
            .then_with(|| {
                let pa = path.get(&a.object_id).unwrap_or(&empty_path);
                let pb = path.get(&b.object_id).unwrap_or(&empty_path);
                pa.cmp(pb)
            })
    });

    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_present_in_both_lists_outranks_single_list_candidate() {
        let lexical = vec![
            RankedCandidate { object_id: 1, rank: 0, sub_score: 5.0 },
            RankedCandidate { object_id: 2, rank: 1, sub_score: 4.0 },
        ];
        let semantic = vec![RankedCandidate { object_id: 1, rank: 0, sub_score: 0.9 }];

        let fused = rrf_fusion(&lexical, &semantic, &HashMap::new(), &HashMap::new(), 10);
        assert_eq!(fused[0].object_id, 1);
        assert!(fused[0].rrf_score > fused[1].rrf_score);
    }

    #[test]
    fn ties_break_by_semantic_score_then_byte_range_then_path() {
        let lexical = vec![
            RankedCandidate { object_id: 1, rank: 0, sub_score: 1.0 },
            RankedCandidate { object_id: 2, rank: 0, sub_score: 1.0 },
        ];
        let mut byte_range_len = HashMap::new();
        byte_range_len.insert(1, 100);
        byte_range_len.insert(2, 10);
        let mut path = HashMap::new();
        path.insert(1, "a.rs".to_string());
        path.insert(2, "b.rs".to_string());

        let fused = rrf_fusion(&lexical, &[], &byte_range_len, &path, 10);
        // equal rrf_score and semantic_score (both 0.0, absent from semantic list);
        // shorter byte range wins.
        assert_eq!(fused[0].object_id, 2);
    }

    #[test]
    fn limit_truncates_result_set() {
        let lexical: Vec<RankedCandidate> = (0..5)
            .map(|i| RankedCandidate { object_id: i, rank: i as usize, sub_score: 1.0 })
            .collect();
        let fused = rrf_fusion(&lexical, &[], &HashMap::new(), &HashMap::new(), 2);
        assert_eq!(fused.len(), 2);
    }
}
