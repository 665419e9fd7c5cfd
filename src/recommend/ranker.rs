//! Deterministic ranking and paging
//!
//! Order is descending score under IEEE total ordering, ties broken by
//! ascending item id, so equal inputs always produce the same page.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::RecommendationScore;

/// One page of ranked item ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPage {
    pub item_ids: Vec<i64>,
    pub has_more: bool,
}

fn by_rank(a: &RecommendationScore, b: &RecommendationScore) -> Ordering {
    b.score.total_cmp(&a.score).then(a.item_id.cmp(&b.item_id))
}

/// Sort and slice page `page` (1-based) of size `limit`
pub fn rank_page(mut scores: Vec<RecommendationScore>, page: usize, limit: usize) -> RankedPage {
    scores.sort_by(by_rank);

    let start = page.saturating_sub(1).saturating_mul(limit);
    let end = start.saturating_add(limit).min(scores.len());

    if start >= scores.len() {
        return RankedPage { item_ids: vec![], has_more: false };
    }

    RankedPage {
        item_ids: scores[start..end].iter().map(|s| s.item_id).collect(),
        has_more: end < scores.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(item_id: i64, score: f64) -> RecommendationScore {
        RecommendationScore { item_id, score, reasons: vec![] }
    }

    #[test]
    fn test_rank_orders_by_score_then_id() {
        let page = rank_page(vec![s(5, 0.2), s(3, 0.9), s(9, 0.5), s(1, 0.5)], 1, 10);
        assert_eq!(page.item_ids, vec![3, 1, 9, 5]);
        assert!(!page.has_more);
    }

    #[test]
    fn test_rank_truncates() {
        let page = rank_page(vec![s(1, 0.1), s(2, 0.2), s(3, 0.3)], 1, 2);
        assert_eq!(page.item_ids, vec![3, 2]);
        assert!(page.has_more);
        assert!(rank_page(vec![s(1, 0.1)], 1, 0).item_ids.is_empty());
    }

    #[test]
    fn test_rank_is_deterministic_for_nan() {
        let a = rank_page(vec![s(1, f64::NAN), s(2, 0.5), s(3, 0.5)], 1, 3);
        let b = rank_page(vec![s(3, 0.5), s(1, f64::NAN), s(2, 0.5)], 1, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rank_page_slices_and_reports_more() {
        let scores: Vec<_> = (1..=7).map(|i| s(i, i as f64)).collect();

        let first = rank_page(scores.clone(), 1, 3);
        assert_eq!(first, RankedPage { item_ids: vec![7, 6, 5], has_more: true });

        let last = rank_page(scores.clone(), 3, 3);
        assert_eq!(last, RankedPage { item_ids: vec![1], has_more: false });

        let beyond = rank_page(scores, 4, 3);
        assert_eq!(beyond, RankedPage { item_ids: vec![], has_more: false });
    }
}
