//! Composite relevance scoring
//!
//! ```text
//! score = w_tag * tag + w_pop * popularity + w_fresh * freshness + w_sim * similarity
//! ```
//!
//! Popularity reads the item's stored counters only. Similarity needs the
//! follow graph and is looked up once per distinct owner.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ts_rs::TS;

use super::{AffinityVector, ScoringWeights};
use crate::db::follows::{common_followee_count, is_following};
use crate::db::models::parse_timestamp;
use crate::db::{Item, ItemWithTags};
use crate::error::FeedError;

/// Candidates scored between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 32;

const TAG_MATCH_THRESHOLD: f64 = 0.0;
const POPULAR_THRESHOLD: f64 = 0.5;
const FRESH_THRESHOLD: f64 = 0.7;
const SOCIAL_THRESHOLD: f64 = 0.5;

/// Why an item was recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "feed/")]
pub enum Reason {
    TagMatch,
    Popular,
    Fresh,
    Social,
}

/// Per-request score of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct RecommendationScore {
    pub item_id: i64,
    pub score: f64,
    pub reasons: Vec<Reason>,
}

// ============================================================================
// Factors
// ============================================================================

/// (likes + super_likes) / (likes + dislikes + super_likes + skips); 0 with no votes
pub fn like_rate(item: &Item) -> f64 {
    let votes = item.like_count + item.dislike_count + item.super_like_count + item.skip_count;
    if votes <= 0 {
        return 0.0;
    }
    (item.like_count + item.super_like_count) as f64 / votes as f64
}

/// Recorded interactions (votes plus comments) per view, with +1 on views
///
/// Bookmarks are not counted: they have no counter on the item, and this
/// reads counters only, never the interaction ledger.
pub fn engagement_rate(item: &Item) -> f64 {
    let total = item.like_count
        + item.dislike_count
        + item.super_like_count
        + item.skip_count
        + item.comment_count;
    total as f64 / (item.view_count + 1) as f64
}

pub fn popularity_score(item: &Item, weights: &ScoringWeights) -> f64 {
    weights.like_rate_share * like_rate(item) + weights.engagement_share * engagement_rate(item)
}

/// exp(-age / decay); future timestamps count as age 0
pub fn freshness_score(created_at: DateTime<Utc>, now: DateTime<Utc>, decay_days: f64) -> f64 {
    let age_secs = (now - created_at).num_milliseconds().max(0) as f64 / 1000.0;
    let age_days = age_secs / 86_400.0;
    (-age_days / decay_days).exp()
}

/// Mean affinity over the item's tags; 0 for an untagged item
pub fn tag_score(item: &ItemWithTags, affinity: &AffinityVector) -> f64 {
    if item.tags.is_empty() {
        return 0.0;
    }
    let total: f64 = item.tags.iter().map(|t| affinity.get(&t.name)).sum();
    total / item.tags.len() as f64
}

/// 1.0 if the requester follows the owner, 0.5 if they share a followee, else 0
///
/// A requester shares every followee with themself, so their own items get
/// 0.5 as soon as they follow anyone.
pub fn similarity(
    conn: &mut SqliteConnection,
    requester: i64,
    owner: i64,
) -> Result<f64, FeedError> {
    if is_following(conn, requester, owner)? {
        return Ok(1.0);
    }
    if common_followee_count(conn, requester, owner)? > 0 {
        return Ok(0.5);
    }
    Ok(0.0)
}

// ============================================================================
// Scoring
// ============================================================================

/// Score a single candidate from precomputed inputs
pub fn score_item(
    item: &ItemWithTags,
    affinity: &AffinityVector,
    weights: &ScoringWeights,
    similarity: f64,
    now: DateTime<Utc>,
) -> RecommendationScore {
    let tag = tag_score(item, affinity);
    let popularity = popularity_score(&item.item, weights);
    let freshness = match parse_timestamp(&item.item.created_at) {
        Some(created_at) => freshness_score(created_at, now, weights.freshness_decay_days),
        None => {
            warn!(item_id = item.item.id, created_at = %item.item.created_at, "Unparseable item timestamp");
            0.0
        }
    };

    let score = weights.tag_weight * tag
        + weights.popularity_weight * popularity
        + weights.freshness_weight * freshness
        + weights.similarity_weight * similarity;

    let mut reasons = Vec::new();
    if tag > TAG_MATCH_THRESHOLD {
        reasons.push(Reason::TagMatch);
    }
    if popularity > POPULAR_THRESHOLD {
        reasons.push(Reason::Popular);
    }
    if freshness > FRESH_THRESHOLD {
        reasons.push(Reason::Fresh);
    }
    if similarity > SOCIAL_THRESHOLD {
        reasons.push(Reason::Social);
    }

    RecommendationScore {
        item_id: item.item.id,
        score,
        reasons,
    }
}

/// Score every candidate for `requester` (None = anonymous, similarity 0)
pub fn score_candidates(
    conn: &mut SqliteConnection,
    requester: Option<i64>,
    candidates: &[ItemWithTags],
    affinity: &AffinityVector,
    weights: &ScoringWeights,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Vec<RecommendationScore>, FeedError> {
    let mut owner_similarity: HashMap<i64, f64> = HashMap::new();
    let mut scores = Vec::with_capacity(candidates.len());

    for (i, candidate) in candidates.iter().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            debug!(scored = i, "Scoring cancelled");
            return Err(FeedError::Cancelled);
        }

        let sim = match requester {
            Some(user_id) => {
                let owner = candidate.item.owner_id;
                match owner_similarity.get(&owner) {
                    Some(s) => *s,
                    None => {
                        let s = similarity(conn, user_id, owner)?;
                        owner_similarity.insert(owner, s);
                        s
                    }
                }
            }
            None => 0.0,
        };

        scores.push(score_item(candidate, affinity, weights, sim, now));
    }

    debug!(
        candidates = candidates.len(),
        owners = owner_similarity.len(),
        "Scored candidates"
    );
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::follows::create_follow;
    use crate::db::{Tag, TagCategory};
    use chrono::Duration;

    fn item(id: i64, created_at: &str) -> Item {
        Item {
            id,
            owner_id: 1,
            title: format!("item {}", id),
            description: None,
            status: "demo".into(),
            is_public: true,
            view_count: 0,
            like_count: 0,
            dislike_count: 0,
            super_like_count: 0,
            skip_count: 0,
            comment_count: 0,
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    fn with_tags(item: Item, tags: &[&str]) -> ItemWithTags {
        ItemWithTags {
            item,
            tags: tags
                .iter()
                .map(|t| Tag { name: t.to_string(), category: TagCategory::Technology })
                .collect(),
        }
    }

    fn now() -> DateTime<Utc> {
        parse_timestamp("2024-06-01T00:00:00Z").unwrap()
    }

    #[test]
    fn test_like_and_engagement_rates() {
        let mut it = item(1, "2024-01-01T00:00:00Z");
        assert_eq!(like_rate(&it), 0.0);
        assert_eq!(engagement_rate(&it), 0.0);

        it.like_count = 3;
        it.super_like_count = 1;
        it.dislike_count = 2;
        it.skip_count = 2;
        it.comment_count = 2;
        it.view_count = 9;
        assert_eq!(like_rate(&it), 0.5);
        assert_eq!(engagement_rate(&it), 1.0);

        let weights = ScoringWeights::default();
        assert!((popularity_score(&it, &weights) - (0.7 * 0.5 + 0.3 * 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_freshness_decay() {
        let decay = 30.0;
        let t0 = now();
        assert_eq!(freshness_score(t0, t0, decay), 1.0);

        let at_30 = freshness_score(t0 - Duration::days(30), t0, decay);
        assert!((at_30 - (-1.0f64).exp()).abs() < 1e-9);

        let mut previous = 1.0;
        for days in 1..120 {
            let f = freshness_score(t0 - Duration::days(days), t0, decay);
            assert!(f < previous);
            assert!(f > 0.0);
            previous = f;
        }

        assert_eq!(freshness_score(t0 + Duration::days(3), t0, decay), 1.0);
    }

    #[test]
    fn test_tag_score_is_mean_affinity() {
        let affinity = AffinityVector::from_positive_tags(vec![vec!["rust"], vec!["rust", "cli"]]);
        let tagged = with_tags(item(1, "2024-01-01T00:00:00Z"), &["rust", "cli", "go"]);
        assert!((tag_score(&tagged, &affinity) - (1.0 + 0.5 + 0.0) / 3.0).abs() < 1e-12);

        let untagged = with_tags(item(2, "2024-01-01T00:00:00Z"), &[]);
        assert_eq!(tag_score(&untagged, &affinity), 0.0);
    }

    #[test]
    fn test_score_item_composition_and_reasons() {
        let weights = ScoringWeights::default();
        let affinity = AffinityVector::from_positive_tags(vec![vec!["rust"]]);
        let fresh = with_tags(item(1, "2024-06-01T00:00:00Z"), &["rust"]);

        let scored = score_item(&fresh, &affinity, &weights, 1.0, now());
        assert!((scored.score - (0.4 * 1.0 + 0.2 * 1.0 + 0.1 * 1.0)).abs() < 1e-12);
        assert_eq!(scored.reasons, vec![Reason::TagMatch, Reason::Fresh, Reason::Social]);

        let stale = with_tags(item(2, "2023-01-01T00:00:00Z"), &["go"]);
        let scored = score_item(&stale, &affinity, &weights, 0.5, now());
        assert!(scored.reasons.is_empty());
    }

    #[test]
    fn test_unparseable_timestamp_scores_zero_freshness() {
        let weights = ScoringWeights::default();
        let broken = with_tags(item(1, "last tuesday"), &[]);
        let scored = score_item(&broken, &AffinityVector::empty(), &weights, 0.0, now());
        assert_eq!(scored.score, 0.0);
    }

    #[test]
    fn test_cancelled_token_aborts_scoring() {
        let db = crate::db::FeedDb::open_in_memory().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let candidates = vec![with_tags(item(1, "2024-01-01T00:00:00Z"), &[])];
        let result = db.with_conn(|conn| {
            score_candidates(
                conn,
                Some(1),
                &candidates,
                &AffinityVector::empty(),
                &ScoringWeights::default(),
                now(),
                &token,
            )
        });
        assert!(matches!(result, Err(FeedError::Cancelled)));
    }

    #[test]
    fn test_similarity_paths() {
        let db = crate::db::FeedDb::open_in_memory().unwrap();
        db.with_transaction(|conn| {
            create_follow(conn, 1, 2)?;
            create_follow(conn, 3, 2)?;
            Ok(())
        })
        .unwrap();

        db.with_conn(|conn| {
            assert_eq!(similarity(conn, 1, 2)?, 1.0);
            assert_eq!(similarity(conn, 1, 3)?, 0.5);
            assert_eq!(similarity(conn, 1, 1)?, 0.5);
            assert_eq!(similarity(conn, 4, 4)?, 0.0);
            assert_eq!(similarity(conn, 2, 1)?, 0.0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_score_candidates_mixes_social_paths() {
        let db = crate::db::FeedDb::open_in_memory().unwrap();
        // 1 follows 2 and 5; 3 also follows 5, so 1 and 3 share a followee
        db.with_transaction(|conn| {
            create_follow(conn, 1, 2)?;
            create_follow(conn, 1, 5)?;
            create_follow(conn, 3, 5)?;
            Ok(())
        })
        .unwrap();

        let ts = "2024-06-01T00:00:00Z";
        let owned = |id: i64, owner_id: i64| {
            let mut it = item(id, ts);
            it.owner_id = owner_id;
            with_tags(it, &[])
        };
        let candidates = vec![owned(10, 2), owned(11, 3), owned(12, 2), owned(13, 4), owned(14, 1)];
        let weights = ScoringWeights::default();

        let scores = db
            .with_conn(|conn| {
                score_candidates(
                    conn,
                    Some(1),
                    &candidates,
                    &AffinityVector::empty(),
                    &weights,
                    now(),
                    &CancellationToken::new(),
                )
            })
            .unwrap();

        let base = weights.freshness_weight;
        let expected = [
            (10, base + weights.similarity_weight),
            (11, base + weights.similarity_weight * 0.5),
            (12, base + weights.similarity_weight),
            (13, base),
            (14, base + weights.similarity_weight * 0.5),
        ];
        for (scored, (id, score)) in scores.iter().zip(expected) {
            assert_eq!(scored.item_id, id);
            assert!((scored.score - score).abs() < 1e-12, "item {}: {}", id, scored.score);
        }
        assert_eq!(scores[0].reasons, vec![Reason::Fresh, Reason::Social]);
        assert_eq!(scores[1].reasons, vec![Reason::Fresh]);
        // Memoised per owner: both items by owner 2 score identically
        assert_eq!(scores[0].score, scores[2].score);
    }
}
