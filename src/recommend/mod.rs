//! Recommendation pipeline
//!
//! ```text
//! build_affinity ─► get_candidates ─► score_candidates ─► rank_page
//!   (affinity.rs)    (candidates.rs)     (scoring.rs)      (ranker.rs)
//! ```
//!
//! Everything here is recomputed per request; nothing is written back to
//! the database.

pub mod affinity;
pub mod candidates;
pub mod ranker;
pub mod scoring;

use serde::{Deserialize, Serialize};

pub use affinity::{build_affinity, AffinityVector};
pub use candidates::{get_candidates, get_candidates_by_tags};
pub use ranker::{rank_page, RankedPage};
pub use scoring::{score_candidates, score_item, Reason, RecommendationScore};

/// Weights of the composite relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_tag_weight")]
    pub tag_weight: f64,

    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f64,

    #[serde(default = "default_freshness_weight")]
    pub freshness_weight: f64,

    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,

    /// Days for freshness to fall to 1/e
    #[serde(default = "default_freshness_decay_days")]
    pub freshness_decay_days: f64,

    /// Share of like rate inside the popularity score
    #[serde(default = "default_like_rate_share")]
    pub like_rate_share: f64,

    /// Share of engagement rate inside the popularity score
    #[serde(default = "default_engagement_share")]
    pub engagement_share: f64,
}

fn default_tag_weight() -> f64 {
    0.4
}

fn default_popularity_weight() -> f64 {
    0.3
}

fn default_freshness_weight() -> f64 {
    0.2
}

fn default_similarity_weight() -> f64 {
    0.1
}

fn default_freshness_decay_days() -> f64 {
    30.0
}

fn default_like_rate_share() -> f64 {
    0.7
}

fn default_engagement_share() -> f64 {
    0.3
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            tag_weight: default_tag_weight(),
            popularity_weight: default_popularity_weight(),
            freshness_weight: default_freshness_weight(),
            similarity_weight: default_similarity_weight(),
            freshness_decay_days: default_freshness_decay_days(),
            like_rate_share: default_like_rate_share(),
            engagement_share: default_engagement_share(),
        }
    }
}
