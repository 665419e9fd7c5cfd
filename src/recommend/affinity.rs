//! Per-user tag affinity
//!
//! Each tag's affinity is the number of positive interactions whose item
//! carries the tag, divided by the user's total positive interactions.

use std::collections::HashMap;

use diesel::prelude::*;
use tracing::debug;

use crate::db::diesel_schema::interactions;
use crate::db::items::get_tags_for_items;
use crate::db::InteractionType;
use crate::error::FeedError;

/// Tag → affinity in [0, 1]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffinityVector {
    weights: HashMap<String, f64>,
    positive_count: usize,
}

impl AffinityVector {
    /// Neutral vector for anonymous or cold-start users
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from per-interaction tag lists (one entry per positive interaction)
    pub fn from_positive_tags<'a, I, T>(positives: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut positive_count = 0usize;

        for tags in positives {
            positive_count += 1;
            for tag in tags {
                *counts.entry(tag.to_string()).or_default() += 1;
            }
        }

        if positive_count == 0 {
            return Self::empty();
        }

        let weights = counts
            .into_iter()
            .map(|(tag, n)| (tag, n as f64 / positive_count as f64))
            .collect();

        Self { weights, positive_count }
    }

    pub fn get(&self, tag: &str) -> f64 {
        self.weights.get(tag).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn positive_count(&self) -> usize {
        self.positive_count
    }
}

/// Derive the affinity vector from a user's interaction history
pub fn build_affinity(conn: &mut SqliteConnection, user_id: i64) -> Result<AffinityVector, FeedError> {
    let positive: Vec<&str> = InteractionType::ALL
        .iter()
        .filter(|t| t.is_positive())
        .map(|t| t.as_str())
        .collect();

    // One row per positive interaction; like + super_like on one item count twice
    let item_ids: Vec<i64> = interactions::table
        .filter(interactions::user_id.eq(user_id))
        .filter(interactions::interaction_type.eq_any(positive))
        .select(interactions::item_id)
        .load(conn)?;

    if item_ids.is_empty() {
        debug!(user_id = user_id, "No positive interactions, neutral affinity");
        return Ok(AffinityVector::empty());
    }

    let mut distinct = item_ids.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let tags = get_tags_for_items(conn, &distinct)?;

    let affinity = AffinityVector::from_positive_tags(item_ids.iter().map(|id| {
        tags.get(id)
            .map(|t| t.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>())
            .unwrap_or_default()
    }));

    debug!(
        user_id = user_id,
        positives = affinity.positive_count(),
        tags = affinity.len(),
        "Built tag affinity"
    );
    Ok(affinity)
}
