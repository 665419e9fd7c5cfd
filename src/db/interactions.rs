//! Interaction ledger
//!
//! Each (user, item, type) triple is recorded at most once. The matching
//! item counter moves in the same transaction as the ledger insert, so the
//! counters always equal the ledger totals.

use std::collections::HashMap;

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::interactions;
use super::items::{increment_counter, item_exists};
use super::models::{current_timestamp, FeedbackCode, Interaction, InteractionType, NewInteraction};
use crate::error::{is_unique_violation, FeedError};

/// Input for recording an interaction
#[derive(Debug, Clone, Deserialize)]
pub struct RecordInteractionInput {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub item_id: i64,
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub feedback: Option<FeedbackCode>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Seconds the card was on screen
    #[serde(default)]
    pub view_duration: Option<f64>,
}

impl RecordInteractionInput {
    pub fn new(user_id: i64, item_id: i64, interaction_type: InteractionType) -> Self {
        Self {
            user_id,
            item_id,
            interaction_type,
            feedback: None,
            session_id: None,
            view_duration: None,
        }
    }
}

/// Insert the ledger row and bump the item counter
///
/// Must run inside a transaction; the caller owns the boundary.
pub fn record_interaction(
    conn: &mut SqliteConnection,
    input: &RecordInteractionInput,
) -> Result<Interaction, FeedError> {
    if !item_exists(conn, input.item_id)? {
        return Err(FeedError::NotFound(format!("item {}", input.item_id)));
    }

    let duplicate = || FeedError::DuplicateInteraction {
        user_id: input.user_id,
        item_id: input.item_id,
        interaction_type: input.interaction_type.as_str().to_string(),
    };

    if interaction_exists(conn, input.user_id, input.item_id, input.interaction_type)? {
        return Err(duplicate());
    }

    let now = current_timestamp();
    let row = NewInteraction {
        user_id: input.user_id,
        item_id: input.item_id,
        interaction_type: input.interaction_type.as_str(),
        structured_feedback: input.feedback.map(|f| f.as_str()),
        session_id: input.session_id.as_deref(),
        view_duration: input.view_duration,
        created_at: &now,
    };

    // The unique index is the real guard; the pre-check above only skips work
    diesel::insert_into(interactions::table)
        .values(&row)
        .execute(conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate()
            } else {
                FeedError::TransientStore(format!("Insert failed: {}", e))
            }
        })?;

    if let Some(counter) = input.interaction_type.counter() {
        increment_counter(conn, input.item_id, counter, 1)?;
    }

    interactions::table
        .filter(interactions::user_id.eq(input.user_id))
        .filter(interactions::item_id.eq(input.item_id))
        .filter(interactions::interaction_type.eq(input.interaction_type.as_str()))
        .select(Interaction::as_select())
        .first(conn)
        .map_err(FeedError::from)
}

/// Whether the triple is already in the ledger
pub fn interaction_exists(
    conn: &mut SqliteConnection,
    user_id: i64,
    item_id: i64,
    interaction_type: InteractionType,
) -> Result<bool, FeedError> {
    let count: i64 = interactions::table
        .filter(interactions::user_id.eq(user_id))
        .filter(interactions::item_id.eq(item_id))
        .filter(interactions::interaction_type.eq(interaction_type.as_str()))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// A user's interactions, newest first, optionally filtered by type
pub fn list_by_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    interaction_type: Option<InteractionType>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Interaction>, FeedError> {
    let mut query = interactions::table
        .filter(interactions::user_id.eq(user_id))
        .into_boxed();

    if let Some(t) = interaction_type {
        query = query.filter(interactions::interaction_type.eq(t.as_str()));
    }

    Ok(query
        .order((interactions::created_at.desc(), interactions::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Interaction::as_select())
        .load(conn)?)
}

/// All interactions on one item, newest first
pub fn list_by_item(
    conn: &mut SqliteConnection,
    item_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Interaction>, FeedError> {
    Ok(interactions::table
        .filter(interactions::item_id.eq(item_id))
        .order((interactions::created_at.desc(), interactions::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Interaction::as_select())
        .load(conn)?)
}

/// Interaction counts on one item grouped by type
pub fn stats_by_type(
    conn: &mut SqliteConnection,
    item_id: i64,
) -> Result<HashMap<String, i64>, FeedError> {
    let rows: Vec<(String, i64)> = interactions::table
        .filter(interactions::item_id.eq(item_id))
        .group_by(interactions::interaction_type)
        .select((interactions::interaction_type, diesel::dsl::count_star()))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::items::{create_item, require_item, test_support::item_input};
    use crate::db::FeedDb;

    fn seed_item(db: &FeedDb) -> i64 {
        db.with_conn(|conn| create_item(conn, &item_input(1, "Demo", &["rust"], "2024-01-01T00:00:00Z")))
            .unwrap()
            .item
            .id
    }

    #[test]
    fn test_record_increments_counter_once() {
        let db = FeedDb::open_in_memory().unwrap();
        let item_id = seed_item(&db);

        let input = RecordInteractionInput::new(7, item_id, InteractionType::Like);
        db.with_transaction(|conn| record_interaction(conn, &input)).unwrap();

        let second = db.with_transaction(|conn| record_interaction(conn, &input));
        assert!(matches!(second, Err(FeedError::DuplicateInteraction { .. })));

        let item = db.with_conn(|conn| require_item(conn, item_id)).unwrap();
        assert_eq!(item.like_count, 1);
        assert_eq!(db.stats().unwrap().interaction_count, 1);
    }

    #[test]
    fn test_distinct_types_are_separate_records() {
        let db = FeedDb::open_in_memory().unwrap();
        let item_id = seed_item(&db);

        for t in [InteractionType::Like, InteractionType::Bookmark, InteractionType::Skip] {
            db.with_transaction(|conn| record_interaction(conn, &RecordInteractionInput::new(7, item_id, t)))
                .unwrap();
        }

        let stats = db.with_conn(|conn| stats_by_type(conn, item_id)).unwrap();
        assert_eq!(stats.get("like"), Some(&1));
        assert_eq!(stats.get("bookmark"), Some(&1));
        assert_eq!(stats.get("skip"), Some(&1));
        assert_eq!(stats.get("dislike"), None);

        let item = db.with_conn(|conn| require_item(conn, item_id)).unwrap();
        assert_eq!(item.skip_count, 1);
        assert_eq!(item.like_count, 1);
    }

    #[test]
    fn test_missing_item_not_found() {
        let db = FeedDb::open_in_memory().unwrap();
        let result = db.with_transaction(|conn| {
            record_interaction(conn, &RecordInteractionInput::new(7, 404, InteractionType::Like))
        });
        assert!(matches!(result, Err(FeedError::NotFound(_))));
    }

    #[test]
    fn test_feedback_is_stored() {
        let db = FeedDb::open_in_memory().unwrap();
        let item_id = seed_item(&db);

        let mut input = RecordInteractionInput::new(7, item_id, InteractionType::Dislike);
        input.feedback = Some(FeedbackCode::PoorDemo);
        input.session_id = Some("s-1".into());
        let row = db.with_transaction(|conn| record_interaction(conn, &input)).unwrap();

        assert_eq!(row.structured_feedback.as_deref(), Some("poor_demo"));
        assert_eq!(row.session_id.as_deref(), Some("s-1"));

        let listed = db
            .with_conn(|conn| list_by_user(conn, 7, Some(InteractionType::Dislike), 10, 0))
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
