//! Interaction service - validation and transaction boundary for the ledger
//!
//! Recording does not touch the feed cache. Cached pages may still show an
//! item the user just swiped until the page TTL runs out.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::db::{self, interactions, FeedDb, Interaction, InteractionType, RecordInteractionInput};
use crate::error::FeedError;

use super::events::{EventBus, FeedEvent};

const MAX_SESSION_ID_LEN: usize = 100;

/// Interaction service
pub struct InteractionService {
    db: Arc<FeedDb>,
    events: Arc<EventBus>,
}

impl InteractionService {
    pub fn new(db: Arc<FeedDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Record a swipe; duplicates are rejected without touching counters
    pub fn record(&self, input: &RecordInteractionInput) -> Result<Interaction, FeedError> {
        validate(input)?;

        let recorded = self
            .db
            .with_transaction(|conn| interactions::record_interaction(conn, input))
            .map_err(|e| {
                if let FeedError::DuplicateInteraction { .. } = e {
                    debug!(
                        user_id = input.user_id,
                        item_id = input.item_id,
                        interaction_type = %input.interaction_type,
                        "Duplicate interaction rejected"
                    );
                }
                e
            })?;

        info!(
            user_id = recorded.user_id,
            item_id = recorded.item_id,
            interaction_type = %recorded.interaction_type,
            "Interaction recorded"
        );
        self.events.emit(FeedEvent::InteractionRecorded {
            user_id: recorded.user_id,
            item_id: recorded.item_id,
            interaction_type: recorded.interaction_type.clone(),
        });

        Ok(recorded)
    }

    /// Interaction counts on an item grouped by type
    pub fn stats(&self, item_id: i64) -> Result<HashMap<String, i64>, FeedError> {
        self.db.with_conn(|conn| {
            if !db::items::item_exists(conn, item_id)? {
                return Err(FeedError::NotFound(format!("item {}", item_id)));
            }
            interactions::stats_by_type(conn, item_id)
        })
    }

    pub fn list_by_user(
        &self,
        user_id: i64,
        interaction_type: Option<InteractionType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Interaction>, FeedError> {
        self.db
            .with_conn(|conn| interactions::list_by_user(conn, user_id, interaction_type, limit, offset))
    }

    pub fn list_by_item(&self, item_id: i64, limit: i64, offset: i64) -> Result<Vec<Interaction>, FeedError> {
        self.db.with_conn(|conn| interactions::list_by_item(conn, item_id, limit, offset))
    }
}

fn validate(input: &RecordInteractionInput) -> Result<(), FeedError> {
    if input.user_id <= 0 {
        return Err(FeedError::Validation("user_id is required".into()));
    }
    if let Some(ref session) = input.session_id {
        if session.chars().count() > MAX_SESSION_ID_LEN {
            return Err(FeedError::Validation(format!(
                "session_id exceeds {} characters",
                MAX_SESSION_ID_LEN
            )));
        }
    }
    if let Some(duration) = input.view_duration {
        if !duration.is_finite() || duration < 0.0 {
            return Err(FeedError::Validation("view_duration must be a non-negative number".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::items::{create_item, require_item, test_support::item_input};

    fn setup() -> (Arc<FeedDb>, InteractionService, i64) {
        let db = Arc::new(FeedDb::open_in_memory().unwrap());
        let item_id = db
            .with_conn(|conn| create_item(conn, &item_input(1, "Demo", &[], "2024-01-01T00:00:00Z")))
            .unwrap()
            .item
            .id;
        let svc = InteractionService::new(db.clone(), Arc::new(EventBus::new()));
        (db, svc, item_id)
    }

    #[test]
    fn test_validation() {
        let (_, svc, item_id) = setup();

        let mut input = RecordInteractionInput::new(2, item_id, InteractionType::Like);
        input.view_duration = Some(-1.0);
        assert!(matches!(svc.record(&input), Err(FeedError::Validation(_))));

        input.view_duration = Some(f64::NAN);
        assert!(matches!(svc.record(&input), Err(FeedError::Validation(_))));

        input.view_duration = None;
        input.session_id = Some("x".repeat(101));
        assert!(matches!(svc.record(&input), Err(FeedError::Validation(_))));
    }

    #[test]
    fn test_duplicate_leaves_counter_alone() {
        let (db, svc, item_id) = setup();
        let input = RecordInteractionInput::new(2, item_id, InteractionType::SuperLike);

        svc.record(&input).unwrap();
        assert!(matches!(svc.record(&input), Err(FeedError::DuplicateInteraction { .. })));

        let item = db.with_conn(|conn| require_item(conn, item_id)).unwrap();
        assert_eq!(item.super_like_count, 1);
        assert_eq!(svc.stats(item_id).unwrap().get("super_like"), Some(&1));
        assert!(matches!(svc.stats(999), Err(FeedError::NotFound(_))));

        assert_eq!(svc.list_by_item(item_id, 10, 0).unwrap().len(), 1);
        assert_eq!(svc.list_by_user(2, Some(InteractionType::SuperLike), 10, 0).unwrap().len(), 1);
        assert!(svc.list_by_user(2, Some(InteractionType::Like), 10, 0).unwrap().is_empty());
    }
}
