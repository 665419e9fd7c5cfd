//! Item service - CRUD with ownership checks, views, comments and stats
//!
//! Derived stats are cached for the stats TTL and are never invalidated on
//! write; readers may see figures up to one TTL old.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use crate::cache::FeedCache;
use crate::db::{
    self, comments, items, Comment, CommentThread, CreateCommentInput, CreateItemInput, Counter, FeedDb, ItemPatch,
    ItemWithTags,
};
use crate::error::FeedError;
use crate::recommend::scoring::{engagement_rate, like_rate};

use super::events::{EventBus, FeedEvent};

/// Derived engagement metrics for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct ItemStats {
    pub item_id: i64,
    pub like_rate: f64,
    pub engagement_rate: f64,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_dislikes: i64,
    pub total_super_likes: i64,
    pub total_skips: i64,
    pub total_comments: i64,
}

/// Item service
pub struct ItemService {
    db: Arc<FeedDb>,
    cache: FeedCache,
    events: Arc<EventBus>,
}

impl ItemService {
    pub fn new(db: Arc<FeedDb>, cache: FeedCache, events: Arc<EventBus>) -> Self {
        Self { db, cache, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, item_id: i64) -> Result<Option<ItemWithTags>, FeedError> {
        self.db.with_conn(|conn| items::get_item_with_tags(conn, item_id))
    }

    /// Load items in the given order (feed hydration)
    pub fn get_many(&self, item_ids: &[i64]) -> Result<Vec<ItemWithTags>, FeedError> {
        self.db.with_conn(|conn| items::get_items_by_ids(conn, item_ids))
    }

    pub fn list_by_owner(&self, owner_id: i64, limit: i64, offset: i64) -> Result<Vec<ItemWithTags>, FeedError> {
        self.db.with_conn(|conn| items::list_by_owner(conn, owner_id, limit, offset))
    }

    /// Keyword search over public items
    pub fn search(&self, keyword: &str, limit: i64, offset: i64) -> Result<Vec<ItemWithTags>, FeedError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(FeedError::Validation("search keyword is required".into()));
        }
        self.db.with_conn(|conn| items::search_items(conn, keyword, limit, offset))
    }

    /// Derived engagement stats, served from cache when fresh
    pub fn stats(&self, item_id: i64) -> Result<ItemStats, FeedError> {
        let key = self.cache.stats_key(item_id);
        if let Some(stats) = self.cache.get::<ItemStats>(&key) {
            return Ok(stats);
        }

        let item = self.db.with_conn(|conn| items::require_item(conn, item_id))?;
        let stats = ItemStats {
            item_id,
            like_rate: like_rate(&item),
            engagement_rate: engagement_rate(&item),
            total_views: item.view_count,
            total_likes: item.like_count,
            total_dislikes: item.dislike_count,
            total_super_likes: item.super_like_count,
            total_skips: item.skip_count,
            total_comments: item.comment_count,
        };

        self.cache.put(&key, &stats, self.cache.stats_ttl());
        debug!(item_id = item_id, "Item stats computed");
        Ok(stats)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(&self, input: &CreateItemInput) -> Result<ItemWithTags, FeedError> {
        if input.owner_id <= 0 {
            return Err(FeedError::Unauthenticated);
        }
        if input.title.trim().is_empty() {
            return Err(FeedError::Validation("title is required".into()));
        }
        if input.tags.iter().any(|t| t.name.trim().is_empty()) {
            return Err(FeedError::Validation("tag names cannot be empty".into()));
        }

        let created = self.db.with_transaction(|conn| items::create_item(conn, input))?;

        info!(id = created.item.id, owner_id = created.item.owner_id, "Item created");
        self.events.emit(FeedEvent::ItemCreated {
            id: created.item.id,
            owner_id: created.item.owner_id,
            title: created.item.title.clone(),
        });
        Ok(created)
    }

    /// Apply a patch; only the owner may edit
    pub fn update(&self, actor_id: i64, item_id: i64, patch: &ItemPatch) -> Result<ItemWithTags, FeedError> {
        if let Some(ref title) = patch.title {
            if title.trim().is_empty() {
                return Err(FeedError::Validation("title cannot be empty".into()));
            }
        }

        let updated = self.db.with_transaction(|conn| {
            let item = items::require_item(conn, item_id)?;
            ensure_owner(actor_id, item.owner_id, item_id)?;
            items::update_item(conn, item_id, patch)?
                .ok_or_else(|| FeedError::NotFound(format!("item {}", item_id)))
        })?;

        self.events.emit(FeedEvent::ItemUpdated { id: item_id });
        Ok(updated)
    }

    /// Delete an item; only the owner may delete
    pub fn delete(&self, actor_id: i64, item_id: i64) -> Result<(), FeedError> {
        self.db.with_transaction(|conn| {
            let item = items::require_item(conn, item_id)?;
            ensure_owner(actor_id, item.owner_id, item_id)?;
            items::delete_item(conn, item_id)
        })?;

        info!(id = item_id, "Item deleted");
        self.events.emit(FeedEvent::ItemDeleted { id: item_id });
        Ok(())
    }

    /// Count one view
    pub fn increment_views(&self, item_id: i64) -> Result<(), FeedError> {
        let found = self
            .db
            .with_conn(|conn| items::increment_counter(conn, item_id, Counter::Views, 1))?;
        if !found {
            return Err(FeedError::NotFound(format!("item {}", item_id)));
        }
        Ok(())
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub fn add_comment(&self, input: &CreateCommentInput) -> Result<Comment, FeedError> {
        let comment = self.db.with_transaction(|conn| comments::add_comment(conn, input))?;

        self.events.emit(FeedEvent::CommentAdded {
            id: comment.id,
            item_id: comment.item_id,
            user_id: comment.user_id,
        });
        Ok(comment)
    }

    /// Top-level comments, newest first, each with its replies
    pub fn list_comments(&self, item_id: i64, limit: i64, offset: i64) -> Result<Vec<CommentThread>, FeedError> {
        self.db.with_conn(|conn| {
            if !db::items::item_exists(conn, item_id)? {
                return Err(FeedError::NotFound(format!("item {}", item_id)));
            }
            comments::list_threads(conn, item_id, limit, offset)
        })
    }
}

fn ensure_owner(actor_id: i64, owner_id: i64, item_id: i64) -> Result<(), FeedError> {
    if actor_id != owner_id {
        return Err(FeedError::Unauthorized(format!(
            "user {} does not own item {}",
            actor_id, item_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::CacheConfig;
    use crate::db::items::test_support::item_input;

    fn service() -> ItemService {
        let db = Arc::new(FeedDb::open_in_memory().unwrap());
        let cache = FeedCache::new(Arc::new(MemoryCache::new()), &CacheConfig::default());
        ItemService::new(db, cache, Arc::new(EventBus::new()))
    }

    #[test]
    fn test_only_owner_may_edit_or_delete() {
        let svc = service();
        let item = svc.create(&item_input(1, "Mine", &["rust"], "2024-01-01T00:00:00Z")).unwrap();
        let id = item.item.id;

        let patch = ItemPatch { title: Some("Stolen".into()), ..Default::default() };
        assert!(matches!(svc.update(2, id, &patch), Err(FeedError::Unauthorized(_))));
        assert!(matches!(svc.delete(2, id), Err(FeedError::Unauthorized(_))));

        assert_eq!(svc.update(1, id, &patch).unwrap().item.title, "Stolen");
        svc.delete(1, id).unwrap();
        assert!(svc.get(id).unwrap().is_none());
        assert!(matches!(svc.delete(1, id), Err(FeedError::NotFound(_))));
    }

    #[test]
    fn test_list_by_owner_newest_first() {
        let svc = service();
        let old = svc.create(&item_input(7, "Old", &[], "2024-01-01T00:00:00Z")).unwrap().item.id;
        let new = svc.create(&item_input(7, "New", &[], "2024-02-01T00:00:00Z")).unwrap().item.id;
        svc.create(&item_input(8, "Other", &[], "2024-03-01T00:00:00Z")).unwrap();

        let ids: Vec<i64> = svc.list_by_owner(7, 10, 0).unwrap().iter().map(|i| i.item.id).collect();
        assert_eq!(ids, vec![new, old]);
        assert_eq!(svc.list_by_owner(7, 1, 1).unwrap()[0].item.id, old);
    }

    #[test]
    fn test_stats_are_cached() {
        let svc = service();
        let id = svc
            .create(&item_input(1, "Demo", &[], "2024-01-01T00:00:00Z"))
            .unwrap()
            .item
            .id;

        svc.increment_views(id).unwrap();
        let first = svc.stats(id).unwrap();
        assert_eq!(first.total_views, 1);
        assert_eq!(first.engagement_rate, 0.0);

        svc.increment_views(id).unwrap();
        assert_eq!(svc.stats(id).unwrap(), first);

        assert!(matches!(svc.stats(404), Err(FeedError::NotFound(_))));
        assert!(matches!(svc.increment_views(404), Err(FeedError::NotFound(_))));
    }

    #[test]
    fn test_create_validation() {
        let svc = service();
        assert!(matches!(
            svc.create(&item_input(1, "  ", &[], "2024-01-01T00:00:00Z")),
            Err(FeedError::Validation(_))
        ));
        assert!(matches!(
            svc.create(&item_input(0, "Title", &[], "2024-01-01T00:00:00Z")),
            Err(FeedError::Unauthenticated)
        ));
        assert!(matches!(svc.search(" ", 10, 0), Err(FeedError::Validation(_))));
    }

    #[test]
    fn test_comments_bump_counter() {
        let svc = service();
        let id = svc.create(&item_input(1, "Demo", &[], "2024-01-01T00:00:00Z")).unwrap().item.id;

        let root = svc
            .add_comment(&CreateCommentInput {
                item_id: id,
                user_id: 4,
                parent_id: None,
                content: "neat".into(),
            })
            .unwrap();
        svc.add_comment(&CreateCommentInput {
            item_id: id,
            user_id: 1,
            parent_id: Some(root.id),
            content: "thanks".into(),
        })
        .unwrap();

        let threads = svc.list_comments(id, 10, 0).unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies.len(), 1);
        assert_eq!(threads[0].replies[0].content, "thanks");
        assert_eq!(svc.get(id).unwrap().unwrap().item.comment_count, 2);
        assert!(matches!(svc.list_comments(404, 10, 0), Err(FeedError::NotFound(_))));
    }
}
