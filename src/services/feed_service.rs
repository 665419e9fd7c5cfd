//! Feed service - the recommendation request path
//!
//! ```text
//! CHECK_CACHE ─hit─► RETURN
//!      │
//!     miss
//!      ▼
//! BUILD_AFFINITY ─► RETRIEVE_CANDIDATES ─► SCORE ─► RANK ─► STORE_CACHE ─► RETURN
//! ```
//!
//! A tag-filtered request skips affinity and scoring and pages the tag
//! listing by recency. The path never writes to the database; a cancelled
//! request returns [`FeedError::Cancelled`] and leaves the cache untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ts_rs::TS;

use crate::cache::FeedCache;
use crate::config::FeedConfig;
use crate::db::FeedDb;
use crate::error::FeedError;
use crate::recommend::{
    build_affinity, get_candidates, get_candidates_by_tags, rank_page, score_candidates, AffinityVector,
    ScoringWeights,
};

use super::events::{EventBus, FeedEvent};

/// Feed request parameters
#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    /// None for anonymous visitors
    pub user_id: Option<i64>,
    /// 1-based
    pub page: i64,
    /// None uses the configured default
    pub limit: Option<i64>,
    pub tags: Vec<String>,
}

/// One page of recommended item ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct FeedPage {
    pub item_ids: Vec<i64>,
    pub has_more: bool,
}

/// Feed service
pub struct FeedService {
    db: Arc<FeedDb>,
    cache: FeedCache,
    events: Arc<EventBus>,
    config: FeedConfig,
    weights: ScoringWeights,
}

impl FeedService {
    pub fn new(
        db: Arc<FeedDb>,
        cache: FeedCache,
        events: Arc<EventBus>,
        config: FeedConfig,
        weights: ScoringWeights,
    ) -> Self {
        Self { db, cache, events, config, weights }
    }

    /// Recommend a page of items
    pub fn recommend(&self, request: &FeedRequest, cancel: &CancellationToken) -> Result<FeedPage, FeedError> {
        self.recommend_at(request, Utc::now(), cancel)
    }

    /// Recommend a page as of `now`
    pub fn recommend_at(
        &self,
        request: &FeedRequest,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FeedError> {
        let page = request.page.max(1);
        let limit = self.page_size(request.limit);
        let tags = normalize_tags(&request.tags);

        let key = self.cache.feed_key(request.user_id, page, limit, &tags);
        if let Some(cached) = self.cache.get::<FeedPage>(&key) {
            self.events.emit(FeedEvent::FeedServed {
                user_id: request.user_id,
                count: cached.item_ids.len(),
                cache_hit: true,
            });
            return Ok(cached);
        }

        check(cancel)?;

        let result = if tags.is_empty() {
            self.build_ranked_page(request.user_id, page, limit, now, cancel)?
        } else {
            self.build_tag_page(&tags, page, limit)?
        };

        // A page computed after cancellation is discarded, not cached
        check(cancel)?;
        self.cache.put(&key, &result, self.cache.feed_ttl());

        info!(
            user_id = ?request.user_id,
            page = page,
            limit = limit,
            count = result.item_ids.len(),
            has_more = result.has_more,
            "Feed computed"
        );
        self.events.emit(FeedEvent::FeedServed {
            user_id: request.user_id,
            count: result.item_ids.len(),
            cache_hit: false,
        });

        Ok(result)
    }

    fn build_ranked_page(
        &self,
        user_id: Option<i64>,
        page: i64,
        limit: i64,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FeedError> {
        self.db.with_conn(|conn| {
            let affinity = match user_id {
                Some(uid) => build_affinity(conn, uid)?,
                None => AffinityVector::empty(),
            };
            check(cancel)?;

            let candidates = get_candidates(conn, user_id, self.config.retrieval_window)?;
            check(cancel)?;

            let scores = score_candidates(conn, user_id, &candidates, &affinity, &self.weights, now, cancel)?;
            check(cancel)?;

            let ranked = rank_page(scores, page as usize, limit as usize);
            debug!(
                candidates = candidates.len(),
                affinity_tags = affinity.len(),
                "Ranked feed page"
            );

            Ok(FeedPage {
                item_ids: ranked.item_ids,
                has_more: ranked.has_more,
            })
        })
    }

    fn build_tag_page(&self, tags: &[String], page: i64, limit: i64) -> Result<FeedPage, FeedError> {
        let offset = (page - 1).saturating_mul(limit);

        // One extra row tells us whether another page exists
        let mut items = self
            .db
            .with_conn(|conn| get_candidates_by_tags(conn, tags, limit + 1, offset))?;

        let has_more = items.len() as i64 > limit;
        items.truncate(limit as usize);

        Ok(FeedPage {
            item_ids: items.iter().map(|i| i.item.id).collect(),
            has_more,
        })
    }

    fn page_size(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(n) if n > 0 => n.min(self.config.max_page_size),
            _ => self.config.default_page_size,
        }
    }
}

fn check(cancel: &CancellationToken) -> Result<(), FeedError> {
    if cancel.is_cancelled() {
        return Err(FeedError::Cancelled);
    }
    Ok(())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::feed_cache::test_support::FailingCache;
    use crate::cache::{CacheStore, MemoryCache};
    use crate::config::CacheConfig;
    use crate::db::interactions::{record_interaction, RecordInteractionInput};
    use crate::db::items::{create_item, test_support::item_input};
    use crate::db::models::parse_timestamp;
    use crate::db::InteractionType;

    fn service(store: Arc<dyn CacheStore>) -> (Arc<FeedDb>, FeedService) {
        let db = Arc::new(FeedDb::open_in_memory().unwrap());
        let cache = FeedCache::new(store, &CacheConfig::default());
        let svc = FeedService::new(
            db.clone(),
            cache,
            Arc::new(EventBus::new()),
            FeedConfig::default(),
            ScoringWeights::default(),
        );
        (db, svc)
    }

    fn now() -> DateTime<Utc> {
        parse_timestamp("2024-03-01T00:00:00Z").unwrap()
    }

    fn seed(db: &FeedDb, n: usize) -> Vec<i64> {
        db.with_conn(|conn| {
            (0..n)
                .map(|i| {
                    let ts = format!("2024-02-{:02}T00:00:00Z", i + 1);
                    create_item(conn, &item_input(100, &format!("item {}", i), &["rust"], &ts)).map(|c| c.item.id)
                })
                .collect()
        })
        .unwrap()
    }

    #[test]
    fn test_cold_start_returns_newest_first() {
        let (db, svc) = service(Arc::new(MemoryCache::new()));
        let ids = seed(&db, 8);

        let req = FeedRequest { user_id: Some(1), page: 1, limit: None, tags: vec![] };
        let page = svc.recommend_at(&req, now(), &CancellationToken::new()).unwrap();

        let expected: Vec<i64> = ids.iter().rev().take(6).copied().collect();
        assert_eq!(page.item_ids, expected);
        assert!(page.has_more);
    }

    #[test]
    fn test_cached_page_survives_new_interactions() {
        let (db, svc) = service(Arc::new(MemoryCache::new()));
        let ids = seed(&db, 3);
        let req = FeedRequest { user_id: Some(1), page: 1, limit: Some(3), tags: vec![] };

        let first = svc.recommend_at(&req, now(), &CancellationToken::new()).unwrap();
        db.with_transaction(|conn| {
            record_interaction(conn, &RecordInteractionInput::new(1, ids[0], InteractionType::Skip))
        })
        .unwrap();
        let second = svc.recommend_at(&req, now(), &CancellationToken::new()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_failing_cache_still_serves() {
        let (db, svc) = service(Arc::new(FailingCache::default()));
        let ids = seed(&db, 2);

        let req = FeedRequest { user_id: None, page: 1, limit: Some(5), tags: vec![] };
        let page = svc.recommend_at(&req, now(), &CancellationToken::new()).unwrap();
        assert_eq!(page.item_ids, vec![ids[1], ids[0]]);
        assert!(!page.has_more);
    }

    #[test]
    fn test_cancelled_request_is_not_cached() {
        let store = Arc::new(MemoryCache::new());
        let (db, svc) = service(store.clone());
        seed(&db, 2);

        let token = CancellationToken::new();
        token.cancel();
        let req = FeedRequest { user_id: Some(1), page: 1, limit: None, tags: vec![] };

        assert!(matches!(svc.recommend_at(&req, now(), &token), Err(FeedError::Cancelled)));
        assert_eq!(store.stats().entry_count, 0);
    }

    #[test]
    fn test_tag_page_offsets() {
        let (db, svc) = service(Arc::new(MemoryCache::new()));
        let ids = seed(&db, 5);

        let req = FeedRequest {
            user_id: Some(1),
            page: 2,
            limit: Some(2),
            tags: vec!["rust".into(), " ".into()],
        };
        let page = svc.recommend_at(&req, now(), &CancellationToken::new()).unwrap();
        assert_eq!(page.item_ids, vec![ids[2], ids[1]]);
        assert!(page.has_more);
    }

    #[test]
    fn test_page_size_clamped() {
        let (_, svc) = service(Arc::new(MemoryCache::new()));
        assert_eq!(svc.page_size(None), 6);
        assert_eq!(svc.page_size(Some(0)), 6);
        assert_eq!(svc.page_size(Some(500)), 50);
        assert_eq!(svc.page_size(Some(10)), 10);
    }
}
