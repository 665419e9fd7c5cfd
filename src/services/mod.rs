//! Service layer for devswipe-feed
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, transaction boundaries and event emission.
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic, cache)
//!     ↓
//! Repository Layer (db/*.rs) + recommend/
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod feed_service;
pub mod follow_service;
pub mod interaction_service;
pub mod item_service;
pub mod response;

pub use events::{EventBus, EventListener, FeedEvent};
pub use feed_service::{FeedPage, FeedRequest, FeedService};
pub use follow_service::FollowService;
pub use interaction_service::InteractionService;
pub use item_service::{ItemService, ItemStats};

use std::sync::Arc;

use crate::cache::{CacheStore, FeedCache};
use crate::config::Config;
use crate::db::FeedDb;

/// Service container handed to the HTTP server
pub struct Services {
    pub db: Arc<FeedDb>,
    pub feed: Arc<FeedService>,
    pub interactions: Arc<InteractionService>,
    pub items: Arc<ItemService>,
    pub follows: Arc<FollowService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Wire every service onto one database handle and one cache backend
    pub fn new(db: Arc<FeedDb>, cache: Arc<dyn CacheStore>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());
        let cache = FeedCache::new(cache, &config.cache);

        Self {
            feed: Arc::new(FeedService::new(
                db.clone(),
                cache.clone(),
                events.clone(),
                config.feed.clone(),
                config.scoring.clone(),
            )),
            interactions: Arc::new(InteractionService::new(db.clone(), events.clone())),
            items: Arc::new(ItemService::new(db.clone(), cache, events.clone())),
            follows: Arc::new(FollowService::new(db.clone(), events.clone())),
            events,
            db,
        }
    }
}
