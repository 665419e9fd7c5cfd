//! DevSwipe Feed - personalized swipe feed engine
//!
//! Serves ranked pages of content items, records swipes in an interaction
//! ledger, and keeps per-item engagement counters consistent under
//! concurrent writes.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (http.rs)
//!   └─► Services (services/)
//!         ├─► FeedCache (cache/)       TTL-bounded pages and stats
//!         ├─► recommend/              affinity → candidates → scoring → ranking
//!         └─► FeedDb (db/)            SQLite via Diesel + r2d2
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/devswipe-feed/
//! ├── feed.db        # SQLite database (WAL)
//! └── config.toml    # Configuration
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod recommend;
pub mod services;

pub use cache::{CacheStore, DisabledCache, FeedCache, MemoryCache};
pub use config::Config;
pub use db::FeedDb;
pub use error::FeedError;
pub use http::HttpServer;
pub use recommend::ScoringWeights;
pub use services::{FeedPage, FeedRequest, Services};
