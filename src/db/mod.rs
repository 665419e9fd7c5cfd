//! SQLite database module for the feed engine
//!
//! ## Tables
//!
//! - `items` - Content items with their engagement counters
//! - `item_tags` - Tag index for affinity and tag browsing
//! - `interactions` - Append-only interaction ledger
//! - `follows` - Directed follow edges
//! - `users` - Follower/following counters
//! - `comments` - Comment ledger (drives `items.comment_count`)
//!
//! Every operation checks a connection out of an r2d2 pool. Writes that must
//! be all-or-nothing run through [`FeedDb::with_transaction`], which opens an
//! IMMEDIATE transaction so concurrent writers queue on SQLite's write lock
//! instead of failing mid-transaction.

pub mod diesel_schema;
pub mod schema;
pub mod models;
pub mod items;
pub mod interactions;
pub mod follows;
pub mod users;
pub mod comments;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::FeedError;
use diesel_schema::{follows as follows_table, interactions as interactions_table, items as items_table, users as users_table};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied when the pool opens a connection
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)?;
        if self.wal {
            conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
                .map_err(diesel::r2d2::Error::QueryError)?;
        }
        Ok(())
    }
}

/// SQLite database for items, interactions and the follow graph
pub struct FeedDb {
    pool: DbPool,
}

impl FeedDb {
    /// Open or create the feed database at the given path
    pub fn open(db_path: &Path, pool_size: u32) -> Result<Self, FeedError> {
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(SqlitePragmas { wal: true }))
            .build(manager)
            .map_err(|e| FeedError::TransientStore(format!("Failed to open SQLite: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Each SQLite `:memory:` connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub fn open_in_memory() -> Result<Self, FeedError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(SqlitePragmas { wal: false }))
            .build(manager)
            .map_err(|e| FeedError::TransientStore(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), FeedError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, FeedError> {
        Ok(self.pool.get()?)
    }

    /// Run a read (or single-statement write) on a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, FeedError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, FeedError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Run `f` inside an IMMEDIATE transaction; any error rolls everything back
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, FeedError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, FeedError>,
    {
        let mut conn = self.conn()?;
        conn.immediate_transaction(f)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, FeedError> {
        self.with_conn(|conn| {
            let item_count: i64 = items_table::table.count().get_result(conn)?;
            let user_count: i64 = users_table::table.count().get_result(conn)?;
            let interaction_count: i64 = interactions_table::table.count().get_result(conn)?;
            let follow_count: i64 = follows_table::table.count().get_result(conn)?;

            Ok(DbStats {
                item_count: item_count as u64,
                user_count: user_count as u64,
                interaction_count: interaction_count as u64,
                follow_count: follow_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub item_count: u64,
    pub user_count: u64,
    pub interaction_count: u64,
    pub follow_count: u64,
}

// Re-exports
pub use models::{
    Comment, CommentThread, Counter, FeedbackCode, Follow, Interaction, InteractionType, Item, ItemWithTags, Tag,
    TagCategory, User,
};
pub use items::{CreateItemInput, ItemPatch, TagInput};
pub use interactions::RecordInteractionInput;
pub use comments::CreateCommentInput;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_stats_start_empty() {
        let db = FeedDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.interaction_count, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = FeedDb::open_in_memory().unwrap();

        let result: Result<(), FeedError> = db.with_transaction(|conn| {
            users::create_user(conn, "ada")?;
            Err(FeedError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.stats().unwrap().user_count, 0);
    }

    #[test]
    fn test_file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");

        {
            let db = FeedDb::open(&path, 2).unwrap();
            db.with_conn(|conn| users::create_user(conn, "ada").map(|_| ())).unwrap();
        }

        let db = FeedDb::open(&path, 2).unwrap();
        assert_eq!(db.stats().unwrap().user_count, 1);
    }
}
