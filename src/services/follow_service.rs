//! Follow service - follow graph edges and their counters

use std::sync::Arc;

use tracing::info;

use crate::db::{follows, users, FeedDb, Follow, User};
use crate::error::FeedError;

use super::events::{EventBus, FeedEvent};

pub struct FollowService {
    db: Arc<FeedDb>,
    events: Arc<EventBus>,
}

impl FollowService {
    pub fn new(db: Arc<FeedDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Follow `followee_id`; edge and both counters commit together
    pub fn follow(&self, follower_id: i64, followee_id: i64) -> Result<Follow, FeedError> {
        let edge = self
            .db
            .with_transaction(|conn| follows::create_follow(conn, follower_id, followee_id))?;

        info!(follower = follower_id, followee = followee_id, "User followed");
        self.events.emit(FeedEvent::UserFollowed { follower_id, followee_id });
        Ok(edge)
    }

    pub fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<(), FeedError> {
        self.db
            .with_transaction(|conn| follows::delete_follow(conn, follower_id, followee_id))?;

        info!(follower = follower_id, followee = followee_id, "User unfollowed");
        self.events.emit(FeedEvent::UserUnfollowed { follower_id, followee_id });
        Ok(())
    }

    pub fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool, FeedError> {
        self.db
            .with_conn(|conn| follows::is_following(conn, follower_id, followee_id))
    }

    pub fn followers(&self, user_id: i64) -> Result<Vec<i64>, FeedError> {
        self.db.with_conn(|conn| follows::list_followers(conn, user_id))
    }

    pub fn following(&self, user_id: i64) -> Result<Vec<i64>, FeedError> {
        self.db.with_conn(|conn| follows::list_following(conn, user_id))
    }

    pub fn create_user(&self, username: &str) -> Result<User, FeedError> {
        self.db.with_conn(|conn| users::create_user(conn, username))
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>, FeedError> {
        self.db.with_conn(|conn| users::get_user(conn, user_id))
    }
}
