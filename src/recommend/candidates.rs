//! Candidate retrieval
//!
//! Personalized retrieval drops every item the user has already acted on
//! (any interaction type). Tag browsing does not; it is a plain listing.

use diesel::prelude::*;
use tracing::debug;

use crate::db::diesel_schema::{interactions, item_tags, items};
use crate::db::items::attach_tags;
use crate::db::{Item, ItemWithTags};
use crate::error::FeedError;

/// Public items the user has not interacted with, newest first
pub fn get_candidates(
    conn: &mut SqliteConnection,
    user_id: Option<i64>,
    window: i64,
) -> Result<Vec<ItemWithTags>, FeedError> {
    let rows: Vec<Item> = match user_id {
        Some(uid) => items::table
            .filter(items::is_public.eq(true))
            .filter(
                items::id.ne_all(
                    interactions::table
                        .filter(interactions::user_id.eq(uid))
                        .select(interactions::item_id),
                ),
            )
            .order((items::created_at.desc(), items::id.desc()))
            .limit(window)
            .select(Item::as_select())
            .load(conn)?,
        None => items::table
            .filter(items::is_public.eq(true))
            .order((items::created_at.desc(), items::id.desc()))
            .limit(window)
            .select(Item::as_select())
            .load(conn)?,
    };

    debug!(user_id = ?user_id, count = rows.len(), window = window, "Retrieved candidates");
    attach_tags(conn, rows)
}

/// Public items carrying at least one of `tags`, newest first
pub fn get_candidates_by_tags(
    conn: &mut SqliteConnection,
    tags: &[String],
    limit: i64,
    offset: i64,
) -> Result<Vec<ItemWithTags>, FeedError> {
    if tags.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<Item> = items::table
        .filter(items::is_public.eq(true))
        .filter(
            items::id.eq_any(
                item_tags::table
                    .filter(item_tags::tag.eq_any(tags))
                    .select(item_tags::item_id),
            ),
        )
        .order((items::created_at.desc(), items::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Item::as_select())
        .load(conn)?;

    attach_tags(conn, rows)
}
