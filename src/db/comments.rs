//! Comments on items
//!
//! Adding a comment bumps `items.comment_count`, which feeds the
//! engagement rate.

use std::collections::HashMap;

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::comments;
use super::items::{increment_counter, item_exists};
use super::models::{current_timestamp, Comment, CommentThread, Counter, NewComment};
use crate::error::FeedError;

diesel::define_sql_function! {
    fn last_insert_rowid() -> diesel::sql_types::BigInt;
}

/// Input for adding a comment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    #[serde(default)]
    pub item_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub content: String,
}

/// Insert a comment and bump the item's comment counter
///
/// Must run inside a transaction.
pub fn add_comment(conn: &mut SqliteConnection, input: &CreateCommentInput) -> Result<Comment, FeedError> {
    let content = input.content.trim();
    if content.is_empty() {
        return Err(FeedError::Validation("comment content is required".into()));
    }
    if !item_exists(conn, input.item_id)? {
        return Err(FeedError::NotFound(format!("item {}", input.item_id)));
    }

    if let Some(parent_id) = input.parent_id {
        let parent = get_comment(conn, parent_id)?
            .ok_or_else(|| FeedError::NotFound(format!("parent comment {}", parent_id)))?;
        if parent.item_id != input.item_id {
            return Err(FeedError::Validation(format!(
                "parent comment {} belongs to another item",
                parent_id
            )));
        }
    }

    let now = current_timestamp();
    diesel::insert_into(comments::table)
        .values(&NewComment {
            item_id: input.item_id,
            user_id: input.user_id,
            parent_id: input.parent_id,
            content,
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| FeedError::TransientStore(format!("Insert failed: {}", e)))?;

    let id: i64 = diesel::select(last_insert_rowid()).get_result(conn)?;
    increment_counter(conn, input.item_id, Counter::Comments, 1)?;

    get_comment(conn, id)?.ok_or_else(|| FeedError::Internal("Failed to retrieve created comment".into()))
}

/// Get comment by ID
pub fn get_comment(conn: &mut SqliteConnection, comment_id: i64) -> Result<Option<Comment>, FeedError> {
    Ok(comments::table
        .find(comment_id)
        .select(Comment::as_select())
        .first(conn)
        .optional()?)
}

/// Top-level comments on an item, newest first
pub fn list_comments(
    conn: &mut SqliteConnection,
    item_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Comment>, FeedError> {
    Ok(comments::table
        .filter(comments::item_id.eq(item_id))
        .filter(comments::parent_id.is_null())
        .order((comments::created_at.desc(), comments::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Comment::as_select())
        .load(conn)?)
}

/// Replies to any of `parent_ids`, grouped by parent, oldest first
pub fn list_replies(
    conn: &mut SqliteConnection,
    parent_ids: &[i64],
) -> Result<HashMap<i64, Vec<Comment>>, FeedError> {
    if parent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Comment> = comments::table
        .filter(comments::parent_id.eq_any(parent_ids))
        .order((comments::created_at.asc(), comments::id.asc()))
        .select(Comment::as_select())
        .load(conn)?;

    let mut by_parent: HashMap<i64, Vec<Comment>> = HashMap::new();
    for reply in rows {
        if let Some(parent_id) = reply.parent_id {
            by_parent.entry(parent_id).or_default().push(reply);
        }
    }
    Ok(by_parent)
}

/// A page of top-level comments with their direct replies attached
pub fn list_threads(
    conn: &mut SqliteConnection,
    item_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<CommentThread>, FeedError> {
    let roots = list_comments(conn, item_id, limit, offset)?;
    let ids: Vec<i64> = roots.iter().map(|c| c.id).collect();
    let mut replies = list_replies(conn, &ids)?;

    Ok(roots
        .into_iter()
        .map(|comment| CommentThread {
            replies: replies.remove(&comment.id).unwrap_or_default(),
            comment,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::items::{create_item, require_item, test_support::item_input};
    use crate::db::FeedDb;

    fn comment(item_id: i64, parent_id: Option<i64>, content: &str) -> CreateCommentInput {
        CreateCommentInput {
            item_id,
            user_id: 3,
            parent_id,
            content: content.into(),
        }
    }

    #[test]
    fn test_comments_and_replies() {
        let db = FeedDb::open_in_memory().unwrap();
        let item_id = db
            .with_conn(|conn| create_item(conn, &item_input(1, "Demo", &[], "2024-01-01T00:00:00Z")))
            .unwrap()
            .item
            .id;

        let root = db.with_transaction(|conn| add_comment(conn, &comment(item_id, None, "nice"))).unwrap();
        let reply = db
            .with_transaction(|conn| add_comment(conn, &comment(item_id, Some(root.id), "thanks")))
            .unwrap();
        assert_eq!(reply.parent_id, Some(root.id));

        db.with_conn(|conn| {
            let top = list_comments(conn, item_id, 10, 0)?;
            assert_eq!(top.len(), 1);

            let threads = list_threads(conn, item_id, 10, 0)?;
            assert_eq!(threads.len(), 1);
            assert_eq!(threads[0].comment.id, root.id);
            let reply_ids: Vec<i64> = threads[0].replies.iter().map(|c| c.id).collect();
            assert_eq!(reply_ids, vec![reply.id]);

            assert!(list_replies(conn, &[])?.is_empty());
            assert_eq!(require_item(conn, item_id)?.comment_count, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_comment_validation() {
        let db = FeedDb::open_in_memory().unwrap();
        let (a, b) = db
            .with_conn(|conn| {
                Ok((
                    create_item(conn, &item_input(1, "A", &[], "2024-01-01T00:00:00Z"))?.item.id,
                    create_item(conn, &item_input(1, "B", &[], "2024-01-01T00:00:00Z"))?.item.id,
                ))
            })
            .unwrap();

        let missing_item = db.with_transaction(|conn| add_comment(conn, &comment(999, None, "hi")));
        assert!(matches!(missing_item, Err(FeedError::NotFound(_))));

        let missing_parent = db.with_transaction(|conn| add_comment(conn, &comment(a, Some(42), "hi")));
        assert!(matches!(missing_parent, Err(FeedError::NotFound(_))));

        let root = db.with_transaction(|conn| add_comment(conn, &comment(a, None, "root"))).unwrap();
        let cross = db.with_transaction(|conn| add_comment(conn, &comment(b, Some(root.id), "hi")));
        assert!(matches!(cross, Err(FeedError::Validation(_))));

        let empty = db.with_transaction(|conn| add_comment(conn, &comment(a, None, "   ")));
        assert!(matches!(empty, Err(FeedError::Validation(_))));
    }
}
