//! Directed follow graph

use diesel::prelude::*;
use diesel::sql_types::BigInt;

use super::diesel_schema::follows;
use super::models::{current_timestamp, Follow, NewFollow};
use super::users::{adjust_follow_counters, ensure_user};
use crate::error::{is_unique_violation, FeedError};

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Whether `follower_id` follows `followee_id`
pub fn is_following(
    conn: &mut SqliteConnection,
    follower_id: i64,
    followee_id: i64,
) -> Result<bool, FeedError> {
    let count: i64 = follows::table
        .filter(follows::follower_id.eq(follower_id))
        .filter(follows::followee_id.eq(followee_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Number of users both `a` and `b` follow
pub fn common_followee_count(conn: &mut SqliteConnection, a: i64, b: i64) -> Result<i64, FeedError> {
    let row: CountRow = diesel::sql_query(
        "SELECT COUNT(*) AS count FROM follows f1 \
         JOIN follows f2 ON f1.followee_id = f2.followee_id \
         WHERE f1.follower_id = ? AND f2.follower_id = ?",
    )
    .bind::<BigInt, _>(a)
    .bind::<BigInt, _>(b)
    .get_result(conn)
    .map_err(|e| FeedError::TransientStore(format!("Common followee query failed: {}", e)))?;
    Ok(row.count)
}

/// Insert a follow edge and bump both counters
///
/// Unknown user ids are provisioned on the way. Must run inside a transaction.
pub fn create_follow(
    conn: &mut SqliteConnection,
    follower_id: i64,
    followee_id: i64,
) -> Result<Follow, FeedError> {
    if follower_id == followee_id {
        return Err(FeedError::Validation("users cannot follow themselves".into()));
    }
    ensure_user(conn, follower_id)?;
    ensure_user(conn, followee_id)?;

    let now = current_timestamp();
    diesel::insert_into(follows::table)
        .values(&NewFollow { follower_id, followee_id, created_at: &now })
        .execute(conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                FeedError::AlreadyFollowing { follower_id, followee_id }
            } else {
                FeedError::TransientStore(format!("Insert failed: {}", e))
            }
        })?;

    adjust_follow_counters(conn, follower_id, followee_id, 1)?;

    Ok(Follow {
        follower_id,
        followee_id,
        created_at: now,
    })
}

/// Remove a follow edge and decrement both counters
///
/// Must run inside a transaction.
pub fn delete_follow(
    conn: &mut SqliteConnection,
    follower_id: i64,
    followee_id: i64,
) -> Result<(), FeedError> {
    let deleted = diesel::delete(
        follows::table
            .filter(follows::follower_id.eq(follower_id))
            .filter(follows::followee_id.eq(followee_id)),
    )
    .execute(conn)?;

    if deleted == 0 {
        return Err(FeedError::NotFollowing { follower_id, followee_id });
    }

    adjust_follow_counters(conn, follower_id, followee_id, -1)
}

/// IDs the user follows
pub fn list_following(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<i64>, FeedError> {
    Ok(follows::table
        .filter(follows::follower_id.eq(user_id))
        .order(follows::followee_id.asc())
        .select(follows::followee_id)
        .load(conn)?)
}

/// IDs following the user
pub fn list_followers(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<i64>, FeedError> {
    Ok(follows::table
        .filter(follows::followee_id.eq(user_id))
        .order(follows::follower_id.asc())
        .select(follows::follower_id)
        .load(conn)?)
}
