//! User rows and follow counters

use diesel::prelude::*;

use super::diesel_schema::users;
use super::models::{current_timestamp, NewUser, ProvisionedUser, User};
use crate::error::{is_unique_violation, FeedError};

/// Prefix reserved for placeholder usernames
const PROVISIONED_PREFIX: char = '#';

/// Create a user
pub fn create_user(conn: &mut SqliteConnection, username: &str) -> Result<User, FeedError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(FeedError::Validation("username is required".into()));
    }
    if username.starts_with(PROVISIONED_PREFIX) {
        return Err(FeedError::Validation(format!(
            "usernames cannot start with '{}'",
            PROVISIONED_PREFIX
        )));
    }

    let now = current_timestamp();
    diesel::insert_into(users::table)
        .values(&NewUser { username, created_at: &now })
        .execute(conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                FeedError::Validation(format!("username '{}' is taken", username))
            } else {
                FeedError::TransientStore(format!("Insert failed: {}", e))
            }
        })?;

    users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .map_err(FeedError::from)
}

/// Get user by ID
pub fn get_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<User>, FeedError> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(FeedError::from)
}

/// Get user by ID, failing with NotFound
#[cfg(test)]
pub fn require_user(conn: &mut SqliteConnection, user_id: i64) -> Result<User, FeedError> {
    get_user(conn, user_id)?.ok_or_else(|| FeedError::NotFound(format!("user {}", user_id)))
}

/// Make sure a row exists for `user_id`
///
/// Identities are issued upstream, so the follow graph may be the first
/// place an id shows up. Missing rows get a `#<id>` placeholder username.
pub fn ensure_user(conn: &mut SqliteConnection, user_id: i64) -> Result<(), FeedError> {
    if user_id <= 0 {
        return Err(FeedError::Validation(format!("invalid user id {}", user_id)));
    }
    let username = format!("{}{}", PROVISIONED_PREFIX, user_id);
    let now = current_timestamp();
    diesel::insert_or_ignore_into(users::table)
        .values(&ProvisionedUser { id: user_id, username: &username, created_at: &now })
        .execute(conn)
        .map_err(|e| FeedError::TransientStore(format!("User provisioning failed: {}", e)))?;
    Ok(())
}

/// Adjust both follow counters for one edge
pub(crate) fn adjust_follow_counters(
    conn: &mut SqliteConnection,
    follower_id: i64,
    followee_id: i64,
    delta: i64,
) -> Result<(), FeedError> {
    diesel::update(users::table.find(follower_id))
        .set(users::following_count.eq(users::following_count + delta))
        .execute(conn)?;
    diesel::update(users::table.find(followee_id))
        .set(users::follower_count.eq(users::follower_count + delta))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::FeedDb;

    #[test]
    fn test_create_and_get_user() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let ada = create_user(conn, "ada")?;
            assert_eq!(ada.follower_count, 0);
            assert_eq!(get_user(conn, ada.id)?.unwrap().username, "ada");
            assert!(get_user(conn, 9999)?.is_none());
            assert!(matches!(require_user(conn, 9999), Err(FeedError::NotFound(_))));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_user(conn, "ada")?;
            assert!(matches!(create_user(conn, "ada"), Err(FeedError::Validation(_))));
            assert!(matches!(create_user(conn, "  "), Err(FeedError::Validation(_))));
            assert!(matches!(create_user(conn, "#7"), Err(FeedError::Validation(_))));
            Ok(())
        })
        .unwrap();
    }
}
