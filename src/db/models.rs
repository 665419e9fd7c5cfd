//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! TypeScript types for API payloads are generated via ts-rs. Run:
//!   cargo test export_bindings
//! Generated files go to: bindings/

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;
use crate::error::FeedError;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format a UTC instant the way timestamps are stored
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of reaction a user records against an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "feed/")]
pub enum InteractionType {
    Like,
    Dislike,
    SuperLike,
    Skip,
    Bookmark,
}

/// Item counter touched by an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Views,
    Likes,
    Dislikes,
    SuperLikes,
    Skips,
    Comments,
}

impl InteractionType {
    pub const ALL: [InteractionType; 5] = [
        InteractionType::Like,
        InteractionType::Dislike,
        InteractionType::SuperLike,
        InteractionType::Skip,
        InteractionType::Bookmark,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Like => "like",
            InteractionType::Dislike => "dislike",
            InteractionType::SuperLike => "super_like",
            InteractionType::Skip => "skip",
            InteractionType::Bookmark => "bookmark",
        }
    }

    /// Positive signals feed the preference model
    pub fn is_positive(&self) -> bool {
        matches!(self, InteractionType::Like | InteractionType::SuperLike)
    }

    /// Counter incremented when this interaction is recorded (bookmarks have none)
    pub fn counter(&self) -> Option<Counter> {
        match self {
            InteractionType::Like => Some(Counter::Likes),
            InteractionType::Dislike => Some(Counter::Dislikes),
            InteractionType::SuperLike => Some(Counter::SuperLikes),
            InteractionType::Skip => Some(Counter::Skips),
            InteractionType::Bookmark => None,
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InteractionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                FeedError::Validation(format!(
                    "interaction type '{}' is not valid. Valid types: like, dislike, super_like, skip, bookmark",
                    s
                ))
            })
    }
}

/// Structured reason attached to a negative swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "feed/")]
pub enum FeedbackCode {
    NotInterested,
    UnclearProblem,
    EasyTech,
    ExistingProducts,
    PoorDemo,
}

impl FeedbackCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCode::NotInterested => "not_interested",
            FeedbackCode::UnclearProblem => "unclear_problem",
            FeedbackCode::EasyTech => "easy_tech",
            FeedbackCode::ExistingProducts => "existing_products",
            FeedbackCode::PoorDemo => "poor_demo",
        }
    }
}

impl FromStr for FeedbackCode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            FeedbackCode::NotInterested,
            FeedbackCode::UnclearProblem,
            FeedbackCode::EasyTech,
            FeedbackCode::ExistingProducts,
            FeedbackCode::PoorDemo,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
        .ok_or_else(|| FeedError::Validation(format!("feedback code '{}' is not valid", s)))
    }
}

/// Tag category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "feed/")]
pub enum TagCategory {
    #[default]
    Technology,
    Domain,
    Function,
    Stage,
    Event,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Technology => "technology",
            TagCategory::Domain => "domain",
            TagCategory::Function => "function",
            TagCategory::Stage => "stage",
            TagCategory::Event => "event",
        }
    }

    /// Lenient parse for stored rows; unknown values fall back to technology
    pub fn from_stored(s: &str) -> Self {
        match s {
            "domain" => TagCategory::Domain,
            "function" => TagCategory::Function,
            "stage" => TagCategory::Stage,
            "event" => TagCategory::Event,
            _ => TagCategory::Technology,
        }
    }
}

// ============================================================================
// User Models
// ============================================================================

/// User row; only the follow counters are maintained here
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "feed/")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: String,
}

/// New user for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub created_at: &'a str,
}

/// Placeholder row for a user id first seen through the follow graph
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct ProvisionedUser<'a> {
    pub id: i64,
    pub username: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Item Models
// ============================================================================

/// Item row from SELECT query
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "feed/")]
pub struct Item {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub is_public: bool,
    pub view_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub super_like_count: i64,
    pub skip_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Tag attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub category: TagCategory,
}

/// Item with tags attached (API response)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct ItemWithTags {
    #[serde(flatten)]
    pub item: Item,
    pub tags: Vec<Tag>,
}

impl ItemWithTags {
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }
}

/// New item for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = items)]
pub struct NewItem<'a> {
    pub owner_id: i64,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub status: &'a str,
    pub is_public: bool,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Item tag row
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = item_tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ItemTagRow {
    pub item_id: i64,
    pub tag: String,
    pub category: String,
}

impl From<ItemTagRow> for Tag {
    fn from(row: ItemTagRow) -> Self {
        Tag {
            name: row.tag,
            category: TagCategory::from_stored(&row.category),
        }
    }
}

/// New item tag for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = item_tags)]
pub struct NewItemTag<'a> {
    pub item_id: i64,
    pub tag: &'a str,
    pub category: &'a str,
}

// ============================================================================
// Interaction Models
// ============================================================================

/// Interaction row; immutable once written
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = interactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "feed/")]
pub struct Interaction {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub interaction_type: String,
    pub structured_feedback: Option<String>,
    pub session_id: Option<String>,
    pub view_duration: Option<f64>,
    pub created_at: String,
}

/// New interaction for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = interactions)]
pub struct NewInteraction<'a> {
    pub user_id: i64,
    pub item_id: i64,
    pub interaction_type: &'a str,
    pub structured_feedback: Option<&'a str>,
    pub session_id: Option<&'a str>,
    pub view_duration: Option<f64>,
    pub created_at: &'a str,
}

// ============================================================================
// Follow Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = follows)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "feed/")]
pub struct Follow {
    pub follower_id: i64,
    pub followee_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = follows)]
pub struct NewFollow<'a> {
    pub follower_id: i64,
    pub followee_id: i64,
    pub created_at: &'a str,
}

// ============================================================================
// Comment Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "feed/")]
pub struct Comment {
    pub id: i64,
    pub item_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: String,
}

/// Top-level comment with its direct replies
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "feed/")]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment<'a> {
    pub item_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: &'a str,
    pub created_at: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_type_parse() {
        assert_eq!("super_like".parse::<InteractionType>().unwrap(), InteractionType::SuperLike);
        assert!(matches!("love".parse::<InteractionType>(), Err(FeedError::Validation(_))));
    }

    #[test]
    fn test_bookmark_has_no_counter() {
        assert_eq!(InteractionType::Bookmark.counter(), None);
        assert_eq!(InteractionType::Skip.counter(), Some(Counter::Skips));
        assert!(InteractionType::SuperLike.is_positive());
        assert!(!InteractionType::Bookmark.is_positive());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let stored = "2024-03-01T12:30:00Z";
        let parsed = parse_timestamp(stored).unwrap();
        assert_eq!(format_timestamp(parsed), stored);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_interaction_type_serde_matches_storage() {
        let json = serde_json::to_string(&InteractionType::SuperLike).unwrap();
        assert_eq!(json, "\"super_like\"");
    }
}
