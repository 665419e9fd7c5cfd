//! Item CRUD operations using Diesel
//!
//! Items carry their own engagement counters. Counters only move through
//! `col = col + N` updates issued here, never read-modify-write.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::{item_tags, items};
use super::models::{
    current_timestamp, format_timestamp, parse_timestamp, Counter, Item, ItemTagRow, ItemWithTags, NewItem, NewItemTag, Tag, TagCategory,
};
use crate::error::FeedError;

diesel::define_sql_function! {
    fn last_insert_rowid() -> diesel::sql_types::BigInt;
}

// ============================================================================
// Query Types
// ============================================================================

/// Tag supplied when creating or retagging an item
#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
    #[serde(default)]
    pub category: TagCategory,
}

impl TagInput {
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self { name: name.into(), category }
    }
}

/// Input for creating an item
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemInput {
    #[serde(default)]
    pub owner_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<TagInput>,
    /// Explicit creation time for imports; never taken from request bodies
    #[serde(skip)]
    pub created_at: Option<String>,
}

fn default_status() -> String {
    "demo".to_string()
}

fn default_public() -> bool {
    true
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub title: Option<String>,
    /// `Some(None)` clears the description
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    /// Replaces the whole tag set when present
    #[serde(default)]
    pub tags: Option<Vec<TagInput>>,
}

fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(AsChangeset)]
#[diesel(table_name = items)]
struct ItemChangeset<'a> {
    title: Option<&'a str>,
    description: Option<Option<&'a str>>,
    status: Option<&'a str>,
    is_public: Option<bool>,
    updated_at: &'a str,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get item by ID
pub fn get_item(conn: &mut SqliteConnection, item_id: i64) -> Result<Option<Item>, FeedError> {
    items::table
        .find(item_id)
        .select(Item::as_select())
        .first(conn)
        .optional()
        .map_err(|e| FeedError::TransientStore(format!("Query failed: {}", e)))
}

/// Get item by ID, failing with NotFound
pub fn require_item(conn: &mut SqliteConnection, item_id: i64) -> Result<Item, FeedError> {
    get_item(conn, item_id)?.ok_or_else(|| FeedError::NotFound(format!("item {}", item_id)))
}

/// Check item existence without loading the row
pub fn item_exists(conn: &mut SqliteConnection, item_id: i64) -> Result<bool, FeedError> {
    let count: i64 = items::table
        .filter(items::id.eq(item_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Get item with tags
pub fn get_item_with_tags(
    conn: &mut SqliteConnection,
    item_id: i64,
) -> Result<Option<ItemWithTags>, FeedError> {
    match get_item(conn, item_id)? {
        Some(item) => {
            let tags = get_item_tags(conn, item_id)?;
            Ok(Some(ItemWithTags { item, tags }))
        }
        None => Ok(None),
    }
}

/// Get tags for one item
pub fn get_item_tags(conn: &mut SqliteConnection, item_id: i64) -> Result<Vec<Tag>, FeedError> {
    let rows: Vec<ItemTagRow> = item_tags::table
        .filter(item_tags::item_id.eq(item_id))
        .order(item_tags::tag.asc())
        .select(ItemTagRow::as_select())
        .load(conn)
        .map_err(|e| FeedError::TransientStore(format!("Tags query failed: {}", e)))?;
    Ok(rows.into_iter().map(Tag::from).collect())
}

/// Load tags for many items in one query
pub fn get_tags_for_items(
    conn: &mut SqliteConnection,
    item_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>, FeedError> {
    let mut by_item: HashMap<i64, Vec<Tag>> = HashMap::new();
    if item_ids.is_empty() {
        return Ok(by_item);
    }

    let rows: Vec<ItemTagRow> = item_tags::table
        .filter(item_tags::item_id.eq_any(item_ids))
        .order((item_tags::item_id.asc(), item_tags::tag.asc()))
        .select(ItemTagRow::as_select())
        .load(conn)
        .map_err(|e| FeedError::TransientStore(format!("Tags query failed: {}", e)))?;

    for row in rows {
        by_item.entry(row.item_id).or_default().push(Tag::from(row));
    }
    Ok(by_item)
}

/// Attach tags to a list of items, preserving order
pub fn attach_tags(
    conn: &mut SqliteConnection,
    rows: Vec<Item>,
) -> Result<Vec<ItemWithTags>, FeedError> {
    let ids: Vec<i64> = rows.iter().map(|i| i.id).collect();
    let mut tags = get_tags_for_items(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|item| {
            let tags = tags.remove(&item.id).unwrap_or_default();
            ItemWithTags { item, tags }
        })
        .collect())
}

/// Load several items by id, in the order of `item_ids`; missing ids are skipped
pub fn get_items_by_ids(
    conn: &mut SqliteConnection,
    item_ids: &[i64],
) -> Result<Vec<ItemWithTags>, FeedError> {
    if item_ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<Item> = items::table
        .filter(items::id.eq_any(item_ids))
        .select(Item::as_select())
        .load(conn)?;

    let mut by_id: HashMap<i64, Item> = rows.into_iter().map(|i| (i.id, i)).collect();
    let ordered: Vec<Item> = item_ids.iter().filter_map(|id| by_id.remove(id)).collect();
    attach_tags(conn, ordered)
}

/// List an owner's items, newest first
pub fn list_by_owner(
    conn: &mut SqliteConnection,
    owner_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ItemWithTags>, FeedError> {
    let rows: Vec<Item> = items::table
        .filter(items::owner_id.eq(owner_id))
        .order((items::created_at.desc(), items::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Item::as_select())
        .load(conn)?;
    attach_tags(conn, rows)
}

/// Keyword search over public items (substring match on title or description)
pub fn search_items(
    conn: &mut SqliteConnection,
    keyword: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<ItemWithTags>, FeedError> {
    let pattern = format!("%{}%", keyword);

    let rows: Vec<Item> = items::table
        .filter(items::is_public.eq(true))
        .filter(items::title.like(&pattern).or(items::description.like(&pattern)))
        .order((items::created_at.desc(), items::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Item::as_select())
        .load(conn)?;
    attach_tags(conn, rows)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create an item with its tags
pub fn create_item(
    conn: &mut SqliteConnection,
    input: &CreateItemInput,
) -> Result<ItemWithTags, FeedError> {
    let created_at = match input.created_at.as_deref() {
        Some(raw) => normalize_created_at(raw, Utc::now())?,
        None => current_timestamp(),
    };

    conn.transaction(|conn| {
        let new_item = NewItem {
            owner_id: input.owner_id,
            title: &input.title,
            description: input.description.as_deref(),
            status: &input.status,
            is_public: input.is_public,
            created_at: &created_at,
            updated_at: &created_at,
        };

        diesel::insert_into(items::table)
            .values(&new_item)
            .execute(conn)
            .map_err(|e| FeedError::TransientStore(format!("Insert failed: {}", e)))?;

        let item_id: i64 = diesel::select(last_insert_rowid()).get_result(conn)?;
        insert_tags(conn, item_id, &input.tags)?;

        get_item_with_tags(conn, item_id)?
            .ok_or_else(|| FeedError::Internal("Failed to retrieve created item".into()))
    })
}

/// Parse an imported creation time into storage form; future times are rejected
///
/// Stored timestamps order lexically, so anything not in canonical form would
/// sort out of place in the candidate window.
fn normalize_created_at(raw: &str, now: DateTime<Utc>) -> Result<String, FeedError> {
    let parsed = parse_timestamp(raw.trim())
        .ok_or_else(|| FeedError::Validation(format!("created_at '{}' is not an RFC 3339 timestamp", raw)))?;
    if parsed > now {
        return Err(FeedError::Validation(format!("created_at '{}' is in the future", raw)));
    }
    Ok(format_timestamp(parsed))
}

fn insert_tags(conn: &mut SqliteConnection, item_id: i64, tags: &[TagInput]) -> Result<(), FeedError> {
    for tag in tags {
        let name = tag.name.trim();
        if name.is_empty() {
            continue;
        }
        // Duplicate (item, tag) pairs collapse onto the primary key
        diesel::insert_or_ignore_into(item_tags::table)
            .values(&NewItemTag {
                item_id,
                tag: name,
                category: tag.category.as_str(),
            })
            .execute(conn)
            .map_err(|e| FeedError::TransientStore(format!("Tag insert failed: {}", e)))?;
    }
    Ok(())
}

/// Apply a partial update; returns None if the item does not exist
pub fn update_item(
    conn: &mut SqliteConnection,
    item_id: i64,
    patch: &ItemPatch,
) -> Result<Option<ItemWithTags>, FeedError> {
    conn.transaction(|conn| {
        let now = current_timestamp();
        let changes = ItemChangeset {
            title: patch.title.as_deref(),
            description: patch.description.as_ref().map(|d| d.as_deref()),
            status: patch.status.as_deref(),
            is_public: patch.is_public,
            updated_at: &now,
        };

        let updated = diesel::update(items::table.find(item_id))
            .set(&changes)
            .execute(conn)
            .map_err(|e| FeedError::TransientStore(format!("Update failed: {}", e)))?;

        if updated == 0 {
            return Ok(None);
        }

        if let Some(ref tags) = patch.tags {
            diesel::delete(item_tags::table.filter(item_tags::item_id.eq(item_id)))
                .execute(conn)
                .map_err(|e| FeedError::TransientStore(format!("Tag delete failed: {}", e)))?;
            insert_tags(conn, item_id, tags)?;
        }

        get_item_with_tags(conn, item_id)
    })
}

/// Delete an item; tags, interactions and comments cascade
pub fn delete_item(conn: &mut SqliteConnection, item_id: i64) -> Result<bool, FeedError> {
    let deleted = diesel::delete(items::table.find(item_id))
        .execute(conn)
        .map_err(|e| FeedError::TransientStore(format!("Delete failed: {}", e)))?;
    Ok(deleted > 0)
}

/// Atomically add `delta` to one counter; returns false if the item is missing
pub fn increment_counter(
    conn: &mut SqliteConnection,
    item_id: i64,
    counter: Counter,
    delta: i64,
) -> Result<bool, FeedError> {
    let target = items::table.find(item_id);
    let updated = match counter {
        Counter::Views => diesel::update(target)
            .set(items::view_count.eq(items::view_count + delta))
            .execute(conn),
        Counter::Likes => diesel::update(target)
            .set(items::like_count.eq(items::like_count + delta))
            .execute(conn),
        Counter::Dislikes => diesel::update(target)
            .set(items::dislike_count.eq(items::dislike_count + delta))
            .execute(conn),
        Counter::SuperLikes => diesel::update(target)
            .set(items::super_like_count.eq(items::super_like_count + delta))
            .execute(conn),
        Counter::Skips => diesel::update(target)
            .set(items::skip_count.eq(items::skip_count + delta))
            .execute(conn),
        Counter::Comments => diesel::update(target)
            .set(items::comment_count.eq(items::comment_count + delta))
            .execute(conn),
    }
    .map_err(|e| FeedError::TransientStore(format!("Counter update failed: {}", e)))?;

    Ok(updated > 0)
}


#[cfg(test)]
mod tests {
    use super::test_support::item_input;
    use super::*;
    use crate::db::FeedDb;

    #[test]
    fn test_create_item_with_tags() {
        let db = FeedDb::open_in_memory().unwrap();
        let created = db
            .with_conn(|conn| create_item(conn, &item_input(1, "Rust CLI", &["rust", "cli", "rust"], "2024-01-01T00:00:00Z")))
            .unwrap();

        assert_eq!(created.item.title, "Rust CLI");
        assert!(created.item.is_public);
        assert_eq!(created.item.like_count, 0);
        let names: Vec<&str> = created.tag_names().collect();
        assert_eq!(names, vec!["cli", "rust"]);
    }

    #[test]
    fn test_update_item_patch() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let created = create_item(conn, &item_input(1, "Old", &["go"], "2024-01-01T00:00:00Z"))?;
            let patch = ItemPatch {
                title: Some("New".into()),
                description: Some(Some("desc".into())),
                is_public: Some(false),
                tags: Some(vec![TagInput::new("rust", TagCategory::Technology)]),
                ..Default::default()
            };
            let updated = update_item(conn, created.item.id, &patch)?.unwrap();

            assert_eq!(updated.item.title, "New");
            assert_eq!(updated.item.description.as_deref(), Some("desc"));
            assert!(!updated.item.is_public);
            assert_eq!(updated.tags, vec![Tag { name: "rust".into(), category: TagCategory::Technology }]);

            assert!(update_item(conn, 999, &ItemPatch::default())?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_increment_counter_is_additive() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let id = create_item(conn, &item_input(1, "A", &[], "2024-01-01T00:00:00Z"))?.item.id;
            increment_counter(conn, id, Counter::Likes, 1)?;
            increment_counter(conn, id, Counter::Likes, 2)?;
            increment_counter(conn, id, Counter::Views, 5)?;
            assert!(!increment_counter(conn, 404, Counter::Likes, 1)?);

            let item = require_item(conn, id)?;
            assert_eq!(item.like_count, 3);
            assert_eq!(item.view_count, 5);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_search_only_public() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_item(conn, &item_input(1, "Swipe engine", &[], "2024-01-01T00:00:00Z"))?;
            let mut hidden = item_input(1, "Swipe draft", &[], "2024-01-02T00:00:00Z");
            hidden.is_public = false;
            create_item(conn, &hidden)?;

            let found = search_items(conn, "Swipe", 10, 0)?;
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].item.title, "Swipe engine");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_get_items_by_ids_preserves_order() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let a = create_item(conn, &item_input(1, "A", &["x"], "2024-01-01T00:00:00Z"))?.item.id;
            let b = create_item(conn, &item_input(1, "B", &["y"], "2024-01-02T00:00:00Z"))?.item.id;

            let loaded = get_items_by_ids(conn, &[b, 777, a])?;
            let ids: Vec<i64> = loaded.iter().map(|i| i.item.id).collect();
            assert_eq!(ids, vec![b, a]);
            assert_eq!(loaded[0].tags[0].name, "y");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_created_at_is_validated_and_normalized() {
        let db = FeedDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let bogus = create_item(conn, &item_input(1, "Bogus", &["rust"], "zzz"));
            assert!(matches!(bogus, Err(FeedError::Validation(_))));

            let future = create_item(conn, &item_input(1, "Future", &["rust"], "2999-01-01T00:00:00Z"));
            assert!(matches!(future, Err(FeedError::Validation(_))));

            let offset = create_item(conn, &item_input(1, "Offset", &["rust"], "2024-01-01T01:30:00+02:00"))?;
            assert_eq!(offset.item.created_at, "2023-12-31T23:30:00Z");
            assert_eq!(offset.item.updated_at, offset.item.created_at);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_created_at_is_not_read_from_json() {
        let input: CreateItemInput =
            serde_json::from_str(r#"{"title": "Demo", "created_at": "zzz"}"#).unwrap();
        assert!(input.created_at.is_none());
        assert_eq!(input.status, "demo");
        assert!(input.is_public);
    }
}
