// Kept in sync with the DDL in schema.rs.

diesel::table! {
    users (id) {
        id -> BigInt,
        username -> Text,
        follower_count -> BigInt,
        following_count -> BigInt,
        created_at -> Text,
    }
}

diesel::table! {
    items (id) {
        id -> BigInt,
        owner_id -> BigInt,
        title -> Text,
        description -> Nullable<Text>,
        status -> Text,
        is_public -> Bool,
        view_count -> BigInt,
        like_count -> BigInt,
        dislike_count -> BigInt,
        super_like_count -> BigInt,
        skip_count -> BigInt,
        comment_count -> BigInt,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    item_tags (item_id, tag) {
        item_id -> BigInt,
        tag -> Text,
        category -> Text,
    }
}

diesel::table! {
    interactions (id) {
        id -> BigInt,
        user_id -> BigInt,
        item_id -> BigInt,
        interaction_type -> Text,
        structured_feedback -> Nullable<Text>,
        session_id -> Nullable<Text>,
        view_duration -> Nullable<Double>,
        created_at -> Text,
    }
}

diesel::table! {
    follows (follower_id, followee_id) {
        follower_id -> BigInt,
        followee_id -> BigInt,
        created_at -> Text,
    }
}

diesel::table! {
    comments (id) {
        id -> BigInt,
        item_id -> BigInt,
        user_id -> BigInt,
        parent_id -> Nullable<BigInt>,
        content -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(item_tags -> items (item_id));
diesel::joinable!(interactions -> items (item_id));
diesel::joinable!(comments -> items (item_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    items,
    item_tags,
    interactions,
    follows,
    comments,
);
