// SQLite schema definitions
// This file mirrors schema.rs but uses SQLite-compatible types

diesel::table! {
    users (id) {
        id -> Integer,
        user_id -> Text,
        user_name -> Text,
        role -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    standup_users (id) {
        id -> Integer,
        slack_user_id -> Text,
        slack_name -> Text,
        channel_id -> Text,
        channel -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    standup_times (id) {
        id -> Integer,
        channel_id -> Text,
        channel -> Text,
        time -> BigInt,
        updated_at -> Text,
    }
}

diesel::table! {
    standups (id) {
        id -> Integer,
        channel_id -> Text,
        user_id -> Text,
        comment -> Text,
        message_ts -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    standup_edit_history (id) {
        id -> Integer,
        standup_id -> Integer,
        standup_text -> Text,
        created_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    standup_users,
    standup_times,
    standups,
    standup_edit_history,
);
