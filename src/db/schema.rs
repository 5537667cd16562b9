diesel::table! {
    users (id) {
        id -> BigInt,
        user_id -> Text,
        user_name -> Text,
        role -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    standup_users (id) {
        id -> BigInt,
        slack_user_id -> Text,
        slack_name -> Text,
        channel_id -> Text,
        channel -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    standup_times (id) {
        id -> BigInt,
        channel_id -> Text,
        channel -> Text,
        time -> BigInt,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    standups (id) {
        id -> BigInt,
        channel_id -> Text,
        user_id -> Text,
        comment -> Text,
        message_ts -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    standup_edit_history (id) {
        id -> BigInt,
        standup_id -> BigInt,
        standup_text -> Text,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    users,
    standup_users,
    standup_times,
    standups,
    standup_edit_history,
);
