use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Member => "",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == "admin" {
            UserRole::Admin
        } else {
            UserRole::Member
        }
    }
}

/// A workspace member mirrored from Slack by the roster sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub user_id: String,
    pub user_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(user_id: String, user_name: String, role: UserRole) -> Self {
        Self {
            id: 0,
            user_id,
            user_name,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Someone who is expected to post a standup in `channel_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandupUser {
    pub id: i64,
    pub slack_user_id: String,
    pub slack_name: String,
    pub channel_id: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
}

impl StandupUser {
    pub fn new(
        slack_user_id: String,
        slack_name: String,
        channel_id: String,
        channel: String,
    ) -> Self {
        Self {
            id: 0,
            slack_user_id,
            slack_name,
            channel_id,
            channel,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandupTime {
    pub id: i64,
    pub channel_id: String,
    pub channel: String,
    /// Unix seconds; only the UTC hour and minute are meaningful.
    pub time: i64,
    pub updated_at: DateTime<Utc>,
}

impl StandupTime {
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        DateTime::from_timestamp(self.time, 0).map(|dt| dt.time())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standup {
    pub id: i64,
    pub channel_id: String,
    pub user_id: String,
    pub comment: String,
    pub message_ts: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Standup {
    pub fn new(channel_id: String, user_id: String, comment: String, message_ts: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            channel_id,
            user_id,
            comment,
            message_ts,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandupEditHistory {
    pub id: i64,
    pub standup_id: i64,
    pub standup_text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_value() {
        assert_eq!(UserRole::from_db(UserRole::Admin.as_str()), UserRole::Admin);
        assert_eq!(UserRole::from_db(""), UserRole::Member);
        assert_eq!(UserRole::from_db("owner"), UserRole::Member);
    }

    #[test]
    fn standup_time_ignores_date_component() {
        let time = StandupTime {
            id: 1,
            channel_id: "C1".to_string(),
            channel: "general".to_string(),
            time: 3 * 86_400 + 9 * 3600 + 30 * 60,
            updated_at: Utc::now(),
        };
        assert_eq!(time.time_of_day(), NaiveTime::from_hms_opt(9, 30, 0));
    }
}
