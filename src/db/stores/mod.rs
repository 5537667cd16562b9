use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{Standup, StandupEditHistory, StandupTime, StandupUser, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user unless one with the same Slack id exists.
    /// Returns whether a row was written.
    async fn create_user(&self, user: &User) -> Result<bool, DatabaseError>;
    async fn delete_user(&self, id: i64) -> Result<(), DatabaseError>;
    async fn get_user_by_slack_id(&self, user_id: &str) -> Result<Option<User>, DatabaseError>;
    async fn get_user_by_name(&self, user_name: &str) -> Result<Option<User>, DatabaseError>;
    async fn list_users(&self) -> Result<Vec<User>, DatabaseError>;
}

#[async_trait]
pub trait StandupUserStore: Send + Sync {
    /// Inserts unless (slack_name, channel_id) is already taken.
    /// Returns whether a row was written.
    async fn create_standup_user(&self, user: &StandupUser) -> Result<bool, DatabaseError>;
    async fn delete_standup_user_by_name(
        &self,
        slack_name: &str,
        channel_id: &str,
    ) -> Result<(), DatabaseError>;
    async fn list_standup_users_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<StandupUser>, DatabaseError>;
    async fn find_standup_user_in_channel(
        &self,
        slack_name: &str,
        channel_id: &str,
    ) -> Result<Option<StandupUser>, DatabaseError>;
}

#[async_trait]
pub trait StandupTimeStore: Send + Sync {
    async fn upsert_standup_time(
        &self,
        channel_id: &str,
        channel_name: &str,
        time: i64,
    ) -> Result<(), DatabaseError>;
    async fn delete_standup_time(&self, channel_id: &str) -> Result<(), DatabaseError>;
    async fn get_standup_time(&self, channel_id: &str)
    -> Result<Option<StandupTime>, DatabaseError>;
}

#[async_trait]
pub trait StandupStore: Send + Sync {
    async fn create_standup(&self, standup: &Standup) -> Result<Standup, DatabaseError>;
    async fn update_standup(&self, standup: &Standup) -> Result<(), DatabaseError>;
    async fn find_standup_by_message_ref(
        &self,
        message_ts: &str,
    ) -> Result<Option<Standup>, DatabaseError>;
    async fn append_edit_history(
        &self,
        standup_id: i64,
        prior_comment: &str,
    ) -> Result<StandupEditHistory, DatabaseError>;
    async fn list_edit_history(
        &self,
        standup_id: i64,
    ) -> Result<Vec<StandupEditHistory>, DatabaseError>;
    /// Standups created in `[from, until)`, oldest first.
    async fn list_standups_by_channel_in_range(
        &self,
        channel_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Standup>, DatabaseError>;
    /// Standups created in `[from, until)`, oldest first.
    async fn list_standups_by_user_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Standup>, DatabaseError>;
}
