use std::fmt;
use std::sync::Arc;

use chrono::NaiveTime;
use tracing::{info, warn};

use crate::db::{DatabaseError, StandupTimeStore, StandupUser, StandupUserStore};
use crate::parsers::{parse_time_of_day, time_of_day_to_timestamp};
use crate::utils::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    AlreadyExists,
    Added { slack_name: String },
    /// Added, but the channel has no standup time configured yet.
    AddedWithoutTime { slack_name: String },
}

impl fmt::Display for AddOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddOutcome::AlreadyExists => write!(f, "User already exists!"),
            AddOutcome::Added { slack_name } => write!(f, "<@{slack_name}> added"),
            AddOutcome::AddedWithoutTime { slack_name } => write!(
                f,
                "<@{slack_name}> added, but there is no standup time for this channel"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub slack_name: String,
}

impl fmt::Display for RemoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<@{}> deleted", self.slack_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StanduperList(pub Vec<StandupUser>);

impl fmt::Display for StanduperList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(
                f,
                "No standupers in this channel! To add one, please, use /comedianadd slash command"
            );
        }
        let names: Vec<String> = self
            .0
            .iter()
            .map(|user| format!("<@{}>", user.slack_name))
            .collect();
        write!(f, "Standupers in this channel: {}", names.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetTimeOutcome {
    Set { time: NaiveTime },
    /// Stored, but nobody in the channel is expected to report yet.
    SetWithoutStandupers { time: NaiveTime },
}

impl fmt::Display for SetTimeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetTimeOutcome::Set { time } => {
                write!(f, "standup time at {} (UTC) added", time.format("%H:%M"))
            }
            SetTimeOutcome::SetWithoutStandupers { time } => write!(
                f,
                "standup time at {} (UTC) added, but there is no standup users for this channel",
                time.format("%H:%M")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTimeOutcome {
    Removed { channel_name: String },
    RemovedWithStandupers,
}

impl fmt::Display for RemoveTimeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveTimeOutcome::Removed { channel_name } => {
                write!(f, "standup time for {channel_name} channel deleted")
            }
            RemoveTimeOutcome::RemovedWithStandupers => write!(
                f,
                "standup time for this channel removed, but there are people marked as a standuper."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeQuery {
    Configured(NaiveTime),
    NotConfigured,
}

impl fmt::Display for TimeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeQuery::Configured(time) => {
                write!(f, "standup time at {} (UTC)", time.format("%H:%M"))
            }
            TimeQuery::NotConfigured => write!(
                f,
                "No standup time set for this channel yet! Please, add a standup time using `/standuptimeset` command!"
            ),
        }
    }
}

/// Per-channel standupers and standup times. The cross-checks between the
/// two only shape the reply; they never block the mutation.
pub struct MembershipManager {
    standup_users: Arc<dyn StandupUserStore>,
    standup_times: Arc<dyn StandupTimeStore>,
}

impl MembershipManager {
    pub fn new(
        standup_users: Arc<dyn StandupUserStore>,
        standup_times: Arc<dyn StandupTimeStore>,
    ) -> Self {
        Self {
            standup_users,
            standup_times,
        }
    }

    pub async fn add_standup_user(
        &self,
        channel_id: &str,
        channel_name: &str,
        slack_user_id: &str,
        slack_name: &str,
    ) -> Result<AddOutcome, AppError> {
        let user = StandupUser::new(
            slack_user_id.to_string(),
            slack_name.to_string(),
            channel_id.to_string(),
            channel_name.to_string(),
        );
        if !self.standup_users.create_standup_user(&user).await? {
            return Ok(AddOutcome::AlreadyExists);
        }
        info!(channel_id, slack_name, "standuper added");

        let has_time = match self.standup_times.get_standup_time(channel_id).await {
            Ok(time) => time.is_some(),
            Err(err) => {
                warn!(channel_id, "could not look up standup time: {err}");
                false
            }
        };

        let slack_name = slack_name.to_string();
        Ok(if has_time {
            AddOutcome::Added { slack_name }
        } else {
            AddOutcome::AddedWithoutTime { slack_name }
        })
    }

    pub async fn remove_standup_user(
        &self,
        channel_id: &str,
        slack_name: &str,
    ) -> Result<RemoveOutcome, AppError> {
        self.standup_users
            .delete_standup_user_by_name(slack_name, channel_id)
            .await?;
        info!(channel_id, slack_name, "standuper removed");
        Ok(RemoveOutcome {
            slack_name: slack_name.to_string(),
        })
    }

    pub async fn list_standup_users(&self, channel_id: &str) -> Result<StanduperList, AppError> {
        let users = self
            .standup_users
            .list_standup_users_by_channel(channel_id)
            .await?;
        Ok(StanduperList(users))
    }

    pub async fn set_standup_time(
        &self,
        channel_id: &str,
        channel_name: &str,
        time_text: &str,
    ) -> Result<SetTimeOutcome, AppError> {
        let time = parse_time_of_day(time_text)?;
        self.standup_times
            .upsert_standup_time(channel_id, channel_name, time_of_day_to_timestamp(time))
            .await?;
        info!(channel_id, time = %time.format("%H:%M"), "standup time set");

        Ok(if self.has_standupers(channel_id).await {
            SetTimeOutcome::Set { time }
        } else {
            SetTimeOutcome::SetWithoutStandupers { time }
        })
    }

    pub async fn remove_standup_time(
        &self,
        channel_id: &str,
        channel_name: &str,
    ) -> Result<RemoveTimeOutcome, AppError> {
        self.standup_times.delete_standup_time(channel_id).await?;
        info!(channel_id, "standup time removed");

        Ok(if self.has_standupers(channel_id).await {
            RemoveTimeOutcome::RemovedWithStandupers
        } else {
            RemoveTimeOutcome::Removed {
                channel_name: channel_name.to_string(),
            }
        })
    }

    pub async fn get_standup_time(&self, channel_id: &str) -> Result<TimeQuery, AppError> {
        let Some(standup_time) = self.standup_times.get_standup_time(channel_id).await? else {
            return Ok(TimeQuery::NotConfigured);
        };
        let time = standup_time.time_of_day().ok_or_else(|| {
            AppError::Storage(DatabaseError::Query(format!(
                "stored standup time {} is out of range",
                standup_time.time
            )))
        })?;
        Ok(TimeQuery::Configured(time))
    }

    async fn has_standupers(&self, channel_id: &str) -> bool {
        match self
            .standup_users
            .list_standup_users_by_channel(channel_id)
            .await
        {
            Ok(users) => !users.is_empty(),
            Err(err) => {
                warn!(channel_id, "could not list standupers: {err}");
                false
            }
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::DatabaseManager;

    async fn manager() -> (tempfile::TempDir, MembershipManager) {
        let (dir, db) = DatabaseManager::sqlite_for_tests().await;
        (
            dir,
            MembershipManager::new(db.standup_user_store(), db.standup_time_store()),
        )
    }

    #[tokio::test]
    async fn add_twice_reports_already_exists() {
        let (_dir, manager) = manager().await;

        let first = manager
            .add_standup_user("C1", "general", "U1", "alice")
            .await
            .unwrap();
        assert_eq!(
            first.to_string(),
            "<@alice> added, but there is no standup time for this channel"
        );

        let second = manager
            .add_standup_user("C1", "general", "U1", "alice")
            .await
            .unwrap();
        assert_eq!(second, AddOutcome::AlreadyExists);
        assert_eq!(manager.list_standup_users("C1").await.unwrap().0.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_store_one_row() {
        let (_dir, manager) = manager().await;
        const ATTEMPTS: usize = 8;

        let outcomes = futures::future::join_all(
            (0..ATTEMPTS).map(|_| manager.add_standup_user("C1", "general", "U1", "alice")),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

        let added = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, AddOutcome::AddedWithoutTime { .. }))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|outcome| **outcome == AddOutcome::AlreadyExists)
            .count();
        assert_eq!(added, 1);
        assert_eq!(rejected, ATTEMPTS - 1);
        assert_eq!(manager.list_standup_users("C1").await.unwrap().0.len(), 1);
    }

    #[tokio::test]
    async fn add_after_time_is_set_is_plain_success() {
        let (_dir, manager) = manager().await;
        manager.set_standup_time("C1", "general", "10:15").await.unwrap();

        let outcome = manager
            .add_standup_user("C1", "general", "U1", "alice")
            .await
            .unwrap();
        assert_eq!(outcome.to_string(), "<@alice> added");
    }

    #[tokio::test]
    async fn set_then_get_returns_same_time() {
        let (_dir, manager) = manager().await;

        let outcome = manager.set_standup_time("C1", "general", "09:00").await.unwrap();
        assert_eq!(
            outcome.to_string(),
            "standup time at 09:00 (UTC) added, but there is no standup users for this channel"
        );

        let query = manager.get_standup_time("C1").await.unwrap();
        assert_eq!(query, TimeQuery::Configured(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
        assert_eq!(query.to_string(), "standup time at 09:00 (UTC)");
    }

    #[tokio::test]
    async fn second_set_replaces_first() {
        let (_dir, manager) = manager().await;
        manager.set_standup_time("C1", "general", "09:00").await.unwrap();
        manager.set_standup_time("C1", "general", "17:45").await.unwrap();

        assert_eq!(
            manager.get_standup_time("C1").await.unwrap(),
            TimeQuery::Configured(NaiveTime::from_hms_opt(17, 45, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn malformed_time_is_rejected_without_writing() {
        let (_dir, manager) = manager().await;

        let err = manager.set_standup_time("C1", "general", "9am").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(manager.get_standup_time("C1").await.unwrap(), TimeQuery::NotConfigured);
    }

    #[tokio::test]
    async fn remove_time_warns_when_standupers_remain() {
        let (_dir, manager) = manager().await;
        manager.set_standup_time("C1", "general", "09:00").await.unwrap();
        manager
            .add_standup_user("C1", "general", "U1", "alice")
            .await
            .unwrap();

        let outcome = manager.remove_standup_time("C1", "general").await.unwrap();
        assert_eq!(outcome, RemoveTimeOutcome::RemovedWithStandupers);

        manager.remove_standup_user("C1", "alice").await.unwrap();
        let outcome = manager.remove_standup_time("C1", "general").await.unwrap();
        assert_eq!(outcome.to_string(), "standup time for general channel deleted");
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let (_dir, manager) = manager().await;
        assert!(
            manager
                .list_standup_users("C1")
                .await
                .unwrap()
                .to_string()
                .starts_with("No standupers")
        );

        for (id, name) in [("U2", "bob"), ("U1", "alice")] {
            manager.add_standup_user("C1", "general", id, name).await.unwrap();
        }
        assert_eq!(
            manager.list_standup_users("C1").await.unwrap().to_string(),
            "Standupers in this channel: <@bob>, <@alice>"
        );
    }
}
