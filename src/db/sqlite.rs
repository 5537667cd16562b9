use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use super::DatabaseError;
use super::models::{Standup, StandupEditHistory, StandupTime, StandupUser, User, UserRole};
use crate::db::schema_sqlite::{standup_edit_history, standup_times, standup_users, standups, users};

const BUSY_TIMEOUT_MS: u32 = 5000;

// Fixed-width UTC so that range filters can compare the stored text directly
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
struct DbUser {
    id: i32,
    user_id: String,
    user_name: String,
    role: String,
    created_at: String,
}

impl DbUser {
    fn to_user(&self) -> Result<User, DatabaseError> {
        Ok(User {
            id: self.id as i64,
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            role: UserRole::from_db(&self.role),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    user_id: &'a str,
    user_name: &'a str,
    role: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standup_users)]
struct DbStandupUser {
    id: i32,
    slack_user_id: String,
    slack_name: String,
    channel_id: String,
    channel: String,
    created_at: String,
}

impl DbStandupUser {
    fn to_standup_user(&self) -> Result<StandupUser, DatabaseError> {
        Ok(StandupUser {
            id: self.id as i64,
            slack_user_id: self.slack_user_id.clone(),
            slack_name: self.slack_name.clone(),
            channel_id: self.channel_id.clone(),
            channel: self.channel.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = standup_users)]
struct NewStandupUser<'a> {
    slack_user_id: &'a str,
    slack_name: &'a str,
    channel_id: &'a str,
    channel: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standup_times)]
struct DbStandupTime {
    id: i32,
    channel_id: String,
    channel: String,
    time: i64,
    updated_at: String,
}

impl DbStandupTime {
    fn to_standup_time(&self) -> Result<StandupTime, DatabaseError> {
        Ok(StandupTime {
            id: self.id as i64,
            channel_id: self.channel_id.clone(),
            channel: self.channel.clone(),
            time: self.time,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = standup_times)]
struct NewStandupTime<'a> {
    channel_id: &'a str,
    channel: &'a str,
    time: i64,
    updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standups)]
struct DbStandup {
    id: i32,
    channel_id: String,
    user_id: String,
    comment: String,
    message_ts: String,
    created_at: String,
    updated_at: String,
}

impl DbStandup {
    fn to_standup(&self) -> Result<Standup, DatabaseError> {
        Ok(Standup {
            id: self.id as i64,
            channel_id: self.channel_id.clone(),
            user_id: self.user_id.clone(),
            comment: self.comment.clone(),
            message_ts: self.message_ts.clone(),
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = standups)]
struct NewStandup<'a> {
    channel_id: &'a str,
    user_id: &'a str,
    comment: &'a str,
    message_ts: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = standups)]
struct UpdateStandup<'a> {
    comment: &'a str,
    updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standup_edit_history)]
struct DbStandupEditHistory {
    id: i32,
    standup_id: i32,
    standup_text: String,
    created_at: String,
}

impl DbStandupEditHistory {
    fn to_edit_history(&self) -> Result<StandupEditHistory, DatabaseError> {
        Ok(StandupEditHistory {
            id: self.id as i64,
            standup_id: self.standup_id as i64,
            standup_text: self.standup_text.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = standup_edit_history)]
struct NewStandupEditHistory<'a> {
    standup_id: i32,
    standup_text: &'a str,
    created_at: String,
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query(format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct SqliteUserStore {
    db_path: Arc<String>,
}

impl SqliteUserStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::UserStore for SqliteUserStore {
    async fn create_user(&self, user: &User) -> Result<bool, DatabaseError> {
        let user = user.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let new_user = NewUser {
                user_id: &user.user_id,
                user_name: &user.user_name,
                role: user.role.as_str(),
                created_at: datetime_to_string(&user.created_at),
            };

            diesel::insert_into(users::table)
                .values(&new_user)
                .on_conflict(users::user_id)
                .do_nothing()
                .execute(conn)
                .map(|rows| rows > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_user(&self, id: i64) -> Result<(), DatabaseError> {
        let id = id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            diesel::delete(users::table.filter(users::id.eq(id)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_user_by_slack_id(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let slack_id = user_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            users::table
                .filter(users::user_id.eq(slack_id))
                .select(DbUser::as_select())
                .first::<DbUser>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|u| u.to_user())
                .transpose()
        })
        .await
    }

    async fn get_user_by_name(&self, user_name: &str) -> Result<Option<User>, DatabaseError> {
        let name = user_name.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            users::table
                .filter(users::user_name.eq(name))
                .order(users::id.asc())
                .select(DbUser::as_select())
                .first::<DbUser>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|u| u.to_user())
                .transpose()
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            let rows = users::table
                .order(users::id.asc())
                .select(DbUser::as_select())
                .load::<DbUser>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbUser::to_user).collect()
        })
        .await
    }
}

pub struct SqliteStandupUserStore {
    db_path: Arc<String>,
}

impl SqliteStandupUserStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::StandupUserStore for SqliteStandupUserStore {
    async fn create_standup_user(&self, user: &StandupUser) -> Result<bool, DatabaseError> {
        let user = user.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let new_user = NewStandupUser {
                slack_user_id: &user.slack_user_id,
                slack_name: &user.slack_name,
                channel_id: &user.channel_id,
                channel: &user.channel,
                created_at: datetime_to_string(&user.created_at),
            };

            diesel::insert_into(standup_users::table)
                .values(&new_user)
                .on_conflict((standup_users::slack_name, standup_users::channel_id))
                .do_nothing()
                .execute(conn)
                .map(|rows| rows > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_standup_user_by_name(
        &self,
        slack_name: &str,
        channel_id: &str,
    ) -> Result<(), DatabaseError> {
        let name = slack_name.to_string();
        let channel = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            diesel::delete(
                standup_users::table
                    .filter(standup_users::slack_name.eq(name))
                    .filter(standup_users::channel_id.eq(channel)),
            )
            .execute(conn)
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_standup_users_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<StandupUser>, DatabaseError> {
        let channel = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            let rows = standup_users::table
                .filter(standup_users::channel_id.eq(channel))
                .order(standup_users::id.asc())
                .select(DbStandupUser::as_select())
                .load::<DbStandupUser>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbStandupUser::to_standup_user).collect()
        })
        .await
    }

    async fn find_standup_user_in_channel(
        &self,
        slack_name: &str,
        channel_id: &str,
    ) -> Result<Option<StandupUser>, DatabaseError> {
        let name = slack_name.to_string();
        let channel = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            standup_users::table
                .filter(standup_users::slack_name.eq(name))
                .filter(standup_users::channel_id.eq(channel))
                .select(DbStandupUser::as_select())
                .first::<DbStandupUser>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|u| u.to_standup_user())
                .transpose()
        })
        .await
    }
}

pub struct SqliteStandupTimeStore {
    db_path: Arc<String>,
}

impl SqliteStandupTimeStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::StandupTimeStore for SqliteStandupTimeStore {
    async fn upsert_standup_time(
        &self,
        channel_id: &str,
        channel_name: &str,
        time: i64,
    ) -> Result<(), DatabaseError> {
        let channel_id = channel_id.to_string();
        let channel_name = channel_name.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            let now = datetime_to_string(&Utc::now());
            let new_time = NewStandupTime {
                channel_id: &channel_id,
                channel: &channel_name,
                time,
                updated_at: now.clone(),
            };

            diesel::insert_into(standup_times::table)
                .values(&new_time)
                .on_conflict(standup_times::channel_id)
                .do_update()
                .set((
                    standup_times::channel.eq(&channel_name),
                    standup_times::time.eq(time),
                    standup_times::updated_at.eq(&now),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_standup_time(&self, channel_id: &str) -> Result<(), DatabaseError> {
        let channel = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            diesel::delete(standup_times::table.filter(standup_times::channel_id.eq(channel)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_standup_time(
        &self,
        channel_id: &str,
    ) -> Result<Option<StandupTime>, DatabaseError> {
        let channel = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            standup_times::table
                .filter(standup_times::channel_id.eq(channel))
                .select(DbStandupTime::as_select())
                .first::<DbStandupTime>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|t| t.to_standup_time())
                .transpose()
        })
        .await
    }
}

pub struct SqliteStandupStore {
    db_path: Arc<String>,
}

impl SqliteStandupStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::StandupStore for SqliteStandupStore {
    async fn create_standup(&self, standup: &Standup) -> Result<Standup, DatabaseError> {
        let standup = standup.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let new_standup = NewStandup {
                channel_id: &standup.channel_id,
                user_id: &standup.user_id,
                comment: &standup.comment,
                message_ts: &standup.message_ts,
                created_at: datetime_to_string(&standup.created_at),
                updated_at: datetime_to_string(&standup.updated_at),
            };

            conn.transaction(|conn| {
                diesel::insert_into(standups::table)
                    .values(&new_standup)
                    .execute(conn)?;

                standups::table
                    .filter(standups::message_ts.eq(&standup.message_ts))
                    .order(standups::id.desc())
                    .select(DbStandup::as_select())
                    .first::<DbStandup>(conn)
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .to_standup()
        })
        .await
    }

    async fn update_standup(&self, standup: &Standup) -> Result<(), DatabaseError> {
        let standup = standup.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let changes = UpdateStandup {
                comment: &standup.comment,
                updated_at: datetime_to_string(&Utc::now()),
            };

            let updated =
                diesel::update(standups::table.filter(standups::id.eq(standup.id as i32)))
                    .set(changes)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
            if updated == 0 {
                return Err(DatabaseError::NotFound(format!("standup {}", standup.id)));
            }
            Ok(())
        })
        .await
    }

    async fn find_standup_by_message_ref(
        &self,
        message_ts: &str,
    ) -> Result<Option<Standup>, DatabaseError> {
        let message_ts = message_ts.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            standups::table
                .filter(standups::message_ts.eq(message_ts))
                .order(standups::id.desc())
                .select(DbStandup::as_select())
                .first::<DbStandup>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|s| s.to_standup())
                .transpose()
        })
        .await
    }

    async fn append_edit_history(
        &self,
        standup_id: i64,
        prior_comment: &str,
    ) -> Result<StandupEditHistory, DatabaseError> {
        let prior_comment = prior_comment.to_string();
        let standup_id = standup_id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            let entry = NewStandupEditHistory {
                standup_id,
                standup_text: &prior_comment,
                created_at: datetime_to_string(&Utc::now()),
            };

            conn.transaction(|conn| {
                diesel::insert_into(standup_edit_history::table)
                    .values(&entry)
                    .execute(conn)?;

                standup_edit_history::table
                    .filter(standup_edit_history::standup_id.eq(standup_id))
                    .order(standup_edit_history::id.desc())
                    .select(DbStandupEditHistory::as_select())
                    .first::<DbStandupEditHistory>(conn)
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))?
            .to_edit_history()
        })
        .await
    }

    async fn list_edit_history(
        &self,
        standup_id: i64,
    ) -> Result<Vec<StandupEditHistory>, DatabaseError> {
        let standup_id = standup_id as i32;
        with_connection(self.db_path.clone(), move |conn| {
            let rows = standup_edit_history::table
                .filter(standup_edit_history::standup_id.eq(standup_id))
                .order(standup_edit_history::id.asc())
                .select(DbStandupEditHistory::as_select())
                .load::<DbStandupEditHistory>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbStandupEditHistory::to_edit_history).collect()
        })
        .await
    }

    async fn list_standups_by_channel_in_range(
        &self,
        channel_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Standup>, DatabaseError> {
        let channel = channel_id.to_string();
        let from = datetime_to_string(&from);
        let until = datetime_to_string(&until);
        with_connection(self.db_path.clone(), move |conn| {
            let rows = standups::table
                .filter(standups::channel_id.eq(channel))
                .filter(standups::created_at.ge(from))
                .filter(standups::created_at.lt(until))
                .order((standups::created_at.asc(), standups::id.asc()))
                .select(DbStandup::as_select())
                .load::<DbStandup>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbStandup::to_standup).collect()
        })
        .await
    }

    async fn list_standups_by_user_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Standup>, DatabaseError> {
        let user = user_id.to_string();
        let from = datetime_to_string(&from);
        let until = datetime_to_string(&until);
        with_connection(self.db_path.clone(), move |conn| {
            let rows = standups::table
                .filter(standups::user_id.eq(user))
                .filter(standups::created_at.ge(from))
                .filter(standups::created_at.lt(until))
                .order((standups::created_at.asc(), standups::id.asc()))
                .select(DbStandup::as_select())
                .load::<DbStandup>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.iter().map(DbStandup::to_standup).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::db::DatabaseManager;

    #[test]
    fn stored_datetimes_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let later = earlier + Duration::milliseconds(1500);
        assert!(datetime_to_string(&earlier) < datetime_to_string(&later));
        assert_eq!(
            string_to_datetime(&datetime_to_string(&later)).unwrap(),
            later
        );
    }

    #[tokio::test]
    async fn standup_user_insert_is_idempotent() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_user_store();
        let user = StandupUser::new(
            "U1".to_string(),
            "alice".to_string(),
            "C1".to_string(),
            "general".to_string(),
        );

        assert!(store.create_standup_user(&user).await.unwrap());
        assert!(!store.create_standup_user(&user).await.unwrap());
        assert_eq!(store.list_standup_users_by_channel("C1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn standup_user_lookup_is_scoped_to_channel() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_user_store();
        let user = StandupUser::new(
            "U1".to_string(),
            "alice".to_string(),
            "C1".to_string(),
            "general".to_string(),
        );
        store.create_standup_user(&user).await.unwrap();

        let found = store
            .find_standup_user_in_channel("alice", "C1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.slack_user_id, "U1");
        assert_eq!(found.channel, "general");
        assert!(
            store
                .find_standup_user_in_channel("alice", "C2")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_standup_user_in_channel("bob", "C1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn user_is_found_by_slack_id() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.user_store();
        let user = User::new("U1".to_string(), "alice".to_string(), UserRole::Admin);

        assert!(store.create_user(&user).await.unwrap());

        let found = store.get_user_by_slack_id("U1").await.unwrap().unwrap();
        assert_eq!(found.user_name, "alice");
        assert_eq!(found.role, UserRole::Admin);
        assert!(found.id > 0);
        assert!(store.get_user_by_slack_id("U2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn standup_time_upsert_replaces_value() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_time_store();

        store.upsert_standup_time("C1", "general", 100).await.unwrap();
        store.upsert_standup_time("C1", "general-renamed", 200).await.unwrap();

        let time = store.get_standup_time("C1").await.unwrap().unwrap();
        assert_eq!(time.time, 200);
        assert_eq!(time.channel, "general-renamed");
        assert!(store.get_standup_time("C2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn range_query_is_half_open() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_store();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();

        let mut inside = Standup::new("C1".into(), "U1".into(), "inside".into(), "1.1".into());
        inside.created_at = day + Duration::hours(23);
        let mut boundary = Standup::new("C1".into(), "U1".into(), "next".into(), "1.2".into());
        boundary.created_at = day + Duration::days(1);
        store.create_standup(&inside).await.unwrap();
        store.create_standup(&boundary).await.unwrap();

        let found = store
            .list_standups_by_channel_in_range("C1", day, day + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].comment, "inside");
    }

    #[tokio::test]
    async fn edit_history_is_listed_in_append_order() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_store();
        let standup = store
            .create_standup(&Standup::new("C1".into(), "U1".into(), "v1".into(), "9.9".into()))
            .await
            .unwrap();

        store.append_edit_history(standup.id, "v1").await.unwrap();
        store.append_edit_history(standup.id, "v2").await.unwrap();

        let history = store.list_edit_history(standup.id).await.unwrap();
        let texts: Vec<_> = history.iter().map(|h| h.standup_text.as_str()).collect();
        assert_eq!(texts, vec!["v1", "v2"]);
    }
}
