use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use super::DatabaseError;
use super::models::{Standup, StandupEditHistory, StandupTime, StandupUser, User, UserRole};
use crate::db::manager::Pool;
use crate::db::schema::{standup_edit_history, standup_times, standup_users, standups, users};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
struct DbUser {
    id: i64,
    user_id: String,
    user_name: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            user_name: value.user_name,
            role: UserRole::from_db(&value.role),
            created_at: value.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    user_id: &'a str,
    user_name: &'a str,
    role: &'a str,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standup_users)]
struct DbStandupUser {
    id: i64,
    slack_user_id: String,
    slack_name: String,
    channel_id: String,
    channel: String,
    created_at: DateTime<Utc>,
}

impl From<DbStandupUser> for StandupUser {
    fn from(value: DbStandupUser) -> Self {
        Self {
            id: value.id,
            slack_user_id: value.slack_user_id,
            slack_name: value.slack_name,
            channel_id: value.channel_id,
            channel: value.channel,
            created_at: value.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = standup_users)]
struct NewStandupUser<'a> {
    slack_user_id: &'a str,
    slack_name: &'a str,
    channel_id: &'a str,
    channel: &'a str,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standup_times)]
struct DbStandupTime {
    id: i64,
    channel_id: String,
    channel: String,
    time: i64,
    updated_at: DateTime<Utc>,
}

impl From<DbStandupTime> for StandupTime {
    fn from(value: DbStandupTime) -> Self {
        Self {
            id: value.id,
            channel_id: value.channel_id,
            channel: value.channel,
            time: value.time,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = standup_times)]
struct NewStandupTime<'a> {
    channel_id: &'a str,
    channel: &'a str,
    time: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standups)]
struct DbStandup {
    id: i64,
    channel_id: String,
    user_id: String,
    comment: String,
    message_ts: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DbStandup> for Standup {
    fn from(value: DbStandup) -> Self {
        Self {
            id: value.id,
            channel_id: value.channel_id,
            user_id: value.user_id,
            comment: value.comment,
            message_ts: value.message_ts,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = standups)]
struct NewStandup<'a> {
    channel_id: &'a str,
    user_id: &'a str,
    comment: &'a str,
    message_ts: &'a str,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = standups)]
struct UpdateStandup<'a> {
    comment: &'a str,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standup_edit_history)]
struct DbStandupEditHistory {
    id: i64,
    standup_id: i64,
    standup_text: String,
    created_at: DateTime<Utc>,
}

impl From<DbStandupEditHistory> for StandupEditHistory {
    fn from(value: DbStandupEditHistory) -> Self {
        Self {
            id: value.id,
            standup_id: value.standup_id,
            standup_text: value.standup_text,
            created_at: value.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = standup_edit_history)]
struct NewStandupEditHistory<'a> {
    standup_id: i64,
    standup_text: &'a str,
    created_at: DateTime<Utc>,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresUserStore {
    pool: Pool,
}

impl PostgresUserStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::UserStore for PostgresUserStore {
    async fn create_user(&self, user: &User) -> Result<bool, DatabaseError> {
        let pool = self.pool.clone();
        let user = user.clone();
        with_connection(pool, move |conn| {
            let new_user = NewUser {
                user_id: &user.user_id,
                user_name: &user.user_name,
                role: user.role.as_str(),
                created_at: &user.created_at,
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
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            diesel::delete(users::table.filter(users::id.eq(id)))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_user_by_slack_id(&self, user_id: &str) -> Result<Option<User>, DatabaseError> {
        let pool = self.pool.clone();
        let slack_id = user_id.to_string();
        with_connection(pool, move |conn| {
            users::table
                .filter(users::user_id.eq(slack_id))
                .select(DbUser::as_select())
                .first::<DbUser>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn get_user_by_name(&self, user_name: &str) -> Result<Option<User>, DatabaseError> {
        let pool = self.pool.clone();
        let name = user_name.to_string();
        with_connection(pool, move |conn| {
            users::table
                .filter(users::user_name.eq(name))
                .order(users::id.asc())
                .select(DbUser::as_select())
                .first::<DbUser>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            users::table
                .order(users::id.asc())
                .select(DbUser::as_select())
                .load::<DbUser>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresStandupUserStore {
    pool: Pool,
}

impl PostgresStandupUserStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::StandupUserStore for PostgresStandupUserStore {
    async fn create_standup_user(&self, user: &StandupUser) -> Result<bool, DatabaseError> {
        let pool = self.pool.clone();
        let user = user.clone();
        with_connection(pool, move |conn| {
            let new_user = NewStandupUser {
                slack_user_id: &user.slack_user_id,
                slack_name: &user.slack_name,
                channel_id: &user.channel_id,
                channel: &user.channel,
                created_at: &user.created_at,
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
        let pool = self.pool.clone();
        let name = slack_name.to_string();
        let channel = channel_id.to_string();
        with_connection(pool, move |conn| {
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
        let pool = self.pool.clone();
        let channel = channel_id.to_string();
        with_connection(pool, move |conn| {
            standup_users::table
                .filter(standup_users::channel_id.eq(channel))
                .order(standup_users::id.asc())
                .select(DbStandupUser::as_select())
                .load::<DbStandupUser>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn find_standup_user_in_channel(
        &self,
        slack_name: &str,
        channel_id: &str,
    ) -> Result<Option<StandupUser>, DatabaseError> {
        let pool = self.pool.clone();
        let name = slack_name.to_string();
        let channel = channel_id.to_string();
        with_connection(pool, move |conn| {
            standup_users::table
                .filter(standup_users::slack_name.eq(name))
                .filter(standup_users::channel_id.eq(channel))
                .select(DbStandupUser::as_select())
                .first::<DbStandupUser>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresStandupTimeStore {
    pool: Pool,
}

impl PostgresStandupTimeStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::StandupTimeStore for PostgresStandupTimeStore {
    async fn upsert_standup_time(
        &self,
        channel_id: &str,
        channel_name: &str,
        time: i64,
    ) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let channel_id = channel_id.to_string();
        let channel_name = channel_name.to_string();
        with_connection(pool, move |conn| {
            let now = Utc::now();
            let new_time = NewStandupTime {
                channel_id: &channel_id,
                channel: &channel_name,
                time,
                updated_at: now,
            };

            diesel::insert_into(standup_times::table)
                .values(&new_time)
                .on_conflict(standup_times::channel_id)
                .do_update()
                .set((
                    standup_times::channel.eq(&channel_name),
                    standup_times::time.eq(time),
                    standup_times::updated_at.eq(now),
                ))
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_standup_time(&self, channel_id: &str) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let channel = channel_id.to_string();
        with_connection(pool, move |conn| {
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
        let pool = self.pool.clone();
        let channel = channel_id.to_string();
        with_connection(pool, move |conn| {
            standup_times::table
                .filter(standup_times::channel_id.eq(channel))
                .select(DbStandupTime::as_select())
                .first::<DbStandupTime>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct PostgresStandupStore {
    pool: Pool,
}

impl PostgresStandupStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::StandupStore for PostgresStandupStore {
    async fn create_standup(&self, standup: &Standup) -> Result<Standup, DatabaseError> {
        let pool = self.pool.clone();
        let standup = standup.clone();
        with_connection(pool, move |conn| {
            let new_standup = NewStandup {
                channel_id: &standup.channel_id,
                user_id: &standup.user_id,
                comment: &standup.comment,
                message_ts: &standup.message_ts,
                created_at: &standup.created_at,
                updated_at: &standup.updated_at,
            };

            diesel::insert_into(standups::table)
                .values(&new_standup)
                .returning(DbStandup::as_returning())
                .get_result::<DbStandup>(conn)
                .map(Into::into)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn update_standup(&self, standup: &Standup) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        let standup = standup.clone();
        with_connection(pool, move |conn| {
            let changes = UpdateStandup {
                comment: &standup.comment,
                updated_at: Utc::now(),
            };

            let updated = diesel::update(standups::table.filter(standups::id.eq(standup.id)))
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
        let pool = self.pool.clone();
        let message_ts = message_ts.to_string();
        with_connection(pool, move |conn| {
            standups::table
                .filter(standups::message_ts.eq(message_ts))
                .order(standups::id.desc())
                .select(DbStandup::as_select())
                .first::<DbStandup>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn append_edit_history(
        &self,
        standup_id: i64,
        prior_comment: &str,
    ) -> Result<StandupEditHistory, DatabaseError> {
        let pool = self.pool.clone();
        let prior_comment = prior_comment.to_string();
        with_connection(pool, move |conn| {
            let entry = NewStandupEditHistory {
                standup_id,
                standup_text: &prior_comment,
                created_at: Utc::now(),
            };

            diesel::insert_into(standup_edit_history::table)
                .values(&entry)
                .returning(DbStandupEditHistory::as_returning())
                .get_result::<DbStandupEditHistory>(conn)
                .map(Into::into)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_edit_history(
        &self,
        standup_id: i64,
    ) -> Result<Vec<StandupEditHistory>, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, move |conn| {
            standup_edit_history::table
                .filter(standup_edit_history::standup_id.eq(standup_id))
                .order(standup_edit_history::id.asc())
                .select(DbStandupEditHistory::as_select())
                .load::<DbStandupEditHistory>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_standups_by_channel_in_range(
        &self,
        channel_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Standup>, DatabaseError> {
        let pool = self.pool.clone();
        let channel = channel_id.to_string();
        with_connection(pool, move |conn| {
            standups::table
                .filter(standups::channel_id.eq(channel))
                .filter(standups::created_at.ge(from))
                .filter(standups::created_at.lt(until))
                .order((standups::created_at.asc(), standups::id.asc()))
                .select(DbStandup::as_select())
                .load::<DbStandup>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn list_standups_by_user_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Standup>, DatabaseError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        with_connection(pool, move |conn| {
            standups::table
                .filter(standups::user_id.eq(user))
                .filter(standups::created_at.ge(from))
                .filter(standups::created_at.lt(until))
                .order((standups::created_at.asc(), standups::id.asc()))
                .select(DbStandup::as_select())
                .load::<DbStandup>(conn)
                .map(|rows| rows.into_iter().map(Into::into).collect())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}
