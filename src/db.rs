pub use self::error::DatabaseError;
pub use self::manager::{DatabaseManager, DbType};
pub use self::models::{Standup, StandupEditHistory, StandupTime, StandupUser, User, UserRole};
pub use self::stores::{StandupStore, StandupTimeStore, StandupUserStore, UserStore};

pub mod error;
pub mod manager;
pub mod models;
#[cfg(feature = "postgres")]
pub mod schema;
pub mod stores;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
