pub use self::parser::{
    AuthConfig, BotConfig, Config, DatabaseConfig, DbType, KeywordsConfig, LimitsConfig,
    LoggingConfig, MessagesConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
