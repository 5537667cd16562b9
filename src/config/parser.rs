use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Slack user id that receives a greeting DM each time the bot connects.
    #[serde(default)]
    pub manager_slack_user_id: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            manager_slack_user_id: None,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub bot_token: String,
    #[serde(default)]
    pub app_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        if self.connection_string().starts_with("sqlite://") {
            DbType::Sqlite
        } else {
            DbType::Postgres
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

/// Phrases that mark each of the three parts of a standup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeywordsConfig {
    #[serde(default = "default_problem_keywords")]
    pub problems: Vec<String>,
    #[serde(default = "default_yesterday_keywords")]
    pub yesterday: Vec<String>,
    #[serde(default = "default_today_keywords")]
    pub today: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            problems: default_problem_keywords(),
            yesterday: default_yesterday_keywords(),
            today: default_today_keywords(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesConfig {
    #[serde(default = "default_hello_manager")]
    pub hello_manager: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            hello_manager: default_hello_manager(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_slack_send_delay")]
    pub slack_send_delay: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            slack_send_delay: default_slack_send_delay(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(&path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.bot_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }
        if looks_like_placeholder_bot_token(&self.auth.bot_token) {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token is still using a placeholder value; set a real Slack bot token"
                    .to_string(),
            ));
        }
        if self
            .auth
            .app_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .is_none()
        {
            return Err(ConfigError::InvalidConfig(
                "auth.app_token cannot be empty for Slack Socket Mode (xapp- token)".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.bot.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "bot.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.limits.event_buffer == 0 {
            return Err(ConfigError::InvalidConfig(
                "limits.event_buffer must be greater than zero".to_string(),
            ));
        }

        for (name, set) in [
            ("problems", &self.keywords.problems),
            ("yesterday", &self.keywords.yesterday),
            ("today", &self.keywords.today),
        ] {
            if set.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "keywords.{name} must contain at least one phrase"
                )));
            }
        }

        Ok(())
    }

    fn normalize(&mut self) {
        self.auth.bot_token = sanitize_bot_token(&self.auth.bot_token);
        for set in [
            &mut self.keywords.problems,
            &mut self.keywords.yesterday,
            &mut self.keywords.today,
        ] {
            set.retain(|phrase| !phrase.is_empty());
        }
        if self.bot.debug {
            self.logging.level = "debug".to_string();
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("COMEDIAN_SLACK_TOKEN") {
            self.auth.bot_token = sanitize_bot_token(&value);
        }
        if let Ok(value) = std::env::var("COMEDIAN_APP_TOKEN") {
            self.auth.app_token = Some(value);
        }
        if let Ok(value) = std::env::var("COMEDIAN_DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Ok(value) = std::env::var("COMEDIAN_HTTP_BIND_ADDR")
            && let Some((host, port)) = split_bind_addr(&value)
        {
            self.bot.bind_address = host;
            self.bot.port = port;
        }
        if let Ok(value) = std::env::var("COMEDIAN_MANAGER_SLACK_USER_ID") {
            self.bot.manager_slack_user_id = Some(value).filter(|v| !v.trim().is_empty());
        }
        if let Ok(value) = std::env::var("COMEDIAN_DEBUG") {
            self.bot.debug = matches!(value.trim(), "1" | "true" | "TRUE" | "True");
        }
    }
}

fn split_bind_addr(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.trim().rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = if host.is_empty() { default_bind_address() } else { host.to_string() };
    Some((host, port))
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_problem_keywords() -> Vec<String> {
    ["problem", "Problem", "issue", "Issue", "blocked", "Blocked"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_yesterday_keywords() -> Vec<String> {
    ["yesterday", "Yesterday", "friday", "Friday"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_today_keywords() -> Vec<String> {
    ["today", "Today"].into_iter().map(String::from).collect()
}

fn default_hello_manager() -> String {
    "Hello, manager! I am online and collecting standups.".to_string()
}

fn default_slack_send_delay() -> u64 {
    1500
}

fn default_event_buffer() -> usize {
    256
}

fn sanitize_bot_token(token: &str) -> String {
    let trimmed = token.trim();
    let without_prefix = trimmed
        .strip_prefix("Bot ")
        .or_else(|| trimmed.strip_prefix("bot "))
        .unwrap_or(trimmed);
    without_prefix.trim().to_string()
}

fn looks_like_placeholder_bot_token(token: &str) -> bool {
    let lower = token.trim().to_ascii_lowercase();
    lower == "your_slack_bot_token"
        || lower == "your_bot_token_here"
        || lower == "your_bot_token"
        || lower == "your-token-here"
        || lower == "changeme"
}
