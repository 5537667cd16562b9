use serde::Deserialize;
use tracing::{error, info, warn};

use crate::bot::{DateRange, MembershipManager, ReportAggregator};
use crate::db::DatabaseManager;
use crate::parsers::{ParsedCommand, parse_channel_ref, parse_user_mention, parse_user_name};
use crate::utils::AppError;
use crate::web::metrics::Metrics;

pub const COMMAND_ADD_USER: &str = "/comedianadd";
pub const COMMAND_REMOVE_USER: &str = "/comedianremove";
pub const COMMAND_LIST_USERS: &str = "/comedianlist";
pub const COMMAND_ADD_TIME: &str = "/standuptimeset";
pub const COMMAND_REMOVE_TIME: &str = "/standuptimeremove";
pub const COMMAND_LIST_TIME: &str = "/standuptime";
pub const COMMAND_REPORT_BY_PROJECT: &str = "/comedian_report_by_project";
pub const COMMAND_REPORT_BY_USER: &str = "/comedian_report_by_user";

/// Fields Slack posts for a slash command. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlashCommandForm {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
}

impl SlashCommandForm {
    fn require_channel(&self) -> Result<(), AppError> {
        if self.channel_id.trim().is_empty() {
            return Err(AppError::Validation("channel_id cannot be empty".to_string()));
        }
        Ok(())
    }

    fn require_channel_name(&self) -> Result<(), AppError> {
        self.require_channel()?;
        if self.channel_name.trim().is_empty() {
            return Err(AppError::Validation("channel_name cannot be empty".to_string()));
        }
        Ok(())
    }

    fn require_text(&self) -> Result<&str, AppError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("text cannot be empty".to_string()));
        }
        Ok(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub status: u16,
    pub body: String,
}

impl CommandReply {
    fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

pub struct SlashCommandHandler {
    membership: MembershipManager,
    reports: ReportAggregator,
}

impl SlashCommandHandler {
    pub fn new(db_manager: &DatabaseManager) -> Self {
        Self {
            membership: MembershipManager::new(
                db_manager.standup_user_store(),
                db_manager.standup_time_store(),
            ),
            reports: ReportAggregator::new(db_manager.standup_store(), db_manager.user_store()),
        }
    }

    pub async fn handle(&self, form: &SlashCommandForm) -> CommandReply {
        let Some(command) = form
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return CommandReply {
                status: 405,
                body: "Command not allowed".to_string(),
            };
        };

        let result = match command {
            COMMAND_ADD_USER => self.add_user(form).await,
            COMMAND_REMOVE_USER => self.remove_user(form).await,
            COMMAND_LIST_USERS => self.list_users(form).await,
            COMMAND_ADD_TIME => self.add_time(form).await,
            COMMAND_REMOVE_TIME => self.remove_time(form).await,
            COMMAND_LIST_TIME => self.list_time(form).await,
            COMMAND_REPORT_BY_PROJECT => self.report_by_project(form).await,
            COMMAND_REPORT_BY_USER => self.report_by_user(form).await,
            _ => {
                warn!(command, "unknown slash command");
                return CommandReply {
                    status: 501,
                    body: "Not implemented".to_string(),
                };
            }
        };

        match result {
            Ok(body) => {
                Metrics::command_handled();
                info!(command, channel_id = %form.channel_id, "slash command handled");
                CommandReply::ok(body)
            }
            Err(err) => {
                Metrics::command_failed();
                if err.is_user_error() {
                    info!(command, "slash command rejected: {err}");
                } else {
                    error!(
                        command,
                        channel_id = %form.channel_id,
                        "slash command failed: {err}"
                    );
                }
                // Slack only displays the body of a 200 response.
                CommandReply::ok(err.user_message())
            }
        }
    }

    async fn add_user(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel_name()?;
        let (slack_user_id, slack_name) = parse_user_mention(form.require_text()?)?;
        let outcome = self
            .membership
            .add_standup_user(&form.channel_id, &form.channel_name, &slack_user_id, &slack_name)
            .await?;
        Ok(outcome.to_string())
    }

    async fn remove_user(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel()?;
        let slack_name = parse_user_name(form.require_text()?)?;
        let outcome = self
            .membership
            .remove_standup_user(&form.channel_id, &slack_name)
            .await?;
        Ok(outcome.to_string())
    }

    async fn list_users(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel()?;
        Ok(self
            .membership
            .list_standup_users(&form.channel_id)
            .await?
            .to_string())
    }

    async fn add_time(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel_name()?;
        let outcome = self
            .membership
            .set_standup_time(&form.channel_id, &form.channel_name, form.require_text()?)
            .await?;
        Ok(outcome.to_string())
    }

    async fn remove_time(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel_name()?;
        Ok(self
            .membership
            .remove_standup_time(&form.channel_id, &form.channel_name)
            .await?
            .to_string())
    }

    async fn list_time(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel()?;
        Ok(self
            .membership
            .get_standup_time(&form.channel_id)
            .await?
            .to_string())
    }

    async fn report_by_project(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel()?;
        let parsed = ParsedCommand::new(COMMAND_REPORT_BY_PROJECT, &form.text);
        let args = parsed.expect_args(3)?;
        let channel_id = parse_channel_ref(&args[0])?;
        let range = DateRange::parse(&args[1], &args[2])?;
        self.reports.report_by_project(&channel_id, range).await
    }

    async fn report_by_user(&self, form: &SlashCommandForm) -> Result<String, AppError> {
        form.require_channel()?;
        let parsed = ParsedCommand::new(COMMAND_REPORT_BY_USER, &form.text);
        let args = parsed.expect_args(3)?;
        let user_name = parse_user_name(&args[0])?;
        let range = DateRange::parse(&args[1], &args[2])?;
        self.reports.report_by_user(&user_name, range).await
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    fn form(command: &str, text: &str) -> SlashCommandForm {
        SlashCommandForm {
            command: Some(command.to_string()),
            text: text.to_string(),
            channel_id: "C1".to_string(),
            channel_name: "general".to_string(),
            ..SlashCommandForm::default()
        }
    }

    async fn handler() -> (tempfile::TempDir, SlashCommandHandler) {
        let (dir, db) = DatabaseManager::sqlite_for_tests().await;
        (dir, SlashCommandHandler::new(&db))
    }

    #[tokio::test]
    async fn missing_command_is_not_allowed() {
        let (_dir, handler) = handler().await;
        let reply = handler.handle(&SlashCommandForm::default()).await;
        assert_eq!(reply.status, 405);
    }

    #[tokio::test]
    async fn unknown_command_is_not_implemented() {
        let (_dir, handler) = handler().await;
        let reply = handler.handle(&form("/dance", "")).await;
        assert_eq!(
            reply,
            CommandReply {
                status: 501,
                body: "Not implemented".to_string()
            }
        );
    }

    #[tokio::test]
    async fn add_list_remove_round_trip() {
        let (_dir, handler) = handler().await;

        let reply = handler.handle(&form(COMMAND_ADD_USER, "<@U1|alice>")).await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.body,
            "<@alice> added, but there is no standup time for this channel"
        );

        let reply = handler.handle(&form(COMMAND_ADD_USER, "<@U1|alice>")).await;
        assert_eq!(reply.body, "User already exists!");

        let reply = handler.handle(&form(COMMAND_LIST_USERS, "")).await;
        assert_eq!(reply.body, "Standupers in this channel: <@alice>");

        let reply = handler.handle(&form(COMMAND_REMOVE_USER, "@alice")).await;
        assert_eq!(reply.body, "<@alice> deleted");

        let reply = handler.handle(&form(COMMAND_LIST_USERS, "")).await;
        assert!(reply.body.starts_with("No standupers in this channel!"));
    }

    #[tokio::test]
    async fn time_commands() {
        let (_dir, handler) = handler().await;

        let reply = handler.handle(&form(COMMAND_LIST_TIME, "")).await;
        assert!(reply.body.starts_with("No standup time set for this channel yet!"));

        let reply = handler.handle(&form(COMMAND_ADD_TIME, "09:00")).await;
        assert_eq!(reply.status, 200);

        let reply = handler.handle(&form(COMMAND_LIST_TIME, "")).await;
        assert_eq!(reply.body, "standup time at 09:00 (UTC)");

        let reply = handler.handle(&form(COMMAND_REMOVE_TIME, "")).await;
        assert_eq!(reply.body, "standup time for general channel deleted");
    }

    #[tokio::test]
    async fn malformed_input_is_a_validation_error() {
        let (_dir, handler) = handler().await;

        let reply = handler.handle(&form(COMMAND_ADD_TIME, "25:99")).await;
        assert_eq!(reply.status, 200);
        assert!(!reply.body.is_empty());

        let reply = handler
            .handle(&form(COMMAND_REPORT_BY_PROJECT, "<#C1|general> 2026-03-01"))
            .await;
        assert_eq!(reply, CommandReply::ok("Wrong number of arguments"));

        let reply = handler
            .handle(&form(
                COMMAND_REPORT_BY_PROJECT,
                "<#C1|general> 2026-03-09 2026-03-01",
            ))
            .await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "start date 2026-03-09 is after end date 2026-03-01");
    }

    #[tokio::test]
    async fn empty_project_report_is_not_blank() {
        let (_dir, handler) = handler().await;
        let reply = handler
            .handle(&form(
                COMMAND_REPORT_BY_PROJECT,
                "<#C1|general> 2026-03-01 2026-03-09",
            ))
            .await;
        assert_eq!(reply.status, 200);
        assert!(reply.body.starts_with("No standups found"));
    }

    #[tokio::test]
    async fn report_for_unknown_user_is_not_found() {
        let (_dir, handler) = handler().await;
        let reply = handler
            .handle(&form(
                COMMAND_REPORT_BY_USER,
                "<@U9|ghost> 2026-03-01 2026-03-09",
            ))
            .await;
        assert_eq!(reply, CommandReply::ok("User ghost not found"));
    }
}
