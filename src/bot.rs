use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::DatabaseManager;
use crate::utils::{AppError, ManagerNotifier};
use crate::web::metrics::Metrics;

pub mod classifier;
pub mod lifecycle;
pub mod membership;
pub mod report;
pub mod roster;

pub use self::classifier::{Classification, KeywordClassifier};
pub use self::lifecycle::{EditOutcome, PostOutcome, StandupLifecycle};
pub use self::membership::MembershipManager;
pub use self::report::{DateRange, ReportAggregator};
pub use self::roster::{RosterChange, RosterSync, reconcile};

/// Reaction added to a message once it has been stored as a standup.
pub const ACKNOWLEDGMENT_REACTION: &str = "heavy_check_mark";

/// Everything the chat transport can tell the bot about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Connected,
    MessagePosted {
        channel: String,
        user: String,
        text: String,
        message_ref: String,
    },
    MessageEdited {
        channel: String,
        original_ref: String,
        new_text: String,
    },
    MemberListChanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceMember {
    pub id: String,
    pub name: String,
    pub is_bot: bool,
    pub deleted: bool,
    pub is_admin: bool,
    pub is_owner: bool,
    pub is_primary_owner: bool,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), AppError>;
    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), AppError>;
    async fn add_acknowledgment(&self, channel_id: &str, message_ref: &str)
    -> Result<(), AppError>;
    async fn fetch_workspace_members(&self) -> Result<Vec<WorkspaceMember>, AppError>;
}

/// Sequential consumer of chat events.
pub struct StandupBot {
    lifecycle: StandupLifecycle,
    roster: RosterSync,
    transport: Arc<dyn ChatTransport>,
    notifier: Option<ManagerNotifier>,
}

impl StandupBot {
    pub fn new(
        config: &Config,
        db_manager: &DatabaseManager,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let classifier = Arc::new(KeywordClassifier::from_config(&config.keywords));
        let notifier = config
            .bot
            .manager_slack_user_id
            .as_ref()
            .map(|manager_id| {
                ManagerNotifier::new(
                    transport.clone(),
                    manager_id.clone(),
                    config.messages.hello_manager.clone(),
                )
            });

        Self {
            lifecycle: StandupLifecycle::new(classifier, db_manager.standup_store()),
            roster: RosterSync::new(db_manager.user_store(), transport.clone()),
            transport,
            notifier,
        }
    }

    /// Drains `events` one at a time until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<ChatEvent>) {
        info!("standup bot is processing events");
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("event stream closed, standup bot stopping");
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        let result = match event {
            ChatEvent::Connected => self.on_connected().await,
            ChatEvent::MessagePosted {
                channel,
                user,
                text,
                message_ref,
            } => {
                self.on_message_posted(&channel, &user, &text, &message_ref)
                    .await
            }
            ChatEvent::MessageEdited {
                channel,
                original_ref,
                new_text,
            } => {
                self.on_message_edited(&channel, &original_ref, &new_text)
                    .await
            }
            ChatEvent::MemberListChanged => self.sync_roster().await,
        };

        if let Err(err) = result {
            Metrics::event_failed();
            error!("failed to handle chat event: {err}");
        }
    }

    async fn on_connected(&self) -> Result<(), AppError> {
        info!("connected to slack");
        if let Some(notifier) = &self.notifier
            && let Err(err) = notifier.greet().await
        {
            warn!("failed to greet manager: {err}");
        }
        self.sync_roster().await
    }

    async fn sync_roster(&self) -> Result<(), AppError> {
        self.roster.sync().await?;
        Metrics::roster_synced();
        Ok(())
    }

    async fn on_message_posted(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        message_ref: &str,
    ) -> Result<(), AppError> {
        let PostOutcome::Created(_) = self
            .lifecycle
            .handle_posted(channel, user, text, message_ref)
            .await?
        else {
            return Ok(());
        };
        Metrics::standup_created();

        if let Err(err) = self.transport.add_acknowledgment(channel, message_ref).await {
            warn!(channel, message_ref, "failed to acknowledge standup: {err}");
        }
        Ok(())
    }

    async fn on_message_edited(
        &self,
        channel: &str,
        original_ref: &str,
        new_text: &str,
    ) -> Result<(), AppError> {
        match self
            .lifecycle
            .handle_edited(channel, original_ref, new_text)
            .await
        {
            Ok(EditOutcome::Updated(_)) => {
                Metrics::edit_applied();
                Ok(())
            }
            Ok(EditOutcome::Retained(_)) => {
                Metrics::edit_retained();
                Ok(())
            }
            Err(AppError::NotFound(msg)) => {
                Metrics::edit_dropped();
                error!(channel, original_ref, "dropping edit: {msg}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::*;

    /// Records every outbound call and serves a fixed member list.
    #[derive(Default)]
    pub struct MockTransport {
        pub members: Mutex<Vec<WorkspaceMember>>,
        pub messages: Mutex<Vec<(String, String)>>,
        pub direct_messages: Mutex<Vec<(String, String)>>,
        pub acknowledgments: Mutex<Vec<(String, String)>>,
        pub fail_acknowledgments: bool,
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), AppError> {
            self.messages
                .lock()
                .push((channel_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), AppError> {
            self.direct_messages
                .lock()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn add_acknowledgment(
            &self,
            channel_id: &str,
            message_ref: &str,
        ) -> Result<(), AppError> {
            if self.fail_acknowledgments {
                return Err(AppError::Transport("reactions.add failed".to_string()));
            }
            self.acknowledgments
                .lock()
                .push((channel_id.to_string(), message_ref.to_string()));
            Ok(())
        }

        async fn fetch_workspace_members(&self) -> Result<Vec<WorkspaceMember>, AppError> {
            Ok(self.members.lock().clone())
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::testing::MockTransport;
    use super::*;
    use crate::config::Config;

    const CONFIG: &str = r#"
bot:
  manager_slack_user_id: "UBOSS"
auth:
  bot_token: "xoxb-1"
  app_token: "xapp-1"
database:
  url: "sqlite://unused.db"
keywords:
  problems: ["Problem"]
  yesterday: ["Yesterday"]
  today: ["Today"]
messages:
  hello_manager: "hi boss"
"#;

    const REPORT: &str = "Yesterday X. Today Y. Problem: none.";

    async fn bot_with(
        transport: Arc<MockTransport>,
    ) -> (tempfile::TempDir, DatabaseManager, StandupBot) {
        let config = Config::load_from_str(CONFIG).unwrap();
        let (dir, db) = DatabaseManager::sqlite_for_tests().await;
        let bot = StandupBot::new(&config, &db, transport);
        (dir, db, bot)
    }

    fn posted(text: &str, message_ref: &str) -> ChatEvent {
        ChatEvent::MessagePosted {
            channel: "C1".to_string(),
            user: "U1".to_string(),
            text: text.to_string(),
            message_ref: message_ref.to_string(),
        }
    }

    #[tokio::test]
    async fn standup_is_stored_and_acknowledged() {
        let transport = Arc::new(MockTransport::default());
        let (_dir, db, bot) = bot_with(transport.clone()).await;

        bot.handle_event(posted(REPORT, "1.1")).await;
        bot.handle_event(posted("lunch?", "1.2")).await;

        assert_eq!(
            *transport.acknowledgments.lock(),
            vec![("C1".to_string(), "1.1".to_string())]
        );
        assert!(db.standup_store().find_standup_by_message_ref("1.1").await.unwrap().is_some());
        assert!(db.standup_store().find_standup_by_message_ref("1.2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_acknowledgment_keeps_standup() {
        let transport = Arc::new(MockTransport {
            fail_acknowledgments: true,
            ..MockTransport::default()
        });
        let (_dir, db, bot) = bot_with(transport).await;

        bot.handle_event(posted(REPORT, "3.1")).await;
        assert!(db.standup_store().find_standup_by_message_ref("3.1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn connect_greets_manager_and_syncs_roster() {
        let transport = Arc::new(MockTransport::default());
        transport.members.lock().push(WorkspaceMember {
            id: "U1".to_string(),
            name: "alice".to_string(),
            is_admin: true,
            ..WorkspaceMember::default()
        });
        let (_dir, db, bot) = bot_with(transport.clone()).await;

        bot.handle_event(ChatEvent::Connected).await;
        bot.handle_event(ChatEvent::Connected).await;

        assert_eq!(transport.direct_messages.lock().len(), 2);
        assert_eq!(transport.direct_messages.lock()[0].1, "hi boss");
        let users = db.user_store().list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, crate::db::UserRole::Admin);
    }

    #[tokio::test]
    async fn events_are_processed_in_order() {
        let transport = Arc::new(MockTransport::default());
        let (_dir, db, bot) = bot_with(transport).await;
        let (tx, rx) = mpsc::channel(8);

        let revised = "Yesterday X2. Today Y2. Problem: none.";
        tx.send(posted(REPORT, "2.1")).await.unwrap();
        tx.send(ChatEvent::MessageEdited {
            channel: "C1".to_string(),
            original_ref: "2.1".to_string(),
            new_text: revised.to_string(),
        })
        .await
        .unwrap();
        tx.send(ChatEvent::MessageEdited {
            channel: "C1".to_string(),
            original_ref: "missing".to_string(),
            new_text: revised.to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        bot.run(rx).await;

        let stored = db
            .standup_store()
            .find_standup_by_message_ref("2.1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.comment, revised);
        let history = db.standup_store().list_edit_history(stored.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].standup_text, REPORT);
    }
}
