use std::sync::Arc;

use tracing::{debug, info};

use crate::bot::ChatTransport;
use crate::utils::AppError;

/// Sends direct messages to the configured manager.
pub struct ManagerNotifier {
    transport: Arc<dyn ChatTransport>,
    manager_id: String,
    greeting: String,
}

impl ManagerNotifier {
    pub fn new(transport: Arc<dyn ChatTransport>, manager_id: String, greeting: String) -> Self {
        Self {
            transport,
            manager_id,
            greeting,
        }
    }

    pub async fn greet(&self) -> Result<(), AppError> {
        self.notify(&self.greeting).await
    }

    pub async fn notify(&self, message: &str) -> Result<(), AppError> {
        info!("sending manager notification to {}", self.manager_id);
        self.transport
            .send_direct_message(&self.manager_id, message)
            .await?;
        debug!("manager notification sent to {}", self.manager_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::MockTransport;

    #[tokio::test]
    async fn greeting_goes_to_manager() {
        let transport = Arc::new(MockTransport::default());
        let notifier =
            ManagerNotifier::new(transport.clone(), "UBOSS".to_string(), "hello".to_string());

        notifier.greet().await.unwrap();
        notifier.notify("standup time is near").await.unwrap();

        let sent = transport.direct_messages.lock().clone();
        assert_eq!(
            sent,
            vec![
                ("UBOSS".to_string(), "hello".to_string()),
                ("UBOSS".to_string(), "standup time is near".to_string()),
            ]
        );
    }
}
