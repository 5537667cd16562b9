use std::sync::Arc;

use tracing::{debug, info};

use super::classifier::KeywordClassifier;
use crate::db::{Standup, StandupStore};
use crate::utils::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Created(Standup),
    /// The message did not classify as a standup.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Updated(Standup),
    /// History was recorded but the new text no longer classifies, so the
    /// stored comment stays as it was.
    Retained(Standup),
}

/// Creates standups from posted messages and applies edits to them.
pub struct StandupLifecycle {
    classifier: Arc<KeywordClassifier>,
    standups: Arc<dyn StandupStore>,
}

impl StandupLifecycle {
    pub fn new(classifier: Arc<KeywordClassifier>, standups: Arc<dyn StandupStore>) -> Self {
        Self {
            classifier,
            standups,
        }
    }

    pub async fn handle_posted(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
        message_ref: &str,
    ) -> Result<PostOutcome, AppError> {
        let classification = self.classifier.classify(text);
        if !classification.is_standup {
            debug!(channel_id, user_id, "message is not a standup");
            return Ok(PostOutcome::Ignored);
        }

        let standup = self
            .standups
            .create_standup(&Standup::new(
                channel_id.to_string(),
                user_id.to_string(),
                classification.text,
                message_ref.to_string(),
            ))
            .await?;

        info!(
            standup_id = standup.id,
            channel_id, user_id, "standup created"
        );
        Ok(PostOutcome::Created(standup))
    }

    /// History is appended with the stored comment before anything else is
    /// written, so every overwrite has its prior text recorded.
    pub async fn handle_edited(
        &self,
        channel_id: &str,
        original_ref: &str,
        new_text: &str,
    ) -> Result<EditOutcome, AppError> {
        let mut standup = self
            .standups
            .find_standup_by_message_ref(original_ref)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no standup for message {original_ref} in channel {channel_id}"
                ))
            })?;

        self.standups
            .append_edit_history(standup.id, &standup.comment)
            .await?;

        let classification = self.classifier.classify(new_text);
        if !classification.is_standup {
            info!(
                standup_id = standup.id,
                "edited text no longer classifies, keeping stored comment"
            );
            return Ok(EditOutcome::Retained(standup));
        }

        standup.comment = classification.text;
        self.standups.update_standup(&standup).await?;
        info!(standup_id = standup.id, channel_id, "standup updated");
        Ok(EditOutcome::Updated(standup))
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::DatabaseManager;

    const REPORT: &str = "Yesterday I fixed bug X. Today I will write tests. Problem: none.";
    const REVISED: &str = "Yesterday I fixed bug Y. Today I will deploy. Problem: none.";

    fn classifier() -> Arc<KeywordClassifier> {
        Arc::new(KeywordClassifier::new(
            vec!["Problem".to_string()],
            vec!["Yesterday".to_string()],
            vec!["Today".to_string()],
        ))
    }

    #[tokio::test]
    async fn non_standup_is_ignored() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let lifecycle = StandupLifecycle::new(classifier(), db.standup_store());

        let outcome = lifecycle
            .handle_posted("C1", "U1", "hello there", "1.0")
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Ignored);
        assert!(
            db.standup_store()
                .find_standup_by_message_ref("1.0")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn edits_record_prior_comment_in_order() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_store();
        let lifecycle = StandupLifecycle::new(classifier(), store.clone());

        let PostOutcome::Created(created) = lifecycle
            .handle_posted("C1", "U1", &format!("  {REPORT}  "), "1.0")
            .await
            .unwrap()
        else {
            panic!("expected a standup to be created");
        };
        assert_eq!(created.comment, REPORT);

        let outcome = lifecycle.handle_edited("C1", "1.0", REVISED).await.unwrap();
        assert!(matches!(outcome, EditOutcome::Updated(ref s) if s.comment == REVISED));

        let third = "Yesterday Z. Today W. Problem: review.";
        lifecycle.handle_edited("C1", "1.0", third).await.unwrap();

        let history = store.list_edit_history(created.id).await.unwrap();
        let texts: Vec<_> = history.iter().map(|h| h.standup_text.as_str()).collect();
        assert_eq!(texts, vec![REPORT, REVISED]);

        let stored = store.find_standup_by_message_ref("1.0").await.unwrap().unwrap();
        assert_eq!(stored.comment, third);
    }

    #[tokio::test]
    async fn edit_that_stops_classifying_keeps_comment() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let store = db.standup_store();
        let lifecycle = StandupLifecycle::new(classifier(), store.clone());
        lifecycle.handle_posted("C1", "U1", REPORT, "2.0").await.unwrap();

        let outcome = lifecycle.handle_edited("C1", "2.0", "oops").await.unwrap();
        let EditOutcome::Retained(standup) = outcome else {
            panic!("expected the stored comment to be retained");
        };
        assert_eq!(standup.comment, REPORT);
        assert_eq!(store.list_edit_history(standup.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edit_of_unknown_message_is_not_found() {
        let (_dir, db) = DatabaseManager::sqlite_for_tests().await;
        let lifecycle = StandupLifecycle::new(classifier(), db.standup_store());

        let err = lifecycle.handle_edited("C1", "404.0", REPORT).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
