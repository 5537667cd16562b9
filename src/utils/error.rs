use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input; the message is shown to the caller verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl AppError {
    /// Text safe to hand back to a chat user. Storage and transport details
    /// stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Storage(_) => {
                "Something went wrong while talking to the database".to_string()
            }
            AppError::Transport(_) => "Something went wrong while talking to Slack".to_string(),
        }
    }

    /// Input the caller can correct, as opposed to a failure on our side.
    pub fn is_user_error(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_text_is_passed_through() {
        let err = AppError::Validation("Wrong number of arguments".to_string());
        assert!(err.is_user_error());
        assert_eq!(err.user_message(), "Wrong number of arguments");
    }

    #[test]
    fn storage_details_are_hidden_from_users() {
        let err = AppError::from(DatabaseError::Query("relation missing".to_string()));
        assert!(!err.is_user_error());
        assert!(!err.user_message().contains("relation"));
        assert!(err.to_string().contains("relation missing"));
    }
}
