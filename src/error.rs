use thiserror::Error;

/// Errors surfaced by the sender index builder and the bulk deleter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurgeError {
    /// Credentials are missing or expired. The caller must re-authorize, not retry.
    #[error("authorization required: {0}")]
    Auth(String),
    /// The mailbox provider failed. Retrying the whole operation is safe.
    #[error("mailbox provider error: {0}")]
    Provider(String),
    /// The caller passed something the engine cannot act on.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PurgeError {
    /// Human-readable message shown to the end user
    pub fn user_message(&self) -> String {
        match self {
            PurgeError::Auth(_) => {
                "Not authorized. Please re-authorize access to your mailbox.".to_string()
            }
            PurgeError::Provider(_) => {
                "Temporary failure talking to the mailbox provider. Please try again.".to_string()
            }
            PurgeError::InvalidInput(reason) => reason.clone(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, PurgeError::Auth(_))
    }
}

pub type Result<T, E = PurgeError> = std::result::Result<T, E>;
