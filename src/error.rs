use thiserror::Error;

use crate::model::{ConversationId, MessageId, UserId};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type StoreResult<T> = Result<T, StoreError>;
pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Worth re-attempting: busy or locked database, exhausted pool, I/O hiccup.
    #[error("storage temporarily unavailable: {0}")]
    Transient(#[source] BoxError),
    #[error("storage failure: {0}")]
    Backend(#[source] BoxError),
    #[error("malformed stored record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("user {user} is not a participant of conversation {conversation}")]
    NotParticipant {
        user: UserId,
        conversation: ConversationId,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("user {user} did not send message {message}")]
    NotSender { user: UserId, message: MessageId },

    #[error("parent message {parent} is not part of conversation {conversation}")]
    InvalidParent {
        parent: MessageId,
        conversation: ConversationId,
    },

    #[error("a conversation needs at least two distinct participants, this change leaves {remaining}")]
    InsufficientParticipants { remaining: usize },

    #[error("message body is empty")]
    EmptyBody,

    #[error("notification fan-out failed for message {message}: {source}")]
    FanoutFailed {
        message: MessageId,
        #[source]
        source: StoreError,
    },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ChatError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ChatError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Storage(source) | ChatError::FanoutFailed { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }

    /// What a transient failure becomes once the retry is spent.
    pub(crate) fn exhausted(self) -> Self {
        match self {
            ChatError::Storage(source) if source.is_transient() => {
                ChatError::StorageUnavailable(source)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> StoreError {
        StoreError::Transient("database is locked".into())
    }

    #[test]
    fn only_storage_failures_are_transient() {
        assert!(ChatError::Storage(transient()).is_transient());
        assert!(
            ChatError::FanoutFailed {
                message: MessageId::new(),
                source: transient()
            }
            .is_transient()
        );
        assert!(!ChatError::Storage(StoreError::Corrupt("bad uuid".into())).is_transient());
        assert!(!ChatError::EmptyBody.is_transient());
    }

    #[test]
    fn exhausted_retry_reports_unavailable() {
        let err = ChatError::Storage(transient()).exhausted();
        assert!(matches!(err, ChatError::StorageUnavailable(_)));

        let err = ChatError::FanoutFailed {
            message: MessageId::new(),
            source: transient(),
        }
        .exhausted();
        assert!(matches!(err, ChatError::FanoutFailed { .. }));
    }
}
