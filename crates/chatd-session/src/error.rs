use thiserror::Error;

use chatd_core::{AgentId, UserId};

/// Errors raised while attaching, driving or detaching a session (C4).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("storage error: {0}")]
    Storage(#[from] chatd_storage::StorageError),

    #[error("chat record error: {0}")]
    ChatRecord(#[from] chatd_chat_record::ChatRecordError),

    #[error("workflow error: {0}")]
    Workflow(#[from] chatd_workflow::WorkflowError),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::UserNotFound(_) => "USER_NOT_FOUND",
            SessionError::AgentNotFound(_) => "AGENT_NOT_FOUND",
            SessionError::Forbidden(_) => "FORBIDDEN",
            SessionError::Storage(_) => "STORAGE_ERROR",
            SessionError::ChatRecord(_) => "CHAT_RECORD_ERROR",
            SessionError::Workflow(_) => "WORKFLOW_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
