use thiserror::Error;

/// Engine-level failures (SPEC_FULL §4.1). Per-node failures are
/// contained, logged and never surface as this type — only structural
/// problems with the graph itself do.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("incompatible edge {src_node}.{src_out} -> {dst_node}.{dst_in}: {reason}")]
    IncompatibleEdge {
        src_node: String,
        src_out: String,
        dst_node: String,
        dst_in: String,
        reason: String,
    },

    #[error("engine already running")]
    AlreadyRunning,

    #[error("engine not running")]
    NotRunning,

    #[error("config error: {0}")]
    ConfigError(String),
}

impl WorkflowError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::NodeNotFound(_) => "NODE_NOT_FOUND",
            WorkflowError::IncompatibleEdge { .. } => "INCOMPATIBLE_EDGE",
            WorkflowError::AlreadyRunning => "ALREADY_RUNNING",
            WorkflowError::NotRunning => "NOT_RUNNING",
            WorkflowError::ConfigError(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
