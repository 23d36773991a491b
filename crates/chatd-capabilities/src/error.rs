use thiserror::Error;

/// Recoverable failure from an LLM/TTS/STT/VAD provider (spec.md §4.6/§7).
/// Provider *implementations* are out of scope; this is the contract any
/// adapter must raise through.
#[derive(Debug, Error, Clone)]
pub enum CapabilityError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned invalid output: {0}")]
    InvalidOutput(String),

    #[error("provider request timed out")]
    Timeout,
}

impl CapabilityError {
    pub fn code(&self) -> &'static str {
        match self {
            CapabilityError::Unavailable(_) => "CAPABILITY_UNAVAILABLE",
            CapabilityError::RequestFailed(_) => "CAPABILITY_REQUEST_FAILED",
            CapabilityError::InvalidOutput(_) => "CAPABILITY_INVALID_OUTPUT",
            CapabilityError::Timeout => "CAPABILITY_TIMEOUT",
        }
    }
}

pub type Result<T> = std::result::Result<T, CapabilityError>;
