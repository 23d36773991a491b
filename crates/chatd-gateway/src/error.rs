use thiserror::Error;

/// Failures raised while authenticating or servicing a WS connection
/// (spec.md §4.4/§7). Client-protocol and auth failures map to a close
/// code per spec.md §6.1; everything else surfaces as an `error` message
/// while the connection stays open where spec.md allows it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("missing required connection parameter: {0}")]
    MissingParam(String),

    #[error("{0}")]
    Protocol(String),

    #[error("unknown message type '{0}'")]
    MethodNotFound(String),

    #[error("payload of {0} bytes exceeds the configured limit")]
    PayloadTooLarge(usize),

    #[error(transparent)]
    Session(#[from] chatd_session::SessionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::AuthFailed(_) => "AUTH_FAILED",
            GatewayError::MissingParam(_) => "PROTOCOL_ERROR",
            GatewayError::Protocol(_) => "PROTOCOL_ERROR",
            GatewayError::MethodNotFound(_) => "METHOD_NOT_FOUND",
            GatewayError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            GatewayError::Session(e) => e.code(),
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this failure is severe enough to close the connection with
    /// `1008` (spec.md §4.4/§7: "close with 1008 only for auth/protocol-
    /// level violations"). Everything else surfaces as an `error` message
    /// on an otherwise-open connection, including `Internal`, which closes
    /// with `1011` instead (handled by the caller, not by this flag).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::AuthFailed(_) | GatewayError::MissingParam(_) | GatewayError::PayloadTooLarge(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
