use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatRecordError {
    #[error("storage error: {0}")]
    Storage(#[from] chatd_storage::StorageError),

    #[error("capability error: {0}")]
    Capability(#[from] chatd_capabilities::CapabilityError),

    #[error("compression error: {0}")]
    Compression(String),
}

impl ChatRecordError {
    pub fn code(&self) -> &'static str {
        match self {
            ChatRecordError::Storage(_) => "STORAGE_ERROR",
            ChatRecordError::Capability(_) => "CAPABILITY_ERROR",
            ChatRecordError::Compression(_) => "COMPRESSION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatRecordError>;
