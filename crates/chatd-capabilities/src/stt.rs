use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `STT transcribe(audio_segment) -> text + confidence + optional emotion`
/// (spec.md §4.6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
    pub emotion: Option<String>,
}

#[async_trait]
pub trait SttCapability: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript>;
}
