use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Lifecycle events emitted during synthesis (mirrored onto the WS `tts`
/// message in spec.md §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TtsEvent {
    Start,
    SentenceStart { text: String },
    SentenceEnd,
    Stop,
    /// A chunk of synthesized opus audio.
    #[serde(skip)]
    Audio(Bytes),
}

/// `TTS synthesize(text, voice, emotion) -> opus frames + status events`
/// (spec.md §4.6 table).
#[async_trait]
pub trait TtsCapability: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        emotion: &str,
        tx: mpsc::Sender<TtsEvent>,
    ) -> Result<()>;
}
