use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A segmentation event produced while feeding raw audio frames to a VAD
/// implementation (spec.md §4.6: "streaming over audio frames -> produces
/// segmented utterances").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VadEvent {
    SpeechStart,
    SpeechEnd { utterance: Vec<u8> },
    WakeWord { text: String },
}

#[async_trait]
pub trait VadCapability: Send + Sync {
    /// Feed one raw audio frame. May produce zero or more events (a single
    /// frame rarely completes an utterance).
    async fn feed(&self, frame: &[u8]) -> Result<Vec<VadEvent>>;

    /// Reset any buffered segmentation state, e.g. on `listen{state:"stop"}`.
    fn reset(&self);
}
