use std::sync::Arc;

use crate::llm::LlmCapability;
use crate::stt::SttCapability;
use crate::tts::TtsCapability;
use crate::vad::VadCapability;

/// The capability handles a session's engine is constructed with
/// (spec.md §4.6: "the engine receives capability handles only, never
/// provider-specific types"). Resolved per-agent by the per-session
/// manager (C4) via `ai_providers`, which is out of scope here.
#[derive(Clone)]
pub struct CapabilityBundle {
    pub llm: Arc<dyn LlmCapability>,
    pub tts: Arc<dyn TtsCapability>,
    pub stt: Arc<dyn SttCapability>,
    pub vad: Arc<dyn VadCapability>,
}
