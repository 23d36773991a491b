//! `chatd-capabilities` — the abstract LLM/TTS/STT/VAD contracts (C1).
//! Provider *implementations* are a spec.md §1 non-goal; this crate ships
//! the trait definitions plus deterministic test doubles.

pub mod bundle;
pub mod error;
pub mod llm;
pub mod stt;
pub mod testdouble;
pub mod tts;
pub mod vad;

pub use bundle::CapabilityBundle;
pub use error::{CapabilityError, Result};
pub use llm::{ChatCompletionRequest, ChatMessage, ChatRole, LlmCapability};
pub use stt::{SttCapability, Transcript};
pub use tts::{TtsCapability, TtsEvent};
pub use vad::{VadCapability, VadEvent};
