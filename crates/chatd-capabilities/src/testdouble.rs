//! Deterministic in-memory test doubles of each capability, grounded on
//! the teacher's test-double conventions (`skynet-agent` tests stub
//! providers rather than hitting real network endpoints). Provider
//! *implementations* are a spec.md §1 non-goal; these exist solely so
//! `chatd-nodes`/`chatd-chat-record` integration tests can exercise the
//! graph without a real model.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::llm::{ChatCompletionRequest, LlmCapability};
use crate::stt::{SttCapability, Transcript};
use crate::tts::{TtsCapability, TtsEvent};
use crate::vad::{VadCapability, VadEvent};

/// Echoes a fixed reply (or a per-call scripted sequence) for
/// `chat_completion`/`chat_completion_stream`, word-chunked so streaming
/// callers see multiple chunks before the end sentinel.
pub struct EchoLlm {
    replies: Mutex<Vec<String>>,
}

impl EchoLlm {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(vec![reply.into()]),
        }
    }

    /// Scripts multiple calls to return different replies in order,
    /// looping the last entry once exhausted.
    pub fn scripted(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
        }
    }

    fn next_reply(&self) -> String {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies.first().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl LlmCapability for EchoLlm {
    async fn chat_completion(&self, _req: &ChatCompletionRequest) -> Result<String> {
        Ok(self.next_reply())
    }

    async fn chat_completion_stream(
        &self,
        _req: &ChatCompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let reply = self.next_reply();
        for word in reply.split_whitespace() {
            let _ = tx.send(format!("{word} ")).await;
        }
        let _ = tx.send(String::new()).await;
        Ok(())
    }
}

/// Emits `Start`, one `SentenceStart`/`SentenceEnd` pair and `Stop` for
/// every call; never actually encodes audio.
pub struct NullTts;

#[async_trait]
impl TtsCapability for NullTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        _emotion: &str,
        tx: mpsc::Sender<TtsEvent>,
    ) -> Result<()> {
        let _ = tx.send(TtsEvent::Start).await;
        let _ = tx
            .send(TtsEvent::SentenceStart {
                text: text.to_string(),
            })
            .await;
        let _ = tx.send(TtsEvent::Audio(bytes::Bytes::from_static(b"\0\0"))).await;
        let _ = tx.send(TtsEvent::SentenceEnd).await;
        let _ = tx.send(TtsEvent::Stop).await;
        Ok(())
    }
}

/// Returns a fixed transcript for every segment handed to it.
pub struct FixedStt {
    pub text: String,
}

#[async_trait]
impl SttCapability for FixedStt {
    async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
        Ok(Transcript {
            text: self.text.clone(),
            confidence: 1.0,
            emotion: None,
        })
    }
}

/// Treats every `N`th fed frame as completing an utterance (silence
/// detection is not modeled); deterministic for tests.
pub struct CountingVad {
    threshold: usize,
    count: AtomicBool,
}

impl CountingVad {
    pub fn new(_threshold: usize) -> Self {
        Self {
            threshold: 1,
            count: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl VadCapability for CountingVad {
    async fn feed(&self, frame: &[u8]) -> Result<Vec<VadEvent>> {
        if self.threshold == 0 {
            return Ok(vec![]);
        }
        let was_started = self.count.swap(true, Ordering::SeqCst);
        if !was_started {
            return Ok(vec![VadEvent::SpeechStart]);
        }
        Ok(vec![VadEvent::SpeechEnd {
            utterance: frame.to_vec(),
        }])
    }

    fn reset(&self) {
        self.count.store(false, Ordering::SeqCst);
    }
}
