use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Request shape shared by both the synchronous and streaming chat
/// completion operations (spec.md §4.6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// `LLM chat_completion(...) -> {content: string}` (spec.md §4.6). Empty
/// string is a valid "no output" result, not an error.
#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn chat_completion(&self, req: &ChatCompletionRequest) -> Result<String>;

    /// Streams text chunks on `tx`, terminated by an empty-string sentinel
    /// chunk exactly once (spec.md §4.1's text-stream end sentinel).
    async fn chat_completion_stream(
        &self,
        req: &ChatCompletionRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<()>;
}
