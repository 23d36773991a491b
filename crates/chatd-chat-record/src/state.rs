use std::sync::Arc;

use chatd_capabilities::llm::{ChatCompletionRequest, ChatMessage as LlmChatMessage, ChatRole, LlmCapability};
use chatd_core::{AgentId, Role};
use chrono::Utc;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::context::{project_context, CtxEntry};
use crate::error::{ChatRecordError, Result};
use crate::history::{estimate_tokens, find_keep_start_index, merge_consecutive, HistoryEntry};
use crate::memory::{enforce_memory_length, normalize_memory_value};
use chatd_storage::{NewChatCompressedMessage, NewChatMessage, StorageGateway};

/// Per-agent tunables for compression and memory extraction. Distinct
/// agents may be configured differently, so this travels with the state
/// rather than living as a single global.
#[derive(Debug, Clone)]
pub struct ChatRecordConfig {
    pub token_threshold: u64,
    pub keep_last_rounds: u64,
    pub load_history_limit: u64,
    pub memory_extract_max_length: usize,
    pub compress_system_prompt: String,
    pub compress_user_prompt: String,
    pub memory_extract_system_prompt: String,
    pub memory_extract_user_prompt: String,
}

impl Default for ChatRecordConfig {
    fn default() -> Self {
        Self {
            token_threshold: 8000,
            keep_last_rounds: 1,
            load_history_limit: 100,
            memory_extract_max_length: 4000,
            compress_system_prompt: DEFAULT_COMPRESS_SYSTEM_PROMPT.to_string(),
            compress_user_prompt: DEFAULT_COMPRESS_USER_PROMPT.to_string(),
            memory_extract_system_prompt: DEFAULT_MEMORY_SYSTEM_PROMPT.to_string(),
            memory_extract_user_prompt: DEFAULT_MEMORY_USER_PROMPT.to_string(),
        }
    }
}

const DEFAULT_COMPRESS_SYSTEM_PROMPT: &str =
    "You summarize conversation history into a compact paragraph, preserving facts and decisions.";
const DEFAULT_COMPRESS_USER_PROMPT: &str =
    "Summarize the following {{message_count}} messages into at most {{memory_max_length}} characters:\n\n{{messages}}";
const DEFAULT_MEMORY_SYSTEM_PROMPT: &str =
    "You extract durable facts about the user as a flat JSON object of category -> list of short facts.";
const DEFAULT_MEMORY_USER_PROMPT: &str =
    "Existing memory:\n{{existing_memory}}\n\nExtract updated facts from these {{message_count}} messages (max {{memory_max_length}} characters total):\n\n{{messages}}";

/// History, in-flight compression state, and derived context for one
/// `(agent_id, copilot_mode)` pair. Not `Send`-shared directly — callers
/// hold it behind `tokio::sync::Mutex` so `try_begin_compression` and a
/// subsequently spawned `run_compression` observe a consistent flag.
pub struct ChatRecordState {
    agent_id: AgentId,
    copilot_mode: bool,
    storage: Arc<StorageGateway>,
    config: ChatRecordConfig,
    chat_history: Vec<HistoryEntry>,
    is_compressing: bool,
}

impl ChatRecordState {
    /// Load the latest compressed summary (if any) plus every raw message
    /// recorded after it, merging consecutive same-role turns into the
    /// working `chat_history`.
    #[instrument(skip(storage, config))]
    pub fn load(
        storage: Arc<StorageGateway>,
        agent_id: AgentId,
        copilot_mode: bool,
        config: ChatRecordConfig,
    ) -> Result<Self> {
        let latest_summary = storage.latest_compressed_message(agent_id, copilot_mode)?;
        let after = latest_summary.as_ref().map(|s| s.content_last_time);

        let mut history = Vec::new();
        if let Some(summary) = latest_summary {
            history.push(HistoryEntry::summary(summary.compressed_content, summary.created_at));
        }

        let rows =
            storage.list_chat_messages_since(agent_id, copilot_mode, after, config.load_history_limit)?;
        for row in rows {
            history.push(HistoryEntry::regular(row.role, row.content, row.created_at));
        }

        Ok(Self {
            agent_id,
            copilot_mode,
            storage,
            config,
            chat_history: merge_consecutive(history),
            is_compressing: false,
        })
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.chat_history
    }

    pub fn is_compressing(&self) -> bool {
        self.is_compressing
    }

    pub fn context(&self, system_prompt: Option<&str>, user_prompt: Option<&str>) -> Vec<CtxEntry> {
        project_context(&self.chat_history, system_prompt, user_prompt)
    }

    pub fn estimate_tokens(&self) -> u64 {
        estimate_tokens(&self.chat_history)
    }

    /// Persist and append one user turn.
    #[instrument(skip(self, content))]
    pub fn ingest_user_text(&mut self, session_id: &str, content: String) -> Result<()> {
        self.ingest(session_id, Role::User, content)
    }

    /// Persist and append one assistant turn (already assembled from the
    /// node layer's streamed chunks before this call).
    #[instrument(skip(self, content))]
    pub fn ingest_assistant_text(&mut self, session_id: &str, content: String) -> Result<()> {
        self.ingest(session_id, Role::Assistant, content)
    }

    fn ingest(&mut self, session_id: &str, role: Role, content: String) -> Result<()> {
        let row = self.storage.insert_chat_message(&NewChatMessage {
            session_id: session_id.to_string(),
            agent_id: self.agent_id,
            role,
            content: content.clone(),
            emotion: None,
            audio_file_path: None,
            copilot_mode: self.copilot_mode,
        })?;
        let entry = HistoryEntry::regular(role, content, row.created_at);
        self.chat_history = merge_consecutive({
            let mut h = std::mem::take(&mut self.chat_history);
            h.push(entry);
            h
        });
        Ok(())
    }

    /// Single-flight guard: `true` means the caller now owns the exclusive
    /// right to run a compression pass and must eventually call
    /// `run_compression` (or reset the flag itself on an early-abort path).
    /// Returns `false` immediately if a pass is already in flight or the
    /// token threshold isn't crossed, without blocking.
    pub fn try_begin_compression(&mut self) -> bool {
        if self.is_compressing {
            return false;
        }
        if self.estimate_tokens() < self.config.token_threshold {
            return false;
        }
        self.is_compressing = true;
        true
    }

    /// Heavy-lifting compression pass: find the cut point, summarize
    /// everything before it via `llm`, persist the summary, and collapse
    /// `chat_history` down to `[summary, ..kept rounds]`. Always clears the
    /// single-flight flag on return, success or failure.
    #[instrument(skip(self, llm))]
    pub async fn run_compression(&mut self, llm: &dyn LlmCapability) -> Result<()> {
        let result = self.run_compression_inner(llm).await;
        self.is_compressing = false;
        result
    }

    async fn run_compression_inner(&mut self, llm: &dyn LlmCapability) -> Result<()> {
        let Some(keep_start) = find_keep_start_index(&self.chat_history, self.config.keep_last_rounds)
        else {
            return Ok(());
        };
        if keep_start == 0 {
            return Ok(());
        }

        let to_compress = &self.chat_history[..keep_start];
        // step 3: a prior summary stub is already represented in storage by
        // its own ChatCompressedMessage row — never re-summarize it.
        let filtered: Vec<&HistoryEntry> = to_compress.iter().filter(|e| !e.is_compressed).collect();
        if filtered.is_empty() {
            return Ok(());
        }

        let content_last_time = to_compress
            .last()
            .map(|e| e.created_at)
            .unwrap_or_else(Utc::now);
        let synthetic_timestamp = to_compress
            .first()
            .map(|e| e.created_at)
            .unwrap_or_else(Utc::now);

        let messages_text = filtered
            .iter()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n");
        let vars = serde_json::json!({
            "messages": messages_text,
            "message_count": filtered.len(),
            "memory_max_length": self.config.memory_extract_max_length,
        });
        let system_prompt = chatd_core::render::render(&self.config.compress_system_prompt, &vars);
        let user_prompt = chatd_core::render::render(&self.config.compress_user_prompt, &vars);

        let reply = llm
            .chat_completion(&ChatCompletionRequest {
                messages: render_prompt_messages(system_prompt, user_prompt),
                model: String::new(),
                max_tokens: 512,
                temperature: 0.2,
                top_p: 1.0,
            })
            .await?;
        if reply.is_empty() {
            return Ok(());
        }

        let persisted = self.storage.insert_compressed_message(&NewChatCompressedMessage {
            agent_id: self.agent_id,
            compressed_content: reply,
            content_last_time,
            copilot_mode: self.copilot_mode,
        })?;

        let mut new_history = vec![HistoryEntry::summary(
            persisted.compressed_content,
            synthetic_timestamp,
        )];
        new_history.extend(self.chat_history[keep_start..].iter().cloned());
        self.chat_history = merge_consecutive(new_history);
        Ok(())
    }

    /// Extract durable facts about the user from the current (pre-merge)
    /// history via `llm` and normalize/length-enforce the LLM's result
    /// (spec.md §4.2.5). `existing_memory` is rendered into the prompt only
    /// (step 1); the written-back result is the LLM's normalized output
    /// wholesale (step 5), matching `original_source/chat_record/memory.py`'s
    /// `_save_memory` replacing rather than unioning.
    #[instrument(skip(self, llm, existing_memory))]
    pub async fn extract_memory(
        &self,
        llm: &dyn LlmCapability,
        existing_memory: &Value,
    ) -> Result<Value> {
        let messages_text = self
            .chat_history
            .iter()
            .filter(|e| !e.is_compressed)
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n");
        let existing_memory_pretty =
            serde_json::to_string_pretty(existing_memory).unwrap_or_else(|_| "{}".to_string());
        let vars = serde_json::json!({
            "messages": messages_text,
            "message_count": self.chat_history.iter().filter(|e| !e.is_compressed).count(),
            "memory_max_length": self.config.memory_extract_max_length,
            "existing_memory": existing_memory_pretty,
        });
        let system_prompt = chatd_core::render::render(&self.config.memory_extract_system_prompt, &vars);
        let user_prompt = chatd_core::render::render(&self.config.memory_extract_user_prompt, &vars);

        let reply = llm
            .chat_completion(&ChatCompletionRequest {
                messages: render_prompt_messages(system_prompt, user_prompt),
                model: String::new(),
                max_tokens: 512,
                temperature: 0.0,
                top_p: 1.0,
            })
            .await?;

        let raw: Value = serde_json::from_str(&reply).unwrap_or_else(|err| {
            warn!(error = %err, "memory extraction reply was not valid JSON, treating as free text");
            Value::String(reply)
        });

        let normalized = normalize_memory_value(&raw, self.config.memory_extract_max_length);
        Ok(enforce_memory_length(normalized, self.config.memory_extract_max_length))
    }
}

/// Assembles the two-message `[system?, user]` request spec.md §4.2.4
/// step 5 / §4.2.5 step 1 describe, omitting the system message when its
/// rendered template is empty (same convention as context projection's
/// "if `system_prompt` is non-empty" rule, §4.2.3).
fn render_prompt_messages(system_prompt: String, user_prompt: String) -> Vec<LlmChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(LlmChatMessage {
            role: ChatRole::System,
            content: system_prompt,
        });
    }
    messages.push(LlmChatMessage {
        role: ChatRole::User,
        content: user_prompt,
    });
    messages
}

impl From<serde_json::Error> for ChatRecordError {
    fn from(err: serde_json::Error) -> Self {
        ChatRecordError::Compression(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatd_capabilities::error::Result as CapResult;
    use chatd_capabilities::llm::ChatCompletionRequest as Req;
    use chatd_storage::ConnectionPool;
    use tokio::sync::mpsc;

    struct StubLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmCapability for StubLlm {
        async fn chat_completion(&self, _req: &Req) -> CapResult<String> {
            Ok(self.reply.clone())
        }

        async fn chat_completion_stream(
            &self,
            _req: &Req,
            tx: mpsc::Sender<String>,
        ) -> CapResult<()> {
            let _ = tx.send(self.reply.clone()).await;
            let _ = tx.send(String::new()).await;
            Ok(())
        }
    }

    fn make_storage() -> Arc<StorageGateway> {
        let pool = ConnectionPool::open_in_memory().unwrap();
        Arc::new(StorageGateway::new(pool))
    }

    fn seed_agent(storage: &StorageGateway) -> AgentId {
        let conn = storage.pool().checkout();
        conn.execute(
            "INSERT INTO users (id, status) VALUES (1, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO agent_templates (id, name, agent_config, status) VALUES (1, 't', '{}', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO agents (id, user_id, template_id, agent_config, memory_data, status, created_at, updated_at)
             VALUES (1, 1, 1, '{}', '{}', 0, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        AgentId(1)
    }

    #[test]
    fn load_from_empty_history_is_empty() {
        let storage = make_storage();
        let agent_id = seed_agent(&storage);
        let state = ChatRecordState::load(storage, agent_id, false, ChatRecordConfig::default()).unwrap();
        assert!(state.history().is_empty());
    }

    #[test]
    fn ingest_appends_and_persists() {
        let storage = make_storage();
        let agent_id = seed_agent(&storage);
        let mut state =
            ChatRecordState::load(storage.clone(), agent_id, false, ChatRecordConfig::default()).unwrap();
        state.ingest_user_text("s1", "hello".into()).unwrap();
        state.ingest_assistant_text("s1", "hi there".into()).unwrap();
        assert_eq!(state.history().len(), 2);

        let reloaded =
            ChatRecordState::load(storage, agent_id, false, ChatRecordConfig::default()).unwrap();
        assert_eq!(reloaded.history().len(), 2);
    }

    #[test]
    fn try_begin_compression_respects_threshold_and_single_flight() {
        let storage = make_storage();
        let agent_id = seed_agent(&storage);
        let mut config = ChatRecordConfig::default();
        config.token_threshold = 1_000_000;
        let mut state = ChatRecordState::load(storage, agent_id, false, config).unwrap();
        state.ingest_user_text("s1", "hello".into()).unwrap();
        assert!(!state.try_begin_compression());
    }

    #[tokio::test]
    async fn run_compression_collapses_history_into_summary() {
        let storage = make_storage();
        let agent_id = seed_agent(&storage);
        let mut config = ChatRecordConfig::default();
        config.keep_last_rounds = 1;
        let mut state = ChatRecordState::load(storage, agent_id, false, config).unwrap();
        for i in 0..4 {
            state.ingest_user_text("s1", format!("q{i}")).unwrap();
            state.ingest_assistant_text("s1", format!("a{i}")).unwrap();
        }
        assert_eq!(state.history().len(), 8);

        let llm = StubLlm {
            reply: "summary of earlier turns".to_string(),
        };
        assert!(state.try_begin_compression());
        state.run_compression(&llm).await.unwrap();

        assert!(!state.is_compressing());
        assert_eq!(state.history().len(), 3);
        assert!(state.history()[0].is_compressed);
        assert_eq!(state.history()[0].content, "summary of earlier turns");
    }

    #[tokio::test]
    async fn extract_memory_normalizes_and_merges() {
        let storage = make_storage();
        let agent_id = seed_agent(&storage);
        let mut state =
            ChatRecordState::load(storage, agent_id, false, ChatRecordConfig::default()).unwrap();
        state.ingest_user_text("s1", "I love sailing".into()).unwrap();

        let llm = StubLlm {
            reply: "{\"hobbies\": [\"sailing\"]}".to_string(),
        };
        let existing = serde_json::json!({"hobbies": ["reading"]});
        let merged = state.extract_memory(&llm, &existing).await.unwrap();
        let hobbies = merged["hobbies"].as_array().unwrap();
        assert!(hobbies.iter().any(|v| v == "sailing"));
        assert!(hobbies.iter().any(|v| v == "reading"));
    }
}
