use chatd_core::{AgentId, Role, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// `agents` row (spec.md §6.3). `agent_config`/`memory_data` stay opaque
/// JSON — never unmarshalled into closed structs (§9 design note).
#[derive(Debug, Clone)]
pub struct AgentRow {
    pub id: AgentId,
    pub user_id: UserId,
    pub template_id: i64,
    pub agent_config: Value,
    pub memory_data: Value,
    /// `2` means soft-deleted; anything else is alive (spec.md §3).
    pub status: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRow {
    pub fn is_alive(&self) -> bool {
        self.status != 2
    }
}

#[derive(Debug, Clone)]
pub struct AgentTemplateRow {
    pub id: i64,
    pub name: String,
    pub agent_config: Value,
    pub status: i64,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: UserId,
    pub status: i64,
}

/// `chat_messages` row. Immutable after insert (spec.md §3).
#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub id: i64,
    pub session_id: String,
    pub agent_id: AgentId,
    pub role: Role,
    pub content: String,
    pub emotion: Option<String>,
    pub audio_file_path: Option<String>,
    pub copilot_mode: bool,
    pub created_at: DateTime<Utc>,
}

/// A new `chat_messages` row not yet assigned an id/timestamp by storage.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: String,
    pub agent_id: AgentId,
    pub role: Role,
    pub content: String,
    pub emotion: Option<String>,
    pub audio_file_path: Option<String>,
    pub copilot_mode: bool,
}

/// `chat_compressed_messages` row.
#[derive(Debug, Clone)]
pub struct ChatCompressedMessageRow {
    pub id: i64,
    pub agent_id: AgentId,
    pub compressed_content: String,
    pub content_last_time: DateTime<Utc>,
    pub copilot_mode: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatCompressedMessage {
    pub agent_id: AgentId,
    pub compressed_content: String,
    pub content_last_time: DateTime<Utc>,
    pub copilot_mode: bool,
}
