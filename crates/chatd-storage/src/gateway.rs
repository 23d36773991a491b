use chatd_core::{AgentId, Role, SessionId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::instrument;

use crate::error::{Result, StorageError};
use crate::pool::ConnectionPool;
use crate::types::*;

/// Typed, pooled query surface against the tables named in spec.md §6.3.
/// Every statement is parameterized — no string concatenation of user
/// input (§4.5).
pub struct StorageGateway {
    pool: ConnectionPool,
}

impl StorageGateway {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn health_check(&self) -> Result<()> {
        self.pool.health_check()
    }

    /// Escape hatch onto the underlying pool for callers (tests in
    /// dependent crates, maintenance scripts) that need a raw connection.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    // ---- agents / templates / users -----------------------------------

    #[instrument(skip(self))]
    pub fn get_agent(&self, id: AgentId) -> Result<Option<AgentRow>> {
        let conn = self.pool.checkout();
        conn.query_row(
            "SELECT id, user_id, template_id, agent_config, memory_data, status, created_at, updated_at
             FROM agents WHERE id = ?1",
            params![id.0],
            row_to_agent,
        )
        .optional()
        .map_err(StorageError::from)
    }

    #[instrument(skip(self))]
    pub fn get_agent_template(&self, id: i64) -> Result<Option<AgentTemplateRow>> {
        let conn = self.pool.checkout();
        conn.query_row(
            "SELECT id, name, agent_config, status FROM agent_templates WHERE id = ?1",
            params![id],
            row_to_template,
        )
        .optional()
        .map_err(StorageError::from)
    }

    #[instrument(skip(self))]
    pub fn get_user(&self, id: UserId) -> Result<Option<UserRow>> {
        let conn = self.pool.checkout();
        conn.query_row(
            "SELECT id, status FROM users WHERE id = ?1",
            params![id.0],
            |row| {
                Ok(UserRow {
                    id: UserId(row.get(0)?),
                    status: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// Last-writer-wins flush of mutated `agent_config`/`memory_data` on
    /// session detach (spec.md §4.3/§5).
    #[instrument(skip(self, agent_config, memory_data))]
    pub fn update_agent_state(
        &self,
        id: AgentId,
        agent_config: &Value,
        memory_data: &Value,
    ) -> Result<()> {
        let conn = self.pool.checkout();
        let now = Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE agents SET agent_config = ?1, memory_data = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(agent_config)?,
                serde_json::to_string(memory_data)?,
                now,
                id.0
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("agent {id}")));
        }
        Ok(())
    }

    // ---- chat_messages --------------------------------------------------

    /// Insert one immutable turn. Returns the persisted row including its
    /// server-assigned `id`/`created_at`.
    #[instrument(skip(self, msg), fields(agent_id = %msg.agent_id, role = %msg.role))]
    pub fn insert_chat_message(&self, msg: &NewChatMessage) -> Result<ChatMessageRow> {
        let conn = self.pool.checkout();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO chat_messages
             (session_id, agent_id, role, content, emotion, audio_file_path, copilot_mode, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.session_id,
                msg.agent_id.0,
                msg.role.to_string(),
                msg.content,
                msg.emotion,
                msg.audio_file_path,
                msg.copilot_mode as i64,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(ChatMessageRow {
            id,
            session_id: msg.session_id.clone(),
            agent_id: msg.agent_id,
            role: msg.role,
            content: msg.content.clone(),
            emotion: msg.emotion.clone(),
            audio_file_path: msg.audio_file_path.clone(),
            copilot_mode: msg.copilot_mode,
            created_at: now,
        })
    }

    /// Messages for `(agent_id, copilot_mode)` with `created_at > after`
    /// (or all, if `after` is `None`), ascending, capped at `limit`
    /// (spec.md §4.2.1 step 2).
    #[instrument(skip(self))]
    pub fn list_chat_messages_since(
        &self,
        agent_id: AgentId,
        copilot_mode: bool,
        after: Option<DateTime<Utc>>,
        limit: u64,
    ) -> Result<Vec<ChatMessageRow>> {
        let conn = self.pool.checkout();
        let after_str = after.map(|d| d.to_rfc3339()).unwrap_or_default();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, agent_id, role, content, emotion, audio_file_path, copilot_mode, created_at
             FROM chat_messages
             WHERE agent_id = ?1 AND copilot_mode = ?2 AND (?3 = '' OR created_at > ?3)
             ORDER BY created_at ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![agent_id.0, copilot_mode as i64, after_str, limit as i64],
            row_to_message,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)
    }

    // ---- chat_compressed_messages ---------------------------------------

    #[instrument(skip(self, row), fields(agent_id = %row.agent_id))]
    pub fn insert_compressed_message(
        &self,
        row: &NewChatCompressedMessage,
    ) -> Result<ChatCompressedMessageRow> {
        let conn = self.pool.checkout();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO chat_compressed_messages
             (agent_id, compressed_content, content_last_time, copilot_mode, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.agent_id.0,
                row.compressed_content,
                row.content_last_time.to_rfc3339(),
                row.copilot_mode as i64,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(ChatCompressedMessageRow {
            id,
            agent_id: row.agent_id,
            compressed_content: row.compressed_content.clone(),
            content_last_time: row.content_last_time,
            copilot_mode: row.copilot_mode,
            created_at: now,
        })
    }

    /// Latest summary for `(agent_id, copilot_mode)`, if any (spec.md §4.2.1 step 1).
    #[instrument(skip(self))]
    pub fn latest_compressed_message(
        &self,
        agent_id: AgentId,
        copilot_mode: bool,
    ) -> Result<Option<ChatCompressedMessageRow>> {
        let conn = self.pool.checkout();
        conn.query_row(
            "SELECT id, agent_id, compressed_content, content_last_time, copilot_mode, created_at
             FROM chat_compressed_messages
             WHERE agent_id = ?1 AND copilot_mode = ?2
             ORDER BY created_at DESC
             LIMIT 1",
            params![agent_id.0, copilot_mode as i64],
            row_to_compressed,
        )
        .optional()
        .map_err(StorageError::from)
    }

    // ---- multi-row transactional helpers (out of the hot path) ----------

    /// Re-point an agent at a new owning user and record the transfer as a
    /// synthetic system `chat_messages` row, atomically. The device-binding
    /// / agent-transfer *flows* are non-goals (§1); only the transactional
    /// primitive is in scope (§4.5).
    #[instrument(skip(self))]
    pub fn transfer_agent(
        &self,
        agent_id: AgentId,
        new_user_id: UserId,
        session_id: &SessionId,
    ) -> Result<()> {
        let mut conn = self.pool.checkout();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let rows = tx.execute(
            "UPDATE agents SET user_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_user_id.0, now, agent_id.0],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("agent {agent_id}")));
        }
        tx.execute(
            "INSERT INTO chat_messages
             (session_id, agent_id, role, content, emotion, audio_file_path, copilot_mode, created_at)
             VALUES (?1, ?2, 'system', ?3, NULL, NULL, 0, ?4)",
            params![
                session_id.0,
                agent_id.0,
                format!("agent transferred to user {new_user_id}"),
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRow> {
    let config_str: String = row.get(3)?;
    let memory_str: String = row.get(4)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;
    Ok(AgentRow {
        id: AgentId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        template_id: row.get(2)?,
        agent_config: parse_json_column(&config_str),
        memory_data: parse_json_column(&memory_str),
        status: row.get(5)?,
        created_at: parse_rfc3339(&created_str),
        updated_at: parse_rfc3339(&updated_str),
    })
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentTemplateRow> {
    let config_str: String = row.get(2)?;
    Ok(AgentTemplateRow {
        id: row.get(0)?,
        name: row.get(1)?,
        agent_config: parse_json_column(&config_str),
        status: row.get(3)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessageRow> {
    let role_str: String = row.get(3)?;
    let created_str: String = row.get(8)?;
    Ok(ChatMessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        agent_id: AgentId(row.get(2)?),
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get(4)?,
        emotion: row.get(5)?,
        audio_file_path: row.get(6)?,
        copilot_mode: row.get::<_, i64>(7)? != 0,
        created_at: parse_rfc3339(&created_str),
    })
}

fn row_to_compressed(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatCompressedMessageRow> {
    let content_last_str: String = row.get(3)?;
    let created_str: String = row.get(5)?;
    Ok(ChatCompressedMessageRow {
        id: row.get(0)?,
        agent_id: AgentId(row.get(1)?),
        compressed_content: row.get(2)?,
        content_last_time: parse_rfc3339(&content_last_str),
        copilot_mode: row.get::<_, i64>(4)? != 0,
        created_at: parse_rfc3339(&created_str),
    })
}

fn parse_json_column(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or(Value::Object(Default::default()))
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
