use rusqlite::Connection;

use crate::error::Result;

/// Idempotent schema creation for the tables named in spec.md §6.3.
/// Safe to call on every process start.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id         INTEGER PRIMARY KEY,
            status     INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS agent_templates (
            id            INTEGER PRIMARY KEY,
            name          TEXT NOT NULL,
            agent_config  TEXT NOT NULL DEFAULT '{}',
            status        INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS agents (
            id            INTEGER PRIMARY KEY,
            user_id       INTEGER NOT NULL,
            template_id   INTEGER NOT NULL,
            agent_config  TEXT NOT NULL DEFAULT '{}',
            memory_data   TEXT NOT NULL DEFAULT '{}',
            status        INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agents_user_id ON agents(user_id);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id       TEXT NOT NULL,
            agent_id         INTEGER NOT NULL,
            role             TEXT NOT NULL,
            content          TEXT NOT NULL,
            emotion          TEXT,
            audio_file_path  TEXT,
            copilot_mode     INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_agent
            ON chat_messages(agent_id, copilot_mode, created_at);

        CREATE TABLE IF NOT EXISTS chat_compressed_messages (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id             INTEGER NOT NULL,
            compressed_content   TEXT NOT NULL,
            content_last_time    TEXT NOT NULL,
            copilot_mode         INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_compressed_agent
            ON chat_compressed_messages(agent_id, copilot_mode, created_at);
        "#,
    )?;
    Ok(())
}
