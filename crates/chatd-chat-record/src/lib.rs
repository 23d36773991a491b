//! `chatd-chat-record` — durable chat history, context projection for
//! LLM prompting, threshold-triggered compression, and long-term memory
//! extraction for one agent's conversation (C5).

pub mod context;
pub mod error;
pub mod history;
pub mod memory;
pub mod state;

pub use context::{project_context, CtxEntry};
pub use error::{ChatRecordError, Result};
pub use history::{estimate_tokens, find_keep_start_index, merge_consecutive, HistoryEntry};
pub use memory::{enforce_memory_length, normalize_memory_value, truncate_string};
pub use state::{ChatRecordConfig, ChatRecordState};

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use async_trait::async_trait;
    use chatd_capabilities::llm::{ChatCompletionRequest, LlmCapability};
    use chatd_core::{AgentId, Role};
    use chatd_storage::{ConnectionPool, StorageGateway};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct EchoLlm;

    #[async_trait]
    impl LlmCapability for EchoLlm {
        async fn chat_completion(
            &self,
            _req: &ChatCompletionRequest,
        ) -> chatd_capabilities::Result<String> {
            Ok("compacted summary".to_string())
        }

        async fn chat_completion_stream(
            &self,
            _req: &ChatCompletionRequest,
            tx: mpsc::Sender<String>,
        ) -> chatd_capabilities::Result<()> {
            let _ = tx.send(String::new()).await;
            Ok(())
        }
    }

    fn storage() -> Arc<StorageGateway> {
        let pool = ConnectionPool::open_in_memory().unwrap();
        Arc::new(StorageGateway::new(pool))
    }

    fn seed_agent(storage: &StorageGateway, id: i64) -> AgentId {
        let conn = storage.pool().checkout();
        conn.execute("INSERT INTO users (id, status) VALUES (?1, 0)", [id])
            .unwrap();
        conn.execute(
            "INSERT INTO agent_templates (id, name, agent_config, status) VALUES (?1, 't', '{}', 0)",
            [id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO agents (id, user_id, template_id, agent_config, memory_data, status, created_at, updated_at)
             VALUES (?1, ?1, ?1, '{}', '{}', 0, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [id],
        )
        .unwrap();
        AgentId(id)
    }

    /// S1: cold start with no prior history projects to just the trailing
    /// user turn (plus an optional system message).
    #[test]
    fn s1_cold_start() {
        let storage = storage();
        let agent_id = seed_agent(&storage, 1);
        let state = ChatRecordState::load(storage, agent_id, false, ChatRecordConfig::default()).unwrap();
        assert!(state.history().is_empty());
        let ctx = state.context(Some("be helpful"), Some("hello there"));
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].role, Role::System);
        assert_eq!(ctx[1].content, "hello there");
    }

    /// S2: crossing the token threshold lets the caller begin exactly one
    /// compression pass; a second concurrent attempt is rejected until the
    /// first completes.
    #[tokio::test]
    async fn s2_threshold_crossing_single_flight() {
        let storage = storage();
        let agent_id = seed_agent(&storage, 2);
        let mut config = ChatRecordConfig::default();
        config.token_threshold = 5;
        config.keep_last_rounds = 1;
        let mut state = ChatRecordState::load(storage, agent_id, false, config).unwrap();
        for i in 0..3 {
            state.ingest_user_text("s1", format!("question number {i}")).unwrap();
            state.ingest_assistant_text("s1", format!("answer number {i}")).unwrap();
        }

        assert!(state.try_begin_compression());
        assert!(!state.try_begin_compression(), "single-flight must reject re-entry");

        state.run_compression(&EchoLlm).await.unwrap();
        assert!(!state.is_compressing());
        assert!(state.history()[0].is_compressed);
    }

    /// S3: an incomplete trailing round (a user turn with no assistant
    /// reply yet) blocks compression even past the token threshold.
    #[test]
    fn s3_incomplete_tail_blocks_compression() {
        let storage = storage();
        let agent_id = seed_agent(&storage, 3);
        let mut config = ChatRecordConfig::default();
        config.token_threshold = 1;
        let mut state = ChatRecordState::load(storage, agent_id, false, config).unwrap();
        state.ingest_user_text("s1", "question with no reply yet".into()).unwrap();

        assert_eq!(
            find_keep_start_index(state.history(), ChatRecordConfig::default().keep_last_rounds),
            None
        );
    }

    /// S4: reconnecting (a fresh `load` against the same agent) reproduces
    /// identical history to what was in memory before detach.
    #[test]
    fn s4_reconnect_reloads_same_history() {
        let storage = storage();
        let agent_id = seed_agent(&storage, 4);
        let mut state =
            ChatRecordState::load(storage.clone(), agent_id, false, ChatRecordConfig::default()).unwrap();
        state.ingest_user_text("s1", "hi".into()).unwrap();
        state.ingest_assistant_text("s1", "hello".into()).unwrap();

        let reconnected =
            ChatRecordState::load(storage, agent_id, false, ChatRecordConfig::default()).unwrap();
        assert_eq!(reconnected.history().len(), state.history().len());
        assert_eq!(reconnected.history()[0].content, state.history()[0].content);
    }

    /// §4.2.1 step 2 / §6.2: `load_history_limit` caps how many rows a
    /// fresh `load` pulls in, even when more are stored. Alternating
    /// roles so the cap, not consecutive-role merging, is what's observed.
    #[test]
    fn load_caps_at_load_history_limit() {
        let storage = storage();
        let agent_id = seed_agent(&storage, 6);
        let mut config = ChatRecordConfig::default();
        config.load_history_limit = 4;
        let mut state = ChatRecordState::load(storage.clone(), agent_id, false, config.clone()).unwrap();
        for i in 0..3 {
            state.ingest_user_text("s1", format!("question {i}")).unwrap();
            state.ingest_assistant_text("s1", format!("answer {i}")).unwrap();
        }

        let reloaded = ChatRecordState::load(storage, agent_id, false, config).unwrap();
        assert_eq!(reloaded.history().len(), 4);
    }

    /// S5: copilot-mode history is a disjoint partition from normal-mode
    /// history for the same agent.
    #[test]
    fn s5_copilot_isolation() {
        let storage = storage();
        let agent_id = seed_agent(&storage, 5);
        let mut normal =
            ChatRecordState::load(storage.clone(), agent_id, false, ChatRecordConfig::default()).unwrap();
        let mut copilot =
            ChatRecordState::load(storage, agent_id, true, ChatRecordConfig::default()).unwrap();

        normal.ingest_user_text("s1", "normal turn".into()).unwrap();
        copilot.ingest_user_text("s1", "copilot turn".into()).unwrap();

        assert_eq!(normal.history().len(), 1);
        assert_eq!(copilot.history().len(), 1);
        assert_ne!(normal.history()[0].content, copilot.history()[0].content);
    }
}
