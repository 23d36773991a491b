//! `chatd-session` — the per-session manager (C4): loads an agent's
//! merged config/memory from storage, builds and starts one workflow
//! engine per session, wires its external connections to host-supplied
//! callbacks, and flushes mutated state back to storage on detach.

pub mod accessor;
pub mod analysis;
pub mod capabilities;
pub mod error;
pub mod manager;
pub mod workflow_templates;

pub use accessor::{deep_merge_json, UserDataAccessor};
pub use analysis::{NoopSessionAnalysisQueue, SessionAnalysisQueue};
pub use capabilities::{CapabilityResolver, FixedCapabilityResolver};
pub use error::{Result, SessionError};
pub use manager::{SessionCallbacks, SessionHandle, SessionManager};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::Mutex as AsyncMutex;

    use chatd_capabilities::testdouble::{CountingVad, EchoLlm, FixedStt, NullTts};
    use chatd_capabilities::CapabilityBundle;
    use chatd_core::{AgentId, SessionId, UserId};
    use chatd_storage::{ConnectionPool, StorageGateway};
    use chatd_workflow::Chunk;

    use super::*;

    fn seed(storage: &StorageGateway, id: i64, agent_config: &str) {
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
             VALUES (?1, ?1, ?1, ?2, '{}', 0, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            rusqlite::params![id, agent_config],
        )
        .unwrap();
    }

    fn bundle() -> CapabilityBundle {
        CapabilityBundle {
            llm: Arc::new(EchoLlm::new("hi yourself.")),
            tts: Arc::new(NullTts),
            stt: Arc::new(FixedStt {
                text: "hello there".to_string(),
            }),
            vad: Arc::new(CountingVad::new(1)),
        }
    }

    fn noop_callbacks() -> (SessionCallbacks, Arc<AsyncMutex<Vec<String>>>) {
        let captured: Arc<AsyncMutex<Vec<String>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let captured_llm = captured.clone();
        let callbacks = SessionCallbacks {
            on_audio: Arc::new(|_chunk: Chunk| Box::pin(async move {})),
            on_tts_status: Arc::new(|_chunk: Chunk| Box::pin(async move {})),
            on_llm_text: Arc::new(move |chunk: Chunk| {
                let captured_llm = captured_llm.clone();
                Box::pin(async move {
                    if let Some(text) = chunk.as_text() {
                        if !text.is_empty() {
                            captured_llm.lock().await.push(text.to_string());
                        }
                    }
                })
            }),
        };
        (callbacks, captured)
    }

    #[tokio::test]
    async fn attach_rejects_unowned_agent() {
        let storage = Arc::new(StorageGateway::new(ConnectionPool::open_in_memory().unwrap()));
        seed(&storage, 1, "{}");
        seed(&storage, 2, "{}");

        let manager = SessionManager::new(
            storage,
            Arc::new(FixedCapabilityResolver(bundle())),
            Arc::new(NoopSessionAnalysisQueue),
        );
        let (callbacks, _captured) = noop_callbacks();

        let result = manager
            .attach(UserId(2), AgentId(1), None, false, callbacks)
            .await;
        assert!(matches!(result, Err(SessionError::Forbidden(_))));
    }

    #[tokio::test]
    async fn attach_unknown_agent_errors() {
        let storage = Arc::new(StorageGateway::new(ConnectionPool::open_in_memory().unwrap()));
        seed(&storage, 1, "{}");

        let manager = SessionManager::new(
            storage,
            Arc::new(FixedCapabilityResolver(bundle())),
            Arc::new(NoopSessionAnalysisQueue),
        );
        let (callbacks, _captured) = noop_callbacks();

        let result = manager
            .attach(UserId(1), AgentId(99), None, false, callbacks)
            .await;
        assert!(matches!(result, Err(SessionError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn attach_drives_one_turn_and_detach_flushes_state() {
        let storage = Arc::new(StorageGateway::new(ConnectionPool::open_in_memory().unwrap()));
        seed(&storage, 7, r#"{"system_prompt": "be terse"}"#);

        let manager = SessionManager::new(
            storage.clone(),
            Arc::new(FixedCapabilityResolver(bundle())),
            Arc::new(NoopSessionAnalysisQueue),
        );
        let (callbacks, captured_llm) = noop_callbacks();

        let handle = manager
            .attach(UserId(7), AgentId(7), Some(SessionId::new()), false, callbacks)
            .await
            .expect("attach succeeds");

        handle.submit_text("hello there").await.expect("submit text");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(
            !captured_llm.lock().await.is_empty(),
            "llm text callback should have received at least one chunk"
        );

        manager.detach(handle).await.expect("detach succeeds");

        let agent = storage.get_agent(AgentId(7)).unwrap().unwrap();
        assert_eq!(agent.agent_config, json!({"system_prompt": "be terse"}));
    }

    #[tokio::test]
    async fn copilot_session_has_no_audio_nodes() {
        let storage = Arc::new(StorageGateway::new(ConnectionPool::open_in_memory().unwrap()));
        seed(&storage, 9, "{}");

        let manager = SessionManager::new(
            storage,
            Arc::new(FixedCapabilityResolver(bundle())),
            Arc::new(NoopSessionAnalysisQueue),
        );
        let (callbacks, _captured) = noop_callbacks();

        let handle = manager
            .attach(UserId(9), AgentId(9), None, true, callbacks)
            .await
            .expect("attach succeeds");

        assert!(handle.engine().get_node("vad").is_none());
        assert!(handle.engine().get_node("tts").is_none());
        handle
            .submit_audio_frame(bytes::Bytes::from_static(b"frame"))
            .await
            .expect("no-op for copilot session");

        manager.detach(handle).await.expect("detach succeeds");
    }
}
