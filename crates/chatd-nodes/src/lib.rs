//! Concrete node implementations for the default session workflow graph:
//! `vad -> interrupt_controller -> route -> agent -> post_route -> tts`.
//! `chatd-workflow` knows only the graph contract (`Node`, `Router`,
//! `EngineContext`); this crate knows how to build the actual nodes that
//! satisfy it, wiring in the capability/storage/chat-record handles each
//! one needs.

pub mod agent;
pub mod interrupt_controller;
pub mod post_route;
pub mod route;
pub mod support;
pub mod tts;
pub mod vad;

pub use agent::AgentNode;
pub use interrupt_controller::InterruptControllerNode;
pub use post_route::PostRouteNode;
pub use route::RouteNode;
pub use tts::TtsNode;
pub use vad::VadNode;

#[cfg(test)]
mod pipeline_tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use bytes::Bytes;
    use chatd_capabilities::testdouble::{EchoLlm, FixedStt, NullTts};
    use chatd_capabilities::{LlmCapability, SttCapability, TtsCapability};
    use chatd_chat_record::{ChatRecordConfig, ChatRecordState};
    use chatd_core::AgentId;
    use chatd_storage::{ConnectionPool, StorageGateway};
    use chatd_workflow::{Chunk, EdgeConfig, GraphConfig, NodeConfig, WorkflowEngine};
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;

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

    /// Drives one finalized utterance through the full default graph and
    /// checks audio frames and a status event come out the far end, and
    /// that the turn lands in chat-record history.
    #[tokio::test]
    async fn full_pipeline_echoes_one_turn() {
        let storage = Arc::new(StorageGateway::new(ConnectionPool::open_in_memory().expect("pool")));
        let agent_id = seed_agent(&storage, 1);

        let chat_record = Arc::new(AsyncMutex::new(
            ChatRecordState::load(storage.clone(), agent_id, false, ChatRecordConfig::default())
                .expect("load history"),
        ));

        let vad: Arc<dyn chatd_capabilities::VadCapability> =
            Arc::new(chatd_capabilities::testdouble::CountingVad::new(1));
        let stt: Arc<dyn SttCapability> = Arc::new(FixedStt {
            text: "hello there".to_string(),
        });
        let llm: Arc<dyn LlmCapability> = Arc::new(EchoLlm::new("hi yourself."));
        let tts: Arc<dyn TtsCapability> = Arc::new(NullTts);

        let vad_node = VadNode::new("vad", vad, stt);
        let interrupt_node = InterruptControllerNode::new("interrupt_controller");
        let route_node = RouteNode::new("route");
        let agent_node = AgentNode::new(
            "agent",
            agent_id,
            chat_record.clone(),
            storage.clone(),
            llm,
            Some("you are terse".to_string()),
            "test-model".to_string(),
        );
        let post_route_node = PostRouteNode::new("post_route");
        let tts_node = TtsNode::new("tts", tts, "default".into(), "neutral".into());

        let mut nodes: HashMap<String, Arc<dyn chatd_workflow::Node>> = HashMap::new();
        nodes.insert("vad".into(), vad_node.clone());
        nodes.insert("interrupt_controller".into(), interrupt_node.clone());
        nodes.insert("route".into(), route_node.clone());
        nodes.insert("agent".into(), agent_node.clone());
        nodes.insert("post_route".into(), post_route_node.clone());
        nodes.insert("tts".into(), tts_node.clone());

        let graph = GraphConfig {
            nodes: vec![
                node_cfg_of(&*vad_node),
                node_cfg_of(&*interrupt_node),
                node_cfg_of(&*route_node),
                node_cfg_of(&*agent_node),
                node_cfg_of(&*post_route_node),
                node_cfg_of(&*tts_node),
            ],
            edges: vec![
                edge("vad", "recognized_text", "interrupt_controller", "recognized_text"),
                edge("interrupt_controller", "user_text", "route", "user_text"),
                edge("route", "routed_text", "agent", "routed_text"),
                edge("agent", "assistant_stream", "post_route", "assistant_stream"),
            ],
        };

        let engine = WorkflowEngine::load_config_dict(graph, nodes).expect("graph wires up");
        route_node.bind_router(engine.router());

        let captured_audio: Arc<AsyncMutex<Vec<Bytes>>> = Arc::new(AsyncMutex::new(Vec::new()));
        let captured_status: Arc<AsyncMutex<Vec<serde_json::Value>>> = Arc::new(AsyncMutex::new(Vec::new()));
        {
            let captured_audio = captured_audio.clone();
            engine.add_external_connection(
                "tts",
                "audio_stream",
                Arc::new(move |chunk: Chunk| {
                    let captured_audio = captured_audio.clone();
                    Box::pin(async move {
                        if let Chunk::Binary(bytes) = chunk {
                            captured_audio.lock().await.push(bytes);
                        }
                    })
                }),
            );
        }
        {
            let captured_status = captured_status.clone();
            engine.add_external_connection(
                "tts",
                "tts_status",
                Arc::new(move |chunk: Chunk| {
                    let captured_status = captured_status.clone();
                    Box::pin(async move {
                        if let Chunk::Json(value) = chunk {
                            captured_status.lock().await.push(value);
                        }
                    })
                }),
            );
        }
        // post_route.sentence_stream has no internal edge to tts — the
        // real session manager forwards it into tts.text_stream itself
        // (SPEC_FULL §4.3), mirrored here with an external connection.
        {
            let tts_node = tts_node.clone();
            engine.add_external_connection(
                "post_route",
                "sentence_stream",
                Arc::new(move |chunk: Chunk| {
                    let tts_node = tts_node.clone();
                    Box::pin(async move {
                        tts_node.feed_input_chunk("text_stream", chunk).await;
                    })
                }),
            );
        }

        engine.start(HashMap::new()).await.expect("start");

        // CountingVad treats the first fed frame as SpeechStart and the
        // second as the SpeechEnd that carries the finalized utterance.
        let sender = vad_node.input_sender("audio_stream").expect("vad input");
        sender.send(Chunk::Binary(Bytes::from_static(b"frame-1"))).expect("send frame");
        sender.send(Chunk::Binary(Bytes::from_static(b"frame-2"))).expect("send frame");

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert!(!captured_audio.lock().await.is_empty(), "tts should have emitted audio");
        assert!(!captured_status.lock().await.is_empty(), "tts should have emitted status events");

        let history = chat_record.lock().await.history().to_vec();
        assert_eq!(history.len(), 2, "one user + one assistant entry expected");
        assert_eq!(history[0].content, "hello there");
        assert!(history[1].content.contains("hi yourself"));

        engine.stop().await.expect("stop");
    }

    fn node_cfg_of(node: &dyn chatd_workflow::Node) -> NodeConfig {
        node.config().clone()
    }

    fn edge(src_node: &str, src_out: &str, dst_node: &str, dst_in: &str) -> EdgeConfig {
        EdgeConfig {
            src_node: src_node.into(),
            src_out: src_out.into(),
            dst_node: dst_node.into(),
            dst_in: dst_in.into(),
        }
    }
}
