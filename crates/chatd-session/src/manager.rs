use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{instrument, warn};

use chatd_chat_record::{ChatRecordConfig, ChatRecordState};
use chatd_core::config::ChatRecordDefaults;
use chatd_core::{AgentId, SessionId, UserId};
use chatd_nodes::{RouteNode, TtsNode};
use chatd_storage::StorageGateway;
use chatd_workflow::router::ExternalCallback;
use chatd_workflow::{Chunk, GlobalVar, Node, WorkflowEngine};

use crate::accessor::{deep_merge_json, UserDataAccessor};
use crate::analysis::SessionAnalysisQueue;
use crate::capabilities::CapabilityResolver;
use crate::error::{Result, SessionError};
use crate::workflow_templates::{
    build_copilot_graph, build_normal_graph, override_edges_from, NodeBuildParams,
};

/// Host-supplied outbound sinks wired into a session's engine at attach
/// time (spec.md §4.3: "Register external callbacks"). Reused verbatim as
/// `chatd_workflow::router::ExternalCallback`s — the gateway is the only
/// thing that knows how to turn a `Chunk` into a WS frame.
pub struct SessionCallbacks {
    pub on_audio: ExternalCallback,
    pub on_tts_status: ExternalCallback,
    /// Assistant text, one sentence-sized chunk at a time, terminated by
    /// the text end sentinel — feeds both the WS `llm` message type and
    /// (out of scope here) an OpenAI-compatible streaming shim.
    pub on_llm_text: ExternalCallback,
}

/// A live session: one engine, one chat-record state, the in-memory
/// agent row mutated over the session's lifetime and flushed on detach.
pub struct SessionHandle {
    session_id: SessionId,
    agent_id: AgentId,
    user_id: UserId,
    copilot_mode: bool,
    engine: Arc<WorkflowEngine>,
    agent_config: Value,
    memory_data: Value,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn copilot_mode(&self) -> bool {
        self.copilot_mode
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// `text {session_id?, agent_id, content}` (spec.md §4.4): pushed
    /// directly into `interrupt_controller.recognized_text`, bypassing
    /// VAD/STT — wire shape matches what `VadNode` would have produced.
    pub async fn submit_text(&self, content: &str) -> Result<()> {
        let envelope = Chunk::Json(json!({
            "text": content,
            "confidence": 1.0,
            "emotion": "neutral",
            "audio_file_path": "",
        }));
        self.engine
            .feed_input_chunk("interrupt_controller", "recognized_text", envelope)
            .await?;
        Ok(())
    }

    /// Raw compressed-audio binary frame following `listen{state:"start"}`
    /// (spec.md §4.4), fed to `vad.audio_stream`. No-op for copilot
    /// sessions, which have no `vad` node.
    pub async fn submit_audio_frame(&self, data: Bytes) -> Result<()> {
        if self.engine.get_node("vad").is_none() {
            return Ok(());
        }
        self.engine
            .feed_input_chunk("vad", "audio_stream", Chunk::Binary(data))
            .await?;
        Ok(())
    }

    /// `abort {reason?}` (spec.md §4.4/§5): cooperative cancellation of
    /// only the in-flight turn.
    pub async fn abort(&self) {
        self.engine.abort_turn().await;
    }
}

/// Per-session lifecycle manager (C4): attaches storage-backed agent
/// state to a freshly constructed engine, and detaches it again, flushing
/// mutations and enqueueing best-effort session analysis.
pub struct SessionManager {
    storage: Arc<StorageGateway>,
    capabilities: Arc<dyn CapabilityResolver>,
    analysis_queue: Arc<dyn SessionAnalysisQueue>,
    chat_record_defaults: ChatRecordDefaults,
}

impl SessionManager {
    pub fn new(
        storage: Arc<StorageGateway>,
        capabilities: Arc<dyn CapabilityResolver>,
        analysis_queue: Arc<dyn SessionAnalysisQueue>,
    ) -> Self {
        Self {
            storage,
            capabilities,
            analysis_queue,
            chat_record_defaults: ChatRecordDefaults::default(),
        }
    }

    /// Overrides the process-wide chat-record tunable defaults (§6.2),
    /// normally sourced from `AppConfig.chat_record`, used whenever an
    /// agent's own config is silent on a given key.
    pub fn with_chat_record_defaults(mut self, defaults: ChatRecordDefaults) -> Self {
        self.chat_record_defaults = defaults;
        self
    }

    /// Loads `agents`/`agent_templates`/`users` rows, deep-merges template
    /// config under the per-agent one, builds and starts one engine for
    /// the session, and returns a handle the gateway drives per-message
    /// (spec.md §4.3 end to end).
    #[instrument(skip(self, callbacks), fields(%user_id, %agent_id, copilot_mode))]
    pub async fn attach(
        &self,
        user_id: UserId,
        agent_id: AgentId,
        session_id: Option<SessionId>,
        copilot_mode: bool,
        callbacks: SessionCallbacks,
    ) -> Result<SessionHandle> {
        let user = self
            .storage
            .get_user(user_id)?
            .ok_or(SessionError::UserNotFound(user_id))?;
        if user.status == 2 {
            return Err(SessionError::Forbidden(format!("user {user_id} is disabled")));
        }

        let agent = self
            .storage
            .get_agent(agent_id)?
            .ok_or(SessionError::AgentNotFound(agent_id))?;
        if !agent.is_alive() {
            return Err(SessionError::AgentNotFound(agent_id));
        }
        if agent.user_id != user_id {
            return Err(SessionError::Forbidden(format!(
                "agent {agent_id} is not owned by user {user_id}"
            )));
        }

        let template = self.storage.get_agent_template(agent.template_id)?;
        let merged_config = match &template {
            Some(t) => deep_merge_json(&t.agent_config, &agent.agent_config),
            None => agent.agent_config.clone(),
        };

        let accessor = UserDataAccessor::new(merged_config.clone(), agent.memory_data.clone());
        let session_id = session_id.unwrap_or_else(SessionId::new);

        let chat_record_config = chat_record_config_from(&accessor, &self.chat_record_defaults);
        let chat_record = Arc::new(AsyncMutex::new(ChatRecordState::load(
            self.storage.clone(),
            agent_id,
            copilot_mode,
            chat_record_config,
        )?));

        let bundle = self.capabilities.resolve(&merged_config);
        let system_prompt = accessor
            .get_config("system_prompt")
            .and_then(Value::as_str)
            .map(str::to_string);
        let model = accessor
            .get_config("model")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let voice = accessor
            .get_config("voice")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let emotion = accessor
            .get_config("emotion")
            .and_then(Value::as_str)
            .unwrap_or("neutral")
            .to_string();

        let override_edges = override_edges_from(&merged_config);
        let build_params = NodeBuildParams {
            agent_id,
            chat_record,
            storage: self.storage.clone(),
            bundle,
            system_prompt,
            model,
            voice,
            emotion,
        };

        let built = if copilot_mode {
            build_copilot_graph(build_params, override_edges)
        } else {
            build_normal_graph(build_params, override_edges)
        };

        let engine = Arc::new(WorkflowEngine::load_config_dict(built.graph, built.nodes)?);
        bind_route(&built.route, &engine);
        wire_callbacks(&engine, built.tts.as_ref(), callbacks);

        let mut initial_vars = std::collections::HashMap::new();
        initial_vars.insert("session_id".to_string(), GlobalVar::Str(session_id.0.clone()));
        initial_vars.insert("agent_id".to_string(), GlobalVar::I64(agent_id.0));
        initial_vars.insert("user_id".to_string(), GlobalVar::I64(user_id.0));
        initial_vars.insert("copilot_mode".to_string(), GlobalVar::Bool(copilot_mode));
        initial_vars.insert(
            "storage".to_string(),
            GlobalVar::Handle(self.storage.clone()),
        );
        initial_vars.insert(
            "user_data".to_string(),
            GlobalVar::Handle(Arc::new(accessor)),
        );

        engine.start(initial_vars).await?;

        Ok(SessionHandle {
            session_id,
            agent_id,
            user_id,
            copilot_mode,
            engine,
            agent_config: agent.agent_config,
            memory_data: agent.memory_data,
        })
    }

    /// Stops the engine, flushes `agent_config`/`memory_data`
    /// last-writer-wins (spec.md §4.3/§5), and for non-copilot sessions
    /// enqueues best-effort session analysis — logged, never blocking.
    #[instrument(skip(self, handle), fields(session_id = %handle.session_id, agent_id = %handle.agent_id))]
    pub async fn detach(&self, handle: SessionHandle) -> Result<()> {
        handle.engine.stop().await?;

        if let Err(e) = self
            .storage
            .update_agent_state(handle.agent_id, &handle.agent_config, &handle.memory_data)
        {
            warn!(error = %e, "failed to flush agent state on detach");
        }

        if !handle.copilot_mode {
            let queue = self.analysis_queue.clone();
            let session_id = handle.session_id.clone();
            let agent_id = handle.agent_id;
            tokio::spawn(async move {
                if let Err(e) = queue.enqueue(&session_id, agent_id).await {
                    warn!(error = %e, "session analysis enqueue failed");
                }
            });
        }

        Ok(())
    }
}

/// Seeds a `ChatRecordConfig` from the process-wide `ChatRecordDefaults`
/// (§6.2's defaults, themselves sourced from `AppConfig.chat_record`),
/// then lets any per-agent `agent_config` key of the same name override
/// it (§6.2: "Per-agent config keys consumed by the chat-record node").
fn chat_record_config_from(accessor: &UserDataAccessor, defaults: &ChatRecordDefaults) -> ChatRecordConfig {
    let mut cfg = ChatRecordConfig {
        token_threshold: defaults.compress_token_threshold,
        keep_last_rounds: defaults.keep_last_rounds,
        load_history_limit: defaults.load_history_limit,
        memory_extract_max_length: defaults.memory_extract_max_length,
        ..ChatRecordConfig::default()
    };
    if let Some(v) = accessor.get_config("compress_token_threshold").and_then(Value::as_u64) {
        cfg.token_threshold = v;
    }
    if let Some(v) = accessor.get_config("keep_last_rounds").and_then(Value::as_u64) {
        cfg.keep_last_rounds = v;
    }
    if let Some(v) = accessor.get_config("load_history_limit").and_then(Value::as_u64) {
        cfg.load_history_limit = v;
    }
    if let Some(v) = accessor
        .get_config("memory_extract_max_length")
        .and_then(Value::as_u64)
    {
        cfg.memory_extract_max_length = v as usize;
    }
    if let Some(v) = accessor.get_config("compress_system_prompt").and_then(Value::as_str) {
        cfg.compress_system_prompt = v.to_string();
    }
    if let Some(v) = accessor.get_config("compress_user_prompt").and_then(Value::as_str) {
        cfg.compress_user_prompt = v.to_string();
    }
    if let Some(v) = accessor
        .get_config("memory_extract_system_prompt")
        .and_then(Value::as_str)
    {
        cfg.memory_extract_system_prompt = v.to_string();
    }
    if let Some(v) = accessor
        .get_config("memory_extract_user_prompt")
        .and_then(Value::as_str)
    {
        cfg.memory_extract_user_prompt = v.to_string();
    }
    cfg
}

fn bind_route(route: &Arc<RouteNode>, engine: &Arc<WorkflowEngine>) {
    route.bind_router(engine.router());
}

/// Wires the three external sinks spec.md §4.3 names. `post_route`'s
/// `sentence_stream` fans out to both the host's text callback *and*
/// `tts.text_stream` directly (when a `tts` node exists) — mirroring the
/// per-session wiring `chatd-nodes`' own pipeline test does by hand, since
/// that forwarding is this crate's job in production, not an internal
/// graph edge (`chatd-workflow` only knows node-to-node edges).
fn wire_callbacks(engine: &Arc<WorkflowEngine>, tts: Option<&Arc<TtsNode>>, callbacks: SessionCallbacks) {
    engine.add_external_connection("tts", "audio_stream", callbacks.on_audio);
    engine.add_external_connection("tts", "tts_status", callbacks.on_tts_status);

    let tts_node = tts.cloned();
    let on_llm_text = callbacks.on_llm_text;
    engine.add_external_connection(
        "post_route",
        "sentence_stream",
        Arc::new(move |chunk: Chunk| {
            let tts_node = tts_node.clone();
            let on_llm_text = on_llm_text.clone();
            Box::pin(async move {
                if let Some(node) = &tts_node {
                    node.feed_input_chunk("text_stream", chunk.clone()).await;
                }
                on_llm_text(chunk).await;
            })
        }),
    );
}
