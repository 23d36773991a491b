use std::sync::Arc;

use async_trait::async_trait;
use chatd_capabilities::llm::{ChatCompletionRequest, ChatMessage as LlmChatMessage, ChatRole, LlmCapability};
use chatd_chat_record::ChatRecordState;
use chatd_core::{AgentId, Role};
use chatd_workflow::{Chunk, ChunkKindSpec, EngineContext, Node, NodeConfig, NodeMode, ParamSpec, Router};
use chatd_storage::StorageGateway;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, instrument, warn};

use crate::support::InputChannel;

fn to_llm_role(role: Role) -> ChatRole {
    match role {
        Role::User => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
        Role::System => ChatRole::System,
    }
}

/// Owns the chat-record state directly (rather than reaching it only
/// through channels — grounded on `original_source/chat_record/context.py`'s
/// `ChatRecordContext` being an attribute of the agent node). Consumes one
/// finalized user turn at a time on `routed_text`, drives the LLM
/// capability's streaming completion, forwards tokens to `post_route`,
/// and finalizes/persists the turn through `ChatRecordState` once the
/// stream ends (naturally or via turn cancellation).
pub struct AgentNode {
    cfg: NodeConfig,
    user_text_in: InputChannel,
    chat_record: Arc<Mutex<ChatRecordState>>,
    storage: Arc<StorageGateway>,
    agent_id: AgentId,
    llm: Arc<dyn LlmCapability>,
    system_prompt: Option<String>,
    model: String,
}

impl AgentNode {
    pub fn new(
        node_id: impl Into<String>,
        agent_id: AgentId,
        chat_record: Arc<Mutex<ChatRecordState>>,
        storage: Arc<StorageGateway>,
        llm: Arc<dyn LlmCapability>,
        system_prompt: Option<String>,
        model: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg: NodeConfig {
                node_id: node_id.into(),
                inputs: vec![ParamSpec {
                    name: "routed_text".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Text,
                }],
                outputs: vec![ParamSpec {
                    name: "assistant_stream".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Text,
                }],
                params: Default::default(),
                mode: NodeMode::Streaming,
            },
            user_text_in: InputChannel::new("routed_text"),
            chat_record,
            storage,
            agent_id,
            llm,
            system_prompt,
            model,
        })
    }

    async fn run_one_turn(&self, session_id: &str, content: String, ctx: &EngineContext, router: &Router) {
        let turn_token = ctx.current_turn().await;
        let current_turn_text = content.clone();

        {
            let mut state = self.chat_record.lock().await;
            if let Err(err) = state.ingest_user_text(session_id, content) {
                warn!(error = %err, "failed to persist user turn; skipping in-memory append");
                return;
            }
        }

        let messages: Vec<LlmChatMessage> = {
            let state = self.chat_record.lock().await;
            state
                .context(self.system_prompt.as_deref(), Some(current_turn_text.as_str()))
                .into_iter()
                .map(|e| LlmChatMessage {
                    role: to_llm_role(e.role),
                    content: e.content,
                })
                .collect()
        };

        let (tx, mut rx) = mpsc::channel::<String>(32);
        let llm = self.llm.clone();
        let request = ChatCompletionRequest {
            messages,
            model: self.model.clone(),
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 1.0,
        };
        tokio::spawn(async move {
            if let Err(err) = llm.chat_completion_stream(&request, tx).await {
                warn!(error = %err, "llm streaming call failed");
            }
        });

        let mut buffer = String::new();
        loop {
            tokio::select! {
                biased;
                _ = turn_token.cancelled() => {
                    break;
                }
                chunk = rx.recv() => {
                    match chunk {
                        Some(token) if token.is_empty() => break,
                        Some(token) => {
                            buffer.push_str(&token);
                            router.publish(&self.cfg.node_id, "assistant_stream", Chunk::Text(token)).await;
                        }
                        None => break,
                    }
                }
            }
        }
        router.close_output(&self.cfg.node_id, "assistant_stream").await;

        if buffer.is_empty() {
            return;
        }
        let should_compress = {
            let mut state = self.chat_record.lock().await;
            if let Err(err) = state.ingest_assistant_text(session_id, buffer) {
                warn!(error = %err, "failed to persist assistant turn");
                return;
            }
            state.try_begin_compression()
        };
        if should_compress {
            self.spawn_compression();
        }
    }

    /// Runs the heavy compression + memory-extraction pass in the
    /// background so the turn above never blocks on it, matching the
    /// "schedule the compression task, do not block the append" rule.
    /// The caller must have already flipped the single-flight flag via
    /// `try_begin_compression` before calling this.
    fn spawn_compression(&self) {
        let chat_record = self.chat_record.clone();
        let storage = self.storage.clone();
        let agent_id = self.agent_id;
        let llm = self.llm.clone();
        tokio::spawn(async move {
            let mut guard = chat_record.lock().await;
            if let Err(err) = guard.run_compression(llm.as_ref()).await {
                error!(error = %err, "compression pass failed");
                return;
            }

            let existing_memory = storage
                .get_agent(agent_id)
                .ok()
                .flatten()
                .and_then(|row| row.memory_data.get("chat")?.get("long_term_memory").cloned())
                .unwrap_or_else(|| serde_json::json!({}));

            let extracted = match guard.extract_memory(llm.as_ref(), &existing_memory).await {
                Ok(value) => value,
                Err(err) => {
                    error!(error = %err, "memory extraction failed");
                    return;
                }
            };
            drop(guard);

            if let Ok(Some(row)) = storage.get_agent(agent_id) {
                let mut memory_data = row.memory_data.clone();
                set_nested(&mut memory_data, &["chat", "long_term_memory"], extracted);
                if let Err(err) = storage.update_agent_state(agent_id, &row.agent_config, &memory_data) {
                    error!(error = %err, "failed to persist extracted memory");
                }
            }
        });
    }
}

fn set_nested(target: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    let obj = target.as_object_mut().unwrap();
    let entry = obj.entry(head.to_string()).or_insert_with(|| Value::Object(Default::default()));
    set_nested(entry, rest, value);
}

#[async_trait]
impl Node for AgentNode {
    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    #[instrument(skip(self, ctx, router), fields(node_id = %self.cfg.node_id))]
    async fn run(self: Arc<Self>, ctx: EngineContext, router: Arc<Router>) {
        let session_id = ctx
            .get("session_id")
            .await
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        while let Some(chunk) = self.user_text_in.recv().await {
            let Chunk::Text(content) = chunk else { continue };
            if content.is_empty() {
                continue;
            }
            self.run_one_turn(&session_id, content, &ctx, &router).await;
        }
    }

    fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
        (param == self.user_text_in.name()).then(|| self.user_text_in.sender())
    }
}
