use std::sync::Arc;

use async_trait::async_trait;
use chatd_workflow::{Chunk, ChunkKindSpec, EngineContext, Node, NodeConfig, NodeMode, ParamSpec, Router};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::support::InputChannel;

/// The cooperative-cancellation choke point: every finalized user
/// utterance — whether it arrived via VAD+STT or a direct WebSocket
/// `text` frame — passes through here before reaching `route`/`agent`.
/// Each one opens a fresh turn on `ctx` (superseding whatever turn token
/// is currently in flight), so `abort`/barge-in always cancels exactly
/// the turn the most recent utterance started.
pub struct InterruptControllerNode {
    cfg: NodeConfig,
    recognized_in: InputChannel,
}

impl InterruptControllerNode {
    pub fn new(node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            cfg: NodeConfig {
                node_id: node_id.into(),
                inputs: vec![ParamSpec {
                    name: "recognized_text".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Json,
                }],
                outputs: vec![ParamSpec {
                    name: "user_text".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Text,
                }],
                params: Default::default(),
                mode: NodeMode::Streaming,
            },
            recognized_in: InputChannel::new("recognized_text"),
        })
    }
}

#[async_trait]
impl Node for InterruptControllerNode {
    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    #[instrument(skip(self, ctx, router), fields(node_id = %self.cfg.node_id))]
    async fn run(self: Arc<Self>, ctx: EngineContext, router: Arc<Router>) {
        while let Some(chunk) = self.recognized_in.recv().await {
            let Chunk::Json(envelope) = chunk else { continue };
            let Some(text) = envelope.get("text").and_then(|v| v.as_str()) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            ctx.begin_turn().await;
            router
                .publish(&self.cfg.node_id, "user_text", Chunk::Text(text.to_string()))
                .await;
        }
    }

    fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
        (param == self.recognized_in.name()).then(|| self.recognized_in.sender())
    }
}
