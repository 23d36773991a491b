use std::sync::Arc;

use async_trait::async_trait;
use chatd_workflow::{Chunk, ChunkKindSpec, EngineContext, Node, NodeConfig, NodeMode, ParamSpec, Router};
use tokio::sync::mpsc;

/// One-shot routing step between `interrupt_controller` and `agent`.
/// `Request`-mode nodes have no `run` task; `feed_input_chunk` invokes
/// `call` directly and republishes the result, so they slot into the same
/// edge-forwarding path streaming nodes use.
///
/// Classification itself (which agent persona/skill handles a turn) is
/// out of scope here — every turn currently routes straight through to
/// `agent` unchanged.
pub struct RouteNode {
    cfg: NodeConfig,
    router: std::sync::OnceLock<Arc<Router>>,
}

impl RouteNode {
    pub fn new(node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            cfg: NodeConfig {
                node_id: node_id.into(),
                inputs: vec![ParamSpec {
                    name: "user_text".into(),
                    streaming: false,
                    kind: ChunkKindSpec::Text,
                }],
                outputs: vec![ParamSpec {
                    name: "routed_text".into(),
                    streaming: false,
                    kind: ChunkKindSpec::Text,
                }],
                params: Default::default(),
                mode: NodeMode::Request,
            },
            router: std::sync::OnceLock::new(),
        })
    }

    /// Request-mode nodes don't receive the router through `run` (it's
    /// never called), so the per-session manager wires it in once at
    /// graph-build time instead.
    pub fn bind_router(&self, router: Arc<Router>) {
        let _ = self.router.set(router);
    }
}

#[async_trait]
impl Node for RouteNode {
    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    async fn call(&self, input: Chunk, _ctx: &EngineContext) -> Chunk {
        input
    }

    async fn feed_input_chunk(&self, param: &str, chunk: Chunk) {
        if param != "user_text" {
            return;
        }
        if let Some(router) = self.router.get() {
            router.publish(&self.cfg.node_id, "routed_text", chunk).await;
        }
    }

    fn input_sender(&self, _param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
        None
    }
}
