//! `chatd-workflow` — the dataflow graph engine (C2): typed nodes,
//! internal/external connections, lifecycle, global context.

pub mod chunk;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod node;
pub mod router;

pub use chunk::{Chunk, ChunkKind};
pub use config::{ChunkKindSpec, EdgeConfig, GraphConfig, NodeConfig, NodeMode, ParamSpec};
pub use context::{EngineContext, GlobalVar};
pub use engine::WorkflowEngine;
pub use error::{Result, WorkflowError};
pub use node::Node;
pub use router::Router;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex as AsyncMutex};

    struct EchoNode {
        cfg: NodeConfig,
        tx: mpsc::UnboundedSender<Chunk>,
        rx: AsyncMutex<mpsc::UnboundedReceiver<Chunk>>,
    }

    impl EchoNode {
        fn new(node_id: &str) -> Arc<Self> {
            let (tx, rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                cfg: NodeConfig {
                    node_id: node_id.to_string(),
                    inputs: vec![ParamSpec {
                        name: "in".into(),
                        streaming: true,
                        kind: ChunkKindSpec::Text,
                    }],
                    outputs: vec![ParamSpec {
                        name: "out".into(),
                        streaming: true,
                        kind: ChunkKindSpec::Text,
                    }],
                    params: Default::default(),
                    mode: NodeMode::Streaming,
                },
                tx,
                rx: AsyncMutex::new(rx),
            })
        }
    }

    #[async_trait]
    impl Node for EchoNode {
        fn config(&self) -> &NodeConfig {
            &self.cfg
        }

        async fn run(self: Arc<Self>, _ctx: EngineContext, router: Arc<Router>) {
            let mut rx = self.rx.lock().await;
            while let Some(chunk) = rx.recv().await {
                let is_end = chunk.is_text_end();
                router.publish(&self.cfg.node_id, "out", chunk).await;
                if is_end {
                    break;
                }
            }
        }

        fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
            (param == "in").then(|| self.tx.clone())
        }
    }

    #[tokio::test]
    async fn internal_edge_forwards_chunks() {
        let a = EchoNode::new("a");
        let b = EchoNode::new("b");
        let mut nodes: std::collections::HashMap<String, Arc<dyn Node>> = Default::default();
        nodes.insert("a".into(), a.clone());
        nodes.insert("b".into(), b.clone());

        let graph = GraphConfig {
            nodes: vec![a.cfg.clone(), b.cfg.clone()],
            edges: vec![EdgeConfig {
                src_node: "a".into(),
                src_out: "out".into(),
                dst_node: "b".into(),
                dst_in: "in".into(),
            }],
        };

        let engine = WorkflowEngine::load_config_dict(graph, nodes).unwrap();

        let received: Arc<AsyncMutex<Vec<String>>> = Default::default();
        let received2 = received.clone();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        engine.add_external_connection(
            "b",
            "out",
            Arc::new(move |chunk: Chunk| {
                let received = received2.clone();
                let count = count2.clone();
                Box::pin(async move {
                    if let Some(text) = chunk.as_text() {
                        received.lock().await.push(text.to_string());
                    }
                    count.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        engine.start(Default::default()).await.unwrap();
        engine.feed_input_chunk("a", "in", Chunk::Text("hi".into())).await.unwrap();
        engine.feed_input_chunk("a", "in", Chunk::text_end()).await.unwrap();

        // give tasks a moment to drain
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let got = received.lock().await.clone();
        assert_eq!(got, vec!["hi".to_string(), "".to_string()]);

        engine.stop().await.unwrap();
    }

    struct JsonSinkNode {
        cfg: NodeConfig,
    }

    impl JsonSinkNode {
        fn new(node_id: &str) -> Arc<Self> {
            Arc::new(Self {
                cfg: NodeConfig {
                    node_id: node_id.to_string(),
                    inputs: vec![ParamSpec {
                        name: "in".into(),
                        streaming: true,
                        kind: ChunkKindSpec::Json,
                    }],
                    outputs: vec![],
                    params: Default::default(),
                    mode: NodeMode::Streaming,
                },
            })
        }
    }

    #[async_trait]
    impl Node for JsonSinkNode {
        fn config(&self) -> &NodeConfig {
            &self.cfg
        }

        fn input_sender(&self, _param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
            None
        }
    }

    #[test]
    fn incompatible_edge_rejected() {
        let a = EchoNode::new("a");
        let b = JsonSinkNode::new("b");

        let mut nodes: std::collections::HashMap<String, Arc<dyn Node>> = Default::default();
        nodes.insert("a".into(), a.clone());
        nodes.insert("b".into(), b.clone());

        let graph = GraphConfig {
            nodes: vec![a.cfg.clone(), b.cfg.clone()],
            edges: vec![EdgeConfig {
                src_node: "a".into(),
                src_out: "out".into(),
                dst_node: "b".into(),
                dst_in: "in".into(),
            }],
        };

        let result = WorkflowEngine::load_config_dict(graph, nodes);
        assert!(result.is_err());
    }

    /// A node that watches the engine's turn token the way
    /// `AgentNode::run_one_turn` selects on it against an LLM stream —
    /// stands in for it here so this crate can test abort propagation
    /// (spec.md §5/§8 scenario S6) without depending on `chatd-nodes`.
    /// Reports cancellation on a `Json` output rather than `out`'s text
    /// sentinel, so the assertion isn't conflated with the supervisor's
    /// own end-of-stream sentinel on task exit (a distinct mechanism —
    /// see `engine.rs::start`'s `text_outputs` close-on-exit).
    struct CancellableNode {
        cfg: NodeConfig,
    }

    impl CancellableNode {
        fn new(node_id: &str) -> Arc<Self> {
            Arc::new(Self {
                cfg: NodeConfig {
                    node_id: node_id.to_string(),
                    inputs: vec![],
                    outputs: vec![ParamSpec {
                        name: "status".into(),
                        streaming: true,
                        kind: ChunkKindSpec::Json,
                    }],
                    params: Default::default(),
                    mode: NodeMode::Streaming,
                },
            })
        }
    }

    #[async_trait]
    impl Node for CancellableNode {
        fn config(&self) -> &NodeConfig {
            &self.cfg
        }

        async fn run(self: Arc<Self>, ctx: EngineContext, router: Arc<Router>) {
            let turn_token = ctx.current_turn().await;
            turn_token.cancelled().await;
            router
                .publish(&self.cfg.node_id, "status", Chunk::Json(serde_json::json!({"aborted": true})))
                .await;
        }

        fn input_sender(&self, _param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
            None
        }
    }

    #[tokio::test]
    async fn abort_turn_cancels_the_current_turn_token() {
        let node = CancellableNode::new("agent");
        let mut nodes: std::collections::HashMap<String, Arc<dyn Node>> = Default::default();
        nodes.insert("agent".into(), node.clone());

        let graph = GraphConfig {
            nodes: vec![node.cfg.clone()],
            edges: vec![],
        };
        let engine = WorkflowEngine::load_config_dict(graph, nodes).unwrap();

        let received: Arc<AsyncMutex<Vec<bool>>> = Default::default();
        let received2 = received.clone();
        engine.add_external_connection(
            "agent",
            "status",
            Arc::new(move |chunk: Chunk| {
                let received = received2.clone();
                Box::pin(async move {
                    if let Some(v) = chunk.as_json() {
                        received.lock().await.push(v["aborted"].as_bool().unwrap_or(false));
                    }
                })
            }),
        );

        engine.start(Default::default()).await.unwrap();
        engine.abort_turn().await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let got = received.lock().await.clone();
        assert_eq!(got, vec![true], "abort_turn must cancel the turn token the node observed");

        engine.stop().await.unwrap();
    }
}
