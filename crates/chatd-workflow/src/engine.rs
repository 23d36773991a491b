use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::chunk::Chunk;
use crate::config::{ChunkKindSpec, GraphConfig, NodeMode};
use crate::context::{EngineContext, GlobalVar};
use crate::error::{Result, WorkflowError};
use crate::node::Node;
use crate::router::{ExternalCallback, Router};

/// Grace period `stop()` waits for node tasks to unwind cooperatively
/// before giving up and logging stragglers (spec.md §5: "cancel all
/// engine tasks... cooperative, not forced").
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// A running engine's join handles, returned by `start()` and consumed by
/// `stop()`.
pub struct EngineHandle {
    supervisors: Vec<JoinHandle<()>>,
    lifetime: CancellationToken,
}

/// One graph of typed nodes bound for a single session (spec.md §4.1).
pub struct WorkflowEngine {
    graph: GraphConfig,
    router: Arc<Router>,
    ctx: EngineContext,
    handle: Mutex<Option<EngineHandle>>,
}

impl WorkflowEngine {
    /// `load_config(dict)`: validate edge type-compatibility, register
    /// every node instance and internal edge with the router. Node
    /// *instances* are supplied by the caller (`chatd-nodes` knows how to
    /// build a `route`/`agent`/`tts` node; this crate only knows the
    /// graph shape) — this is `load_config_dict` from SPEC_FULL §4.1.
    pub fn load_config_dict(
        graph: GraphConfig,
        nodes: HashMap<String, Arc<dyn Node>>,
    ) -> Result<Self> {
        let router = Arc::new(Router::new());

        for (node_id, node) in &nodes {
            if node.config().node_id != *node_id {
                return Err(WorkflowError::ConfigError(format!(
                    "node instance for '{node_id}' declares node_id '{}'",
                    node.config().node_id
                )));
            }
            router.register_node(node_id.clone(), node.clone());
        }

        for node_cfg in &graph.nodes {
            if !nodes.contains_key(&node_cfg.node_id) {
                return Err(WorkflowError::NodeNotFound(node_cfg.node_id.clone()));
            }
        }

        for edge in &graph.edges {
            let src = nodes
                .get(&edge.src_node)
                .ok_or_else(|| WorkflowError::NodeNotFound(edge.src_node.clone()))?;
            let dst = nodes
                .get(&edge.dst_node)
                .ok_or_else(|| WorkflowError::NodeNotFound(edge.dst_node.clone()))?;

            let src_spec = src.config().output(&edge.src_out).ok_or_else(|| {
                WorkflowError::IncompatibleEdge {
                    src_node: edge.src_node.clone(),
                    src_out: edge.src_out.clone(),
                    dst_node: edge.dst_node.clone(),
                    dst_in: edge.dst_in.clone(),
                    reason: "unknown source output".to_string(),
                }
            })?;
            let dst_spec = dst.config().input(&edge.dst_in).ok_or_else(|| {
                WorkflowError::IncompatibleEdge {
                    src_node: edge.src_node.clone(),
                    src_out: edge.src_out.clone(),
                    dst_node: edge.dst_node.clone(),
                    dst_in: edge.dst_in.clone(),
                    reason: "unknown destination input".to_string(),
                }
            })?;
            if src_spec.kind != dst_spec.kind {
                return Err(WorkflowError::IncompatibleEdge {
                    src_node: edge.src_node.clone(),
                    src_out: edge.src_out.clone(),
                    dst_node: edge.dst_node.clone(),
                    dst_in: edge.dst_in.clone(),
                    reason: format!("{:?} output into {:?} input", src_spec.kind, dst_spec.kind),
                });
            }

            router.connect_internal(
                edge.src_node.clone(),
                edge.src_out.clone(),
                edge.dst_node.clone(),
                edge.dst_in.clone(),
            );
        }

        Ok(Self {
            graph,
            router,
            ctx: EngineContext::new(CancellationToken::new()),
            handle: Mutex::new(None),
        })
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    pub fn context(&self) -> EngineContext {
        self.ctx.clone()
    }

    pub fn add_external_connection(
        &self,
        node_id: impl Into<String>,
        output: impl Into<String>,
        callback: ExternalCallback,
    ) {
        self.router.add_external_connection(node_id, output, callback);
    }

    pub fn get_node(&self, node_id: &str) -> Option<Arc<dyn Node>> {
        self.router.get_node(node_id)
    }

    pub async fn feed_input_chunk(&self, node_id: &str, input: &str, chunk: Chunk) -> Result<()> {
        let node = self
            .get_node(node_id)
            .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;
        node.feed_input_chunk(input, chunk).await;
        Ok(())
    }

    /// `start(initial_vars)`: populate `global_vars`, then spawn one task
    /// per `Streaming`-mode node (spec.md §4.1). Returns once every task
    /// is spawned; tasks run until `stop()` or their inputs close.
    pub async fn start(&self, initial_vars: HashMap<String, GlobalVar>) -> Result<()> {
        {
            let mut guard = self.handle.lock().await;
            if guard.is_some() {
                return Err(WorkflowError::AlreadyRunning);
            }
            // populate global_vars before any node task is spawned, so
            // later-started nodes always observe the full initial set
            // (spec.md §4.1: "writes are observable to later-started
            // nodes only").
            for (k, v) in initial_vars {
                self.ctx.set(k, v).await;
            }

            let mut supervisors = Vec::new();
            for node_cfg in &self.graph.nodes {
                if node_cfg.mode != NodeMode::Streaming {
                    continue;
                }
                let Some(node) = self.router.get_node(&node_cfg.node_id) else {
                    continue;
                };
                let ctx = self.ctx.clone();
                let router = self.router.clone();
                let node_id = node_cfg.node_id.clone();
                let text_outputs: Vec<String> = node_cfg
                    .outputs
                    .iter()
                    .filter(|p| p.kind == ChunkKindSpec::Text)
                    .map(|p| p.name.clone())
                    .collect();

                let supervisor = tokio::spawn(async move {
                    let run_ctx = ctx.clone();
                    let run_router = router.clone();
                    let run_node = node.clone();
                    let joined = tokio::spawn(async move {
                        run_node.run(run_ctx, run_router).await;
                    })
                    .await;

                    if let Err(join_err) = joined {
                        error!(node_id = %node_id, error = %join_err, "node task panicked; containing failure");
                    }
                    // spec.md §4.1: "if a node's run task exits, its
                    // output streams are closed" — sentinel for text
                    // outputs, nothing to do for Json/Binary (callers
                    // treat a silently-stopped producer as "no more
                    // chunks", which this satisfies by construction).
                    for output in &text_outputs {
                        router.close_output(&node_id, output).await;
                    }
                });
                supervisors.push(supervisor);
            }

            *guard = Some(EngineHandle {
                supervisors,
                lifetime: self.ctx.lifetime.clone(),
            });
        }
        Ok(())
    }

    /// `stop()`: cancel the engine-lifetime token and cooperatively await
    /// every node supervisor, logging (not forcing) stragglers past the
    /// grace period (spec.md §5).
    pub async fn stop(&self) -> Result<()> {
        let EngineHandle {
            supervisors,
            lifetime,
        } = {
            let mut guard = self.handle.lock().await;
            guard.take().ok_or(WorkflowError::NotRunning)?
        };

        lifetime.cancel();

        let all_done = async {
            for sup in supervisors {
                let _ = sup.await;
            }
        };
        if tokio::time::timeout(STOP_GRACE_PERIOD, all_done)
            .await
            .is_err()
        {
            warn!("workflow engine stop: some node tasks did not finish within grace period");
        }
        Ok(())
    }

    /// Cooperative cancellation of only the in-flight turn (spec.md §5
    /// `abort`), leaving the engine and its other nodes running.
    pub async fn abort_turn(&self) {
        self.ctx.abort_turn().await;
    }

    pub async fn begin_turn(&self) -> CancellationToken {
        self.ctx.begin_turn().await
    }
}
