use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use chatd_capabilities::CapabilityBundle;
use chatd_chat_record::ChatRecordState;
use chatd_core::AgentId;
use chatd_nodes::{AgentNode, InterruptControllerNode, PostRouteNode, RouteNode, TtsNode, VadNode};
use chatd_storage::StorageGateway;
use chatd_workflow::{EdgeConfig, GraphConfig, Node};

/// The two built-in node graphs (SPEC_FULL §4.3, grounded on
/// `original_source/workflow_chat.py`'s `_load_workflow_config`): the node
/// *set* is fixed (this crate isn't a general dataflow library — §1
/// non-goals), so only the edge wiring differs between `normal` and
/// `copilot` mode and is compiled in rather than read from an external
/// file. A per-agent `workflow_config` key overrides the edges wholesale
/// when present, mirroring the Python reference's "if the caller supplied
/// a custom config, use it directly" behavior.
pub struct BuiltGraph {
    pub graph: GraphConfig,
    pub nodes: HashMap<String, Arc<dyn Node>>,
    pub route: Arc<RouteNode>,
    pub tts: Option<Arc<TtsNode>>,
}

pub struct NodeBuildParams {
    pub agent_id: AgentId,
    pub chat_record: Arc<AsyncMutex<ChatRecordState>>,
    pub storage: Arc<StorageGateway>,
    pub bundle: CapabilityBundle,
    pub system_prompt: Option<String>,
    pub model: String,
    pub voice: String,
    pub emotion: String,
}

fn edge(src_node: &str, src_out: &str, dst_node: &str, dst_in: &str) -> EdgeConfig {
    EdgeConfig {
        src_node: src_node.into(),
        src_out: src_out.into(),
        dst_node: dst_node.into(),
        dst_in: dst_in.into(),
    }
}

fn node_configs(nodes: &HashMap<String, Arc<dyn Node>>) -> Vec<chatd_workflow::NodeConfig> {
    nodes.values().map(|n| n.config().clone()).collect()
}

/// `vad -> interrupt_controller -> route -> agent -> post_route -> tts`:
/// full voice pipeline, used whenever `copilot_mode` is false.
pub fn build_normal_graph(params: NodeBuildParams, override_edges: Option<Vec<EdgeConfig>>) -> BuiltGraph {
    let vad = VadNode::new("vad", params.bundle.vad.clone(), params.bundle.stt.clone());
    let interrupt_controller = InterruptControllerNode::new("interrupt_controller");
    let route = RouteNode::new("route");
    let agent = AgentNode::new(
        "agent",
        params.agent_id,
        params.chat_record,
        params.storage,
        params.bundle.llm.clone(),
        params.system_prompt,
        params.model,
    );
    let post_route = PostRouteNode::new("post_route");
    let tts = TtsNode::new("tts", params.bundle.tts.clone(), params.voice, params.emotion);

    let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
    nodes.insert("vad".into(), vad);
    nodes.insert("interrupt_controller".into(), interrupt_controller);
    nodes.insert("route".into(), route.clone());
    nodes.insert("agent".into(), agent);
    nodes.insert("post_route".into(), post_route);
    nodes.insert("tts".into(), tts.clone());

    let edges = override_edges.unwrap_or_else(|| {
        vec![
            edge("vad", "recognized_text", "interrupt_controller", "recognized_text"),
            edge("interrupt_controller", "user_text", "route", "user_text"),
            edge("route", "routed_text", "agent", "routed_text"),
            edge("agent", "assistant_stream", "post_route", "assistant_stream"),
        ]
    });

    BuiltGraph {
        graph: GraphConfig {
            nodes: node_configs(&nodes),
            edges,
        },
        nodes,
        route,
        tts: Some(tts),
    }
}

/// `interrupt_controller -> route -> agent -> post_route`: text-only,
/// used for `copilot_mode` sessions — no audio ingress/egress, so `vad`
/// and `tts` are dropped from the graph entirely rather than wired up
/// and left idle.
pub fn build_copilot_graph(params: NodeBuildParams, override_edges: Option<Vec<EdgeConfig>>) -> BuiltGraph {
    let interrupt_controller = InterruptControllerNode::new("interrupt_controller");
    let route = RouteNode::new("route");
    let agent = AgentNode::new(
        "agent",
        params.agent_id,
        params.chat_record,
        params.storage,
        params.bundle.llm.clone(),
        params.system_prompt,
        params.model,
    );
    let post_route = PostRouteNode::new("post_route");

    let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
    nodes.insert("interrupt_controller".into(), interrupt_controller);
    nodes.insert("route".into(), route.clone());
    nodes.insert("agent".into(), agent);
    nodes.insert("post_route".into(), post_route);

    let edges = override_edges.unwrap_or_else(|| {
        vec![
            edge("interrupt_controller", "user_text", "route", "user_text"),
            edge("route", "routed_text", "agent", "routed_text"),
            edge("agent", "assistant_stream", "post_route", "assistant_stream"),
        ]
    });

    BuiltGraph {
        graph: GraphConfig {
            nodes: node_configs(&nodes),
            edges,
        },
        nodes,
        route,
        tts: None,
    }
}

/// Extracts `workflow_config.edges` from merged `agent_config`, if the
/// per-agent config named one (SPEC_FULL §4.3: overrides the template
/// wholesale). Node instances stay fixed to this crate's node set — only
/// the wiring between them can be overridden.
pub fn override_edges_from(agent_config: &Value) -> Option<Vec<EdgeConfig>> {
    let raw = agent_config.get("workflow_config")?.get("edges")?;
    serde_json::from_value(raw.clone()).ok()
}
