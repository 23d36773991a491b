use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunk::ChunkKind;

/// A declared input or output parameter on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    /// `true`: long-lived stream of chunks. `false`: a single scalar value
    /// per invocation (only meaningful for `NodeMode::Request` nodes).
    pub streaming: bool,
    pub kind: ChunkKindSpec,
}

/// Serializable mirror of `ChunkKind`, used in graph config (node graphs
/// are compiled-in const JSON/TOML per SPEC_FULL §4.3, not hand-written
/// Rust enums, so this needs `Deserialize`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKindSpec {
    Text,
    Json,
    Binary,
}

impl From<ChunkKindSpec> for ChunkKind {
    fn from(v: ChunkKindSpec) -> Self {
        match v {
            ChunkKindSpec::Text => ChunkKind::Text,
            ChunkKindSpec::Json => ChunkKind::Json,
            ChunkKindSpec::Binary => ChunkKind::Binary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    /// Long-lived task consuming input chunks as they arrive.
    Streaming,
    /// One input -> one output.
    Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub inputs: Vec<ParamSpec>,
    pub outputs: Vec<ParamSpec>,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    pub mode: NodeMode,
}

impl NodeConfig {
    pub fn output(&self, name: &str) -> Option<&ParamSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&ParamSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    pub fn param_u64(&self, name: &str) -> Option<u64> {
        self.params.get(name).and_then(Value::as_u64)
    }
}

/// One edge in the graph config: `(src_node, src_out) -> (dst_node, dst_in)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub src_node: String,
    pub src_out: String,
    pub dst_node: String,
    pub dst_in: String,
}

/// The full config payload for `WorkflowEngine::load_config_dict`: every
/// node's `NodeConfig` plus the internal edges between them. Node
/// *instances* (the `Arc<dyn Node>`) are supplied separately by the
/// per-session manager (C4), since this crate doesn't know how to build a
/// `route`/`agent`/`tts` node — `chatd-nodes` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub nodes: Vec<NodeConfig>,
    pub edges: Vec<EdgeConfig>,
}
