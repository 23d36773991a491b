use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::chunk::Chunk;
use crate::node::Node;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ExternalCallback = Arc<dyn Fn(Chunk) -> BoxFuture<'static, ()> + Send + Sync>;

/// One registered recipient of a node output: either another node's named
/// input (an internal edge) or a host-registered callback (an external
/// connection). SPEC_FULL §4.1: both are "just entries in the same
/// fan-out list keyed by `(node_id, output)`".
enum Destination {
    Internal { node_id: String, input: String },
    External(ExternalCallback),
}

/// The engine's internal router task analog (SPEC_FULL §4.1, grounded on
/// `native_dataflow::dataflow::NativeDataflow`'s router-task pattern):
/// forwards every `Chunk` published on a wired output to every registered
/// destination. Implemented as a synchronous fan-out rather than an actual
/// background task/channel, since publish is already called from within
/// each producing node's own task — an extra hop would only add latency.
pub struct Router {
    fanout: DashMap<(String, String), Vec<Destination>>,
    nodes: DashMap<String, Arc<dyn Node>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            fanout: DashMap::new(),
            nodes: DashMap::new(),
        }
    }

    pub fn register_node(&self, node_id: impl Into<String>, node: Arc<dyn Node>) {
        self.nodes.insert(node_id.into(), node);
    }

    pub fn get_node(&self, node_id: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(node_id).map(|n| n.clone())
    }

    pub fn nodes(&self) -> HashMap<String, Arc<dyn Node>> {
        self.nodes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Register an internal edge `(src_node, src_out) -> (dst_node, dst_in)`.
    pub fn connect_internal(
        &self,
        src_node: impl Into<String>,
        src_out: impl Into<String>,
        dst_node: impl Into<String>,
        dst_in: impl Into<String>,
    ) {
        self.fanout
            .entry((src_node.into(), src_out.into()))
            .or_default()
            .push(Destination::Internal {
                node_id: dst_node.into(),
                input: dst_in.into(),
            });
    }

    /// Register a host callback against `(node, output)` (spec.md §4.1
    /// "external connections").
    pub fn add_external_connection(
        &self,
        node_id: impl Into<String>,
        output: impl Into<String>,
        callback: ExternalCallback,
    ) {
        self.fanout
            .entry((node_id.into(), output.into()))
            .or_default()
            .push(Destination::External(callback));
    }

    /// Publish one chunk produced on `(node_id, output)` to every
    /// registered destination.
    pub async fn publish(&self, node_id: &str, output: &str, chunk: Chunk) {
        let key = (node_id.to_string(), output.to_string());
        let Some(destinations) = self.fanout.get(&key) else {
            return;
        };
        for dest in destinations.iter() {
            match dest {
                Destination::Internal {
                    node_id: dst_node,
                    input,
                } => {
                    if let Some(node) = self.get_node(dst_node) {
                        node.feed_input_chunk(input, chunk.clone()).await;
                    } else {
                        warn!(dst_node, "internal edge targets unknown node");
                    }
                }
                Destination::External(cb) => {
                    cb(chunk.clone()).await;
                }
            }
        }
    }

    /// Close every destination registered on `(node_id, output)` by
    /// publishing the text end sentinel (spec.md §4.1: "its output
    /// streams are closed" on node-task exit). Destinations that carry
    /// JSON/binary chunks simply ignore a text sentinel they weren't
    /// expecting, matching "closed channel" semantics for those kinds.
    pub async fn close_output(&self, node_id: &str, output: &str) {
        self.publish(node_id, output, Chunk::text_end()).await;
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
