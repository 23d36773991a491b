use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chunk::Chunk;
use crate::config::NodeConfig;
use crate::context::EngineContext;

/// One vertex of the workflow graph (spec.md §4.1).
///
/// `Streaming`-mode nodes implement `run`: a long-lived loop that reads
/// from `feed_input_chunk`-fed receivers and writes to `router`-registered
/// outputs until `ctx`'s turn/lifetime token cancels or its inputs close.
/// `Request`-mode nodes additionally implement `call` for one-shot
/// input-to-output invocations (`route`'s classification step, say);
/// `run`'s default implementation is a no-op for those.
#[async_trait]
pub trait Node: Send + Sync {
    fn config(&self) -> &NodeConfig;

    /// Drive this node's streaming lifecycle. `outputs` is the shared
    /// router used to fan out produced chunks to every registered
    /// destination (internal edges and external connections alike).
    async fn run(self: Arc<Self>, ctx: EngineContext, router: Arc<crate::router::Router>) {
        let _ = (ctx, router);
    }

    /// One-shot invocation for `NodeMode::Request` nodes.
    async fn call(&self, _input: Chunk, _ctx: &EngineContext) -> Chunk {
        Chunk::text_end()
    }

    /// Inject a chunk on a named input parameter. Streaming nodes consume
    /// these through their own internal receiver (wired up in `run` via
    /// `NodeHandle::input_receiver`); this default panics for nodes that
    /// never registered that input, which is a graph-construction bug.
    async fn feed_input_chunk(&self, param: &str, chunk: Chunk) {
        if let Some(tx) = self.input_sender(param) {
            let _ = tx.send(chunk);
        }
    }

    /// The sender half of this node's named input queue, if it declared
    /// one. Implementations construct these in their own `new()` and
    /// store the matching receiver for `run` to read from — this is the
    /// "unbounded internal queue per input parameter" spec.md §5 requires.
    fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>>;
}
