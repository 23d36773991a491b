use std::sync::Arc;

use async_trait::async_trait;
use chatd_workflow::{Chunk, ChunkKindSpec, EngineContext, Node, NodeConfig, NodeMode, ParamSpec, Router};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::support::InputChannel;

/// Sentence-ending punctuation, ASCII and CJK. A sentence flushes as soon
/// as one of these is seen, so the first words of a reply can reach
/// `tts` well before the whole turn has finished generating.
const BOUNDARIES: &[char] = &['.', '!', '?', '\n', '。', '!', '?', ';', ';'];

/// Segments the agent's raw token stream into sentence-sized chunks for
/// `tts` to synthesize incrementally, rather than waiting for the whole
/// reply. The chat-record sink the original node split off into its own
/// fan-out branch is handled directly by `AgentNode` owning
/// `ChatRecordState`, so this node's only remaining job is segmentation.
pub struct PostRouteNode {
    cfg: NodeConfig,
    assistant_in: InputChannel,
}

impl PostRouteNode {
    pub fn new(node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            cfg: NodeConfig {
                node_id: node_id.into(),
                inputs: vec![ParamSpec {
                    name: "assistant_stream".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Text,
                }],
                outputs: vec![ParamSpec {
                    name: "sentence_stream".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Text,
                }],
                params: Default::default(),
                mode: NodeMode::Streaming,
            },
            assistant_in: InputChannel::new("assistant_stream"),
        })
    }
}

#[async_trait]
impl Node for PostRouteNode {
    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    #[instrument(skip(self, _ctx, router), fields(node_id = %self.cfg.node_id))]
    async fn run(self: Arc<Self>, _ctx: EngineContext, router: Arc<Router>) {
        let mut buffer = String::new();
        while let Some(chunk) = self.assistant_in.recv().await {
            let Chunk::Text(token) = chunk else { continue };
            if token.is_empty() {
                break;
            }
            buffer.push_str(&token);
            while let Some(pos) = buffer.find(BOUNDARIES) {
                let split_at = pos + buffer[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
                let sentence: String = buffer.drain(..split_at).collect();
                let trimmed = sentence.trim();
                if !trimmed.is_empty() {
                    router
                        .publish(&self.cfg.node_id, "sentence_stream", Chunk::Text(sentence))
                        .await;
                }
            }
        }
        let trailing = buffer.trim();
        if !trailing.is_empty() {
            router
                .publish(&self.cfg.node_id, "sentence_stream", Chunk::Text(buffer))
                .await;
        }
        router.close_output(&self.cfg.node_id, "sentence_stream").await;
    }

    fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
        (param == self.assistant_in.name()).then(|| self.assistant_in.sender())
    }
}
