use std::sync::Arc;

use async_trait::async_trait;
use chatd_capabilities::{TtsCapability, TtsEvent};
use chatd_workflow::{Chunk, ChunkKindSpec, EngineContext, Node, NodeConfig, NodeMode, ParamSpec, Router};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::support::InputChannel;

/// Drives a `TtsCapability` one sentence at a time over `text_stream`
/// (fed by the session manager's `post_route.sentence_stream` callback,
/// per the external-connection wiring), emitting opus frames on
/// `audio_stream` and lifecycle events on `tts_status`.
pub struct TtsNode {
    cfg: NodeConfig,
    text_in: InputChannel,
    tts: Arc<dyn TtsCapability>,
    voice: String,
    emotion: String,
}

impl TtsNode {
    pub fn new(node_id: impl Into<String>, tts: Arc<dyn TtsCapability>, voice: String, emotion: String) -> Arc<Self> {
        Arc::new(Self {
            cfg: NodeConfig {
                node_id: node_id.into(),
                inputs: vec![ParamSpec {
                    name: "text_stream".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Text,
                }],
                outputs: vec![
                    ParamSpec {
                        name: "audio_stream".into(),
                        streaming: true,
                        kind: ChunkKindSpec::Binary,
                    },
                    ParamSpec {
                        name: "tts_status".into(),
                        streaming: true,
                        kind: ChunkKindSpec::Json,
                    },
                ],
                params: Default::default(),
                mode: NodeMode::Streaming,
            },
            text_in: InputChannel::new("text_stream"),
            tts,
            voice,
            emotion,
        })
    }

    fn status_envelope(event: &TtsEvent) -> Option<serde_json::Value> {
        match event {
            TtsEvent::Start => Some(json!({"state": "start"})),
            TtsEvent::SentenceStart { text } => Some(json!({"state": "sentence_start", "text": text})),
            TtsEvent::SentenceEnd => Some(json!({"state": "sentence_end"})),
            TtsEvent::Stop => Some(json!({"state": "stop"})),
            TtsEvent::Audio(_) => None,
        }
    }

    async fn synthesize_sentence(&self, text: &str, router: &Router) {
        let (tx, mut rx) = mpsc::channel::<TtsEvent>(32);
        let tts = self.tts.clone();
        let text_owned = text.to_string();
        let voice = self.voice.clone();
        let emotion = self.emotion.clone();
        let synth_task = tokio::spawn(async move { tts.synthesize(&text_owned, &voice, &emotion, tx).await });

        while let Some(event) = rx.recv().await {
            if let TtsEvent::Audio(bytes) = &event {
                router
                    .publish(&self.cfg.node_id, "audio_stream", Chunk::Binary(bytes.clone()))
                    .await;
                continue;
            }
            if let Some(envelope) = Self::status_envelope(&event) {
                router
                    .publish(&self.cfg.node_id, "tts_status", Chunk::Json(envelope))
                    .await;
            }
        }

        match synth_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "tts synthesis failed"),
            Err(err) => warn!(error = %err, "tts synthesis task panicked"),
        }
    }
}

#[async_trait]
impl Node for TtsNode {
    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    #[instrument(skip(self, _ctx, router), fields(node_id = %self.cfg.node_id))]
    async fn run(self: Arc<Self>, _ctx: EngineContext, router: Arc<Router>) {
        while let Some(chunk) = self.text_in.recv().await {
            let Chunk::Text(sentence) = chunk else { continue };
            if sentence.is_empty() {
                continue;
            }
            self.synthesize_sentence(&sentence, &router).await;
        }
    }

    fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
        (param == self.text_in.name()).then(|| self.text_in.sender())
    }
}
