use std::sync::Arc;

use async_trait::async_trait;
use chatd_capabilities::{VadCapability, VadEvent};
use chatd_workflow::{Chunk, ChunkKindSpec, EngineContext, Node, NodeConfig, NodeMode, ParamSpec, Router};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::support::InputChannel;

/// Segments raw audio frames into finalized utterances via a
/// `VadCapability`, transcribes each via an `SttCapability`, and emits a
/// `recognized_text` envelope matching the one the WebSocket bridge
/// constructs directly for `text` frames:
/// `{text, confidence, emotion, audio_file_path}`.
pub struct VadNode {
    cfg: NodeConfig,
    audio_in: InputChannel,
    vad: Arc<dyn VadCapability>,
    stt: Arc<dyn chatd_capabilities::SttCapability>,
}

impl VadNode {
    pub fn new(
        node_id: impl Into<String>,
        vad: Arc<dyn VadCapability>,
        stt: Arc<dyn chatd_capabilities::SttCapability>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg: NodeConfig {
                node_id: node_id.into(),
                inputs: vec![ParamSpec {
                    name: "audio_stream".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Binary,
                }],
                outputs: vec![ParamSpec {
                    name: "recognized_text".into(),
                    streaming: true,
                    kind: ChunkKindSpec::Json,
                }],
                params: Default::default(),
                mode: NodeMode::Streaming,
            },
            audio_in: InputChannel::new("audio_stream"),
            vad,
            stt,
        })
    }

    fn envelope(text: String, confidence: f32, emotion: Option<String>) -> Chunk {
        Chunk::Json(json!({
            "text": text,
            "confidence": confidence,
            "emotion": emotion.unwrap_or_else(|| "neutral".to_string()),
            "audio_file_path": "",
        }))
    }
}

#[async_trait]
impl Node for VadNode {
    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    #[instrument(skip(self, _ctx, router), fields(node_id = %self.cfg.node_id))]
    async fn run(self: Arc<Self>, _ctx: EngineContext, router: Arc<Router>) {
        while let Some(chunk) = self.audio_in.recv().await {
            let Chunk::Binary(frame) = chunk else { continue };
            let events = match self.vad.feed(&frame).await {
                Ok(events) => events,
                Err(err) => {
                    warn!(error = %err, "vad feed failed; dropping frame");
                    continue;
                }
            };
            for event in events {
                match event {
                    VadEvent::SpeechStart => {}
                    VadEvent::SpeechEnd { utterance } => {
                        match self.stt.transcribe(&utterance).await {
                            Ok(transcript) if !transcript.text.is_empty() => {
                                router
                                    .publish(
                                        &self.cfg.node_id,
                                        "recognized_text",
                                        Self::envelope(
                                            transcript.text,
                                            transcript.confidence,
                                            transcript.emotion,
                                        ),
                                    )
                                    .await;
                            }
                            Ok(_) => {}
                            Err(err) => warn!(error = %err, "transcription failed"),
                        }
                    }
                    VadEvent::WakeWord { text } => {
                        router
                            .publish(
                                &self.cfg.node_id,
                                "recognized_text",
                                Self::envelope(text, 1.0, None),
                            )
                            .await;
                    }
                }
            }
        }
    }

    fn input_sender(&self, param: &str) -> Option<mpsc::UnboundedSender<Chunk>> {
        (param == self.audio_in.name()).then(|| self.audio_in.sender())
    }
}
