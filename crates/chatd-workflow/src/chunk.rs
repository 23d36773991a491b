use bytes::Bytes;
use serde_json::Value;

/// The typed unit of data carried on a graph connection.
///
/// SPEC_FULL §4.1 generalizes `native_dataflow::node::NativeNode`'s raw
/// `Vec<u8>` port model (every port moves opaque bytes, sniffed/deserialized
/// by the receiver) to a small closed enum, because this crate's node set
/// and wire shapes are fixed and known — unlike a general-purpose dataflow
/// library, there is no benefit to byte-blind ports here.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Plain text. An empty string is the end-of-turn sentinel (spec.md
    /// §4.1): every text producer emits it exactly once per logical
    /// response, every text consumer treats it as punctuation rather than
    /// a closed channel.
    Text(String),
    /// Structured control/status envelopes: recognized-text packets,
    /// tts-status events, VAD control payloads.
    Json(Value),
    /// Raw audio frames (opus in, opus out).
    Binary(Bytes),
}

impl Chunk {
    /// The text end sentinel (spec.md §4.1).
    pub fn text_end() -> Chunk {
        Chunk::Text(String::new())
    }

    /// Whether this chunk is the text end sentinel.
    pub fn is_text_end(&self) -> bool {
        matches!(self, Chunk::Text(s) if s.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Chunk::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Chunk::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Chunk::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The variant tag, for type-compatibility checks at edge-registration
    /// time (`ParamSpec`s on both ends must agree).
    pub fn kind(&self) -> ChunkKind {
        match self {
            Chunk::Text(_) => ChunkKind::Text,
            Chunk::Json(_) => ChunkKind::Json,
            Chunk::Binary(_) => ChunkKind::Binary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Text,
    Json,
    Binary,
}
