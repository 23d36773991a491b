use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;

use crate::protocol::OutboundMessage;

pub type WsSink = futures_util::stream::SplitSink<WebSocket, Message>;

/// Serialize and send one outbound protocol message (spec.md §6.1).
pub async fn json(tx: &mut WsSink, payload: &OutboundMessage) -> Result<(), axum::Error> {
    tx.send(Message::Text(payload.to_json().into())).await
}

pub async fn binary(tx: &mut WsSink, frame: bytes::Bytes) -> Result<(), axum::Error> {
    tx.send(Message::Binary(frame)).await
}
