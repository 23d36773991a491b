//! Per-connection WS task: authenticates, performs the `hello` handshake,
//! then demultiplexes `listen`/`text`/`abort`/`mcp`/binary frames into the
//! session's workflow engine and multiplexes the engine's external
//! connections back out as protocol messages (spec.md §4.4), grounded on
//! `skynet_gateway::ws::connection::handle_connection`'s `tokio::select!`
//! connection-task shape.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use chatd_core::{AgentId, SessionId};
use chatd_session::{SessionCallbacks, SessionHandle};
use chatd_workflow::router::ExternalCallback;
use chatd_workflow::Chunk;

use crate::app::AppState;
use crate::error::{GatewayError, Result};
use crate::protocol::{AudioParams, InboundMessage, ListenState, OutboundMessage};
use crate::ws::handshake::{self, AuthenticatedConnection, ConnectQuery};
use crate::ws::send::{self, WsSink};

/// Connection state machine (spec.md §4.4):
/// `[connected] --hello--> [ready] --.../disconnect--> [closed]`.
enum ConnState {
    AwaitingHello,
    Ready,
    Closing,
}

/// The one workflow engine a connection drives once a `text` frame has
/// named an agent (spec.md §3: "SessionContext is exclusively owned by
/// its session manager").
struct ActiveSession {
    handle: SessionHandle,
    agent_id: AgentId,
    listening: bool,
}

/// A chunk produced by the engine's external connections, relayed from
/// node tasks into this connection's single writer task.
enum OutEvent {
    Audio(Bytes),
    Message(OutboundMessage),
}

/// `GET /ws/chat` — axum handler (spec.md §6.1 endpoint).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    match handshake::authenticate(&headers, &query, &state.config, &state.storage) {
        Ok(auth) => ws.on_upgrade(move |socket| handle_connection(socket, state, auth, query.copilot)),
        Err(err) => {
            warn!(error = %err, "websocket rejected before upgrade");
            ws.on_upgrade(move |socket| reject(socket, err))
        }
    }
}

/// Completes the HTTP upgrade (required by `WebSocketUpgrade`) only to
/// immediately close with `1008`, since auth/protocol failures are
/// detected before a session exists (spec.md §4.4/§6.1: "Close codes:
/// `1008` for auth/protocol violation").
async fn reject(mut socket: WebSocket, err: GatewayError) {
    let frame = CloseFrame {
        code: 1008,
        reason: err.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

#[instrument(skip(socket, state, auth), fields(user_id = %auth.user_id, client_id = %auth.client_id))]
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, auth: AuthenticatedConnection, copilot_mode: bool) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id, "websocket connected");

    let (mut tx, mut rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutEvent>();

    let mut conn_state = ConnState::AwaitingHello;
    let mut active: Option<ActiveSession> = None;

    let mut heartbeat = interval(std::time::Duration::from_secs(state.config.server.heartbeat_interval_secs));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > state.config.server.max_payload_bytes {
                            let err = GatewayError::PayloadTooLarge(text.len());
                            warn!(conn_id, size = text.len(), "payload too large, closing");
                            let _ = send::json(&mut tx, &OutboundMessage::error(err.code(), err.to_string())).await;
                            let frame = CloseFrame { code: 1008, reason: err.to_string().into() };
                            let _ = tx.send(Message::Close(Some(frame))).await;
                            break;
                        }
                        if !process_text_frame(
                            &text, &mut conn_state, &mut active, &state, &auth,
                            copilot_mode, &out_tx, &mut tx,
                        ).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Some(session) = active.as_ref() {
                            if session.listening {
                                let _ = session.handle.submit_audio_frame(data).await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }

            Some(event) = out_rx.recv() => {
                let sent = match event {
                    OutEvent::Audio(bytes) => send::binary(&mut tx, bytes).await,
                    OutEvent::Message(msg) => send::json(&mut tx, &msg).await,
                };
                if sent.is_err() {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if matches!(conn_state, ConnState::Closing) {
                    break;
                }
                if tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }

        if matches!(conn_state, ConnState::Closing) {
            break;
        }
    }

    if let Some(session) = active.take() {
        if let Err(err) = state.session_manager.detach(session.handle).await {
            warn!(conn_id, error = %err, "session detach failed");
        }
    }
    info!(conn_id, "websocket disconnected");
}

/// Known `InboundMessage` tags (spec.md §6.1). Checked ahead of the real
/// `serde_json` deserialization so an unrecognized `type` is reported as
/// `METHOD_NOT_FOUND` (spec.md §7) rather than folded into the generic
/// `PROTOCOL_ERROR` a malformed-but-known message produces.
const KNOWN_MESSAGE_TYPES: &[&str] = &["hello", "listen", "text", "abort", "mcp"];

fn unknown_message_type(text: &str) -> Option<GatewayError> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let ty = value.get("type")?.as_str()?;
    (!KNOWN_MESSAGE_TYPES.contains(&ty)).then(|| GatewayError::MethodNotFound(ty.to_string()))
}

/// Handle one inbound text frame. Returns `false` when the connection
/// loop should stop (fatal protocol/auth error or `hello`-less client
/// exhausting its patience is not modeled — only explicit fatal errors
/// close here, per spec.md §4.4: "the state remains `[connected]`" for
/// recoverable pre-hello violations).
async fn process_text_frame(
    text: &str,
    conn_state: &mut ConnState,
    active: &mut Option<ActiveSession>,
    state: &Arc<AppState>,
    auth: &AuthenticatedConnection,
    copilot_mode: bool,
    out_tx: &mpsc::UnboundedSender<OutEvent>,
    tx: &mut WsSink,
) -> bool {
    if let Some(err) = unknown_message_type(text) {
        let _ = send::json(tx, &OutboundMessage::error(err.code(), err.to_string())).await;
        return true;
    }

    let inbound: InboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(err) => {
            let _ = send::json(tx, &OutboundMessage::error("PROTOCOL_ERROR", err.to_string())).await;
            return true;
        }
    };

    match conn_state {
        ConnState::AwaitingHello => match inbound {
            InboundMessage::Hello { version: _, transport: _, audio_params: _ } => {
                let reply = OutboundMessage::Hello {
                    transport: "websocket".to_string(),
                    audio_params: AudioParams::server_default(),
                };
                if send::json(tx, &reply).await.is_err() {
                    return false;
                }
                *conn_state = ConnState::Ready;
                true
            }
            _ => {
                let _ = send::json(tx, &OutboundMessage::error("PROTOCOL_ERROR", "hello required first")).await;
                true
            }
        },

        ConnState::Ready => {
            match dispatch_ready(inbound, active, state, auth, copilot_mode, out_tx).await {
                Ok(()) => true,
                Err(err) => {
                    let _ = send::json(tx, &OutboundMessage::error(err.code(), err.to_string())).await;
                    if err.is_fatal() {
                        let frame = CloseFrame { code: 1008, reason: err.to_string().into() };
                        let _ = tx.send(Message::Close(Some(frame))).await;
                        *conn_state = ConnState::Closing;
                        return false;
                    }
                    true
                }
            }
        }

        ConnState::Closing => false,
    }
}

async fn dispatch_ready(
    inbound: InboundMessage,
    active: &mut Option<ActiveSession>,
    state: &Arc<AppState>,
    auth: &AuthenticatedConnection,
    copilot_mode: bool,
    out_tx: &mpsc::UnboundedSender<OutEvent>,
) -> Result<()> {
    match inbound {
        InboundMessage::Hello { .. } => Ok(()),

        InboundMessage::Text { session_id, content, agent_id } => {
            let agent_id = AgentId(agent_id);
            ensure_session(active, state, auth, agent_id, session_id, copilot_mode, out_tx).await?;
            let session = active.as_ref().expect("just ensured");
            session.handle.submit_text(&content).await?;
            Ok(())
        }

        InboundMessage::Listen { state: listen_state, text, .. } => match listen_state {
            ListenState::Start => {
                let session = active
                    .as_mut()
                    .ok_or_else(|| GatewayError::Protocol("listen.start requires an initialized workflow".to_string()))?;
                session.listening = true;
                Ok(())
            }
            ListenState::Stop => {
                if let Some(session) = active.as_mut() {
                    session.listening = false;
                }
                Ok(())
            }
            ListenState::Detect => {
                if let (Some(session), Some(hint)) = (active.as_ref(), text) {
                    session.handle.submit_text(&hint).await?;
                }
                Ok(())
            }
        },

        InboundMessage::Abort { .. } => {
            if let Some(session) = active.as_ref() {
                session.handle.abort().await;
                let _ = out_tx.send(OutEvent::Message(OutboundMessage::Tts {
                    state: "stop".to_string(),
                    text: None,
                }));
            }
            Ok(())
        }

        InboundMessage::Mcp { payload, .. } => {
            tracing::debug!(?payload, "mcp message received (reserved, no-op)");
            Ok(())
        }
    }
}

/// Attaches a fresh session on first `text`, or re-initializes the
/// workflow when the named `agent_id` differs from the active one
/// (spec.md §4.4: "if the current session's `agent_id` differs, tear
/// down and reinitialize the workflow for the new agent").
async fn ensure_session(
    active: &mut Option<ActiveSession>,
    state: &Arc<AppState>,
    auth: &AuthenticatedConnection,
    agent_id: AgentId,
    session_id: Option<String>,
    copilot_mode: bool,
    out_tx: &mpsc::UnboundedSender<OutEvent>,
) -> Result<()> {
    if let Some(session) = active.as_ref() {
        if session.agent_id == agent_id {
            return Ok(());
        }
        let stale = active.take().expect("checked above");
        state.session_manager.detach(stale.handle).await?;
    }

    let callbacks = build_callbacks(out_tx.clone());
    let session_id = session_id.map(SessionId);
    let handle = state
        .session_manager
        .attach(auth.user_id, agent_id, session_id, copilot_mode, callbacks)
        .await?;

    *active = Some(ActiveSession {
        handle,
        agent_id,
        listening: false,
    });
    Ok(())
}

/// Wires the three host callbacks spec.md §4.3 names into protocol
/// messages this connection's writer loop understands.
fn build_callbacks(out_tx: mpsc::UnboundedSender<OutEvent>) -> SessionCallbacks {
    let audio_tx = out_tx.clone();
    let on_audio: ExternalCallback = Arc::new(move |chunk: Chunk| {
        let audio_tx = audio_tx.clone();
        Box::pin(async move {
            if let Some(bytes) = chunk.as_binary() {
                let _ = audio_tx.send(OutEvent::Audio(bytes.clone()));
            }
        })
    });

    let status_tx = out_tx.clone();
    let on_tts_status: ExternalCallback = Arc::new(move |chunk: Chunk| {
        let status_tx = status_tx.clone();
        Box::pin(async move {
            let Some(value) = chunk.as_json() else { return };
            let state = value.get("state").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let text = value.get("text").and_then(|v| v.as_str()).map(str::to_string);
            let _ = status_tx.send(OutEvent::Message(OutboundMessage::Tts { state, text }));
        })
    });

    let llm_tx = out_tx;
    let on_llm_text: ExternalCallback = Arc::new(move |chunk: Chunk| {
        let llm_tx = llm_tx.clone();
        Box::pin(async move {
            if chunk.is_text_end() {
                let _ = llm_tx.send(OutEvent::Message(OutboundMessage::Llm {
                    content: None,
                    emotion: None,
                    finished: Some(true),
                }));
            } else if let Some(text) = chunk.as_text() {
                if !text.is_empty() {
                    let _ = llm_tx.send(OutEvent::Message(OutboundMessage::Llm {
                        content: Some(text.to_string()),
                        emotion: None,
                        finished: None,
                    }));
                }
            }
        })
    });

    SessionCallbacks {
        on_audio,
        on_tts_status,
        on_llm_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_message_types_pass_through() {
        for ty in KNOWN_MESSAGE_TYPES {
            let text = format!(r#"{{"type":"{ty}"}}"#);
            assert!(unknown_message_type(&text).is_none(), "type '{ty}' should be recognized");
        }
    }

    #[test]
    fn unrecognized_type_is_reported_as_method_not_found() {
        let err = unknown_message_type(r#"{"type":"ping"}"#).expect("unknown type detected");
        assert_eq!(err.code(), "METHOD_NOT_FOUND");
    }

    #[test]
    fn malformed_json_is_not_a_method_not_found_case() {
        assert!(unknown_message_type("not json").is_none());
    }
}
