use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use chatd_core::config::AppConfig;
use chatd_session::{FixedCapabilityResolver, NoopSessionAnalysisQueue, SessionManager};
use chatd_storage::StorageGateway;

/// Shared process state handed to every connection task via axum's
/// `State` extractor — the gateway binary's analog of the teacher's
/// `skynet_gateway::app::AppState`.
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<StorageGateway>,
    pub session_manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<StorageGateway>, session_manager: Arc<SessionManager>) -> Self {
        Self {
            config,
            storage,
            session_manager,
        }
    }
}

/// Wires a `SessionManager` against deterministic capability doubles
/// (spec.md §1: real provider adapters are a non-goal; `ai_providers`
/// resolution only needs to hand the engine *some* `CapabilityBundle`).
/// A deployment with real adapters swaps this call for one that resolves
/// providers per-agent through `CapabilityResolver`, the seam this crate
/// depends on rather than a concrete type.
pub fn default_session_manager(
    storage: Arc<StorageGateway>,
    chat_record_defaults: chatd_core::config::ChatRecordDefaults,
) -> Arc<SessionManager> {
    use chatd_capabilities::testdouble::{CountingVad, EchoLlm, FixedStt, NullTts};
    use chatd_capabilities::CapabilityBundle;

    let bundle = CapabilityBundle {
        llm: Arc::new(EchoLlm::new("")),
        tts: Arc::new(NullTts),
        stt: Arc::new(FixedStt {
            text: String::new(),
        }),
        vad: Arc::new(CountingVad::new(1)),
    };

    Arc::new(
        SessionManager::new(
            storage,
            Arc::new(FixedCapabilityResolver(bundle)),
            Arc::new(NoopSessionAnalysisQueue),
        )
        .with_chat_record_defaults(chat_record_defaults),
    )
}

/// The one route this crate serves (spec.md §1: no REST/CRUD surface).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/chat", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
