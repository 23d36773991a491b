use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// A value stored in the engine's `global_vars` map (spec.md §4.1).
/// Scalars cover the common cross-cutting values named by the spec
/// (`session_id`, `agent_id`, `copilot_mode`); `Handle` covers opaque
/// shared objects (storage gateway, capability bundle, user-data
/// accessor) that nodes downcast back to their concrete type.
#[derive(Clone)]
pub enum GlobalVar {
    Str(String),
    I64(i64),
    Bool(bool),
    Json(serde_json::Value),
    Handle(Arc<dyn Any + Send + Sync>),
}

impl GlobalVar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GlobalVar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GlobalVar::I64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GlobalVar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            GlobalVar::Handle(h) => h.clone().downcast::<T>().ok(),
            _ => None,
        }
    }
}

/// Per-engine shared state: the `global_vars` map (spec.md §4.1 — "writes
/// are observable to later-started nodes only", satisfied here because
/// `start()` populates the map before spawning any node task) plus the
/// engine-lifetime cancellation token and the current per-turn child
/// token used for `abort` (spec.md §5).
#[derive(Clone)]
pub struct EngineContext {
    pub global_vars: Arc<RwLock<HashMap<String, GlobalVar>>>,
    pub lifetime: CancellationToken,
    turn: Arc<RwLock<CancellationToken>>,
}

impl EngineContext {
    pub fn new(lifetime: CancellationToken) -> Self {
        Self {
            global_vars: Arc::new(RwLock::new(HashMap::new())),
            turn: Arc::new(RwLock::new(lifetime.child_token())),
            lifetime,
        }
    }

    pub async fn get(&self, key: &str) -> Option<GlobalVar> {
        self.global_vars.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: GlobalVar) {
        self.global_vars.write().await.insert(key.into(), value);
    }

    /// The cancellation token for the turn currently in flight.
    pub async fn current_turn(&self) -> CancellationToken {
        self.turn.read().await.clone()
    }

    /// Start a fresh turn: cancels any previous (already-finished) turn
    /// token and hands back a brand new child of the engine's lifetime
    /// token, invoked by `interrupt_controller` on each new recognized
    /// user utterance/text frame (spec.md §5).
    pub async fn begin_turn(&self) -> CancellationToken {
        let fresh = self.lifetime.child_token();
        *self.turn.write().await = fresh.clone();
        fresh
    }

    /// Cooperative cancellation for `abort` (spec.md §5/§6.1): cancels
    /// only the in-flight turn, leaving the engine and other nodes alive.
    pub async fn abort_turn(&self) {
        self.turn.read().await.cancel();
    }
}
