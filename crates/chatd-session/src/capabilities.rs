use serde_json::Value;

use chatd_capabilities::CapabilityBundle;

/// Resolves the `ai_providers` binding a session's `agent_config` refers
/// to into a concrete `CapabilityBundle` (spec.md §4.3/§4.6: "Resolve
/// AI-provider bindings referenced by config... the engine receives
/// capability handles only, never provider-specific types"). Provider
/// *implementations* are out of scope (§1 non-goals), so this trait is the
/// seam between this crate's session wiring and whatever host process
/// constructs real/test-double providers.
pub trait CapabilityResolver: Send + Sync {
    fn resolve(&self, agent_config: &Value) -> CapabilityBundle;
}

/// Returns the same bundle regardless of `agent_config` — the simplest
/// resolver that satisfies the trait seam without modeling per-agent
/// provider selection, which has no real providers to select between in
/// this crate.
pub struct FixedCapabilityResolver(pub CapabilityBundle);

impl CapabilityResolver for FixedCapabilityResolver {
    fn resolve(&self, _agent_config: &Value) -> CapabilityBundle {
        self.0.clone()
    }
}
