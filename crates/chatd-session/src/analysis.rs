use async_trait::async_trait;

use chatd_core::{AgentId, SessionId};

/// Fire-and-forget hand-off to the external session-analysis worker on
/// detach (SPEC_FULL §4.3, grounded on
/// `original_source/workflow_chat.py`'s `_trigger_session_analysis` being
/// a best-effort, swallow-all-errors call into an external system). The
/// analysis worker itself is out of scope (admin/metrics is a non-goal);
/// this crate only ships the seam plus a no-op implementation.
#[async_trait]
pub trait SessionAnalysisQueue: Send + Sync {
    async fn enqueue(&self, session_id: &SessionId, agent_id: AgentId) -> Result<(), String>;
}

/// Default implementation: logs and succeeds. Swapped out by callers that
/// wire up a real queue (Kafka, a job table, whatever C4's host process
/// uses) — this crate has no opinion on what that looks like.
#[derive(Debug, Default)]
pub struct NoopSessionAnalysisQueue;

#[async_trait]
impl SessionAnalysisQueue for NoopSessionAnalysisQueue {
    async fn enqueue(&self, session_id: &SessionId, agent_id: AgentId) -> Result<(), String> {
        tracing::debug!(%session_id, %agent_id, "session analysis enqueue (noop)");
        Ok(())
    }
}
