use crate::types::{FlowName, TraceId};
use uuid::Uuid;

/// Carries the identity of a single end-to-end flow instance through every downstream
/// emission, log line, and state/stream operation.
///
/// Assigned once at the origin of a flow (HTTP request, cron fire, manual emit) and
/// propagated unchanged. A worker cannot forge the trace id it operates under: the
/// executor injects this context into every RPC handler it installs rather than trusting
/// anything the worker sends back.
#[derive(Debug, Clone)]
pub struct TraceContext {
    trace_id: TraceId,
    flows: Vec<FlowName>,
}

impl TraceContext {
    /// Mint a new trace id at the origin of a flow.
    pub fn new_root(flows: Vec<FlowName>) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            flows,
        }
    }

    /// Reconstruct a context for an already-assigned trace id, e.g. when dispatching an
    /// event whose `traceId` was set upstream.
    pub fn from_existing(trace_id: impl Into<TraceId>, flows: Vec<FlowName>) -> Self {
        Self {
            trace_id: trace_id.into(),
            flows,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn flows(&self) -> &[FlowName] {
        &self.flows
    }

    /// Build a derived context for a downstream step invocation, keeping the trace id but
    /// adopting the subscriber's own flow labels for tagging.
    pub fn child(&self, step_flows: Vec<FlowName>) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            flows: step_flows,
        }
    }

    /// A tracing span carrying the trace id and step name, to be entered for the duration
    /// of a single step invocation so every log line underneath picks up the fields.
    pub fn span(&self, step_name: &str) -> tracing::Span {
        tracing::info_span!(
            "step_invocation",
            trace_id = %self.trace_id,
            step = %step_name,
            flows = ?self.flows,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_context_mints_a_uuid() {
        let ctx = TraceContext::new_root(vec!["checkout".into()]);
        assert_eq!(ctx.trace_id().len(), 36);
        assert_eq!(ctx.flows(), &["checkout".to_string()]);
    }

    #[test]
    fn child_context_preserves_trace_id() {
        let root = TraceContext::new_root(vec!["checkout".into()]);
        let child = root.child(vec!["fulfillment".into()]);
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.flows(), &["fulfillment".to_string()]);
    }

    #[test]
    fn from_existing_preserves_given_id() {
        let ctx = TraceContext::from_existing("fixed-trace-id", vec![]);
        assert_eq!(ctx.trace_id(), "fixed-trace-id");
    }
}
