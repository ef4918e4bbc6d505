use crate::error::EmitError;
use crate::registry::StepRegistry;
use crate::types::{Event, Step};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Dispatches an emitted event to whichever component actually runs a step. Implemented
/// by the step executor (C7); kept as a trait here so the event manager and the executor
/// do not need to know each other's concrete types, only this seam.
#[async_trait]
pub trait StepInvoker: Send + Sync {
    async fn invoke(&self, step: Arc<Step>, event: Event) -> Result<(), String>;
}

/// Controls whether `emit` returns as soon as subscribers are scheduled, or waits for
/// every subscriber invocation to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Fire-and-forget: return once subscribers are scheduled. Completion is observable
    /// through logs/state, not the return value. Used for external triggers.
    Scheduled,
    /// Await every subscriber invocation before returning. Required for emits issued from
    /// inside a handler via the RPC channel's synchronous `emit`, so that state writes
    /// made by the sub-flow are visible to the caller upon return.
    Synchronous,
}

/// Dispatches topic emissions to subscribing steps (C6). Holds no invocation logic of its
/// own — it resolves subscribers from the step registry's current topic index and hands
/// each one to the configured [`StepInvoker`].
pub struct EventManager {
    registry: Arc<StepRegistry>,
    invoker: Arc<dyn StepInvoker>,
}

impl EventManager {
    pub fn new(registry: Arc<StepRegistry>, invoker: Arc<dyn StepInvoker>) -> Self {
        Self { registry, invoker }
    }

    /// Emit `event`, fanning out to every step currently subscribing its topic.
    /// `source_step` is the emitting step's declared `emits`, used by the caller (the
    /// executor) to enforce the authorization check before this method is reached — by
    /// the time an event arrives here it has already been accepted.
    pub async fn emit(&self, event: Event, mode: EmitMode) -> Result<(), EmitError> {
        let subscribers = self.registry.subscribers(&event.topic);

        if subscribers.is_empty() {
            info!(topic = %event.topic, trace_id = %event.trace_id, "emit with no subscribers");
            return Ok(());
        }

        let invocations = subscribers.into_iter().map(|step| {
            let invoker = self.invoker.clone();
            let event = event.clone();
            let step_name = step.name().to_string();
            async move {
                if let Err(e) = invoker.invoke(step.clone(), event).await {
                    warn!(step = %step_name, error = %e, "subscriber invocation failed");
                }
            }
        });

        match mode {
            EmitMode::Scheduled => {
                for invocation in invocations {
                    tokio::spawn(invocation);
                }
                Ok(())
            }
            EmitMode::Synchronous => {
                join_all(invocations).await;
                Ok(())
            }
        }
    }
}
