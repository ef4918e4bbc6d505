use crate::error::{RunnerError, RunnerErrorCode};
use crate::event::{EmitMode, EventManager, StepInvoker};
use crate::runner::Runner;
use crate::state::StateStore;
use crate::stream::StreamRegistry;
use crate::supervisor::{ProcessOutcome, ProcessSupervisor};
use crate::trace::TraceContext;
use crate::types::{Event, JsonValue, Step, StepConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::oneshot;
use tracing::{info, warn, Instrument};

/// Terminal outcomes of a single step invocation. Exactly one is ever reported per
/// invocation, and no handler may be invoked after it.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success(Option<JsonValue>),
    Failure(String),
    Cancelled,
}

/// The core operation: given a step and the event that triggered it, selects a runner,
/// spawns the worker, brokers its RPC calls against state/streams/events, and reports a
/// terminal outcome.
///
/// Holds an [`EventManager`] behind a [`OnceLock`] because the event manager in turn holds
/// this executor as its [`StepInvoker`] — the two are mutually referential and are wired
/// together once, right after both are constructed.
pub struct StepExecutor {
    state: Arc<dyn StateStore>,
    streams: Arc<StreamRegistry>,
    runners_directory: String,
    event_manager: OnceLock<Arc<EventManager>>,
}

impl StepExecutor {
    /// `runners_directory` is the directory holding the per-language bridge scripts
    /// (`StepsConfig::runners_directory`); it is joined with the selected runner's
    /// `bridge_file()` to form the program argument launched ahead of the step file.
    pub fn new(state: Arc<dyn StateStore>, streams: Arc<StreamRegistry>, runners_directory: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            state,
            streams,
            runners_directory: runners_directory.into(),
            event_manager: OnceLock::new(),
        })
    }

    /// Complete the wiring with the event manager that resolves this executor's topic
    /// subscriptions. Must be called exactly once before any event is dispatched.
    pub fn bind_event_manager(&self, event_manager: Arc<EventManager>) {
        let _ = self.event_manager.set(event_manager);
    }

    fn event_manager(&self) -> &Arc<EventManager> {
        self.event_manager
            .get()
            .expect("StepExecutor::bind_event_manager must run before dispatch")
    }

    /// Build the invocation envelope passed to the runner as its final CLI argument.
    fn build_envelope(&self, step: &Step, event: &Event) -> JsonValue {
        let context_in_first_arg = matches!(step.config, StepConfig::Cron { .. } | StepConfig::Noop { .. });
        let stream_names: Vec<JsonValue> = self
            .streams
            .names()
            .into_iter()
            .map(|name| serde_json::json!({"name": name}))
            .collect();

        serde_json::json!({
            "data": event.data,
            "flows": step.config.flows(),
            "traceId": event.trace_id,
            "contextInFirstArg": context_in_first_arg,
            "streams": stream_names,
        })
    }

    /// Build the worker's argv: `[...runnerFlags, runnerBridgeFile, stepFilePath,
    /// envelopeJSON]`. The bridge file is the language-specific script that loads the user
    /// step file and speaks the RPC protocol back to the parent; without it the step file
    /// would be launched directly as the program, with no RPC channel on the other end.
    fn build_spawn_args(&self, runner: Runner, step_file_path: &str, envelope: &JsonValue) -> Vec<String> {
        let bridge_file = std::path::Path::new(&self.runners_directory)
            .join(runner.bridge_file())
            .to_string_lossy()
            .into_owned();
        runner
            .runner_flags()
            .into_iter()
            .chain([bridge_file, step_file_path.to_string(), envelope.to_string()])
            .collect()
    }

    /// Execute one step invocation to completion and report its terminal outcome.
    pub async fn execute(&self, step: Arc<Step>, event: Event) -> StepOutcome {
        let trace = TraceContext::from_existing(event.trace_id.clone(), step.config.flows().to_vec());
        let span = trace.span(step.name());

        async {
            info!("spawning worker");
            let runner = match Runner::for_step_file(&step.file_path) {
                Ok(r) => r,
                Err(e) => return StepOutcome::Failure(e.message),
            };

            let envelope = self.build_envelope(&step, &event);
            let args = self.build_spawn_args(runner, &step.file_path, &envelope);

            let supervisor = match ProcessSupervisor::spawn(runner.command(), &args, &HashMap::new()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "worker spawn failed");
                    return StepOutcome::Failure(e.message);
                }
            };

            self.install_handlers(&supervisor, step.clone(), trace.clone());

            let (result_tx, result_rx) = oneshot::channel::<Option<JsonValue>>();
            let result_tx = std::sync::Mutex::new(Some(result_tx));
            supervisor.register("result", move |params: JsonValue| {
                let sent = result_tx.lock().unwrap().take();
                async move {
                    if let Some(tx) = sent {
                        let _ = tx.send(Some(params));
                    }
                    Ok(JsonValue::Null)
                }
            });

            info!("running");
            let process_outcome = supervisor.wait().await;
            let result = result_rx.await.unwrap_or(None);

            match process_outcome {
                ProcessOutcome::Success => {
                    info!("step completed");
                    StepOutcome::Success(result)
                }
                ProcessOutcome::NonZeroExit(code) => {
                    let msg = format!("process exited with code {code}");
                    warn!(code, "step failed");
                    StepOutcome::Failure(msg)
                }
                ProcessOutcome::Signaled => StepOutcome::Failure("process terminated by signal".to_string()),
                ProcessOutcome::SpawnFailed(e) => StepOutcome::Failure(e),
            }
        }
        .instrument(span)
        .await
    }

    /// Install parent-side RPC handlers proxying state/stream/emit/log calls. `emit` is
    /// the one privileged method: the executor enforces `event.topic ∈
    /// step.config.emits()` itself, injecting the caller's own trace id rather than
    /// trusting anything the worker sends, so a worker cannot forge a flow it did not
    /// receive.
    fn install_handlers(&self, supervisor: &ProcessSupervisor, step: Arc<Step>, trace: TraceContext) {
        let state = self.state.clone();
        let t = trace.trace_id().to_string();
        supervisor.register("state.get", {
            let state = state.clone();
            let t = t.clone();
            move |params: JsonValue| {
                let state = state.clone();
                let t = t.clone();
                async move {
                    let key = params["key"].as_str().unwrap_or_default().to_string();
                    state
                        .get(&t, &key)
                        .await
                        .map(|v| v.unwrap_or(JsonValue::Null))
                        .map_err(|e| e.to_string())
                }
            }
        });

        supervisor.register("state.set", {
            let state = state.clone();
            let t = t.clone();
            move |params: JsonValue| {
                let state = state.clone();
                let t = t.clone();
                async move {
                    let key = params["key"].as_str().unwrap_or_default().to_string();
                    let value = params["value"].clone();
                    state.set(&t, &key, value).await.map_err(|e| e.to_string())?;
                    Ok(JsonValue::Null)
                }
            }
        });

        supervisor.register("state.delete", {
            let state = state.clone();
            let t = t.clone();
            move |params: JsonValue| {
                let state = state.clone();
                let t = t.clone();
                async move {
                    let key = params["key"].as_str().unwrap_or_default().to_string();
                    state.delete(&t, &key).await.map_err(|e| e.to_string())?;
                    Ok(JsonValue::Null)
                }
            }
        });

        supervisor.register("state.clear", {
            let state = state.clone();
            let t = t.clone();
            move |_params: JsonValue| {
                let state = state.clone();
                let t = t.clone();
                async move {
                    state.clear(&t).await.map_err(|e| e.to_string())?;
                    Ok(JsonValue::Null)
                }
            }
        });

        supervisor.register("state.getGroup", {
            let state = state.clone();
            let t = t.clone();
            move |params: JsonValue| {
                let state = state.clone();
                let t = t.clone();
                async move {
                    // The documented `groupId` argument names the caller's own flow scope;
                    // state has no broader grouping than the trace it was invoked under, so
                    // the parent always resolves it to the injected trace id rather than a
                    // worker-supplied value, the same isolation rule the other `state.*`
                    // handlers apply to `traceId`.
                    let _group_id = params["groupId"].as_str();
                    let group = state.get_group(&t).await.map_err(|e| e.to_string())?;
                    Ok(JsonValue::Array(group.into_values().collect()))
                }
            }
        });

        for name in self.streams.names() {
            let streams = self.streams.clone();
            let stream_name = name.clone();
            supervisor.register(format!("streams.{name}.get"), move |params: JsonValue| {
                let streams = streams.clone();
                let stream_name = stream_name.clone();
                async move {
                    let group_id = params["groupId"].as_str().unwrap_or_default();
                    let id = params["id"].as_str().unwrap_or_default();
                    streams
                        .get(&stream_name, group_id, id)
                        .map(|v| v.unwrap_or(JsonValue::Null))
                        .map_err(|e| e.to_string())
                }
            });

            let streams = self.streams.clone();
            let stream_name = name.clone();
            supervisor.register(format!("streams.{name}.set"), move |params: JsonValue| {
                let streams = streams.clone();
                let stream_name = stream_name.clone();
                async move {
                    let group_id = params["groupId"].as_str().unwrap_or_default();
                    let id = params["id"].as_str().unwrap_or_default();
                    let data = params["data"].clone();
                    streams
                        .set(&stream_name, group_id, id, data)
                        .map_err(|e| e.to_string())
                }
            });

            let streams = self.streams.clone();
            let stream_name = name.clone();
            supervisor.register(format!("streams.{name}.delete"), move |params: JsonValue| {
                let streams = streams.clone();
                let stream_name = stream_name.clone();
                async move {
                    let group_id = params["groupId"].as_str().unwrap_or_default();
                    let id = params["id"].as_str().unwrap_or_default();
                    streams.delete(&stream_name, group_id, id).map_err(|e| e.to_string())?;
                    Ok(JsonValue::Null)
                }
            });

            let streams = self.streams.clone();
            let stream_name = name.clone();
            supervisor.register(format!("streams.{name}.getGroup"), move |params: JsonValue| {
                let streams = streams.clone();
                let stream_name = stream_name.clone();
                async move {
                    let group_id = params["groupId"].as_str().unwrap_or_default();
                    let items = streams.get_group(&stream_name, group_id).map_err(|e| e.to_string())?;
                    Ok(JsonValue::Array(items))
                }
            });
        }

        supervisor.register("log", {
            let step_name = step.name().to_string();
            let t = t.clone();
            move |params: JsonValue| {
                let step_name = step_name.clone();
                let t = t.clone();
                async move {
                    info!(step = %step_name, trace_id = %t, worker_log = %params, "worker log");
                    Ok(JsonValue::Null)
                }
            }
        });

        let event_manager = self.event_manager().clone();
        supervisor.register("emit", move |params: JsonValue| {
            let step = step.clone();
            let event_manager = event_manager.clone();
            let trace_id = trace.trace_id().to_string();
            async move {
                let topic = params["topic"].as_str().unwrap_or_default().to_string();
                let data = params["data"].clone();

                if !is_emit_authorized(&step.config, &topic) {
                    warn!(step = %step.name(), topic = %topic, "invalid emit: topic not declared in step.emits, dropping");
                    return Ok(JsonValue::Null);
                }

                // The parent injects its own trace id; it never trusts one from the worker.
                let event = Event::new(topic, data, trace_id);
                let _ = event_manager.emit(event, EmitMode::Scheduled).await;
                Ok(JsonValue::Null)
            }
        });
    }
}

/// A worker may only emit on topics it declared in its own `emits`/`virtualEmits`; this
/// is enforced parent-side so a worker cannot forge a flow it was never granted.
fn is_emit_authorized(config: &StepConfig, topic: &str) -> bool {
    config.emits().contains(&topic)
}

#[async_trait]
impl StepInvoker for StepExecutor {
    async fn invoke(&self, step: Arc<Step>, event: Event) -> Result<(), String> {
        match self.execute(step, event).await {
            StepOutcome::Success(_) => Ok(()),
            StepOutcome::Failure(msg) => Err(msg),
            StepOutcome::Cancelled => Err("step was cancelled".to_string()),
        }
    }
}

impl From<StepOutcome> for Result<Option<JsonValue>, RunnerError> {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Success(v) => Ok(v),
            StepOutcome::Failure(msg) => Err(RunnerError {
                code: RunnerErrorCode::ProcessExitedNonZero,
                message: msg,
                step_name: None,
            }),
            StepOutcome::Cancelled => Err(RunnerError {
                code: RunnerErrorCode::ProcessKilled,
                message: "step was cancelled".to_string(),
                step_name: None,
            }),
        }
    }
}
