use crate::error::{RunnerError, RunnerErrorCode};
use crate::rpc::{RpcChannel, RpcHandler};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Outcome of a supervised worker process once it has fully exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Success,
    NonZeroExit(i32),
    Signaled,
    SpawnFailed(String),
}

/// A single classified line of output: either parses as a JSON object (treated as a
/// structured log record) or falls back to plain text. Classification is line-based; a
/// JSON value split across reads without a terminating newline is logged as plain text
/// for that chunk rather than incrementally reassembled.
#[derive(Debug, Clone)]
pub enum ClassifiedLine {
    Json(Value),
    Text(String),
}

pub fn classify_line(line: &str) -> ClassifiedLine {
    match serde_json::from_str::<Value>(line) {
        Ok(value) if value.is_object() => ClassifiedLine::Json(value),
        _ => ClassifiedLine::Text(line.to_string()),
    }
}

/// Owns a single worker process and its RPC channel for the lifetime of one handler
/// invocation. Worker stdio is exclusively owned by the supervisor for that lifetime:
/// stdin/stdout are wired into the [`RpcChannel`]; stderr is pumped line-by-line and
/// always logged as plain text at error severity, per the protocol's stdout/stderr
/// asymmetry (stdout may carry structured or plain diagnostics depending on the runtime;
/// stderr never does).
pub struct ProcessSupervisor {
    child: Child,
    channel: RpcChannel,
    stderr_pump: Option<JoinHandle<()>>,
}

impl ProcessSupervisor {
    /// Spawn `command args…` with the given environment. Handlers must be registered on
    /// the returned channel immediately — the read loop starts as soon as the pipes are
    /// attached, and any request frame for an unregistered method is answered with a
    /// protocol error rather than buffered indefinitely.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, RunnerError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError {
                    code: RunnerErrorCode::ExecutableNotFound,
                    message: format!("executable '{command}' not found"),
                    step_name: None,
                }
            } else {
                RunnerError {
                    code: RunnerErrorCode::SpawnFailed,
                    message: format!("failed to spawn '{command}': {e}"),
                    step_name: None,
                }
            }
        })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let channel = RpcChannel::spawn(stdout, stdin);

        let stderr_pump = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => error!(target: "worker.stderr", "{line}"),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "error reading worker stderr");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            channel,
            stderr_pump: Some(stderr_pump),
        })
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    pub fn register(&self, method: impl Into<String>, handler: impl RpcHandler + 'static) {
        self.channel.register(method, handler);
    }

    /// Wait for the worker process to exit and classify the result. Exit code 0 is
    /// success; any other exit or a termination by signal is a failure.
    pub async fn wait(mut self) -> ProcessOutcome {
        let outcome = match self.child.wait().await {
            Ok(status) => {
                if status.success() {
                    ProcessOutcome::Success
                } else if let Some(code) = status.code() {
                    ProcessOutcome::NonZeroExit(code)
                } else {
                    ProcessOutcome::Signaled
                }
            }
            Err(e) => {
                warn!(error = %e, "error waiting on worker process");
                ProcessOutcome::SpawnFailed(e.to_string())
            }
        };
        self.channel.close().await;
        if let Some(h) = self.stderr_pump.take() {
            h.abort();
        }
        outcome
    }

    /// Forcibly terminate the worker, tearing down its RPC channel.
    pub async fn kill(mut self) -> Result<(), RunnerError> {
        self.channel.close().await;
        self.child.kill().await.map_err(|e| RunnerError {
            code: RunnerErrorCode::SpawnFailed,
            message: format!("failed to kill worker: {e}"),
            step_name: None,
        })?;
        if let Some(h) = self.stderr_pump.take() {
            h.abort();
        }
        info!("worker process killed");
        Ok(())
    }
}
