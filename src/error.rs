use thiserror::Error;

/// Top-level error type for the step execution core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("step registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("emit error: {0}")]
    Emit(#[from] EmitError),

    #[error("timeout error: {0}")]
    Timeout(#[from] TimeoutError),
}

/// Configuration validation errors (step registry rejects on load, never reaches the executor).
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}{}", field.as_ref().map(|f| format!(" (field: {f})")).unwrap_or_default())]
pub struct ConfigError {
    pub code: ConfigErrorCode,
    pub message: String,
    pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    MissingRequiredField,
    InvalidValue,
    ValidationFailed,
    FileNotFound,
    ParseError,
}

/// Step registry (LockedData) errors: invalid topic references, duplicate names,
/// malformed step schemas.
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}{}", step_name.as_ref().map(|s| format!(" (step: {s})")).unwrap_or_default())]
pub struct RegistryError {
    pub code: RegistryErrorCode,
    pub message: String,
    pub step_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorCode {
    DuplicateStepName,
    UnknownTopicReference,
    InvalidSchema,
    StepNotFound,
}

/// Runner selection/spawn errors: unsupported extension, missing executable.
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}{}", step_name.as_ref().map(|s| format!(" (step: {s})")).unwrap_or_default())]
pub struct RunnerError {
    pub code: RunnerErrorCode,
    pub message: String,
    pub step_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerErrorCode {
    UnsupportedExtension,
    ExecutableNotFound,
    SpawnFailed,
    ProcessExitedNonZero,
    ProcessKilled,
}

/// RPC channel / wire protocol errors.
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}")]
pub struct ProtocolError {
    pub code: ProtocolErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCode {
    MalformedFrame,
    UnknownMethod,
    ResultAfterTerminal,
    ChannelClosed,
    PendingRequestOverflow,
}

/// State store errors, surfaced to the worker as an RPC error response.
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}{}", trace_id.as_ref().map(|t| format!(" (trace: {t})")).unwrap_or_default())]
pub struct StateError {
    pub code: StateErrorCode,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorCode {
    BackendUnavailable,
    SerializationFailed,
    IoFailure,
}

/// Stream registry errors.
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}{}", stream_name.as_ref().map(|s| format!(" (stream: {s})")).unwrap_or_default())]
pub struct StreamError {
    pub code: StreamErrorCode,
    pub message: String,
    pub stream_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorCode {
    UnknownStream,
    SchemaViolation,
    SubscriberGone,
}

/// Event emission errors (invalid topic is handled as a dropped emit + warning, not this error;
/// this covers the event manager's own internal failures, e.g. dispatch scheduling).
#[derive(Debug, Clone, Error)]
#[error("[{code:?}] {message}")]
pub struct EmitError {
    pub code: EmitErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitErrorCode {
    DispatchFailed,
    NoSubscribers,
}

/// Raised by the optional `timeout` helper (§5: not imposed by the core by default, but
/// exposed for hosts that want to bound an operation explicitly).
#[derive(Debug, Clone, Error)]
#[error("operation '{operation}' timed out after {duration_ms}ms")]
pub struct TimeoutError {
    pub operation: String,
    pub duration_ms: u64,
}
