//! A polyglot workflow step execution core.
//!
//! Steps are process-isolated handlers, written in whatever language has a runner
//! (`runner.rs`), invoked by a supervisor (`supervisor.rs`) over a length-framed RPC
//! channel (`rpc/`). Steps are wired into a topic graph (`registry.rs`) and dispatched by
//! an event manager (`event.rs`); each invocation gets a flow-scoped state namespace
//! (`state/`), a stream subscription surface (`stream/`), and a trace context
//! (`trace.rs`) threading its identity through every downstream emission and log line.

pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod retry;
pub mod rpc;
pub mod runner;
pub mod state;
pub mod stream;
pub mod supervisor;
pub mod timeout;
pub mod trace;
pub mod types;

pub use config::{
    LoggingConfig, RetryConfig, RuntimeConfig, StateAdapter, StateBackendConfig, StepsConfig,
    TimeoutConfigSettings,
};
pub use error::{
    ConfigError, ConfigErrorCode, CoreError, EmitError, EmitErrorCode, ProtocolError,
    ProtocolErrorCode, RegistryError, RegistryErrorCode, RunnerError, RunnerErrorCode, StateError,
    StateErrorCode, StreamError, StreamErrorCode, TimeoutError,
};
pub use event::{EmitMode, EventManager, StepInvoker};
pub use executor::{StepExecutor, StepOutcome};
pub use middleware::{ApiRequest, ApiResponse, Middleware, MiddlewareChain, Next};
pub use registry::{RegistryDiff, StepRegistry, TopicIndex};
pub use retry::RetryPolicy;
pub use rpc::{Frame, FrameKind, RpcChannel, RpcHandler};
pub use runner::Runner;
pub use state::{FileStateStore, MemoryStateStore, RemoteStateStore, StateStore};
pub use stream::{StreamDeclarations, StreamRegistry, StreamUpdate};
pub use supervisor::{ClassifiedLine, ProcessOutcome, ProcessSupervisor, classify_line};
pub use timeout::{with_timeout, TimeoutConfig};
pub use trace::TraceContext;
pub use types::{
    Event, EmitDeclaration, FlowName, GroupItems, HttpMethod, JsonValue, RetryDeclaration, Step,
    StepConfig, StepName, Topic, TraceId,
};

/// Convenience re-exports for binaries and tests embedding this crate.
pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::event::{EmitMode, EventManager, StepInvoker};
    pub use crate::executor::{StepExecutor, StepOutcome};
    pub use crate::registry::StepRegistry;
    pub use crate::state::{MemoryStateStore, StateStore};
    pub use crate::stream::StreamRegistry;
    pub use crate::trace::TraceContext;
    pub use crate::types::{Event, Step, StepConfig};
}
