use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque JSON payload carried by events, state values, and stream items.
pub type JsonValue = serde_json::Value;

/// Name of a topic on the event graph.
pub type Topic = String;

/// A flow grouping label attached to a step, used for organization and trace tagging.
pub type FlowName = String;

/// The unique name of a registered step.
pub type StepName = String;

/// UUID identifying a single end-to-end execution instance.
pub type TraceId = String;

/// HTTP method recognized by `api`-typed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

/// A declared `emits` entry: either a bare topic name or an annotated form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmitDeclaration {
    Bare(Topic),
    Annotated {
        topic: Topic,
        label: Option<String>,
        #[serde(default)]
        conditional: bool,
    },
}

impl EmitDeclaration {
    pub fn topic(&self) -> &str {
        match self {
            EmitDeclaration::Bare(t) => t,
            EmitDeclaration::Annotated { topic, .. } => topic,
        }
    }
}

/// Per-step retry policy declaration. Carried for forward compatibility with an outer
/// scheduler; the core itself never re-invokes a failed step.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetryDeclaration {
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub initial_delay_ms: u64,
}

/// Tagged step configuration variant, per the `type` discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepConfig {
    Api {
        name: StepName,
        path: String,
        method: HttpMethod,
        #[serde(default)]
        emits: Vec<EmitDeclaration>,
        #[serde(default, rename = "bodySchema")]
        body_schema: Option<JsonValue>,
        #[serde(default)]
        middleware: Vec<String>,
        #[serde(default)]
        flows: Vec<FlowName>,
        #[serde(default)]
        retry: Option<RetryDeclaration>,
    },
    Event {
        name: StepName,
        #[serde(default)]
        subscribes: Vec<Topic>,
        #[serde(default)]
        emits: Vec<EmitDeclaration>,
        #[serde(default, rename = "inputSchema")]
        input_schema: Option<JsonValue>,
        #[serde(default)]
        flows: Vec<FlowName>,
        #[serde(default)]
        retry: Option<RetryDeclaration>,
    },
    Cron {
        name: StepName,
        #[serde(rename = "cronExpression")]
        cron_expression: String,
        #[serde(default)]
        emits: Vec<EmitDeclaration>,
        #[serde(default)]
        flows: Vec<FlowName>,
        #[serde(default)]
        retry: Option<RetryDeclaration>,
    },
    Noop {
        name: StepName,
        #[serde(default, rename = "virtualEmits")]
        virtual_emits: Vec<Topic>,
        #[serde(default, rename = "virtualSubscribes")]
        virtual_subscribes: Vec<Topic>,
        #[serde(default)]
        flows: Vec<FlowName>,
    },
}

impl StepConfig {
    pub fn name(&self) -> &str {
        match self {
            StepConfig::Api { name, .. } => name,
            StepConfig::Event { name, .. } => name,
            StepConfig::Cron { name, .. } => name,
            StepConfig::Noop { name, .. } => name,
        }
    }

    pub fn flows(&self) -> &[FlowName] {
        match self {
            StepConfig::Api { flows, .. } => flows,
            StepConfig::Event { flows, .. } => flows,
            StepConfig::Cron { flows, .. } => flows,
            StepConfig::Noop { flows, .. } => flows,
        }
    }

    /// Topics this step consumes, real or virtual.
    pub fn subscribes(&self) -> Vec<&str> {
        match self {
            StepConfig::Event { subscribes, .. } => subscribes.iter().map(|s| s.as_str()).collect(),
            StepConfig::Noop {
                virtual_subscribes, ..
            } => virtual_subscribes.iter().map(|s| s.as_str()).collect(),
            StepConfig::Api { .. } | StepConfig::Cron { .. } => Vec::new(),
        }
    }

    /// Topics this step may emit, real or virtual.
    pub fn emits(&self) -> Vec<&str> {
        match self {
            StepConfig::Api { emits, .. } | StepConfig::Event { emits, .. } | StepConfig::Cron { emits, .. } => {
                emits.iter().map(|e| e.topic()).collect()
            }
            StepConfig::Noop { virtual_emits, .. } => virtual_emits.iter().map(|s| s.as_str()).collect(),
        }
    }

    /// Whether this step is ever actually executed by the executor (NOOP steps participate
    /// only in the topology graph).
    pub fn is_executable(&self) -> bool {
        !matches!(self, StepConfig::Noop { .. })
    }
}

/// Immutable record of a loaded step: its source file, declared config, and a content version
/// used to detect changes across hot reloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub file_path: String,
    pub version: u64,
    pub config: StepConfig,

    /// Streams this step declares for use, name to optional schema. Forwarded to the
    /// stream registry when the step is loaded; empty for steps that don't use streams.
    #[serde(default)]
    pub streams: StreamDeclarations,
}

impl Step {
    pub fn name(&self) -> &str {
        self.config.name()
    }
}

/// An event flowing through the topic graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub data: JsonValue,
    #[serde(rename = "traceId")]
    pub trace_id: TraceId,
    #[serde(default)]
    pub flows: Vec<FlowName>,
}

impl Event {
    pub fn new(topic: impl Into<Topic>, data: JsonValue, trace_id: impl Into<TraceId>) -> Self {
        Self {
            topic: topic.into(),
            data,
            trace_id: trace_id.into(),
            flows: Vec::new(),
        }
    }

    pub fn with_flows(mut self, flows: Vec<FlowName>) -> Self {
        self.flows = flows;
        self
    }
}

/// Groups a flat list of `(groupId, id) -> value` entries for a single `getGroup` response.
pub type GroupItems = HashMap<String, JsonValue>;

/// Map of a stream name to its declared schema, as carried by a step that uses it.
/// Declared at load time (§4.4): when a step is registered, its entries here are what the
/// step registry forwards to the stream registry via `declare`.
pub type StreamDeclarations = HashMap<String, Option<JsonValue>>;
