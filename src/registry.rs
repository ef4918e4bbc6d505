use crate::error::{RegistryError, RegistryErrorCode};
use crate::stream::StreamRegistry;
use crate::types::{Step, StepName, StreamDeclarations, Topic};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// The topic graph derived from a snapshot of loaded steps: `topic -> subscribing steps`.
#[derive(Debug, Clone, Default)]
pub struct TopicIndex {
    subscribers: HashMap<Topic, Vec<StepName>>,
}

impl TopicIndex {
    fn build(steps: &HashMap<StepName, Arc<Step>>) -> Self {
        let mut subscribers: HashMap<Topic, Vec<StepName>> = HashMap::new();
        for step in steps.values() {
            for topic in step.config.subscribes() {
                subscribers
                    .entry(topic.to_string())
                    .or_default()
                    .push(step.name().to_string());
            }
        }
        Self { subscribers }
    }

    pub fn subscribers(&self, topic: &str) -> &[StepName] {
        self.subscribers.get(topic).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.subscribers.keys()
    }
}

/// A diff produced by a registry mutation, surfaced for operator visibility rather than
/// treated as an error: invalid references and orphan topics are warnings, not rejections,
/// except where §4.5 requires outright validation failure (name collisions, malformed
/// schemas).
#[derive(Debug, Clone, Default)]
pub struct RegistryDiff {
    pub added: Vec<StepName>,
    pub removed: Vec<StepName>,
    pub orphan_topics: Vec<Topic>,
    pub unreachable_steps: Vec<StepName>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.orphan_topics.is_empty()
            && self.unreachable_steps.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    steps: HashMap<StepName, Arc<Step>>,
    topic_index: TopicIndex,
    streams: StreamDeclarations,
}

fn merge_stream_declarations(steps: &HashMap<StepName, Arc<Step>>) -> StreamDeclarations {
    let mut merged = StreamDeclarations::new();
    for step in steps.values() {
        for (name, schema) in &step.streams {
            merged.insert(name.clone(), schema.clone());
        }
    }
    merged
}

/// Holds the canonical, immutable-once-published set of loaded steps ("LockedData").
/// Readers fetch the current snapshot by cheap `Arc` clone; mutations publish a whole new
/// snapshot atomically under a write lock so no reader ever observes a half-rebuilt
/// topic index.
#[derive(Default)]
pub struct StepRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
    stream_registry: OnceLock<Arc<StreamRegistry>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete the wiring with the stream registry that `addStep`/`updateStep` declares
    /// a loaded step's streams into. Optional: a registry with no stream registry bound
    /// still tracks declared streams in its own snapshot for [`StepRegistry::get_streams`],
    /// it just never reaches a live [`StreamRegistry`].
    pub fn bind_stream_registry(&self, streams: Arc<StreamRegistry>) {
        let _ = self.stream_registry.set(streams);
    }

    fn declare_streams(&self, declarations: &StreamDeclarations) {
        if let Some(streams) = self.stream_registry.get() {
            for (name, schema) in declarations {
                streams.declare(name.clone(), schema.clone());
            }
        }
    }

    fn validate_new_step(
        &self,
        steps: &HashMap<StepName, Arc<Step>>,
        step: &Step,
    ) -> Result<(), RegistryError> {
        if steps.contains_key(step.name()) {
            return Err(RegistryError {
                code: RegistryErrorCode::DuplicateStepName,
                message: format!("a step named '{}' is already registered", step.name()),
                step_name: Some(step.name().to_string()),
            });
        }

        for topic in step.config.subscribes().iter().chain(step.config.emits().iter()) {
            if topic.is_empty() {
                return Err(RegistryError {
                    code: RegistryErrorCode::InvalidSchema,
                    message: "topic names must be non-empty".to_string(),
                    step_name: Some(step.name().to_string()),
                });
            }
        }

        Ok(())
    }

    fn diff_against(
        &self,
        before: &HashMap<StepName, Arc<Step>>,
        after: &HashMap<StepName, Arc<Step>>,
    ) -> RegistryDiff {
        let before_names: HashSet<&StepName> = before.keys().collect();
        let after_names: HashSet<&StepName> = after.keys().collect();

        let added: Vec<StepName> = after_names.difference(&before_names).map(|s| (*s).clone()).collect();
        let removed: Vec<StepName> = before_names.difference(&after_names).map(|s| (*s).clone()).collect();

        let all_emitted: HashSet<&str> = after
            .values()
            .flat_map(|s| s.config.emits())
            .collect();
        let all_subscribed: HashSet<&str> = after
            .values()
            .flat_map(|s| s.config.subscribes())
            .collect();

        let orphan_topics: Vec<Topic> = all_subscribed
            .difference(&all_emitted)
            .map(|t| t.to_string())
            .collect();

        let unreachable_steps: Vec<StepName> = after
            .values()
            .filter(|s| {
                s.config.is_executable()
                    && s.config.subscribes().is_empty()
                    && matches!(s.config, crate::types::StepConfig::Event { .. })
            })
            .map(|s| s.name().to_string())
            .collect();

        RegistryDiff {
            added,
            removed,
            orphan_topics,
            unreachable_steps,
        }
    }

    /// Validate and register a new step, rebuilding the topic index atomically.
    pub fn add_step(&self, step: Step) -> Result<RegistryDiff, RegistryError> {
        let current = self.snapshot.read().clone();
        self.validate_new_step(&current.steps, &step)?;

        let mut steps = current.steps.clone();
        steps.insert(step.name().to_string(), Arc::new(step));
        let topic_index = TopicIndex::build(&steps);
        let streams = merge_stream_declarations(&steps);
        let diff = self.diff_against(&current.steps, &steps);

        self.declare_streams(&streams);
        *self.snapshot.write() = Arc::new(Snapshot { steps, topic_index, streams });
        info!(added = diff.added.len(), "step registry updated");
        Ok(diff)
    }

    /// Remove a step by name. After this call returns, no subsequent emit to a topic the
    /// step subscribed reaches it.
    pub fn remove_step(&self, name: &str) -> Result<RegistryDiff, RegistryError> {
        let current = self.snapshot.read().clone();
        if !current.steps.contains_key(name) {
            return Err(RegistryError {
                code: RegistryErrorCode::StepNotFound,
                message: format!("no step named '{name}' is registered"),
                step_name: Some(name.to_string()),
            });
        }

        let mut steps = current.steps.clone();
        steps.remove(name);
        let topic_index = TopicIndex::build(&steps);
        let streams = merge_stream_declarations(&steps);
        let diff = self.diff_against(&current.steps, &steps);

        *self.snapshot.write() = Arc::new(Snapshot { steps, topic_index, streams });
        Ok(diff)
    }

    /// Replace an existing step in place (hot reload): equivalent to remove + add but
    /// published as a single atomic snapshot swap.
    pub fn update_step(&self, step: Step) -> Result<RegistryDiff, RegistryError> {
        let current = self.snapshot.read().clone();
        let mut steps = current.steps.clone();
        steps.insert(step.name().to_string(), Arc::new(step));
        let topic_index = TopicIndex::build(&steps);
        let streams = merge_stream_declarations(&steps);
        let diff = self.diff_against(&current.steps, &steps);

        self.declare_streams(&streams);
        *self.snapshot.write() = Arc::new(Snapshot { steps, topic_index, streams });
        Ok(diff)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Step>> {
        self.snapshot.read().steps.get(name).cloned()
    }

    pub fn subscribers(&self, topic: &str) -> Vec<Arc<Step>> {
        let snapshot = self.snapshot.read().clone();
        snapshot
            .topic_index
            .subscribers(topic)
            .iter()
            .filter_map(|name| snapshot.steps.get(name).cloned())
            .collect()
    }

    pub fn all_steps(&self) -> Vec<Arc<Step>> {
        self.snapshot.read().steps.values().cloned().collect()
    }

    /// Every topic name appearing in the current topic index, i.e. every topic at least
    /// one loaded step subscribes to.
    pub fn topics(&self) -> Vec<Topic> {
        self.snapshot.read().topic_index.topics().cloned().collect()
    }

    /// Streams declared across every loaded step, merged name to schema. This is what
    /// gets forwarded to the bound stream registry on every `addStep`/`updateStep`, and
    /// what the executor consults to list a step's available streams in its envelope.
    pub fn get_streams(&self) -> StreamDeclarations {
        self.snapshot.read().streams.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepConfig;

    fn event_step(name: &str, subscribes: Vec<&str>, emits: Vec<&str>) -> Step {
        Step {
            file_path: format!("{name}.step.py"),
            version: 1,
            config: StepConfig::Event {
                name: name.to_string(),
                subscribes: subscribes.into_iter().map(String::from).collect(),
                emits: emits
                    .into_iter()
                    .map(|t| crate::types::EmitDeclaration::Bare(t.to_string()))
                    .collect(),
                input_schema: None,
                flows: vec![],
                retry: None,
            },
            streams: StreamDeclarations::new(),
        }
    }

    fn event_step_with_stream(name: &str, subscribes: Vec<&str>, stream: &str) -> Step {
        let mut step = event_step(name, subscribes, vec![]);
        step.streams.insert(stream.to_string(), None);
        step
    }

    #[test]
    fn add_step_rebuilds_topic_index() {
        let registry = StepRegistry::new();
        registry.add_step(event_step("s1", vec!["a"], vec!["b"])).unwrap();

        let subs = registry.subscribers("a");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name(), "s1");
    }

    #[test]
    fn get_streams_merges_declarations_across_loaded_steps() {
        let registry = StepRegistry::new();
        registry.add_step(event_step_with_stream("s1", vec!["a"], "progress")).unwrap();
        registry.add_step(event_step_with_stream("s2", vec!["b"], "results")).unwrap();

        let streams = registry.get_streams();
        assert_eq!(streams.len(), 2);
        assert!(streams.contains_key("progress"));
        assert!(streams.contains_key("results"));
    }

    #[test]
    fn add_step_declares_its_streams_into_a_bound_stream_registry() {
        let registry = StepRegistry::new();
        let stream_registry = Arc::new(crate::stream::StreamRegistry::new());
        registry.bind_stream_registry(stream_registry.clone());

        registry.add_step(event_step_with_stream("s1", vec!["a"], "progress")).unwrap();

        assert_eq!(stream_registry.get("progress", "g1", "i1").unwrap(), None);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = StepRegistry::new();
        registry.add_step(event_step("s1", vec!["a"], vec![])).unwrap();
        let err = registry.add_step(event_step("s1", vec!["b"], vec![])).unwrap_err();
        assert_eq!(err.code, RegistryErrorCode::DuplicateStepName);
    }

    #[test]
    fn remove_step_clears_its_subscriptions() {
        let registry = StepRegistry::new();
        registry.add_step(event_step("s1", vec!["a"], vec![])).unwrap();
        registry.remove_step("s1").unwrap();
        assert!(registry.subscribers("a").is_empty());
    }

    #[test]
    fn remove_unknown_step_errors() {
        let registry = StepRegistry::new();
        let err = registry.remove_step("ghost").unwrap_err();
        assert_eq!(err.code, RegistryErrorCode::StepNotFound);
    }

    #[test]
    fn hot_reload_swaps_subscriptions_atomically() {
        let registry = StepRegistry::new();
        registry.add_step(event_step("s1", vec!["a"], vec![])).unwrap();
        registry.remove_step("s1").unwrap();
        registry
            .add_step(event_step("s1", vec!["c"], vec![]))
            .unwrap();

        assert!(registry.subscribers("a").is_empty());
        assert_eq!(registry.subscribers("c").len(), 1);
    }

    #[test]
    fn diff_reports_orphan_topics() {
        let registry = StepRegistry::new();
        let diff = registry.add_step(event_step("s1", vec!["unfed_topic"], vec![])).unwrap();
        assert!(diff.orphan_topics.contains(&"unfed_topic".to_string()));
    }
}
