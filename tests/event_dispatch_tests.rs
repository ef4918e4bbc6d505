// End-to-end tests of the topic graph: registry -> event manager -> invoker, exercising
// the scenarios the step execution core is expected to satisfy without spawning real
// worker processes for every language runner (that requires the actual interpreters to be
// installed; these tests instead substitute a test double at the StepInvoker seam, the
// same seam the real step executor implements).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use step_runtime::{EmitMode, Event, EventManager, EmitDeclaration, Step, StepConfig, StepInvoker, StepRegistry};
use step_runtime::{MemoryStateStore, StateStore};

fn event_step(name: &str, subscribes: Vec<&str>, emits: Vec<&str>) -> Step {
    Step {
        file_path: format!("{name}.step.py"),
        version: 1,
        config: StepConfig::Event {
            name: name.to_string(),
            subscribes: subscribes.into_iter().map(String::from).collect(),
            emits: emits.into_iter().map(|t| EmitDeclaration::Bare(t.to_string())).collect(),
            input_schema: None,
            flows: vec![],
            retry: None,
        },
        streams: Default::default(),
    }
}

/// A test double standing in for the step executor: records every invocation and can be
/// configured to fail for a specific step name, to model a worker crash.
struct RecordingInvoker {
    invocations: Mutex<Vec<(String, String)>>, // (step name, trace id)
    fails: Vec<String>,
}

impl RecordingInvoker {
    fn new(fails: Vec<&str>) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            fails: fails.into_iter().map(String::from).collect(),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepInvoker for RecordingInvoker {
    async fn invoke(&self, step: Arc<Step>, event: Event) -> Result<(), String> {
        self.invocations
            .lock()
            .unwrap()
            .push((step.name().to_string(), event.trace_id.clone()));
        if self.fails.contains(&step.name().to_string()) {
            Err(format!("{} crashed", step.name()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn single_step_success_delivers_one_invocation() {
    let registry = Arc::new(StepRegistry::new());
    registry.add_step(event_step("send_receipt", vec!["order.paid"], vec![])).unwrap();

    let invoker = Arc::new(RecordingInvoker::new(vec![]));
    let manager = EventManager::new(registry, invoker.clone());

    manager
        .emit(Event::new("order.paid", serde_json::json!({"id": 1}), "trace-1"), EmitMode::Synchronous)
        .await
        .unwrap();

    assert_eq!(invoker.calls(), vec![("send_receipt".to_string(), "trace-1".to_string())]);
}

#[tokio::test]
async fn cross_language_fan_out_invokes_every_subscriber_regardless_of_order() {
    let registry = Arc::new(StepRegistry::new());
    registry.add_step(event_step("py_subscriber", vec!["order.paid"], vec![])).unwrap();
    registry
        .add_step(Step {
            file_path: "ts_subscriber.step.ts".into(),
            version: 1,
            config: StepConfig::Event {
                name: "ts_subscriber".into(),
                subscribes: vec!["order.paid".into()],
                emits: vec![],
                input_schema: None,
                flows: vec![],
                retry: None,
            },
            streams: Default::default(),
        })
        .unwrap();

    let invoker = Arc::new(RecordingInvoker::new(vec![]));
    let manager = EventManager::new(registry, invoker.clone());

    manager
        .emit(Event::new("order.paid", serde_json::json!({}), "trace-2"), EmitMode::Synchronous)
        .await
        .unwrap();

    let names: Vec<String> = invoker.calls().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"py_subscriber".to_string()));
    assert!(names.contains(&"ts_subscriber".to_string()));
}

#[tokio::test]
async fn worker_crash_is_isolated_to_its_own_invocation() {
    let registry = Arc::new(StepRegistry::new());
    registry.add_step(event_step("crashes", vec!["a"], vec![])).unwrap();
    registry.add_step(event_step("survives", vec!["a"], vec![])).unwrap();

    let invoker = Arc::new(RecordingInvoker::new(vec!["crashes"]));
    let manager = EventManager::new(registry, invoker.clone());

    // emit() never surfaces an individual subscriber's failure as its own error; siblings
    // are invoked regardless of one another's outcome.
    let result = manager.emit(Event::new("a", serde_json::json!({}), "t"), EmitMode::Synchronous).await;
    assert!(result.is_ok());

    let names: Vec<String> = invoker.calls().into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"crashes".to_string()));
    assert!(names.contains(&"survives".to_string()));
}

#[tokio::test]
async fn hot_reload_stops_delivering_to_a_removed_step() {
    let registry = Arc::new(StepRegistry::new());
    registry.add_step(event_step("s", vec!["a"], vec![])).unwrap();
    registry.remove_step("s").unwrap();
    registry.add_step(event_step("s_v2", vec!["b"], vec![])).unwrap();

    let invoker = Arc::new(RecordingInvoker::new(vec![]));
    let manager = EventManager::new(registry, invoker.clone());

    manager.emit(Event::new("a", serde_json::json!({}), "t"), EmitMode::Synchronous).await.unwrap();
    assert!(invoker.calls().is_empty());
}

#[tokio::test]
async fn one_thousand_emits_schedule_exactly_one_thousand_invocations() {
    let registry = Arc::new(StepRegistry::new());
    registry.add_step(event_step("counter", vec!["tick"], vec![])).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    struct CountingInvoker(Arc<AtomicUsize>);
    #[async_trait]
    impl StepInvoker for CountingInvoker {
        async fn invoke(&self, _step: Arc<Step>, _event: Event) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
    let invoker = Arc::new(CountingInvoker(count.clone()));
    let manager = EventManager::new(registry, invoker);

    for i in 0..1000 {
        manager
            .emit(Event::new("tick", serde_json::json!({"i": i}), "t"), EmitMode::Synchronous)
            .await
            .unwrap();
    }

    assert_eq!(count.load(Ordering::SeqCst), 1000);
}

#[tokio::test]
async fn state_is_isolated_per_trace_across_concurrent_flows() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    store.set(&"trace-a".to_string(), "cart_total", serde_json::json!(42)).await.unwrap();
    store.set(&"trace-b".to_string(), "cart_total", serde_json::json!(99)).await.unwrap();

    assert_eq!(
        store.get(&"trace-a".to_string(), "cart_total").await.unwrap(),
        Some(serde_json::json!(42))
    );
    assert_eq!(
        store.get(&"trace-b".to_string(), "cart_total").await.unwrap(),
        Some(serde_json::json!(99))
    );

    let group_a = store.get_group(&"trace-a".to_string()).await.unwrap();
    let group_b: HashMap<String, serde_json::Value> = store.get_group(&"trace-b".to_string()).await.unwrap();
    assert_eq!(group_a.len(), 1);
    assert_eq!(group_b.len(), 1);
}
