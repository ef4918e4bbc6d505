use crate::error::StateError;
use crate::state::StateStore;
use crate::types::{JsonValue, TraceId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

/// Non-persistent, process-local state store backed by an in-memory map. This is the
/// default backend and the one used by tests and local development.
#[derive(Default)]
pub struct MemoryStateStore {
    data: DashMap<TraceId, HashMap<String, JsonValue>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, trace_id: &TraceId, key: &str) -> Result<Option<JsonValue>, StateError> {
        Ok(self
            .data
            .get(trace_id)
            .and_then(|flow| flow.get(key).cloned()))
    }

    async fn set(&self, trace_id: &TraceId, key: &str, value: JsonValue) -> Result<(), StateError> {
        self.data
            .entry(trace_id.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, trace_id: &TraceId, key: &str) -> Result<(), StateError> {
        if let Some(mut flow) = self.data.get_mut(trace_id) {
            flow.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, trace_id: &TraceId) -> Result<(), StateError> {
        self.data.remove(trace_id);
        Ok(())
    }

    async fn get_group(&self, trace_id: &TraceId) -> Result<HashMap<String, JsonValue>, StateError> {
        Ok(self
            .data
            .get(trace_id)
            .map(|flow| flow.clone())
            .unwrap_or_default())
    }
}
