//! Flow-scoped key/value state store (C3): the `(traceId, key) -> JSON` namespace that
//! worker handlers read and write through the RPC channel's `state.*` methods.

mod file;
mod memory;
mod remote;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use remote::RemoteStateStore;

use crate::error::StateError;
use crate::types::{JsonValue, TraceId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Abstract interface over the flow-scoped state namespace. Implementations must be
/// safe for concurrent calls from multiple worker invocations; per-key synchronization
/// is the backend's responsibility so that a handler's state call never blocks on an
/// unrelated flow's I/O.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns `None` for absent keys.
    async fn get(&self, trace_id: &TraceId, key: &str) -> Result<Option<JsonValue>, StateError>;

    /// Last-write-wins.
    async fn set(&self, trace_id: &TraceId, key: &str, value: JsonValue) -> Result<(), StateError>;

    /// Idempotent: deleting an absent key is not an error.
    async fn delete(&self, trace_id: &TraceId, key: &str) -> Result<(), StateError>;

    /// Removes all keys under `trace_id`. Idempotent: a second call is a no-op.
    async fn clear(&self, trace_id: &TraceId) -> Result<(), StateError>;

    /// Returns every key/value pair currently stored under `trace_id`.
    async fn get_group(&self, trace_id: &TraceId) -> Result<HashMap<String, JsonValue>, StateError>;
}

#[cfg(test)]
mod contract_tests {
    use super::*;

    /// Shared contract exercised against every backend: any [`StateStore`] impl must
    /// satisfy these round-trip and isolation properties.
    pub async fn exercise_store_contract(store: &dyn StateStore) {
        let t1: TraceId = "trace-1".into();
        let t2: TraceId = "trace-2".into();

        assert_eq!(store.get(&t1, "k").await.unwrap(), None);

        store
            .set(&t1, "k", serde_json::json!({"v": 1}))
            .await
            .unwrap();
        assert_eq!(
            store.get(&t1, "k").await.unwrap(),
            Some(serde_json::json!({"v": 1}))
        );

        // isolation: a different trace never observes t1's value
        assert_eq!(store.get(&t2, "k").await.unwrap(), None);

        store.delete(&t1, "k").await.unwrap();
        assert_eq!(store.get(&t1, "k").await.unwrap(), None);

        // delete is idempotent
        store.delete(&t1, "k").await.unwrap();

        store.set(&t1, "a", serde_json::json!(1)).await.unwrap();
        store.set(&t1, "b", serde_json::json!(2)).await.unwrap();
        let group = store.get_group(&t1).await.unwrap();
        assert_eq!(group.len(), 2);

        store.clear(&t1).await.unwrap();
        assert_eq!(store.get_group(&t1).await.unwrap().len(), 0);

        // clear is idempotent
        store.clear(&t1).await.unwrap();
    }
}
