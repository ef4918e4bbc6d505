use crate::error::{StateError, StateErrorCode};
use crate::state::StateStore;
use crate::types::{JsonValue, TraceId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

type Document = HashMap<TraceId, HashMap<String, JsonValue>>;

/// Persists the whole state namespace as a single JSON document, suitable for a
/// single-process host that needs state to survive restarts. Every mutation flushes the
/// full document to disk via write-temp-then-rename so readers never observe a
/// partially-written file.
pub struct FileStateStore {
    path: PathBuf,
    document: RwLock<Document>,
}

impl FileStateStore {
    /// Load an existing document from `path`, or start empty if it doesn't exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StateError {
                code: StateErrorCode::SerializationFailed,
                message: format!("failed to parse state document: {e}"),
                trace_id: None,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(e) => {
                return Err(StateError {
                    code: StateErrorCode::IoFailure,
                    message: format!("failed to read state file: {e}"),
                    trace_id: None,
                })
            }
        };

        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    async fn flush(&self, document: &Document) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(document).map_err(|e| StateError {
            code: StateErrorCode::SerializationFailed,
            message: format!("failed to serialize state document: {e}"),
            trace_id: None,
        })?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(|e| StateError {
            code: StateErrorCode::IoFailure,
            message: format!("failed to write temp state file: {e}"),
            trace_id: None,
        })?;

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| StateError {
            code: StateErrorCode::IoFailure,
            message: format!("failed to rename temp state file into place: {e}"),
            trace_id: None,
        })
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, trace_id: &TraceId, key: &str) -> Result<Option<JsonValue>, StateError> {
        let document = self.document.read().await;
        Ok(document.get(trace_id).and_then(|flow| flow.get(key).cloned()))
    }

    async fn set(&self, trace_id: &TraceId, key: &str, value: JsonValue) -> Result<(), StateError> {
        let mut document = self.document.write().await;
        document
            .entry(trace_id.clone())
            .or_default()
            .insert(key.to_string(), value);
        self.flush(&document).await
    }

    async fn delete(&self, trace_id: &TraceId, key: &str) -> Result<(), StateError> {
        let mut document = self.document.write().await;
        if let Some(flow) = document.get_mut(trace_id) {
            flow.remove(key);
        }
        self.flush(&document).await
    }

    async fn clear(&self, trace_id: &TraceId) -> Result<(), StateError> {
        let mut document = self.document.write().await;
        document.remove(trace_id);
        self.flush(&document).await
    }

    async fn get_group(&self, trace_id: &TraceId) -> Result<HashMap<String, JsonValue>, StateError> {
        let document = self.document.read().await;
        Ok(document.get(trace_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::contract_tests::exercise_store_contract;

    #[tokio::test]
    async fn satisfies_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("state.json")).await.unwrap();
        exercise_store_contract(&store).await;
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = FileStateStore::open(&path).await.unwrap();
            store
                .set(&"t1".to_string(), "k", serde_json::json!("v"))
                .await
                .unwrap();
        }

        let reopened = FileStateStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(&"t1".to_string(), "k").await.unwrap(),
            Some(serde_json::json!("v"))
        );
    }

    #[tokio::test]
    async fn opening_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("nonexistent.json"))
            .await
            .unwrap();
        assert_eq!(store.get(&"t1".to_string(), "k").await.unwrap(), None);
    }
}
