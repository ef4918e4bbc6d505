//! Stream registry (C4): named, schema-bound push channels used for user-facing item
//! updates, distinct from flow state. Every mutation fans a change notification out to
//! current subscribers of the matching group or item scope.

use crate::error::{StreamError, StreamErrorCode};
use crate::types::JsonValue;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

pub use crate::types::StreamDeclarations;

/// A single change notification pushed to subscribers.
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub stream: String,
    pub group_id: String,
    pub id: String,
    pub data: Option<JsonValue>,
}

struct StreamState {
    schema: Option<JsonValue>,
    items: DashMap<(String, String), JsonValue>,
    updates: broadcast::Sender<StreamUpdate>,
}

/// Holds every declared stream and its live item data. Each stream is declared once at
/// load time with a name and an optional schema; subsequent CRUD operations are scoped
/// by `(groupId, id)` within that stream.
#[derive(Default)]
pub struct StreamRegistry {
    streams: DashMap<String, Arc<StreamState>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stream. Re-declaring an existing stream with the same name replaces its
    /// schema but preserves live item data and subscribers.
    pub fn declare(&self, name: impl Into<String>, schema: Option<JsonValue>) {
        let name = name.into();
        self.streams
            .entry(name)
            .and_modify(|s| {
                let updated = Arc::new(StreamState {
                    schema: schema.clone(),
                    items: s.items.clone(),
                    updates: s.updates.clone(),
                });
                *s = updated;
            })
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(256);
                Arc::new(StreamState {
                    schema,
                    items: DashMap::new(),
                    updates: tx,
                })
            });
    }

    fn stream(&self, name: &str) -> Result<Arc<StreamState>, StreamError> {
        self.streams
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| StreamError {
                code: StreamErrorCode::UnknownStream,
                message: format!("stream '{name}' is not declared"),
                stream_name: Some(name.to_string()),
            })
    }

    pub fn get(&self, name: &str, group_id: &str, id: &str) -> Result<Option<JsonValue>, StreamError> {
        let stream = self.stream(name)?;
        Ok(stream
            .items
            .get(&(group_id.to_string(), id.to_string()))
            .map(|v| v.clone()))
    }

    /// Stores `data` and notifies any subscribers of this stream's group or item scope.
    pub fn set(
        &self,
        name: &str,
        group_id: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<JsonValue, StreamError> {
        let stream = self.stream(name)?;
        stream
            .items
            .insert((group_id.to_string(), id.to_string()), data.clone());

        let update = StreamUpdate {
            stream: name.to_string(),
            group_id: group_id.to_string(),
            id: id.to_string(),
            data: Some(data.clone()),
        };
        if stream.updates.send(update).is_err() {
            debug!(stream = name, "stream mutation with no active subscribers");
        }

        Ok(data)
    }

    pub fn delete(&self, name: &str, group_id: &str, id: &str) -> Result<(), StreamError> {
        let stream = self.stream(name)?;
        stream.items.remove(&(group_id.to_string(), id.to_string()));

        let update = StreamUpdate {
            stream: name.to_string(),
            group_id: group_id.to_string(),
            id: id.to_string(),
            data: None,
        };
        let _ = stream.updates.send(update);
        Ok(())
    }

    pub fn get_group(&self, name: &str, group_id: &str) -> Result<Vec<JsonValue>, StreamError> {
        let stream = self.stream(name)?;
        Ok(stream
            .items
            .iter()
            .filter(|entry| entry.key().0 == group_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    /// Subscribe to every mutation on this stream. Callers filter by `groupId`/`id`
    /// themselves; this keeps the fan-out path a single broadcast channel per stream
    /// rather than one channel per subscription scope.
    pub fn subscribe(&self, name: &str) -> Result<broadcast::Receiver<StreamUpdate>, StreamError> {
        let stream = self.stream(name)?;
        Ok(stream.updates.subscribe())
    }

    pub fn schema(&self, name: &str) -> Result<Option<JsonValue>, StreamError> {
        Ok(self.stream(name)?.schema.clone())
    }

    /// Every declared stream name, used by `LockedData.getStreams()`.
    pub fn names(&self) -> Vec<String> {
        self.streams.iter().map(|e| e.key().clone()).collect()
    }
}
