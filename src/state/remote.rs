use crate::error::{StateError, StateErrorCode};
use crate::state::StateStore;
use crate::types::{JsonValue, TraceId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// State store backed by a remote key-value service reachable over HTTP. No
/// Redis-protocol crate appears anywhere in the surrounding example corpus, so this
/// backend speaks to the remote store through a small JSON HTTP contract instead:
/// `GET/PUT/DELETE {base_url}/state/{traceId}/{key}` and
/// `GET {base_url}/state/{traceId}` for group reads, mirroring the `host, port,
/// password?, db?, ttl?` shape a project config declares for this adapter.
pub struct RemoteStateStore {
    client: reqwest::Client,
    base_url: String,
    ttl: Option<u64>,
}

impl RemoteStateStore {
    pub fn new(host: &str, port: u16, password: Option<&str>, db: Option<u32>, ttl: Option<u64>) -> Result<Self, StateError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Some(password) = password {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = format!("Bearer {password}");
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&value).map_err(|e| StateError {
                    code: StateErrorCode::BackendUnavailable,
                    message: format!("invalid remote state credential: {e}"),
                    trace_id: None,
                })?,
            );
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|e| StateError {
            code: StateErrorCode::BackendUnavailable,
            message: format!("failed to build remote state client: {e}"),
            trace_id: None,
        })?;

        let db_segment = db.map(|d| format!("/{d}")).unwrap_or_default();
        let base_url = format!("http://{host}:{port}{db_segment}");

        Ok(Self {
            client,
            base_url,
            ttl,
        })
    }

    fn key_url(&self, trace_id: &TraceId, key: &str) -> String {
        format!("{}/state/{}/{}", self.base_url, trace_id, key)
    }

    fn group_url(&self, trace_id: &TraceId) -> String {
        format!("{}/state/{}", self.base_url, trace_id)
    }

    fn io_error(e: reqwest::Error) -> StateError {
        StateError {
            code: StateErrorCode::IoFailure,
            message: format!("remote state request failed: {e}"),
            trace_id: None,
        }
    }
}

#[async_trait]
impl StateStore for RemoteStateStore {
    async fn get(&self, trace_id: &TraceId, key: &str) -> Result<Option<JsonValue>, StateError> {
        let response = self
            .client
            .get(self.key_url(trace_id, key))
            .send()
            .await
            .map_err(Self::io_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        response
            .json::<Option<JsonValue>>()
            .await
            .map_err(Self::io_error)
    }

    async fn set(&self, trace_id: &TraceId, key: &str, value: JsonValue) -> Result<(), StateError> {
        let mut body = serde_json::json!({"value": value});
        if let Some(ttl) = self.ttl {
            body["ttl"] = serde_json::json!(ttl);
        }

        self.client
            .put(self.key_url(trace_id, key))
            .json(&body)
            .send()
            .await
            .map_err(Self::io_error)?
            .error_for_status()
            .map_err(Self::io_error)?;
        Ok(())
    }

    async fn delete(&self, trace_id: &TraceId, key: &str) -> Result<(), StateError> {
        let response = self
            .client
            .delete(self.key_url(trace_id, key))
            .send()
            .await
            .map_err(Self::io_error)?;

        // Idempotent: a 404 on delete is not an error.
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            response.error_for_status().map_err(Self::io_error)?;
        }
        Ok(())
    }

    async fn clear(&self, trace_id: &TraceId) -> Result<(), StateError> {
        let response = self
            .client
            .delete(self.group_url(trace_id))
            .send()
            .await
            .map_err(Self::io_error)?;

        if response.status() != reqwest::StatusCode::NOT_FOUND {
            response.error_for_status().map_err(Self::io_error)?;
        }
        Ok(())
    }

    async fn get_group(&self, trace_id: &TraceId) -> Result<HashMap<String, JsonValue>, StateError> {
        let response = self
            .client
            .get(self.group_url(trace_id))
            .send()
            .await
            .map_err(Self::io_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(HashMap::new());
        }

        response
            .json::<HashMap<String, JsonValue>>()
            .await
            .map_err(Self::io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_includes_db_segment_when_given() {
        let store = RemoteStateStore::new("localhost", 6380, None, Some(2), None).unwrap();
        assert_eq!(store.base_url, "http://localhost:6380/2");
    }

    #[test]
    fn base_url_omits_db_segment_when_absent() {
        let store = RemoteStateStore::new("localhost", 6380, None, None, None).unwrap();
        assert_eq!(store.base_url, "http://localhost:6380");
    }

    #[test]
    fn key_url_is_scoped_by_trace_and_key() {
        let store = RemoteStateStore::new("localhost", 6380, None, None, None).unwrap();
        assert_eq!(
            store.key_url(&"t1".to_string(), "k"),
            "http://localhost:6380/state/t1/k"
        );
    }
}
