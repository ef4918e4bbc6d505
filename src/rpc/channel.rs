use crate::error::{ProtocolError, ProtocolErrorCode};
use crate::rpc::frame::Frame;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A parent-side handler for a single RPC method, installed by the step executor before
/// the worker process is spawned so no incoming request ever finds the method table empty.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, params: Value) -> Result<Value, String>;
}

#[async_trait]
impl<F, Fut> RpcHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, String>> + Send,
{
    async fn handle(&self, params: Value) -> Result<Value, String> {
        self(params).await
    }
}

/// Full-duplex RPC channel over a worker's stdin/stdout. The parent is the *server* for
/// state/emit/stream/log methods and the *client* for the worker's `result`/`close`
/// terminal calls; the worker is the mirror image.
///
/// Maintains a pending-request table keyed by monotonically increasing id, resolved as
/// matching response frames arrive off the read loop.
pub struct RpcChannel {
    writer_tx: mpsc::Sender<Frame>,
    pending: Arc<DashMap<u64, oneshot::Sender<Result<Value, String>>>>,
    next_id: AtomicU64,
    handlers: Arc<DashMap<String, Arc<dyn RpcHandler>>>,
    read_loop: Option<JoinHandle<()>>,
    write_loop: Option<JoinHandle<()>>,
}

impl RpcChannel {
    /// Spin up read and write loops over the given pipes. `handlers` may be populated
    /// after construction via [`RpcChannel::register`] — frames for unregistered methods
    /// arriving before registration completes are answered with an "unknown method" error,
    /// so handlers intended to cover the whole lifetime of the worker must be registered
    /// immediately after this call returns and before the worker can possibly respond.
    pub fn spawn<R, W>(mut reader: R, mut writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: Arc<DashMap<u64, oneshot::Sender<Result<Value, String>>>> = Arc::new(DashMap::new());
        let handlers: Arc<DashMap<String, Arc<dyn RpcHandler>>> = Arc::new(DashMap::new());
        let (writer_tx, mut writer_rx) = mpsc::channel::<Frame>(256);

        let write_loop = tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                if let Err(e) = frame.write_to(&mut writer).await {
                    warn!(error = %e, "rpc write loop terminating");
                    break;
                }
            }
        });

        let pending_for_read = pending.clone();
        let handlers_for_read = handlers.clone();
        let reply_tx = writer_tx.clone();
        let read_loop = tokio::spawn(async move {
            loop {
                match Frame::read_from(&mut reader).await {
                    Ok(frame) => {
                        if frame.is_request() {
                            let method = frame.method.clone().unwrap_or_default();
                            let params = frame.params.clone().unwrap_or(Value::Null);
                            let handler = handlers_for_read.get(&method).map(|h| h.clone());
                            let reply_tx = reply_tx.clone();
                            let id = frame.id;
                            tokio::spawn(async move {
                                let response = match handler {
                                    Some(h) => match h.handle(params).await {
                                        Ok(result) => Frame::response_ok(id, result),
                                        Err(e) => Frame::response_err(id, e),
                                    },
                                    None => Frame::response_err(id, format!("unknown method: {method}")),
                                };
                                let _ = reply_tx.send(response).await;
                            });
                        } else {
                            let id = frame.id;
                            if let Some((_, sender)) = pending_for_read.remove(&id) {
                                let outcome = match frame.error {
                                    Some(e) => Err(e),
                                    None => Ok(frame.result.unwrap_or(Value::Null)),
                                };
                                let _ = sender.send(outcome);
                            } else {
                                debug!(id, "response for unknown or already-resolved request id");
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "rpc read loop terminating");
                        break;
                    }
                }
            }
        });

        Self {
            writer_tx,
            pending,
            next_id: AtomicU64::new(1),
            handlers,
            read_loop: Some(read_loop),
            write_loop: Some(write_loop),
        }
    }

    /// Register a parent-side handler for `method`. Safe to call at any point in the
    /// channel's lifetime; later registrations for the same method replace earlier ones.
    pub fn register(&self, method: impl Into<String>, handler: impl RpcHandler + 'static) {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    /// Invoke a worker-side method and await its response.
    pub async fn call(&self, method: impl Into<String>, params: Value) -> Result<Value, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = Frame::request(id, method, params);
        self.writer_tx.send(frame).await.map_err(|_| ProtocolError {
            code: ProtocolErrorCode::ChannelClosed,
            message: "rpc write channel closed".into(),
        })?;

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(ProtocolError {
                code: ProtocolErrorCode::MalformedFrame,
                message: e,
            }),
            Err(_) => {
                self.pending.remove(&id);
                Err(ProtocolError {
                    code: ProtocolErrorCode::ChannelClosed,
                    message: "rpc channel closed before a response arrived".into(),
                })
            }
        }
    }

    /// Tear down the read/write loops and fail any still-pending calls.
    pub async fn close(&mut self) {
        if let Some(h) = self.read_loop.take() {
            h.abort();
        }
        if let Some(h) = self.write_loop.take() {
            h.abort();
        }
        self.pending.clear();
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        if let Some(h) = self.read_loop.take() {
            h.abort();
        }
        if let Some(h) = self.write_loop.take() {
            h.abort();
        }
    }
}
