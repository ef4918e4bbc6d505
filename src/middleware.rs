use crate::types::JsonValue;
use async_trait::async_trait;
use std::sync::Arc;

/// An inbound request to an `api`-typed step, prior to worker invocation.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub headers: std::collections::HashMap<String, String>,
    pub body: JsonValue,
}

/// The response an `api` step (or a short-circuiting middleware) produces.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl ApiResponse {
    pub fn ok(body: JsonValue) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message.into() }),
        }
    }
}

/// The remainder of the middleware chain, including the terminal handler invocation.
/// Calling it runs everything downstream of the current middleware; not calling it
/// short-circuits the request.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a (dyn Fn(ApiRequest) -> futures::future::BoxFuture<'a, ApiResponse> + Sync),
}

impl<'a> Next<'a> {
    pub async fn call(self, req: ApiRequest) -> ApiResponse {
        match self.chain.split_first() {
            Some((mw, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                mw.handle(req, next).await
            }
            None => (self.terminal)(req).await,
        }
    }
}

/// A single middleware in an `api` step's declared `middleware[]` fold: `(req, ctx, next)
/// -> response`. Execution is entirely parent-side, before any worker is spawned, so a
/// middleware that rejects a request (auth failure, rate limiting) never pays for a
/// process spawn.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle<'a>(&'a self, req: ApiRequest, next: Next<'a>) -> ApiResponse;
}

/// Composes a list of middleware around a terminal handler invocation and runs the
/// resulting chain against one request.
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middleware }
    }

    pub async fn run<'a, H>(&'a self, req: ApiRequest, handler: H) -> ApiResponse
    where
        H: Fn(ApiRequest) -> futures::future::BoxFuture<'a, ApiResponse> + Sync + 'a,
    {
        let next = Next {
            chain: &self.middleware,
            terminal: &handler,
        };
        next.call(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    struct AuthMiddleware;

    #[async_trait]
    impl Middleware for AuthMiddleware {
        async fn handle<'a>(&'a self, req: ApiRequest, next: Next<'a>) -> ApiResponse {
            if req.headers.contains_key("authorization") {
                next.call(req).await
            } else {
                ApiResponse::error(401, "missing authorization header")
            }
        }
    }

    struct TaggingMiddleware;

    #[async_trait]
    impl Middleware for TaggingMiddleware {
        async fn handle<'a>(&'a self, mut req: ApiRequest, next: Next<'a>) -> ApiResponse {
            req.headers.insert("x-tagged".to_string(), "1".to_string());
            next.call(req).await
        }
    }

    fn request(with_auth: bool) -> ApiRequest {
        let mut headers = std::collections::HashMap::new();
        if with_auth {
            headers.insert("authorization".to_string(), "Bearer t".to_string());
        }
        ApiRequest {
            path: "/orders".to_string(),
            headers,
            body: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn chain_reaches_handler_when_authorized() {
        let chain = MiddlewareChain::new(vec![Arc::new(AuthMiddleware)]);
        let response = chain
            .run(request(true), |_req| async { ApiResponse::ok(serde_json::json!({"ok": true})) }.boxed())
            .await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn middleware_short_circuits_without_calling_handler() {
        let chain = MiddlewareChain::new(vec![Arc::new(AuthMiddleware)]);
        let response = chain
            .run(request(false), |_req| async { ApiResponse::ok(serde_json::json!({"ok": true})) }.boxed())
            .await;
        assert_eq!(response.status, 401);
    }

    #[tokio::test]
    async fn middleware_chain_composes_in_order() {
        let chain = MiddlewareChain::new(vec![Arc::new(TaggingMiddleware), Arc::new(AuthMiddleware)]);
        // TaggingMiddleware runs first and adds a header, but that header isn't
        // "authorization" so AuthMiddleware still rejects.
        let response = chain
            .run(request(false), |_req| async { ApiResponse::ok(serde_json::json!({})) }.boxed())
            .await;
        assert_eq!(response.status, 401);
    }
}
