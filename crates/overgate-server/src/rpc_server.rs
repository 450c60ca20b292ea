//! HTTP ingress for unary RPC calls.
//!
//! This module provides the RPC-facing server: an HTTP/1.1 listener (hyper)
//! accepting one JSON [`RpcRequest`] envelope per POST request. Every call
//! flows through the [`Interceptor`], so admission, handler invocation and
//! metrics recording happen in strict order.
//!
//! # Status mapping
//!
//! Transport-level problems (wrong verb, oversized or undecodable body) are
//! reported with an HTTP error status. Call-level outcomes, including
//! rate-limited and invalid-argument failures, always travel as the
//! `status` field of the [`RpcResponse`] envelope with HTTP 200, so a caller
//! can distinguish "the transport rejected you" from "the controller did".

use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use http_body_util::{BodyExt, Full};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::handler::HandlerRegistry;
use crate::interceptor::Interceptor;
use crate::metadata::CallMetadata;
use crate::protocol::{RpcRequest, RpcResponse, Status};
use overgate_core::{Controller, Error, Result};

/// Maximum request body size (1 MB).
///
/// RPC envelopes are small; anything larger is rejected before allocation
/// can get out of hand.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Type alias for hyper responses with a full body.
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP/1.1 server for the RPC ingress.
pub struct RpcServer {
    interceptor: Arc<Interceptor>,
    handlers: Arc<HandlerRegistry>,
}

impl RpcServer {
    /// Creates a server enforcing `controller` over the given handlers.
    pub fn new(controller: Arc<Controller>, handlers: HandlerRegistry) -> Self {
        Self {
            interceptor: Arc::new(Interceptor::new(controller)),
            handlers: Arc::new(handlers),
        }
    }

    /// Binds to `addr` and serves connections until the task is aborted.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    ///
    /// Each connection runs in its own task; a connection-level error is
    /// logged and never takes down the accept loop.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local address: {}", e)))?;
        tracing::info!("RPC server listening on {}", local_addr);

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| Error::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let interceptor = self.interceptor.clone();
            let handlers = self.handlers.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let interceptor = interceptor.clone();
                    let handlers = handlers.clone();
                    async move { Self::handle_request(interceptor, handlers, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("Error serving connection: {}", err);
                }
            });
        }
    }

    /// Handles one HTTP request carrying an RPC envelope.
    async fn handle_request<B>(
        interceptor: Arc<Interceptor>,
        handlers: Arc<HandlerRegistry>,
        req: Request<B>,
    ) -> Result<HyperResponse>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        if req.method() != hyper::Method::POST {
            let response = RpcResponse {
                id: 0,
                status: Status::InvalidArgument,
                result: None,
                error: Some("RPC calls must be POST requests".to_string()),
            };
            return Ok(json_response(StatusCode::METHOD_NOT_ALLOWED, &response));
        }

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::error!("Failed to read request body: {}", e);
                let response = RpcResponse {
                    id: 0,
                    status: Status::Internal,
                    result: None,
                    error: Some("Failed to read request body".to_string()),
                };
                return Ok(json_response(StatusCode::INTERNAL_SERVER_ERROR, &response));
            }
        };

        if body.len() > MAX_BODY_SIZE {
            tracing::error!(
                "Request body too large: {} bytes (max {} bytes)",
                body.len(),
                MAX_BODY_SIZE
            );
            let response = RpcResponse {
                id: 0,
                status: Status::InvalidArgument,
                result: None,
                error: Some(format!("Request body exceeds {} bytes", MAX_BODY_SIZE)),
            };
            return Ok(json_response(StatusCode::PAYLOAD_TOO_LARGE, &response));
        }

        let request: RpcRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Failed to parse RPC envelope: {}", e);
                let response = RpcResponse {
                    id: 0,
                    status: Status::InvalidArgument,
                    result: None,
                    error: Some(format!("Undecodable RPC envelope: {}", e)),
                };
                return Ok(json_response(StatusCode::BAD_REQUEST, &response));
            }
        };

        let meta = CallMetadata::from_request(&request);
        let method = request.method.clone().unwrap_or_default();
        let args = request.args;

        let result = interceptor
            .intercept(&meta, || handlers.invoke(&method, args))
            .await;

        let response = match result {
            Ok(value) => RpcResponse::success(request.id, value),
            Err(err) => {
                if !err.is_caller_fault() {
                    tracing::error!(method = %method, %err, "RPC call failed");
                }
                RpcResponse::failure(request.id, &err)
            }
        };

        Ok(json_response(StatusCode::OK, &response))
    }
}

/// Serializes an envelope into an HTTP response with the given status.
fn json_response(status: StatusCode, response: &RpcResponse) -> HyperResponse {
    let body = serde_json::to_vec(response).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response parts are valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use overgate_core::ControllerConfig;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    fn server(max_tokens: u64) -> (Arc<Interceptor>, Arc<HandlerRegistry>) {
        let mut slo = HashMap::new();
        slo.insert("echo".to_string(), Duration::from_secs(1));
        let controller = Arc::new(
            Controller::new(ControllerConfig::new(slo, max_tokens, 0, false)).unwrap(),
        );

        let mut handlers = HandlerRegistry::new();
        handlers.register("echo", |args| async move { Ok(args) });

        (
            Arc::new(Interceptor::new(controller)),
            Arc::new(handlers),
        )
    }

    fn post(body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(hyper::Method::POST)
            .uri("/")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: HyperResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_successful_call() {
        let (interceptor, handlers) = server(10);
        let req = post(r#"{"id": 1, "method": "echo", "args": {"x": 7}}"#);

        let response = RpcServer::handle_request(interceptor, handlers, req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["result"]["x"], 7);
    }

    #[tokio::test]
    async fn test_non_post_rejected() {
        let (interceptor, handlers) = server(10);
        let req = Request::builder()
            .method(hyper::Method::GET)
            .uri("/")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = RpcServer::handle_request(interceptor, handlers, req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_undecodable_envelope() {
        let (interceptor, handlers) = server(10);
        let req = post(r#"{"id": 1, "method":"#);

        let response = RpcServer::handle_request(interceptor, handlers, req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["status"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_missing_method_metadata() {
        let (interceptor, handlers) = server(10);
        let req = post(r#"{"id": 4, "args": {}}"#);

        let response = RpcServer::handle_request(interceptor, handlers, req)
            .await
            .unwrap();
        // A call-level failure: HTTP 200, envelope carries the status.
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["id"], 4);
        assert_eq!(body["status"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_rate_limited_call() {
        let (interceptor, handlers) = server(1);

        let response = RpcServer::handle_request(
            interceptor.clone(),
            handlers.clone(),
            post(r#"{"id": 1, "method": "echo", "args": null}"#),
        )
        .await
        .unwrap();
        assert_eq!(body_json(response).await["status"], "ok");

        let response = RpcServer::handle_request(
            interceptor,
            handlers,
            post(r#"{"id": 2, "method": "echo", "args": null}"#),
        )
        .await
        .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["status"], "resource_exhausted");
        assert_eq!(body["error"], "Rate limit exceeded, request denied");
    }

    #[tokio::test]
    async fn test_unregistered_handler_is_not_found() {
        let (interceptor, handlers) = server(10);
        let req = post(r#"{"id": 1, "method": "mystery", "args": null}"#);

        let response = RpcServer::handle_request(interceptor.clone(), handlers, req)
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "not_found");

        // The call was admitted and completed (with an error), so it was
        // still recorded against the on-demand-created method.
        interceptor.controller().aggregate_once();
        assert_eq!(
            interceptor.controller().method_metrics("mystery").unwrap().goodput,
            1
        );
    }
}
