//! HTTP control plane.
//!
//! The control plane is the read/write surface a colocated policy agent uses
//! to observe per-method performance and push refill rates. It is plain
//! HTTP/1.1 on an operator-configured port, expected to be reachable only
//! over loopback or a cluster-internal network; there is no authentication
//! and no TLS.
//!
//! # Endpoints
//!
//! - `GET /metrics?method=<name>`: `{"goodput": <u64>, "latency": <u64>}`
//!   for the last completed aggregation interval. `latency` is the p95 tail
//!   latency in **nanoseconds**. 400 without the `method` parameter, 404 for
//!   unknown methods, 405 for non-GET verbs.
//! - `POST /set_rate?method=<name>`: body `{"rate_limit": <u64>}`; replaces
//!   the method's refill rate (never the bucket capacity). 200 on success,
//!   400 on a missing parameter or undecodable body, 404 for unknown
//!   methods, 405 for non-POST verbs. The update is applied entirely or not
//!   at all.
//! - `GET /snapshot`: full per-method state of the controller.
//!
//! Reads never create method state; an unknown method is 404, not an
//! insertion.

use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use overgate_core::{Controller, Error, Result};

/// Maximum control-plane body size. `set_rate` bodies are a few bytes.
const MAX_BODY_SIZE: usize = 64 * 1024;

type HyperResponse = Response<Full<Bytes>>;

/// `POST /set_rate` request body.
#[derive(Debug, Deserialize)]
struct SetRateBody {
    rate_limit: u64,
}

/// HTTP control plane bound to one [`Controller`].
pub struct ControlPlane {
    controller: Arc<Controller>,
}

impl ControlPlane {
    /// Creates a control plane serving the given controller.
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    /// Binds to `addr` and serves until the task is aborted.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local address: {}", e)))?;
        tracing::info!("control plane listening on {}", local_addr);

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| Error::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let controller = self.controller.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let controller = controller.clone();
                    async move { Ok::<_, Error>(Self::dispatch(controller, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("Error serving control-plane connection: {}", err);
                }
            });
        }
    }

    /// Routes one control-plane request.
    async fn dispatch<B>(controller: Arc<Controller>, req: Request<B>) -> HyperResponse
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let path = req.uri().path().to_string();

        match path.as_str() {
            "/metrics" => Self::handle_metrics(controller, req),
            "/set_rate" => Self::handle_set_rate(controller, req).await,
            "/snapshot" => Self::handle_snapshot(controller, req),
            _ => text_response(StatusCode::NOT_FOUND, "No such endpoint"),
        }
    }

    /// `GET /metrics?method=<name>`
    fn handle_metrics<B>(controller: Arc<Controller>, req: Request<B>) -> HyperResponse {
        if req.method() != hyper::Method::GET {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Invalid request method");
        }

        let Some(method) = query_param(req.uri().query(), "method") else {
            return text_response(StatusCode::BAD_REQUEST, "Method not specified");
        };

        match controller.method_metrics(&method) {
            Ok(report) => json_response(StatusCode::OK, &report),
            Err(Error::UnknownMethod(_)) => {
                text_response(StatusCode::NOT_FOUND, "Unknown method")
            }
            Err(err) => {
                tracing::error!(%err, "failed to read method metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }

    /// `POST /set_rate?method=<name>` with body `{"rate_limit": <u64>}`
    async fn handle_set_rate<B>(controller: Arc<Controller>, req: Request<B>) -> HyperResponse
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        if req.method() != hyper::Method::POST {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Invalid request method");
        }

        let Some(method) = query_param(req.uri().query(), "method") else {
            return text_response(StatusCode::BAD_REQUEST, "Method not specified");
        };

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::error!("Failed to read set_rate body: {}", e);
                return text_response(StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };
        if body.len() > MAX_BODY_SIZE {
            return text_response(StatusCode::BAD_REQUEST, "Request body too large");
        }

        let parsed: SetRateBody = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) => {
                return text_response(StatusCode::BAD_REQUEST, "Failed to decode request body")
            }
        };

        match controller.set_rate(&method, parsed.rate_limit) {
            Ok(()) => text_response(StatusCode::OK, ""),
            Err(Error::UnknownMethod(_)) => {
                text_response(StatusCode::NOT_FOUND, "Unknown method")
            }
            Err(err) => {
                tracing::error!(%err, "failed to apply rate update");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }

    /// `GET /snapshot`
    fn handle_snapshot<B>(controller: Arc<Controller>, req: Request<B>) -> HyperResponse {
        if req.method() != hyper::Method::GET {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Invalid request method");
        }

        json_response(StatusCode::OK, &controller.snapshot())
    }
}

/// Extracts a query-string parameter with a non-empty value.
///
/// Method names are plain identifiers; percent-encoded names are not
/// supported on this surface.
fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_string())
    })
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    let body = serde_json::to_vec(body).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response parts are valid")
}

fn text_response(status: StatusCode, message: &str) -> HyperResponse {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(message.to_string())))
        .expect("static response parts are valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use overgate_core::ControllerConfig;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::time::Duration;

    fn controller() -> Arc<Controller> {
        let mut slo = HashMap::new();
        slo.insert("a".to_string(), Duration::from_millis(50));
        Arc::new(Controller::new(ControllerConfig::new(slo, 10, 10, false)).unwrap())
    }

    fn request(method: hyper::Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_json(response: HyperResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_ok() {
        let ctrl = controller();
        ctrl.post_process("a", Duration::from_millis(30)).unwrap();
        ctrl.post_process("a", Duration::from_millis(80)).unwrap();
        ctrl.aggregate_once();

        let response = ControlPlane::dispatch(
            ctrl,
            request(hyper::Method::GET, "/metrics?method=a", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["goodput"], 1);
        assert_eq!(body["latency"], 80_000_000);
    }

    #[tokio::test]
    async fn test_metrics_missing_param() {
        let response = ControlPlane::dispatch(
            controller(),
            request(hyper::Method::GET, "/metrics", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // An empty value counts as missing too.
        let response = ControlPlane::dispatch(
            controller(),
            request(hyper::Method::GET, "/metrics?method=", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_unknown_method() {
        let ctrl = controller();
        let response = ControlPlane::dispatch(
            ctrl.clone(),
            request(hyper::Method::GET, "/metrics?method=ghost", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        // The read must not have created state.
        assert!(!ctrl.is_registered("ghost"));
    }

    #[tokio::test]
    async fn test_metrics_wrong_verb() {
        let response = ControlPlane::dispatch(
            controller(),
            request(hyper::Method::POST, "/metrics?method=a", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_set_rate_ok_and_idempotent() {
        let ctrl = controller();

        for _ in 0..2 {
            let response = ControlPlane::dispatch(
                ctrl.clone(),
                request(
                    hyper::Method::POST,
                    "/set_rate?method=a",
                    r#"{"rate_limit": 50}"#,
                ),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(ctrl.snapshot().methods["a"].refill_rate, 50);
    }

    #[tokio::test]
    async fn test_set_rate_malformed_body() {
        let ctrl = controller();
        let response = ControlPlane::dispatch(
            ctrl.clone(),
            request(hyper::Method::POST, "/set_rate?method=a", r#"{"rate":"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // Nothing changed.
        assert_eq!(ctrl.snapshot().methods["a"].refill_rate, 10);
    }

    #[tokio::test]
    async fn test_set_rate_missing_param() {
        let response = ControlPlane::dispatch(
            controller(),
            request(hyper::Method::POST, "/set_rate", r#"{"rate_limit": 5}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_rate_unknown_method() {
        let response = ControlPlane::dispatch(
            controller(),
            request(
                hyper::Method::POST,
                "/set_rate?method=ghost",
                r#"{"rate_limit": 5}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_rate_wrong_verb() {
        let response = ControlPlane::dispatch(
            controller(),
            request(hyper::Method::GET, "/set_rate?method=a", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_snapshot() {
        let ctrl = controller();
        ctrl.post_process("a", Duration::from_millis(80)).unwrap();
        ctrl.aggregate_once();

        let response = ControlPlane::dispatch(
            ctrl,
            request(hyper::Method::GET, "/snapshot", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["methods"]["a"]["slo_violations"], 1);
        assert_eq!(body["methods"]["a"]["tail_latency_p95_ns"], 80_000_000);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let response = ControlPlane::dispatch(
            controller(),
            request(hyper::Method::GET, "/nope", ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param(Some("method=get_user&x=1"), "method").as_deref(),
            Some("get_user")
        );
        assert_eq!(query_param(Some("x=1"), "method"), None);
        assert_eq!(query_param(Some("method="), "method"), None);
        assert_eq!(query_param(None, "method"), None);
    }
}
