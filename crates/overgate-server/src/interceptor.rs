//! Unary RPC interceptor.
//!
//! The interceptor wraps every inbound unary call and ties the admission
//! engine and the metrics recorder to the request lifecycle:
//!
//! 1. extract the method name from the call metadata (absent or empty names
//!    fail the call without creating any method state),
//! 2. extract the client-side start time (absent or unparsable timestamps
//!    fall back to now),
//! 3. ask the controller for admission; denied calls fail fast without
//!    invoking the handler or recording metrics,
//! 4. invoke the downstream handler and preserve its result verbatim,
//! 5. record the request latency, whether the handler succeeded or failed.

use crate::metadata::CallMetadata;
use chrono::{DateTime, Utc};
use overgate_core::{Controller, Error, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Server-side unary interceptor bound to one [`Controller`].
///
/// The controller is passed in explicitly at registration; the interceptor
/// holds no state of its own and is cheap to clone.
#[derive(Clone)]
pub struct Interceptor {
    controller: Arc<Controller>,
}

impl Interceptor {
    /// Creates an interceptor enforcing the given controller.
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    /// The controller this interceptor enforces.
    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Runs one unary call through admission, the handler, and recording.
    ///
    /// The handler is only invoked for admitted calls. Its result (success
    /// or error) is returned unchanged; the request latency is recorded in
    /// both cases.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingMethod`] when the metadata carries no method name
    /// - [`Error::RateLimited`] when the bucket is empty
    /// - [`Error::UnknownMethod`] when on-demand creation is disabled and
    ///   the method was never registered
    /// - whatever the handler itself returns
    pub async fn intercept<H, Fut>(&self, meta: &CallMetadata, handler: H) -> Result<Value>
    where
        H: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let method = meta.method()?;
        let start_time = meta.start_time();

        if !self.controller.allow(method)? {
            return Err(Error::RateLimited);
        }

        let result = handler().await;

        let latency = elapsed_since(start_time);
        if let Err(err) = self.controller.post_process(method, latency) {
            // Recording failures must not clobber the handler's result.
            tracing::error!(method, %err, "failed to record request metrics");
        }

        result
    }
}

/// Wall-clock latency since `start`, clamped to zero when the client clock
/// runs ahead of ours.
fn elapsed_since(start: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(start)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
