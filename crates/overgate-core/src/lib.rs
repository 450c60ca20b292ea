//! Overgate Controller Core
//!
//! This crate provides the data plane of the Overgate overload controller:
//! per-method token-bucket admission, per-second goodput and tail-latency
//! aggregation, and a consistent snapshot surface for the control plane.
//!
//! # Architecture
//!
//! The controller is built around three core components:
//!
//! - [`MethodState`]: per-method mutable record (bucket, counters, latency
//!   reservoir, last tail-latency snapshot)
//! - [`Controller`]: process-wide method table with the admission, recorder
//!   and aggregation entry points
//! - [`ControllerSnapshot`]: serializable view of the whole method table
//!
//! # Concurrency Model
//!
//! The hot path is per-method: every `MethodState` carries its own mutex for
//! the bucket and reservoir, so admission decisions for different methods
//! never contend. Interval counters are lock-free atomics; the once-per-second
//! tick swaps them under the method mutex so no recorded request can straddle
//! an interval boundary.
//!
//! # Usage Example
//!
//! ```no_run
//! use overgate_core::{Controller, ControllerConfig};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut slo = HashMap::new();
//! slo.insert("get_user".to_string(), Duration::from_millis(100));
//!
//! let config = ControllerConfig::new(slo, 1000, 100, false);
//! let controller = Arc::new(Controller::new(config).unwrap());
//!
//! // Hot path: admission, then record the completed request.
//! if controller.allow("get_user").unwrap() {
//!     // ... run the handler ...
//!     controller.post_process("get_user", Duration::from_millis(42)).unwrap();
//! }
//! ```
//!
//! The aggregation tick is started with [`Controller::spawn_ticker`] and runs
//! until the returned handle is aborted at process teardown.

mod config;
mod controller;
mod error;
mod method_state;
mod snapshot;

pub use config::ControllerConfig;
pub use controller::{Controller, TICK_INTERVAL};
pub use error::{Error, Result};
pub use method_state::MethodState;
pub use snapshot::{ControllerSnapshot, MethodReport, MethodSnapshot};
