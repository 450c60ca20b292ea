// Copyright 2025 Overgate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::method_state::MethodState;
use crate::snapshot::{ControllerSnapshot, MethodReport};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Fixed interval of the aggregation tick.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Process-wide overload controller.
///
/// Holds the per-method state table and exposes the three hot-path entry
/// points (admission, recording, rate updates) plus the aggregation tick.
/// The controller is constructed once at server startup, shared behind an
/// [`Arc`], and passed explicitly to the interceptor and the control-plane
/// bindings; there are no hidden singletons.
///
/// # Thread Safety
///
/// The method table is a `RwLock<HashMap>`: the hot path takes the read lock
/// to resolve an existing method and only on-demand creation takes the write
/// lock. All per-method mutation happens under that method's own mutex, so
/// load on one method never contends with another.
///
/// # Example
///
/// ```no_run
/// use overgate_core::{Controller, ControllerConfig};
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let mut slo = HashMap::new();
/// slo.insert("search".to_string(), Duration::from_millis(200));
///
/// let controller = Arc::new(
///     Controller::new(ControllerConfig::new(slo, 100, 10, false)).unwrap(),
/// );
/// let ticker = controller.spawn_ticker();
/// // ... serve traffic ...
/// ticker.abort();
/// ```
#[derive(Debug)]
pub struct Controller {
    methods: RwLock<HashMap<String, Arc<MethodState>>>,
    config: ControllerConfig,
    start_time: Instant,
}

impl Controller {
    /// Creates a controller with one [`MethodState`] per entry in the
    /// configured SLO map. Every bucket starts full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;

        let methods = config
            .slo
            .iter()
            .map(|(name, slo)| {
                (
                    name.clone(),
                    Arc::new(MethodState::new(*slo, config.max_tokens, config.refill_rate)),
                )
            })
            .collect();

        Ok(Self {
            methods: RwLock::new(methods),
            config,
            start_time: Instant::now(),
        })
    }

    /// Resolves the state for `method`, creating it with the configured
    /// defaults when on-demand creation is enabled.
    fn state(&self, method: &str) -> Result<Arc<MethodState>> {
        if let Some(state) = self.methods.read().unwrap().get(method) {
            return Ok(state.clone());
        }

        if !self.config.on_demand {
            return Err(Error::UnknownMethod(method.to_string()));
        }

        let mut methods = self.methods.write().unwrap();
        let state = methods
            .entry(method.to_string())
            .or_insert_with(|| {
                tracing::debug!(method, "registering method on first use");
                Arc::new(MethodState::new(
                    self.config.default_slo,
                    self.config.max_tokens,
                    self.config.refill_rate,
                ))
            })
            .clone();
        Ok(state)
    }

    /// Resolves the state for `method` without ever creating it.
    fn existing_state(&self, method: &str) -> Result<Arc<MethodState>> {
        self.methods
            .read()
            .unwrap()
            .get(method)
            .cloned()
            .ok_or_else(|| Error::UnknownMethod(method.to_string()))
    }

    /// Decides admission for one request on `method`.
    ///
    /// Returns `Ok(true)` when a token was consumed, `Ok(false)` when the
    /// bucket is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] only when on-demand creation is
    /// disabled and the method was never registered.
    pub fn allow(&self, method: &str) -> Result<bool> {
        let state = self.state(method)?;
        let admitted = state.try_acquire(Instant::now());

        if !admitted && self.config.debug {
            tracing::debug!(method, "admission denied, bucket empty");
        }

        Ok(admitted)
    }

    /// Records one completed request for `method`.
    ///
    /// Classifies it against the method's SLO and appends the latency to the
    /// current interval's reservoir.
    pub fn post_process(&self, method: &str, latency: Duration) -> Result<()> {
        let state = self.state(method)?;
        state.record(latency);

        if self.config.debug {
            tracing::debug!(method, latency_us = latency.as_micros() as u64, "recorded request");
        }

        Ok(())
    }

    /// Replaces the refill rate of `method`.
    ///
    /// Takes effect at the next admission for that method; it never touches
    /// tokens already granted and never resizes the bucket. The control
    /// plane calls this, so unknown methods are an error rather than being
    /// created.
    pub fn set_rate(&self, method: &str, refill_rate: u64) -> Result<()> {
        let state = self.existing_state(method)?;
        state.set_refill_rate(refill_rate);

        tracing::info!(method, refill_rate, "refill rate updated");
        Ok(())
    }

    /// Last-completed-interval report for `method`: goodput of the previous
    /// full second and the p95 tail latency in nanoseconds.
    ///
    /// Read-only: unknown methods are an error, not an insertion.
    pub fn method_metrics(&self, method: &str) -> Result<MethodReport> {
        let state = self.existing_state(method)?;

        let report = MethodReport {
            goodput: state.current_goodput(),
            latency: state.last_tail_latency().as_nanos() as u64,
        };

        if self.config.debug {
            tracing::debug!(
                method,
                goodput = report.goodput,
                latency_ns = report.latency,
                "serving method metrics"
            );
        }

        Ok(report)
    }

    /// Serializable view of every tracked method.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let methods = self
            .methods
            .read()
            .unwrap()
            .iter()
            .map(|(name, state)| (name.clone(), state.snapshot()))
            .collect();

        ControllerSnapshot {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            methods,
        }
    }

    /// Closes the current aggregation interval for every method.
    ///
    /// Per method: snapshot-and-reset the goodput counter, compute the p95
    /// tail latency, clear the reservoir. Each method rolls under its own
    /// lock; a method seeing traffic mid-tick is attributed consistently.
    ///
    /// A tick that cannot read the method table logs at `error` and gives
    /// up until the next interval; the controller survives.
    pub fn aggregate_once(&self) {
        let states: Vec<(String, Arc<MethodState>)> = match self.methods.read() {
            Ok(methods) => methods
                .iter()
                .map(|(name, state)| (name.clone(), state.clone()))
                .collect(),
            Err(_) => {
                tracing::error!("aggregation tick skipped: method table lock poisoned");
                return;
            }
        };

        for (name, state) in states {
            state.roll_interval();

            if self.config.debug {
                tracing::debug!(
                    method = %name,
                    goodput = state.current_goodput(),
                    p95_us = state.last_tail_latency().as_micros() as u64,
                    "interval closed"
                );
            }
        }
    }

    /// Starts the once-per-second aggregation task.
    ///
    /// Missed ticks collapse: the next tick aggregates whatever accumulated.
    /// The task runs until the returned handle is aborted at teardown.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                controller.aggregate_once();
            }
        })
    }

    /// Whether `method` currently has state in the table.
    pub fn is_registered(&self, method: &str) -> bool {
        self.methods.read().unwrap().contains_key(method)
    }

    /// Number of tracked methods.
    pub fn method_count(&self) -> usize {
        self.methods.read().unwrap().len()
    }

    /// Whether verbose tracing is enabled.
    pub fn debug(&self) -> bool {
        self.config.debug
    }
}
