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

use crate::snapshot::MethodSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bucket and reservoir state guarded by the method mutex.
///
/// Everything the admission decision and the aggregation tick touch together
/// lives here, so the refill + decision sequence and the snapshot + clear
/// sequence are each a single critical section.
#[derive(Debug)]
struct MethodInner {
    /// Current bucket level, always in `[0, max_tokens]`
    tokens: u64,
    /// Tokens added per second
    refill_rate: u64,
    /// Monotonic time of the last refill that credited at least one token
    last_refill: Instant,
    /// Latencies of requests completed in the current second
    latency_reservoir: Vec<Duration>,
    /// 95th percentile computed at the most recent tick
    last_tail_latency_p95: Duration,
}

/// Per-method mutable record: token bucket, interval counters and latency
/// reservoir.
///
/// One instance exists per registered method name. The bucket starts full.
/// Counters use lock-free atomics on the hot path; the once-per-second
/// [`roll_interval`](MethodState::roll_interval) swaps them under the method
/// mutex so every recorded request lands in exactly one interval.
#[derive(Debug)]
pub struct MethodState {
    /// Latency budget; requests completing within it count as goodput
    slo: Duration,
    /// Bucket capacity, fixed at construction
    max_tokens: u64,
    inner: Mutex<MethodInner>,
    /// Goodput accumulated since the last tick
    goodput_counter: AtomicU64,
    /// Lifetime count of SLO-missing requests
    slo_violation_counter: AtomicU64,
    /// Goodput observed during the previous full second
    current_goodput: AtomicU64,
}

impl MethodState {
    /// Creates a new method record with a full bucket.
    pub fn new(slo: Duration, max_tokens: u64, refill_rate: u64) -> Self {
        Self {
            slo,
            max_tokens,
            inner: Mutex::new(MethodInner {
                tokens: max_tokens,
                refill_rate,
                last_refill: Instant::now(),
                latency_reservoir: Vec::new(),
                last_tail_latency_p95: Duration::ZERO,
            }),
            goodput_counter: AtomicU64::new(0),
            slo_violation_counter: AtomicU64::new(0),
            current_goodput: AtomicU64::new(0),
        }
    }

    /// Attempts to admit one request at time `now`.
    ///
    /// Refills the bucket with `floor(elapsed_seconds * refill_rate)` tokens,
    /// clamped to capacity. When the computed refill is zero, `last_refill`
    /// is left untouched so fractional seconds keep accumulating instead of
    /// being rounded away. Admission then consumes one token if available.
    ///
    /// The refill and the decision are one critical section: two concurrent
    /// callers can never both succeed on a single remaining token.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let elapsed = now.saturating_duration_since(inner.last_refill);
        let refill = (elapsed.as_secs_f64() * inner.refill_rate as f64).floor() as u64;
        if refill > 0 {
            inner.tokens = inner.tokens.saturating_add(refill).min(self.max_tokens);
            inner.last_refill = now;
        }

        if inner.tokens > 0 {
            inner.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Records one completed request.
    ///
    /// Classifies the request as goodput (`latency <= slo`) or an SLO
    /// violation, and appends the latency to the current interval's
    /// reservoir. The append and the counter increment happen under the
    /// method mutex so the request is attributed to exactly one interval.
    pub fn record(&self, latency: Duration) {
        let mut inner = self.inner.lock().unwrap();

        if latency <= self.slo {
            self.goodput_counter.fetch_add(1, Ordering::Relaxed);
        } else {
            self.slo_violation_counter.fetch_add(1, Ordering::Relaxed);
        }

        inner.latency_reservoir.push(latency);
    }

    /// Closes the current aggregation interval.
    ///
    /// Snapshots the goodput counter into `current_goodput` (resetting it to
    /// zero in the same atomic swap), computes the 95th-percentile latency
    /// from the reservoir, and clears the reservoir for the next second.
    /// An empty reservoir resets the stored p95 to zero.
    pub fn roll_interval(&self) {
        let mut inner = self.inner.lock().unwrap();

        let goodput = self.goodput_counter.swap(0, Ordering::AcqRel);
        self.current_goodput.store(goodput, Ordering::Release);

        inner.last_tail_latency_p95 = tail_latency_p95(&mut inner.latency_reservoir);
        inner.latency_reservoir.clear();
    }

    /// Replaces the refill rate. Takes effect on the next admission; tokens
    /// already granted are unaffected.
    pub fn set_refill_rate(&self, refill_rate: u64) {
        self.inner.lock().unwrap().refill_rate = refill_rate;
    }

    /// Latency budget for this method.
    pub fn slo(&self) -> Duration {
        self.slo
    }

    /// Bucket capacity, fixed at construction.
    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    /// Current bucket level.
    pub fn tokens(&self) -> u64 {
        self.inner.lock().unwrap().tokens
    }

    /// Current refill rate in tokens per second.
    pub fn refill_rate(&self) -> u64 {
        self.inner.lock().unwrap().refill_rate
    }

    /// Goodput observed during the previous full second.
    pub fn current_goodput(&self) -> u64 {
        self.current_goodput.load(Ordering::Acquire)
    }

    /// Lifetime count of SLO-missing requests.
    pub fn slo_violations(&self) -> u64 {
        self.slo_violation_counter.load(Ordering::Relaxed)
    }

    /// 95th-percentile latency computed at the most recent tick.
    pub fn last_tail_latency(&self) -> Duration {
        self.inner.lock().unwrap().last_tail_latency_p95
    }

    /// Number of latency samples accumulated in the current interval.
    pub fn pending_samples(&self) -> usize {
        self.inner.lock().unwrap().latency_reservoir.len()
    }

    /// Serializable view of this method's state.
    pub fn snapshot(&self) -> MethodSnapshot {
        let inner = self.inner.lock().unwrap();
        MethodSnapshot {
            goodput: self.current_goodput.load(Ordering::Acquire),
            slo_violations: self.slo_violation_counter.load(Ordering::Relaxed),
            tail_latency_p95_ns: inner.last_tail_latency_p95.as_nanos() as u64,
            tokens: inner.tokens,
            refill_rate: inner.refill_rate,
            slo_ns: self.slo.as_nanos() as u64,
        }
    }
}

/// Selects the 95th-percentile sample: sort ascending, take index
/// `floor(len * 0.95)` clamped to `len - 1`. Empty input yields zero.
fn tail_latency_p95(samples: &mut [Duration]) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }

    samples.sort_unstable();
    let index = ((samples.len() as f64) * 0.95).floor() as usize;
    samples[index.min(samples.len() - 1)]
}
