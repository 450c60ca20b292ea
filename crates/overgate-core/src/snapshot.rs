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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-method report served by `GET /metrics`.
///
/// `goodput` is the goodput of the last completed aggregation interval;
/// `latency` is the 95th-percentile tail latency of that interval in
/// nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodReport {
    pub goodput: u64,
    pub latency: u64,
}

/// Full per-method state served by `GET /snapshot`.
///
/// All durations are raw nanosecond counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSnapshot {
    pub goodput: u64,
    pub slo_violations: u64,
    pub tail_latency_p95_ns: u64,
    pub tokens: u64,
    pub refill_rate: u64,
    pub slo_ns: u64,
}

/// Whole-controller snapshot: every tracked method plus process uptime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub uptime_ms: u64,
    pub methods: HashMap<String, MethodSnapshot>,
}
