//! Controller configuration.
//!
//! This module provides the construction parameters for the overload
//! controller: the per-method SLO map, the uniform bucket defaults applied to
//! every registered method, and the flags controlling on-demand method
//! creation and verbose tracing.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Default latency budget applied to methods created on demand.
pub const DEFAULT_SLO: Duration = Duration::from_millis(100);

/// Configuration for the overload controller.
///
/// The SLO map defines the initially registered methods; `max_tokens` and
/// `refill_rate` are applied uniformly to all of them. Methods first seen at
/// runtime (when `on_demand` is enabled) get the same bucket defaults and
/// `default_slo` as their latency budget.
///
/// # Example
///
/// ```
/// use overgate_core::ControllerConfig;
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// let mut slo = HashMap::new();
/// slo.insert("get_user".to_string(), Duration::from_millis(50));
///
/// let config = ControllerConfig::new(slo, 1000, 100, false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Latency budget per method; requests completing within it count as goodput
    pub slo: HashMap<String, Duration>,
    /// Bucket capacity applied to all registered methods
    pub max_tokens: u64,
    /// Tokens added per second, applied to all registered methods
    pub refill_rate: u64,
    /// Latency budget for methods created on first use
    pub default_slo: Duration,
    /// Whether unknown methods on the hot path are created with defaults
    pub on_demand: bool,
    /// Gates verbose per-request and per-tick tracing
    pub debug: bool,
}

impl ControllerConfig {
    /// Creates a configuration with the given SLO map and uniform bucket
    /// parameters. On-demand method creation is enabled.
    pub fn new(
        slo: HashMap<String, Duration>,
        max_tokens: u64,
        refill_rate: u64,
        debug: bool,
    ) -> Self {
        Self {
            slo,
            max_tokens,
            refill_rate,
            default_slo: DEFAULT_SLO,
            on_demand: true,
            debug,
        }
    }

    /// Sets the latency budget used for methods created on first use.
    pub fn with_default_slo(mut self, slo: Duration) -> Self {
        self.default_slo = slo;
        self
    }

    /// Enables or disables on-demand method creation.
    ///
    /// With on-demand creation disabled, hot-path lookups of unregistered
    /// methods fail with [`Error::UnknownMethod`] and the SLO map must
    /// pre-register every method.
    pub fn with_on_demand(mut self, on_demand: bool) -> Self {
        self.on_demand = on_demand;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if:
    /// - `max_tokens` is zero (no request could ever be admitted)
    /// - the SLO map is empty while on-demand creation is disabled
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        if self.slo.is_empty() && !self.on_demand {
            return Err(Error::InvalidConfig(
                "no methods registered and on-demand creation is disabled".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            slo: HashMap::new(),
            max_tokens: 1000,
            refill_rate: 100,
            default_slo: DEFAULT_SLO,
            on_demand: true,
            debug: false,
        }
    }
}
