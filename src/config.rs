//! Live performance configuration
//!
//! One `PerfConfig` value is shared by every measuring component through a
//! [`SharedConfig`] handle. Readers take a snapshot on each invocation, so a
//! write is observed by the very next selector call or dispatch.

use crate::error::{PerfError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Default slow-computation threshold in milliseconds
pub const DEFAULT_SLOW_COMPUTATION_THRESHOLD_MS: f64 = 5.0;
/// Default minimum interval between state-size samples in milliseconds
pub const DEFAULT_STORE_SIZE_CHECK_INTERVAL_MS: u64 = 1000;
/// Default high-memory threshold in megabytes
pub const DEFAULT_MAX_STORE_SIZE_THRESHOLD_MB: f64 = 5.0;

/// Full set of performance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfConfig {
    /// Measure and publish selector recomputations
    pub selector_tracking_enabled: bool,
    /// Recomputations slower than this raise a slow-computation notice
    pub slow_computation_threshold_ms: f64,
    /// Periodically sample the serialized state size during dispatch
    pub store_size_tracking_enabled: bool,
    /// Minimum time between two state-size samples
    pub store_size_check_interval_ms: u64,
    /// State larger than this raises a high-memory notice
    #[serde(rename = "maxStoreSizeThresholdMB")]
    pub max_store_size_threshold_mb: f64,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            selector_tracking_enabled: true,
            slow_computation_threshold_ms: DEFAULT_SLOW_COMPUTATION_THRESHOLD_MS,
            store_size_tracking_enabled: true,
            store_size_check_interval_ms: DEFAULT_STORE_SIZE_CHECK_INTERVAL_MS,
            max_store_size_threshold_mb: DEFAULT_MAX_STORE_SIZE_THRESHOLD_MB,
        }
    }
}

impl PerfConfig {
    /// High-memory threshold converted to bytes
    pub fn max_store_size_bytes(&self) -> f64 {
        self.max_store_size_threshold_mb * 1024.0 * 1024.0
    }

    /// Overwrite the fields present in `options`, leaving the rest untouched
    pub fn merge(&mut self, options: &PerfOptions) {
        if let Some(enabled) = options.selector_tracking_enabled {
            self.selector_tracking_enabled = enabled;
        }
        if let Some(threshold) = options.slow_computation_threshold_ms {
            self.slow_computation_threshold_ms = threshold;
        }
        if let Some(enabled) = options.store_size_tracking_enabled {
            self.store_size_tracking_enabled = enabled;
        }
        if let Some(interval) = options.store_size_check_interval_ms {
            self.store_size_check_interval_ms = interval;
        }
        if let Some(threshold) = options.max_store_size_threshold_mb {
            self.max_store_size_threshold_mb = threshold;
        }
    }
}

/// Partial settings override
///
/// Every field is optional; `None` keeps the current value. Keys follow the
/// camelCase settings surface, snake_case is accepted too.
///
/// ```
/// use statemeter::config::PerfOptions;
///
/// let options = PerfOptions::from_toml_str("slowComputationThresholdMs = 2.5").unwrap();
/// assert_eq!(options.slow_computation_threshold_ms, Some(2.5));
/// assert_eq!(options.selector_tracking_enabled, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PerfOptions {
    #[serde(default, alias = "selector_tracking_enabled")]
    pub selector_tracking_enabled: Option<bool>,
    #[serde(default, alias = "slow_computation_threshold_ms")]
    pub slow_computation_threshold_ms: Option<f64>,
    #[serde(default, alias = "store_size_tracking_enabled")]
    pub store_size_tracking_enabled: Option<bool>,
    #[serde(default, alias = "store_size_check_interval_ms")]
    pub store_size_check_interval_ms: Option<u64>,
    #[serde(
        default,
        rename = "maxStoreSizeThresholdMB",
        alias = "max_store_size_threshold_mb"
    )]
    pub max_store_size_threshold_mb: Option<f64>,
}

impl PerfOptions {
    /// Parse and validate options from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let options: PerfOptions = toml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    /// Parse and validate options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject thresholds that are negative or not a number
    pub fn validate(&self) -> Result<()> {
        check_threshold(
            "slowComputationThresholdMs",
            self.slow_computation_threshold_ms,
        )?;
        check_threshold("maxStoreSizeThresholdMB", self.max_store_size_threshold_mb)?;
        Ok(())
    }
}

fn check_threshold(field: &'static str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if v.is_nan() => Err(PerfError::InvalidConfig {
            field,
            reason: "must be a number".to_string(),
        }),
        Some(v) if v < 0.0 => Err(PerfError::InvalidConfig {
            field,
            reason: format!("must be non-negative, got {}", v),
        }),
        _ => Ok(()),
    }
}

/// Shared, live-mutable configuration cell
///
/// Clones share the same underlying settings; last write wins.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<PerfConfig>>,
}

impl SharedConfig {
    /// Create a shared cell holding `config`
    pub fn new(config: PerfConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> PerfConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a partial override; unspecified fields keep their values
    pub fn apply(&self, options: &PerfOptions) {
        self.update(|config| config.merge(options));
    }

    pub fn set_selector_tracking(&self, enabled: bool) {
        self.update(|config| config.selector_tracking_enabled = enabled);
    }

    pub fn set_store_size_tracking(&self, enabled: bool) {
        self.update(|config| config.store_size_tracking_enabled = enabled);
    }

    pub fn set_slow_computation_threshold_ms(&self, threshold_ms: f64) {
        self.update(|config| config.slow_computation_threshold_ms = threshold_ms);
    }

    pub fn set_store_size_check_interval_ms(&self, interval_ms: u64) {
        self.update(|config| config.store_size_check_interval_ms = interval_ms);
    }

    pub fn set_max_store_size_threshold_mb(&self, threshold_mb: f64) {
        self.update(|config| config.max_store_size_threshold_mb = threshold_mb);
    }

    /// Whether selector tracking is currently on (hot-path read)
    pub fn selector_tracking_enabled(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selector_tracking_enabled
    }

    fn update(&self, f: impl FnOnce(&mut PerfConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}
