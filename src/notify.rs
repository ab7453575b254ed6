//! Side-channel notifications
//!
//! Warnings about slow actions, slow selectors and oversized state are not
//! metric events: they go to a [`Notifier`], which by default writes them to
//! `tracing` at WARN level.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Frame budget for a single dispatch, in milliseconds
pub const SLOW_ACTION_THRESHOLD_MS: f64 = 16.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A warning raised by one of the measuring components
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A dispatch exceeded [`SLOW_ACTION_THRESHOLD_MS`]
    SlowAction { name: String, duration_ms: f64 },
    /// A recomputation exceeded the configured threshold
    SlowComputation {
        name: String,
        duration_ms: f64,
        threshold_ms: f64,
    },
    /// A state-size sample exceeded the configured threshold
    HighMemory { size_bytes: u64, threshold_mb: f64 },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SlowAction { name, duration_ms } => {
                write!(f, "Slow Action: {} took {:.2}ms", name, duration_ms)
            }
            Notice::SlowComputation {
                name,
                duration_ms,
                threshold_ms,
            } => write!(
                f,
                "Slow Selector: {} took {:.2}ms (threshold: {}ms)",
                name, duration_ms, threshold_ms
            ),
            Notice::HighMemory {
                size_bytes,
                threshold_mb,
            } => write!(
                f,
                "High Memory Warning: Store size is {:.2}MB (Threshold: {}MB)",
                *size_bytes as f64 / BYTES_PER_MB,
                threshold_mb
            ),
        }
    }
}

/// Receiver for [`Notice`]s
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Default notifier: one `tracing` WARN record per notice
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::SlowAction { name, duration_ms } => {
                tracing::warn!(target: "statemeter", action = %name, duration_ms, "{}", notice)
            }
            Notice::SlowComputation {
                name, duration_ms, ..
            } => {
                tracing::warn!(target: "statemeter", selector = %name, duration_ms, "{}", notice)
            }
            Notice::HighMemory { size_bytes, .. } => {
                tracing::warn!(target: "statemeter", size_bytes, "{}", notice)
            }
        }
    }
}

/// Notifier that keeps every notice in memory
///
/// Useful for dashboards that poll for warnings, and for tests.
#[derive(Debug, Clone, Default)]
pub struct NoticeLog {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the notices received so far
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: &Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
    }
}
