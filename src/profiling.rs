//! Monotonic timing helpers
//!
//! Both measuring components bracket the observed work with an [`Instant`]
//! and report fractional milliseconds, so sub-millisecond selector calls are
//! not rounded away.

use std::time::{Duration, Instant};

/// Measure the time taken by an operation, in milliseconds
///
/// The closure's result is returned untouched; if it panics the panic
/// propagates and nothing is measured.
///
/// # Example
/// ```
/// use statemeter::profiling::measure_ms;
///
/// let (result, elapsed_ms) = measure_ms(|| 2 + 2);
/// assert_eq!(result, 4);
/// assert!(elapsed_ms >= 0.0);
/// ```
pub fn measure_ms<F, R>(f: F) -> (R, f64)
where
    F: FnOnce() -> R,
{
    let stopwatch = Stopwatch::start();
    let result = f();
    (result, stopwatch.elapsed_ms())
}

/// Convert a duration to fractional milliseconds
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// A started monotonic timer
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Milliseconds since start
    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.started.elapsed())
    }
}
