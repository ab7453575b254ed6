//! Dispatch timing interceptor
//!
//! [`DispatchTimer::intercept`] is meant to be installed once in an action
//! pipeline. It times the rest of the chain, publishes an
//! [`ActionTiming`] event for every action, warns when a dispatch blows the
//! frame budget, and (throttled) samples the serialized size of the state.
//!
//! ```
//! use statemeter::runtime::PerfRuntime;
//!
//! let runtime = PerfRuntime::default();
//! let timer = runtime.dispatch_timer();
//! let state = vec![1u32, 2, 3];
//!
//! let result = timer.intercept(&|| state.clone(), "items/add", |action| {
//!     format!("reduced {}", action)
//! });
//! assert_eq!(result, "reduced items/add");
//! ```

use crate::error::{PerfError, Result};
use crate::event::{epoch_millis, ActionTiming, PerfEvent, StateSizeSample};
use crate::notify::{Notice, SLOW_ACTION_THRESHOLD_MS};
use crate::profiling::measure_ms;
use crate::runtime::PerfRuntime;
use serde::Serialize;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Anything dispatched through the pipeline
pub trait Action {
    /// Identifier used as the metric name
    fn action_type(&self) -> &str;
}

impl Action for str {
    fn action_type(&self) -> &str {
        self
    }
}

impl Action for String {
    fn action_type(&self) -> &str {
        self
    }
}

impl<A: Action + ?Sized> Action for &A {
    fn action_type(&self) -> &str {
        (**self).action_type()
    }
}

impl<A: Action + ?Sized> Action for Box<A> {
    fn action_type(&self) -> &str {
        (**self).action_type()
    }
}

/// Source of the current state, for size sampling
///
/// Any `Fn() -> T` with `T: Serialize` qualifies; stores implement it to
/// serialize their state in place.
pub trait StateSource {
    /// Serialized size of the current state in bytes
    fn state_size(&self) -> Result<usize>;
}

impl<F, T> StateSource for F
where
    F: Fn() -> T,
    T: Serialize,
{
    fn state_size(&self) -> Result<usize> {
        serialized_size(&self())
    }
}

/// Byte length of `value` serialized as JSON, without buffering it
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> Result<usize> {
    let mut counter = ByteCounter::default();
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.bytes)
}

#[derive(Default)]
struct ByteCounter {
    bytes: usize,
}

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Times each dispatch and samples state size; see the module docs
#[derive(Debug)]
pub struct DispatchTimer {
    runtime: PerfRuntime,
    last_size_check: Mutex<Option<Instant>>,
}

impl DispatchTimer {
    pub fn new(runtime: PerfRuntime) -> Self {
        Self {
            runtime,
            last_size_check: Mutex::new(None),
        }
    }

    /// Run `next(action)` exactly once, timing it
    ///
    /// The result of `next` is returned unchanged; a panic in `next`
    /// propagates without any event being published.
    pub fn intercept<C, A, R, N>(&self, context: &C, action: A, next: N) -> R
    where
        C: StateSource + ?Sized,
        A: Action,
        N: FnOnce(A) -> R,
    {
        let name = action.action_type().to_owned();
        let (result, duration_ms) = measure_ms(|| next(action));

        if duration_ms > SLOW_ACTION_THRESHOLD_MS {
            self.runtime.notify(&Notice::SlowAction {
                name: name.clone(),
                duration_ms,
            });
        }

        self.runtime
            .channel()
            .publish(PerfEvent::ActionTiming(ActionTiming {
                name,
                duration: duration_ms,
                timestamp: epoch_millis(),
            }));

        self.sample_state_size(context);
        result
    }

    /// Publish a state-size sample if tracking is on and the interval elapsed
    ///
    /// Returns the published sample, if any. Serialization failures are
    /// reported as size 0.
    pub fn sample_state_size<C>(&self, context: &C) -> Option<StateSizeSample>
    where
        C: StateSource + ?Sized,
    {
        let config = self.runtime.config().snapshot();
        if !config.store_size_tracking_enabled {
            return None;
        }

        let interval = Duration::from_millis(config.store_size_check_interval_ms);
        let now = Instant::now();
        {
            let mut last = self
                .last_size_check
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let due = last.map_or(true, |previous| now.duration_since(previous) >= interval);
            if !due {
                return None;
            }
            *last = Some(now);
        }

        let size = measure_state(context);
        let sample = StateSizeSample {
            size: size as u64,
            timestamp: epoch_millis(),
        };
        self.runtime.channel().publish(PerfEvent::StateSize(sample));
        Some(sample)
    }

    /// Forget the throttle so the next dispatch samples immediately
    pub fn reset_throttle(&self) {
        *self
            .last_size_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Serialized state size, with panics in the source surfaced as errors
fn try_measure_state<C: StateSource + ?Sized>(context: &C) -> Result<usize> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| context.state_size()))
        .unwrap_or_else(|_| Err(PerfError::StateSize("state source panicked".to_string())))
}

fn measure_state<C: StateSource + ?Sized>(context: &C) -> usize {
    match try_measure_state(context) {
        Ok(size) => size,
        Err(err) => {
            tracing::debug!(error = %err, "state size measurement failed; reporting 0");
            0
        }
    }
}
