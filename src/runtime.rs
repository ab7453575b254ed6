//! The shared instrumentation context
//!
//! A [`PerfRuntime`] owns the event channel, the live configuration and the
//! notifier. It is created once at startup and cloned into every selector,
//! dispatch timer and aggregator, replacing process-wide globals.

use crate::analytics::PerfAnalytics;
use crate::config::{PerfConfig, SharedConfig};
use crate::dispatch::DispatchTimer;
use crate::event_channel::EventChannel;
use crate::notify::{LogNotifier, Notice, Notifier};
use crate::selector::{Combiner, InputSet, Selector, SelectorOptions};
use std::fmt;
use std::sync::Arc;

/// Channel + configuration + notifier, cheaply cloneable
#[derive(Clone)]
pub struct PerfRuntime {
    channel: EventChannel,
    config: SharedConfig,
    notifier: Arc<dyn Notifier>,
}

impl PerfRuntime {
    /// Runtime with `config` and the tracing-backed notifier
    pub fn new(config: PerfConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    /// Runtime with a custom notifier
    pub fn with_notifier(config: PerfConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            channel: EventChannel::new(),
            config: SharedConfig::new(config),
            notifier,
        }
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Shared handle to the notifier
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Forward a notice to the configured notifier
    pub fn notify(&self, notice: &Notice) {
        self.notifier.notify(notice);
    }

    /// Create an instrumented memoized selector
    ///
    /// `inputs` is a tuple of extractor closures (or `()`), `combiner` takes
    /// one reference per extracted input.
    pub fn create_selector<S, I, C>(
        &self,
        inputs: I,
        combiner: C,
        options: SelectorOptions,
    ) -> Selector<S, I, C>
    where
        S: ?Sized,
        I: InputSet<S>,
        C: Combiner<I::Values>,
        C::Output: Clone,
    {
        Selector::new(self.clone(), inputs, combiner, options)
    }

    /// Create a selector with an explicit name
    pub fn create_named_selector<S, I, C>(
        &self,
        name: impl Into<String>,
        inputs: I,
        combiner: C,
    ) -> Selector<S, I, C>
    where
        S: ?Sized,
        I: InputSet<S>,
        C: Combiner<I::Values>,
        C::Output: Clone,
    {
        self.create_selector(inputs, combiner, SelectorOptions::named(name))
    }

    /// Create a dispatch timing interceptor with its own throttle state
    pub fn dispatch_timer(&self) -> DispatchTimer {
        DispatchTimer::new(self.clone())
    }

    /// Create an aggregator subscribed to all metric topics
    pub fn analytics(&self) -> PerfAnalytics {
        PerfAnalytics::new(self.clone())
    }
}

impl Default for PerfRuntime {
    fn default() -> Self {
        Self::new(PerfConfig::default())
    }
}

impl fmt::Debug for PerfRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerfRuntime")
            .field("channel", &self.channel)
            .field("config", &self.config.snapshot())
            .finish_non_exhaustive()
    }
}
