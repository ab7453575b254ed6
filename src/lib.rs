//! Statemeter - performance instrumentation for state-container applications
//!
//! This library times action dispatches and memoized selector
//! recomputations, samples the serialized size of the application state,
//! and aggregates everything into ranked summaries. All measurements flow
//! through a topic-keyed [`event_channel::EventChannel`] owned by a
//! [`runtime::PerfRuntime`].

pub mod analytics;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod event_channel;
pub mod json_output;
pub mod notify;
pub mod profiling;
pub mod runtime;
pub mod selector;
pub mod stats;

pub use analytics::{PerfAnalytics, PerfSummary};
pub use config::{PerfConfig, PerfOptions, SharedConfig};
pub use dispatch::{Action, DispatchTimer, StateSource};
pub use error::{PerfError, Result};
pub use event::{PerfEvent, Topic};
pub use event_channel::{EventChannel, Subscription};
pub use notify::{LogNotifier, Notice, NoticeLog, Notifier};
pub use runtime::PerfRuntime;
pub use selector::{Selector, SelectorOptions};
