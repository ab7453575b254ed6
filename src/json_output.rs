//! JSON output: event logs and summary export
//!
//! An [`EventRecorder`] appends every published event to a writer as one JSON
//! object per line. [`read_events`] parses such a log back so it can be
//! replayed into an aggregator (see the `statemeter` binary).

use crate::analytics::PerfSummary;
use crate::error::{PerfError, Result};
use crate::event::{PerfEvent, Topic};
use crate::event_channel::{EventChannel, Subscription};
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Records channel events as JSON Lines
///
/// Write failures are logged and dropped; recording never interferes with
/// the publisher.
pub struct EventRecorder {
    _subscriptions: Vec<Subscription>,
}

impl EventRecorder {
    /// Subscribe to every topic on `channel`, writing to `writer`
    pub fn new<W>(channel: &EventChannel, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let writer: Arc<Mutex<Box<dyn Write + Send>>> = Arc::new(Mutex::new(Box::new(writer)));
        let subscriptions = Topic::ALL
            .into_iter()
            .map(|topic| {
                let writer = writer.clone();
                channel.subscribe(topic, move |event| {
                    let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Err(err) = write_event(&mut *writer, event) {
                        tracing::warn!(error = %err, topic = %topic, "failed to record perf event");
                    }
                })
            })
            .collect();
        Self {
            _subscriptions: subscriptions,
        }
    }
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder").finish_non_exhaustive()
    }
}

/// Write one event as a single JSON line and flush
pub fn write_event<W: Write + ?Sized>(writer: &mut W, event: &PerfEvent) -> Result<()> {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Parse a JSON Lines event log; blank lines are skipped
pub fn read_events<R: BufRead>(reader: R) -> Result<Vec<PerfEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|source| PerfError::EventLog {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Pretty-printed JSON for a summary
pub fn summary_to_json(summary: &PerfSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}
