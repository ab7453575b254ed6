//! Metric events carried on the event channel
//!
//! The three topics form a closed union. On the wire (JSON) each event is a
//! flat object tagged with its topic:
//!
//! ```text
//! {"topic":"action-timing","name":"todos/add","duration":0.42,"timestamp":1700000000000}
//! {"topic":"computation-timing","name":"selectVisible","duration":1.3,"recomputation":true,"changedIndex":1,"timestamp":1700000000001}
//! {"topic":"state-size","size":20480,"timestamp":1700000000002}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event channel topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// One event per dispatched action
    ActionTiming,
    /// One event per selector recomputation (cache hits are silent)
    ComputationTiming,
    /// Throttled serialized-state size samples
    StateSize,
}

impl Topic {
    /// All topics, in declaration order
    pub const ALL: [Topic; 3] = [Topic::ActionTiming, Topic::ComputationTiming, Topic::StateSize];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::ActionTiming => "action-timing",
            Topic::ComputationTiming => "computation-timing",
            Topic::StateSize => "state-size",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time spent processing one dispatched action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTiming {
    /// Action type identifier
    pub name: String,
    /// Milliseconds spent in the downstream chain
    pub duration: f64,
    /// Wall-clock epoch milliseconds
    pub timestamp: u64,
}

/// A selector recomputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputationTiming {
    /// Selector name
    pub name: String,
    /// Milliseconds spent in the memoized call
    pub duration: f64,
    /// Always true: only recomputations are published
    pub recomputation: bool,
    /// First input whose identity changed; `None` when indeterminate
    #[serde(default, with = "changed_index")]
    pub changed_index: Option<usize>,
    /// Wall-clock epoch milliseconds
    pub timestamp: u64,
}

/// Serialized state size sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSizeSample {
    /// Bytes of the serialized state snapshot
    pub size: u64,
    /// Wall-clock epoch milliseconds
    pub timestamp: u64,
}

/// Any event published on the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case")]
pub enum PerfEvent {
    ActionTiming(ActionTiming),
    ComputationTiming(ComputationTiming),
    StateSize(StateSizeSample),
}

impl PerfEvent {
    /// Topic this event is delivered on
    pub fn topic(&self) -> Topic {
        match self {
            PerfEvent::ActionTiming(_) => Topic::ActionTiming,
            PerfEvent::ComputationTiming(_) => Topic::ComputationTiming,
            PerfEvent::StateSize(_) => Topic::StateSize,
        }
    }

    /// Name of the action or selector; state-size samples have none
    pub fn name(&self) -> Option<&str> {
        match self {
            PerfEvent::ActionTiming(e) => Some(&e.name),
            PerfEvent::ComputationTiming(e) => Some(&e.name),
            PerfEvent::StateSize(_) => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            PerfEvent::ActionTiming(e) => e.timestamp,
            PerfEvent::ComputationTiming(e) => e.timestamp,
            PerfEvent::StateSize(e) => e.timestamp,
        }
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `changedIndex` travels as an integer with -1 meaning indeterminate
mod changed_index {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(index) => serializer.serialize_i64(*index as i64),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        let raw = Option::<i64>::deserialize(deserializer)?;
        Ok(raw.and_then(|index| usize::try_from(index).ok()))
    }
}
