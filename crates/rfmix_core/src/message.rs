//! Events published to display consumers
//!
//! The monitor thread polls the engine and pushes immutable snapshots;
//! consumers never touch engine state directly.

use std::collections::BTreeMap;

use rfmix_platform::ChannelId;
use serde::{Deserialize, Serialize};

use crate::channel::ChannelState;
use crate::stats::RfStats;

/// Events sent from the engine side to UI/display threads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Monitoring started
    Started,

    /// Monitoring stopped
    Stopped,

    /// Per-channel parameters and levels, sampled at the poll interval
    ChannelLevels {
        channels: BTreeMap<ChannelId, ChannelState>,
    },

    /// Aggregate RF statistics, sampled once per second
    Stats(RfStats),

    /// Error occurred
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let mut channels = BTreeMap::new();
        channels.insert(3, ChannelState::default());
        let event = Event::ChannelLevels { channels };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ChannelLevels\""));
        assert!(json.contains("\"payload\""));

        let back: Event = serde_json::from_str(&json).unwrap();
        match back {
            Event::ChannelLevels { channels } => assert!(channels.contains_key(&3)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_stats_event() {
        let event = Event::Stats(RfStats {
            total_packets: 10,
            ..Default::default()
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Stats\""));
        assert!(json.contains("\"total_packets\":10"));
    }

    #[test]
    fn test_error_event() {
        let event = Event::error("device lost");
        match event {
            Event::Error { message } => assert_eq!(message, "device lost"),
            _ => panic!("Expected Error event"),
        }
    }
}
