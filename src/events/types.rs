//! System event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::stream::StreamStatus;

/// System event enumeration
///
/// Serialized as `{"event": "<name>", "data": {...}}`:
/// ```json
/// {
///   "event": "stream.state_changed",
///   "data": { "device_id": "video0", "session_id": "...", "status": "running" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    /// The device set was re-enumerated
    #[serde(rename = "camera.devices_reloaded")]
    DevicesReloaded {
        /// Number of devices after the reload
        count: usize,
    },

    /// A device was opened, closed or paused
    #[serde(rename = "camera.state_changed")]
    CameraStateChanged {
        device_id: String,
        open: bool,
        running: bool,
        paused: bool,
    },

    /// A streaming session changed status
    #[serde(rename = "stream.state_changed")]
    StreamStateChanged {
        device_id: String,
        session_id: String,
        status: StreamStatus,
    },

    /// Error notification for the subscriber itself (e.g., lagged receiver)
    #[serde(rename = "error")]
    Error { message: String },
}

impl SystemEvent {
    /// Get the event name (for filtering)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::DevicesReloaded { .. } => "camera.devices_reloaded",
            Self::CameraStateChanged { .. } => "camera.state_changed",
            Self::StreamStateChanged { .. } => "stream.state_changed",
            Self::Error { .. } => "error",
        }
    }

    /// Check if event matches a topic pattern
    ///
    /// Supports wildcards:
    /// - `*` matches all events
    /// - `stream.*` matches all stream events
    /// - `stream.state_changed` matches exact event
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        match topic.strip_suffix('*') {
            Some(prefix) if prefix.ends_with('.') => event_name.starts_with(prefix),
            _ => event_name == topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_event() -> SystemEvent {
        SystemEvent::StreamStateChanged {
            device_id: "video0".to_string(),
            session_id: "s1".to_string(),
            status: StreamStatus::Running,
        }
    }

    #[test]
    fn test_event_name() {
        assert_eq!(stream_event().event_name(), "stream.state_changed");
        assert_eq!(
            SystemEvent::DevicesReloaded { count: 2 }.event_name(),
            "camera.devices_reloaded"
        );
    }

    #[test]
    fn test_matches_topic() {
        let event = stream_event();

        assert!(event.matches_topic("*"));
        assert!(event.matches_topic("stream.*"));
        assert!(event.matches_topic("stream.state_changed"));
        assert!(!event.matches_topic("camera.*"));
        assert!(!event.matches_topic("str*"));
        assert!(!event.matches_topic("stream.started"));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_value(stream_event()).unwrap();
        assert_eq!(json["event"], "stream.state_changed");
        assert_eq!(json["data"]["device_id"], "video0");
        assert_eq!(json["data"]["status"], "running");
    }
}
