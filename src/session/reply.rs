//! Response payloads of the camera operations

use serde::Serialize;

use crate::camera::Device;

/// Outcome flag of a device or stream operation, named per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    #[serde(rename = "cameraStarted")]
    CameraStarted(bool),
    #[serde(rename = "cameraStopped")]
    CameraStopped(bool),
    #[serde(rename = "cameraPaused")]
    CameraPaused(bool),
    #[serde(rename = "cameraStreamStarted")]
    StreamStarted(bool),
    #[serde(rename = "cameraStreamStopped")]
    StreamStopped(bool),
}

impl Outcome {
    pub fn value(self) -> bool {
        match self {
            Outcome::CameraStarted(v)
            | Outcome::CameraStopped(v)
            | Outcome::CameraPaused(v)
            | Outcome::StreamStarted(v)
            | Outcome::StreamStopped(v) => v,
        }
    }
}

/// Reply to a single-device operation
///
/// ```json
/// {"deviceId": "video0", "cameraStarted": false, "deviceRunning": false, "message": "..."}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraReply {
    pub device_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub device_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CameraReply {
    pub fn success(device_id: &str, outcome: Outcome, device_running: bool) -> Self {
        Self {
            device_id: device_id.to_string(),
            outcome,
            device_running,
            session_id: None,
            message: None,
        }
    }

    pub fn failure(
        device_id: &str,
        outcome: Outcome,
        device_running: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            outcome,
            device_running,
            session_id: None,
            message: Some(message.into()),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.message.is_some()
    }
}

/// Reply to `getcameras`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraList {
    pub camera_info: Vec<Device>,
}

/// Any operation reply
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Cameras(CameraList),
    Camera(CameraReply),
}

impl From<CameraList> for Reply {
    fn from(list: CameraList) -> Self {
        Reply::Cameras(list)
    }
}

impl From<CameraReply> for Reply {
    fn from(reply: CameraReply) -> Self {
        Reply::Camera(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::testing::descriptor;

    #[test]
    fn test_outcome_is_flattened() {
        let reply = CameraReply::success("video0", Outcome::CameraStarted(true), true);
        let json = serde_json::to_value(Reply::from(reply)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "deviceId": "video0",
                "cameraStarted": true,
                "deviceRunning": true
            })
        );
    }

    #[test]
    fn test_failure_carries_message() {
        let reply = CameraReply::failure(
            "video0",
            Outcome::StreamStarted(false),
            false,
            "Camera not running: video0",
        );
        assert!(reply.is_failure());
        assert!(!reply.outcome.value());

        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["cameraStreamStarted"], false);
        assert_eq!(json["message"], "Camera not running: video0");
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_camera_list() {
        let list = CameraList {
            camera_info: vec![Device::new(descriptor("video0"))],
        };
        let json = serde_json::to_value(Reply::from(list)).unwrap();

        let info = &json["cameraInfo"][0];
        assert_eq!(info["id"], "video0");
        assert_eq!(info["displayName"], "Camera video0 (/dev/video0)");
        assert_eq!(info["isRunning"], false);
    }
}
