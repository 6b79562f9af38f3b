//! Capture device model and driver interface

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity of a capture device as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Stable handle used by clients (e.g., "video0")
    pub id: String,
    /// Name reported by the driver
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Driver-level locator (e.g., /dev/video0)
    pub device_path: String,
}

/// A registered capture device and its lifecycle flags
///
/// `is_running` implies `is_open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(flatten)]
    pub info: DeviceDescriptor,
    pub is_open: bool,
    pub is_running: bool,
    pub is_paused: bool,
}

impl Device {
    pub fn new(info: DeviceDescriptor) -> Self {
        Self {
            info,
            is_open: false,
            is_running: false,
            is_paused: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub(crate) fn mark_open(&mut self) {
        self.is_open = true;
        self.is_running = true;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.is_running = false;
        self.is_open = false;
        self.is_paused = false;
    }
}

/// Hardware side of the camera core
///
/// Implementations talk to the capture hardware and feed captured frames
/// into the [`FrameBuffer`](super::FrameBuffer). All calls may block.
pub trait CaptureDriver: Send + Sync {
    /// List the devices currently attached
    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Acquire the capture handle and start feeding frames
    fn open_device(&self, device: &DeviceDescriptor) -> Result<bool>;

    /// Release the capture handle
    fn close_device(&self, device: &DeviceDescriptor) -> Result<bool>;

    /// Suspend or resume frame production without releasing the handle
    fn pause_device(&self, device: &DeviceDescriptor, paused: bool) -> Result<bool>;
}
