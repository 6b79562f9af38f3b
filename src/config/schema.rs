use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture driver settings
    pub capture: CaptureConfig,
    /// Streaming scheduler settings
    pub stream: StreamConfig,
    /// Web server settings
    pub web: WebConfig,
}

/// Capture driver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory scanned for `video*` nodes
    pub device_dir: String,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// Requested FourCC (e.g., "MJPG", "YUYV")
    pub fourcc: String,
    /// Requested frame rate
    pub fps: u32,
    /// Number of mmap buffers
    pub buffer_count: u32,
    /// Dequeue timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_dir: "/dev".to_string(),
            width: 640,
            height: 480,
            fourcc: "MJPG".to_string(),
            fps: 30,
            buffer_count: 4,
            timeout_ms: 2000,
        }
    }
}

impl CaptureConfig {
    pub fn device_dir(&self) -> PathBuf {
        PathBuf::from(&self.device_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Streaming scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay between ticks while frames are flowing (milliseconds)
    pub frame_interval_ms: u64,
    /// Delay after a failed tick (milliseconds)
    pub error_backoff_ms: u64,
    /// Do not resend a frame that was already delivered
    pub skip_duplicate_frames: bool,
    /// How long StopStream waits for the loop to exit (milliseconds)
    pub stop_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            error_backoff_ms: 2500,
            skip_duplicate_frames: false,
            stop_timeout_ms: 5000,
        }
    }
}

impl StreamConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}
