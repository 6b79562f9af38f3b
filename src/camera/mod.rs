//! Capture devices
//!
//! - `device` - device model and the [`CaptureDriver`] interface
//! - `registry` - authoritative device set and open/close/pause lifecycle
//! - `frame_buffer` - latest captured frame per device
//! - `v4l2` - V4L2 implementation of [`CaptureDriver`]

pub mod device;
pub mod frame_buffer;
pub mod registry;
pub mod v4l2;

pub use device::{CaptureDriver, Device, DeviceDescriptor};
pub use frame_buffer::{Frame, FrameBuffer};
pub use registry::{DeviceRegistry, StreamControl};
pub use v4l2::V4l2Driver;
