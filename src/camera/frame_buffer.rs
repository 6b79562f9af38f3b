//! Latest-frame store shared between capture drivers and streaming loops
//!
//! Each device has at most one slot holding either its most recent frame or
//! the failure the driver last reported. Writes replace the slot, so a reader
//! only ever sees the newest value (frames in between are skipped).

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};

/// A captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Placeholder returned before anything was captured
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Frame payload (cheap clone)
    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    /// Buffer-wide write sequence; later writes have larger numbers
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time since capture
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Frame(Frame),
    Failed(String),
}

/// Per-device latest frame map
pub struct FrameBuffer {
    slots: RwLock<HashMap<String, Slot>>,
    sequence: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Store a freshly captured frame, replacing whatever was there
    pub fn put(&self, device_id: &str, data: impl Into<Bytes>) -> u64 {
        let mut slots = self.slots.write();
        // Sequence is taken under the write lock so slot order matches sequence order
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        slots.insert(
            device_id.to_string(),
            Slot::Frame(Frame {
                data: data.into(),
                sequence,
                captured_at: Instant::now(),
            }),
        );
        sequence
    }

    /// Record a capture failure; reads fail until the next `put` or `clear`
    pub fn put_failure(&self, device_id: &str, message: impl Into<String>) {
        self.slots
            .write()
            .insert(device_id.to_string(), Slot::Failed(message.into()));
    }

    /// Latest frame for a device
    ///
    /// Returns an empty frame when nothing was captured yet and
    /// `CaptureFailure` when the driver recorded a failure.
    pub fn get(&self, device_id: &str) -> Result<Frame> {
        match self.slots.read().get(device_id) {
            Some(Slot::Frame(frame)) => Ok(frame.clone()),
            Some(Slot::Failed(reason)) => Err(AppError::CaptureFailure {
                device: device_id.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(Frame::empty()),
        }
    }

    /// Drop the slot for a device
    pub fn clear(&self, device_id: &str) {
        self.slots.write().remove(device_id);
    }

    /// Number of devices with a slot
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_frame_is_empty_not_error() {
        let buffer = FrameBuffer::new();
        let frame = buffer.get("video0").unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.sequence(), 0);
    }

    #[test]
    fn test_latest_write_wins() {
        let buffer = FrameBuffer::new();
        let first = buffer.put("video0", vec![1, 2, 3]);
        let second = buffer.put("video0", vec![4, 5]);
        assert!(second > first);

        let frame = buffer.get("video0").unwrap();
        assert_eq!(frame.data(), Bytes::from_static(&[4, 5]));
        assert_eq!(frame.sequence(), second);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_failure_until_next_frame() {
        let buffer = FrameBuffer::new();
        buffer.put_failure("video0", "dqbuf failed");

        let err = buffer.get("video0").unwrap_err();
        assert!(matches!(err, AppError::CaptureFailure { ref device, .. } if device == "video0"));

        buffer.put("video0", vec![9]);
        assert_eq!(buffer.get("video0").unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let buffer = FrameBuffer::new();
        buffer.put("video0", vec![1]);
        buffer.put("video1", vec![2]);
        buffer.clear("video0");

        assert!(buffer.get("video0").unwrap().is_empty());
        assert_eq!(buffer.get("video1").unwrap().len(), 1);
        buffer.clear("video1");
        assert!(buffer.is_empty());
    }
}
