//! Consumer side of a streaming loop

use async_trait::async_trait;
use bytes::Bytes;

use crate::camera::Frame;
use crate::error::Result;

/// Event emitted by a streaming loop
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A frame read from the frame buffer
    Frame {
        device_id: String,
        sequence: u64,
        data: Bytes,
    },
    /// Reading or delivering a frame failed; the loop backs off and retries
    FrameFailed { device_id: String, message: String },
}

impl StreamEvent {
    pub fn frame(device_id: &str, frame: &Frame) -> Self {
        StreamEvent::Frame {
            device_id: device_id.to_string(),
            sequence: frame.sequence(),
            data: frame.data(),
        }
    }

    pub fn failed(device_id: &str, message: impl Into<String>) -> Self {
        StreamEvent::FrameFailed {
            device_id: device_id.to_string(),
            message: message.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            StreamEvent::Frame { device_id, .. } | StreamEvent::FrameFailed { device_id, .. } => {
                device_id
            }
        }
    }
}

/// Receiver of stream events, usually a client connection
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Whether the consumer can still receive events
    fn is_live(&self) -> bool;

    /// Deliver one event
    ///
    /// Returns `ConsumerDisconnected` when the consumer went away; any other
    /// error is treated as a transient delivery failure.
    async fn deliver(&self, event: StreamEvent) -> Result<()>;

    /// Resolve once the consumer went away
    ///
    /// The default never resolves; loops then notice a dead consumer
    /// through [`is_live`](FrameSink::is_live) at their next tick.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}
