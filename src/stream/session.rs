//! Streaming session descriptor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle status of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Created, loop not yet running
    #[default]
    Idle,
    /// Loop is delivering frames
    Running,
    /// Cancellation requested, loop not yet exited
    Stopping,
    /// Loop exited
    Stopped,
    /// Loop ended abnormally
    Failed,
}

impl StreamStatus {
    /// `Stopped` and `Failed` never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamStatus::Stopped | StreamStatus::Failed)
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Idle => write!(f, "idle"),
            StreamStatus::Running => write!(f, "running"),
            StreamStatus::Stopping => write!(f, "stopping"),
            StreamStatus::Stopped => write!(f, "stopped"),
            StreamStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Record of one streaming loop for one device
///
/// Shared between the scheduler, the loop task and callers; only the
/// scheduler and the loop change its status.
#[derive(Debug)]
pub struct StreamSession {
    id: Uuid,
    device_id: String,
    started_at: DateTime<Utc>,
    status: watch::Sender<StreamStatus>,
}

impl StreamSession {
    pub(crate) fn new(device_id: &str) -> Self {
        let (status, _) = watch::channel(StreamStatus::Idle);
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.to_string(),
            started_at: Utc::now(),
            status,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    /// Resolve once the session reached a terminal status
    pub async fn wait_terminated(&self) -> StreamStatus {
        let mut rx = self.status.subscribe();
        let status = match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            // The sender lives in `self`, so the channel cannot close while we wait
            Err(_) => self.status(),
        };
        status
    }

    /// Move to `next`; terminal statuses are final
    ///
    /// Returns whether the status changed.
    pub(crate) fn transition(&self, next: StreamStatus) -> bool {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    pub fn info(&self) -> StreamSessionInfo {
        StreamSessionInfo {
            id: self.id.to_string(),
            device_id: self.device_id.clone(),
            status: self.status(),
            started_at: self.started_at,
        }
    }
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSessionInfo {
    pub id: String,
    pub device_id: String,
    pub status: StreamStatus,
    pub started_at: DateTime<Utc>,
}
