//! Camera operation surface
//!
//! Calls the registry or the scheduler and turns every outcome, including
//! errors, into a reply payload. Driver calls may block, so they run on the
//! blocking thread pool.

use std::sync::Arc;
use tracing::{debug, warn};

use super::reply::{CameraList, CameraReply, Outcome};
use crate::camera::DeviceRegistry;
use crate::error::{AppError, Result};
use crate::stream::{FrameSink, StreamScheduler};

pub struct CameraService {
    registry: Arc<DeviceRegistry>,
    scheduler: Arc<StreamScheduler>,
}

impl CameraService {
    pub fn new(registry: Arc<DeviceRegistry>, scheduler: Arc<StreamScheduler>) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<StreamScheduler> {
        &self.scheduler
    }

    /// Reload the device set and list it
    ///
    /// A failed enumeration still answers with the previous device set.
    pub async fn get_cameras(&self) -> CameraList {
        if let Err(e) = self.blocking(|registry| registry.reload()).await {
            warn!("Failed to enumerate cameras: {}", e);
        }
        CameraList {
            camera_info: self.registry.list(),
        }
    }

    pub async fn start_camera(&self, device_id: &str) -> CameraReply {
        let id = device_id.to_string();
        let result = self.blocking(move |registry| registry.open(&id)).await;
        self.reply(device_id, result, Outcome::CameraStarted)
    }

    pub async fn stop_camera(&self, device_id: &str) -> CameraReply {
        let id = device_id.to_string();
        let result = self.blocking(move |registry| registry.close(&id)).await;
        self.reply(device_id, result, Outcome::CameraStopped)
    }

    pub async fn pause_camera(&self, device_id: &str) -> CameraReply {
        let id = device_id.to_string();
        let result = self.blocking(move |registry| registry.pause(&id)).await;
        self.reply(device_id, result, Outcome::CameraPaused)
    }

    /// Start streaming into `sink`; frames follow asynchronously
    pub fn start_stream(&self, device_id: &str, sink: Arc<dyn FrameSink>) -> CameraReply {
        match self.scheduler.start_stream(device_id, sink) {
            Ok(session) => CameraReply::success(
                device_id,
                Outcome::StreamStarted(true),
                self.registry.is_running(device_id),
            )
            .with_session(session.id().to_string()),
            Err(e) => self.failure(device_id, Outcome::StreamStarted(false), e),
        }
    }

    pub async fn stop_stream(&self, device_id: &str) -> CameraReply {
        let result = self.scheduler.stop_stream(device_id).await;
        self.reply(device_id, result, Outcome::StreamStopped)
    }

    fn reply(
        &self,
        device_id: &str,
        result: Result<bool>,
        outcome: fn(bool) -> Outcome,
    ) -> CameraReply {
        match result {
            Ok(value) => {
                CameraReply::success(device_id, outcome(value), self.registry.is_running(device_id))
            }
            Err(e) => self.failure(device_id, outcome(false), e),
        }
    }

    fn failure(&self, device_id: &str, outcome: Outcome, error: AppError) -> CameraReply {
        debug!("Camera operation on {} failed: {}", device_id, error);
        CameraReply::failure(
            device_id,
            outcome,
            self.registry.is_running(device_id),
            error.to_string(),
        )
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceRegistry) -> Result<T> + Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || op(&registry))
            .await
            .map_err(|e| AppError::Internal(format!("Camera task failed: {}", e)))?
    }
}
