use std::sync::Arc;
use tokio::sync::broadcast;

use crate::camera::{DeviceRegistry, FrameBuffer};
use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::session::{CameraService, Dispatcher};
use crate::stream::StreamScheduler;

/// Application-wide state shared across handlers
///
/// Camera lifecycle goes through `registry`, streaming through `scheduler`;
/// client requests reach both via `dispatcher`.
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Known capture devices
    pub registry: Arc<DeviceRegistry>,
    /// Latest frame per device
    pub frames: Arc<FrameBuffer>,
    /// Per-device streaming loops
    pub scheduler: Arc<StreamScheduler>,
    /// Endpoint table for WebSocket requests
    pub dispatcher: Arc<Dispatcher>,
    /// Event bus for real-time notifications
    pub events: Arc<EventBus>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Wire the camera core together
    ///
    /// Registers the scheduler with the registry and attaches the event bus to
    /// both.
    pub fn new(
        config: ConfigStore,
        registry: Arc<DeviceRegistry>,
        frames: Arc<FrameBuffer>,
        events: Arc<EventBus>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Arc<Self> {
        let stream_config = config.get().stream.clone();
        let scheduler = StreamScheduler::new(registry.clone(), frames.clone(), stream_config);

        registry.set_event_bus(events.clone());
        scheduler.set_event_bus(events.clone());

        let service = Arc::new(CameraService::new(registry.clone(), scheduler.clone()));
        let dispatcher = Arc::new(Dispatcher::new(service));

        Arc::new(Self {
            config,
            registry,
            frames,
            scheduler,
            dispatcher,
            events,
            shutdown_tx,
        })
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Stop every stream, then release every device
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.scheduler.stop_all().await;

        let registry = self.registry.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || registry.close_all()).await {
            tracing::warn!("Failed to release cameras: {}", e);
        }
    }
}
