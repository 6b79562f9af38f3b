//! Streaming scheduler
//!
//! Owns at most one polling loop per device. A loop reads the latest frame
//! from the [`FrameBuffer`] on every tick and hands it to its [`FrameSink`]:
//!
//! ```text
//!   tick ──▶ consumer live? device running? ──no──▶ exit (Stopped)
//!              │ yes
//!              ▼
//!         read frame ── empty ──────────────▶ sleep frame interval
//!              │ frame
//!              ▼
//!         deliver ── ok ────────────────────▶ sleep frame interval
//!              │ error
//!              ▼
//!         deliver failure event ────────────▶ sleep error back-off
//! ```
//!
//! Cancellation is cooperative: every sleep and delivery races the session's
//! cancellation token, so a stop request is observed within one tick. Sleeps
//! also race the sink's close signal, so a consumer that goes away during
//! the error back-off ends the loop right away.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::session::{StreamSession, StreamStatus};
use super::sink::{FrameSink, StreamEvent};
use crate::camera::{DeviceRegistry, FrameBuffer, StreamControl};
use crate::config::StreamConfig;
use crate::error::{AppError, Result};
use crate::events::{EventBus, SystemEvent};
use crate::utils::LogThrottler;
use crate::warn_throttled;

struct SessionEntry {
    session: Arc<StreamSession>,
    cancel: CancellationToken,
}

/// Per-device streaming loop manager
pub struct StreamScheduler {
    registry: Arc<DeviceRegistry>,
    frames: Arc<FrameBuffer>,
    config: StreamConfig,
    /// Latest session per device; terminal sessions stay until replaced
    sessions: Mutex<HashMap<String, SessionEntry>>,
    events: RwLock<Option<Arc<EventBus>>>,
    throttler: Arc<LogThrottler>,
}

impl StreamScheduler {
    /// Create a scheduler and register it with the registry, so closing a
    /// device stops its stream
    pub fn new(
        registry: Arc<DeviceRegistry>,
        frames: Arc<FrameBuffer>,
        config: StreamConfig,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            registry: registry.clone(),
            frames,
            config,
            sessions: Mutex::new(HashMap::new()),
            events: RwLock::new(None),
            throttler: Arc::new(LogThrottler::with_secs(10)),
        });

        let control: Weak<dyn StreamControl> = Arc::downgrade(&scheduler) as Weak<dyn StreamControl>;
        registry.set_stream_control(control);
        scheduler
    }

    /// Set event bus for broadcasting session changes
    pub fn set_event_bus(&self, events: Arc<EventBus>) {
        *self.events.write() = Some(events);
    }

    /// Start streaming `device_id` into `sink`
    ///
    /// Returns as soon as the loop is spawned. Fails with `DeviceNotRunning`
    /// unless the device is open and running, and with `StreamAlreadyActive`
    /// while a previous session for the device has not terminated.
    pub fn start_stream(
        &self,
        device_id: &str,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Arc<StreamSession>> {
        if !self.registry.is_running(device_id) {
            return Err(AppError::DeviceNotRunning(device_id.to_string()));
        }

        let events = self.events.read().clone();
        let session = Arc::new(StreamSession::new(device_id));
        let cancel = CancellationToken::new();

        {
            // Check and insert under one lock so concurrent starts cannot both win
            let mut sessions = self.sessions.lock();
            if let Some(existing) = sessions.get(device_id) {
                if !existing.session.is_terminal() {
                    return Err(AppError::StreamAlreadyActive(device_id.to_string()));
                }
            }

            session.transition(StreamStatus::Running);
            sessions.insert(
                device_id.to_string(),
                SessionEntry {
                    session: session.clone(),
                    cancel: cancel.clone(),
                },
            );

            let stream_loop = StreamLoop {
                session: session.clone(),
                registry: self.registry.clone(),
                frames: self.frames.clone(),
                sink,
                cancel,
                config: self.config.clone(),
                throttler: self.throttler.clone(),
                events: events.clone(),
            };
            tokio::spawn(stream_loop.run());
        }

        info!(
            "Stream {} started for camera {}",
            session.id(),
            device_id
        );
        publish_status(events.as_deref(), &session);
        Ok(session)
    }

    /// Stop the stream of `device_id` and wait for its loop to exit
    ///
    /// Stopping an already terminated session succeeds without side effects.
    /// Fails with `StreamNotFound` if the device never streamed.
    pub async fn stop_stream(&self, device_id: &str) -> Result<bool> {
        let (session, cancel) = {
            let sessions = self.sessions.lock();
            let entry = sessions
                .get(device_id)
                .ok_or_else(|| AppError::StreamNotFound(device_id.to_string()))?;
            (entry.session.clone(), entry.cancel.clone())
        };

        if session.is_terminal() {
            debug!("Stream for camera {} already {}", device_id, session.status());
            return Ok(true);
        }

        if session.transition(StreamStatus::Stopping) {
            publish_status(self.events.read().as_deref(), &session);
        }
        cancel.cancel();

        match tokio::time::timeout(self.config.stop_timeout(), session.wait_terminated()).await {
            Ok(status) => info!(
                "Stream {} for camera {} {}",
                session.id(),
                device_id,
                status
            ),
            Err(_) => warn!(
                "Stream {} for camera {} did not exit within {:?}",
                session.id(),
                device_id,
                self.config.stop_timeout()
            ),
        }

        self.frames.clear(device_id);
        Ok(true)
    }

    /// Latest session of a device, terminal or not
    pub fn session(&self, device_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions
            .lock()
            .get(device_id)
            .map(|entry| entry.session.clone())
    }

    /// Latest session of every device that streamed
    pub fn sessions(&self) -> Vec<Arc<StreamSession>> {
        self.sessions
            .lock()
            .values()
            .map(|entry| entry.session.clone())
            .collect()
    }

    /// Number of sessions that have not terminated
    pub fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|entry| !entry.session.is_terminal())
            .count()
    }

    /// Stop every active stream (used at shutdown)
    pub async fn stop_all(&self) {
        let active: Vec<String> = self
            .sessions
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.session.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();

        for device_id in active {
            if let Err(e) = self.stop_stream(&device_id).await {
                warn!("Failed to stop stream for camera {}: {}", device_id, e);
            }
        }
    }
}

impl StreamControl for StreamScheduler {
    fn request_stop(&self, device_id: &str) {
        let sessions = self.sessions.lock();
        let Some(entry) = sessions.get(device_id) else {
            return;
        };

        if entry.session.transition(StreamStatus::Stopping) {
            debug!("Stop requested for stream of camera {}", device_id);
            publish_status(self.events.read().as_deref(), &entry.session);
        }
        entry.cancel.cancel();
    }
}

fn publish_status(events: Option<&EventBus>, session: &StreamSession) {
    if let Some(events) = events {
        events.publish(SystemEvent::StreamStateChanged {
            device_id: session.device_id().to_string(),
            session_id: session.id().to_string(),
            status: session.status(),
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum ExitReason {
    Cancelled,
    ConsumerGone,
    DeviceStopped,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Cancelled => write!(f, "stop requested"),
            ExitReason::ConsumerGone => write!(f, "consumer disconnected"),
            ExitReason::DeviceStopped => write!(f, "camera no longer running"),
        }
    }
}

/// Everything one polling loop needs; moved into its task
struct StreamLoop {
    session: Arc<StreamSession>,
    registry: Arc<DeviceRegistry>,
    frames: Arc<FrameBuffer>,
    sink: Arc<dyn FrameSink>,
    cancel: CancellationToken,
    config: StreamConfig,
    throttler: Arc<LogThrottler>,
    events: Option<Arc<EventBus>>,
}

impl StreamLoop {
    async fn run(self) {
        let _guard = LoopGuard {
            session: self.session.clone(),
            frames: self.frames.clone(),
            events: self.events.clone(),
        };
        let device_id = self.session.device_id().to_string();
        let mut last_sequence = None;

        let reason = loop {
            if let Some(reason) = self.exit_reason(&device_id) {
                break reason;
            }

            let delay = match self.tick(&device_id, &mut last_sequence).await {
                Ok(()) | Err(AppError::FrameUnavailable(_)) => self.config.frame_interval(),
                Err(e) if e.is_disconnect() => break ExitReason::ConsumerGone,
                Err(e) => {
                    warn_throttled!(
                        self.throttler,
                        &device_id,
                        "Camera {} frame failed: {}",
                        device_id,
                        e
                    );
                    match self.deliver(StreamEvent::failed(&device_id, e.to_string())).await {
                        Err(e) if e.is_disconnect() => break ExitReason::ConsumerGone,
                        Err(e) => debug!("Failed to report frame failure: {}", e),
                        Ok(()) => {}
                    }
                    self.config.error_backoff()
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break ExitReason::Cancelled,
                _ = self.sink.closed() => break ExitReason::ConsumerGone,
                _ = tokio::time::sleep(delay) => {}
            }
        };

        info!(
            "Stream {} for camera {} exiting: {}",
            self.session.id(),
            device_id,
            reason
        );
    }

    fn exit_reason(&self, device_id: &str) -> Option<ExitReason> {
        if self.cancel.is_cancelled() {
            Some(ExitReason::Cancelled)
        } else if !self.sink.is_live() {
            Some(ExitReason::ConsumerGone)
        } else if !self.registry.is_running(device_id) {
            Some(ExitReason::DeviceStopped)
        } else {
            None
        }
    }

    /// Read the latest frame and deliver it
    ///
    /// An empty slot is reported as `FrameUnavailable`, which the loop skips.
    async fn tick(&self, device_id: &str, last_sequence: &mut Option<u64>) -> Result<()> {
        let frame = self.frames.get(device_id)?;
        if frame.is_empty() {
            return Err(AppError::FrameUnavailable(device_id.to_string()));
        }
        if self.config.skip_duplicate_frames && *last_sequence == Some(frame.sequence()) {
            return Ok(());
        }

        trace!(
            "Camera {} frame #{} ({} bytes, {:?} old)",
            device_id,
            frame.sequence(),
            frame.len(),
            frame.age()
        );
        self.deliver(StreamEvent::frame(device_id, &frame)).await?;
        *last_sequence = Some(frame.sequence());
        Ok(())
    }

    /// Deliver an event unless cancelled first
    ///
    /// A cancelled delivery resolves `Ok`; the loop exits at its next sleep.
    async fn deliver(&self, event: StreamEvent) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(()),
            result = self.sink.deliver(event) => result,
        }
    }
}

/// Finalizes a session when its loop ends, including by panic or abort
struct LoopGuard {
    session: Arc<StreamSession>,
    frames: Arc<FrameBuffer>,
    events: Option<Arc<EventBus>>,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        // Clear before the terminal status so a restart never sees the old frame
        self.frames.clear(self.session.device_id());

        let status = if std::thread::panicking() {
            StreamStatus::Failed
        } else {
            StreamStatus::Stopped
        };
        if self.session.transition(status) {
            publish_status(self.events.as_deref(), &self.session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::testing::FakeDriver;
    use crate::stream::sink::testing::RecordingSink;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct Harness {
        driver: Arc<FakeDriver>,
        registry: Arc<DeviceRegistry>,
        frames: Arc<FrameBuffer>,
        scheduler: Arc<StreamScheduler>,
    }

    fn harness_with(config: StreamConfig, ids: &[&str], running: &[&str]) -> Harness {
        let driver = Arc::new(FakeDriver::with_devices(ids));
        let registry = Arc::new(DeviceRegistry::new(driver.clone()));
        registry.reload().unwrap();
        for id in running {
            registry.open(id).unwrap();
        }
        let frames = Arc::new(FrameBuffer::new());
        let scheduler = StreamScheduler::new(registry.clone(), frames.clone(), config);
        Harness {
            driver,
            registry,
            frames,
            scheduler,
        }
    }

    fn harness(ids: &[&str], running: &[&str]) -> Harness {
        harness_with(StreamConfig::default(), ids, running)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_running_device() {
        let h = harness(&["cam1"], &[]);
        let sink = Arc::new(RecordingSink::new());

        let err = h.scheduler.start_stream("cam1", sink.clone()).unwrap_err();
        assert!(matches!(err, AppError::DeviceNotRunning(_)));

        let err = h.scheduler.start_stream("missing", sink).unwrap_err();
        assert!(matches!(err, AppError::DeviceNotRunning(_)));
        assert!(h.scheduler.sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());

        let first = h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        assert_eq!(first.status(), StreamStatus::Running);

        let err = h.scheduler.start_stream("cam1", sink).unwrap_err();
        assert!(matches!(err, AppError::StreamAlreadyActive(_)));
        assert_eq!(h.scheduler.active_count(), 1);
        assert_eq!(h.scheduler.session("cam1").unwrap().id(), first.id());

        h.scheduler.stop_stream("cam1").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_create_one_session() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let scheduler = h.scheduler.clone();
                let sink = sink.clone();
                tokio::spawn(async move { scheduler.start_stream("cam1", sink).map(|_| ()) })
            })
            .collect();

        let mut started = 0;
        for attempt in futures::future::join_all(attempts).await {
            match attempt.unwrap() {
                Ok(()) => started += 1,
                Err(AppError::StreamAlreadyActive(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(h.scheduler.active_count(), 1);

        h.scheduler.stop_stream("cam1").await.unwrap();
        assert_eq!(h.scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_stream() {
        let h = harness(&["cam1"], &["cam1"]);
        let err = h.scheduler.stop_stream("cam1").await.unwrap_err();
        assert!(matches!(err, AppError::StreamNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_clears_frame() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());
        h.frames.put("cam1", vec![0xFF; 256]);

        let session = h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        sleep(Duration::from_millis(150)).await;
        assert!(sink.len() > 0);

        assert!(h.scheduler.stop_stream("cam1").await.unwrap());
        assert_eq!(session.status(), StreamStatus::Stopped);
        assert!(h.frames.get("cam1").unwrap().is_empty());

        assert!(h.scheduler.stop_stream("cam1").await.unwrap());
        assert_eq!(session.status(), StreamStatus::Stopped);

        // Even with a new frame, the stopped loop emits nothing more
        let delivered = sink.len();
        h.frames.put("cam1", vec![0xAA; 256]);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.len(), delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_is_paced() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());

        h.frames.put("cam1", vec![1; 256]);
        let producer = {
            let frames = h.frames.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(90)).await;
                frames.put("cam1", vec![2; 256]);
                sleep(Duration::from_millis(90)).await;
                frames.put("cam1", vec![3; 256]);
            })
        };

        h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        sleep(Duration::from_millis(250)).await;
        h.scheduler.stop_stream("cam1").await.unwrap();
        producer.await.unwrap();

        let sequences = sink.frame_sequences();
        assert!(!sequences.is_empty());
        // ceil(250 / 100) + 1
        assert!(sequences.len() <= 4, "too many frames: {:?}", sequences);
        assert!(sequences.windows(2).all(|w| w[0] <= w[1]));

        let delivered = sink.len();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.len(), delivered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_buffer_emits_nothing() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());

        let session = h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.len(), 0);
        assert_eq!(session.status(), StreamStatus::Running);

        h.frames.put("cam1", vec![7; 256]);
        sleep(Duration::from_millis(150)).await;
        assert!(!sink.frame_sequences().is_empty());
        h.scheduler.stop_stream("cam1").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_backs_off_and_keeps_running() {
        let h = harness(&["cam2"], &["cam2"]);
        let sink = Arc::new(RecordingSink::new());
        h.frames.put_failure("cam2", "read failed");

        let session = h.scheduler.start_stream("cam2", sink.clone()).unwrap();
        sleep(Duration::from_millis(6000)).await;

        let failures = sink.failure_times();
        assert!(failures.len() >= 2, "expected repeated failures: {}", failures.len());
        assert!(failures.len() <= 3);
        for pair in failures.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(2500));
        }
        assert!(sink.frame_sequences().is_empty());
        assert_eq!(session.status(), StreamStatus::Running);

        match &sink.events()[0].1 {
            StreamEvent::FrameFailed { device_id, message } => {
                assert_eq!(device_id, "cam2");
                assert!(message.contains("read failed"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Recovery: frames resume once the pending back-off elapses
        h.frames.put("cam2", vec![5; 256]);
        sleep(Duration::from_millis(2600)).await;
        assert!(!sink.frame_sequences().is_empty());
        let events = sink.events();
        let last_failure = *sink.failure_times().last().unwrap();
        let first_frame = events
            .iter()
            .find(|(_, event)| matches!(event, StreamEvent::Frame { .. }))
            .map(|(at, _)| *at)
            .unwrap();
        assert!(first_frame - last_failure >= Duration::from_millis(2500));
        // No failure is reported once the slot holds a frame again
        assert!(events
            .iter()
            .skip_while(|(_, event)| !matches!(event, StreamEvent::Frame { .. }))
            .all(|(_, event)| matches!(event, StreamEvent::Frame { .. })));
        h.scheduler.stop_stream("cam2").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_is_reported() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());
        h.frames.put("cam1", vec![9; 256]);
        sink.fail_next("send buffer full");

        h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        sleep(Duration::from_millis(2600)).await;

        let events = sink.events();
        assert!(matches!(events[0].1, StreamEvent::FrameFailed { .. }));
        assert!(matches!(events[1].1, StreamEvent::Frame { .. }));
        assert!(events[1].0 - events[0].0 >= Duration::from_millis(2500));
        h.scheduler.stop_stream("cam1").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_disconnect_stops_loop() {
        let h = harness(&["cam3"], &["cam3"]);
        let sink = Arc::new(RecordingSink::new());
        h.frames.put("cam3", vec![3; 256]);

        let session = h.scheduler.start_stream("cam3", sink.clone()).unwrap();
        sleep(Duration::from_millis(150)).await;
        assert!(sink.len() > 0);

        sink.disconnect();
        let status = timeout(Duration::from_millis(100), session.wait_terminated())
            .await
            .expect("loop did not stop within one interval");
        assert_eq!(status, StreamStatus::Stopped);
        assert_eq!(h.scheduler.active_count(), 0);

        // The terminated session can be replaced
        let sink = Arc::new(RecordingSink::new());
        let next = h.scheduler.start_stream("cam3", sink).unwrap();
        assert_ne!(next.id(), session.id());
        h.scheduler.stop_stream("cam3").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_backoff_stops_loop() {
        let h = harness(&["cam3"], &["cam3"]);
        let sink = Arc::new(RecordingSink::new());
        h.frames.put_failure("cam3", "read failed");

        let session = h.scheduler.start_stream("cam3", sink.clone()).unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.failure_times().len(), 1);

        // Well inside the 2500ms back-off
        sink.disconnect();
        let status = timeout(Duration::from_millis(100), session.wait_terminated())
            .await
            .expect("loop kept sleeping through the back-off");
        assert_eq!(status, StreamStatus::Stopped);
        assert_eq!(sink.failure_times().len(), 1);
        assert_eq!(h.scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_device_stops_stream() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());
        let session = h.scheduler.start_stream("cam1", sink).unwrap();

        h.registry.close("cam1").unwrap();
        assert!(matches!(
            session.status(),
            StreamStatus::Stopping | StreamStatus::Stopped
        ));

        let status = timeout(Duration::from_millis(100), session.wait_terminated())
            .await
            .unwrap();
        assert_eq!(status, StreamStatus::Stopped);
        assert_eq!(h.driver.close_calls(), vec!["cam1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_device_stops_stream() {
        let h = harness(&["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());
        let session = h.scheduler.start_stream("cam1", sink).unwrap();

        h.driver.detach("cam1");
        h.registry.reload().unwrap();

        let status = timeout(Duration::from_millis(150), session.wait_terminated())
            .await
            .unwrap();
        assert_eq!(status, StreamStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_duplicate_frames() {
        let config = StreamConfig {
            skip_duplicate_frames: true,
            ..Default::default()
        };
        let h = harness_with(config, &["cam1"], &["cam1"]);
        let sink = Arc::new(RecordingSink::new());
        h.frames.put("cam1", vec![1; 256]);

        h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        sleep(Duration::from_millis(550)).await;
        assert_eq!(sink.frame_sequences().len(), 1);

        h.frames.put("cam1", vec![2; 256]);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(sink.frame_sequences().len(), 2);
        h.scheduler.stop_stream("cam1").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_events() {
        let h = harness(&["cam1"], &["cam1"]);
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        h.scheduler.set_event_bus(bus);

        let sink = Arc::new(RecordingSink::new());
        h.scheduler.start_stream("cam1", sink).unwrap();
        h.scheduler.stop_stream("cam1").await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SystemEvent::StreamStateChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                StreamStatus::Running,
                StreamStatus::Stopping,
                StreamStatus::Stopped
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all() {
        let h = harness(&["cam1", "cam2"], &["cam1", "cam2"]);
        let sink = Arc::new(RecordingSink::new());
        h.scheduler.start_stream("cam1", sink.clone()).unwrap();
        h.scheduler.start_stream("cam2", sink).unwrap();
        assert_eq!(h.scheduler.active_count(), 2);

        h.scheduler.stop_all().await;
        assert_eq!(h.scheduler.active_count(), 0);
        assert_eq!(h.scheduler.sessions().len(), 2);
    }
}
