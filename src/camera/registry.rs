//! Device registry
//!
//! Holds the authoritative device set. The set is an immutable snapshot behind
//! an `ArcSwap`; every change builds a new snapshot and swaps it in, so readers
//! never observe a half-applied reload or state change.

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::device::{CaptureDriver, Device};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SystemEvent};

/// Hook used by the registry to stop streams of a device it closes
pub trait StreamControl: Send + Sync {
    /// Ask any active stream of `device_id` to stop, without waiting
    fn request_stop(&self, device_id: &str);
}

type DeviceSet = Vec<Device>;

/// Registry of known capture devices
pub struct DeviceRegistry {
    driver: Arc<dyn CaptureDriver>,
    devices: ArcSwap<DeviceSet>,
    /// Serializes driver calls together with the snapshot swap that records them
    op_lock: Mutex<()>,
    stream_control: RwLock<Option<Weak<dyn StreamControl>>>,
    events: RwLock<Option<Arc<EventBus>>>,
}

impl DeviceRegistry {
    /// Create an empty registry; call [`reload`](Self::reload) to populate it
    pub fn new(driver: Arc<dyn CaptureDriver>) -> Self {
        Self {
            driver,
            devices: ArcSwap::from_pointee(Vec::new()),
            op_lock: Mutex::new(()),
            stream_control: RwLock::new(None),
            events: RwLock::new(None),
        }
    }

    /// Set event bus for broadcasting device changes
    pub fn set_event_bus(&self, events: Arc<EventBus>) {
        *self.events.write() = Some(events);
    }

    /// Set the component that owns streaming loops
    pub fn set_stream_control(&self, control: Weak<dyn StreamControl>) {
        *self.stream_control.write() = Some(control);
    }

    /// Re-enumerate devices and replace the device set
    ///
    /// Devices that are still attached keep their open/running/paused flags.
    /// Open devices that vanished are released and their streams stopped.
    pub fn reload(&self) -> Result<usize> {
        let (count, vanished) = {
            let _guard = self.op_lock.lock();
            let found = self.driver.enumerate_devices()?;
            let current = self.devices.load();

            let next: DeviceSet = found
                .into_iter()
                .map(|info| match current.iter().find(|d| d.info.id == info.id) {
                    Some(existing) => Device {
                        info,
                        ..existing.clone()
                    },
                    None => Device::new(info),
                })
                .collect();

            let vanished: Vec<String> = current
                .iter()
                .filter(|d| d.is_open && !next.iter().any(|n| n.info.id == d.info.id))
                .map(|gone| {
                    warn!("Open camera {} disappeared during reload", gone.id());
                    // Release the handle so a reattached device opens a fresh capture
                    if let Err(e) = self.driver.close_device(&gone.info) {
                        warn!("Failed to release vanished camera {}: {}", gone.id(), e);
                    }
                    gone.id().to_string()
                })
                .collect();

            let count = next.len();
            self.devices.store(Arc::new(next));
            (count, vanished)
        };

        debug!("Camera registry reloaded: {} devices", count);
        self.publish(SystemEvent::DevicesReloaded { count });
        for device_id in &vanished {
            self.request_stream_stop(device_id);
        }
        Ok(count)
    }

    /// Snapshot of all devices
    pub fn list(&self) -> Vec<Device> {
        self.devices.load().as_ref().clone()
    }

    /// Look up a device by id
    pub fn get(&self, device_id: &str) -> Result<Device> {
        self.devices
            .load()
            .iter()
            .find(|d| d.id() == device_id)
            .cloned()
            .ok_or_else(|| AppError::DeviceNotFound(device_id.to_string()))
    }

    /// Whether the device exists and is producing frames
    pub fn is_running(&self, device_id: &str) -> bool {
        self.devices
            .load()
            .iter()
            .any(|d| d.id() == device_id && d.is_running)
    }

    /// Acquire the capture handle of a device
    pub fn open(&self, device_id: &str) -> Result<bool> {
        let _guard = self.op_lock.lock();
        let device = self.get(device_id)?;
        if device.is_running {
            debug!("Camera {} already running", device_id);
            return Ok(true);
        }

        let opened = self
            .driver
            .open_device(&device.info)
            .map_err(|e| AppError::DeviceOpenFailed {
                device: device_id.to_string(),
                reason: e.to_string(),
            })?;
        if !opened {
            return Err(AppError::DeviceOpenFailed {
                device: device_id.to_string(),
                reason: "driver declined to open the device".to_string(),
            });
        }

        let updated = self.modify(device_id, Device::mark_open)?;
        info!("Camera {} opened ({})", device_id, updated.info.device_path);
        self.publish_state(&updated);
        Ok(true)
    }

    /// Release the capture handle of a device and stop its stream
    pub fn close(&self, device_id: &str) -> Result<bool> {
        let updated = {
            let _guard = self.op_lock.lock();
            let device = self.get(device_id)?;
            if device.is_open {
                match self.driver.close_device(&device.info) {
                    Ok(true) => {}
                    Ok(false) => warn!("Driver did not confirm closing camera {}", device_id),
                    Err(e) => warn!("Failed to release camera {}: {}", device_id, e),
                }
            }
            self.modify(device_id, Device::mark_closed)?
        };

        info!("Camera {} closed", device_id);
        self.publish_state(&updated);
        self.request_stream_stop(device_id);
        Ok(true)
    }

    /// Toggle the paused flag; returns the new paused state
    pub fn pause(&self, device_id: &str) -> Result<bool> {
        let _guard = self.op_lock.lock();
        let device = self.get(device_id)?;
        let paused = !device.is_paused;

        if device.is_open {
            if let Err(e) = self.driver.pause_device(&device.info, paused) {
                warn!("Driver failed to pause camera {}: {}", device_id, e);
            }
        }

        let updated = self.modify(device_id, |d| d.is_paused = paused)?;
        info!(
            "Camera {} {}",
            device_id,
            if paused { "paused" } else { "resumed" }
        );
        self.publish_state(&updated);
        Ok(paused)
    }

    /// Close every open device (used at shutdown)
    pub fn close_all(&self) {
        let open: Vec<String> = self
            .devices
            .load()
            .iter()
            .filter(|d| d.is_open)
            .map(|d| d.id().to_string())
            .collect();

        for id in open {
            if let Err(e) = self.close(&id) {
                warn!("Failed to close camera {}: {}", id, e);
            }
        }
    }

    /// Apply `f` to one device in a new snapshot and swap it in
    fn modify(&self, device_id: &str, f: impl Fn(&mut Device)) -> Result<Device> {
        let mut updated = None;
        self.devices.rcu(|current| {
            let mut next = current.as_ref().clone();
            updated = next.iter_mut().find(|d| d.id() == device_id).map(|d| {
                f(d);
                d.clone()
            });
            next
        });
        updated.ok_or_else(|| AppError::DeviceNotFound(device_id.to_string()))
    }

    fn request_stream_stop(&self, device_id: &str) {
        let control = self.stream_control.read().as_ref().and_then(Weak::upgrade);
        if let Some(control) = control {
            control.request_stop(device_id);
        }
    }

    fn publish_state(&self, device: &Device) {
        self.publish(SystemEvent::CameraStateChanged {
            device_id: device.id().to_string(),
            open: device.is_open,
            running: device.is_running,
            paused: device.is_paused,
        });
    }

    fn publish(&self, event: SystemEvent) {
        if let Some(events) = self.events.read().as_ref() {
            events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::testing::FakeDriver;

    fn registry_with(ids: &[&str]) -> (Arc<FakeDriver>, DeviceRegistry) {
        let driver = Arc::new(FakeDriver::with_devices(ids));
        let registry = DeviceRegistry::new(driver.clone());
        registry.reload().unwrap();
        (driver, registry)
    }

    #[derive(Default)]
    struct RecordingControl {
        stops: Mutex<Vec<String>>,
    }

    impl StreamControl for RecordingControl {
        fn request_stop(&self, device_id: &str) {
            self.stops.lock().push(device_id.to_string());
        }
    }

    #[test]
    fn test_open_then_close_updates_flags() {
        let (driver, registry) = registry_with(&["cam1", "cam2"]);

        for id in ["cam1", "cam2"] {
            assert!(registry.open(id).unwrap());
            let device = registry.get(id).unwrap();
            assert!(device.is_open && device.is_running);

            assert!(registry.close(id).unwrap());
            let device = registry.get(id).unwrap();
            assert!(!device.is_open && !device.is_running);
        }
        assert_eq!(driver.open_calls(), vec!["cam1", "cam2"]);
        assert_eq!(driver.close_calls(), vec!["cam1", "cam2"]);
    }

    #[test]
    fn test_unknown_device() {
        let (_, registry) = registry_with(&["cam1"]);
        assert!(matches!(registry.get("nope"), Err(AppError::DeviceNotFound(_))));
        assert!(matches!(registry.open("nope"), Err(AppError::DeviceNotFound(_))));
        assert!(matches!(registry.close("nope"), Err(AppError::DeviceNotFound(_))));
        assert!(matches!(registry.pause("nope"), Err(AppError::DeviceNotFound(_))));
        assert!(!registry.is_running("nope"));
    }

    #[test]
    fn test_open_failure_carries_driver_error() {
        let (driver, registry) = registry_with(&["cam1"]);
        driver.fail_open("cam1");

        match registry.open("cam1") {
            Err(AppError::DeviceOpenFailed { device, reason }) => {
                assert_eq!(device, "cam1");
                assert!(reason.contains("busy"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!registry.get("cam1").unwrap().is_open);
    }

    #[test]
    fn test_open_twice_calls_driver_once() {
        let (driver, registry) = registry_with(&["cam1"]);
        registry.open("cam1").unwrap();
        registry.open("cam1").unwrap();
        assert_eq!(driver.open_calls().len(), 1);
    }

    #[test]
    fn test_close_requests_stream_stop() {
        let (_, registry) = registry_with(&["cam1"]);
        let control = Arc::new(RecordingControl::default());
        let weak: Weak<dyn StreamControl> = Arc::downgrade(&control) as Weak<dyn StreamControl>;
        registry.set_stream_control(weak);

        registry.open("cam1").unwrap();
        registry.close("cam1").unwrap();
        assert_eq!(*control.stops.lock(), vec!["cam1".to_string()]);
    }

    #[test]
    fn test_pause_toggles() {
        let (_, registry) = registry_with(&["cam1"]);
        registry.open("cam1").unwrap();

        assert!(registry.pause("cam1").unwrap());
        assert!(registry.get("cam1").unwrap().is_paused);
        assert!(!registry.pause("cam1").unwrap());
        assert!(!registry.get("cam1").unwrap().is_paused);
        // Pausing does not release the handle
        assert!(registry.get("cam1").unwrap().is_running);
    }

    #[test]
    fn test_reload_keeps_state_of_remaining_devices() {
        let (driver, registry) = registry_with(&["cam1", "cam2"]);
        registry.open("cam1").unwrap();

        driver.detach("cam2");
        driver.attach("cam3");
        assert_eq!(registry.reload().unwrap(), 2);

        let ids: Vec<String> = registry.list().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["cam1", "cam3"]);
        assert!(registry.is_running("cam1"));
        assert!(!registry.is_running("cam3"));
        assert!(matches!(registry.get("cam2"), Err(AppError::DeviceNotFound(_))));
    }

    #[test]
    fn test_reload_releases_vanished_open_device() {
        let (driver, registry) = registry_with(&["cam1"]);
        let control = Arc::new(RecordingControl::default());
        let weak: Weak<dyn StreamControl> = Arc::downgrade(&control) as Weak<dyn StreamControl>;
        registry.set_stream_control(weak);
        registry.open("cam1").unwrap();

        driver.detach("cam1");
        assert_eq!(registry.reload().unwrap(), 0);
        assert_eq!(driver.close_calls(), vec!["cam1"]);
        assert_eq!(*control.stops.lock(), vec!["cam1"]);

        // Reattached: listed as closed and opened through the driver again
        driver.attach("cam1");
        registry.reload().unwrap();
        assert!(!registry.get("cam1").unwrap().is_open);
        registry.open("cam1").unwrap();
        assert_eq!(driver.open_calls(), vec!["cam1", "cam1"]);
        assert_eq!(driver.close_calls(), vec!["cam1"]);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let (_, registry) = registry_with(&["cam1"]);
        let before = registry.list();
        registry.reload().unwrap();
        registry.reload().unwrap();
        assert_eq!(registry.list(), before);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_changes() {
        let (_, registry) = registry_with(&["cam1"]);
        let snapshot = registry.list();
        registry.open("cam1").unwrap();
        assert!(!snapshot[0].is_open);
        assert!(registry.list()[0].is_open);
    }

    #[tokio::test]
    async fn test_events_published() {
        let (_, registry) = registry_with(&["cam1"]);
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        registry.set_event_bus(bus);

        registry.open("cam1").unwrap();
        match rx.recv().await.unwrap() {
            SystemEvent::CameraStateChanged {
                device_id, running, ..
            } => {
                assert_eq!(device_id, "cam1");
                assert!(running);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
