//! V4L2 capture driver
//!
//! Enumerates `/dev/video*` capture nodes and runs one capture thread per
//! open device. Each thread dequeues frames from an mmap stream and writes
//! them into the shared [`FrameBuffer`].

use bytes::Bytes;
use nix::errno::Errno;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use super::device::{CaptureDriver, DeviceDescriptor};
use super::frame_buffer::FrameBuffer;
use crate::config::CaptureConfig;
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;

/// Frames smaller than this are treated as garbage from the driver
const MIN_FRAME_SIZE: usize = 128;

/// Pause after a capture error that did not block in the driver
const ERROR_RETRY_DELAY: Duration = Duration::from_millis(100);

struct CaptureHandle {
    stop_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Capture driver backed by the `v4l` crate
pub struct V4l2Driver {
    config: CaptureConfig,
    frames: Arc<FrameBuffer>,
    captures: Mutex<HashMap<String, CaptureHandle>>,
}

impl V4l2Driver {
    pub fn new(config: CaptureConfig, frames: Arc<FrameBuffer>) -> Self {
        Self {
            config,
            frames,
            captures: Mutex::new(HashMap::new()),
        }
    }

    fn describe(path: &Path) -> Result<Option<DeviceDescriptor>> {
        let device = Device::with_path(path)
            .map_err(|e| AppError::Internal(format!("Failed to open {:?}: {}", path, e)))?;
        let caps = device.query_caps().map_err(|e| {
            AppError::Internal(format!("Failed to query capabilities of {:?}: {}", path, e))
        })?;

        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let device_path = path.display().to_string();

        Ok(Some(DeviceDescriptor {
            display_name: format!("{} ({})", caps.card, device_path),
            name: caps.card,
            id,
            device_path,
        }))
    }
}

impl CaptureDriver for V4l2Driver {
    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let dir = self.config.device_dir();
        let mut devices = Vec::new();

        for entry in std::fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !name.starts_with("video") {
                continue;
            }

            match Self::describe(&path) {
                Ok(Some(info)) => {
                    debug!("Found capture device: {} ({})", info.name, info.device_path);
                    devices.push(info);
                }
                Ok(None) => debug!("Skipping non-capture device: {:?}", path),
                Err(e) => debug!("{}", e),
            }
        }

        devices.sort_by(|a, b| a.device_path.cmp(&b.device_path));
        info!("Found {} video capture devices", devices.len());
        Ok(devices)
    }

    fn open_device(&self, device: &DeviceDescriptor) -> Result<bool> {
        let mut captures = self.captures.lock();
        if let Some(handle) = captures.get(&device.id) {
            if !handle.thread.is_finished() {
                return Ok(true);
            }
            // The worker exited on its own (device lost); start over
            if let Some(stale) = captures.remove(&device.id) {
                let _ = stale.thread.join();
            }
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = CaptureWorker {
            device_id: device.id.clone(),
            device_path: device.device_path.clone(),
            config: self.config.clone(),
            frames: self.frames.clone(),
            stop_flag: stop_flag.clone(),
            paused: paused.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", device.id))
            .spawn(move || worker.run(ready_tx))?;

        // The worker reports whether the stream could be set up before it starts looping
        match ready_rx.recv() {
            Ok(Ok(())) => {
                captures.insert(
                    device.id.clone(),
                    CaptureHandle {
                        stop_flag,
                        paused,
                        thread,
                    },
                );
                Ok(true)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(AppError::Io(e))
            }
            Err(_) => {
                let _ = thread.join();
                Err(AppError::Internal(format!(
                    "Capture thread for {} exited during setup",
                    device.id
                )))
            }
        }
    }

    fn close_device(&self, device: &DeviceDescriptor) -> Result<bool> {
        let handle = self.captures.lock().remove(&device.id);
        let Some(handle) = handle else {
            return Ok(false);
        };

        handle.stop_flag.store(true, Ordering::SeqCst);
        // The worker wakes at least once per dequeue timeout
        if handle.thread.join().is_err() {
            warn!("Capture thread for {} panicked", device.id);
        }
        self.frames.clear(&device.id);
        Ok(true)
    }

    fn pause_device(&self, device: &DeviceDescriptor, paused: bool) -> Result<bool> {
        match self.captures.lock().get(&device.id) {
            Some(handle) => {
                handle.paused.store(paused, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// State owned by one capture thread
struct CaptureWorker {
    device_id: String,
    device_path: String,
    config: CaptureConfig,
    frames: Arc<FrameBuffer>,
    stop_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl CaptureWorker {
    fn run(self, ready: mpsc::Sender<io::Result<()>>) {
        let device = match self.open() {
            Ok(device) => device,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let mut stream = match MmapStream::with_buffers(
            &device,
            Type::VideoCapture,
            self.config.buffer_count,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        stream.set_timeout(self.config.timeout());

        let _ = ready.send(Ok(()));
        info!("Capture started on {}", self.device_path);

        let throttler = LogThrottler::with_secs(5);
        while !self.stop_flag.load(Ordering::Relaxed) {
            match stream.next() {
                Ok((buf, meta)) => {
                    let used = (meta.bytesused as usize).min(buf.len());
                    if used < MIN_FRAME_SIZE {
                        debug!("Dropping small frame: {} bytes", used);
                        continue;
                    }
                    if self.paused.load(Ordering::Relaxed) {
                        continue;
                    }
                    self.frames
                        .put(&self.device_id, Bytes::copy_from_slice(&buf[..used]));
                }
                Err(e) => match classify_error(&e) {
                    ErrorAction::Retry => {
                        if throttler.should_log("timeout") {
                            warn!("Capture timeout on {} - no signal?", self.device_path);
                        }
                    }
                    ErrorAction::Stop => {
                        error!("Video device lost: {} - {}", self.device_path, e);
                        self.frames
                            .put_failure(&self.device_id, format!("device lost: {}", e));
                        break;
                    }
                    ErrorAction::Backoff(delay) => {
                        if throttler.should_log("capture") {
                            warn!("Capture error on {}: {}", self.device_path, e);
                        }
                        self.frames.put_failure(&self.device_id, e.to_string());
                        std::thread::sleep(delay);
                    }
                },
            }
        }

        info!("Capture stopped on {}", self.device_path);
    }

    fn open(&self) -> io::Result<Device> {
        let device = Device::with_path(&self.device_path)?;

        let fourcc = fourcc_from_str(&self.config.fourcc);
        let requested = Format::new(self.config.width, self.config.height, fourcc);
        let actual = device.set_format(&requested)?;
        if actual.width != requested.width || actual.height != requested.height {
            warn!(
                "Requested {}x{}, got {}x{} on {}",
                requested.width, requested.height, actual.width, actual.height, self.device_path
            );
        }

        Ok(device)
    }
}

fn fourcc_from_str(code: &str) -> FourCC {
    let mut repr = [b' '; 4];
    for (slot, byte) in repr.iter_mut().zip(code.bytes()) {
        *slot = byte;
    }
    FourCC::new(&repr)
}

/// What the capture loop does after a dequeue error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorAction {
    /// Dequeue timed out; the driver already waited
    Retry,
    /// Record the failure and wait before the next dequeue
    Backoff(Duration),
    /// Device is gone
    Stop,
}

fn classify_error(e: &io::Error) -> ErrorAction {
    if e.kind() == io::ErrorKind::TimedOut {
        ErrorAction::Retry
    } else if is_device_lost(e) {
        ErrorAction::Stop
    } else {
        ErrorAction::Backoff(ERROR_RETRY_DELAY)
    }
}

fn is_device_lost(e: &io::Error) -> bool {
    e.raw_os_error().map(Errno::from_raw).is_some_and(|errno| {
        matches!(
            errno,
            Errno::ENXIO | Errno::ENODEV | Errno::EIO | Errno::EPIPE | Errno::ESHUTDOWN
        )
    })
}
