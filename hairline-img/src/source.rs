//! Camera acquisition. A capture thread keeps only the newest decoded frame,
//! the way a video element always shows the latest picture, and the tracking
//! loop samples it at its own pace.

use image::RgbaImage;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{Level, debug, error, info, span, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("no camera found; connect a camera and try again")]
    CameraUnavailable,
    #[error("camera access was denied; allow camera access for this app and reload")]
    PermissionDenied,
    #[error("the camera is in use by another application; close it and try again")]
    DeviceBusy,
    #[error("camera access needs a secure context, but the kiosk is served from {origin}; use https or localhost")]
    InsecureContext { origin: String },
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    #[default]
    User,
    Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamConstraints {
    /// Ideal resolution. Backends pick the closest they support.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub facing: Facing,
    /// Origin the kiosk UI is served from, when it runs in a web view.
    pub origin: Option<String>,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            facing: Facing::User,
            origin: None,
        }
    }
}

/// Opens a device. Called on the capture thread, so the stream itself
/// never has to cross threads.
pub trait CameraBackend: Send + 'static {
    type Stream: CameraStream;

    fn open(self, constraints: &StreamConstraints) -> Result<Self::Stream, CameraError>;
}

pub trait CameraStream {
    fn resolution(&self) -> (u32, u32);
    /// Blocks until the next frame is decoded.
    fn capture(&mut self) -> Result<RgbaImage, CameraError>;
    fn close(&mut self);
}

/// Readiness, following the media element contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
    HaveNothing = 0,
    /// Opened, dimensions known.
    HaveMetadata = 1,
    /// At least one frame decoded.
    HaveCurrentData = 2,
    /// Frames are streaming.
    HaveEnoughData = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveEnoughData,
            _ => ReadyState::HaveNothing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    /// Increases by one for every captured frame.
    pub sequence: u64,
    pub captured_at: Instant,
}

/// What the tracking loop needs from a video source.
pub trait VideoSource {
    fn ready_state(&self) -> ReadyState;
    fn latest(&self) -> Option<Frame>;
    fn is_active(&self) -> bool;
    fn stop(&mut self);
}

struct Shared {
    latest: Mutex<Option<Frame>>,
    ready: AtomicU8,
    active: AtomicBool,
}

impl Shared {
    fn set_ready(&self, state: ReadyState) {
        self.ready.store(state as u8, Ordering::Release);
    }

    fn publish(&self, frame: Option<Frame>) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = frame;
    }

    fn latest(&self) -> Option<Frame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A read-only view of the newest frame that can be sent to other threads.
#[derive(Clone)]
pub struct LatestFrame(Arc<Shared>);

impl LatestFrame {
    pub fn get(&self) -> Option<Frame> {
        self.0.latest()
    }
}

pub struct FrameSource {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    resolution: (u32, u32),
}

impl FrameSource {
    /// Checks the serving origin, then opens `backend` and starts capturing.
    /// Open failures are returned here, before any frame flows.
    pub fn start<B: CameraBackend>(
        backend: B,
        constraints: &StreamConstraints,
    ) -> Result<Self, CameraError> {
        if let Some(origin) = constraints.origin.as_deref() {
            if !is_secure_context(origin) {
                return Err(CameraError::InsecureContext {
                    origin: origin.to_string(),
                });
            }
        }

        let shared = Arc::new(Shared {
            latest: Mutex::new(None),
            ready: AtomicU8::new(ReadyState::HaveNothing as u8),
            active: AtomicBool::new(true),
        });

        let (opened_tx, opened_rx) = flume::bounded(1);
        let thread_shared = shared.clone();
        let constraints = constraints.clone();
        let worker = std::thread::Builder::new()
            .name("hairline-capture".into())
            .spawn(move || {
                let mut stream = match backend.open(&constraints) {
                    Ok(stream) => stream,
                    Err(e) => {
                        thread_shared.active.store(false, Ordering::Release);
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                thread_shared.set_ready(ReadyState::HaveMetadata);
                let _ = opened_tx.send(Ok(stream.resolution()));

                capture_loop(&mut stream, &thread_shared);
                stream.close();
                debug!("Capture thread exiting");
            })
            .map_err(|e| CameraError::CaptureFailed(format!("spawning capture thread: {e}")))?;

        let opened = opened_rx.recv().unwrap_or_else(|_| {
            Err(CameraError::CaptureFailed(
                "capture thread exited while opening the camera".into(),
            ))
        });

        match opened {
            Ok(resolution) => {
                info!("Camera open at {}x{}", resolution.0, resolution.1);
                Ok(Self {
                    shared,
                    worker: Some(worker),
                    resolution,
                })
            }
            Err(e) => {
                if worker.join().is_err() {
                    error!("Capture thread panicked while opening the camera");
                }
                Err(e)
            }
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn latest_frame(&self) -> LatestFrame {
        LatestFrame(self.shared.clone())
    }

    /// Stops capturing and releases the device. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.shared.active.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if join_within(worker, JOIN_LIMIT, "Capture") {
                info!("Camera released");
            }
        }
        self.shared.set_ready(ReadyState::HaveNothing);
        self.shared.publish(None);
    }
}

impl VideoSource for FrameSource {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.shared.ready.load(Ordering::Acquire))
    }

    fn latest(&self) -> Option<Frame> {
        self.shared.latest()
    }

    fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        FrameSource::stop(self)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop<S: CameraStream>(stream: &mut S, shared: &Shared) {
    let mut sequence = 0;
    while shared.active.load(Ordering::Acquire) {
        let span = span!(Level::TRACE, "capture_frame");
        let _guard = span.enter();

        match stream.capture() {
            Ok(image) => {
                sequence += 1;
                shared.publish(Some(Frame {
                    image: Arc::new(image),
                    sequence,
                    captured_at: Instant::now(),
                }));
                shared.set_ready(if sequence == 1 {
                    ReadyState::HaveCurrentData
                } else {
                    ReadyState::HaveEnoughData
                });
            }
            Err(e) => {
                error!("Failed to pull frame from camera: {e}");
                break;
            }
        }
    }
    shared.active.store(false, Ordering::Release);
}

/// How long teardown waits for a helper thread.
pub(crate) const JOIN_LIMIT: Duration = Duration::from_secs(2);

/// Joins `worker` unless it is still running after `limit`, in which case it
/// is detached and finishes on its own.
pub(crate) fn join_within(worker: JoinHandle<()>, limit: Duration, name: &str) -> bool {
    let deadline = Instant::now() + limit;
    while !worker.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                "{name} thread still running after {}ms, detaching it",
                limit.as_millis()
            );
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    if worker.join().is_err() {
        error!("{name} thread panicked");
    }
    true
}

/// Camera APIs are only offered to https pages and loopback hosts.
pub fn is_secure_context(origin: &str) -> bool {
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    if scheme.eq_ignore_ascii_case("https") {
        return true;
    }

    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or("");
    let host = if host_port.starts_with('[') {
        host_port.split_inclusive(']').next().unwrap_or("")
    } else {
        host_port.split(':').next().unwrap_or("")
    };

    matches!(
        host.to_ascii_lowercase().as_str(),
        "localhost" | "127.0.0.1" | "[::1]"
    )
}

/// Caps how often frames are processed, independent of the display rate.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval: Duration,
    last: Option<tokio::time::Instant>,
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True, and restarts the interval, when at least one interval has
    /// passed since the last accepted tick.
    pub fn ready(&mut self, now: tokio::time::Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
