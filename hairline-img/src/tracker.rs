//! The tracking loop. One cooperative task drives everything: a display tick
//! samples the newest camera frame, hands it to the landmark provider, and
//! once the answer for that exact frame arrives, draws and presents it.

use crate::catalog::Catalog;
use crate::compositor::{Compositor, Face, RenderReport, Scene, Surface};
use crate::config::{Config, TrackerConfig};
use crate::landmarks::LandmarkSet;
use crate::provider::LandmarkProvider;
use crate::session::SessionState;
use crate::smoothing::Smoother;
use crate::source::{Frame, FrameThrottle, ReadyState, VideoSource};
use crate::sprites::SpriteCache;
use anyhow::Result;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use image::RgbaImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Level, debug, error, info, span, trace, warn};

/// Where finished frames go.
pub trait FrameSink {
    fn display_size(&self) -> (u32, u32);
    fn present(&mut self, image: &RgbaImage) -> Result<()>;

    /// False once the display has gone away for good.
    fn is_open(&self) -> bool {
        true
    }
}

/// Stops a running tracker from anywhere.
#[derive(Clone)]
pub struct TrackerHandle {
    active: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl TrackerHandle {
    /// Halts the loop. Any inference still running is left to finish, but
    /// its result is thrown away.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub presented: u64,
    pub no_face: u64,
    /// Frames skipped because an inference was already running.
    pub dropped_busy: u64,
    pub timeouts: u64,
    pub detection_errors: u64,
    /// Frames that failed to draw or present.
    pub failures: u64,
    /// Inference results that arrived after stop.
    pub discarded: u64,
}

enum Detection {
    Done(Result<Option<LandmarkSet>>),
    TimedOut,
}

type InFlight = LocalBoxFuture<'static, (Frame, Detection)>;

pub struct Tracker<P, K> {
    config: TrackerConfig,
    compositor: Compositor,
    smoother: Smoother,
    provider: P,
    sink: K,
    catalog: Arc<Catalog>,
    sprites: Arc<SpriteCache>,
    state: watch::Receiver<SessionState>,
    handle: TrackerHandle,
    surface: Surface,
    throttle: FrameThrottle,
    last_sequence: Option<u64>,
    stats: TrackerStats,
}

impl<P: LandmarkProvider, K: FrameSink> Tracker<P, K> {
    pub fn new(
        config: &Config,
        compositor: Compositor,
        provider: P,
        sink: K,
        catalog: Arc<Catalog>,
        sprites: Arc<SpriteCache>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            config: config.tracker,
            compositor,
            smoother: Smoother::new(config.smoothing.alpha),
            provider,
            sink,
            catalog,
            sprites,
            state,
            handle: TrackerHandle {
                active: Arc::new(AtomicBool::new(true)),
                wake: Arc::new(Notify::new()),
            },
            surface: Surface::new(),
            throttle: FrameThrottle::new(config.tracker.frame_interval()),
            last_sequence: None,
            stats: TrackerStats::default(),
        }
    }

    pub fn handle(&self) -> TrackerHandle {
        self.handle.clone()
    }

    /// Runs until stopped or until the source stops producing frames, then
    /// releases the source and the provider.
    pub async fn run<S: VideoSource>(mut self, source: &mut S) -> TrackerStats {
        let mut ticker = time::interval(self.config.display_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let timeout = self.config.inference_timeout();
        let wake = self.handle.wake.clone();
        let mut in_flight: Option<InFlight> = None;

        info!("Tracking started");
        while self.handle.is_active() {
            tokio::select! {
                _ = ticker.tick() => {
                    if !source.is_active() {
                        warn!("Video source stopped, ending tracking");
                        break;
                    }
                    if !self.sink.is_open() {
                        warn!("Display closed, ending tracking");
                        break;
                    }
                    if let Some(frame) = self.poll_frame(source, in_flight.is_some()) {
                        in_flight = Some(self.begin(frame, timeout));
                    }
                }
                (frame, detection) = settled(&mut in_flight) => {
                    in_flight = None;
                    if !self.handle.is_active() {
                        debug!("Discarding landmarks for frame {} after stop", frame.sequence);
                        self.stats.discarded += 1;
                        break;
                    }
                    if let Err(e) = self.finish(frame, detection) {
                        self.stats.failures += 1;
                        error!("Failed to process frame: {e:?}");
                    }
                }
                _ = wake.notified() => {}
            }
        }

        if in_flight.take().is_some() {
            debug!("Discarding in-flight inference after stop");
            self.stats.discarded += 1;
        }
        self.handle.active.store(false, Ordering::Release);
        source.stop();
        self.provider.close();

        let stats = self.stats;
        info!(
            presented = stats.presented,
            no_face = stats.no_face,
            dropped_busy = stats.dropped_busy,
            timeouts = stats.timeouts,
            failures = stats.failures,
            "Tracking stopped"
        );
        stats
    }

    /// The frame to process on this tick, if any.
    fn poll_frame<S: VideoSource>(&mut self, source: &S, busy: bool) -> Option<Frame> {
        if source.ready_state() < ReadyState::HaveCurrentData {
            trace!("Video not ready");
            return None;
        }
        if !self.throttle.ready(Instant::now()) {
            return None;
        }
        if busy {
            trace!("Inference in flight, dropping frame");
            self.stats.dropped_busy += 1;
            return None;
        }

        let frame = source.latest()?;
        if self.last_sequence == Some(frame.sequence) {
            return None;
        }
        self.last_sequence = Some(frame.sequence);
        Some(frame)
    }

    fn begin(&mut self, frame: Frame, timeout: Duration) -> InFlight {
        trace!("Detecting landmarks for frame {}", frame.sequence);
        let detection = self.provider.detect(&frame);
        async move {
            let detection = match time::timeout(timeout, detection).await {
                Ok(result) => Detection::Done(result),
                Err(_) => Detection::TimedOut,
            };
            (frame, detection)
        }
        .boxed_local()
    }

    fn finish(&mut self, frame: Frame, detection: Detection) -> Result<RenderReport> {
        let span = span!(Level::INFO, "frame_loop_iter", sequence = frame.sequence);
        let _guard = span.enter();

        let landmarks = match detection {
            Detection::Done(Ok(landmarks)) => landmarks,
            Detection::Done(Err(e)) => {
                error!("Landmark detection failed: {e:?}");
                self.stats.detection_errors += 1;
                None
            }
            Detection::TimedOut => {
                warn!(
                    "Landmark detection exceeded {}ms, drawing without a face",
                    self.config.inference_timeout_ms
                );
                self.stats.timeouts += 1;
                None
            }
        };

        let (width, height) = self.sink.display_size();
        let state = *self.state.borrow();

        let geometry = match &landmarks {
            Some(landmarks) => {
                let raw = self
                    .compositor
                    .geometry()
                    .measure(landmarks, width as f32, height as f32);
                Some(self.smoother.apply(raw))
            }
            None => {
                trace!("No face in frame {}", frame.sequence);
                self.smoother.reset();
                self.stats.no_face += 1;
                None
            }
        };

        let face = landmarks
            .as_ref()
            .zip(geometry.as_ref())
            .map(|(landmarks, geometry)| Face {
                landmarks,
                geometry,
            });
        let scene = Scene {
            frame: &frame.image,
            face,
            state,
            catalog: &self.catalog,
            sprites: &self.sprites,
        };
        let report = self
            .compositor
            .render(&mut self.surface, width, height, &scene);

        let present_span = span!(Level::DEBUG, "present_frame");
        let present_guard = present_span.enter();
        self.sink.present(self.surface.image())?;
        drop(present_guard);

        self.stats.presented += 1;
        trace!("Presented frame {}: {report:?}", frame.sequence);
        Ok(report)
    }
}

/// Resolves with the in-flight inference, or never if there is none.
async fn settled(in_flight: &mut Option<InFlight>) -> (Frame, Detection) {
    match in_flight {
        Some(inference) => inference.await,
        None => std::future::pending().await,
    }
}
