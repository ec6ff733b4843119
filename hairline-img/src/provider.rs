//! The landmark detection seam. Detection itself is an external model; the
//! tracker only needs one answer per frame it hands over.

use crate::landmarks::LandmarkSet;
use crate::source::{Frame, JOIN_LIMIT, join_within};
use anyhow::{Context, Error, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{Level, debug, span, trace};

pub type LandmarkFuture = BoxFuture<'static, Result<Option<LandmarkSet>>>;

pub trait LandmarkProvider {
    /// Starts detection on `frame`. The future owns everything it needs, so
    /// the provider stays free while the answer is pending.
    fn detect(&mut self, frame: &Frame) -> LandmarkFuture;

    /// Releases the model. Later `detect` calls fail.
    fn close(&mut self);
}

/// A blocking face mesh model.
pub trait LandmarkModel: Send + 'static {
    fn run(&mut self, image: &RgbaImage) -> Result<Option<LandmarkSet>>;
}

struct Job {
    image: Arc<RgbaImage>,
    sequence: u64,
    reply: flume::Sender<Result<Option<LandmarkSet>>>,
}

/// Runs a `LandmarkModel` on its own thread so inference never blocks the
/// tracking loop.
pub struct ThreadedProvider {
    tx: Option<flume::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedProvider {
    pub fn spawn<M: LandmarkModel>(mut model: M) -> Result<Self> {
        let (tx, rx) = flume::bounded::<Job>(1);
        let worker = std::thread::Builder::new()
            .name("hairline-landmarks".into())
            .spawn(move || {
                for job in rx.iter() {
                    if job.reply.is_disconnected() {
                        trace!("Skipping frame {}, nobody is waiting for it", job.sequence);
                        continue;
                    }
                    let span = span!(Level::DEBUG, "landmark_inference", sequence = job.sequence);
                    let _guard = span.enter();

                    let result = model.run(&job.image);
                    if job.reply.send(result).is_err() {
                        trace!("Dropping landmarks for abandoned frame {}", job.sequence);
                    }
                }
                debug!("Landmark worker exiting");
            })
            .context("spawning landmark worker")?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl LandmarkProvider for ThreadedProvider {
    fn detect(&mut self, frame: &Frame) -> LandmarkFuture {
        let Some(tx) = self.tx.clone() else {
            return async { Err(Error::msg("landmark provider is closed")) }.boxed();
        };

        let (reply, response) = flume::bounded(1);
        let job = Job {
            image: frame.image.clone(),
            sequence: frame.sequence,
            reply,
        };

        async move {
            tx.send_async(job)
                .await
                .map_err(|_| Error::msg("landmark worker exited"))?;
            response
                .recv_async()
                .await
                .map_err(|_| Error::msg("landmark worker dropped the frame"))?
        }
        .boxed()
    }

    fn close(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            join_within(worker, JOIN_LIMIT, "Landmark worker");
        }
    }
}

impl Drop for ThreadedProvider {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replays landmarks captured earlier, one JSON line per frame: either
/// `null` or an array of 468 `[x, y, z]` triples. Wraps around at the end.
#[derive(Debug, Clone, Default)]
pub struct RecordedLandmarks {
    frames: Vec<Option<LandmarkSet>>,
    cursor: usize,
}

impl RecordedLandmarks {
    pub fn open(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("reading landmarks from {}", path.display()))?;
        Self::parse(&src)
    }

    pub fn parse(src: &str) -> Result<Self> {
        let frames = src
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<Option<LandmarkSet>>(line)
                    .with_context(|| format!("landmark line {}", i + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl LandmarkModel for RecordedLandmarks {
    fn run(&mut self, _image: &RgbaImage) -> Result<Option<LandmarkSet>> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        let landmarks = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Ok(landmarks)
    }
}
