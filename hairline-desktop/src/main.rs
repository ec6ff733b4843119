#![warn(unused_extern_crates)]
use anyhow::{Context, Result, bail};
use camera::NokhwaCamera;
use clap::{Args, Parser};
use hairline_img::analysis::analyze;
use hairline_img::catalog::{Catalog, HairstyleId};
use hairline_img::compositor::{Compositor, Face, Scene, Surface};
use hairline_img::config::Config;
use hairline_img::provider::{LandmarkModel, RecordedLandmarks, ThreadedProvider};
use hairline_img::session::{Mode, SessionState};
use hairline_img::source::{FrameSource, LatestFrame, StreamConstraints};
use hairline_img::sprites::{FsSpriteLoader, SpriteCache};
use hairline_img::tracker::{Tracker, TrackerHandle};
use image::{DynamicImage, RgbaImage};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, debug, error, info, span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use video::OutputVideoStream;

mod camera;
mod video;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Tuning, framing and tracker settings
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Hairstyle catalog. Uses the four built-in styles if unset
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Directory the catalog's sprite paths are relative to
    #[arg(short, long, value_name = "DIR", default_value = "assets")]
    sprites: PathBuf,

    /// Recorded landmarks to replay, one JSON line per frame
    #[arg(short, long, value_name = "FILE")]
    landmarks: PathBuf,

    /// Max processed frames per second, overriding the config
    #[arg(long)]
    fps: Option<f32>,

    /// Starting mode: calibration or try-on
    #[arg(short, long, default_value = "calibration")]
    mode: Mode,

    /// Hairstyle id to show in try-on mode
    #[arg(long)]
    style: Option<HairstyleId>,

    /// Origin the kiosk UI is served from, checked before opening the camera
    #[arg(long)]
    origin: Option<String>,

    /// Camera index. Picks a front-facing camera if unset
    #[arg(long)]
    camera: Option<u32>,

    /// Where the `capture` command writes its JPEG snapshot
    #[arg(long, value_name = "FILE", default_value = "capture.jpg")]
    capture: PathBuf,

    #[command(flatten)]
    out: Out,

    /// Process single input frame, reading from input path
    #[arg(short, long, requires = "output")]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct Out {
    /// Loopback device to write to. Displays in window if unset
    #[arg(group = "dest", short, long)]
    device: Option<String>,

    /// Process single input frame, writing a PNG to output path
    #[arg(group = "dest", short, long, requires = "input")]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = CmdArgs::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(fps) = args.fps {
        config.tracker.max_fps = fps;
        config.validate()?;
    }

    let catalog = Arc::new(match &args.catalog {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    });
    if let Some(id) = args.style {
        if catalog.get(id).is_none() {
            bail!("No hairstyle with id {id} in the catalog");
        }
    }
    let state = SessionState {
        mode: args.mode,
        selected: args.style,
    };

    let compositor = Compositor::from_config(&config)?;
    let mut sprites = SpriteCache::new();
    sprites
        .load(&catalog, &FsSpriteLoader::new(&args.sprites))
        .await;
    info!("Loaded {} of {} sprites", sprites.len(), catalog.len());

    let recorded = RecordedLandmarks::open(&args.landmarks)?;
    info!("Replaying {} recorded frames", recorded.len());

    if let (Some(input), Some(output)) = (&args.input, &args.out.output) {
        // Process single image at file and exit
        return process_image(
            input, output, &compositor, &catalog, &sprites, state, recorded,
        );
    }

    let constraints = StreamConstraints {
        fps: config.tracker.max_fps.ceil() as u32,
        origin: args.origin.clone(),
        ..StreamConstraints::default()
    };
    let mut source = FrameSource::start(
        NokhwaCamera {
            device: args.camera,
        },
        &constraints,
    )?;
    let (width, height) = source.resolution();
    let sink = OutputVideoStream::new(width, height, args.out.device.clone())?;
    let provider = ThreadedProvider::spawn(recorded)?;

    let (state_tx, state_rx) = watch::channel(state);
    let tracker = Tracker::new(
        &config,
        compositor,
        provider,
        sink,
        catalog.clone(),
        Arc::new(sprites),
        state_rx,
    );
    spawn_controls(
        state_tx,
        tracker.handle(),
        catalog,
        source.latest_frame(),
        args.capture.clone(),
    )?;

    let stats = tracker.run(&mut source).await;
    debug!("{stats:?}");
    Ok(())
}

fn process_image(
    src: &Path,
    dest: &Path,
    compositor: &Compositor,
    catalog: &Catalog,
    sprites: &SpriteCache,
    state: SessionState,
    mut recorded: RecordedLandmarks,
) -> Result<()> {
    let span = span!(Level::DEBUG, "process_image");
    let _guard = span.enter();

    let frame: RgbaImage = image::open(src)
        .with_context(|| format!("reading {}", src.display()))?
        .into_rgba8();
    let (width, height) = frame.dimensions();
    let landmarks = recorded.run(&frame)?;
    let geometry = landmarks
        .as_ref()
        .map(|l| compositor.geometry().measure(l, width as f32, height as f32));

    let scene = Scene {
        frame: &frame,
        face: landmarks
            .as_ref()
            .zip(geometry.as_ref())
            .map(|(landmarks, geometry)| Face {
                landmarks,
                geometry,
            }),
        state,
        catalog,
        sprites,
    };
    let mut surface = Surface::new();
    let report = compositor.render(&mut surface, width, height, &scene);
    debug!("{report:?}");
    surface
        .into_image()
        .save(dest)
        .with_context(|| format!("writing {}", dest.display()))?;

    match &landmarks {
        Some(landmarks) => {
            let analysis = analyze(landmarks, &frame);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        None => warn!("No face found in {}", src.display()),
    }
    Ok(())
}

/// Reads kiosk commands from stdin, one per line:
/// `mode <calibration|try-on>`, `style <id>`, `clear`, `capture`, `quit`.
fn spawn_controls(
    state: watch::Sender<SessionState>,
    handle: TrackerHandle,
    catalog: Arc<Catalog>,
    frames: LatestFrame,
    capture_path: PathBuf,
) -> Result<()> {
    std::thread::Builder::new()
        .name("hairline-controls".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to read command: {e:?}");
                        break;
                    }
                };
                let mut words = line.split_whitespace();
                let result = match (words.next(), words.next()) {
                    (None, _) => Ok(()),
                    (Some("quit"), _) => break,
                    (Some("mode"), Some(mode)) => mode
                        .parse::<Mode>()
                        .map(|mode| state.send_modify(|s| s.mode = mode)),
                    (Some("style"), Some(id)) => select(&state, &catalog, id),
                    (Some("clear"), _) => {
                        state.send_modify(|s| s.selected = None);
                        Ok(())
                    }
                    (Some("capture"), _) => capture(&frames, &capture_path),
                    _ => Err(anyhow::Error::msg(format!("unknown command {line:?}"))),
                };
                if let Err(e) = result {
                    warn!("{e}");
                }
            }
            handle.stop();
        })
        .context("spawning control thread")?;
    Ok(())
}

fn select(state: &watch::Sender<SessionState>, catalog: &Catalog, id: &str) -> Result<()> {
    let id: HairstyleId = id.parse().with_context(|| format!("bad style id {id:?}"))?;
    let Some(style) = catalog.get(id) else {
        bail!("No hairstyle with id {id}");
    };
    info!("Trying on {}", style.name);
    state.send_modify(|s| *s = SessionState::try_on(id));
    Ok(())
}

fn capture(frames: &LatestFrame, path: &Path) -> Result<()> {
    let Some(frame) = frames.get() else {
        bail!("No camera frame to capture yet");
    };
    let snapshot = Compositor::snapshot(&frame.image);
    DynamicImage::ImageRgba8(snapshot)
        .into_rgb8()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Saved capture to {}", path.display());
    Ok(())
}
