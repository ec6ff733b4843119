use anyhow::{Context, Result, bail};
use hairline_img::tracker::FrameSink;
use image::{EncodableLayout, RgbaImage};
use tracing::error;

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

/// Pipes raw RGBA frames to ffplay, or to a v4l2 loopback device via ffmpeg.
pub struct OutputVideoStream {
    output_proc: std::process::Child,
    width: u32,
    height: u32,
    closed: bool,
}

impl Drop for OutputVideoStream {
    fn drop(&mut self) {
        if let Err(e) = self.output_proc.kill() {
            error!("Failed to stop output process {e:?}");
        }
    }
}

impl OutputVideoStream {
    pub fn new(width: u32, height: u32, device: Option<String>) -> Result<Self> {
        let size = format!("{width}x{height}");
        let mut command = match device {
            Some(d) => {
                let mut command = Command::new("ffmpeg");
                command.args([
                    "-f",
                    "rawvideo",
                    "-pix_fmt",
                    "rgba",
                    "-s",
                    &size,
                    "-i",
                    "-",
                    "-map",
                    "0:v",
                    "-preset",
                    "fast",
                    "-vf",
                    "format=yuv420p",
                    "-f",
                    "v4l2",
                    &format!("/dev/{d}"),
                ]);
                command
            }
            None => {
                let mut command = Command::new("ffplay");
                command.args([
                    "-f",
                    "rawvideo",
                    "-pixel_format",
                    "rgba",
                    "-video_size",
                    &size,
                    "-fflags",
                    "nobuffer",
                    "-flags",
                    "low_delay",
                    "-window_title",
                    "hairline",
                    "-",
                ]);
                command
            }
        };
        let output_proc = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("starting video output process")?;

        Ok(Self {
            output_proc,
            width,
            height,
            closed: false,
        })
    }
}

impl FrameSink for OutputVideoStream {
    fn display_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&mut self, img: &RgbaImage) -> Result<()> {
        if img.dimensions() != (self.width, self.height) {
            bail!(
                "frame is {}x{}, output expects {}x{}",
                img.width(),
                img.height(),
                self.width,
                self.height
            );
        }
        if let Some(stdin) = self.output_proc.stdin.as_mut() {
            if let Err(e) = stdin.write_all(img.as_bytes()) {
                if e.kind() == ErrorKind::BrokenPipe {
                    self.closed = true;
                }
                return Err(e).context("writing frame to video output");
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}
