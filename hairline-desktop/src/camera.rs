use hairline_img::source::{CameraBackend, CameraError, CameraStream, Facing, StreamConstraints};
use image::RgbaImage;
use nokhwa::{
    Camera, NokhwaError, nokhwa_initialize,
    pixel_format::RgbAFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
};
use tracing::{Level, debug, error, span};

/// A webcam found through nokhwa. `device` picks a specific index;
/// otherwise the camera is chosen by facing.
pub struct NokhwaCamera {
    pub device: Option<u32>,
}

pub struct NokhwaStream {
    camera: Camera,
}

impl CameraBackend for NokhwaCamera {
    type Stream = NokhwaStream;

    fn open(self, constraints: &StreamConstraints) -> Result<NokhwaStream, CameraError> {
        nokhwa_initialize(|granted| {
            debug!("Camera permission granted: {granted}");
        });

        let cameras = query(ApiBackend::Auto).map_err(|e| classify(&e))?;
        cameras
            .iter()
            .for_each(|cam| debug!("Found camera: {:?}", cam));

        let index = match self.device {
            Some(device) => CameraIndex::Index(device),
            None => pick(&cameras, constraints.facing)
                .ok_or(CameraError::CameraUnavailable)?
                .index()
                .clone(),
        };

        let format = CameraFormat::new(
            Resolution::new(constraints.width, constraints.height),
            FrameFormat::MJPEG,
            constraints.fps,
        );
        let mut camera = Camera::new(
            index,
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format)),
        )
        .map_err(|e| classify(&e))?;
        camera.open_stream().map_err(|e| classify(&e))?;

        Ok(NokhwaStream { camera })
    }
}

impl CameraStream for NokhwaStream {
    fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width(), resolution.height())
    }

    fn capture(&mut self) -> Result<RgbaImage, CameraError> {
        let get_frame_span = span!(Level::DEBUG, "get_frame");
        let get_frame_guard = get_frame_span.enter();
        let frame = self
            .camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        drop(get_frame_guard);

        let decode_span = span!(Level::DEBUG, "decode_nokwha_buff");
        let _decode_guard = decode_span.enter();
        frame
            .decode_image::<RgbAFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    fn close(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            error!("Failed to stop camera stream: {e:?}");
        }
    }
}

/// Prefers a camera whose name matches the facing, else the last one listed.
fn pick(cameras: &[CameraInfo], facing: Facing) -> Option<&CameraInfo> {
    let hints: &[&str] = match facing {
        Facing::User => &["front", "facetime", "user", "integrated"],
        Facing::Environment => &["back", "rear", "environment"],
    };
    cameras
        .iter()
        .find(|cam| {
            let name = cam.human_name().to_lowercase();
            hints.iter().any(|hint| name.contains(hint))
        })
        .or(cameras.last())
}

/// Backends only report errors as text, so match on the wording.
fn classify(e: &NokhwaError) -> CameraError {
    let msg = e.to_string().to_lowercase();
    if msg.contains("busy") || msg.contains("in use") {
        CameraError::DeviceBusy
    } else if msg.contains("permission") || msg.contains("denied") || msg.contains("not authorized")
    {
        CameraError::PermissionDenied
    } else {
        debug!("Camera unavailable: {e}");
        CameraError::CameraUnavailable
    }
}
