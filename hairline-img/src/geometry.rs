//! Pure per-frame math turning a landmark mesh into head pose, face
//! measurements and the placement of a hair sprite.
//!
//! Landmarks are reported in unmirrored source space while the kiosk shows
//! a selfie-mirrored picture, so every canvas-space x coordinate produced
//! here is reflected across the vertical center line.

use crate::config::{FramingConfig, Tuning};
use crate::landmarks::*;
use crate::shapes::point::PointF32;
use crate::shapes::rect::RectF32;
use image::Rgba;
use serde::Serialize;
use tracing::trace;

/// Head orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct HeadPose {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// Canvas-space measurements of one face, in pixels and radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceMetrics {
    pub temple_width: f32,
    pub cheek_width: f32,
    pub ear_width: f32,
    pub face_height: f32,
    pub eye_distance: f32,
    pub forehead_height: f32,
    /// Mirrored x of the temple midpoint.
    pub center_x: f32,
    /// y of the forehead landmark.
    pub top_y: f32,
    /// Eye-line angle measured between the mirrored eye corners.
    pub tilt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HairAnchor {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Where and how large the hair sprite is drawn. The sprite is centered on
/// `anchor` and rotated about it by `rotation` radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HairPlacement {
    pub anchor: HairAnchor,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
}

/// How well the face sits in the frame during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FramingStatus {
    /// Centered and a usable size.
    Positioned,
    /// Centered, but too close or too far away.
    Centered,
    OffCenter,
}

impl FramingStatus {
    pub fn color(self) -> Rgba<u8> {
        match self {
            FramingStatus::Positioned => Rgba([0, 255, 0, 204]),
            FramingStatus::Centered => Rgba([255, 170, 0, 204]),
            FramingStatus::OffCenter => Rgba([255, 0, 0, 204]),
        }
    }
}

/// Everything measured from one frame's landmarks before any sprite is
/// involved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    pub pose: HeadPose,
    pub metrics: FaceMetrics,
    pub framing: FramingStatus,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Geometry {
    tuning: Tuning,
    framing: FramingConfig,
}

impl Geometry {
    pub fn new(tuning: Tuning, framing: FramingConfig) -> Self {
        Self { tuning, framing }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn measure(&self, landmarks: &LandmarkSet, width: f32, height: f32) -> FaceGeometry {
        FaceGeometry {
            pose: self.head_pose(landmarks),
            metrics: self.face_metrics(landmarks, width, height),
            framing: self.framing(landmarks, width, height),
        }
    }

    /// Roll is negative when the right eye corner (263) sits higher than
    /// the left one (33).
    pub fn head_pose(&self, landmarks: &LandmarkSet) -> HeadPose {
        let left = landmarks[LEFT_EYE_OUTER];
        let right = landmarks[RIGHT_EYE_OUTER];
        let nose = landmarks[NOSE_TIP];
        let forehead = landmarks[FOREHEAD];
        let chin = landmarks[CHIN];

        let eye_distance = right.x - left.x;
        let eye_mid_x = (left.x + right.x) / 2.;
        let face_mid_y = (forehead.y + chin.y) / 2.;

        HeadPose {
            yaw: (nose.x - eye_mid_x).atan2(eye_distance).to_degrees() * self.tuning.yaw_gain,
            pitch: (nose.y - face_mid_y).atan2(chin.y - forehead.y).to_degrees()
                * self.tuning.pitch_gain,
            roll: (right.y - left.y).atan2(eye_distance).to_degrees(),
        }
    }

    pub fn face_metrics(&self, landmarks: &LandmarkSet, width: f32, height: f32) -> FaceMetrics {
        let span = |a: usize, b: usize| (landmarks[b].x - landmarks[a].x).abs() * width;
        let canvas = |i: usize| PointF32::new(landmarks[i].x * width, landmarks[i].y * height);

        let forehead = landmarks[FOREHEAD];
        let chin = landmarks[CHIN];
        let eyebrow_y = (landmarks[LEFT_EYEBROW].y + landmarks[RIGHT_EYEBROW].y) / 2.;
        let temple_mid = canvas(LEFT_TEMPLE).midpoint(canvas(RIGHT_TEMPLE));

        let left_eye = canvas(LEFT_EYE_OUTER).mirror_x(width);
        let right_eye = canvas(RIGHT_EYE_OUTER).mirror_x(width);

        FaceMetrics {
            temple_width: span(LEFT_TEMPLE, RIGHT_TEMPLE),
            cheek_width: span(LEFT_CHEEK, RIGHT_CHEEK),
            ear_width: span(LEFT_EAR, RIGHT_EAR),
            face_height: (chin.y - forehead.y).abs() * height,
            eye_distance: span(LEFT_EYE_OUTER, RIGHT_EYE_OUTER),
            forehead_height: (forehead.y - eyebrow_y).abs() * height,
            center_x: temple_mid.mirror_x(width).x,
            top_y: forehead.y * height,
            tilt: (right_eye.y - left_eye.y).atan2(right_eye.x - left_eye.x),
        }
    }

    /// Fits a sprite whose native aspect ratio is `sprite_aspect`
    /// (height / width) over the head described by `metrics`.
    pub fn hair_placement(
        &self,
        landmarks: &LandmarkSet,
        metrics: &FaceMetrics,
        sprite_aspect: f32,
    ) -> HairPlacement {
        let t = &self.tuning;
        let aspect = if sprite_aspect.is_finite() && sprite_aspect > 0. {
            sprite_aspect
        } else {
            1.
        };

        let head_width = metrics
            .temple_width
            .max(metrics.ear_width)
            .max(metrics.cheek_width * t.cheek_factor)
            .max(t.min_head_width);

        let target_width = head_width * t.width_overscan;
        let min_height = metrics.face_height * t.min_height_ratio;
        let (width, height) = if target_width * aspect >= min_height {
            (target_width, target_width * aspect)
        } else {
            (min_height / aspect, min_height)
        };

        let placement = HairPlacement {
            anchor: HairAnchor {
                x: metrics.center_x + t.horizontal_offset * head_width,
                y: metrics.top_y - height * (0.5 - t.vertical_offset),
                z: landmarks[FOREHEAD].z,
            },
            width,
            height,
            rotation: metrics.tilt,
        };
        trace!("Hair placement: {placement:?}");

        placement
    }

    pub fn framing(&self, landmarks: &LandmarkSet, width: f32, height: f32) -> FramingStatus {
        let (min_x, min_y, max_x, max_y) = landmarks.bounds();
        let face = RectF32::from_tl(
            min_x * width,
            min_y * height,
            (max_x - min_x) * width,
            (max_y - min_y) * height,
        );

        let x_offset = (width - face.x - width / 2.).abs() / width;
        let y_offset = (face.y - height / 2.).abs() / height;
        let centered =
            x_offset < self.framing.max_center_offset && y_offset < self.framing.max_center_offset;

        let area_ratio = face.area() / (width * height);
        let sized =
            area_ratio > self.framing.min_area_ratio && area_ratio < self.framing.max_area_ratio;

        match (centered, sized) {
            (true, true) => FramingStatus::Positioned,
            (true, false) => FramingStatus::Centered,
            (false, _) => FramingStatus::OffCenter,
        }
    }
}
