//! Face shape and skin tone estimates taken at capture time. The kiosk
//! feeds these into its style recommendations.

use crate::landmarks::*;
use image::RgbaImage;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceShape {
    Oval,
    Oblong,
    Round,
    Heart,
    Diamond,
    Square,
}

impl fmt::Display for FaceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaceShape::Oval => "oval",
            FaceShape::Oblong => "oblong",
            FaceShape::Round => "round",
            FaceShape::Heart => "heart",
            FaceShape::Diamond => "diamond",
            FaceShape::Square => "square",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkinTone {
    pub value: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    #[serde(skip)]
    threshold: f32,
}

const fn tone(value: &'static str, label: &'static str, color: &'static str, threshold: f32) -> SkinTone {
    SkinTone {
        value,
        label,
        color,
        threshold,
    }
}

/// Brightest first. The first tone whose threshold the sample reaches wins.
pub const SKIN_TONES: [SkinTone; 8] = [
    tone("fair", "Fair", "#FDBCB4", 200.),
    tone("light", "Light", "#F1C27D", 180.),
    tone("medium", "Medium", "#E0AC69", 140.),
    tone("olive", "Olive", "#C68642", 120.),
    tone("tan", "Tan", "#8D5524", 100.),
    tone("brown", "Brown", "#654321", 80.),
    tone("dark", "Dark", "#4A3728", 60.),
    tone("deep", "Deep", "#2C1810", 0.),
];

const MEDIUM: usize = 2;
const PATCH: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceAnalysis {
    pub shape: FaceShape,
    pub facial_structure: String,
    pub skin_tone: SkinTone,
    /// Mean cheek brightness, absent when the patch fell outside the frame.
    pub brightness: Option<f32>,
}

pub fn analyze(landmarks: &LandmarkSet, frame: &RgbaImage) -> FaceAnalysis {
    let shape = face_shape(landmarks);
    let elongated = height_to_width(landmarks) > 1.3;
    let brightness = cheek_brightness(landmarks, frame);
    let skin_tone = brightness.map_or(SKIN_TONES[MEDIUM], skin_tone);

    debug!(%shape, ?brightness, tone = skin_tone.value, "analyzed face");

    FaceAnalysis {
        shape,
        facial_structure: format!(
            "{shape} face with {} proportions",
            if elongated { "elongated" } else { "balanced" }
        ),
        skin_tone,
        brightness,
    }
}

fn height_to_width(landmarks: &LandmarkSet) -> f32 {
    let face_height = (landmarks[CHIN].y - landmarks[FOREHEAD].y).abs();
    let cheek_width = (landmarks[LEFT_CHEEK].x - landmarks[RIGHT_CHEEK].x).abs();
    face_height / cheek_width
}

pub fn face_shape(landmarks: &LandmarkSet) -> FaceShape {
    let width = |a: usize, b: usize| (landmarks[a].x - landmarks[b].x).abs();
    let forehead_width = width(LEFT_TEMPLE, RIGHT_TEMPLE);
    let cheek_width = width(LEFT_CHEEK, RIGHT_CHEEK);
    let jaw_width = width(LEFT_JAW, RIGHT_JAW);

    if cheek_width <= f32::EPSILON || jaw_width <= f32::EPSILON {
        return FaceShape::Oval;
    }

    let height_to_width = height_to_width(landmarks);
    let forehead_to_jaw = forehead_width / jaw_width;
    let cheek_to_jaw = cheek_width / jaw_width;

    if height_to_width > 1.5 {
        FaceShape::Oblong
    } else if height_to_width < 1.1 {
        FaceShape::Round
    } else if forehead_to_jaw > 1.2 && cheek_to_jaw > 1.15 {
        FaceShape::Heart
    } else if forehead_to_jaw < 0.95 && cheek_to_jaw > 1.1 {
        FaceShape::Diamond
    } else if (forehead_width - jaw_width).abs() < 0.05 {
        FaceShape::Square
    } else {
        FaceShape::Oval
    }
}

pub fn skin_tone(brightness: f32) -> SkinTone {
    SKIN_TONES
        .iter()
        .find(|t| brightness >= t.threshold)
        .copied()
        .unwrap_or(SKIN_TONES[MEDIUM])
}

/// Mean of (r + g + b) / 3 over a 10x10 patch centered between the cheeks,
/// sampled from the unmirrored source frame.
fn cheek_brightness(landmarks: &LandmarkSet, frame: &RgbaImage) -> Option<f32> {
    let (w, h) = frame.dimensions();
    let cx = ((landmarks[LEFT_CHEEK].x + landmarks[RIGHT_CHEEK].x) / 2. * w as f32).floor();
    let cy = (landmarks[LEFT_CHEEK].y * h as f32).floor();

    let left = cx - (PATCH / 2) as f32;
    let top = cy - (PATCH / 2) as f32;
    if left < 0. || top < 0. || left as u32 + PATCH > w || top as u32 + PATCH > h {
        return None;
    }

    let (left, top) = (left as u32, top as u32);
    let mut sum = 0u32;
    for y in top..top + PATCH {
        for x in left..left + PATCH {
            let [r, g, b, _] = frame.get_pixel(x, y).0;
            sum += r as u32 + g as u32 + b as u32;
        }
    }

    Some(sum as f32 / (3 * PATCH * PATCH) as f32)
}
