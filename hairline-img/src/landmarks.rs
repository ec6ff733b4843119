use serde::{Deserialize, Serialize};
use std::ops::Index;
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 468;

pub const NOSE_TIP: usize = 1;
pub const FOREHEAD: usize = 10;
pub const CHIN: usize = 152;
pub const LEFT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_OUTER: usize = 263;
pub const LEFT_TEMPLE: usize = 54;
pub const RIGHT_TEMPLE: usize = 284;
pub const LEFT_CHEEK: usize = 234;
pub const RIGHT_CHEEK: usize = 454;
pub const LEFT_EAR: usize = 127;
pub const RIGHT_EAR: usize = 356;
pub const LEFT_EYEBROW: usize = 70;
pub const RIGHT_EYEBROW: usize = 300;
pub const LEFT_JAW: usize = 172;
pub const RIGHT_JAW: usize = 397;

/// Closed ring around the face silhouette, starting and ending at the forehead.
pub const FACE_OVAL_IDXS: [usize; 37] = [
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109, 10,
];

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("expected {LANDMARK_COUNT} landmarks, got {0}")]
    WrongCount(usize),
    #[error("landmark {0} has a non-finite coordinate")]
    NonFinite(usize),
}

/// A single mesh point. `x` and `y` are normalized to the source frame,
/// `z` is depth relative to the face center.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Landmark> for [f32; 3] {
    fn from(l: Landmark) -> Self {
        [l.x, l.y, l.z]
    }
}

/// The full 468 point face mesh for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::WrongCount(points.len()));
        }

        if let Some(idx) = points
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(LandmarkError::NonFinite(idx));
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Normalized (min_x, min_y, max_x, max_y) over every point.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }
}

impl Index<usize> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, idx: usize) -> &Landmark {
        &self.points[idx]
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = LandmarkError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<LandmarkSet> for Vec<Landmark> {
    fn from(set: LandmarkSet) -> Self {
        set.points
    }
}

/// Synthetic meshes for unit tests. Only the named points are placed,
/// everything else sits at the frame center.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn with_points(overrides: &[(usize, f32, f32)]) -> LandmarkSet {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.); LANDMARK_COUNT];
        for &(idx, x, y) in overrides {
            points[idx] = Landmark::new(x, y, 0.);
        }
        LandmarkSet::new(points).unwrap()
    }

    /// A level, frontal face centered in the frame.
    pub fn frontal() -> LandmarkSet {
        shifted(0.)
    }

    /// `frontal` moved horizontally by `dx` in normalized units.
    pub fn shifted(dx: f32) -> LandmarkSet {
        let named = [
            (NOSE_TIP, 0.5, 0.5),
            (FOREHEAD, 0.5, 0.3),
            (CHIN, 0.5, 0.7),
            (LEFT_EYE_OUTER, 0.42, 0.42),
            (RIGHT_EYE_OUTER, 0.58, 0.42),
            (LEFT_TEMPLE, 0.4, 0.32),
            (RIGHT_TEMPLE, 0.6, 0.32),
            (LEFT_CHEEK, 0.37, 0.5),
            (RIGHT_CHEEK, 0.63, 0.5),
            (LEFT_EAR, 0.36, 0.45),
            (RIGHT_EAR, 0.64, 0.45),
            (LEFT_EYEBROW, 0.41, 0.38),
            (RIGHT_EYEBROW, 0.59, 0.38),
            (LEFT_JAW, 0.4, 0.62),
            (RIGHT_JAW, 0.6, 0.62),
        ];

        let mut points = vec![Landmark::new(0.5 + dx, 0.5, 0.); LANDMARK_COUNT];
        for (idx, x, y) in named {
            points[idx] = Landmark::new(x + dx, y, 0.);
        }
        LandmarkSet::new(points).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_count() {
        let points = vec![Landmark::default(); 10];
        assert_eq!(LandmarkSet::new(points), Err(LandmarkError::WrongCount(10)));
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut points = vec![Landmark::default(); LANDMARK_COUNT];
        points[7].y = f32::NAN;
        assert_eq!(LandmarkSet::new(points), Err(LandmarkError::NonFinite(7)));
    }

    #[test]
    fn test_deserializes_triples() {
        let json = serde_json::to_string(&vec![[0.25f32, 0.5, -0.1]; LANDMARK_COUNT]).unwrap();
        let set: LandmarkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set[CHIN], Landmark::new(0.25, 0.5, -0.1));

        let short = serde_json::to_string(&vec![[0.5f32, 0.5, 0.]; 3]).unwrap();
        assert!(serde_json::from_str::<LandmarkSet>(&short).is_err());
    }

    #[test]
    fn test_bounds() {
        let set = fixtures::frontal();
        let (min_x, min_y, max_x, max_y) = set.bounds();
        assert_eq!((min_x, min_y), (0.36, 0.3));
        assert_eq!((max_x, max_y), (0.64, 0.7));
    }
}
