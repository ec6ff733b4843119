//! Exponential smoothing of per-frame face geometry, applied between the
//! geometry and compositing stages to damp landmark jitter.

use crate::geometry::{FaceGeometry, FaceMetrics, HeadPose};
use std::f32::consts::{PI, TAU};

#[derive(Debug, Clone)]
pub struct Smoother {
    alpha: f32,
    last: Option<FaceGeometry>,
}

impl Smoother {
    /// `alpha` is the weight of the newest frame, clamped to (0, 1].
    /// 1.0 passes every frame through untouched.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(f32::EPSILON, 1.)
        } else {
            1.
        };
        Self { alpha, last: None }
    }

    pub fn apply(&mut self, raw: FaceGeometry) -> FaceGeometry {
        let smoothed = match self.last {
            Some(prev) if self.alpha < 1. => blend(&prev, &raw, self.alpha),
            _ => raw,
        };
        self.last = Some(smoothed);
        smoothed
    }

    /// Forgets history, so the next face snaps into place.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn blend(prev: &FaceGeometry, raw: &FaceGeometry, t: f32) -> FaceGeometry {
    let (p, r) = (&prev.metrics, &raw.metrics);
    FaceGeometry {
        pose: HeadPose {
            pitch: lerp(prev.pose.pitch, raw.pose.pitch, t),
            yaw: lerp(prev.pose.yaw, raw.pose.yaw, t),
            roll: lerp_angle(prev.pose.roll.to_radians(), raw.pose.roll.to_radians(), t)
                .to_degrees(),
        },
        metrics: FaceMetrics {
            temple_width: lerp(p.temple_width, r.temple_width, t),
            cheek_width: lerp(p.cheek_width, r.cheek_width, t),
            ear_width: lerp(p.ear_width, r.ear_width, t),
            face_height: lerp(p.face_height, r.face_height, t),
            eye_distance: lerp(p.eye_distance, r.eye_distance, t),
            forehead_height: lerp(p.forehead_height, r.forehead_height, t),
            center_x: lerp(p.center_x, r.center_x, t),
            top_y: lerp(p.top_y, r.top_y, t),
            tilt: lerp_angle(p.tilt, r.tilt, t),
        },
        framing: raw.framing,
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolates along the shorter arc and wraps the result into (-PI, PI].
fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    let mut delta = (b - a).rem_euclid(TAU);
    if delta > PI {
        delta -= TAU;
    }

    let mut out = (a + delta * t).rem_euclid(TAU);
    if out > PI {
        out -= TAU;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{FramingStatus, Geometry};
    use crate::landmarks::fixtures::shifted;

    fn measured(dx: f32) -> FaceGeometry {
        Geometry::default().measure(&shifted(dx), 800., 600.)
    }

    #[test]
    fn test_alpha_one_is_passthrough() {
        let mut smoother = Smoother::new(1.);
        for dx in [0., 0.1, -0.13, 0.02] {
            let raw = measured(dx);
            assert_eq!(smoother.apply(raw), raw);
        }
    }

    #[test]
    fn test_first_frame_is_not_blended() {
        let mut smoother = Smoother::new(0.2);
        let raw = measured(0.1);
        assert_eq!(smoother.apply(raw), raw);
    }

    #[test]
    fn test_converges_toward_steady_input() {
        let mut smoother = Smoother::new(0.5);
        smoother.apply(measured(0.));

        let target = measured(0.1);
        let first = smoother.apply(target);
        assert!(first.metrics.center_x > target.metrics.center_x);

        let mut last = first;
        for _ in 0..30 {
            last = smoother.apply(target);
        }
        assert!((last.metrics.center_x - target.metrics.center_x).abs() < 0.01);
        assert_eq!(last.framing, target.framing);
    }

    #[test]
    fn test_reset_snaps_to_next_face() {
        let mut smoother = Smoother::new(0.3);
        smoother.apply(measured(0.));
        smoother.reset();
        let raw = measured(0.15);
        assert_eq!(smoother.apply(raw), raw);
    }

    #[test]
    fn test_tilt_blends_across_half_turn() {
        let just_under = PI - 0.02;
        let just_over = -PI + 0.02;
        let mid = lerp_angle(just_under, just_over, 0.5);
        assert!((mid.abs() - PI).abs() < 1e-4);

        let quarter = lerp_angle(just_under, just_over, 0.25);
        assert!((quarter - (PI - 0.01)).abs() < 1e-4);
    }

    #[test]
    fn test_framing_follows_raw_frame() {
        let mut smoother = Smoother::new(0.1);
        smoother.apply(measured(0.));
        let off = measured(0.35);
        assert_eq!(off.framing, FramingStatus::OffCenter);
        assert_eq!(smoother.apply(off).framing, FramingStatus::OffCenter);
    }
}
