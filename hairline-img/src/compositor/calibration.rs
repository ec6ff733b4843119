use crate::geometry::FaceGeometry;
use crate::landmarks::{FACE_OVAL_IDXS, LandmarkSet};
use crate::shapes::polygon::Polygon;
use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{self, Blend, Canvas};
use tracing::debug;

const GUIDE_COLOR: Rgba<u8> = Rgba([255, 255, 255, 77]);
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 204]);
const DASH: f32 = 5.;

/// Face outline colored by framing, center guides and the pose readout.
pub(super) fn draw_overlay(
    img: &mut RgbaImage,
    landmarks: &LandmarkSet,
    geometry: &FaceGeometry,
    font: Option<(&FontArc, PxScale)>,
) {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let mut canvas = Blend(std::mem::take(img));

    let oval = Polygon::from_landmarks(landmarks, &FACE_OVAL_IDXS, w, h).mirror_x(w);
    let color = geometry.framing.color();
    for (a, b) in oval.segments() {
        // two pixels wide
        drawing::draw_line_segment_mut(&mut canvas, a.into(), b.into(), color);
        drawing::draw_line_segment_mut(&mut canvas, (a.x + 1., a.y), (b.x + 1., b.y), color);
    }

    draw_dashed_line(&mut canvas, (w / 2., 0.), (w / 2., h));
    draw_dashed_line(&mut canvas, (0., h / 2.), (w, h / 2.));

    match font {
        Some((font, scale)) => {
            let pose = geometry.pose;
            let lines = [
                format!("Pitch: {:.1}°", pose.pitch),
                format!("Yaw: {:.1}°", pose.yaw),
                format!("Roll: {:.1}°", pose.roll),
            ];
            for (i, line) in lines.iter().enumerate() {
                let y = 8 + i as i32 * (scale.y.round() as i32 + 3);
                drawing::draw_text_mut(&mut canvas, TEXT_COLOR, 10, y, scale, font, line);
            }
        }
        None => debug!("No overlay font configured, skipping pose readout"),
    }

    *img = canvas.0;
}

fn draw_dashed_line<C: Canvas<Pixel = Rgba<u8>>>(canvas: &mut C, start: (f32, f32), end: (f32, f32)) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len <= 0. {
        return;
    }

    let at = |d: f32| (start.0 + dx * d / len, start.1 + dy * d / len);
    let mut d = 0.;
    while d < len {
        drawing::draw_line_segment_mut(canvas, at(d), at((d + DASH).min(len)), GUIDE_COLOR);
        d += 2. * DASH;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::landmarks::fixtures::{frontal, shifted};

    fn overlay(dx: f32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
        let set = shifted(dx);
        let geometry = Geometry::default().measure(&set, 200., 100.);
        draw_overlay(&mut img, &set, &geometry, None);
        img
    }

    #[test]
    fn test_outline_uses_framing_color() {
        let img = overlay(0.);
        // left temple (0.4, 0.32) drawn mirrored
        let px = img.get_pixel(120, 32);
        assert!(px[1] > 150 && px[0] < 50, "expected green, got {px:?}");

        let img = overlay(0.35);
        // mirrored: source x 0.85 lands at 0.15 of the canvas
        let px = img.get_pixel(30, 30);
        assert!(px[0] > 150 && px[1] < 50, "expected red, got {px:?}");
    }

    #[test]
    fn test_guides_are_dashed() {
        let mut img = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
        let set = frontal();
        let geometry = Geometry::default().measure(&set, 200., 100.);
        draw_overlay(&mut img, &set, &geometry, None);

        // Along the horizontal guide, left of the face outline.
        let row: Vec<_> = (0..20).map(|x| img.get_pixel(x, 50)[0] > 0).collect();
        assert!(row.iter().any(|lit| *lit));
        assert!(row.iter().any(|lit| !*lit));
    }
}
