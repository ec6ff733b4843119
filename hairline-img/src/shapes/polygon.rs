use super::point::PointF32;
use super::rect::RectF32;
use crate::landmarks::LandmarkSet;

#[derive(Debug, Clone)]
pub struct Polygon {
    pub points: Vec<PointF32>,
}

impl Polygon {
    pub fn new(points: Vec<PointF32>) -> Self {
        Self { points }
    }

    /// Picks `idxs` out of the mesh, scaled into a `width`x`height` canvas.
    pub fn from_landmarks(set: &LandmarkSet, idxs: &[usize], width: f32, height: f32) -> Self {
        Self::new(
            idxs.iter()
                .map(|&i| PointF32::new(set[i].x * width, set[i].y * height))
                .collect(),
        )
    }

    pub fn mirror_x(&self, width: f32) -> Self {
        Self::new(self.points.iter().map(|p| p.mirror_x(width)).collect())
    }

    /// Consecutive point pairs, in order. A ring that repeats its first
    /// point at the end comes out closed.
    pub fn segments(&self) -> impl Iterator<Item = (PointF32, PointF32)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn bounds(&self) -> Option<RectF32> {
        let first = self.points.first()?;
        let (min_x, min_y, max_x, max_y) = self.points.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        );

        Some(RectF32::from_tl(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{FACE_OVAL_IDXS, fixtures};

    #[test]
    fn test_face_oval_is_closed() {
        let poly = Polygon::from_landmarks(&fixtures::frontal(), &FACE_OVAL_IDXS, 800., 600.);
        assert_eq!(poly.segments().count(), FACE_OVAL_IDXS.len() - 1);
        assert_eq!(poly.points.first(), poly.points.last());
    }

    #[test]
    fn test_mirror_flips_bounds() {
        let poly = Polygon::new(vec![PointF32::new(100., 50.), PointF32::new(300., 150.)]);
        let bounds = poly.mirror_x(800.).bounds().unwrap();
        assert_eq!(bounds.left(), 500.);
        assert_eq!(bounds.right(), 700.);
        assert_eq!(bounds.area(), 200. * 100.);
    }

    #[test]
    fn test_empty_has_no_bounds() {
        assert!(Polygon::new(vec![]).bounds().is_none());
    }
}
