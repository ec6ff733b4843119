#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct PointF32 {
    pub x: f32,
    pub y: f32,
}

impl PointF32 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Reflects across the vertical center line of a canvas `width` wide.
    pub fn mirror_x(self, width: f32) -> Self {
        Self {
            x: width - self.x,
            y: self.y,
        }
    }

    pub fn midpoint(self, other: PointF32) -> Self {
        Self {
            x: (self.x + other.x) / 2.,
            y: (self.y + other.y) / 2.,
        }
    }
}

impl From<PointF32> for (f32, f32) {
    fn from(p: PointF32) -> Self {
        (p.x, p.y)
    }
}

#[test]
fn test_mirror_x() {
    let p = PointF32::new(240., 10.);
    assert_eq!(p.mirror_x(800.), PointF32::new(560., 10.));
    assert_eq!(PointF32::new(400., 0.).mirror_x(800.).x, 400.);
}
