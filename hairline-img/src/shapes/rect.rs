#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RectF32 {
    // centerpoint
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RectF32 {
    pub fn from_tl(x: f32, y: f32, w: f32, h: f32) -> RectF32 {
        RectF32 {
            x: x + w / 2.,
            y: y + h / 2.,
            w,
            h,
        }
    }

    /// The centered region of a `source_w`x`source_h` frame that fills a
    /// container with "cover" semantics: the container's aspect ratio is
    /// kept and the overflowing axis is cropped equally on both sides.
    pub fn cover(source_w: f32, source_h: f32, container_w: f32, container_h: f32) -> RectF32 {
        let source_aspect = source_w / source_h;
        let container_aspect = container_w / container_h;

        if container_aspect > source_aspect {
            let h = source_w / container_aspect;
            RectF32::from_tl(0., (source_h - h) / 2., source_w, h)
        } else {
            let w = source_h * container_aspect;
            RectF32::from_tl((source_w - w) / 2., 0., w, source_h)
        }
    }

    pub fn left(&self) -> f32 {
        self.x - self.w / 2.
    }
    pub fn right(&self) -> f32 {
        self.x + self.w / 2.
    }
    pub fn top(&self) -> f32 {
        self.y - self.h / 2.
    }
    pub fn bottom(&self) -> f32 {
        self.y + self.h / 2.
    }
    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Rounds to whole pixels, clamped to a `max_w`x`max_h` image.
    pub fn to_pixels(&self, max_w: u32, max_h: u32) -> image::math::Rect {
        let left = (self.left().round().max(0.) as u32).min(max_w);
        let top = (self.top().round().max(0.) as u32).min(max_h);
        let right = (self.right().round().max(0.) as u32).clamp(left, max_w);
        let bottom = (self.bottom().round().max(0.) as u32).clamp(top, max_h);

        image::math::Rect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}
