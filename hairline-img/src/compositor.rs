//! Builds each displayed frame: the selfie-mirrored camera picture, then
//! either the calibration overlay or the selected hair sprite on top.

use crate::catalog::Catalog;
use crate::config::{Config, ConfigError};
use crate::geometry::{FaceGeometry, FramingStatus, Geometry, HairPlacement, HeadPose};
use crate::landmarks::LandmarkSet;
use crate::session::{Mode, SessionState};
use crate::shapes::rect::RectF32;
use crate::sprites::SpriteCache;
use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::{Level, span, trace};

mod calibration;
mod sprite;

/// The drawing buffer shown to the user, reused across frames.
#[derive(Debug, Default)]
pub struct Surface {
    image: RgbaImage,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resizes to `width`x`height` and clears to transparent.
    pub fn prepare(&mut self, width: u32, height: u32) {
        if self.image.dimensions() == (width, height) {
            for px in self.image.pixels_mut() {
                *px = Rgba([0, 0, 0, 0]);
            }
        } else {
            self.image = RgbaImage::new(width, height);
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// A face found in the frame being drawn, with geometry measured against
/// the surface size.
#[derive(Debug, Clone, Copy)]
pub struct Face<'a> {
    pub landmarks: &'a LandmarkSet,
    pub geometry: &'a FaceGeometry,
}

/// Everything one frame is drawn from.
pub struct Scene<'a> {
    pub frame: &'a RgbaImage,
    pub face: Option<Face<'a>>,
    pub state: SessionState,
    pub catalog: &'a Catalog,
    pub sprites: &'a SpriteCache,
}

/// What ended up on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderReport {
    pub mesh_drawn: bool,
    pub sprite_drawn: bool,
    pub framing: Option<FramingStatus>,
    pub pose: Option<HeadPose>,
    pub placement: Option<HairPlacement>,
}

pub struct Compositor {
    geometry: Geometry,
    font: Option<FontArc>,
    font_scale: PxScale,
}

impl Compositor {
    pub fn new(geometry: Geometry, font: Option<FontArc>, font_size: f32) -> Self {
        Self {
            geometry,
            font,
            font_scale: PxScale::from(font_size),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            Geometry::new(config.tuning, config.framing),
            Some(config.overlay.load_font()?),
            config.overlay.font_size,
        ))
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn render(
        &self,
        surface: &mut Surface,
        width: u32,
        height: u32,
        scene: &Scene,
    ) -> RenderReport {
        let span = span!(Level::DEBUG, "render");
        let _guard = span.enter();

        surface.prepare(width, height);
        draw_mirrored(&mut surface.image, scene.frame);

        let mut report = RenderReport::default();
        let Some(face) = scene.face else {
            trace!("No face this frame");
            return report;
        };
        report.pose = Some(face.geometry.pose);
        report.framing = Some(face.geometry.framing);

        match scene.state.mode {
            Mode::Calibration => {
                let font = self.font.as_ref().map(|f| (f, self.font_scale));
                calibration::draw_overlay(&mut surface.image, face.landmarks, face.geometry, font);
                report.mesh_drawn = true;
            }
            Mode::TryOn => {
                report.placement = self.draw_hair(&mut surface.image, &face, scene);
                report.sprite_drawn = report.placement.is_some();
            }
        }

        report
    }

    fn draw_hair(&self, img: &mut RgbaImage, face: &Face, scene: &Scene) -> Option<HairPlacement> {
        let id = scene.state.selected?;
        let style = scene.catalog.get(id)?;
        let Some(sprite) = scene.sprites.get(id) else {
            trace!("Sprite for style {id} not loaded");
            return None;
        };

        let aspect = sprite.height() as f32 / sprite.width() as f32;
        let placement =
            self.geometry
                .hair_placement(face.landmarks, &face.geometry.metrics, aspect);

        sprite::draw_sprite(img, &sprite, style, &placement).then_some(placement)
    }

    /// The full-resolution capture as the user saw it, mirrored.
    pub fn snapshot(frame: &RgbaImage) -> RgbaImage {
        imageops::flip_horizontal(frame)
    }
}

/// Fills `img` with the cover-cropped frame, flipped left to right.
fn draw_mirrored(img: &mut RgbaImage, frame: &RgbaImage) {
    let (w, h) = img.dimensions();
    let (fw, fh) = frame.dimensions();
    if w == 0 || h == 0 || fw == 0 || fh == 0 {
        return;
    }

    let crop = RectF32::cover(fw as f32, fh as f32, w as f32, h as f32).to_pixels(fw, fh);
    if crop.width == 0 || crop.height == 0 {
        return;
    }

    let view = imageops::crop_imm(frame, crop.x, crop.y, crop.width, crop.height).to_image();
    let mut scaled = if view.dimensions() == (w, h) {
        view
    } else {
        imageops::resize(&view, w, h, FilterType::Triangle)
    };
    imageops::flip_horizontal_in_place(&mut scaled);
    *img = scaled;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::frontal;

    const LEFT: Rgba<u8> = Rgba([200, 0, 0, 255]);
    const RIGHT: Rgba<u8> = Rgba([0, 0, 200, 255]);

    /// Left half red, right half blue.
    fn split_frame(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| if x < w / 2 { LEFT } else { RIGHT })
    }

    struct Fixture {
        catalog: Catalog,
        sprites: SpriteCache,
        compositor: Compositor,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                catalog: Catalog::builtin().unwrap(),
                sprites: SpriteCache::new(),
                compositor: Compositor::new(Geometry::default(), None, 12.),
            }
        }

        fn render(
            &self,
            frame: &RgbaImage,
            landmarks: Option<&LandmarkSet>,
            state: SessionState,
        ) -> (RgbaImage, RenderReport) {
            let geometry = landmarks.map(|l| self.compositor.geometry().measure(l, 160., 120.));
            let face = landmarks.zip(geometry.as_ref()).map(|(landmarks, geometry)| Face {
                landmarks,
                geometry,
            });
            let scene = Scene {
                frame,
                face,
                state,
                catalog: &self.catalog,
                sprites: &self.sprites,
            };
            let mut surface = Surface::new();
            let report = self.compositor.render(&mut surface, 160, 120, &scene);
            (surface.into_image(), report)
        }
    }

    #[test]
    fn test_no_face_draws_mirrored_video_only() {
        let mut fixture = Fixture::new();
        fixture
            .sprites
            .insert(1, RgbaImage::from_pixel(30, 20, Rgba([250, 250, 0, 255])));

        let frame = split_frame(160, 120);
        let (img, report) = fixture.render(&frame, None, SessionState::try_on(1));

        assert_eq!(report, RenderReport::default());
        assert_eq!(img, Compositor::snapshot(&frame));
        assert_eq!(*img.get_pixel(10, 60), RIGHT);
        assert_eq!(*img.get_pixel(150, 60), LEFT);
    }

    #[test]
    fn test_cover_crop_trims_wide_frame() {
        // 320x120 into 160x120 keeps the middle 160 columns.
        let frame = RgbaImage::from_fn(320, 120, |x, _| {
            if x < 80 || x >= 240 {
                Rgba([0, 255, 0, 255])
            } else if x < 160 {
                LEFT
            } else {
                RIGHT
            }
        });
        let (img, _) = Fixture::new().render(&frame, None, SessionState::default());
        assert_eq!(img.dimensions(), (160, 120));
        assert!(img.pixels().all(|p| p[1] == 0));
        assert_eq!(*img.get_pixel(0, 0), RIGHT);
        assert_eq!(*img.get_pixel(159, 0), LEFT);
    }

    #[test]
    fn test_calibration_draws_mesh() {
        let frame = split_frame(160, 120);
        let (_, report) =
            Fixture::new().render(&frame, Some(&frontal()), SessionState::default());
        assert!(report.mesh_drawn);
        assert!(!report.sprite_drawn);
        assert_eq!(report.framing, Some(FramingStatus::Positioned));
        assert!(report.pose.is_some());
    }

    #[test]
    fn test_default_config_draws_pose_readout() {
        let mut fixture = Fixture::new();
        fixture.compositor = Compositor::from_config(&Config::default()).unwrap();

        let dark = RgbaImage::from_pixel(160, 120, Rgba([20, 20, 20, 255]));
        let (img, report) = fixture.render(&dark, Some(&frontal()), SessionState::default());
        assert!(report.mesh_drawn);

        // Readout block starts at (10, 8), clear of the outline and guides.
        let lit = (10..50)
            .flat_map(|x| (8..40).map(move |y| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y)[1] > 100)
            .count();
        assert!(lit > 20, "expected readout text, {lit} lit pixels");

        let bare = Compositor::new(Geometry::default(), None, 12.);
        fixture.compositor = bare;
        let (img, _) = fixture.render(&dark, Some(&frontal()), SessionState::default());
        assert!((10..50).all(|x| (8..40).all(|y| img.get_pixel(x, y)[1] <= 100)));
    }

    #[test]
    fn test_missing_sprite_is_silent() {
        let frame = split_frame(160, 120);
        let fixture = Fixture::new();
        let (img, report) = fixture.render(&frame, Some(&frontal()), SessionState::try_on(3));
        assert!(!report.sprite_drawn);
        assert!(!report.mesh_drawn);
        assert_eq!(img, Compositor::snapshot(&frame));
    }

    #[test]
    fn test_try_on_draws_selected_sprite() {
        let mut fixture = Fixture::new();
        fixture
            .sprites
            .insert(2, RgbaImage::from_pixel(30, 20, Rgba([250, 250, 0, 255])));

        let frame = split_frame(160, 120);
        let (img, report) = fixture.render(&frame, Some(&frontal()), SessionState::try_on(2));
        assert!(report.sprite_drawn);

        let placement = report.placement.unwrap();
        assert!((placement.height / placement.width - 20. / 30.).abs() < 1e-3);
        let (x, y) = (placement.anchor.x as u32, placement.anchor.y as u32);
        let px = img.get_pixel(x, y);
        assert!(px[0] > 200 && px[1] > 200 && px[2] < 50, "expected sprite, got {px:?}");
    }

    #[test]
    fn test_unselected_draws_nothing() {
        let frame = split_frame(160, 120);
        let state = SessionState {
            mode: Mode::TryOn,
            selected: None,
        };
        let (_, report) = Fixture::new().render(&frame, Some(&frontal()), state);
        assert!(!report.sprite_drawn);
        assert!(report.pose.is_some());
    }

    #[test]
    fn test_surface_reuse_clears() {
        let mut surface = Surface::new();
        surface.prepare(4, 4);
        surface.image.put_pixel(1, 1, Rgba([9, 9, 9, 9]));
        surface.prepare(4, 4);
        assert!(surface.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
        surface.prepare(8, 2);
        assert_eq!(surface.image().dimensions(), (8, 2));
    }
}
