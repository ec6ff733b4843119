use crate::catalog::HairstyleOption;
use crate::geometry::HairPlacement;
use image::{Rgba, RgbaImage, imageops};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use std::borrow::Cow;
use tracing::{Level, span, trace};

/// Warps `sprite` onto `img` centered on the placement anchor and
/// alpha-blends it over what is already there.
pub(super) fn draw_sprite(
    img: &mut RgbaImage,
    sprite: &RgbaImage,
    style: &HairstyleOption,
    placement: &HairPlacement,
) -> bool {
    let span = span!(Level::DEBUG, "draw_sprite");
    let _guard = span.enter();

    let HairPlacement {
        anchor,
        width,
        height,
        rotation,
    } = *placement;
    if !(width > 0. && height > 0. && anchor.x.is_finite() && anchor.y.is_finite())
        || !rotation.is_finite()
    {
        trace!("Skipping sprite for unusable placement {placement:?}");
        return false;
    }

    let oriented = orient(sprite, style);
    let (sw, sh) = (oriented.width() as f32, oriented.height() as f32);
    let projection = Projection::translate(anchor.x, anchor.y)
        * Projection::rotate(rotation)
        * Projection::scale(width / sw, height / sh)
        * Projection::translate(-sw / 2., -sh / 2.);

    let mut layer = RgbaImage::new(img.width(), img.height());
    warp_into(
        &*oriented,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut layer,
    );
    imageops::overlay(img, &layer, 0, 0);

    true
}

/// Applies the per-asset flips, about the sprite's own center.
fn orient<'a>(sprite: &'a RgbaImage, style: &HairstyleOption) -> Cow<'a, RgbaImage> {
    match (style.flip_horizontal, style.flip_vertical) {
        (false, false) => Cow::Borrowed(sprite),
        (true, false) => Cow::Owned(imageops::flip_horizontal(sprite)),
        (false, true) => Cow::Owned(imageops::flip_vertical(sprite)),
        (true, true) => Cow::Owned(imageops::rotate180(sprite)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, Gender};
    use crate::geometry::HairAnchor;
    use std::f32::consts::PI;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const GRAY: Rgba<u8> = Rgba([40, 40, 40, 255]);

    fn style(flip_horizontal: bool, flip_vertical: bool) -> HairstyleOption {
        HairstyleOption {
            id: 1,
            name: "test".into(),
            category: Category::Short,
            hair_type: "straight".into(),
            gender: Gender::Unisex,
            sprite: "test.png".into(),
            flip_horizontal,
            flip_vertical,
        }
    }

    fn is_red(px: &Rgba<u8>) -> bool {
        px[0] > 200 && px[2] < 50
    }

    fn is_blue(px: &Rgba<u8>) -> bool {
        px[2] > 200 && px[0] < 50
    }

    /// Red over blue, 10 wide and 20 tall.
    fn two_tone() -> RgbaImage {
        RgbaImage::from_fn(10, 20, |_, y| if y < 10 { RED } else { BLUE })
    }

    fn placement(rotation: f32) -> HairPlacement {
        HairPlacement {
            anchor: HairAnchor {
                x: 50.,
                y: 50.,
                z: 0.,
            },
            width: 20.,
            height: 40.,
            rotation,
        }
    }

    #[test]
    fn test_sprite_centered_on_anchor() {
        let mut img = RgbaImage::from_pixel(100, 100, GRAY);
        assert!(draw_sprite(&mut img, &two_tone(), &style(false, false), &placement(0.)));

        assert!(is_red(img.get_pixel(50, 38)));
        assert!(is_blue(img.get_pixel(50, 62)));
        assert_eq!(*img.get_pixel(50, 20), GRAY);
        assert_eq!(*img.get_pixel(70, 50), GRAY);
    }

    #[test]
    fn test_flip_vertical_undoes_half_turn() {
        let mut img = RgbaImage::from_pixel(100, 100, GRAY);
        draw_sprite(&mut img, &two_tone(), &style(false, true), &placement(PI));

        assert!(is_red(img.get_pixel(50, 38)));
        assert!(is_blue(img.get_pixel(50, 62)));
    }

    #[test]
    fn test_transparent_pixels_keep_background() {
        let sprite = RgbaImage::from_pixel(10, 20, Rgba([255, 0, 0, 0]));
        let mut img = RgbaImage::from_pixel(100, 100, GRAY);
        draw_sprite(&mut img, &sprite, &style(false, false), &placement(0.));
        assert_eq!(*img.get_pixel(50, 50), GRAY);
    }

    #[test]
    fn test_unusable_placement_is_skipped() {
        let mut img = RgbaImage::from_pixel(100, 100, GRAY);
        let mut bad = placement(0.);
        bad.width = 0.;
        assert!(!draw_sprite(&mut img, &two_tone(), &style(false, false), &bad));
        assert!(img.pixels().all(|p| *p == GRAY));
    }

    #[test]
    fn test_orient_both_is_half_turn() {
        let sprite = RgbaImage::from_fn(2, 2, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let oriented = orient(&sprite, &style(true, true));
        assert_eq!(*oriented.get_pixel(0, 0), Rgba([1, 1, 0, 255]));
        assert!(matches!(orient(&sprite, &style(false, false)), Cow::Borrowed(_)));
    }
}
