/*
Heights live in the low 16 bits of each RGBA8 heightmap pixel, little endian.
*/

use bevy::math::{Rect, URect, UVec2, Vec2};
use image::RgbaImage;

pub type HeightMapU16 = Vec<u16>;

pub trait HeightMap {
    fn load_from_image(image: &RgbaImage) -> Self;
}

impl HeightMap for HeightMapU16 {
    fn load_from_image(image: &RgbaImage) -> Self {
        image
            .pixels()
            .map(|pixel| u16::from_le_bytes([pixel[0], pixel[1]]))
            .collect()
    }
}

pub fn pack_height(height: u16) -> [u8; 4] {
    let [low, high] = height.to_le_bytes();
    [low, high, 0, 255]
}

/// Pixel rect of a texture of `size` covering the normalized `rect`.
///
/// The origin is floored and the extent ceiled, then the extent is clipped
/// to the texture. `None` when nothing is left.
pub fn pixel_region(rect: Rect, size: UVec2) -> Option<URect> {
    let size_f = size.as_vec2();
    let origin = (rect.min.clamp(Vec2::ZERO, Vec2::ONE) * size_f)
        .floor()
        .as_uvec2()
        .min(size);
    let extent = (rect.size() * size_f).ceil().as_uvec2();
    let extent = extent.min(size - origin);

    if extent.x == 0 || extent.y == 0 {
        return None;
    }

    Some(URect::from_corners(origin, origin + extent))
}

/// Turns a rect in landscape UV space into heightmap storage space.
pub fn flip_to_storage(rect: Rect) -> Rect {
    let y = (1.0 - rect.min.y - rect.height()).clamp(0.0, 1.0);
    Rect::new(rect.min.x, y, rect.max.x, y + rect.height())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_come_from_the_low_two_bytes() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgba(pack_height(0x1234)));
        image.put_pixel(1, 0, image::Rgba([0xff, 0xff, 0x7f, 0x00]));

        assert_eq!(HeightMapU16::load_from_image(&image), vec![0x1234, 0xffff]);
    }

    #[test]
    fn region_rounds_outwards() {
        let region =
            pixel_region(Rect::new(0.125, 0.25, 0.375, 0.5), UVec2::new(100, 100)).unwrap();
        assert_eq!(region.min, UVec2::new(12, 25));
        assert_eq!(region.width(), 25);
        assert_eq!(region.height(), 25);
    }

    #[test]
    fn region_is_clipped_to_the_texture() {
        let region = pixel_region(Rect::new(0.9, 0.0, 1.0, 1.0), UVec2::new(64, 32)).unwrap();
        assert_eq!(region.max, UVec2::new(64, 32));

        assert!(pixel_region(Rect::new(1.0, 0.2, 1.0, 0.4), UVec2::new(64, 64)).is_none());
    }

    #[test]
    fn storage_flip_mirrors_the_rect_vertically() {
        let flipped = flip_to_storage(Rect::new(0.2, 0.1, 0.4, 0.3));
        assert!((flipped.min.y - 0.7).abs() < 1e-6);
        assert!((flipped.height() - 0.2).abs() < 1e-6);
        assert_eq!(flipped.min.x, 0.2);
    }
}
