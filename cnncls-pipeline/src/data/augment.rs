//! Random geometric augmentation for training batches

use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use rand::Rng;
use serde::Serialize;

/// Augmentation ranges, applied independently per image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Augmentation {
    /// Rotation range in degrees
    pub rotation_range: f32,
    pub horizontal_flip: bool,
    /// Horizontal shift as a fraction of width
    pub width_shift_range: f32,
    /// Vertical shift as a fraction of height
    pub height_shift_range: f32,
    /// Shear angle range in degrees
    pub shear_range: f32,
    /// Zoom factor drawn from `[1 - zoom_range, 1 + zoom_range]`
    pub zoom_range: f32,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self {
            rotation_range: 40.0,
            horizontal_flip: true,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
        }
    }
}

impl Augmentation {
    /// Draw one random transform and apply it to `image`
    pub fn apply<R: Rng + ?Sized>(&self, image: &RgbImage, rng: &mut R) -> RgbImage {
        let (w, h) = (image.width() as f32, image.height() as f32);

        let theta = symmetric(rng, self.rotation_range).to_radians();
        let dx = symmetric(rng, self.width_shift_range) * w;
        let dy = symmetric(rng, self.height_shift_range) * h;
        let shear = symmetric(rng, self.shear_range).to_radians();
        let zx = 1.0 + symmetric(rng, self.zoom_range);
        let zy = 1.0 + symmetric(rng, self.zoom_range);

        let (cx, cy) = (w / 2.0, h / 2.0);
        let projection = Projection::translate(cx + dx, cy + dy)
            * Projection::rotate(theta)
            * shear_projection(shear)
            * Projection::scale(zx, zy)
            * Projection::translate(-cx, -cy);

        // Pixels mapped from outside the frame are black
        let warped = warp(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]));

        if self.horizontal_flip && rng.gen_bool(0.5) {
            imageops::flip_horizontal(&warped)
        } else {
            warped
        }
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    if range > 0.0 {
        rng.gen_range(-range..=range)
    } else {
        0.0
    }
}

fn shear_projection(angle: f32) -> Projection {
    Projection::from_matrix([1.0, -angle.sin(), 0.0, 0.0, angle.cos(), 0.0, 0.0, 0.0, 1.0])
        .unwrap_or_else(|| Projection::scale(1.0, 1.0))
}
