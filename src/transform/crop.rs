use image::{imageops, GrayImage};
use rand::Rng;
use snafu::ensure;

use crate::errors::transform::{EmptyImageSnafu, InvalidCropRatioSnafu};
use crate::errors::TransformError;
use crate::transform::Transform;

pub const DEFAULT_CROP_RATIO: f32 = 0.8;
/// A crop never keeps less than this fraction of a side.
pub const MIN_CROP_RATIO: f32 = 0.5;

/// A rectangular region of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Side length kept by a crop. Truncates, then clamps to `[side * MIN_CROP_RATIO, side]`.
fn crop_side(side: u32, ratio: f32) -> u32 {
    let minimum = (side as f32 * MIN_CROP_RATIO) as u32;
    ((side as f32 * ratio) as u32).max(minimum).clamp(1, side)
}

impl Crop {
    /// Crop of `ratio` times each side of an image of `(width, height)`, centred.
    pub fn centered(dimensions: (u32, u32), ratio: f32) -> Result<Self, TransformError> {
        let (width, height) = validated_sizes(dimensions, ratio)?;
        Ok(Crop {
            left: (dimensions.0 - width) / 2,
            top: (dimensions.1 - height) / 2,
            width,
            height,
        })
    }

    /// Crop of `ratio` times each side of an image of `(width, height)`, at a uniformly
    /// random position that keeps the crop inside the image.
    pub fn random<R: Rng + ?Sized>(
        dimensions: (u32, u32),
        ratio: f32,
        rng: &mut R,
    ) -> Result<Self, TransformError> {
        let (width, height) = validated_sizes(dimensions, ratio)?;
        Ok(Crop {
            left: rng.gen_range(0..=dimensions.0 - width),
            top: rng.gen_range(0..=dimensions.1 - height),
            width,
            height,
        })
    }

    pub fn xyxy(&self) -> (u32, u32, u32, u32) {
        (
            self.left,
            self.top,
            self.left + self.width,
            self.top + self.height,
        )
    }
}

fn validated_sizes(dimensions: (u32, u32), ratio: f32) -> Result<(u32, u32), TransformError> {
    ensure!(
        ratio.is_finite() && ratio > 0.0 && ratio <= 1.0,
        InvalidCropRatioSnafu { ratio }
    );
    ensure!(dimensions.0 > 0 && dimensions.1 > 0, EmptyImageSnafu);
    Ok((crop_side(dimensions.0, ratio), crop_side(dimensions.1, ratio)))
}

impl Transform<GrayImage> for Crop {
    fn apply(&self, image: &GrayImage) -> GrayImage {
        imageops::crop_imm(image, self.left, self.top, self.width, self.height).to_image()
    }
}

/// Resize to a fixed size with bilinear filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    /// Resize back to the size of `image`.
    pub fn to_match(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Resize { width, height }
    }
}

impl Transform<GrayImage> for Resize {
    fn apply(&self, image: &GrayImage) -> GrayImage {
        if image.dimensions() == (self.width, self.height) {
            return image.clone();
        }
        imageops::resize(image, self.width, self.height, imageops::FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    #[rstest]
    #[case((100, 50), 0.8, (80, 40))]
    #[case((100, 50), 0.2, (50, 25))]
    #[case((3, 3), 1.0, (3, 3))]
    #[case((1, 1), 0.5, (1, 1))]
    fn test_crop_sizes(
        #[case] dimensions: (u32, u32),
        #[case] ratio: f32,
        #[case] expected: (u32, u32),
    ) {
        let crop = Crop::centered(dimensions, ratio).unwrap();
        assert_eq!((crop.width, crop.height), expected);
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.5)]
    #[case(f32::NAN)]
    fn test_invalid_ratio(#[case] ratio: f32) {
        assert!(matches!(
            Crop::centered((10, 10), ratio),
            Err(TransformError::InvalidCropRatio { .. })
        ));
    }

    #[test]
    fn test_centered_crop() {
        let crop = Crop::centered((10, 7), 0.8).unwrap();
        assert_eq!(crop.xyxy(), (1, 1, 9, 6));

        let image = GrayImage::from_fn(10, 7, |x, y| Luma([(x + 10 * y) as u8]));
        let cropped = crop.apply(&image);
        assert_eq!(cropped.dimensions(), (8, 5));
        assert_eq!(cropped.get_pixel(0, 0), &Luma([11]));
    }

    #[test]
    fn test_random_crop_stays_inside() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let crop = Crop::random((20, 11), 0.6, &mut rng).unwrap();
            let (_, _, right, bottom) = crop.xyxy();
            assert_eq!((crop.width, crop.height), (12, 6));
            assert!(right <= 20 && bottom <= 11);
        }
    }

    #[test]
    fn test_resize() {
        let image = GrayImage::from_pixel(4, 6, Luma([90]));
        let resized = Resize { width: 8, height: 3 }.apply(&image);
        assert_eq!(resized.dimensions(), (8, 3));
        assert_eq!(resized.get_pixel(3, 1), &Luma([90]));
    }
}
