use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use rand::Rng;
use snafu::ensure;

use crate::errors::transform::InvalidAngleRangeSnafu;
use crate::errors::TransformError;
use crate::transform::Transform;

pub const DEFAULT_ANGLE_RANGE: (f32, f32) = (-30.0, 30.0);

/// Rotation about the image centre, counter-clockwise for positive angles.
/// Pixels sampled from outside the source are filled with zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    /// Angle in degrees.
    pub angle: f32,
    /// Keep the input canvas. Otherwise the canvas grows to the rotated bounding box.
    pub keep_size: bool,
}

impl Rotate {
    pub fn new(angle: f32, keep_size: bool) -> Self {
        Rotate { angle, keep_size }
    }

    /// Rotation by an angle drawn uniformly from `[low, high]`.
    pub fn random<R: Rng + ?Sized>(
        range: (f32, f32),
        keep_size: bool,
        rng: &mut R,
    ) -> Result<Self, TransformError> {
        let (low, high) = range;
        ensure!(
            low.is_finite() && high.is_finite() && low <= high,
            InvalidAngleRangeSnafu { low, high }
        );
        let angle = match low == high {
            true => low,
            false => rng.gen_range(low..=high),
        };
        Ok(Rotate::new(angle, keep_size))
    }

    /// Size of the output canvas for an input of `(width, height)`.
    pub fn output_size(&self, (width, height): (u32, u32)) -> (u32, u32) {
        if self.keep_size {
            return (width, height);
        }
        let theta = self.angle.to_radians();
        let (cos, sin) = (theta.cos().abs(), theta.sin().abs());
        let (width, height) = (width as f32, height as f32);
        (
            (height * sin + width * cos) as u32,
            (height * cos + width * sin) as u32,
        )
    }

    fn projection(&self, (width, height): (u32, u32)) -> Projection {
        let (out_width, out_height) = self.output_size((width, height));
        let (cx, cy) = ((width / 2) as f32, (height / 2) as f32);
        let shift_x = (out_width as f32 - width as f32) / 2.0;
        let shift_y = (out_height as f32 - height as f32) / 2.0;
        // Image rows grow downwards, so a counter-clockwise turn is a negative rotation
        Projection::translate(-cx, -cy)
            .and_then(Projection::rotate(-self.angle.to_radians()))
            .and_then(Projection::translate(cx + shift_x, cy + shift_y))
    }
}

impl Transform<GrayImage> for Rotate {
    fn apply(&self, image: &GrayImage) -> GrayImage {
        let (width, height) = self.output_size(image.dimensions());
        let mut output = GrayImage::new(width, height);
        if width == 0 || height == 0 {
            return output;
        }
        warp_into(
            image,
            &self.projection(image.dimensions()),
            Interpolation::Bilinear,
            Luma([0]),
            &mut output,
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn marker_image() -> GrayImage {
        // 7x7 with a single bright pixel right of centre
        let mut image = GrayImage::new(7, 7);
        image.put_pixel(5, 3, Luma([200]));
        image
    }

    #[test]
    fn test_rotate_counter_clockwise() {
        let rotated = Rotate::new(90.0, true).apply(&marker_image());
        assert_eq!(rotated.dimensions(), (7, 7));
        // The marker moves from the right of the centre to above it
        assert!(rotated.get_pixel(3, 1)[0] > 150);
        assert!(rotated.get_pixel(5, 3)[0] < 50);
    }

    #[test]
    fn test_rotate_zero_fill() {
        let image = GrayImage::from_pixel(8, 8, Luma([100]));
        let rotated = Rotate::new(45.0, true).apply(&image);
        assert_eq!(rotated.get_pixel(0, 0)[0], 0);
        assert!(rotated.get_pixel(4, 4)[0] > 90);
    }

    #[rstest]
    #[case(0.0, (40, 20))]
    #[case(90.0, (20, 40))]
    #[case(45.0, (42, 42))]
    fn test_expanded_size(#[case] angle: f32, #[case] expected: (u32, u32)) {
        let rotate = Rotate::new(angle, false);
        let (width, height) = rotate.output_size((40, 20));
        assert!(width.abs_diff(expected.0) <= 1, "{} {:?}", width, expected);
        assert!(height.abs_diff(expected.1) <= 1, "{} {:?}", height, expected);
        let rotated = rotate.apply(&GrayImage::new(40, 20));
        assert_eq!(rotated.dimensions(), (width, height));
    }

    #[test]
    fn test_random_angle() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let rotate = Rotate::random(DEFAULT_ANGLE_RANGE, true, &mut rng).unwrap();
            assert!((-30.0..=30.0).contains(&rotate.angle));
        }
        assert_eq!(
            Rotate::random((10.0, 10.0), true, &mut rng).unwrap().angle,
            10.0
        );
        assert!(matches!(
            Rotate::random((5.0, -5.0), true, &mut rng),
            Err(TransformError::InvalidAngleRange { .. })
        ));
    }
}
