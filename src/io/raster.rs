use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use snafu::{ensure, OptionExt, ResultExt};
use std::path::Path;

use crate::errors::raster::{InvalidBufferSnafu, ReadSnafu, SizeMismatchSnafu, WriteSnafu};
use crate::errors::RasterError;
use crate::io::dicom::LUMA_WEIGHTS;
use crate::volume::min_max;

/// A decoded raster image, either single channel or RGB (alpha dropped).
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    /// `[row, column]`
    Gray(Array2<u8>),
    /// `[row, column, channel]`
    Rgb(Array3<u8>),
}

impl Raster {
    /// `(rows, columns)`
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Raster::Gray(a) => a.dim(),
            Raster::Rgb(a) => (a.len_of(Axis(0)), a.len_of(Axis(1))),
        }
    }

    pub fn to_gray(&self) -> Array2<f32> {
        match self {
            Raster::Gray(a) => a.mapv(f32::from),
            Raster::Rgb(a) => rgb_to_gray(a.view()),
        }
    }
}

/// Linearly map the range of a slice to `0..=255`. A constant slice maps to 0.
pub fn normalize_to_u8(slice: ArrayView2<f32>) -> Array2<u8> {
    match min_max(slice.iter().copied().filter(|v| v.is_finite())) {
        Some((lo, hi)) if hi > lo => slice.mapv(|v| {
            let scaled = (v - lo) / (hi - lo) * 255.0;
            if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            }
        }),
        _ => Array2::zeros(slice.dim()),
    }
}

/// Weighted sum of the RGB channels using BT.601 luma weights.
pub fn rgb_to_gray(rgb: ArrayView3<u8>) -> Array2<f32> {
    rgb.map_axis(Axis(2), |px| {
        px.iter()
            .zip(LUMA_WEIGHTS.iter())
            .map(|(v, w)| f32::from(*v) * w)
            .sum::<f32>()
    })
}

pub fn gray_to_array(image: &GrayImage) -> Array2<u8> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        image.get_pixel(c as u32, r as u32).0[0]
    })
}

pub fn array_to_gray(array: ArrayView2<u8>) -> Result<GrayImage, RasterError> {
    let (rows, columns) = array.dim();
    let (width, height) = (columns as u32, rows as u32);
    let buffer = array.iter().copied().collect::<Vec<_>>();
    let len = buffer.len();
    GrayImage::from_raw(width, height, buffer).context(InvalidBufferSnafu {
        len,
        width,
        height,
    })
}

fn rgb_to_array(image: &RgbImage) -> Array3<u8> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(r, c, s)| {
        image.get_pixel(c as u32, r as u32).0[s]
    })
}

/// Read a PNG or JPEG image, keeping colour when present.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<Raster, RasterError> {
    let path = path.as_ref();
    let image = image::open(path).context(ReadSnafu { path })?;
    Ok(match image.color().has_color() {
        true => Raster::Rgb(rgb_to_array(&image.to_rgb8())),
        false => Raster::Gray(gray_to_array(&image.to_luma8())),
    })
}

/// Read an image as a single channel `[row, column]` array.
pub fn read_gray<P: AsRef<Path>>(path: P) -> Result<Array2<f32>, RasterError> {
    read_raster(path).map(|raster| raster.to_gray())
}

/// Write an 8 bit single channel image. The format follows the file extension.
pub fn write_gray<P: AsRef<Path>>(path: P, array: ArrayView2<u8>) -> Result<(), RasterError> {
    let path = path.as_ref();
    let image = array_to_gray(array)?;
    DynamicImage::ImageLuma8(image)
        .save(path)
        .context(WriteSnafu { path })
}

/// Ensure an image matches the size of the first slice of a stack.
pub fn ensure_size<P: AsRef<Path>>(
    path: P,
    dim: (usize, usize),
    expected: (usize, usize),
) -> Result<(), RasterError> {
    ensure!(
        dim == expected,
        SizeMismatchSnafu {
            path: path.as_ref(),
            width: dim.1 as u32,
            height: dim.0 as u32,
            expected_width: expected.1 as u32,
            expected_height: expected.0 as u32,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};
    use rstest::rstest;

    #[rstest]
    #[case(array![[0.0, 5.0], [10.0, 2.5]], array![[0, 127], [255, 63]])]
    #[case(array![[3.0, 3.0], [3.0, 3.0]], array![[0, 0], [0, 0]])]
    #[case(array![[-100.0, 100.0]], array![[0, 255]])]
    fn test_normalize_to_u8(#[case] input: Array2<f32>, #[case] expected: Array2<u8>) {
        assert_eq!(normalize_to_u8(input.view()), expected);
    }

    #[test]
    fn test_rgb_to_gray() {
        let rgb = Array::from_shape_vec((1, 2, 3), vec![0, 255, 0, 100, 100, 100]).unwrap();
        let gray = rgb_to_gray(rgb.view());
        assert!((gray[[0, 0]] - 149.685).abs() < 1e-3);
        assert!((gray[[0, 1]] - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_write_read_gray() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("slice.png");
        let array = Array::from_shape_fn((3, 5), |(r, c)| (r * 50 + c) as u8);
        write_gray(&path, array.view()).unwrap();

        match read_raster(&path).unwrap() {
            Raster::Gray(actual) => assert_eq!(actual, array),
            other => panic!("expected a gray image, got {:?}", other),
        }
        assert_eq!(read_gray(&path).unwrap()[[2, 4]], 104.0);
    }

    #[test]
    fn test_read_rgb() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("color.png");
        let mut image = RgbImage::new(4, 2);
        image.put_pixel(3, 1, image::Rgb([10, 20, 30]));
        image.save(&path).unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.dim(), (2, 4));
        match raster {
            Raster::Rgb(actual) => assert_eq!(actual[[1, 3, 2]], 30),
            other => panic!("expected an RGB image, got {:?}", other),
        }
    }

    #[test]
    fn test_read_missing() {
        assert!(matches!(
            read_gray("does/not/exist.png"),
            Err(RasterError::ReadError { .. })
        ));
    }
}
