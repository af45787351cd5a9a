//! Crop and rotation augmentation of PNG images and of the middle slice of NIfTI volumes.
use image::GrayImage;
use ndarray::{Array3, Axis};
use rand::Rng;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::convert::{create_dir, ensure_exists, ensure_inputs, run_batch, BatchSummary};
use crate::errors::convert::{
    IOSnafu, NiftiSnafu, RasterSnafu, TransformSnafu, UnsupportedInputSnafu,
};
use crate::errors::{ConvertError, TransformError};
use crate::file::{file_name_string, NiftiFileOperations, RasterFileOperations};
use crate::io::nifti::{read_volume, write_volume};
use crate::io::raster::{array_to_gray, gray_to_array, normalize_to_u8, read_raster, write_gray, Raster};
use crate::transform::{Crop, Resize, Rotate, Transform, DEFAULT_ANGLE_RANGE, DEFAULT_CROP_RATIO};
use crate::volume::{SliceAxis, Volume};

pub const AUGMENTED_SUFFIX: &str = "_aug";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentOptions {
    pub crop_ratio: f32,
    /// Crop at a random position instead of the centre.
    pub random_crop: bool,
    /// Fixed rotation in degrees. A random angle from `angle_range` when unset.
    pub angle: Option<f32>,
    pub angle_range: (f32, f32),
    pub keep_size: bool,
    /// Axis of the NIfTI slice that is augmented.
    pub slice_axis: SliceAxis,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        AugmentOptions {
            crop_ratio: DEFAULT_CROP_RATIO,
            random_crop: true,
            angle: None,
            angle_range: DEFAULT_ANGLE_RANGE,
            keep_size: true,
            slice_axis: SliceAxis::Z,
        }
    }
}

/// Crop, then rotate. Each step is resized back to the size of the input.
pub fn augment_image<R: Rng + ?Sized>(
    image: &GrayImage,
    options: &AugmentOptions,
    rng: &mut R,
) -> Result<GrayImage, TransformError> {
    let restore = Resize::to_match(image);
    let crop = match options.random_crop {
        true => Crop::random(image.dimensions(), options.crop_ratio, rng)?,
        false => Crop::centered(image.dimensions(), options.crop_ratio)?,
    };
    let rotate = match options.angle {
        Some(angle) => Rotate::new(angle, options.keep_size),
        None => Rotate::random(options.angle_range, options.keep_size, rng)?,
    };
    let cropped = restore.apply(&crop.apply(image));
    Ok(restore.apply(&rotate.apply(&cropped)))
}

/// Output file name for an augmented input, `{name}_aug{ext}` with `.nii.gz` kept whole.
pub fn augmented_name(path: &Path) -> String {
    let name = file_name_string(path);
    if path.is_compressed_nifti() {
        return format!("{}{}.nii.gz", path.nifti_stem(), AUGMENTED_SUFFIX);
    }
    match path.extension() {
        Some(ext) => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            format!("{}{}.{}", stem, AUGMENTED_SUFFIX, ext.to_string_lossy())
        }
        None => format!("{}{}", name, AUGMENTED_SUFFIX),
    }
}

fn augment_png<R: Rng + ?Sized>(
    input: &Path,
    output: &Path,
    options: &AugmentOptions,
    rng: &mut R,
) -> Result<(u32, u32), ConvertError> {
    let gray = match read_raster(input).context(RasterSnafu)? {
        Raster::Gray(gray) => gray,
        rgb => rgb.to_gray().mapv(|v| v.round().clamp(0.0, 255.0) as u8),
    };
    let image = array_to_gray(gray.view()).context(RasterSnafu)?;
    let augmented = augment_image(&image, options, rng).context(TransformSnafu)?;
    write_gray(output, gray_to_array(&augmented).view()).context(RasterSnafu)?;
    Ok(augmented.dimensions())
}

/// The middle slice is normalised to `0..=255` and augmented. Every other voxel of the
/// output is zero and the input affine is kept.
fn augment_nii<R: Rng + ?Sized>(
    input: &Path,
    output: &Path,
    options: &AugmentOptions,
    rng: &mut R,
) -> Result<(u32, u32), ConvertError> {
    let nifti = read_volume(input).context(NiftiSnafu)?;
    let volume = &nifti.volume;
    let axis = options.slice_axis;
    let middle = volume.middle(axis);

    let slice = normalize_to_u8(volume.slice(axis, middle));
    let image = array_to_gray(slice.view()).context(RasterSnafu)?;
    let augmented = augment_image(&image, options, rng).context(TransformSnafu)?;
    let augmented = gray_to_array(&Resize::to_match(&image).apply(&augmented));

    let mut data = Array3::<f32>::zeros(volume.data.raw_dim());
    data.index_axis_mut(Axis(axis.index()), middle)
        .assign(&augmented.t().mapv(f32::from));
    write_volume(output, &Volume::new(data, volume.affine), Some(&nifti.header))
        .context(NiftiSnafu)?;
    let (rows, columns) = augmented.dim();
    Ok((columns as u32, rows as u32))
}

/// Augment a single NIfTI volume or PNG/JPEG image into `output`.
pub fn augment_file(
    input: &Path,
    output: &Path,
    options: &AugmentOptions,
) -> Result<PathBuf, ConvertError> {
    ensure_exists(input)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }
    let mut rng = rand::thread_rng();
    let (width, height) = if input.has_nifti_extension() {
        augment_nii(input, output, options, &mut rng)?
    } else if input.has_raster_extension() {
        augment_png(input, output, options, &mut rng)?
    } else {
        return UnsupportedInputSnafu { path: input }.fail();
    };
    info!(
        "Augmented {} -> {} ({}x{})",
        input.display(),
        output.display(),
        width,
        height
    );
    Ok(output.to_path_buf())
}

/// Augment every NIfTI file (or every PNG when `nifti` is false) directly inside
/// `input_dir`, writing `{name}_aug{ext}` into `output_dir`.
pub fn augment_batch(
    input_dir: &Path,
    output_dir: &Path,
    nifti: bool,
    options: &AugmentOptions,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    ensure_exists(input_dir)?;
    let inputs = match nifti {
        true => input_dir.list_niftis(),
        false => input_dir.list_pngs(),
    }
    .context(IOSnafu { path: input_dir })?;
    ensure_inputs(&inputs, input_dir)?;
    create_dir(output_dir)?;
    run_batch(inputs, "Augmenting", strict, |input| {
        augment_file(input, &output_dir.join(augmented_name(input)), options)
    })
}
