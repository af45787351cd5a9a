use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::convert::{create_dir, ensure_exists, ensure_inputs, run_batch, BatchSummary};
use crate::errors::convert::{GeometrySnafu, IOSnafu, InvalidNameSnafu, NiftiSnafu, RasterSnafu};
use crate::errors::ConvertError;
use crate::file::{file_name_string, first_number, list_dirs, RasterFileOperations};
use crate::geometry::affine::{DEFAULT_ORIENTATION, DEFAULT_SPACING};
use crate::geometry::default_affine;
use crate::geometry::nifti::affine_from_header;
use crate::io::nifti::{read_header, write_volume};
use crate::io::raster::{ensure_size, read_gray};
use crate::volume::{SliceAxis, Volume};

#[derive(Debug, Clone)]
pub struct PngToNiiOptions {
    /// Explicit output file. `.nii` is appended when it has no NIfTI extension.
    pub output: Option<PathBuf>,
    /// Output folder, used when no explicit file is given.
    pub output_dir: Option<PathBuf>,
    /// NIfTI file whose affine is reused when it exists.
    pub reference: Option<PathBuf>,
    pub axis: SliceAxis,
    /// Voxel spacing along i, j and k when there is no reference.
    pub spacing: [f64; 3],
    /// Row and column direction cosines when there is no reference.
    pub orientation: [f64; 6],
}

impl Default for PngToNiiOptions {
    fn default() -> Self {
        PngToNiiOptions {
            output: None,
            output_dir: None,
            reference: None,
            axis: SliceAxis::default(),
            spacing: DEFAULT_SPACING,
            orientation: DEFAULT_ORIENTATION,
        }
    }
}

/// `nii_png{N}.nii` where N is the first number in the folder name.
pub fn nii_file_name(png_dir: &Path) -> Result<String, ConvertError> {
    let name = file_name_string(png_dir);
    let number = first_number(&name).context(InvalidNameSnafu {
        path: png_dir,
        reason: "folder name contains no number",
    })?;
    Ok(format!("nii_png{}.nii", number))
}

fn output_path(png_dir: &Path, options: &PngToNiiOptions) -> Result<PathBuf, ConvertError> {
    let name = nii_file_name(png_dir)?;
    Ok(match (&options.output, &options.output_dir) {
        (Some(output), _) => {
            let lower = file_name_string(output).to_lowercase();
            match lower.ends_with(".nii") || lower.ends_with(".nii.gz") {
                true => output.clone(),
                false => {
                    let mut output = output.clone().into_os_string();
                    output.push(".nii");
                    PathBuf::from(output)
                }
            }
        }
        (None, Some(dir)) => dir.join(name),
        (None, None) => png_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(name),
    })
}

/// Stack the grayscale PNG slices of a folder into a `f32` NIfTI volume.
///
/// Slices are taken in natural file name order and must all match the size of the first.
pub fn png_to_nii(png_dir: &Path, options: &PngToNiiOptions) -> Result<PathBuf, ConvertError> {
    ensure_exists(png_dir)?;
    let output = output_path(png_dir, options)?;
    let pngs = png_dir.list_pngs().context(IOSnafu { path: png_dir })?;
    ensure_inputs(&pngs, png_dir)?;

    let mut slices = Vec::with_capacity(pngs.len());
    for png in pngs.iter() {
        let slice = read_gray(png).context(RasterSnafu)?;
        if let Some(first) = slices.first() {
            let first: &ndarray::Array2<f32> = first;
            ensure_size(png, slice.dim(), first.dim()).context(RasterSnafu)?;
        }
        slices.push(slice);
    }

    let reference = options.reference.as_deref().filter(|r| {
        let exists = r.is_file();
        if !exists {
            warn!("Reference {} not found, using supplied spacing", r.display());
        }
        exists
    });
    let affine = match reference {
        Some(reference) => {
            let header = read_header(reference).context(NiftiSnafu)?;
            affine_from_header(&header).context(GeometrySnafu { path: reference })?
        }
        None => default_affine(Some(options.spacing), Some(options.orientation))
            .context(GeometrySnafu { path: png_dir })?,
    };

    let volume = Volume::from_slices(&slices, options.axis, affine).map_err(|_| {
        ConvertError::UnsupportedInput {
            path: png_dir.to_path_buf(),
        }
    })?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }
    write_volume(&output, &volume, None).context(NiftiSnafu)?;
    info!(
        "Stacked {} PNG slices from {} into {} with shape {:?}",
        slices.len(),
        png_dir.display(),
        output.display(),
        volume.shape()
    );
    Ok(output)
}

/// Convert every `*_png` folder directly inside `root`. Explicit output files are ignored.
pub fn png_to_nii_batch(
    root: &Path,
    options: &PngToNiiOptions,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    let inputs = list_dirs(root)
        .context(IOSnafu { path: root })?
        .into_iter()
        .filter(|dir| file_name_string(dir).to_lowercase().ends_with("_png"))
        .collect::<Vec<_>>();
    ensure_inputs(&inputs, root)?;
    let options = PngToNiiOptions {
        output: None,
        ..options.clone()
    };
    run_batch(inputs, "Converting PNG to NIfTI", strict, |dir| {
        png_to_nii(dir, &options)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::nii_png::nii_to_png;
    use crate::geometry::Affine;
    use crate::io::nifti::read_volume;
    use crate::io::raster::write_gray;
    use ndarray::Array;
    use rstest::rstest;

    fn write_pngs(dir: &Path, count: usize, dim: (usize, usize)) {
        std::fs::create_dir_all(dir).unwrap();
        for k in 0..count {
            let png = Array::from_shape_fn(dim, |(r, c)| (r * 10 + c + k) as u8);
            write_gray(dir.join(format!("slice{}.png", k + 1)), png.view()).unwrap();
        }
    }

    #[rstest]
    #[case("case12_png", Some("nii_png12.nii"))]
    #[case("3", Some("nii_png3.nii"))]
    #[case("007_png", Some("nii_png007.nii"))]
    #[case("slices_png", None)]
    fn test_nii_file_name(#[case] dir: &str, #[case] expected: Option<&str>) {
        assert_eq!(nii_file_name(Path::new(dir)).ok().as_deref(), expected);
    }

    #[test]
    fn test_png_to_nii_natural_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let png_dir = temp_dir.path().join("4_png");
        // slice10 must follow slice9
        write_pngs(&png_dir, 11, (3, 5));

        let output = png_to_nii(&png_dir, &PngToNiiOptions::default()).unwrap();
        assert_eq!(output, temp_dir.path().join("nii_png4.nii"));
        let volume = read_volume(&output).unwrap().volume;
        assert_eq!(volume.shape(), [5, 3, 11]);
        assert_eq!(volume.data[[0, 0, 10]], 10.0);
        assert_eq!(volume.data[[4, 2, 9]], 33.0);
        assert!(volume.affine.approx_eq(&Affine::identity(), 1e-6));
    }

    #[test]
    fn test_png_to_nii_with_spacing_and_output() {
        let temp_dir = tempfile::tempdir().unwrap();
        let png_dir = temp_dir.path().join("4_png");
        write_pngs(&png_dir, 2, (3, 5));
        let options = PngToNiiOptions {
            output: Some(temp_dir.path().join("out").join("custom")),
            spacing: [0.312, 0.312, 1.5],
            ..Default::default()
        };
        let output = png_to_nii(&png_dir, &options).unwrap();
        assert_eq!(output, temp_dir.path().join("out").join("custom.nii"));
        let spacing = read_volume(&output).unwrap().volume.spacing();
        assert!((spacing[2] - 1.5).abs() < 1e-6);
        assert!((spacing[0] - 0.312).abs() < 1e-6);
    }

    #[test]
    fn test_png_to_nii_size_mismatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let png_dir = temp_dir.path().join("4_png");
        write_pngs(&png_dir, 2, (3, 5));
        let other = Array::<u8, _>::zeros((4, 5));
        write_gray(png_dir.join("slice3.png"), other.view()).unwrap();
        assert!(matches!(
            png_to_nii(&png_dir, &PngToNiiOptions::default()),
            Err(ConvertError::Raster { .. })
        ));
    }

    #[test]
    fn test_nii_png_nii_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nii = temp_dir.path().join("9.nii");
        let affine = Affine::diagonal([0.8, 0.8, 3.0]).unwrap();
        let data = Array::from_shape_fn((6, 4, 5), |(i, j, k)| (i * j + k) as f32);
        crate::io::nifti::write_volume(&nii, &Volume::new(data, affine), None).unwrap();

        let png_dir = nii_to_png(&nii, temp_dir.path(), SliceAxis::Z).unwrap();
        let options = PngToNiiOptions {
            reference: Some(nii.clone()),
            output_dir: Some(temp_dir.path().join("restored")),
            ..Default::default()
        };
        let output = png_to_nii(&png_dir, &options).unwrap();
        assert_eq!(output, temp_dir.path().join("restored").join("nii_png9.nii"));
        let restored = read_volume(&output).unwrap().volume;
        assert_eq!(restored.shape(), [6, 4, 5]);
        assert!(restored.affine.approx_eq(&affine, 1e-5));
    }

    #[test]
    fn test_png_to_nii_batch() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_pngs(&temp_dir.path().join("1_png"), 2, (2, 2));
        write_pngs(&temp_dir.path().join("2_png"), 3, (2, 2));
        std::fs::create_dir(temp_dir.path().join("other")).unwrap();
        let options = PngToNiiOptions {
            output_dir: Some(temp_dir.path().join("nii")),
            ..Default::default()
        };
        let summary = png_to_nii_batch(temp_dir.path(), &options, true).unwrap();
        assert_eq!(summary.converted, 2);
        assert!(temp_dir.path().join("nii").join("nii_png2.nii").is_file());
    }
}
