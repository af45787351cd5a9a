use ndarray::{stack, ArrayD, Axis};
use rust_search::SearchBuilder;
use snafu::{ensure, ResultExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::convert::{create_dir, ensure_exists, ensure_inputs, run_batch, to_i16, BatchSummary};
use crate::errors::convert::{
    DicomSnafu, IOSnafu, NiftiSnafu, NpzSnafu, RasterSnafu, UnsupportedInputSnafu,
};
use crate::errors::dicom::ReadSnafu as DicomReadSnafu;
use crate::errors::ConvertError;
use crate::file::{
    file_name_string, list_dirs, DicomFileOperations, NiftiFileOperations, RasterFileOperations,
};
use crate::io::dicom::{decode_frames, read_series, SeriesOrder};
use crate::io::nifti::read_volume;
use crate::io::npz::{write_data_archive, write_volume_archive};
use crate::io::raster::read_gray;
use crate::volume::Volume;

pub const NPZ_EXTENSION: &str = "npz";

/// Extensions picked up when walking a directory for [`file_to_npz_batch`].
pub const ARCHIVABLE_SUFFIXES: [&str; 5] = [".nii", ".nii.gz", ".dcm", ".png", ".jpg"];

/// Write a NIfTI volume as a float volume archive `{out_root}/{stem}.npz`.
pub fn nii_to_npz(nii: &Path, out_root: &Path) -> Result<PathBuf, ConvertError> {
    ensure_exists(nii)?;
    ensure!(nii.has_nifti_extension(), UnsupportedInputSnafu { path: nii });
    let volume = read_volume(nii).context(NiftiSnafu)?.volume;

    create_dir(out_root)?;
    let output = out_root.join(format!("{}.{}", nii.nifti_stem(), NPZ_EXTENSION));
    write_volume_archive(&output, &volume, "nii", &file_name_string(nii)).context(NpzSnafu)?;
    info!(
        "Archived {} with shape {:?} to {}",
        nii.display(),
        volume.shape(),
        output.display()
    );
    Ok(output)
}

/// Stack a DICOM series folder into a signed 16 bit volume archive `{out_root}/{folder}.npz`.
///
/// Slices are ordered by Instance Number and the affine is reconstructed from the series.
pub fn dcm_to_npz(dcm_dir: &Path, out_root: &Path) -> Result<PathBuf, ConvertError> {
    ensure_exists(dcm_dir)?;
    let series = read_series(dcm_dir, SeriesOrder::InstanceNumber).context(DicomSnafu)?;
    let volume = Volume::new(to_i16(&series.volume.data), series.volume.affine);

    create_dir(out_root)?;
    let name = file_name_string(dcm_dir);
    let output = out_root.join(format!("{}.{}", name, NPZ_EXTENSION));
    write_volume_archive(&output, &volume, "dcm", &name).context(NpzSnafu)?;
    info!(
        "Archived {} DICOM slices from {} to {}",
        series.paths.len(),
        dcm_dir.display(),
        output.display()
    );
    Ok(output)
}

/// Archive every NIfTI file directly inside `dir` into `out_root`.
pub fn nii_to_npz_batch(
    dir: &Path,
    out_root: &Path,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    ensure_exists(dir)?;
    let inputs = dir.list_niftis().context(IOSnafu { path: dir })?;
    ensure_inputs(&inputs, dir)?;
    run_batch(inputs, "Converting NIfTI to NPZ", strict, |nii| {
        nii_to_npz(nii, out_root)
    })
}

/// Archive every sub-folder of `root` that holds DICOM files into `out_root`.
pub fn dcm_to_npz_batch(
    root: &Path,
    out_root: &Path,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    ensure_exists(root)?;
    let inputs = list_dirs(root)
        .context(IOSnafu { path: root })?
        .into_iter()
        .filter(|dir| dir.list_dicoms().is_ok_and(|files| !files.is_empty()))
        .collect::<Vec<_>>();
    ensure_inputs(&inputs, root)?;
    run_batch(inputs, "Converting DICOM to NPZ", strict, |dir| {
        dcm_to_npz(dir, out_root)
    })
}

/// Pixel array of one DICOM file: `[row, column]` for a single frame, with a leading
/// frame axis for multi-frame objects and a trailing sample axis for color.
fn dicom_array(path: &Path) -> Result<ArrayD<f32>, ConvertError> {
    let file = path
        .dcmread()
        .context(DicomReadSnafu { path })
        .context(DicomSnafu)?;
    let frames = decode_frames(&file).context(DicomSnafu)?;
    let samples = frames.samples_per_pixel();
    let views = frames.frames.iter().map(|f| f.view()).collect::<Vec<_>>();
    let mut data = match views.as_slice() {
        [single] => single.to_owned().into_dyn(),
        _ => stack(Axis(0), &views)
            .map_err(|e| crate::errors::DicomError::Other {
                message: e.to_string(),
            })
            .context(DicomSnafu)?
            .into_dyn(),
    };
    if samples == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    Ok(data)
}

/// Read the array stored for one file: the `[i, j, k]` volume of a NIfTI file, the
/// pixels of a DICOM file or a raster image as gray `[row, column]`.
pub fn read_array(path: &Path) -> Result<ArrayD<f32>, ConvertError> {
    if path.has_nifti_extension() {
        Ok(read_volume(path).context(NiftiSnafu)?.volume.data.into_dyn())
    } else if path.has_dicom_extension() {
        dicom_array(path)
    } else if path.has_raster_extension() {
        Ok(read_gray(path).context(RasterSnafu)?.into_dyn())
    } else {
        UnsupportedInputSnafu { path }.fail()
    }
}

/// Archive path next to the source, `{dir}/{stem}.npz`.
pub fn default_npz_path(path: &Path) -> PathBuf {
    let stem = match path.has_nifti_extension() {
        true => path.nifti_stem(),
        false => path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
    };
    path.with_file_name(format!("{}.{}", stem, NPZ_EXTENSION))
}

/// Explicit outputs get the `.npz` extension appended when it is missing.
fn with_npz_extension(output: &Path) -> PathBuf {
    let has_extension = output
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(NPZ_EXTENSION));
    match has_extension {
        true => output.to_path_buf(),
        false => {
            let mut name = OsString::from(output.as_os_str());
            name.push(".");
            name.push(NPZ_EXTENSION);
            PathBuf::from(name)
        }
    }
}

/// Write the array of a single NIfTI, DICOM or raster file to a `data` archive.
pub fn file_to_npz(path: &Path, output: Option<&Path>) -> Result<PathBuf, ConvertError> {
    ensure_exists(path)?;
    let output = match output {
        Some(output) => with_npz_extension(output),
        None => default_npz_path(path),
    };
    let data = read_array(path)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent)?;
    }
    write_data_archive(&output, &data).context(NpzSnafu)?;
    info!(
        "Archived {} with shape {:?} to {}",
        path.display(),
        data.shape(),
        output.display()
    );
    Ok(output)
}

fn is_archivable(path: &Path) -> bool {
    let name = file_name_string(path).to_lowercase();
    path.is_file() && ARCHIVABLE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Find every supported file below `dir`, recursively, and archive each next to its source.
pub fn file_to_npz_batch(dir: &Path, strict: bool) -> Result<BatchSummary, ConvertError> {
    ensure_exists(dir)?;
    let mut inputs = SearchBuilder::default()
        .location(dir)
        .build()
        .map(PathBuf::from)
        .filter(|path| is_archivable(path))
        .collect::<Vec<_>>();
    inputs.sort();
    ensure_inputs(&inputs, dir)?;
    info!("Found {} files to archive in {}", inputs.len(), dir.display());
    run_batch(inputs, "Converting to NPZ", strict, |path| {
        file_to_npz(path, None)
    })
}
