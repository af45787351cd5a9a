use ndarray::Array2;
use snafu::{Report, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::convert::dcm_nii::DCM_FOLDER_SUFFIX;
use crate::convert::{
    create_dir, ensure_exists, ensure_inputs, output_root, run_batch, BatchSummary,
};
use crate::errors::convert::{DicomSnafu, IOSnafu, RasterSnafu};
use crate::errors::dicom::ReadSnafu as DicomReadSnafu;
use crate::errors::ConvertError;
use crate::file::{file_name_string, list_dirs, replace_suffix, DicomFileOperations};
use crate::io::dicom::decode_frames;
use crate::io::raster::{normalize_to_u8, write_gray};

pub fn png_file_name(index: usize) -> String {
    format!("png_dcm{:03}.png", index + 1)
}

/// Output folder name for a series folder, `case_dcm` becoming `case_png`.
pub fn png_folder_name(dcm_dir: &Path) -> String {
    replace_suffix(&file_name_string(dcm_dir), DCM_FOLDER_SUFFIX, "_png")
}

/// 8 bit frames are kept as they are, wider data is min-max normalised per frame.
fn frame_to_u8(frame: &Array2<f32>, bits_allocated: u16) -> Array2<u8> {
    match bits_allocated {
        0..=8 => frame.mapv(|v| v.round().clamp(0.0, 255.0) as u8),
        _ => normalize_to_u8(frame.view()),
    }
}

/// Write the frames of one DICOM file starting at number `next`. Returns how many were written.
fn write_frames(dcm: &Path, out_dir: &Path, next: usize) -> Result<usize, ConvertError> {
    let file = dcm
        .dcmread()
        .context(DicomReadSnafu { path: dcm })
        .context(DicomSnafu)?;
    let frames = decode_frames(&file).context(DicomSnafu)?;
    let bits_allocated = frames.bits_allocated;
    let gray = frames.gray_frames();
    for (offset, frame) in gray.iter().enumerate() {
        let png = frame_to_u8(frame, bits_allocated);
        write_gray(out_dir.join(png_file_name(next + offset)), png.view()).context(RasterSnafu)?;
    }
    Ok(gray.len())
}

/// Write every frame of every DICOM file in a folder to `{out_root}/{name}_png/png_dcmNNN.png`.
///
/// Numbering runs across the whole folder in file name order. Files that cannot be
/// read or decoded are logged and skipped.
pub fn dcm_to_png(dcm_dir: &Path, out_root: &Path) -> Result<PathBuf, ConvertError> {
    ensure_exists(dcm_dir)?;
    let files = dcm_dir.list_dicoms().context(IOSnafu { path: dcm_dir })?;
    ensure_inputs(&files, dcm_dir)?;

    let out_dir = out_root.join(png_folder_name(dcm_dir));
    create_dir(&out_dir)?;

    let mut written = 0;
    let mut failed = 0;
    for dcm in files.iter() {
        match write_frames(dcm, &out_dir, written) {
            Ok(count) => written += count,
            Err(e) => {
                failed += 1;
                error!(
                    "Error processing file {}: {}",
                    dcm.display(),
                    Report::from_error(&e)
                );
            }
        }
    }
    info!(
        "Processed {} DICOM files ({} failed), wrote {} PNG slices to {}",
        files.len(),
        failed,
        written,
        out_dir.display()
    );
    Ok(out_dir)
}

/// Convert every `*_dcm` folder directly inside `root`. Without an output root the
/// PNG folders are written next to the series folders.
pub fn dcm_to_png_batch(
    root: &Path,
    out_root: Option<&Path>,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    let inputs = list_dirs(root)
        .context(IOSnafu { path: root })?
        .into_iter()
        .filter(|dir| {
            file_name_string(dir)
                .to_lowercase()
                .ends_with(DCM_FOLDER_SUFFIX)
        })
        .collect::<Vec<_>>();
    ensure_inputs(&inputs, root)?;
    run_batch(inputs, "Converting DICOM to PNG", strict, |dir| {
        dcm_to_png(dir, &output_root(dir, out_root))
    })
}
