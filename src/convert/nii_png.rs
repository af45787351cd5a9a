use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::convert::{create_dir, ensure_exists, ensure_inputs, run_batch, BatchSummary};
use crate::errors::convert::{IOSnafu, NiftiSnafu, RasterSnafu, UnsupportedInputSnafu};
use crate::errors::ConvertError;
use crate::file::NiftiFileOperations;
use crate::io::nifti::read_volume;
use crate::io::raster::{normalize_to_u8, write_gray};
use crate::volume::SliceAxis;

pub fn png_file_name(index: usize) -> String {
    format!("png_nii{:03}.png", index + 1)
}

/// Write every slice of a NIfTI volume along `axis` to `{out_root}/{stem}_png/png_niiNNN.png`.
///
/// Each slice is min-max normalised to 8 bits on its own.
pub fn nii_to_png(nii: &Path, out_root: &Path, axis: SliceAxis) -> Result<PathBuf, ConvertError> {
    ensure_exists(nii)?;
    ensure!(nii.has_nifti_extension(), UnsupportedInputSnafu { path: nii });

    let out_dir = out_root.join(format!("{}_png", nii.nifti_stem()));
    create_dir(&out_dir)?;

    let volume = read_volume(nii).context(NiftiSnafu)?.volume;
    let count = volume.num_slices(axis);
    for (index, slice) in volume.slices(axis).enumerate() {
        let png = normalize_to_u8(slice);
        write_gray(out_dir.join(png_file_name(index)), png.view()).context(RasterSnafu)?;
    }
    info!(
        "Wrote {} slices along {} from {} to {}",
        count,
        axis,
        nii.display(),
        out_dir.display()
    );
    Ok(out_dir)
}

/// Convert every `.nii` / `.nii.gz` file directly inside `dir`.
pub fn nii_to_png_batch(
    dir: &Path,
    out_root: &Path,
    axis: SliceAxis,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    let inputs = dir.list_niftis().context(IOSnafu { path: dir })?;
    ensure_inputs(&inputs, dir)?;
    run_batch(inputs, "Converting NIfTI to PNG", strict, |nii| {
        nii_to_png(nii, out_root, axis)
    })
}
