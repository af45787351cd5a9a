use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::convert::{ensure_exists, ensure_inputs, run_batch, to_i16, BatchSummary};
use crate::errors::convert::{DicomSnafu, IOSnafu, NiftiSnafu, UnsupportedInputSnafu};
use crate::errors::ConvertError;
use crate::file::NiftiFileOperations;
use crate::io::dicom::{write_series, SeriesInfo};
use crate::io::nifti::read_volume;
use crate::volume::Volume;

pub fn dcm_file_name(index: usize) -> String {
    format!("dcm_nii{:03}.dcm", index + 1)
}

/// Write a NIfTI volume as a Secondary Capture series in `{out_root}/{stem}_dcm`,
/// one signed 16 bit file per k-slice.
pub fn nii_to_dcm(nii: &Path, out_root: &Path) -> Result<PathBuf, ConvertError> {
    ensure_exists(nii)?;
    ensure!(nii.has_nifti_extension(), UnsupportedInputSnafu { path: nii });

    let volume = read_volume(nii).context(NiftiSnafu)?.volume;
    let volume = Volume::new(to_i16(&volume.data), volume.affine);

    let out_dir = out_root.join(format!("{}_dcm", nii.nifti_stem()));
    let info = SeriesInfo::secondary_capture();
    let paths = write_series(&out_dir, &info, &volume, dcm_file_name).context(DicomSnafu)?;
    info!(
        "Wrote {} DICOM slices from {} to {}",
        paths.len(),
        nii.display(),
        out_dir.display()
    );
    Ok(out_dir)
}

/// Convert every NIfTI file directly inside `dir`.
pub fn nii_to_dcm_batch(
    dir: &Path,
    out_root: &Path,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    let inputs = dir.list_niftis().context(IOSnafu { path: dir })?;
    ensure_inputs(&inputs, dir)?;
    run_batch(inputs, "Converting NIfTI to DICOM", strict, |nii| {
        nii_to_dcm(nii, out_root)
    })
}
