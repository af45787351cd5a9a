//! One conversion per direction between NIfTI, DICOM series, raster slices and NPZ archives.
//!
//! Single conversions return the path they wrote. Batch conversions run over the
//! inputs of a folder in parallel, logging and skipping failures unless `strict`
//! is set, in which case the first failure is returned.
pub mod dcm_nii;
pub mod dcm_png;
pub mod nii_dcm;
pub mod nii_png;
pub mod npz;
pub mod png_dcm;
pub mod png_nii;

pub use dcm_nii::{dcm_to_nii, dcm_to_nii_batch};
pub use dcm_png::{dcm_to_png, dcm_to_png_batch};
pub use nii_dcm::{nii_to_dcm, nii_to_dcm_batch};
pub use nii_png::{nii_to_png, nii_to_png_batch};
pub use npz::{
    dcm_to_npz, dcm_to_npz_batch, file_to_npz, file_to_npz_batch, nii_to_npz, nii_to_npz_batch,
};
pub use png_dcm::{png_to_dcm, png_to_dcm_batch, PngToDcmOptions};
pub use png_nii::{png_to_nii, png_to_nii_batch, PngToNiiOptions};

use indicatif::ProgressFinish;
use ndarray::Array3;
use rayon::prelude::*;
use snafu::{ensure, Report, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::errors::convert::{CreateDirSnafu, MissingInputSnafu, NoInputsSnafu};
use crate::errors::ConvertError;
use crate::file::default_bar;

/// Counts reported by a batch conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub found: usize,
    pub converted: usize,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.found - self.converted
    }
}

/// Run `func` over every input in parallel with a progress bar.
pub fn run_batch<T, F>(
    inputs: Vec<T>,
    message: &'static str,
    strict: bool,
    func: F,
) -> Result<BatchSummary, ConvertError>
where
    T: AsRef<Path> + Send,
    F: Fn(&Path) -> Result<PathBuf, ConvertError> + Sync,
{
    let found = inputs.len();
    let pb = default_bar(found as u64).with_finish(ProgressFinish::AndLeave);
    pb.set_message(message);

    let par_func = |input: T| {
        let input = input.as_ref();
        let result = func(input);
        pb.inc(1);
        match result {
            Ok(output) => {
                info!("Converted {} -> {}", input.display(), output.display());
                Ok(())
            }
            Err(e) => {
                error!(
                    "Error processing file {}: {}",
                    input.display(),
                    Report::from_error(&e)
                );
                Err(e)
            }
        }
    };

    let converted = if strict {
        // In strict mode, abort on first error
        inputs.into_par_iter().try_for_each(par_func)?;
        found
    } else {
        // In non-strict mode, only log errors and continue
        inputs
            .into_par_iter()
            .map(par_func)
            .filter(|r| r.is_ok())
            .count()
    };
    pb.finish();

    let summary = BatchSummary { found, converted };
    info!(
        "Converted {} of {} inputs ({} failed)",
        summary.converted,
        summary.found,
        summary.failed()
    );
    Ok(summary)
}

pub(crate) fn ensure_exists(path: &Path) -> Result<(), ConvertError> {
    ensure!(path.exists(), MissingInputSnafu { path });
    Ok(())
}

pub(crate) fn ensure_inputs<T>(inputs: &[T], dir: &Path) -> Result<(), ConvertError> {
    ensure!(!inputs.is_empty(), NoInputsSnafu { path: dir });
    Ok(())
}

pub(crate) fn create_dir(path: &Path) -> Result<(), ConvertError> {
    std::fs::create_dir_all(path).context(CreateDirSnafu { path })
}

/// Output root for an input: the explicit root when given, else the input's parent.
pub(crate) fn output_root(input: &Path, out_root: Option<&Path>) -> PathBuf {
    match out_root {
        Some(root) => root.to_path_buf(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// Round and saturate to `i16`. Non-finite values become 0.
pub(crate) fn to_i16(data: &Array3<f32>) -> Array3<i16> {
    data.mapv(|v| match v.is_finite() {
        true => v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16,
        false => 0,
    })
}
