use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::convert::{create_dir, ensure_exists, ensure_inputs, run_batch, to_i16, BatchSummary};
use crate::errors::convert::{DicomSnafu, GeometrySnafu, IOSnafu, InvalidNameSnafu, NiftiSnafu};
use crate::errors::ConvertError;
use crate::file::{file_name_string, list_dirs};
use crate::geometry::nifti::affine_from_header;
use crate::io::dicom::{read_series, SeriesOrder};
use crate::io::nifti::{read_header, write_volume};
use crate::volume::Volume;

pub const DCM_FOLDER_SUFFIX: &str = "_dcm";

/// Series id of a `{id}_dcm` folder.
pub fn series_id(dcm_dir: &Path) -> Result<String, ConvertError> {
    let name = file_name_string(dcm_dir);
    name.strip_suffix(DCM_FOLDER_SUFFIX)
        .map(str::to_string)
        .context(InvalidNameSnafu {
            path: dcm_dir,
            reason: "folder name must end with _dcm",
        })
}

/// Stack a `{id}_dcm` series folder into `{out_root}/nii_dcm{id}.nii` as signed 16 bit voxels.
///
/// Slices are ordered by Instance Number. The affine is taken from `reference` when
/// given, otherwise it is reconstructed from the slice positions and orientation.
pub fn dcm_to_nii(
    dcm_dir: &Path,
    reference: Option<&Path>,
    out_root: &Path,
) -> Result<PathBuf, ConvertError> {
    ensure_exists(dcm_dir)?;
    let id = series_id(dcm_dir)?;
    let output = out_root.join(format!("nii_dcm{}.nii", id));

    let series = read_series(dcm_dir, SeriesOrder::InstanceNumber).context(DicomSnafu)?;
    let (affine, header) = match reference {
        Some(reference) => {
            ensure_exists(reference)?;
            let header = read_header(reference).context(NiftiSnafu)?;
            let affine =
                affine_from_header(&header).context(GeometrySnafu { path: reference })?;
            (affine, Some(header))
        }
        None => (series.volume.affine, None),
    };
    let volume = Volume::new(to_i16(&series.volume.data), affine);

    create_dir(out_root)?;
    write_volume(&output, &volume, header.as_ref()).context(NiftiSnafu)?;
    info!(
        "Stacked {} DICOM slices from {} into {} with shape {:?}",
        series.paths.len(),
        dcm_dir.display(),
        output.display(),
        volume.shape()
    );
    Ok(output)
}

/// Convert every `*_dcm` folder directly inside `root`.
///
/// With a `reference_root`, each series uses `{reference_root}/{id}.nii` and series
/// without one are skipped with a warning.
pub fn dcm_to_nii_batch(
    root: &Path,
    reference_root: Option<&Path>,
    out_root: &Path,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    let inputs = list_dirs(root)
        .context(IOSnafu { path: root })?
        .into_iter()
        .filter(|dir| file_name_string(dir).ends_with(DCM_FOLDER_SUFFIX))
        .filter_map(|dir| {
            let reference = match reference_root {
                None => None,
                Some(reference_root) => {
                    let id = series_id(&dir).ok()?;
                    let reference = reference_root.join(format!("{}.nii", id));
                    if !reference.is_file() {
                        warn!("Missing reference NIfTI {}", reference.display());
                        return None;
                    }
                    Some(reference)
                }
            };
            Some((dir, reference))
        })
        .collect::<Vec<_>>();
    ensure_inputs(&inputs, root)?;

    let dirs = inputs.iter().map(|(dir, _)| dir.clone()).collect::<Vec<_>>();
    run_batch(dirs, "Converting DICOM to NIfTI", strict, |dir| {
        let reference = inputs
            .iter()
            .find(|(d, _)| d == dir)
            .and_then(|(_, r)| r.as_deref());
        dcm_to_nii(dir, reference, out_root)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::nii_dcm::nii_to_dcm;
    use crate::geometry::Affine;
    use crate::io::nifti::read_volume;
    use ndarray::Array;
    use rstest::rstest;

    fn oblique_affine() -> Affine {
        let angle: f64 = 0.2;
        Affine::from_spacing_orientation(
            [0.75, 0.6, 2.5],
            [angle.cos(), angle.sin(), 0.0, -angle.sin(), angle.cos(), 0.0],
            [-90.5, 110.25, -40.0],
        )
        .unwrap()
    }

    fn write_nii(path: &Path, affine: Affine) -> Array<f32, ndarray::Ix3> {
        let data = Array::from_shape_fn((6, 5, 4), |(i, j, k)| (i * 7 + j * 3) as f32 - k as f32 * 50.0);
        write_volume(path, &Volume::new(data.clone(), affine), None).unwrap();
        data
    }

    #[rstest]
    #[case("12_dcm", Some("12"))]
    #[case("case_a_dcm", Some("case_a"))]
    #[case("12_png", None)]
    fn test_series_id(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(series_id(Path::new(name)).ok().as_deref(), expected);
    }

    #[test]
    fn test_nii_dcm_nii_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nii = temp_dir.path().join("12.nii");
        let affine = oblique_affine();
        let data = write_nii(&nii, affine);

        let dcm_dir = nii_to_dcm(&nii, temp_dir.path()).unwrap();
        let output = dcm_to_nii(&dcm_dir, None, &temp_dir.path().join("out")).unwrap();
        assert_eq!(output, temp_dir.path().join("out").join("nii_dcm12.nii"));

        let restored = read_volume(&output).unwrap().volume;
        assert_eq!(restored.shape(), [6, 5, 4]);
        assert_eq!(restored.data, data);
        assert!(restored.affine.approx_eq(&affine, 1e-4), "{}", restored.affine);
    }

    #[test]
    fn test_dcm_to_nii_with_reference() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nii = temp_dir.path().join("5.nii");
        write_nii(&nii, Affine::diagonal([1.0, 1.0, 1.0]).unwrap());
        let dcm_dir = nii_to_dcm(&nii, temp_dir.path()).unwrap();

        let reference = temp_dir.path().join("reference.nii");
        write_nii(&reference, oblique_affine());
        let output = dcm_to_nii(&dcm_dir, Some(&reference), temp_dir.path()).unwrap();
        let restored = read_volume(&output).unwrap().volume;
        assert!(restored.affine.approx_eq(&oblique_affine(), 1e-4));
    }

    #[test]
    fn test_dcm_to_nii_requires_suffix() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("series");
        std::fs::create_dir(&dir).unwrap();
        assert!(matches!(
            dcm_to_nii(&dir, None, temp_dir.path()),
            Err(ConvertError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_dcm_to_nii_batch_skips_missing_reference() {
        let temp_dir = tempfile::tempdir().unwrap();
        let references = temp_dir.path().join("references");
        let series = temp_dir.path().join("series");
        std::fs::create_dir_all(&references).unwrap();
        std::fs::create_dir_all(&series).unwrap();
        for id in ["1", "2"] {
            let nii = references.join(format!("{}.nii", id));
            write_nii(&nii, oblique_affine());
            nii_to_dcm(&nii, &series).unwrap();
        }
        std::fs::remove_file(references.join("2.nii")).unwrap();

        let out = temp_dir.path().join("out");
        let summary = dcm_to_nii_batch(&series, Some(&references), &out, true).unwrap();
        assert_eq!(summary.found, 1);
        assert!(out.join("nii_dcm1.nii").is_file());
        assert!(!out.join("nii_dcm2.nii").exists());

        let summary = dcm_to_nii_batch(&series, None, &out, true).unwrap();
        assert_eq!(summary.converted, 2);
    }
}
