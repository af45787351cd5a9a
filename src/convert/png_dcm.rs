use dicom::dictionary_std::uids;
use snafu::{Report, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::convert::{
    create_dir, ensure_exists, ensure_inputs, output_root, run_batch, BatchSummary,
};
use crate::errors::convert::{DicomSnafu, IOSnafu, RasterSnafu};
use crate::errors::ConvertError;
use crate::file::{file_name_string, list_dirs, replace_suffix, NaturalSort, RasterFileOperations};
use crate::geometry::affine::DEFAULT_ORIENTATION;
use crate::geometry::SliceGeometry;
use crate::io::dicom::{build_slice, write_slice, SeriesInfo, SlicePixels};
use crate::io::raster::{read_raster, Raster};

pub const PNG_FOLDER_SUFFIX: &str = "_png";
pub const DEFAULT_PIXEL_SPACING: [f64; 2] = [0.312, 0.312];
pub const DEFAULT_MODALITY: &str = "CT";
pub const DEFAULT_UID_ROOT: &str = "1.2.826.0.1.3680043.8.498.";

#[derive(Debug, Clone)]
pub struct PngToDcmOptions {
    pub modality: String,
    /// Row and column spacing in mm. The first value is also used as slice thickness.
    pub pixel_spacing: [f64; 2],
    pub uid_root: String,
}

impl Default for PngToDcmOptions {
    fn default() -> Self {
        PngToDcmOptions {
            modality: DEFAULT_MODALITY.to_string(),
            pixel_spacing: DEFAULT_PIXEL_SPACING,
            uid_root: DEFAULT_UID_ROOT.to_string(),
        }
    }
}

impl PngToDcmOptions {
    fn series_info(&self) -> SeriesInfo {
        SeriesInfo {
            patient_name: "Unknown".to_string(),
            study_description: Some("PNG_to_DCM_Conversion".to_string()),
            series_description: Some(format!("{}_Series", self.modality)),
            body_part_examined: Some("Unknown".to_string()),
            ..SeriesInfo::new(uids::CT_IMAGE_STORAGE, &self.modality, &self.uid_root)
        }
    }

    /// Axial geometry of the slice with the given 1-based number.
    fn slice_geometry(&self, number: usize) -> SliceGeometry {
        let thickness = self.pixel_spacing[0];
        SliceGeometry {
            pixel_spacing: self.pixel_spacing,
            orientation: Some(DEFAULT_ORIENTATION),
            position: Some([0.0, 0.0, (number - 1) as f64 * thickness]),
            slice_thickness: Some(thickness),
            instance_number: number as i32,
        }
    }
}

pub fn dcm_file_name(number: usize) -> String {
    format!("dcm_png{:03}.dcm", number)
}

/// Output folder name for an image folder, `case_png` becoming `case_dcm`.
pub fn dcm_folder_name(png_dir: &Path) -> String {
    replace_suffix(&file_name_string(png_dir), PNG_FOLDER_SUFFIX, "_dcm")
}

fn convert_image(
    image: &Path,
    number: usize,
    out_dir: &Path,
    info: &SeriesInfo,
    options: &PngToDcmOptions,
) -> Result<(), ConvertError> {
    let raster = read_raster(image).context(RasterSnafu)?;
    let geometry = options.slice_geometry(number);
    // Gray values are widened to 16 bits as v * 257
    let wide;
    let pixels = match &raster {
        Raster::Gray(gray) => {
            wide = gray.mapv(|v| u16::from(v) << 8 | u16::from(v));
            SlicePixels::U16(wide.view())
        }
        Raster::Rgb(rgb) => SlicePixels::Rgb8(rgb.view()),
    };
    let file = build_slice(info, &geometry, pixels, Some((1.0, 0.0))).context(DicomSnafu)?;
    write_slice(out_dir.join(dcm_file_name(number)), &file).context(DicomSnafu)
}

/// Convert the PNG and JPEG images of a folder into one series in `{out_root}/{name}_dcm`.
///
/// Images are ordered by the number formed from all digits in their file name and
/// numbered from 1 in that order. Images that cannot be read are logged and skipped,
/// leaving a gap in the numbering.
pub fn png_to_dcm(
    png_dir: &Path,
    out_root: &Path,
    options: &PngToDcmOptions,
) -> Result<PathBuf, ConvertError> {
    ensure_exists(png_dir)?;
    let images = png_dir
        .list_rasters()
        .context(IOSnafu { path: png_dir })?
        .into_iter()
        .sorted_by_digits()
        .collect::<Vec<_>>();
    ensure_inputs(&images, png_dir)?;

    let out_dir = out_root.join(dcm_folder_name(png_dir));
    create_dir(&out_dir)?;

    let info = options.series_info();
    let mut converted = 0;
    for (index, image) in images.iter().enumerate() {
        match convert_image(image, index + 1, &out_dir, &info, options) {
            Ok(()) => converted += 1,
            Err(e) => error!(
                "Error processing file {}: {}",
                image.display(),
                Report::from_error(&e)
            ),
        }
    }
    info!(
        "Converted {} of {} images from {} to {}",
        converted,
        images.len(),
        png_dir.display(),
        out_dir.display()
    );
    Ok(out_dir)
}

/// Convert every `*_png` folder directly inside `root`. Without an output root the
/// series folders are written next to the image folders.
pub fn png_to_dcm_batch(
    root: &Path,
    out_root: Option<&Path>,
    options: &PngToDcmOptions,
    strict: bool,
) -> Result<BatchSummary, ConvertError> {
    let inputs = list_dirs(root)
        .context(IOSnafu { path: root })?
        .into_iter()
        .filter(|dir| {
            file_name_string(dir)
                .to_lowercase()
                .ends_with(PNG_FOLDER_SUFFIX)
        })
        .collect::<Vec<_>>();
    ensure_inputs(&inputs, root)?;
    run_batch(inputs, "Converting PNG to DICOM", strict, |dir| {
        png_to_dcm(dir, &output_root(dir, out_root), options)
    })
}
