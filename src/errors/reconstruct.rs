use snafu::Snafu;
use std::path::PathBuf;

use crate::errors::{DicomError, GeometryError, NiftiError, RasterError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconstructError {
    #[snafu(display("input does not exist: {}", path.display()))]
    MissingInput { path: PathBuf },

    #[snafu(display("expected a NIfTI file or a DICOM folder, got {}", path.display()))]
    UnsupportedInput { path: PathBuf },

    #[snafu(display("invalid threshold range [{}, {}]", lower, upper))]
    InvalidThresholds { lower: f32, upper: f32 },

    #[snafu(display("invalid target spacing {}", spacing))]
    InvalidTargetSpacing { spacing: f64 },

    #[snafu(display("no voxels of {} fall within [{}, {}]", path.display(), lower, upper))]
    EmptyMask {
        path: PathBuf,
        lower: f32,
        upper: f32,
    },

    #[snafu(display("failed to create directory {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("failed to write mesh {}", path.display()))]
    WriteStl {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("{}", source))]
    Nifti {
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },

    #[snafu(display("{}", source))]
    Dicom {
        #[snafu(source(from(DicomError, Box::new)))]
        source: Box<DicomError>,
    },

    #[snafu(display("{}", source))]
    Raster {
        #[snafu(source(from(RasterError, Box::new)))]
        source: Box<RasterError>,
    },

    #[snafu(display("{}", source))]
    Geometry {
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },
}
