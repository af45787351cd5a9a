use snafu::Snafu;
use std::path::PathBuf;

use crate::errors::{DicomError, GeometryError, NiftiError, NpzError, RasterError, TransformError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConvertError {
    #[snafu(display("input does not exist: {}", path.display()))]
    MissingInput { path: PathBuf },

    #[snafu(display("no input files found in {}", path.display()))]
    NoInputs { path: PathBuf },

    #[snafu(display("cannot derive an output name from {}: {}", path.display(), reason))]
    InvalidName { path: PathBuf, reason: &'static str },

    #[snafu(display("unsupported input file {}", path.display()))]
    UnsupportedInput { path: PathBuf },

    #[snafu(display("failed to create directory {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("IO error on {}", path.display()))]
    IO {
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
    Npz {
        #[snafu(source(from(NpzError, Box::new)))]
        source: Box<NpzError>,
    },

    #[snafu(display("{}", source))]
    Transform {
        #[snafu(source(from(TransformError, Box::new)))]
        source: Box<TransformError>,
    },

    #[snafu(display("invalid geometry for {}: {}", path.display(), source))]
    Geometry {
        path: PathBuf,
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },
}
