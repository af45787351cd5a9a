use snafu::Snafu;
use std::path::PathBuf;

use crate::errors::GeometryError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NiftiError {
    #[snafu(display("error reading NIfTI file {}: {}", path.display(), source))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(nifti::NiftiError, Box::new)))]
        source: Box<nifti::NiftiError>,
    },

    #[snafu(display("error writing NIfTI file {}: {}", path.display(), source))]
    WriteError {
        path: PathBuf,
        #[snafu(source(from(nifti::NiftiError, Box::new)))]
        source: Box<nifti::NiftiError>,
    },

    #[snafu(display("expected a 3D volume in {}, got shape {:?}", path.display(), shape))]
    UnsupportedShape { path: PathBuf, shape: Vec<usize> },

    #[snafu(display("invalid NIfTI geometry in {}: {}", path.display(), source))]
    HeaderGeometry {
        path: PathBuf,
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },
}
