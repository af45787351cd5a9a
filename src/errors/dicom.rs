use dicom::core::value::ConvertValueError;
use dicom::object::{ReadError, WithMetaError, WriteError};
pub use snafu::{Snafu, Whatever};
use std::path::PathBuf;

use crate::errors::GeometryError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DicomError {
    #[snafu(display("error reading DICOM file {}: {:?}", path.display(), source))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(ReadError, Box::new)))]
        source: Box<ReadError>,
    },

    #[snafu(display("error writing DICOM file {}: {:?}", path.display(), source))]
    WriteError {
        path: PathBuf,
        #[snafu(source(from(WriteError, Box::new)))]
        source: Box<WriteError>,
    },

    #[snafu(display("unable to build DICOM file meta group: {:?}", source))]
    FileMetaError {
        #[snafu(source(from(WithMetaError, Box::new)))]
        source: Box<WithMetaError>,
    },

    #[snafu(display("IO error on {}", path.display()))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("missing DICOM property: {}", name))]
    MissingPropertyError { name: &'static str },

    #[snafu(display("unable to convert DICOM property value '{}': {:?}", name, source))]
    ConvertValueError {
        name: &'static str,
        #[snafu(source(from(ConvertValueError, Box::new)))]
        source: Box<ConvertValueError>,
    },

    #[snafu(display("invalid DICOM property value '{}': {}", name, value))]
    InvalidValueError { name: &'static str, value: String },

    #[snafu(display("error processing DICOM pixel data: {:?}", source))]
    PixelDataError {
        #[snafu(source(from(dicom::pixeldata::Error, Box::new)))]
        source: Box<dicom::pixeldata::Error>,
    },

    #[snafu(display(
        "unsupported pixel layout: SamplesPerPixel={}, Rows={}, Columns={}",
        samples_per_pixel,
        rows,
        columns
    ))]
    UnsupportedPixelLayout {
        samples_per_pixel: u16,
        rows: u32,
        columns: u32,
    },

    #[snafu(display(
        "slice {} has size {}x{}, expected {}x{}",
        path.display(),
        columns,
        rows,
        expected_columns,
        expected_rows
    ))]
    SliceSizeMismatch {
        path: PathBuf,
        rows: u32,
        columns: u32,
        expected_rows: u32,
        expected_columns: u32,
    },

    #[snafu(display("no DICOM files found in {}", path.display()))]
    EmptySeries { path: PathBuf },

    #[snafu(display("invalid series geometry: {}", source))]
    SeriesGeometry {
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },

    #[snafu(display("{}", message))]
    Other { message: String },
}

impl From<Whatever> for DicomError {
    fn from(source: Whatever) -> Self {
        Self::Other {
            message: source.to_string(),
        }
    }
}
