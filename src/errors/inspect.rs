use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::Snafu;
use std::path::PathBuf;

use crate::errors::{DicomError, NiftiError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InspectError {
    #[snafu(display("input does not exist: {}", path.display()))]
    MissingInput { path: PathBuf },

    #[snafu(display("expected a NIfTI file or a DICOM folder, got {}", path.display()))]
    UnsupportedInput { path: PathBuf },

    #[snafu(display("No NIfTI files found in source path: {}", path.display()))]
    NoSources { path: PathBuf },

    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("Invalid output extension for {}, supported extensions: {}", path.display(), supported.join(", ")))]
    InvalidOutputExtension {
        path: PathBuf,
        supported: Vec<&'static str>,
    },

    #[snafu(display("Error listing {}", path.display()))]
    ListDirectory {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Error creating manifest: {:?}", source))]
    CreateManifest {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Error writing CSV: {:?}", source))]
    Csv {
        #[snafu(source(from(csv::Error, Box::new)))]
        source: Box<csv::Error>,
    },

    #[snafu(display("Arrow error: {:?}", source))]
    Arrow {
        #[snafu(source(from(ArrowError, Box::new)))]
        source: Box<ArrowError>,
    },

    #[snafu(display("Parquet error: {:?}", source))]
    Parquet {
        #[snafu(source(from(ParquetError, Box::new)))]
        source: Box<ParquetError>,
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
}
