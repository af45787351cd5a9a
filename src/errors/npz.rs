use ndarray_npy::{ReadNpzError, WriteNpzError};
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NpzError {
    #[snafu(display("IO error on NPZ file {}", path.display()))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("error writing array '{}' to {}: {}", name, path.display(), source))]
    WriteError {
        path: PathBuf,
        name: &'static str,
        #[snafu(source(from(WriteNpzError, Box::new)))]
        source: Box<WriteNpzError>,
    },

    #[snafu(display("error reading array '{}' from {}: {}", name, path.display(), source))]
    ReadError {
        path: PathBuf,
        name: String,
        #[snafu(source(from(ReadNpzError, Box::new)))]
        source: Box<ReadNpzError>,
    },

    #[snafu(display("array '{}' in {} is not valid UTF-8", name, path.display()))]
    InvalidString { path: PathBuf, name: &'static str },

    #[snafu(display("affine stored in {} is invalid: {}", path.display(), source))]
    InvalidAffine {
        path: PathBuf,
        #[snafu(source(from(crate::errors::GeometryError, Box::new)))]
        source: Box<crate::errors::GeometryError>,
    },
}
