//! Readers and writers for the supported containers. Every reader yields a
//! [`Volume`](crate::volume::Volume) or a 2D array in the conventions of
//! [`geometry`](crate::geometry).
pub mod dicom;
pub mod nifti;
pub mod npz;
pub mod raster;

pub use self::dicom::{read_series, DicomSeries, SeriesInfo, SeriesOrder};
pub use self::nifti::{read_volume, write_volume, NiftiVolume};
pub use self::raster::{normalize_to_u8, read_gray, write_gray, Raster};
