pub mod convert;
pub mod dicom;
pub mod geometry;
pub mod inspect;
pub mod nifti;
pub mod npz;
pub mod raster;
pub mod reconstruct;
pub mod transform;

pub use convert::ConvertError;
pub use dicom::DicomError;
pub use geometry::GeometryError;
pub use inspect::InspectError;
pub use nifti::NiftiError;
pub use npz::NpzError;
pub use raster::RasterError;
pub use reconstruct::ReconstructError;
pub use transform::TransformError;
