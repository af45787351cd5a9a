//! Voxel to world geometry shared by every conversion.
//!
//! Volumes use the NIfTI convention: index `[i, j, k]` maps through a 4x4 affine to RAS+
//! world coordinates. A 2D slice taken along `k` is an image whose columns run along `i`
//! and whose rows run along `j`.
pub mod affine;
pub mod dicom;
pub mod nifti;
pub mod raster;

pub use affine::Affine;
pub use dicom::{series_affine, SliceGeometry};
pub use raster::default_affine;
