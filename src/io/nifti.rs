use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use snafu::{OptionExt, ResultExt};
use std::path::Path;

use crate::errors::nifti::{HeaderGeometrySnafu, ReadSnafu, UnsupportedShapeSnafu, WriteSnafu};
use crate::errors::NiftiError;
use crate::geometry::nifti::{affine_from_header, set_header_affine};
use crate::volume::Volume;

/// A NIfTI volume with its original header.
#[derive(Debug, Clone)]
pub struct NiftiVolume {
    pub volume: Volume<f32>,
    pub header: NiftiHeader,
}

/// Read only the header of a `.nii` or `.nii.gz` file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<NiftiHeader, NiftiError> {
    let path = path.as_ref();
    NiftiHeader::from_file(path).context(ReadSnafu { path })
}

/// Read a `.nii` or `.nii.gz` file as a 3D `f32` volume with the scaling slope applied.
///
/// 2D images gain a trailing singleton axis. Trailing singleton axes beyond the
/// third are dropped; any other higher dimensional volume is rejected.
pub fn read_volume<P: AsRef<Path>>(path: P) -> Result<NiftiVolume, NiftiError> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .context(ReadSnafu { path })?;
    let header = obj.header().clone();
    let data = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context(ReadSnafu { path })?;

    let shape = data.shape().to_vec();
    let mut data = data;
    while data.ndim() > 3 && data.len_of(Axis(data.ndim() - 1)) == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    while data.ndim() < 3 {
        let next = data.ndim();
        data = data.insert_axis(Axis(next));
    }
    let data = data
        .into_dimensionality::<Ix3>()
        .ok()
        .context(UnsupportedShapeSnafu { path, shape })?;
    let data = data.as_standard_layout().into_owned();

    let affine = affine_from_header(&header).context(HeaderGeometrySnafu { path })?;
    Ok(NiftiVolume {
        volume: Volume::new(data, affine),
        header,
    })
}

/// Voxel types that can be written to a NIfTI file.
pub trait NiftiVoxel: Sized {
    fn write_nifti(options: &WriterOptions, data: &Array3<Self>) -> nifti::Result<()>;
}

macro_rules! impl_nifti_voxel {
    ($($t:ty),*) => {
        $(
            impl NiftiVoxel for $t {
                fn write_nifti(options: &WriterOptions, data: &Array3<Self>) -> nifti::Result<()> {
                    options.write_nifti(data)
                }
            }
        )*
    };
}

impl_nifti_voxel!(u8, i16, f32);

/// Write a volume to `.nii` or `.nii.gz` (chosen by the path).
///
/// When `reference` is given its header fields are kept, except for the data
/// type, dimensions, scaling and geometry, which follow the volume.
pub fn write_volume<T, P>(
    path: P,
    volume: &Volume<T>,
    reference: Option<&NiftiHeader>,
) -> Result<(), NiftiError>
where
    T: NiftiVoxel,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut header = reference.cloned().unwrap_or_default();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    set_header_affine(&mut header, &volume.affine);

    let options = WriterOptions::new(path).reference_header(&header);
    T::write_nifti(&options, &volume.data).context(WriteSnafu { path })
}
