use ndarray::{Array1, Array2, Array3, ArrayD, Ix1, Ix2, Ix3, IxDyn, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement, WritableElement};
use snafu::{OptionExt, ResultExt};
use std::fs::File;
use std::path::Path;

use crate::errors::npz::{IOSnafu, InvalidAffineSnafu, InvalidStringSnafu, ReadSnafu, WriteSnafu};
use crate::errors::NpzError;
use crate::geometry::Affine;
use crate::volume::Volume;

pub const IMAGE_KEY: &str = "image";
pub const AFFINE_KEY: &str = "affine";
pub const SPACING_KEY: &str = "spacing";
pub const SOURCE_TYPE_KEY: &str = "source_type";
pub const SOURCE_NAME_KEY: &str = "source_name";
pub const DATA_KEY: &str = "data";

/// Voxel data stored under `image`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveImage {
    F32(Array3<f32>),
    I16(Array3<i16>),
}

impl ArchiveImage {
    pub fn shape(&self) -> [usize; 3] {
        let (i, j, k) = match self {
            ArchiveImage::F32(a) => a.dim(),
            ArchiveImage::I16(a) => a.dim(),
        };
        [i, j, k]
    }
}

/// Contents of a volume archive.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeArchive {
    pub image: ArchiveImage,
    pub affine: Affine,
    pub spacing: [f64; 3],
    pub source_type: String,
    pub source_name: String,
}

fn create<P: AsRef<Path>>(path: P) -> Result<NpzWriter<File>, NpzError> {
    let path = path.as_ref();
    let file = File::create(path).context(IOSnafu { path })?;
    Ok(NpzWriter::new_compressed(file))
}

fn add<S, D>(
    npz: &mut NpzWriter<File>,
    path: &Path,
    name: &'static str,
    array: &ndarray::ArrayBase<S, D>,
) -> Result<(), NpzError>
where
    S: ndarray::Data,
    S::Elem: WritableElement,
    D: ndarray::Dimension,
{
    npz.add_array(name, array)
        .context(WriteSnafu { path, name })
}

/// Write a volume archive. `source_type` is `"nii"` or `"dcm"`.
pub fn write_volume_archive<T, P>(
    path: P,
    volume: &Volume<T>,
    source_type: &str,
    source_name: &str,
) -> Result<(), NpzError>
where
    T: WritableElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut npz = create(path)?;
    let affine = Array2::from_shape_fn((4, 4), |(r, c)| volume.affine.matrix()[(r, c)]);
    let spacing = Array1::from(volume.spacing().to_vec());

    add(&mut npz, path, IMAGE_KEY, &volume.data)?;
    add(&mut npz, path, AFFINE_KEY, &affine)?;
    add(&mut npz, path, SPACING_KEY, &spacing)?;
    add(
        &mut npz,
        path,
        SOURCE_TYPE_KEY,
        &Array1::from(source_type.as_bytes().to_vec()),
    )?;
    add(
        &mut npz,
        path,
        SOURCE_NAME_KEY,
        &Array1::from(source_name.as_bytes().to_vec()),
    )?;
    npz.finish().context(WriteSnafu {
        path,
        name: IMAGE_KEY,
    })?;
    Ok(())
}

/// Write a single `data` array of any dimensionality.
pub fn write_data_archive<P: AsRef<Path>>(path: P, data: &ArrayD<f32>) -> Result<(), NpzError> {
    let path = path.as_ref();
    let mut npz = create(path)?;
    add(&mut npz, path, DATA_KEY, data)?;
    npz.finish().context(WriteSnafu {
        path,
        name: DATA_KEY,
    })?;
    Ok(())
}

struct Archive<'a> {
    path: &'a Path,
    npz: NpzReader<File>,
}

impl<'a> Archive<'a> {
    fn open(path: &'a Path) -> Result<Self, NpzError> {
        let file = File::open(path).context(IOSnafu { path })?;
        let npz = NpzReader::new(file).context(ReadSnafu { path, name: "" })?;
        Ok(Archive { path, npz })
    }

    /// Arrays may be stored with or without the `.npy` suffix.
    fn read<T, D>(&mut self, key: &str) -> Result<ndarray::Array<T, D>, NpzError>
    where
        T: ReadableElement,
        D: ndarray::Dimension,
    {
        if let Ok(array) = self.npz.by_name::<OwnedRepr<T>, D>(key) {
            return Ok(array);
        }
        let name = format!("{}.npy", key);
        self.npz
            .by_name::<OwnedRepr<T>, D>(&name)
            .context(ReadSnafu {
                path: self.path,
                name,
            })
    }

    fn read_string(&mut self, key: &'static str) -> Result<String, NpzError> {
        let bytes = self.read::<u8, Ix1>(key)?;
        String::from_utf8(bytes.to_vec()).ok().context(InvalidStringSnafu {
            path: self.path,
            name: key,
        })
    }
}

/// Read a volume archive written by [`write_volume_archive`].
pub fn read_volume_archive<P: AsRef<Path>>(path: P) -> Result<VolumeArchive, NpzError> {
    let path = path.as_ref();
    let mut archive = Archive::open(path)?;
    let image = match archive.read::<f32, Ix3>(IMAGE_KEY) {
        Ok(image) => ArchiveImage::F32(image),
        Err(_) => ArchiveImage::I16(archive.read::<i16, Ix3>(IMAGE_KEY)?),
    };
    let rows = archive.read::<f64, Ix2>(AFFINE_KEY)?;
    let mut matrix = [[0.0; 4]; 4];
    for ((r, c), value) in rows.indexed_iter() {
        if r < 4 && c < 4 {
            matrix[r][c] = *value;
        }
    }
    let affine = Affine::from_rows(matrix).context(InvalidAffineSnafu { path })?;
    let spacing = archive.read::<f64, Ix1>(SPACING_KEY)?;
    let mut spacing_array = [0.0; 3];
    for (dst, src) in spacing_array.iter_mut().zip(spacing.iter()) {
        *dst = *src;
    }

    Ok(VolumeArchive {
        image,
        affine,
        spacing: spacing_array,
        source_type: archive.read_string(SOURCE_TYPE_KEY)?,
        source_name: archive.read_string(SOURCE_NAME_KEY)?,
    })
}

/// Read the `data` array of a data archive.
pub fn read_data_archive<P: AsRef<Path>>(path: P) -> Result<ArrayD<f32>, NpzError> {
    let path = path.as_ref();
    Archive::open(path)?.read::<f32, IxDyn>(DATA_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[test]
    fn test_volume_archive_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("case.npz");
        let affine = Affine::from_spacing_orientation(
            [0.7, 0.7, 2.5],
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [10.0, -20.0, 30.0],
        )
        .unwrap();
        let data = Array::from_shape_fn((3, 4, 2), |(i, j, k)| (i + j * 3 + k * 12) as i16 - 5);
        let volume = Volume::new(data.clone(), affine);
        write_volume_archive(&path, &volume, "dcm", "case_dcm").unwrap();

        let archive = read_volume_archive(&path).unwrap();
        assert_eq!(archive.image, ArchiveImage::I16(data));
        assert_eq!(archive.image.shape(), [3, 4, 2]);
        assert!(archive.affine.approx_eq(&affine, 1e-12));
        assert_eq!(archive.spacing, volume.spacing());
        assert_eq!(archive.source_type, "dcm");
        assert_eq!(archive.source_name, "case_dcm");
    }

    #[test]
    fn test_float_volume_archive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("case.npz");
        let volume = Volume::new(Array3::<f32>::from_elem((2, 2, 2), 1.5), Affine::identity());
        write_volume_archive(&path, &volume, "nii", "case.nii.gz").unwrap();
        let archive = read_volume_archive(&path).unwrap();
        assert_eq!(archive.image, ArchiveImage::F32(volume.data));
        assert_eq!(archive.source_name, "case.nii.gz");
    }

    #[test]
    fn test_data_archive_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("image.npz");
        let data = Array::from_shape_fn((3, 2), |(r, c)| (r * 2 + c) as f32).into_dyn();
        write_data_archive(&path, &data).unwrap();
        assert_eq!(read_data_archive(&path).unwrap(), data);
    }

    #[test]
    fn test_missing_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("image.npz");
        write_data_archive(&path, &Array::zeros(vec![2, 2])).unwrap();
        assert!(matches!(
            read_volume_archive(&path),
            Err(NpzError::ReadError { .. })
        ));
    }
}
