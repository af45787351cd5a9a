//! Threshold segmentation and surface reconstruction of a volume.
//!
//! A NIfTI file or DICOM series is thresholded into a binary mask, zoomed to
//! isotropic voxels with nearest neighbour sampling, and the boundary faces of the
//! foreground are written as a binary STL mesh in world millimetres. Mid-plane
//! previews of the mask are written next to the mesh.
use nalgebra::Vector3;
use ndarray::Array3;
use snafu::{ensure, ResultExt};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::reconstruct::{
    CreateDirSnafu, DicomSnafu, EmptyMaskSnafu, GeometrySnafu, InvalidTargetSpacingSnafu,
    InvalidThresholdsSnafu, MissingInputSnafu, NiftiSnafu, RasterSnafu, UnsupportedInputSnafu,
    WriteStlSnafu,
};
use crate::errors::ReconstructError;
use crate::file::{file_name_string, NiftiFileOperations};
use crate::io::dicom::{read_series, SeriesOrder};
use crate::io::nifti::{read_volume, write_volume};
use crate::io::raster::write_gray;
use crate::volume::{SliceAxis, Volume};

pub const DEFAULT_LOWER_THRESHOLD: f32 = 50.0;
pub const DEFAULT_UPPER_THRESHOLD: f32 = 200.0;
pub const DEFAULT_TARGET_SPACING: f64 = 1.0;

pub const STL_EXTENSION: &str = "stl";
const MASK_SUFFIX: &str = "_mask.nii.gz";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructOptions {
    /// Lowest intensity inside the mask, inclusive.
    pub lower: f32,
    /// Highest intensity inside the mask, inclusive.
    pub upper: f32,
    /// Isotropic voxel size of the zoomed mask, in millimetres.
    pub target_spacing: f64,
    /// Also write the zoomed mask as `{stem}_mask.nii.gz`.
    pub write_mask: bool,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        ReconstructOptions {
            lower: DEFAULT_LOWER_THRESHOLD,
            upper: DEFAULT_UPPER_THRESHOLD,
            target_spacing: DEFAULT_TARGET_SPACING,
            write_mask: false,
        }
    }
}

/// Files written by [`reconstruct`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub mask_shape: [usize; 3],
    pub foreground: usize,
    pub triangles: usize,
    pub stl: PathBuf,
    pub previews: Vec<PathBuf>,
    pub mask: Option<PathBuf>,
}

/// Read a NIfTI file, or a folder of DICOM slices ordered by the number ending each
/// file name.
pub fn read_input(path: &Path) -> Result<Volume<f32>, ReconstructError> {
    ensure!(path.exists(), MissingInputSnafu { path });
    if path.is_dir() {
        let series = read_series(path, SeriesOrder::TrailingNumber).context(DicomSnafu)?;
        Ok(series.volume)
    } else if path.has_nifti_extension() {
        Ok(read_volume(path).context(NiftiSnafu)?.volume)
    } else {
        UnsupportedInputSnafu { path }.fail()
    }
}

/// Binary mask of the voxels with `lower <= v <= upper`.
pub fn threshold_mask(volume: &Volume<f32>, lower: f32, upper: f32) -> Volume<u8> {
    volume.mapv(|v| u8::from(v >= lower && v <= upper))
}

/// Output length and source index of each output sample for a nearest neighbour zoom
/// of `len` samples by `factor`. The first and last samples stay aligned.
fn zoom_indices(len: usize, factor: f64) -> Vec<usize> {
    let out_len = ((len as f64 * factor).round() as usize).max(1);
    if out_len == 1 || len <= 1 {
        return vec![0; out_len];
    }
    let scale = (len - 1) as f64 / (out_len - 1) as f64;
    (0..out_len)
        .map(|o| ((o as f64 * scale).round() as usize).min(len - 1))
        .collect()
}

/// Zoom a mask to isotropic voxels of `target_spacing` with nearest neighbour sampling.
pub fn zoom_isotropic(
    mask: &Volume<u8>,
    target_spacing: f64,
) -> Result<Volume<u8>, ReconstructError> {
    ensure!(
        target_spacing.is_finite() && target_spacing > 0.0,
        InvalidTargetSpacingSnafu {
            spacing: target_spacing
        }
    );
    let spacing = mask.spacing();
    let shape = mask.shape();
    let indices = (0..3)
        .map(|axis| zoom_indices(shape[axis], spacing[axis] / target_spacing))
        .collect::<Vec<_>>();
    let data = Array3::from_shape_fn(
        (indices[0].len(), indices[1].len(), indices[2].len()),
        |(i, j, k)| mask.data[[indices[0][i], indices[1][j], indices[2][k]]],
    );

    let mut affine = mask.affine;
    for axis in 0..3 {
        affine = affine
            .with_spacing(axis, target_spacing)
            .context(GeometrySnafu)?;
    }
    Ok(Volume::new(data, affine))
}

/// Two triangles for every face between a foreground voxel and the background or the
/// volume edge. Vertices are voxel corners mapped through the affine and wound
/// counter-clockwise seen from outside.
pub fn surface_triangles(mask: &Volume<u8>) -> Vec<stl_io::Triangle> {
    let [ni, nj, nk] = mask.shape();
    let shape = [ni as isize, nj as isize, nk as isize];
    let flip = mask.affine.determinant() < 0.0;
    let is_set = |index: [isize; 3]| {
        (0..3).all(|a| index[a] >= 0 && index[a] < shape[a])
            && mask.data[[index[0] as usize, index[1] as usize, index[2] as usize]] != 0
    };

    let mut triangles = Vec::new();
    for ((i, j, k), &value) in mask.data.indexed_iter() {
        if value == 0 {
            continue;
        }
        let voxel = [i as isize, j as isize, k as isize];
        for axis in 0..3 {
            for side in [-1isize, 1] {
                let mut neighbour = voxel;
                neighbour[axis] += side;
                if is_set(neighbour) {
                    continue;
                }
                let mut corners = face_corners(voxel, axis, side).map(|c| {
                    let [x, y, z] = mask.affine.transform_point(c);
                    Vector3::new(x, y, z)
                });
                if flip {
                    corners.reverse();
                }
                triangles.push(triangle(corners[0], corners[1], corners[2]));
                triangles.push(triangle(corners[0], corners[2], corners[3]));
            }
        }
    }
    triangles
}

/// Corners of one voxel face in index space, counter-clockwise around the outward normal.
fn face_corners(voxel: [isize; 3], axis: usize, side: isize) -> [[f64; 3]; 4] {
    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
    let mut corners = [[0.0; 3]; 4];
    let offsets = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    for (corner, (du, dv)) in corners.iter_mut().zip(offsets) {
        corner[axis] = voxel[axis] as f64 + 0.5 * side as f64;
        corner[u] = voxel[u] as f64 + du;
        corner[v] = voxel[v] as f64 + dv;
    }
    if side < 0 {
        corners.reverse();
    }
    corners
}

fn triangle(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> stl_io::Triangle {
    let normal = (b - a).cross(&(c - a));
    let normal = match normal.norm() > 0.0 {
        true => normal.normalize(),
        false => normal,
    };
    let vertex = |p: Vector3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
    stl_io::Triangle {
        normal: stl_io::Normal::new([normal.x as f32, normal.y as f32, normal.z as f32]),
        vertices: [vertex(a), vertex(b), vertex(c)],
    }
}

/// Write triangles as a binary STL file.
pub fn write_stl(path: &Path, triangles: &[stl_io::Triangle]) -> Result<(), ReconstructError> {
    let mut file = BufWriter::new(File::create(path).context(WriteStlSnafu { path })?);
    stl_io::write_stl(&mut file, triangles.iter()).context(WriteStlSnafu { path })
}

/// Write the middle axial, coronal and sagittal planes of a mask as
/// `{stem}_axial.png`, `{stem}_coronal.png` and `{stem}_sagittal.png`.
pub fn write_previews(
    mask: &Volume<u8>,
    output_dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>, ReconstructError> {
    [
        (SliceAxis::Z, "axial"),
        (SliceAxis::Y, "coronal"),
        (SliceAxis::X, "sagittal"),
    ]
    .into_iter()
    .map(|(axis, plane)| {
        let path = output_dir.join(format!("{}_{}.png", stem, plane));
        let plane = mask
            .slice(axis, mask.middle(axis))
            .mapv(|v| if v == 0 { 0 } else { u8::MAX });
        write_gray(&path, plane.view()).context(RasterSnafu)?;
        Ok(path)
    })
    .collect()
}

/// Base name of the outputs for an input file or folder.
fn output_stem(input: &Path) -> String {
    match input.has_nifti_extension() {
        true => input.nifti_stem(),
        false => file_name_string(input),
    }
}

/// Segment `input` by intensity and write `{stem}.stl` plus mid-plane previews to `output_dir`.
pub fn reconstruct(
    input: &Path,
    output_dir: &Path,
    options: &ReconstructOptions,
) -> Result<Reconstruction, ReconstructError> {
    let (lower, upper) = (options.lower, options.upper);
    ensure!(
        lower.is_finite() && upper.is_finite() && lower <= upper,
        InvalidThresholdsSnafu { lower, upper }
    );
    let volume = read_input(input)?;
    info!(
        "Read {} with shape {:?} and spacing {:?}",
        input.display(),
        volume.shape(),
        volume.spacing()
    );

    let mask = zoom_isotropic(&threshold_mask(&volume, lower, upper), options.target_spacing)?;
    let foreground = mask.data.iter().filter(|v| **v != 0).count();
    ensure!(foreground > 0, EmptyMaskSnafu { path: input, lower, upper });
    debug!(
        "Mask has {} foreground voxels in {:?}",
        foreground,
        mask.shape()
    );

    std::fs::create_dir_all(output_dir).context(CreateDirSnafu { path: output_dir })?;
    let stem = output_stem(input);
    let triangles = surface_triangles(&mask);
    let stl = output_dir.join(format!("{}.{}", stem, STL_EXTENSION));
    write_stl(&stl, &triangles)?;
    info!("Wrote {} triangles to {}", triangles.len(), stl.display());

    let previews = write_previews(&mask, output_dir, &stem)?;
    let mask_path = match options.write_mask {
        true => {
            let path = output_dir.join(format!("{}{}", stem, MASK_SUFFIX));
            write_volume(&path, &mask, None).context(NiftiSnafu)?;
            Some(path)
        }
        false => None,
    };

    Ok(Reconstruction {
        mask_shape: mask.shape(),
        foreground,
        triangles: triangles.len(),
        stl,
        previews,
        mask: mask_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Affine;
    use crate::io::dicom::{write_series, SeriesInfo};
    use crate::io::raster::read_gray;
    use ndarray::Array;
    use rstest::rstest;

    const STL_HEADER_BYTES: u64 = 84;
    const STL_TRIANGLE_BYTES: u64 = 50;

    fn cube_volume() -> Volume<f32> {
        // 6x6x3 volume, 2 mm slices, with a 2x2x1 block of value 100
        let data = Array::from_shape_fn((6, 6, 3), |(i, j, k)| {
            match (2..4).contains(&i) && (2..4).contains(&j) && k == 1 {
                true => 100.0,
                false => 10.0,
            }
        });
        Volume::new(data, Affine::diagonal([1.0, 1.0, 2.0]).unwrap())
    }

    #[rstest]
    #[case(4, 2.0, vec![0, 0, 1, 1, 2, 2, 3, 3])]
    #[case(3, 1.0, vec![0, 1, 2])]
    #[case(5, 0.5, vec![0, 2, 4])]
    #[case(1, 3.0, vec![0, 0, 0])]
    fn test_zoom_indices(#[case] len: usize, #[case] factor: f64, #[case] expected: Vec<usize>) {
        let indices = zoom_indices(len, factor);
        assert_eq!(indices.len(), expected.len());
        assert_eq!(indices[0], expected[0]);
        assert_eq!(indices.last(), expected.last());
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_threshold_mask_inclusive() {
        let data = Array::from_shape_vec((5, 1, 1), vec![49.0, 50.0, 120.0, 200.0, 201.0]).unwrap();
        let volume = Volume::new(data, Affine::identity());
        let mask = threshold_mask(&volume, 50.0, 200.0);
        assert_eq!(mask.data.iter().copied().collect::<Vec<_>>(), vec![0, 1, 1, 1, 0]);
    }

    #[test]
    fn test_zoom_isotropic() {
        let mask = threshold_mask(&cube_volume(), 50.0, 200.0);
        let zoomed = zoom_isotropic(&mask, 1.0).unwrap();
        assert_eq!(zoomed.shape(), [6, 6, 6]);
        let spacing = zoomed.spacing();
        assert!(spacing.iter().all(|s| (s - 1.0).abs() < 1e-9));
        assert_eq!(zoomed.data[[2, 2, 0]], 0);
        assert_eq!(zoomed.data[[2, 2, 3]], 1);
        assert_eq!(zoomed.data[[4, 2, 3]], 0);

        assert!(matches!(
            zoom_isotropic(&mask, 0.0),
            Err(ReconstructError::InvalidTargetSpacing { .. })
        ));
    }

    #[rstest]
    #[case(vec![[0, 0, 0]], 12)]
    #[case(vec![[0, 0, 0], [1, 0, 0]], 20)]
    #[case(vec![[0, 0, 0], [1, 1, 1]], 24)]
    fn test_surface_triangles(#[case] voxels: Vec<[usize; 3]>, #[case] expected: usize) {
        let mut data = Array3::<u8>::zeros((3, 3, 3));
        for voxel in voxels {
            data[voxel] = 1;
        }
        let mask = Volume::new(data, Affine::identity());
        assert_eq!(surface_triangles(&mask).len(), expected);
    }

    #[rstest]
    #[case(Affine::identity())]
    #[case(Affine::from_rows([
        [-2.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ])
    .unwrap())]
    fn test_surface_normals_point_outwards(#[case] affine: Affine) {
        let mut data = Array3::<u8>::zeros((1, 1, 1));
        data[[0, 0, 0]] = 1;
        let mask = Volume::new(data, affine);
        for triangle in surface_triangles(&mask) {
            let centroid = triangle
                .vertices
                .iter()
                .fold([0.0f32; 3], |acc, v| [acc[0] + v[0], acc[1] + v[1], acc[2] + v[2]]);
            let outward = (0..3).map(|a| centroid[a] * triangle.normal[a]).sum::<f32>();
            assert!(outward > 0.0);
        }
    }

    #[test]
    fn test_reconstruct_nifti() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("tumor.nii.gz");
        write_volume(&input, &cube_volume(), None).unwrap();

        let output = temp_dir.path().join("out");
        let options = ReconstructOptions {
            write_mask: true,
            ..Default::default()
        };
        let result = reconstruct(&input, &output, &options).unwrap();
        assert_eq!(result.mask_shape, [6, 6, 6]);
        // A 2x2x2 block exposes 24 unit faces
        assert_eq!(result.foreground, 8);
        assert_eq!(result.triangles, 48);
        assert_eq!(result.stl, output.join("tumor.stl"));
        let size = std::fs::metadata(&result.stl).unwrap().len();
        assert_eq!(size, STL_HEADER_BYTES + STL_TRIANGLE_BYTES * 48);

        let names = result.previews.iter().map(file_name_string).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["tumor_axial.png", "tumor_coronal.png", "tumor_sagittal.png"]
        );
        let axial = read_gray(&result.previews[0]).unwrap();
        assert_eq!(axial.dim(), (6, 6));
        assert_eq!(axial[[2, 2]], 255.0);
        assert_eq!(axial[[0, 0]], 0.0);

        let mask = read_volume(result.mask.unwrap()).unwrap().volume;
        assert_eq!(mask.shape(), [6, 6, 6]);
    }

    #[test]
    fn test_reconstruct_dicom_folder() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("series");
        let data = Array::from_shape_fn((4, 4, 4), |(i, _, k)| match i == 1 && k == 2 {
            true => 150i16,
            false => 0,
        });
        let volume = Volume::new(data, Affine::diagonal([1.0, 1.0, 1.0]).unwrap());
        write_series(&input, &SeriesInfo::secondary_capture(), &volume, |k| {
            format!("slice_{}.dcm", k + 1)
        })
        .unwrap();

        let result = reconstruct(&input, temp_dir.path(), &ReconstructOptions::default()).unwrap();
        assert_eq!(result.mask_shape, [4, 4, 4]);
        assert_eq!(result.foreground, 4);
        assert_eq!(result.stl, temp_dir.path().join("series.stl"));
        assert!(result.mask.is_none());
    }

    #[test]
    fn test_reconstruct_empty_mask() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("empty.nii");
        write_volume(&input, &cube_volume(), None).unwrap();
        let options = ReconstructOptions {
            lower: 500.0,
            upper: 600.0,
            ..Default::default()
        };
        assert!(matches!(
            reconstruct(&input, temp_dir.path(), &options),
            Err(ReconstructError::EmptyMask { .. })
        ));
    }

    #[rstest]
    #[case("missing.nii")]
    #[case("notes.txt")]
    fn test_read_input_errors(#[case] name: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(name);
        if name.ends_with(".txt") {
            std::fs::write(&path, "text").unwrap();
        }
        let result = read_input(&path);
        match name.ends_with(".txt") {
            true => assert!(matches!(result, Err(ReconstructError::UnsupportedInput { .. }))),
            false => assert!(matches!(result, Err(ReconstructError::MissingInput { .. }))),
        }
    }
}
