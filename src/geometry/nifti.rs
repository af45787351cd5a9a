use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use nifti::NiftiHeader;
use tracing::warn;

use crate::errors::GeometryError;
use crate::geometry::Affine;

/// `NIFTI_XFORM_ALIGNED_ANAT`
pub const XFORM_ALIGNED_ANAT: i16 = 2;
/// `NIFTI_UNITS_MM`
pub const UNITS_MM: u8 = 2;
const TIME_UNITS_MASK: u8 = 0x38;

/// Read the best available voxel to world transform from a header.
///
/// The sform is used when `sform_code > 0`, then the quaternion qform when
/// `qform_code > 0`, and finally a diagonal built from `pixdim`.
pub fn affine_from_header(header: &NiftiHeader) -> Result<Affine, GeometryError> {
    if header.sform_code > 0 {
        match sform_affine(header) {
            Ok(affine) => return Ok(affine),
            Err(e) => warn!("Ignoring invalid sform: {}", e),
        }
    }
    if header.qform_code > 0 {
        match qform_affine(header) {
            Ok(affine) => return Ok(affine),
            Err(e) => warn!("Ignoring invalid qform: {}", e),
        }
    }
    Affine::diagonal(pixdim_spacing(header))
}

fn sform_affine(header: &NiftiHeader) -> Result<Affine, GeometryError> {
    let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
    Affine::from_rows([
        row(&header.srow_x),
        row(&header.srow_y),
        row(&header.srow_z),
        [0.0, 0.0, 0.0, 1.0],
    ])
}

fn qform_affine(header: &NiftiHeader) -> Result<Affine, GeometryError> {
    let (b, c, d) = (
        header.quatern_b as f64,
        header.quatern_c as f64,
        header.quatern_d as f64,
    );
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(a, b, c, d))
        .to_rotation_matrix()
        .into_inner();

    let spacing = pixdim_spacing(header);
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    Affine::from_columns(
        [
            rotation.column(0) * spacing[0],
            rotation.column(1) * spacing[1],
            rotation.column(2) * (spacing[2] * qfac),
        ],
        Vector3::new(
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        ),
    )
}

fn pixdim_spacing(header: &NiftiHeader) -> [f64; 3] {
    let mut spacing = [1.0; 3];
    for (axis, value) in spacing.iter_mut().enumerate() {
        let pixdim = header.pixdim[axis + 1] as f64;
        if pixdim.is_finite() && pixdim > 0.0 {
            *value = pixdim;
        }
    }
    spacing
}

/// Write an affine into both the sform and the qform of a header.
pub fn set_header_affine(header: &mut NiftiHeader, affine: &Affine) {
    let rows = affine.rows();
    let to_f32 = |r: [f64; 4]| [r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32];
    header.srow_x = to_f32(rows[0]);
    header.srow_y = to_f32(rows[1]);
    header.srow_z = to_f32(rows[2]);
    header.sform_code = XFORM_ALIGNED_ANAT;

    // The qform can only hold a rotation, so use the nearest orthogonal matrix
    let mut rotation = nearest_orthogonal(affine.direction());
    let qfac = if rotation.determinant() < 0.0 {
        rotation.column_mut(2).neg_mut();
        -1.0
    } else {
        1.0
    };
    let quaternion =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    let q = quaternion.quaternion();
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
    header.quatern_b = (q.i * sign) as f32;
    header.quatern_c = (q.j * sign) as f32;
    header.quatern_d = (q.k * sign) as f32;

    let origin = affine.origin();
    header.quatern_x = origin.x as f32;
    header.quatern_y = origin.y as f32;
    header.quatern_z = origin.z as f32;
    header.qform_code = XFORM_ALIGNED_ANAT;

    let spacing = affine.spacing();
    header.pixdim[0] = qfac as f32;
    header.pixdim[1] = spacing[0] as f32;
    header.pixdim[2] = spacing[1] as f32;
    header.pixdim[3] = spacing[2] as f32;
    header.xyzt_units = UNITS_MM | (header.xyzt_units & TIME_UNITS_MASK);
}

fn nearest_orthogonal(direction: Matrix3<f64>) -> Matrix3<f64> {
    let svd = direction.svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => u * v_t,
        _ => direction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn oblique_affine() -> Affine {
        let angle: f64 = 0.3;
        Affine::from_spacing_orientation(
            [0.8, 0.9, 2.5],
            [angle.cos(), angle.sin(), 0.0, -angle.sin(), angle.cos(), 0.0],
            [-90.0, 126.0, -72.0],
        )
        .unwrap()
    }

    #[test]
    fn test_sform_round_trip() {
        let affine = oblique_affine();
        let mut header = NiftiHeader::default();
        set_header_affine(&mut header, &affine);
        let actual = affine_from_header(&header).unwrap();
        assert!(actual.approx_eq(&affine, 1e-4), "{}", actual);
    }

    #[rstest]
    #[case(oblique_affine())]
    #[case(Affine::diagonal([0.5, 0.5, 3.0]).unwrap())]
    #[case(Affine::from_rows([
        [-0.5, 0.0, 0.0, 90.0],
        [0.0, 0.5, 0.0, -126.0],
        [0.0, 0.0, 2.0, -72.0],
        [0.0, 0.0, 0.0, 1.0],
    ]).unwrap())]
    fn test_qform_round_trip(#[case] affine: Affine) {
        let mut header = NiftiHeader::default();
        set_header_affine(&mut header, &affine);
        header.sform_code = 0;
        let actual = affine_from_header(&header).unwrap();
        assert!(actual.approx_eq(&affine, 1e-4), "{}", actual);
    }

    #[test]
    fn test_qform_origin() {
        let mut header = NiftiHeader::default();
        set_header_affine(&mut header, &oblique_affine());
        assert_eq!(
            [header.quatern_x, header.quatern_y, header.quatern_z],
            [-90.0, 126.0, -72.0]
        );

        header.sform_code = 0;
        header.quatern_z = 12.5;
        let origin = affine_from_header(&header).unwrap().origin();
        assert!((origin.z - 12.5).abs() < 1e-6);
    }

    #[test]
    fn test_pixdim_fallback() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 0;
        header.pixdim = [1.0, 0.7, 0.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        let affine = affine_from_header(&header).unwrap();
        assert_eq!(affine.spacing(), [0.7f32 as f64, 1.0, 4.0]);
    }

    #[test]
    fn test_invalid_sform_falls_back_to_qform() {
        let affine = oblique_affine();
        let mut header = NiftiHeader::default();
        set_header_affine(&mut header, &affine);
        header.srow_z = [0.0; 4];
        let actual = affine_from_header(&header).unwrap();
        assert!(actual.approx_eq(&affine, 1e-4));
    }

    #[test]
    fn test_header_units_and_spacing() {
        let mut header = NiftiHeader::default();
        set_header_affine(&mut header, &oblique_affine());
        assert_eq!(header.xyzt_units & 0x07, UNITS_MM);
        assert_eq!(header.pixdim[3], 2.5);
        assert_eq!(header.pixdim[0], 1.0);
    }
}
