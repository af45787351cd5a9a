use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use snafu::ensure;
use std::fmt;

use crate::errors::geometry::{
    InvalidOrientationSnafu, InvalidSliceAxisSnafu, InvalidSpacingSnafu, NonFiniteSnafu,
    NotAffineSnafu, SingularSnafu,
};
use crate::errors::GeometryError;

/// Row and column direction cosines of an axial slice.
pub const DEFAULT_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
pub const DEFAULT_SPACING: [f64; 3] = [1.0, 1.0, 1.0];

const SINGULAR_EPSILON: f64 = 1e-12;

/// Voxel to world transform. Maps `(i, j, k, 1)` to `(x, y, z, 1)`.
///
/// An `Affine` is always valid: every entry is finite, the last row is `[0, 0, 0, 1]`
/// and the upper 3x3 block is invertible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    matrix: Matrix4<f64>,
}

impl Default for Affine {
    fn default() -> Self {
        Affine {
            matrix: Matrix4::identity(),
        }
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(matrix: Matrix4<f64>) -> Result<Self, GeometryError> {
        validate(&matrix)?;
        Ok(Affine { matrix })
    }

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Result<Self, GeometryError> {
        let matrix = Matrix4::from_fn(|r, c| rows[r][c]);
        Self::new(matrix)
    }

    /// Build an affine from the three voxel axis vectors and the origin.
    pub fn from_columns(
        columns: [Vector3<f64>; 3],
        origin: Vector3<f64>,
    ) -> Result<Self, GeometryError> {
        let mut matrix = Matrix4::identity();
        for (axis, column) in columns.iter().enumerate() {
            matrix.fixed_view_mut::<3, 1>(0, axis).copy_from(column);
        }
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&origin);
        Self::new(matrix)
    }

    /// Diagonal affine with the given spacing and a zero origin.
    pub fn diagonal(spacing: [f64; 3]) -> Result<Self, GeometryError> {
        Self::from_spacing_orientation(spacing, DEFAULT_ORIENTATION, [0.0; 3])
    }

    /// Build an affine from spacing, row/column direction cosines and an origin.
    /// The slice direction is the cross product of the row and column directions.
    pub fn from_spacing_orientation(
        spacing: [f64; 3],
        orientation: [f64; 6],
        origin: [f64; 3],
    ) -> Result<Self, GeometryError> {
        ensure!(
            spacing.iter().all(|s| s.is_finite() && *s > 0.0),
            InvalidSpacingSnafu {
                spacing: spacing.to_vec()
            }
        );
        let row = Vector3::new(orientation[0], orientation[1], orientation[2]);
        let col = Vector3::new(orientation[3], orientation[4], orientation[5]);
        let slice = row.cross(&col);
        ensure!(
            row.norm() > SINGULAR_EPSILON
                && col.norm() > SINGULAR_EPSILON
                && slice.norm() > SINGULAR_EPSILON,
            InvalidOrientationSnafu { orientation }
        );
        let columns = [
            row.normalize() * spacing[0],
            col.normalize() * spacing[1],
            slice.normalize() * spacing[2],
        ];
        Self::from_columns(columns, Vector3::from(origin))
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.matrix[(r, c)];
            }
        }
        rows
    }

    /// The world-space step of one voxel along `axis`.
    pub fn column(&self, axis: usize) -> Result<Vector3<f64>, GeometryError> {
        ensure!(axis < 3, InvalidSliceAxisSnafu { axis });
        Ok(self.matrix.fixed_view::<3, 1>(0, axis).into_owned())
    }

    /// Voxel spacing, the Euclidean norm of each voxel axis.
    pub fn spacing(&self) -> [f64; 3] {
        let linear = self.linear();
        [
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        ]
    }

    /// Unit direction of each voxel axis, as the columns of a 3x3 matrix.
    pub fn direction(&self) -> Matrix3<f64> {
        let mut direction = self.linear();
        for axis in 0..3 {
            let norm = direction.column(axis).norm();
            if norm > SINGULAR_EPSILON {
                direction.column_mut(axis).unscale_mut(norm);
            } else {
                let mut unit = Vector3::zeros();
                unit[axis] = 1.0;
                direction.set_column(axis, &unit);
            }
        }
        direction
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.matrix.fixed_view::<3, 1>(0, 3).into_owned()
    }

    pub fn linear(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn determinant(&self) -> f64 {
        self.linear().determinant()
    }

    pub fn inverse(&self) -> Result<Self, GeometryError> {
        let linear = self.linear().try_inverse().ok_or(GeometryError::Singular {
            determinant: self.determinant(),
        })?;
        let origin = -(linear * self.origin());
        Self::from_columns(
            [
                linear.column(0).into_owned(),
                linear.column(1).into_owned(),
                linear.column(2).into_owned(),
            ],
            origin,
        )
    }

    /// Map a (possibly fractional) voxel index to world coordinates.
    pub fn transform_point(&self, index: [f64; 3]) -> [f64; 3] {
        let world = self.matrix * Vector4::new(index[0], index[1], index[2], 1.0);
        [world[0], world[1], world[2]]
    }

    pub fn with_origin(&self, origin: Vector3<f64>) -> Result<Self, GeometryError> {
        let mut matrix = self.matrix;
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&origin);
        Self::new(matrix)
    }

    /// Replace the spacing along one axis while keeping its direction.
    pub fn with_spacing(&self, axis: usize, spacing: f64) -> Result<Self, GeometryError> {
        ensure!(axis < 3, InvalidSliceAxisSnafu { axis });
        ensure!(
            spacing.is_finite() && spacing > 0.0,
            InvalidSpacingSnafu {
                spacing: vec![spacing]
            }
        );
        let mut matrix = self.matrix;
        let direction = self.direction().column(axis).into_owned();
        matrix
            .fixed_view_mut::<3, 1>(0, axis)
            .copy_from(&(direction * spacing));
        Self::new(matrix)
    }

    pub fn approx_eq(&self, other: &Affine, tolerance: f64) -> bool {
        self.matrix
            .iter()
            .zip(other.matrix.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl TryFrom<[[f64; 4]; 4]> for Affine {
    type Error = GeometryError;

    fn try_from(rows: [[f64; 4]; 4]) -> Result<Self, Self::Error> {
        Affine::from_rows(rows)
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows() {
            writeln!(
                f,
                "[{:>10.4} {:>10.4} {:>10.4} {:>10.4}]",
                row[0], row[1], row[2], row[3]
            )?;
        }
        Ok(())
    }
}

fn validate(matrix: &Matrix4<f64>) -> Result<(), GeometryError> {
    ensure!(matrix.iter().all(|v| v.is_finite()), NonFiniteSnafu);
    let last = [
        matrix[(3, 0)],
        matrix[(3, 1)],
        matrix[(3, 2)],
        matrix[(3, 3)],
    ];
    ensure!(last == [0.0, 0.0, 0.0, 1.0], NotAffineSnafu { row: last });
    let determinant = matrix.fixed_view::<3, 3>(0, 0).determinant();
    ensure!(
        determinant.abs() > SINGULAR_EPSILON,
        SingularSnafu { determinant }
    );
    Ok(())
}
