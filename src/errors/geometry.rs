use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GeometryError {
    #[snafu(display("affine contains non-finite values"))]
    NonFinite,

    #[snafu(display("affine last row must be [0, 0, 0, 1], got {:?}", row))]
    NotAffine { row: [f64; 4] },

    #[snafu(display("affine is singular (determinant {})", determinant))]
    Singular { determinant: f64 },

    #[snafu(display("invalid spacing {:?}, all values must be positive", spacing))]
    InvalidSpacing { spacing: Vec<f64> },

    #[snafu(display("invalid orientation {:?}, direction cosines must be non-zero and independent", orientation))]
    InvalidOrientation { orientation: [f64; 6] },

    #[snafu(display("cannot derive geometry from an empty series"))]
    EmptySeries,

    #[snafu(display("invalid slice axis {}, expected 0, 1 or 2", axis))]
    InvalidSliceAxis { axis: usize },
}
