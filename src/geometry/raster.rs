use crate::errors::GeometryError;
use crate::geometry::affine::{DEFAULT_ORIENTATION, DEFAULT_SPACING};
use crate::geometry::Affine;

/// Raster images carry no calibration. Substitute a transform built from the
/// supplied spacing and in-plane orientation, with the origin at zero.
pub fn default_affine(
    spacing: Option<[f64; 3]>,
    orientation: Option<[f64; 6]>,
) -> Result<Affine, GeometryError> {
    Affine::from_spacing_orientation(
        spacing.unwrap_or(DEFAULT_SPACING),
        orientation.unwrap_or(DEFAULT_ORIENTATION),
        [0.0; 3],
    )
}
