use ndarray::{Array3, Axis, Zip};
use snafu::{ensure, ResultExt};

use crate::errors::transform::{GeometrySnafu, InvalidResampleSpacingSnafu};
use crate::errors::TransformError;
use crate::volume::Volume;

/// Resample a volume to a new spacing along `k`, keeping `i` and `j`.
///
/// The origin and axis directions are kept. The new depth is
/// `ceil(depth * spacing / new_spacing)` and values are linearly interpolated
/// between neighbouring slices. Output slices that fall outside the input are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resample {
    pub spacing: f64,
}

impl Resample {
    pub fn new(spacing: f64) -> Result<Self, TransformError> {
        ensure!(
            spacing.is_finite() && spacing > 0.0,
            InvalidResampleSpacingSnafu { spacing }
        );
        Ok(Resample { spacing })
    }

    /// Depth of the output for an input depth and slice spacing.
    pub fn output_depth(&self, depth: usize, spacing: f64) -> usize {
        (depth as f64 * spacing / self.spacing).ceil() as usize
    }

    pub fn apply(&self, volume: &Volume<f32>) -> Result<Volume<f32>, TransformError> {
        let [ni, nj, nk] = volume.shape();
        let spacing = volume.spacing()[2];
        let depth = self.output_depth(nk, spacing);
        let affine = volume
            .affine
            .with_spacing(2, self.spacing)
            .context(GeometrySnafu)?;

        let mut data = Array3::<f32>::zeros((ni, nj, depth));
        let step = self.spacing / spacing;
        for (k, mut slice) in data.axis_iter_mut(Axis(2)).enumerate() {
            // Continuous index of this slice in the input
            let z = k as f64 * step;
            let Some((lower, upper, weight)) = neighbours(z, nk) else {
                continue;
            };
            let weight = weight as f32;
            Zip::from(&mut slice)
                .and(volume.data.index_axis(Axis(2), lower))
                .and(volume.data.index_axis(Axis(2), upper))
                .for_each(|out, &a, &b| *out = a + (b - a) * weight);
        }
        Ok(Volume::new(data, affine))
    }
}

/// Bracketing input slices and the weight of the upper one. Points within half a
/// slice of either end take the end slice, points further out have no value.
fn neighbours(z: f64, depth: usize) -> Option<(usize, usize, f64)> {
    if depth == 0 || z < -0.5 || z > depth as f64 - 0.5 {
        return None;
    }
    let last = depth - 1;
    let lower = (z.floor().max(0.0) as usize).min(last);
    let upper = (lower + 1).min(last);
    let weight = match upper == lower {
        true => 0.0,
        false => (z - lower as f64).clamp(0.0, 1.0),
    };
    Some((lower, upper, weight))
}
