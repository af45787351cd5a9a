use ndarray::{Array2, Array3, ArrayView2, Axis, ShapeError};
use std::fmt;

use crate::errors::GeometryError;
use crate::geometry::Affine;

/// Axis along which a volume is cut into 2D slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SliceAxis {
    #[value(alias = "0")]
    X,
    #[value(alias = "1")]
    Y,
    #[default]
    #[value(alias = "2")]
    Z,
}

impl SliceAxis {
    pub fn index(&self) -> usize {
        match self {
            SliceAxis::X => 0,
            SliceAxis::Y => 1,
            SliceAxis::Z => 2,
        }
    }
}

impl TryFrom<usize> for SliceAxis {
    type Error = GeometryError;

    fn try_from(axis: usize) -> Result<Self, Self::Error> {
        match axis {
            0 => Ok(SliceAxis::X),
            1 => Ok(SliceAxis::Y),
            2 => Ok(SliceAxis::Z),
            _ => Err(GeometryError::InvalidSliceAxis { axis }),
        }
    }
}

impl fmt::Display for SliceAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axis_str = match self {
            SliceAxis::X => "x",
            SliceAxis::Y => "y",
            SliceAxis::Z => "z",
        };
        write!(f, "{}", axis_str)
    }
}

/// A 3D array indexed `[i, j, k]` together with its voxel to world affine.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    pub data: Array3<T>,
    pub affine: Affine,
}

impl<T> Volume<T> {
    pub fn new(data: Array3<T>, affine: Affine) -> Self {
        Volume { data, affine }
    }

    pub fn shape(&self) -> [usize; 3] {
        let (i, j, k) = self.data.dim();
        [i, j, k]
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.affine.spacing()
    }

    pub fn num_slices(&self, axis: SliceAxis) -> usize {
        self.data.len_of(Axis(axis.index()))
    }

    /// View of one slice as an image, indexed `[row, column]`. The column runs along the
    /// lower of the two remaining volume axes.
    ///
    /// Panics if `index` is out of bounds.
    pub fn slice(&self, axis: SliceAxis, index: usize) -> ArrayView2<'_, T> {
        self.data
            .index_axis(Axis(axis.index()), index)
            .reversed_axes()
    }

    pub fn slices(&self, axis: SliceAxis) -> impl Iterator<Item = ArrayView2<'_, T>> {
        (0..self.num_slices(axis)).map(move |index| self.slice(axis, index))
    }

    /// Middle slice index along an axis.
    pub fn middle(&self, axis: SliceAxis) -> usize {
        self.num_slices(axis) / 2
    }

    pub fn mapv<U, F>(&self, f: F) -> Volume<U>
    where
        T: Clone,
        F: FnMut(T) -> U,
    {
        Volume {
            data: self.data.mapv(f),
            affine: self.affine,
        }
    }
}

impl<T: Clone> Volume<T> {
    /// Stack `[row, column]` images along `axis`. The inverse of [`Volume::slice`].
    pub fn from_slices(
        slices: &[Array2<T>],
        axis: SliceAxis,
        affine: Affine,
    ) -> Result<Self, ShapeError> {
        let views = slices.iter().map(|s| s.t()).collect::<Vec<_>>();
        let data = ndarray::stack(Axis(axis.index()), &views)?;
        Ok(Volume { data, affine })
    }
}

impl<T: Copy + PartialOrd> Volume<T> {
    /// Smallest and largest value, or `None` for an empty volume.
    pub fn min_max(&self) -> Option<(T, T)> {
        min_max(self.data.iter().copied())
    }
}

/// Smallest and largest value of an iterator.
pub fn min_max<T: Copy + PartialOrd>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((
            if v < lo { v } else { lo },
            if v > hi { v } else { hi },
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use rstest::rstest;

    fn volume() -> Volume<u16> {
        let data = Array::from_shape_fn((4, 3, 2), |(i, j, k)| (i * 100 + j * 10 + k) as u16);
        Volume::new(data, Affine::identity())
    }

    #[test]
    fn test_slice_orientation() {
        let volume = volume();
        let slice = volume.slice(SliceAxis::Z, 1);
        // rows run along j, columns along i
        assert_eq!(slice.dim(), (3, 4));
        assert_eq!(slice[[2, 3]], 321);
    }

    #[rstest]
    #[case(SliceAxis::X, 4, (2, 3))]
    #[case(SliceAxis::Y, 3, (2, 4))]
    #[case(SliceAxis::Z, 2, (3, 4))]
    fn test_slices_round_trip(
        #[case] axis: SliceAxis,
        #[case] count: usize,
        #[case] dim: (usize, usize),
    ) {
        let volume = volume();
        let slices = volume
            .slices(axis)
            .map(|s| s.to_owned())
            .collect::<Vec<_>>();
        assert_eq!(slices.len(), count);
        assert_eq!(slices[0].dim(), dim);
        let stacked = Volume::from_slices(&slices, axis, volume.affine).unwrap();
        assert_eq!(stacked, volume);
    }

    #[test]
    fn test_from_slices_size_mismatch() {
        let slices = vec![Array2::<u8>::zeros((2, 2)), Array2::<u8>::zeros((3, 2))];
        assert!(Volume::from_slices(&slices, SliceAxis::Z, Affine::identity()).is_err());
    }

    #[rstest]
    #[case(0, SliceAxis::X)]
    #[case(2, SliceAxis::Z)]
    fn test_axis_from_index(#[case] index: usize, #[case] expected: SliceAxis) {
        assert_eq!(SliceAxis::try_from(index).unwrap(), expected);
        assert_eq!(expected.index(), index);
    }

    #[test]
    fn test_invalid_axis() {
        assert!(SliceAxis::try_from(3).is_err());
    }

    #[test]
    fn test_min_max() {
        assert_eq!(volume().min_max(), Some((0, 321)));
        assert_eq!(min_max(Vec::<f32>::new().into_iter()), None);
    }
}
