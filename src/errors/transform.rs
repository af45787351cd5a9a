use snafu::Snafu;

use crate::errors::GeometryError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    #[snafu(display("invalid crop ratio {}, expected a value in (0, 1]", ratio))]
    InvalidCropRatio { ratio: f32 },

    #[snafu(display("invalid rotation range [{}, {}]", low, high))]
    InvalidAngleRange { low: f32, high: f32 },

    #[snafu(display("cannot transform an empty image"))]
    EmptyImage,

    #[snafu(display("invalid resampling spacing {}", spacing))]
    InvalidResampleSpacing { spacing: f64 },

    #[snafu(display("{}", source))]
    Geometry {
        #[snafu(source(from(GeometryError, Box::new)))]
        source: Box<GeometryError>,
    },
}
