//! Image augmentation and volume resampling.
pub mod crop;
pub mod resample;
pub mod rotate;

pub use crop::*;
pub use resample::*;
pub use rotate::*;

pub trait Transform<T> {
    fn apply(&self, target: &T) -> T;
}
