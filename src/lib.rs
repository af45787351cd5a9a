pub mod augment;
pub mod convert;
pub mod errors;
pub mod file;
pub mod geometry;
pub mod inspect;
pub mod io;
pub mod reconstruct;
pub mod transform;
pub mod volume;

pub use geometry::Affine;
pub use transform::*;
pub use volume::{SliceAxis, Volume};
