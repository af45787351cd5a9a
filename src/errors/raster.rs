use image::ImageError;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RasterError {
    #[snafu(display("error reading image {}: {}", path.display(), source))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(ImageError, Box::new)))]
        source: Box<ImageError>,
    },

    #[snafu(display("error writing image {}: {}", path.display(), source))]
    WriteError {
        path: PathBuf,
        #[snafu(source(from(ImageError, Box::new)))]
        source: Box<ImageError>,
    },

    #[snafu(display(
        "image {} has size {}x{}, expected {}x{}",
        path.display(),
        width,
        height,
        expected_width,
        expected_height
    ))]
    SizeMismatch {
        path: PathBuf,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[snafu(display("image buffer of {} values does not match {}x{}", len, width, height))]
    InvalidBuffer { len: usize, width: u32, height: u32 },
}
