use clap::error::ErrorKind;
use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, Level};

use medical_preprocessing::augment::{augment_batch, augment_file, augmented_name, AugmentOptions};
use medical_preprocessing::errors::ConvertError;
use medical_preprocessing::{SliceAxis, DEFAULT_ANGLE_RANGE, DEFAULT_CROP_RATIO};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("Augmentation failed: {}", source))]
    Augment {
        #[snafu(source(from(ConvertError, Box::new)))]
        source: Box<ConvertError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum InputKind {
    #[default]
    Nii,
    Png,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str = match self {
            InputKind::Nii => "nii",
            InputKind::Png => "png",
        };
        write!(f, "{}", kind_str)
    }
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Random crop and rotation augmentation of NIfTI volumes and PNG images", long_about = None)]
struct Args {
    #[arg(help = "Source file, or a directory of NIfTI or PNG files")]
    source: PathBuf,

    #[arg(help = "Output file for a single source, or an output directory")]
    output: PathBuf,

    #[arg(
        help = "Kind of file augmented in a source directory",
        long = "kind",
        short = 'k',
        value_parser = clap::value_parser!(InputKind),
        default_value_t = InputKind::default(),
    )]
    kind: InputKind,

    #[arg(
        help = "Fraction of each side kept by the crop",
        long = "crop-ratio",
        short = 'c',
        default_value_t = DEFAULT_CROP_RATIO
    )]
    crop_ratio: f32,

    #[arg(help = "Crop the centre instead of a random region", long = "center-crop", default_value_t = false)]
    center_crop: bool,

    #[arg(help = "Fixed rotation angle in degrees, counter-clockwise", long = "angle", allow_hyphen_values = true)]
    angle: Option<f32>,

    #[arg(
        help = "Range of the random rotation angle in degrees (low,high)",
        long = "angle-range",
        allow_hyphen_values = true,
        value_parser = clap::builder::ValueParser::new(|s: &str| {
            let parts: Vec<&str> = s.split(',').collect();
            if parts.len() == 2 {
                let low = parts[0].trim().parse::<f32>().map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid lower angle"))?;
                let high = parts[1].trim().parse::<f32>().map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Invalid upper angle"))?;
                Ok((low, high))
            } else {
                Err(clap::Error::raw(ErrorKind::InvalidValue, "Angle range must be in the format low,high"))
            }
        })
    )]
    angle_range: Option<(f32, f32)>,

    #[arg(help = "Grow the canvas to fit the rotated image before resizing back", long = "expand", default_value_t = false)]
    expand: bool,

    #[arg(
        help = "Axis of the augmented NIfTI slice",
        long = "axis",
        short = 'a',
        value_parser = clap::value_parser!(SliceAxis),
        default_value_t = SliceAxis::default(),
    )]
    axis: SliceAxis,

    #[arg(
        help = "Fail on the first input that cannot be augmented",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,

    #[arg(help = "Enable debug logging", long = "verbose", short = 'v', default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> AugmentOptions {
        AugmentOptions {
            crop_ratio: self.crop_ratio,
            random_crop: !self.center_crop,
            angle: self.angle,
            angle_range: self.angle_range.unwrap_or(DEFAULT_ANGLE_RANGE),
            keep_size: !self.expand,
            slice_axis: self.axis,
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        true => Level::DEBUG,
        false => Level::INFO,
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn run(args: Args) -> Result<(), Error> {
    let options = args.options();
    if args.source.is_dir() {
        if args.output.is_file() {
            return InvalidOutputPathSnafu { path: args.output }.fail();
        }
        let nifti = args.kind == InputKind::Nii;
        let summary = augment_batch(&args.source, &args.output, nifti, &options, args.strict)
            .context(AugmentSnafu)?;
        info!(
            "Augmented {}/{} inputs into {}",
            summary.converted,
            summary.found,
            args.output.display()
        );
    } else if args.source.is_file() {
        // An existing directory, or a target without an extension, receives `{name}_aug{ext}`
        let output = match args.output.is_dir() || args.output.extension().is_none() {
            true => args.output.join(augmented_name(&args.source)),
            false => args.output,
        };
        augment_file(&args.source, &output, &options).context(AugmentSnafu)?;
    } else {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medical_preprocessing::io::nifti::{read_volume, write_volume};
    use medical_preprocessing::io::raster::{read_gray, write_gray};
    use medical_preprocessing::{Affine, Volume};
    use ndarray::Array;

    fn args(source: PathBuf, output: PathBuf, kind: InputKind) -> Args {
        Args {
            source,
            output,
            kind,
            crop_ratio: DEFAULT_CROP_RATIO,
            center_crop: false,
            angle: None,
            angle_range: None,
            expand: false,
            axis: SliceAxis::Z,
            strict: true,
            verbose: false,
        }
    }

    #[test]
    fn test_parse_angle_range() {
        let args = Args::try_parse_from([
            "medprep-augment",
            "in",
            "out",
            "--angle-range",
            "-10,15",
            "--center-crop",
        ])
        .unwrap();
        let options = args.options();
        assert_eq!(options.angle_range, (-10.0, 15.0));
        assert!(!options.random_crop);
        assert!(options.keep_size);
    }

    #[test]
    fn test_parse_kind() {
        let args = Args::try_parse_from(["medprep-augment", "in", "out"]).unwrap();
        assert_eq!(args.kind, InputKind::Nii);
        let args = Args::try_parse_from(["medprep-augment", "in", "out", "--kind", "png"]).unwrap();
        assert_eq!(args.kind, InputKind::Png);
    }

    #[test]
    fn test_augment_png_into_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let png = temp_dir.path().join("7.png");
        let pixels = Array::from_shape_fn((16, 12), |(r, c)| (r * 12 + c) as u8);
        write_gray(&png, pixels.view()).unwrap();

        let output = temp_dir.path().join("aug");
        run(args(png, output.clone(), InputKind::Png)).unwrap();
        assert_eq!(read_gray(output.join("7_aug.png")).unwrap().dim(), (16, 12));
    }

    #[test]
    fn test_augment_nii_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("nii");
        std::fs::create_dir(&input).unwrap();
        let affine = Affine::diagonal([1.0, 1.0, 2.0]).unwrap();
        let data = Array::from_shape_fn((10, 8, 3), |(i, j, _)| (i * j) as f32);
        write_volume(input.join("1.nii.gz"), &Volume::new(data, affine), None).unwrap();

        let output = temp_dir.path().join("out");
        run(args(input, output.clone(), InputKind::Nii)).unwrap();
        let volume = read_volume(output.join("1_aug.nii.gz")).unwrap().volume;
        assert_eq!(volume.shape(), [10, 8, 3]);
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = run(args(
            temp_dir.path().join("missing.png"),
            temp_dir.path().to_path_buf(),
            InputKind::Png,
        ));
        assert!(matches!(result, Err(Error::InvalidSourcePath { .. })));
    }
}
