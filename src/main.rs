use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};

use medical_preprocessing::convert::png_dcm::{DEFAULT_MODALITY, DEFAULT_UID_ROOT};
use medical_preprocessing::convert::{
    dcm_to_nii, dcm_to_nii_batch, dcm_to_npz, dcm_to_npz_batch, dcm_to_png, dcm_to_png_batch,
    file_to_npz, file_to_npz_batch, nii_to_dcm, nii_to_dcm_batch, nii_to_npz, nii_to_npz_batch,
    nii_to_png, nii_to_png_batch, png_to_dcm, png_to_dcm_batch, png_to_nii, png_to_nii_batch,
    BatchSummary, PngToDcmOptions, PngToNiiOptions,
};
use medical_preprocessing::errors::ConvertError;
use medical_preprocessing::geometry::affine::{DEFAULT_ORIENTATION, DEFAULT_SPACING};
use medical_preprocessing::SliceAxis;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Conversion failed: {}", source))]
    Convert {
        #[snafu(source(from(ConvertError, Box::new)))]
        source: Box<ConvertError>,
    },
}

/// Parse `N` comma separated floats, e.g. `0.5,0.5,3`.
fn parse_floats<const N: usize>(s: &str) -> Result<[f64; N], clap::Error> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| clap::Error::raw(ErrorKind::InvalidValue, "Values must be numbers"))?;
    values.try_into().map_err(|_| {
        clap::Error::raw(
            ErrorKind::InvalidValue,
            format!("Expected {} comma separated values", N),
        )
    })
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// NIfTI volume (or a folder of them) to a folder of PNG slices
    NiiPng {
        #[arg(help = "NIfTI file, or a directory of NIfTI files")]
        source: PathBuf,

        #[arg(help = "Directory receiving the `{name}_png` folders")]
        output: PathBuf,

        #[arg(
            help = "Axis along which the volume is sliced",
            long = "axis",
            short = 'a',
            value_parser = clap::value_parser!(SliceAxis),
            default_value_t = SliceAxis::default(),
        )]
        axis: SliceAxis,
    },

    /// Folder of PNG slices to a NIfTI volume
    PngNii {
        #[arg(help = "PNG folder, or with --batch a directory of `*_png` folders")]
        source: PathBuf,

        #[arg(help = "Output directory (default: next to the PNG folder)", long = "output-dir", short = 'o')]
        output_dir: Option<PathBuf>,

        #[arg(help = "Explicit output NIfTI file, single folder only", long = "output-file")]
        output_file: Option<PathBuf>,

        #[arg(help = "Reference NIfTI providing the affine", long = "reference", short = 'r')]
        reference: Option<PathBuf>,

        #[arg(
            help = "Axis along which the slices are stacked",
            long = "axis",
            short = 'a',
            value_parser = clap::value_parser!(SliceAxis),
            default_value_t = SliceAxis::default(),
        )]
        axis: SliceAxis,

        #[arg(
            help = "Voxel spacing x,y,z used without a reference",
            long = "spacing",
            value_parser = clap::builder::ValueParser::new(parse_floats::<3>),
        )]
        spacing: Option<[f64; 3]>,

        #[arg(
            help = "Direction cosines of the x and y axes used without a reference",
            long = "orientation",
            value_parser = clap::builder::ValueParser::new(parse_floats::<6>),
        )]
        orientation: Option<[f64; 6]>,

        #[arg(help = "Convert every `*_png` folder inside the source", long = "batch", default_value_t = false)]
        batch: bool,
    },

    /// NIfTI volume (or a folder of them) to a DICOM series
    NiiDcm {
        #[arg(help = "NIfTI file, or a directory of NIfTI files")]
        source: PathBuf,

        #[arg(help = "Directory receiving the `{name}_dcm` folders")]
        output: PathBuf,
    },

    /// DICOM series folder to a NIfTI volume
    DcmNii {
        #[arg(help = "`*_dcm` folder, or with --batch a directory of them")]
        source: PathBuf,

        #[arg(help = "Output directory")]
        output: PathBuf,

        #[arg(
            help = "Reference NIfTI, or with --batch a directory holding `{id}.nii` references",
            long = "reference",
            short = 'r'
        )]
        reference: Option<PathBuf>,

        #[arg(help = "Convert every `*_dcm` folder inside the source", long = "batch", default_value_t = false)]
        batch: bool,
    },

    /// DICOM folder to a folder of PNG images
    DcmPng {
        #[arg(help = "DICOM folder, or with --batch a directory of them")]
        source: PathBuf,

        #[arg(help = "Output directory (default: next to the DICOM folder)")]
        output: Option<PathBuf>,

        #[arg(help = "Convert every folder inside the source", long = "batch", default_value_t = false)]
        batch: bool,
    },

    /// Folder of PNG/JPEG images to a DICOM series
    PngDcm {
        #[arg(help = "Image folder, or with --batch a directory of them")]
        source: PathBuf,

        #[arg(help = "Output directory (default: next to the image folder)")]
        output: Option<PathBuf>,

        #[arg(help = "Modality tag", long = "modality", default_value = DEFAULT_MODALITY)]
        modality: String,

        #[arg(
            help = "Pixel spacing row,column in mm",
            long = "pixel-spacing",
            value_parser = clap::builder::ValueParser::new(parse_floats::<2>),
        )]
        pixel_spacing: Option<[f64; 2]>,

        #[arg(help = "Root of the generated UIDs", long = "uid-root", default_value = DEFAULT_UID_ROOT)]
        uid_root: String,

        #[arg(help = "Convert every folder inside the source", long = "batch", default_value_t = false)]
        batch: bool,
    },

    /// NIfTI volume (or a folder of them) to a volume NPZ archive
    NiiNpz {
        #[arg(help = "NIfTI file, or a directory of NIfTI files")]
        source: PathBuf,

        #[arg(help = "Output directory")]
        output: PathBuf,
    },

    /// DICOM series folder to a volume NPZ archive
    DcmNpz {
        #[arg(help = "DICOM folder, or with --batch a directory of them")]
        source: PathBuf,

        #[arg(help = "Output directory")]
        output: PathBuf,

        #[arg(help = "Convert every folder inside the source", long = "batch", default_value_t = false)]
        batch: bool,
    },

    /// Any supported file to a `data` NPZ archive. Directories are walked recursively
    ToNpz {
        #[arg(help = "NIfTI, DICOM, PNG or JPEG file, or a directory")]
        source: PathBuf,

        #[arg(help = "Output file for a single input (default: next to the source)")]
        output: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Convert medical images between NIfTI, DICOM, PNG and NPZ", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(
        help = "Fail on the first input that cannot be converted",
        long = "strict",
        global = true,
        default_value_t = false
    )]
    strict: bool,

    #[arg(help = "Enable debug logging", long = "verbose", short = 'v', global = true, default_value_t = false)]
    verbose: bool,
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

fn ensure_source(path: &Path) -> Result<(), Error> {
    match path.exists() {
        true => Ok(()),
        false => InvalidSourcePathSnafu { path }.fail(),
    }
}

/// Parent of a folder, used when no output directory is given.
fn parent_or_current(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn log_output(output: PathBuf) {
    info!("Wrote {}", output.display());
}

fn log_summary(summary: BatchSummary) {
    info!(
        "Converted {}/{} inputs ({} failed)",
        summary.converted,
        summary.found,
        summary.failed()
    );
}

fn run(args: Args) -> Result<(), Error> {
    let strict = args.strict;
    match args.command {
        Command::NiiPng {
            source,
            output,
            axis,
        } => {
            ensure_source(&source)?;
            match source.is_dir() {
                true => log_summary(nii_to_png_batch(&source, &output, axis, strict).context(ConvertSnafu)?),
                false => log_output(nii_to_png(&source, &output, axis).context(ConvertSnafu)?),
            }
        }
        Command::PngNii {
            source,
            output_dir,
            output_file,
            reference,
            axis,
            spacing,
            orientation,
            batch,
        } => {
            ensure_source(&source)?;
            let options = PngToNiiOptions {
                output: output_file,
                output_dir,
                reference,
                axis,
                spacing: spacing.unwrap_or(DEFAULT_SPACING),
                orientation: orientation.unwrap_or(DEFAULT_ORIENTATION),
            };
            match batch {
                true => log_summary(png_to_nii_batch(&source, &options, strict).context(ConvertSnafu)?),
                false => log_output(png_to_nii(&source, &options).context(ConvertSnafu)?),
            }
        }
        Command::NiiDcm { source, output } => {
            ensure_source(&source)?;
            match source.is_dir() {
                true => log_summary(nii_to_dcm_batch(&source, &output, strict).context(ConvertSnafu)?),
                false => log_output(nii_to_dcm(&source, &output).context(ConvertSnafu)?),
            }
        }
        Command::DcmNii {
            source,
            output,
            reference,
            batch,
        } => {
            ensure_source(&source)?;
            let reference = reference.as_deref();
            match batch {
                true => log_summary(
                    dcm_to_nii_batch(&source, reference, &output, strict).context(ConvertSnafu)?,
                ),
                false => log_output(dcm_to_nii(&source, reference, &output).context(ConvertSnafu)?),
            }
        }
        Command::DcmPng {
            source,
            output,
            batch,
        } => {
            ensure_source(&source)?;
            match batch {
                true => log_summary(
                    dcm_to_png_batch(&source, output.as_deref(), strict).context(ConvertSnafu)?,
                ),
                false => {
                    let output = output.unwrap_or_else(|| parent_or_current(&source));
                    log_output(dcm_to_png(&source, &output).context(ConvertSnafu)?)
                }
            }
        }
        Command::PngDcm {
            source,
            output,
            modality,
            pixel_spacing,
            uid_root,
            batch,
        } => {
            ensure_source(&source)?;
            let defaults = PngToDcmOptions::default();
            let options = PngToDcmOptions {
                modality,
                pixel_spacing: pixel_spacing.unwrap_or(defaults.pixel_spacing),
                uid_root,
            };
            match batch {
                true => log_summary(
                    png_to_dcm_batch(&source, output.as_deref(), &options, strict)
                        .context(ConvertSnafu)?,
                ),
                false => {
                    let output = output.unwrap_or_else(|| parent_or_current(&source));
                    log_output(png_to_dcm(&source, &output, &options).context(ConvertSnafu)?)
                }
            }
        }
        Command::NiiNpz { source, output } => {
            ensure_source(&source)?;
            match source.is_dir() {
                true => log_summary(nii_to_npz_batch(&source, &output, strict).context(ConvertSnafu)?),
                false => log_output(nii_to_npz(&source, &output).context(ConvertSnafu)?),
            }
        }
        Command::DcmNpz {
            source,
            output,
            batch,
        } => {
            ensure_source(&source)?;
            match batch {
                true => log_summary(dcm_to_npz_batch(&source, &output, strict).context(ConvertSnafu)?),
                false => log_output(dcm_to_npz(&source, &output).context(ConvertSnafu)?),
            }
        }
        Command::ToNpz { source, output } => {
            ensure_source(&source)?;
            match source.is_dir() {
                true => log_summary(file_to_npz_batch(&source, strict).context(ConvertSnafu)?),
                false => log_output(file_to_npz(&source, output.as_deref()).context(ConvertSnafu)?),
            }
        }
    }
    Ok(())
}
