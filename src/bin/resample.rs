use clap::Parser;
use indicatif::ProgressFinish;
use rayon::prelude::*;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};

use medical_preprocessing::errors::{NiftiError, TransformError};
use medical_preprocessing::file::{default_bar, file_name_string, NiftiFileOperations};
use medical_preprocessing::io::nifti::{read_volume, write_volume};
use medical_preprocessing::Resample;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("No NIfTI files found in source path: {}", path.display()))]
    NoSources { path: PathBuf },

    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Failed to list {}", path.display()))]
    ListSources {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("NIfTI error on {}: {}", path.display(), source))]
    Nifti {
        path: PathBuf,
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },

    #[snafu(display("Resampling error on {}: {}", path.display(), source))]
    Transform {
        path: PathBuf,
        #[snafu(source(from(TransformError, Box::new)))]
        source: Box<TransformError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Resample NIfTI volumes to a new slice spacing", long_about = None)]
struct Args {
    #[arg(help = "Source NIfTI file, or a directory of NIfTI files")]
    source: PathBuf,

    #[arg(help = "Output file for a single source, or an output directory")]
    output: PathBuf,

    #[arg(help = "New spacing along the slice axis in mm", long = "spacing", short = 's')]
    spacing: f64,

    #[arg(
        help = "Fail on the first volume that cannot be resampled",
        long = "strict",
        default_value_t = false
    )]
    strict: bool,

    #[arg(help = "Enable debug logging", long = "verbose", short = 'v', default_value_t = false)]
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

fn process(source: &Path, dest: &Path, resample: &Resample) -> Result<(), Error> {
    let nifti = read_volume(source).context(NiftiSnafu { path: source })?;
    info!(
        "Resampling {} with spacing {:?} and shape {:?}",
        source.display(),
        nifti.volume.spacing(),
        nifti.volume.shape()
    );
    let resampled = resample
        .apply(&nifti.volume)
        .context(TransformSnafu { path: source })?;
    write_volume(dest, &resampled, Some(&nifti.header)).context(NiftiSnafu { path: dest })?;
    info!(
        "Wrote {} with spacing {:?} and shape {:?}",
        dest.display(),
        resampled.spacing(),
        resampled.shape()
    );
    Ok(())
}

fn run(args: Args) -> Result<(), Error> {
    let resample = Resample::new(args.spacing).context(TransformSnafu {
        path: args.source.clone(),
    })?;

    if args.source.is_file() {
        let dest = match args.output.is_dir() {
            true => args.output.join(file_name_string(&args.source)),
            false => args.output,
        };
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
        }
        return process(&args.source, &dest, &resample);
    }
    if !args.source.is_dir() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }
    if args.output.is_file() {
        return InvalidOutputPathSnafu { path: args.output }.fail();
    }

    let sources = args
        .source
        .list_niftis()
        .context(ListSourcesSnafu { path: &args.source })?;
    if sources.is_empty() {
        return NoSourcesSnafu { path: args.source }.fail();
    }
    tracing::info!("Number of sources found: {}", sources.len());
    std::fs::create_dir_all(&args.output).context(CreateDirSnafu { path: &args.output })?;

    let pb = default_bar(sources.len() as u64).with_finish(ProgressFinish::AndLeave);
    pb.set_message("Resampling volumes");

    let par_func = |file: PathBuf| {
        let dest = args.output.join(file_name_string(&file));
        let result = process(&file, &dest, &resample);
        pb.inc(1);
        match result {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(
                    "Error processing file {}: {}",
                    file.display(),
                    Report::from_error(&e)
                );
                Err(e)
            }
        }
    };

    if args.strict {
        // In strict mode, abort on first error
        sources.into_par_iter().try_for_each(par_func)?;
    } else {
        // In non-strict mode, only log errors and continue
        sources.into_par_iter().map(par_func).collect::<Vec<_>>();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medical_preprocessing::{Affine, Volume};
    use ndarray::Array;
    use rstest::rstest;

    fn write_nii(path: &Path) {
        let affine = Affine::from_spacing_orientation(
            [0.7, 0.7, 5.0],
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [-40.0, -40.0, 10.0],
        )
        .unwrap();
        let data = Array::from_shape_fn((6, 5, 4), |(_, _, k)| k as f32 * 100.0);
        write_volume(path, &Volume::new(data, affine), None).unwrap();
    }

    fn args(source: PathBuf, output: PathBuf, spacing: f64) -> Args {
        Args {
            source,
            output,
            spacing,
            strict: true,
            verbose: false,
        }
    }

    #[rstest]
    #[case(10.0, 2)]
    #[case(2.5, 8)]
    fn test_resample_file(#[case] spacing: f64, #[case] depth: usize) {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("1665867.nii.gz");
        write_nii(&source);
        let output = temp_dir.path().join("out").join("resampled.nii");
        run(args(source, output.clone(), spacing)).unwrap();

        let volume = read_volume(&output).unwrap().volume;
        assert_eq!(volume.shape(), [6, 5, depth]);
        let actual = volume.spacing();
        assert!((actual[0] - 0.7).abs() < 1e-5);
        assert!((actual[2] - spacing).abs() < 1e-5);
        assert_eq!(volume.affine.origin(), nalgebra::Vector3::new(-40.0, -40.0, 10.0));
    }

    #[test]
    fn test_resample_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("nii");
        std::fs::create_dir(&source).unwrap();
        write_nii(&source.join("1.nii"));
        write_nii(&source.join("2.nii.gz"));
        let output = temp_dir.path().join("out");
        run(args(source, output.clone(), 1.0)).unwrap();
        assert_eq!(read_volume(output.join("2.nii.gz")).unwrap().volume.shape(), [6, 5, 20]);
    }

    #[test]
    fn test_invalid_spacing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("1.nii");
        write_nii(&source);
        let result = run(args(source, temp_dir.path().to_path_buf(), 0.0));
        assert!(matches!(result, Err(Error::Transform { .. })));
    }
}
