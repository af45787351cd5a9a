use clap::{Parser, Subcommand};
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, info, Level};

use medical_preprocessing::errors::InspectError;
use medical_preprocessing::inspect::{
    check_path, inspect_path, nifti_manifest, write_manifest, PathCheck, SpatialInfo,
    DEFAULT_MANIFEST_FILENAME,
};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("{}", source))]
    Inspect {
        #[snafu(source(from(InspectError, Box::new)))]
        source: Box<InspectError>,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Print the spatial information of a NIfTI file or DICOM series folder
    Info {
        #[arg(help = "NIfTI file or DICOM folder")]
        source: PathBuf,
    },

    /// Write a manifest of every NIfTI file below a directory
    Manifest {
        #[arg(help = "Source directory")]
        source: PathBuf,

        #[arg(help = format!("Output filepath, extension determines format: .csv or .parquet (default: <source>/{DEFAULT_MANIFEST_FILENAME})"))]
        output: Option<PathBuf>,
    },

    /// Report whether a file exists, listing its directory when it does not
    Check {
        #[arg(help = "Path to check")]
        path: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Inspect the geometry of medical images", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

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

/// The outcome of a command, printed to stdout.
#[derive(Debug)]
enum Outcome {
    Info(SpatialInfo),
    Manifest { dest: PathBuf, entries: usize },
    Check(PathCheck),
}

fn execute(command: Command) -> Result<Outcome, Error> {
    match command {
        Command::Info { source } => {
            let spatial = inspect_path(&source).context(InspectSnafu)?;
            Ok(Outcome::Info(spatial))
        }
        Command::Manifest { source, output } => {
            if !source.is_dir() {
                return InvalidSourcePathSnafu { path: source }.fail();
            }
            let dest = match output {
                Some(output) if output.is_dir() => InvalidOutputPathSnafu { path: output }.fail(),
                Some(output) => Ok(output),
                None => Ok(source.join(DEFAULT_MANIFEST_FILENAME)),
            }?;
            let entries = nifti_manifest(&source).context(InspectSnafu)?;
            write_manifest(&entries, &dest).context(InspectSnafu)?;
            info!("Wrote {} entries to {}", entries.len(), dest.display());
            Ok(Outcome::Manifest {
                dest,
                entries: entries.len(),
            })
        }
        Command::Check { path } => Ok(Outcome::Check(check_path(&path).context(InspectSnafu)?)),
    }
}

fn run(args: Args) -> Result<(), Error> {
    match execute(args.command)? {
        Outcome::Info(spatial) => println!("{}", spatial),
        Outcome::Manifest { dest, entries } => {
            println!("Manifest of {} files written to {}", entries, dest.display())
        }
        Outcome::Check(check) => println!("{}", check),
    }
    Ok(())
}
