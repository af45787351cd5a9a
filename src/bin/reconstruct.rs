use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, info, Level};

use medical_preprocessing::errors::ReconstructError;
use medical_preprocessing::reconstruct::{
    reconstruct, ReconstructOptions, DEFAULT_LOWER_THRESHOLD, DEFAULT_TARGET_SPACING,
    DEFAULT_UPPER_THRESHOLD,
};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid output path: {}", path.display()))]
    InvalidOutputPath { path: PathBuf },

    #[snafu(display("Reconstruction failed: {}", source))]
    Reconstruct {
        #[snafu(source(from(ReconstructError, Box::new)))]
        source: Box<ReconstructError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Threshold a volume and export its surface as an STL mesh", long_about = None)]
struct Args {
    #[arg(help = "NIfTI file or folder of DICOM slices")]
    source: PathBuf,

    #[arg(help = "Output directory (default: next to the source)")]
    output: Option<PathBuf>,

    #[arg(help = "Lowest intensity in the mask", long = "lower", short = 'l', allow_hyphen_values = true, default_value_t = DEFAULT_LOWER_THRESHOLD)]
    lower: f32,

    #[arg(help = "Highest intensity in the mask", long = "upper", short = 'u', allow_hyphen_values = true, default_value_t = DEFAULT_UPPER_THRESHOLD)]
    upper: f32,

    #[arg(help = "Isotropic voxel size of the mask in mm", long = "spacing", short = 's', default_value_t = DEFAULT_TARGET_SPACING)]
    spacing: f64,

    #[arg(help = "Also write the mask as a NIfTI volume", long = "save-mask", default_value_t = false)]
    save_mask: bool,

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

fn run(args: Args) -> Result<(), Error> {
    let output = match args.output {
        Some(output) if output.is_file() => return InvalidOutputPathSnafu { path: output }.fail(),
        Some(output) => output,
        None => args
            .source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let options = ReconstructOptions {
        lower: args.lower,
        upper: args.upper,
        target_spacing: args.spacing,
        write_mask: args.save_mask,
    };

    let result = reconstruct(&args.source, &output, &options).context(ReconstructSnafu)?;
    info!(
        "Mask of shape {:?} with {} foreground voxels",
        result.mask_shape, result.foreground
    );
    info!(
        "Wrote {} triangles to {}",
        result.triangles,
        result.stl.display()
    );
    for preview in result.previews.iter().chain(result.mask.iter()) {
        info!("Wrote {}", preview.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medical_preprocessing::io::nifti::write_volume;
    use medical_preprocessing::{Affine, Volume};
    use ndarray::Array;

    fn args(source: PathBuf, output: Option<PathBuf>) -> Args {
        Args {
            source,
            output,
            lower: DEFAULT_LOWER_THRESHOLD,
            upper: DEFAULT_UPPER_THRESHOLD,
            spacing: DEFAULT_TARGET_SPACING,
            save_mask: true,
            verbose: false,
        }
    }

    fn write_sphere(path: &std::path::Path) {
        let data = Array::from_shape_fn((12, 12, 6), |(i, j, k)| {
            let (x, y, z) = (i as f32 - 5.5, j as f32 - 5.5, (k as f32 - 2.5) * 2.0);
            match x * x + y * y + z * z < 16.0 {
                true => 120.0,
                false => 0.0,
            }
        });
        let affine = Affine::diagonal([1.0, 1.0, 2.0]).unwrap();
        write_volume(path, &Volume::new(data, affine), None).unwrap();
    }

    #[test]
    fn test_reconstruct_default_output() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("tumor.nii");
        write_sphere(&source);
        run(args(source, None)).unwrap();
        for name in [
            "tumor.stl",
            "tumor_axial.png",
            "tumor_coronal.png",
            "tumor_sagittal.png",
            "tumor_mask.nii.gz",
        ] {
            assert!(temp_dir.path().join(name).is_file(), "{}", name);
        }
    }

    #[test]
    fn test_reconstruct_output_is_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("tumor.nii");
        write_sphere(&source);
        let result = run(args(source.clone(), Some(source)));
        assert!(matches!(result, Err(Error::InvalidOutputPath { .. })));
    }

    #[test]
    fn test_reconstruct_empty_mask() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = temp_dir.path().join("tumor.nii");
        write_sphere(&source);
        let mut args = args(source, Some(temp_dir.path().join("out")));
        args.lower = 300.0;
        args.upper = 400.0;
        assert!(matches!(run(args), Err(Error::Reconstruct { .. })));
    }
}
