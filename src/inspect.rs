//! Spatial summaries of volumes, NIfTI manifests and path diagnostics.
use arrow::array::{Float64Array, Int32Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use indicatif::ParallelProgressIterator;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rayon::prelude::*;
use rust_search::SearchBuilder;
use snafu::{ensure, ResultExt};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::inspect::{
    ArrowSnafu, CreateManifestSnafu, CsvSnafu, DicomSnafu, InvalidOutputPathSnafu,
    ListDirectorySnafu, MissingInputSnafu, NiftiSnafu, NoSourcesSnafu, ParquetSnafu,
    UnsupportedInputSnafu,
};
use crate::errors::nifti::HeaderGeometrySnafu;
use crate::errors::InspectError;
use crate::file::{default_bar, file_name_string, NiftiFileOperations};
use crate::geometry::nifti::affine_from_header;
use crate::geometry::Affine;
use crate::io::dicom::{read_series, SeriesOrder};
use crate::io::nifti::{read_header, read_volume};

pub const DEFAULT_MANIFEST_FILENAME: &str = "manifest.csv";

/// DICOM style description of the geometry of a volume, in the frame of its affine.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialInfo {
    /// Spacing along `j` followed by spacing along `i`.
    pub pixel_spacing: [f64; 2],
    pub slice_thickness: f64,
    /// Unit `i` direction followed by unit `j` direction.
    pub image_orientation: [f64; 6],
    pub image_position: [f64; 3],
    pub volume_shape: [usize; 3],
    /// `|A[0,0]|, |A[1,1]|, |A[2,2]|`. Only equal to the spacing for axis aligned volumes.
    pub diagonal_spacing: [f64; 3],
}

impl SpatialInfo {
    pub fn from_affine(affine: &Affine, shape: [usize; 3]) -> Self {
        let [sx, sy, sz] = affine.spacing();
        let direction = affine.direction();
        let (x, y) = (direction.column(0), direction.column(1));
        let origin = affine.origin();
        let matrix = affine.matrix();
        SpatialInfo {
            pixel_spacing: [sy, sx],
            slice_thickness: sz,
            image_orientation: [x[0], x[1], x[2], y[0], y[1], y[2]],
            image_position: [origin.x, origin.y, origin.z],
            volume_shape: shape,
            diagonal_spacing: [
                matrix[(0, 0)].abs(),
                matrix[(1, 1)].abs(),
                matrix[(2, 2)].abs(),
            ],
        }
    }
}

impl fmt::Display for SpatialInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &[f64]| {
            values
                .iter()
                .map(|v| format!("{:.6}", v))
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(f, "PixelSpacing: [{}]", join(&self.pixel_spacing))?;
        writeln!(f, "SliceThickness: {:.6}", self.slice_thickness)?;
        writeln!(
            f,
            "ImageOrientationPatient: [{}]",
            join(&self.image_orientation)
        )?;
        writeln!(f, "ImagePositionPatient: [{}]", join(&self.image_position))?;
        writeln!(f, "VolumeShape: {:?}", self.volume_shape)?;
        let [x, y, z] = self.diagonal_spacing;
        write!(f, "Diagonal spacing: x {:.3} mm, y {:.3} mm, z {:.3} mm", x, y, z)
    }
}

/// Spatial summary of a NIfTI file or of a folder of DICOM slices.
pub fn inspect_path(path: &Path) -> Result<SpatialInfo, InspectError> {
    ensure!(path.exists(), MissingInputSnafu { path });
    let volume = if path.is_dir() {
        read_series(path, SeriesOrder::InstanceNumber)
            .context(DicomSnafu)?
            .volume
    } else if path.has_nifti_extension() {
        read_volume(path).context(NiftiSnafu)?.volume
    } else {
        return UnsupportedInputSnafu { path }.fail();
    };
    Ok(SpatialInfo::from_affine(&volume.affine, volume.shape()))
}

/// Result of [`check_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathCheck {
    Exists,
    /// The file is missing but its directory exists. Holds the directory entries, sorted.
    MissingFile {
        directory: PathBuf,
        entries: Vec<String>,
    },
    MissingDirectory { directory: PathBuf },
}

/// Check that a file exists, and if not, whether its parent directory does.
pub fn check_path(path: &Path) -> Result<PathCheck, InspectError> {
    if path.exists() {
        return Ok(PathCheck::Exists);
    }
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !directory.is_dir() {
        return Ok(PathCheck::MissingDirectory { directory });
    }
    let mut entries = std::fs::read_dir(&directory)
        .context(ListDirectorySnafu { path: &directory })?
        .map(|entry| entry.map(|e| file_name_string(e.path())))
        .collect::<Result<Vec<_>, _>>()
        .context(ListDirectorySnafu { path: &directory })?;
    entries.sort();
    Ok(PathCheck::MissingFile { directory, entries })
}

impl fmt::Display for PathCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathCheck::Exists => write!(f, "File exists"),
            PathCheck::MissingDirectory { directory } => {
                write!(f, "Directory does not exist: {}", directory.display())
            }
            PathCheck::MissingFile { directory, entries } => {
                write!(
                    f,
                    "Directory {} exists but the file does not. Files in the directory:",
                    directory.display()
                )?;
                for entry in entries {
                    write!(f, "\n  - {}", entry)?;
                }
                Ok(())
            }
        }
    }
}

/// Header summary of one NIfTI file in a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Path relative to the manifest source directory.
    pub path: PathBuf,
    pub shape: [u32; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// NIfTI datatype code.
    pub datatype: i16,
}

impl ManifestEntry {
    pub fn try_from_nifti(path: &Path, root: &Path) -> Result<Self, InspectError> {
        let header = read_header(path).context(NiftiSnafu)?;
        let affine = affine_from_header(&header)
            .context(HeaderGeometrySnafu { path })
            .context(NiftiSnafu)?;
        let origin = affine.origin();
        let dim = |axis: usize| u32::from(header.dim[axis + 1].max(1));
        Ok(ManifestEntry {
            path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            shape: [dim(0), dim(1), dim(2)],
            spacing: affine.spacing(),
            origin: [origin.x, origin.y, origin.z],
            datatype: header.datatype,
        })
    }
}

/// Read the header of every NIfTI file below `source`, recursively, sorted by path.
pub fn nifti_manifest(source: &Path) -> Result<Vec<ManifestEntry>, InspectError> {
    ensure!(source.is_dir(), MissingInputSnafu { path: source });
    let mut paths = SearchBuilder::default()
        .location(source)
        .build()
        .map(PathBuf::from)
        .filter(|p| p.is_file() && p.has_nifti_extension())
        .collect::<Vec<_>>();
    ensure!(!paths.is_empty(), NoSourcesSnafu { path: source });
    paths.sort();
    tracing::info!("Number of NIfTI files found: {}", paths.len());

    let pb = default_bar(paths.len() as u64);
    pb.set_message("Reading NIfTI headers");
    let entries = paths
        .into_par_iter()
        .progress_with(pb)
        .map(|path| ManifestEntry::try_from_nifti(&path, source))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// File format of a manifest, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Csv,
    Parquet,
}

impl ManifestFormat {
    pub fn from_extension(path: &Path) -> Result<Self, InspectError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => Ok(ManifestFormat::Csv),
            Some("parquet") => Ok(ManifestFormat::Parquet),
            _ => Err(InspectError::InvalidOutputExtension {
                path: path.to_path_buf(),
                supported: vec!["csv", "parquet"],
            }),
        }
    }
}

const MANIFEST_COLUMNS: [&str; 11] = [
    "path", "dim_x", "dim_y", "dim_z", "spacing_x", "spacing_y", "spacing_z", "origin_x",
    "origin_y", "origin_z", "datatype",
];

/// Write manifest entries to `dest` as CSV or Parquet, by extension.
pub fn write_manifest(entries: &[ManifestEntry], dest: &Path) -> Result<(), InspectError> {
    ensure!(!dest.is_dir(), InvalidOutputPathSnafu { path: dest });
    match ManifestFormat::from_extension(dest)? {
        ManifestFormat::Csv => write_manifest_csv(entries, dest),
        ManifestFormat::Parquet => write_manifest_parquet(entries, dest),
    }
}

fn write_manifest_csv(entries: &[ManifestEntry], dest: &Path) -> Result<(), InspectError> {
    let mut writer = csv::Writer::from_path(dest).context(CsvSnafu)?;
    writer.write_record(MANIFEST_COLUMNS).context(CsvSnafu)?;
    for entry in entries {
        let mut record = vec![entry.path.display().to_string()];
        record.extend(entry.shape.iter().map(|v| v.to_string()));
        record.extend(entry.spacing.iter().map(|v| v.to_string()));
        record.extend(entry.origin.iter().map(|v| v.to_string()));
        record.push(entry.datatype.to_string());
        writer.write_record(&record).context(CsvSnafu)?;
    }
    writer
        .flush()
        .context(CreateManifestSnafu)
}

fn write_manifest_parquet(entries: &[ManifestEntry], dest: &Path) -> Result<(), InspectError> {
    let paths = entries
        .iter()
        .map(|e| e.path.display().to_string())
        .collect::<Vec<_>>();
    let shape = |axis: usize| {
        Arc::new(UInt32Array::from(
            entries.iter().map(|e| e.shape[axis]).collect::<Vec<_>>(),
        ))
    };
    let spacing = |axis: usize| {
        Arc::new(Float64Array::from(
            entries.iter().map(|e| e.spacing[axis]).collect::<Vec<_>>(),
        ))
    };
    let origin = |axis: usize| {
        Arc::new(Float64Array::from(
            entries.iter().map(|e| e.origin[axis]).collect::<Vec<_>>(),
        ))
    };
    let datatypes = entries
        .iter()
        .map(|e| i32::from(e.datatype))
        .collect::<Vec<_>>();

    let types = [
        DataType::Utf8,
        DataType::UInt32,
        DataType::UInt32,
        DataType::UInt32,
        DataType::Float64,
        DataType::Float64,
        DataType::Float64,
        DataType::Float64,
        DataType::Float64,
        DataType::Float64,
        DataType::Int32,
    ];
    let schema = Schema::new(
        MANIFEST_COLUMNS
            .iter()
            .zip(types)
            .map(|(name, data_type)| Field::new(*name, data_type, false))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(StringArray::from(paths)),
            shape(0),
            shape(1),
            shape(2),
            spacing(0),
            spacing(1),
            spacing(2),
            origin(0),
            origin(1),
            origin(2),
            Arc::new(Int32Array::from(datatypes)),
        ],
    )
    .context(ArrowSnafu)?;

    let file = File::create(dest).context(CreateManifestSnafu)?;
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context(ParquetSnafu)?;
    writer.write(&batch).context(ParquetSnafu)?;
    writer.close().context(ParquetSnafu)?;
    Ok(())
}
