use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::errors::dicom::{
    EmptySeriesSnafu, FileMetaSnafu, IOSnafu, PixelDataSnafu, ReadSnafu, SeriesGeometrySnafu,
    SliceSizeMismatchSnafu, UnsupportedPixelLayoutSnafu, WriteSnafu,
};
use crate::errors::DicomError;
use crate::file::{trailing_number, DicomFileOperations};
use crate::geometry::dicom::put_decimals;
use crate::geometry::{series_affine, SliceGeometry};
use crate::volume::{SliceAxis, Volume};

/// Root for UUID derived UIDs.
pub const UUID_UID_ROOT: &str = "2.25.";
const MAX_UID_LENGTH: usize = 64;

/// ITU-R BT.601 luma weights.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Generate a globally unique UID below `root` (e.g. `"1.2.826.0.1.3680043.8.498."`).
pub fn generate_uid(root: &str) -> String {
    let mut uid = format!("{}{}", root, Uuid::new_v4().as_u128());
    uid.truncate(MAX_UID_LENGTH);
    uid
}

/// Decoded frames of a DICOM object, as stored values without any rescale.
#[derive(Debug, Clone)]
pub struct PixelFrames {
    pub bits_allocated: u16,
    /// One `[row, column, sample]` array per frame.
    pub frames: Vec<Array3<f32>>,
}

impl PixelFrames {
    pub fn samples_per_pixel(&self) -> usize {
        self.frames.first().map(|f| f.len_of(Axis(2))).unwrap_or(0)
    }

    /// Frames as single channel images. Color frames are converted to luma.
    pub fn gray_frames(&self) -> Vec<Array2<f32>> {
        self.frames.iter().map(|f| to_gray(f.view())).collect()
    }
}

/// Convert a `[row, column, sample]` frame to a single channel.
pub fn to_gray(frame: ArrayView3<f32>) -> Array2<f32> {
    match frame.len_of(Axis(2)) {
        3 => frame.map_axis(Axis(2), |px| {
            px.iter()
                .zip(LUMA_WEIGHTS.iter())
                .map(|(v, w)| v * w)
                .sum::<f32>()
        }),
        _ => frame.index_axis(Axis(2), 0).to_owned(),
    }
}

/// Decode every frame of a DICOM object.
pub fn decode_frames(file: &DefaultDicomObject) -> Result<PixelFrames, DicomError> {
    let pixel = file.decode_pixel_data().context(PixelDataSnafu)?;
    let rows = pixel.rows();
    let columns = pixel.columns();
    let samples_per_pixel = pixel.samples_per_pixel();
    let number_of_frames = pixel.number_of_frames() as usize;
    ensure!(
        (samples_per_pixel == 1 || samples_per_pixel == 3) && rows > 0 && columns > 0,
        UnsupportedPixelLayoutSnafu {
            samples_per_pixel,
            rows,
            columns,
        }
    );

    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let values: Vec<f32> = pixel
        .to_vec_with_options(&options)
        .context(PixelDataSnafu)?;

    let shape = (rows as usize, columns as usize, samples_per_pixel as usize);
    let frame_len = shape.0 * shape.1 * shape.2;
    let frames = values
        .chunks_exact(frame_len)
        .take(number_of_frames.max(1))
        .map(|chunk| Array3::from_shape_vec(shape, chunk.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DicomError::Other {
            message: e.to_string(),
        })?;
    ensure!(
        !frames.is_empty(),
        UnsupportedPixelLayoutSnafu {
            samples_per_pixel,
            rows,
            columns,
        }
    );

    Ok(PixelFrames {
        bits_allocated: pixel.bits_allocated(),
        frames,
    })
}

/// How the slices of a series folder are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SeriesOrder {
    /// By Instance Number, ties broken by file name.
    #[default]
    InstanceNumber,
    /// By file name, comparing digit runs numerically.
    FileName,
    /// By the number ending each file name. Falls back to Instance Number
    /// when any file name lacks one.
    TrailingNumber,
}

/// A folder of single slice DICOM files stacked into a volume.
#[derive(Debug, Clone)]
pub struct DicomSeries {
    pub volume: Volume<f32>,
    pub paths: Vec<PathBuf>,
    pub geometry: Vec<SliceGeometry>,
}

/// Read a folder of DICOM slices (`*.dcm`, `*.dicom`) into a volume with a reconstructed affine.
///
/// Every slice must have the same number of rows and columns. Color slices are
/// converted to luma and multi-frame files contribute one slice per frame.
pub fn read_series<P: AsRef<Path>>(dir: P, order: SeriesOrder) -> Result<DicomSeries, DicomError> {
    let dir = dir.as_ref();
    let paths = dir.list_dicoms().context(IOSnafu { path: dir })?;
    ensure!(!paths.is_empty(), EmptySeriesSnafu { path: dir });

    let mut files = paths
        .into_iter()
        .map(|path| {
            let file = path.dcmread().context(ReadSnafu { path: &path })?;
            let geometry = SliceGeometry::try_from(&file)?;
            Ok((path, file, geometry))
        })
        .collect::<Result<Vec<_>, DicomError>>()?;
    let trailing = files
        .iter()
        .map(|(path, _, _)| trailing_number(path))
        .collect::<Option<Vec<_>>>();
    match (order, trailing) {
        (SeriesOrder::FileName, _) => {}
        (SeriesOrder::TrailingNumber, Some(numbers)) => {
            let mut numbered = numbers.into_iter().zip(files).collect::<Vec<_>>();
            numbered.sort_by_key(|(number, _)| *number);
            files = numbered.into_iter().map(|(_, file)| file).collect();
        }
        _ => {
            // Stable, so equal instance numbers keep file name order
            files.sort_by_key(|(_, _, geometry)| geometry.instance_number);
        }
    }

    let mut slices = Vec::new();
    let mut geometry = Vec::new();
    let mut sources = Vec::new();
    for (path, file, slice_geometry) in files {
        let frames = decode_frames(&file)?.gray_frames();
        debug!("Read {} frame(s) from {}", frames.len(), path.display());
        for (index, frame) in frames.into_iter().enumerate() {
            if let Some(first) = slices.first() {
                let first: &Array2<f32> = first;
                ensure!(
                    first.dim() == frame.dim(),
                    SliceSizeMismatchSnafu {
                        path: &path,
                        rows: frame.nrows() as u32,
                        columns: frame.ncols() as u32,
                        expected_rows: first.nrows() as u32,
                        expected_columns: first.ncols() as u32,
                    }
                );
            }
            let mut frame_geometry = slice_geometry.clone();
            if index > 0 {
                frame_geometry.position = None;
            }
            slices.push(frame);
            geometry.push(frame_geometry);
            sources.push(path.clone());
        }
    }

    let affine = series_affine(&geometry).context(SeriesGeometrySnafu)?;
    let volume =
        Volume::from_slices(&slices, SliceAxis::Z, affine).map_err(|e| DicomError::Other {
            message: e.to_string(),
        })?;
    Ok(DicomSeries {
        volume,
        paths: sources,
        geometry,
    })
}

/// Identifying attributes shared by every slice written for one series.
#[derive(Debug, Clone)]
pub struct SeriesInfo {
    pub sop_class_uid: &'static str,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    pub modality: String,
    pub patient_name: String,
    pub patient_id: String,
    pub study_description: Option<String>,
    pub series_description: Option<String>,
    pub body_part_examined: Option<String>,
    pub image_type: Option<[&'static str; 2]>,
}

impl SeriesInfo {
    /// Fresh study, series and frame of reference UIDs below `uid_root`.
    pub fn new(sop_class_uid: &'static str, modality: &str, uid_root: &str) -> Self {
        SeriesInfo {
            sop_class_uid,
            study_instance_uid: generate_uid(uid_root),
            series_instance_uid: generate_uid(uid_root),
            frame_of_reference_uid: generate_uid(uid_root),
            modality: modality.to_string(),
            patient_name: "Anonymous".to_string(),
            patient_id: "000001".to_string(),
            study_description: None,
            series_description: None,
            body_part_examined: None,
            image_type: None,
        }
    }

    /// Secondary Capture series as written for converted NIfTI volumes.
    pub fn secondary_capture() -> Self {
        SeriesInfo {
            image_type: Some(["ORIGINAL", "PRIMARY"]),
            ..Self::new(uids::SECONDARY_CAPTURE_IMAGE_STORAGE, "OT", UUID_UID_ROOT)
        }
    }
}

/// Pixel data of one slice, indexed `[row, column(, sample)]`.
#[derive(Debug, Clone, Copy)]
pub enum SlicePixels<'a> {
    /// Signed 16 bit monochrome.
    I16(ArrayView2<'a, i16>),
    /// Unsigned 16 bit monochrome.
    U16(ArrayView2<'a, u16>),
    /// 8 bit interleaved RGB.
    Rgb8(ArrayView3<'a, u8>),
}

impl SlicePixels<'_> {
    fn dim(&self) -> (usize, usize) {
        match self {
            SlicePixels::I16(a) => a.dim(),
            SlicePixels::U16(a) => a.dim(),
            SlicePixels::Rgb8(a) => (a.len_of(Axis(0)), a.len_of(Axis(1))),
        }
    }

    fn samples_per_pixel(&self) -> u16 {
        match self {
            SlicePixels::Rgb8(_) => 3,
            _ => 1,
        }
    }

    fn bits_allocated(&self) -> u16 {
        match self {
            SlicePixels::Rgb8(_) => 8,
            _ => 16,
        }
    }

    fn pixel_representation(&self) -> u16 {
        match self {
            SlicePixels::I16(_) => 1,
            _ => 0,
        }
    }

    fn photometric_interpretation(&self) -> &'static str {
        match self {
            SlicePixels::Rgb8(_) => "RGB",
            _ => "MONOCHROME2",
        }
    }

    /// Little endian pixel bytes, padded to even length.
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = match self {
            SlicePixels::I16(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>(),
            SlicePixels::U16(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>(),
            SlicePixels::Rgb8(a) => a.iter().copied().collect::<Vec<_>>(),
        };
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        bytes
    }
}

fn put_str(obj: &mut InMemDicomObject, tag: dicom::core::Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn put_u16(obj: &mut InMemDicomObject, tag: dicom::core::Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

/// Build a single slice DICOM file with the given series attributes, geometry and pixels.
pub fn build_slice(
    info: &SeriesInfo,
    geometry: &SliceGeometry,
    pixels: SlicePixels,
    rescale: Option<(f64, f64)>,
) -> Result<DefaultDicomObject, DicomError> {
    let (rows, columns) = pixels.dim();
    let samples_per_pixel = pixels.samples_per_pixel();
    let (rows, columns) = match (u16::try_from(rows), u16::try_from(columns)) {
        (Ok(r), Ok(c)) if r > 0 && c > 0 => (r, c),
        _ => {
            return UnsupportedPixelLayoutSnafu {
                samples_per_pixel,
                rows: rows as u32,
                columns: columns as u32,
            }
            .fail()
        }
    };
    let sop_instance_uid = generate_uid(UUID_UID_ROOT);

    let mut obj = InMemDicomObject::new_empty();
    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, info.sop_class_uid);
    put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid);
    put_str(&mut obj, tags::STUDY_INSTANCE_UID, VR::UI, &info.study_instance_uid);
    put_str(&mut obj, tags::SERIES_INSTANCE_UID, VR::UI, &info.series_instance_uid);
    put_str(
        &mut obj,
        tags::FRAME_OF_REFERENCE_UID,
        VR::UI,
        &info.frame_of_reference_uid,
    );
    put_str(&mut obj, tags::MODALITY, VR::CS, &info.modality);
    put_str(&mut obj, tags::PATIENT_NAME, VR::PN, &info.patient_name);
    put_str(&mut obj, tags::PATIENT_ID, VR::LO, &info.patient_id);
    put_str(&mut obj, tags::SERIES_NUMBER, VR::IS, "1");
    if let Some(description) = &info.study_description {
        put_str(&mut obj, tags::STUDY_DESCRIPTION, VR::LO, description);
    }
    if let Some(description) = &info.series_description {
        put_str(&mut obj, tags::SERIES_DESCRIPTION, VR::LO, description);
    }
    if let Some(body_part) = &info.body_part_examined {
        put_str(&mut obj, tags::BODY_PART_EXAMINED, VR::CS, body_part);
    }
    if let Some(image_type) = info.image_type {
        obj.put(DataElement::new(
            tags::IMAGE_TYPE,
            VR::CS,
            PrimitiveValue::Strs(image_type.iter().map(|s| s.to_string()).collect()),
        ));
    }

    geometry.write(&mut obj);

    put_u16(&mut obj, tags::ROWS, rows);
    put_u16(&mut obj, tags::COLUMNS, columns);
    put_u16(&mut obj, tags::SAMPLES_PER_PIXEL, samples_per_pixel);
    put_str(
        &mut obj,
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        pixels.photometric_interpretation(),
    );
    if samples_per_pixel == 3 {
        put_u16(&mut obj, tags::PLANAR_CONFIGURATION, 0);
    }
    let bits = pixels.bits_allocated();
    put_u16(&mut obj, tags::BITS_ALLOCATED, bits);
    put_u16(&mut obj, tags::BITS_STORED, bits);
    put_u16(&mut obj, tags::HIGH_BIT, bits - 1);
    put_u16(
        &mut obj,
        tags::PIXEL_REPRESENTATION,
        pixels.pixel_representation(),
    );
    if let Some((slope, intercept)) = rescale {
        put_decimals(&mut obj, tags::RESCALE_SLOPE, &[slope]);
        put_decimals(&mut obj, tags::RESCALE_INTERCEPT, &[intercept]);
    }
    let vr = if bits > 8 { VR::OW } else { VR::OB };
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        vr,
        PrimitiveValue::from(pixels.to_bytes()),
    ));

    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(info.sop_class_uid)
            .media_storage_sop_instance_uid(sop_instance_uid),
    )
    .context(FileMetaSnafu)
}

/// Write a DICOM file, creating nothing but the file itself.
pub fn write_slice<P: AsRef<Path>>(path: P, file: &DefaultDicomObject) -> Result<(), DicomError> {
    let path = path.as_ref();
    file.write_to_file(path).context(WriteSnafu { path })
}

/// Write every k-slice of a signed 16 bit volume into `dir`, one file per slice named by
/// `file_name(k)`. Geometry is derived from the volume affine.
pub fn write_series<P, F>(
    dir: P,
    info: &SeriesInfo,
    volume: &Volume<i16>,
    file_name: F,
) -> Result<Vec<PathBuf>, DicomError>
where
    P: AsRef<Path>,
    F: Fn(usize) -> String,
{
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).context(IOSnafu { path: dir })?;
    volume
        .slices(SliceAxis::Z)
        .enumerate()
        .map(|(k, slice)| {
            let geometry =
                SliceGeometry::from_affine(&volume.affine, k).context(SeriesGeometrySnafu)?;
            let file = build_slice(info, &geometry, SlicePixels::I16(slice), None)?;
            let path = dir.join(file_name(k));
            write_slice(&path, &file)?;
            Ok(path)
        })
        .collect()
}
