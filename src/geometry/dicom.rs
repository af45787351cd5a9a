use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileDicomObject, InMemDicomObject};
use nalgebra::Vector3;
use snafu::{OptionExt, ResultExt};

use crate::errors::dicom::{ConvertValueSnafu, InvalidValueSnafu};
use crate::errors::{DicomError, GeometryError};
use crate::geometry::Affine;

const MAX_DS_LENGTH: usize = 16;
const MIN_SLICE_STEP: f64 = 1e-6;

/// Convert between NIfTI (RAS+) and DICOM patient (LPS+) coordinates. The map is its own inverse.
pub fn flip_ras_lps(v: Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-v.x, -v.y, v.z)
}

/// Per-slice spatial tags of a DICOM image.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceGeometry {
    /// Row spacing followed by column spacing, in mm.
    pub pixel_spacing: [f64; 2],
    /// Row direction cosines followed by column direction cosines, LPS.
    pub orientation: Option<[f64; 6]>,
    /// Center of the first transmitted pixel, LPS.
    pub position: Option<[f64; 3]>,
    pub slice_thickness: Option<f64>,
    pub instance_number: i32,
}

impl Default for SliceGeometry {
    fn default() -> Self {
        SliceGeometry {
            pixel_spacing: [1.0, 1.0],
            orientation: None,
            position: None,
            slice_thickness: None,
            instance_number: 0,
        }
    }
}

impl SliceGeometry {
    /// Geometry of slice `index` (along the third voxel axis) of a volume with the given affine.
    pub fn from_affine(affine: &Affine, index: usize) -> Result<Self, GeometryError> {
        let [c0, c1, c2] = [affine.column(0)?, affine.column(1)?, affine.column(2)?];
        let row = flip_ras_lps(c0.normalize());
        let col = flip_ras_lps(c1.normalize());
        let position = flip_ras_lps(affine.origin() + c2 * index as f64);
        Ok(SliceGeometry {
            pixel_spacing: [c1.norm(), c0.norm()],
            orientation: Some([row.x, row.y, row.z, col.x, col.y, col.z]),
            position: Some([position.x, position.y, position.z]),
            slice_thickness: Some(c2.norm()),
            instance_number: index as i32 + 1,
        })
    }

    /// Write the geometry tags into a DICOM object.
    pub fn write(&self, obj: &mut InMemDicomObject) {
        put_decimals(obj, tags::PIXEL_SPACING, &self.pixel_spacing);
        if let Some(orientation) = self.orientation {
            put_decimals(obj, tags::IMAGE_ORIENTATION_PATIENT, &orientation);
        }
        if let Some(position) = self.position {
            put_decimals(obj, tags::IMAGE_POSITION_PATIENT, &position);
            put_decimals(obj, tags::SLICE_LOCATION, &position[2..]);
        }
        if let Some(thickness) = self.slice_thickness {
            put_decimals(obj, tags::SLICE_THICKNESS, &[thickness]);
            put_decimals(obj, tags::SPACING_BETWEEN_SLICES, &[thickness]);
        }
        obj.put(DataElement::new(
            tags::INSTANCE_NUMBER,
            VR::IS,
            PrimitiveValue::from(self.instance_number.to_string()),
        ));
    }
}

impl TryFrom<&FileDicomObject<InMemDicomObject>> for SliceGeometry {
    type Error = DicomError;

    fn try_from(file: &FileDicomObject<InMemDicomObject>) -> Result<Self, Self::Error> {
        // Pixel Spacing first, then Imager Pixel Spacing. First value is row spacing (y)
        let pixel_spacing = match read_decimals(file, tags::PIXEL_SPACING, "Pixel Spacing")? {
            Some(values) => Some(values),
            None => read_decimals(file, tags::IMAGER_PIXEL_SPACING, "Imager Pixel Spacing")?,
        };
        let pixel_spacing = match pixel_spacing.as_deref() {
            Some([y, x, ..]) if *y > 0.0 && *x > 0.0 => [*y, *x],
            Some([s]) if *s > 0.0 => [*s, *s],
            _ => [1.0, 1.0],
        };

        let orientation = read_decimals(
            file,
            tags::IMAGE_ORIENTATION_PATIENT,
            "Image Orientation Patient",
        )?
        .map(|v| to_array::<6>(v, "Image Orientation Patient"))
        .transpose()?;
        let position = read_decimals(file, tags::IMAGE_POSITION_PATIENT, "Image Position Patient")?
            .map(|v| to_array::<3>(v, "Image Position Patient"))
            .transpose()?;
        let slice_thickness = read_decimals(file, tags::SLICE_THICKNESS, "Slice Thickness")?
            .and_then(|v| v.first().copied())
            .filter(|t| *t > 0.0);
        let instance_number = file
            .get(tags::INSTANCE_NUMBER)
            .and_then(|e| e.value().to_int::<i32>().ok())
            .unwrap_or(0);

        Ok(SliceGeometry {
            pixel_spacing,
            orientation,
            position,
            slice_thickness,
            instance_number,
        })
    }
}

/// Reconstruct the volume affine of a series from its slices, ordered along the slice axis.
///
/// Without orientation and position tags the affine is a diagonal of the column spacing,
/// row spacing and slice thickness.
pub fn series_affine(slices: &[SliceGeometry]) -> Result<Affine, GeometryError> {
    let first = slices.first().ok_or(GeometryError::EmptySeries)?;
    let [row_spacing, col_spacing] = first.pixel_spacing;
    let thickness = first.slice_thickness.unwrap_or(1.0);

    let (orientation, position) = match (first.orientation, first.position) {
        (Some(orientation), Some(position)) => (orientation, position),
        _ => return Affine::diagonal([col_spacing, row_spacing, thickness]),
    };

    let row = flip_ras_lps(Vector3::new(orientation[0], orientation[1], orientation[2]));
    let col = flip_ras_lps(Vector3::new(orientation[3], orientation[4], orientation[5]));
    let normal = row.cross(&col);
    if row.norm() < MIN_SLICE_STEP || col.norm() < MIN_SLICE_STEP || normal.norm() < MIN_SLICE_STEP
    {
        return Err(GeometryError::InvalidOrientation { orientation });
    }
    let origin = flip_ras_lps(Vector3::from(position));

    let step = match slices.last().and_then(|s| s.position) {
        Some(last) if slices.len() > 1 => {
            let step = (flip_ras_lps(Vector3::from(last)) - origin) / (slices.len() - 1) as f64;
            (step.norm() > MIN_SLICE_STEP).then_some(step)
        }
        _ => None,
    }
    .unwrap_or_else(|| normal.normalize() * thickness);

    Affine::from_columns(
        [row.normalize() * col_spacing, col.normalize() * row_spacing, step],
        origin,
    )
}

/// Format a decimal string (DS) value within the 16 character limit.
pub fn format_decimal(value: f64) -> String {
    for precision in (0..=8).rev() {
        let formatted = format!("{:.*}", precision, value);
        let trimmed = if formatted.contains('.') {
            formatted.trim_end_matches('0').trim_end_matches('.')
        } else {
            formatted.as_str()
        };
        let trimmed = if trimmed == "-0" { "0" } else { trimmed };
        if trimmed.len() <= MAX_DS_LENGTH {
            return trimmed.to_string();
        }
    }
    format!("{:.0}", value)
}

pub(crate) fn put_decimals(obj: &mut InMemDicomObject, tag: Tag, values: &[f64]) {
    obj.put(DataElement::new(
        tag,
        VR::DS,
        PrimitiveValue::Strs(values.iter().map(|v| format_decimal(*v)).collect()),
    ));
}

/// Read a backslash separated numeric property. Missing or empty properties are `None`.
pub(crate) fn read_decimals(
    file: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<Option<Vec<f64>>, DicomError> {
    let Some(element) = file.get(tag) else {
        return Ok(None);
    };
    let value = element.value().to_str().context(ConvertValueSnafu { name })?;
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if value.is_empty() {
        return Ok(None);
    }
    value
        .split('\\')
        .map(|s| {
            s.trim().parse::<f64>().ok().context(InvalidValueSnafu {
                name,
                value: value.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn to_array<const N: usize>(values: Vec<f64>, name: &'static str) -> Result<[f64; N], DicomError> {
    let len = values.len();
    values
        .try_into()
        .ok()
        .context(InvalidValueSnafu {
            name,
            value: format!("{} values, expected {}", len, N),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::object::open_file;
    use rstest::rstest;

    fn oblique_affine() -> Affine {
        let angle: f64 = 0.25;
        Affine::from_spacing_orientation(
            [0.7, 0.6, 2.0],
            [angle.cos(), 0.0, angle.sin(), 0.0, 1.0, 0.0],
            [12.5, -40.0, 88.0],
        )
        .unwrap()
    }

    #[test]
    fn test_read_ct_small() {
        let dicom_file_path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let file = open_file(&dicom_file_path).unwrap();
        let geometry = SliceGeometry::try_from(&file).unwrap();
        assert!((geometry.pixel_spacing[0] - 0.661468).abs() < 1e-6);
        assert!((geometry.pixel_spacing[1] - 0.661468).abs() < 1e-6);
        assert_eq!(geometry.orientation, Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]));
        assert!(geometry.position.is_some());
        assert_eq!(geometry.slice_thickness, Some(5.0));
    }

    #[test]
    fn test_from_affine_flips_to_lps() {
        let affine = Affine::from_spacing_orientation(
            [0.5, 0.75, 3.0],
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [10.0, 20.0, 30.0],
        )
        .unwrap();
        let geometry = SliceGeometry::from_affine(&affine, 2).unwrap();
        assert_eq!(geometry.pixel_spacing, [0.75, 0.5]);
        assert_eq!(geometry.orientation, Some([-1.0, 0.0, 0.0, 0.0, -1.0, 0.0]));
        assert_eq!(geometry.position, Some([-10.0, -20.0, 36.0]));
        assert_eq!(geometry.slice_thickness, Some(3.0));
        assert_eq!(geometry.instance_number, 3);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(7)]
    fn test_series_round_trip(#[case] num_slices: usize) {
        let affine = oblique_affine();
        let slices = (0..num_slices)
            .map(|k| SliceGeometry::from_affine(&affine, k).unwrap())
            .collect::<Vec<_>>();
        let actual = series_affine(&slices).unwrap();
        assert!(actual.approx_eq(&affine, 1e-9), "{}", actual);
    }

    #[test]
    fn test_series_without_position() {
        let slices = vec![SliceGeometry {
            pixel_spacing: [0.4, 0.3],
            slice_thickness: Some(2.5),
            ..Default::default()
        }];
        let actual = series_affine(&slices).unwrap();
        assert_eq!(actual.spacing(), [0.3, 0.4, 2.5]);
        assert_eq!(actual.origin(), Vector3::zeros());
    }

    #[test]
    fn test_empty_series() {
        assert!(matches!(
            series_affine(&[]),
            Err(GeometryError::EmptySeries)
        ));
    }

    #[test]
    fn test_write_read_round_trip() {
        let geometry = SliceGeometry::from_affine(&oblique_affine(), 4).unwrap();
        let mut obj = InMemDicomObject::new_empty();
        geometry.write(&mut obj);
        let file = obj
            .with_meta(
                dicom::object::FileMetaTableBuilder::new()
                    .transfer_syntax(dicom::dictionary_std::uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(
                        dicom::dictionary_std::uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
                    )
                    .media_storage_sop_instance_uid("2.25.1"),
            )
            .unwrap();
        let actual = SliceGeometry::try_from(&file).unwrap();
        assert_eq!(actual.instance_number, 5);
        for (a, b) in actual
            .position
            .unwrap()
            .iter()
            .zip(geometry.position.unwrap().iter())
        {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[rstest]
    #[case(0.5, "0.5")]
    #[case(-0.0, "0")]
    #[case(2.0, "2")]
    #[case(-158.135803, "-158.135803")]
    #[case(123456.123456789, "123456.12345679")]
    fn test_format_decimal(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_decimal(value), expected);
    }
}
