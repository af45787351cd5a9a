use dicom::object::open_file;
use dicom::object::DefaultDicomObject;
use dicom::object::ReadError;
use itertools::Itertools;
use std::cmp::Ordering;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

pub const DICOM_EXTENSIONS: [&str; 2] = ["dcm", "dicom"];
pub const RASTER_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

type IOResult<T> = Result<T, std::io::Error>;

pub fn default_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec})",
            )
            .unwrap(),
    );
    pb
}

fn not_a_directory() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, "Not a directory")
}

/// Case insensitive extension match.
fn has_extension_in(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// List the regular files directly inside a directory that satisfy `predicate`,
/// in natural filename order.
pub fn list_files<P, F>(dir: P, predicate: F) -> IOResult<Vec<PathBuf>>
where
    P: AsRef<Path>,
    F: Fn(&Path) -> bool,
{
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(not_a_directory());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && predicate(&path) {
            files.push(path);
        }
    }
    Ok(files.into_iter().sorted_naturally().collect())
}

/// List the sub-directories of a directory in natural order.
pub fn list_dirs<P: AsRef<Path>>(dir: P) -> IOResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(not_a_directory());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs.into_iter().sorted_naturally().collect())
}

/// Split a string into alternating text and number chunks for natural ordering,
/// so that `slice2` sorts before `slice10`.
#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Number(u128),
    Text(String),
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Chunk::Number(a), Chunk::Number(b)) => a.cmp(b),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
        }
    }
}

fn natural_key(s: &str) -> Vec<Chunk> {
    s.chars()
        .chunk_by(|c| c.is_ascii_digit())
        .into_iter()
        .map(|(is_digit, chunk)| {
            let chunk = chunk.collect::<String>();
            match is_digit {
                true => Chunk::Number(chunk.parse().unwrap_or(u128::MAX)),
                false => Chunk::Text(chunk.to_lowercase()),
            }
        })
        .collect()
}

/// The first run of digits in a string, e.g. `12` for `case12_png`.
/// Leading zeros are kept.
pub fn first_number(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// The run of digits ending a file stem, e.g. `12` for `IMG_0012.dcm`.
pub fn trailing_number<P: AsRef<Path>>(path: P) -> Option<u64> {
    let stem = path.as_ref().file_stem()?.to_string_lossy().to_string();
    let digits = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    digits.chars().rev().collect::<String>().parse().ok()
}

/// All digits of a string joined into one number, or zero when there are none.
pub fn joined_digits(s: &str) -> u128 {
    let digits = s.chars().filter(|c| c.is_ascii_digit()).collect::<String>();
    match digits.is_empty() {
        true => 0,
        false => digits.parse().unwrap_or(u128::MAX),
    }
}

/// The final component of a path as a string, or an empty string.
pub fn file_name_string<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Replace a case-insensitive `from` suffix with `to`, or append `to` when absent.
/// Used to derive `case_png` from `case_dcm`.
pub fn replace_suffix(name: &str, from: &str, to: &str) -> String {
    let cut = name.len().checked_sub(from.len()).filter(|i| {
        name.get(*i..)
            .map(|suffix| suffix.eq_ignore_ascii_case(from))
            .unwrap_or(false)
    });
    match cut {
        Some(i) => format!("{}{}", &name[..i], to),
        None => format!("{}{}", name, to),
    }
}

pub trait NaturalSort<P>
where
    P: AsRef<Path>,
    Self: Iterator<Item = P>,
{
    /// Sort paths by file name, comparing digit runs numerically.
    fn sorted_naturally(&mut self) -> impl Iterator<Item = P> {
        self.map(|p| (natural_key(&file_name_string(&p)), p))
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, p)| p)
    }

    /// Sort paths by the number formed from all digits in the file name.
    /// Ties keep their incoming order.
    fn sorted_by_digits(&mut self) -> impl Iterator<Item = P> {
        self.map(|p| (joined_digits(&file_name_string(&p)), p))
            .sorted_by_key(|(d, _)| *d)
            .map(|(_, p)| p)
    }
}

impl<P: AsRef<Path>, I: Iterator<Item = P>> NaturalSort<P> for I {}

pub trait DicomFileOperations
where
    Self: AsRef<Path>,
{
    /// Check if a file has a DICOM extension.
    fn has_dicom_extension(&self) -> bool {
        has_extension_in(self.as_ref(), &DICOM_EXTENSIONS)
    }

    /// DICOM files (by extension) directly inside a directory, in natural order.
    fn list_dicoms(&self) -> IOResult<Vec<PathBuf>> {
        list_files(self.as_ref(), |p| p.has_dicom_extension())
    }

    /// Read the DICOM file.
    fn dcmread(&self) -> Result<DefaultDicomObject, ReadError> {
        open_file(self.as_ref())
    }
}

impl<P: AsRef<Path>> DicomFileOperations for P {}

pub trait NiftiFileOperations
where
    Self: AsRef<Path>,
{
    /// Check if a file ends in `.nii` or `.nii.gz`.
    fn has_nifti_extension(&self) -> bool {
        let name = file_name_string(self.as_ref()).to_lowercase();
        name.ends_with(".nii") || name.ends_with(".nii.gz")
    }

    fn is_compressed_nifti(&self) -> bool {
        file_name_string(self.as_ref())
            .to_lowercase()
            .ends_with(".nii.gz")
    }

    /// File name with the `.nii` or `.nii.gz` extension removed.
    fn nifti_stem(&self) -> String {
        let name = file_name_string(self.as_ref());
        let lower = name.to_lowercase();
        for ext in [".nii.gz", ".nii"] {
            if lower.ends_with(ext) {
                if let Some(stem) = name.len().checked_sub(ext.len()).and_then(|i| name.get(..i)) {
                    return stem.to_string();
                }
            }
        }
        self.as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// NIfTI files directly inside a directory, in natural order.
    fn list_niftis(&self) -> IOResult<Vec<PathBuf>> {
        list_files(self.as_ref(), |p| p.has_nifti_extension())
    }
}

impl<P: AsRef<Path>> NiftiFileOperations for P {}

pub trait RasterFileOperations
where
    Self: AsRef<Path>,
{
    fn has_png_extension(&self) -> bool {
        has_extension_in(self.as_ref(), &RASTER_EXTENSIONS[..1])
    }

    /// Check if a file has a PNG or JPEG extension.
    fn has_raster_extension(&self) -> bool {
        has_extension_in(self.as_ref(), &RASTER_EXTENSIONS)
    }

    /// PNG files directly inside a directory, in natural order.
    fn list_pngs(&self) -> IOResult<Vec<PathBuf>> {
        list_files(self.as_ref(), |p| p.has_png_extension())
    }

    /// PNG and JPEG files directly inside a directory, in natural order.
    fn list_rasters(&self) -> IOResult<Vec<PathBuf>> {
        list_files(self.as_ref(), |p| p.has_raster_extension())
    }
}

impl<P: AsRef<Path>> RasterFileOperations for P {}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use tempfile::NamedTempFile;

    #[rstest]
    #[case::no_extension("test", false)]
    #[case::wrong_extension("test.txt", false)]
    #[case::dcm_extension("test.dcm", true)]
    #[case::dicom_extension("test.dicom", true)]
    #[case::dcm_extension_uppercase("test.DCM", true)]
    #[case::mixed_case("test.DiCoM", true)]
    fn test_has_dicom_extension(#[case] path: &str, #[case] expected: bool) {
        let path = PathBuf::from(path);
        assert_eq!(path.has_dicom_extension(), expected);
    }

    #[rstest]
    #[case("brain.nii", true, "brain")]
    #[case("brain.nii.gz", true, "brain")]
    #[case("path/to/Case.NII.GZ", true, "Case")]
    #[case("brain.gz", false, "brain")]
    #[case("brain.png", false, "brain")]
    fn test_nifti_extension(#[case] path: &str, #[case] expected: bool, #[case] stem: &str) {
        let path = PathBuf::from(path);
        assert_eq!(path.has_nifti_extension(), expected);
        assert_eq!(path.nifti_stem(), stem);
    }

    #[rstest]
    #[case("slice.png", true, true)]
    #[case("slice.PNG", true, true)]
    #[case("slice.jpg", false, true)]
    #[case("slice.jpeg", false, true)]
    #[case("slice.tiff", false, false)]
    fn test_raster_extension(#[case] path: &str, #[case] png: bool, #[case] raster: bool) {
        let path = PathBuf::from(path);
        assert_eq!(path.has_png_extension(), png);
        assert_eq!(path.has_raster_extension(), raster);
    }

    #[test]
    fn test_list_dicoms() {
        let temp_dir = tempfile::tempdir().unwrap();

        let dicom_path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let dicom_dest = temp_dir.path().join("test.dcm");
        std::fs::copy(&dicom_path, &dicom_dest).unwrap();

        let text_path = temp_dir.path().join("test.txt");
        std::fs::write(&text_path, "not a DICOM file").unwrap();

        let sub_dir = temp_dir.path().join("subdir");
        std::fs::create_dir(&sub_dir).unwrap();
        let sub_dicom = sub_dir.join("sub.dcm");
        std::fs::copy(&dicom_path, &sub_dicom).unwrap();

        // Listing is not recursive
        let listed = temp_dir.path().list_dicoms().unwrap();
        assert_eq!(listed, vec![dicom_dest]);
    }

    #[test]
    fn test_list_files_natural_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in ["slice10.png", "slice2.png", "Slice1.png", "notes.txt"] {
            std::fs::write(temp_dir.path().join(name), "test").unwrap();
        }
        let names = temp_dir
            .path()
            .list_pngs()
            .unwrap()
            .iter()
            .map(file_name_string)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Slice1.png", "slice2.png", "slice10.png"]);
    }

    #[test]
    fn test_list_files_not_a_directory() {
        let temp = NamedTempFile::new().unwrap();
        assert!(temp.path().list_pngs().is_err());
    }

    #[test]
    fn test_sorted_by_digits() {
        let paths = vec!["b_12.png", "a_3.png", "img.png", "c_1_0.png"];
        let sorted = paths.into_iter().sorted_by_digits().collect::<Vec<_>>();
        assert_eq!(sorted, vec!["img.png", "a_3.png", "c_1_0.png", "b_12.png"]);
    }

    #[rstest]
    #[case("case12_png", Some("12"))]
    #[case("12_png", Some("12"))]
    #[case("a1b22", Some("1"))]
    #[case("007_png", Some("007"))]
    #[case("123456789012345678901234567890", Some("123456789012345678901234567890"))]
    #[case("png", None)]
    fn test_first_number(#[case] s: &str, #[case] expected: Option<&str>) {
        assert_eq!(first_number(s), expected);
    }

    #[rstest]
    #[case("IMG_0012.dcm", Some(12))]
    #[case("dir/slice-7.dcm", Some(7))]
    #[case("3_slice.dcm", None)]
    #[case("slice.dcm", None)]
    fn test_trailing_number(#[case] path: &str, #[case] expected: Option<u64>) {
        assert_eq!(trailing_number(path), expected);
    }

    #[rstest]
    #[case("39_dcm", "_dcm", "_png", "39_png")]
    #[case("39_DCM", "_dcm", "_png", "39_png")]
    #[case("scan", "_dcm", "_png", "scan_png")]
    fn test_replace_suffix(
        #[case] name: &str,
        #[case] from: &str,
        #[case] to: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(replace_suffix(name, from, to), expected);
    }
}
