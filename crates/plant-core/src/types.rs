//! Core type definitions for the plant augmentation pipeline.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A class/label directory (e.g. "Tomato___Late_blight")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClassDirectory {
    /// Label, taken from the directory name
    pub name: String,
    /// Absolute path of the directory under the color root
    pub path: PathBuf,
}

impl ClassDirectory {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// One candidate source color image inside a class directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceImage {
    /// Class (label) the image belongs to
    pub class_name: String,
    /// Full path of the color image
    pub path: PathBuf,
    /// File name including extension, the key into precomputed trees
    pub file_name: String,
    /// File name without extension
    pub stem: String,
    /// Extension including the leading dot, case preserved (".JPG")
    pub extension: String,
}

impl SourceImage {
    /// Builds a source image from a path, returning `None` for paths
    /// without a usable file name.
    pub fn from_path(class_name: impl Into<String>, path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let stem = path.file_stem()?.to_str()?.to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        Some(Self {
            class_name: class_name.into(),
            path: path.to_path_buf(),
            file_name,
            stem,
            extension,
        })
    }

    /// Class-relative key ("<class>/<file name>"), stable across machines
    pub fn key(&self) -> String {
        format!("{}/{}", self.class_name, self.file_name)
    }
}

/// Where an auxiliary (mask or gray) representation comes from.
///
/// Resolved once per source image by the loader; derivation is the
/// fallback branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxiliarySource {
    /// A precomputed artifact exists at this path
    Precomputed(PathBuf),
    /// Nothing precomputed, derive from the color image
    Derive,
}

impl AuxiliarySource {
    /// Resolves the keyed path: precomputed if a file exists there.
    pub fn resolve(candidate: PathBuf) -> Self {
        if candidate.is_file() {
            AuxiliarySource::Precomputed(candidate)
        } else {
            AuxiliarySource::Derive
        }
    }
}

/// How an auxiliary image was actually obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryOrigin {
    Loaded,
    Derived,
}

/// Pixel-aligned color, mask and grayscale images of one sample.
///
/// All three members always share width and height.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTriple {
    pub color: RgbImage,
    pub mask: GrayImage,
    pub gray: GrayImage,
}

impl SampleTriple {
    /// Creates a triple, rejecting members whose dimensions disagree.
    pub fn new(color: RgbImage, mask: GrayImage, gray: GrayImage) -> Result<Self> {
        let dims = color.dimensions();
        if mask.dimensions() != dims || gray.dimensions() != dims {
            return Err(Error::InvalidArgument(format!(
                "triple members must share dimensions: color {:?}, mask {:?}, gray {:?}",
                dims,
                mask.dimensions(),
                gray.dimensions()
            )));
        }
        Ok(Self { color, mask, gray })
    }

    /// Shared (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    /// Checks the alignment invariant (used after transforms in debug builds)
    pub fn is_aligned(&self) -> bool {
        let dims = self.color.dimensions();
        self.mask.dimensions() == dims && self.gray.dimensions() == dims
    }
}

/// Image dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageDimensions {
    /// Creates new image dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Standard ImageNet input size (224x224)
    pub fn imagenet() -> Self {
        Self::new(224, 224)
    }
}

impl std::fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageDimensions {
    type Err = Error;

    /// Parses "WxH" or a single number for square sizes.
    fn from_str(s: &str) -> Result<Self> {
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| Error::InvalidArgument(format!("invalid dimension '{v}': {e}")))
        };

        let dims = match s.split_once(|c: char| c == 'x' || c == 'X') {
            Some((w, h)) => Self::new(parse(w)?, parse(h)?),
            None => {
                let side = parse(s)?;
                Self::new(side, side)
            }
        };

        if dims.width == 0 || dims.height == 0 {
            return Err(Error::InvalidArgument(format!("dimensions must be non-zero, got {dims}")));
        }
        Ok(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_image_from_path() {
        let path = Path::new("/data/Tomato___healthy/leaf01.JPG");
        let src = SourceImage::from_path("Tomato___healthy", path).unwrap();
        assert_eq!(src.file_name, "leaf01.JPG");
        assert_eq!(src.stem, "leaf01");
        assert_eq!(src.extension, ".JPG");
        assert_eq!(src.key(), "Tomato___healthy/leaf01.JPG");
    }

    #[test]
    fn test_triple_rejects_mismatched_members() {
        let color = RgbImage::new(10, 8);
        let mask = GrayImage::new(10, 8);
        let gray = GrayImage::new(8, 10);
        assert!(SampleTriple::new(color, mask, gray).is_err());
    }

    #[test]
    fn test_triple_dimensions() {
        let triple =
            SampleTriple::new(RgbImage::new(12, 7), GrayImage::new(12, 7), GrayImage::new(12, 7))
                .unwrap();
        assert_eq!(triple.dimensions(), (12, 7));
        assert!(triple.is_aligned());
    }

    #[test]
    fn test_auxiliary_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("leaf.png");
        std::fs::write(&present, b"placeholder").unwrap();

        assert_eq!(
            AuxiliarySource::resolve(present.clone()),
            AuxiliarySource::Precomputed(present)
        );
        assert_eq!(
            AuxiliarySource::resolve(temp_dir.path().join("missing.png")),
            AuxiliarySource::Derive
        );
    }

    #[test]
    fn test_image_dimensions_parse() {
        assert_eq!("256x192".parse::<ImageDimensions>().unwrap(), ImageDimensions::new(256, 192));
        assert_eq!("128".parse::<ImageDimensions>().unwrap(), ImageDimensions::new(128, 128));
        assert!("0x10".parse::<ImageDimensions>().is_err());
        assert!("wide".parse::<ImageDimensions>().is_err());
    }

    #[test]
    fn test_image_dimensions() {
        let dims = ImageDimensions::imagenet();
        assert_eq!(dims.width, 224);
        assert_eq!(dims.height, 224);
        assert_eq!(dims.to_string(), "224x224");
    }
}
