//! Post-processing and emission of augmented triples.

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma, PixelWithColorType};
use plant_core::{DatasetLayout, Error, Result, SampleTriple, SourceImage};
use tracing::debug;
use uuid::Uuid;

/// Marker inserted between the source stem and the identifier
pub const AUG_MARKER: &str = "_aug_";

/// Mask pixels strictly above this value become foreground
pub const MASK_THRESHOLD: u8 = 1;

/// Hex digits kept from the random identifier
const ID_LEN: usize = 12;

/// Lossless extension forced for mask and gray outputs
const LOSSLESS_EXTENSION: &str = ".png";

/// Class-scoped destination directories for one source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitTargets {
    pub color_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub gray_dir: PathBuf,
}

impl EmitTargets {
    /// Destinations for a class: color next to the sources, mask and gray
    /// under their own trees.
    pub fn for_class(layout: &DatasetLayout, class_name: &str) -> Self {
        Self {
            color_dir: layout.color_dir.join(class_name),
            mask_dir: layout.mask_dir.join(class_name),
            gray_dir: layout.gray_dir.join(class_name),
        }
    }

    /// Creates the three directories if absent
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.color_dir, &self.mask_dir, &self.gray_dir] {
            fs::create_dir_all(dir).map_err(|e| Error::Write {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Paths of a written triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedTriple {
    pub id: String,
    pub color: PathBuf,
    pub mask: PathBuf,
    pub gray: PathBuf,
}

/// Short random identifier (first 12 hex digits of a v4 UUID)
pub fn new_identifier() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

/// Forces a mask to strict 0/255 values.
pub fn binarize_mask(mask: &mut GrayImage) {
    for pixel in mask.pixels_mut() {
        *pixel = Luma([if pixel[0] > MASK_THRESHOLD { 255 } else { 0 }]);
    }
}

/// Output file names for the color, mask and gray members.
pub fn output_names(source: &SourceImage, id: &str) -> (String, String, String) {
    let base = format!("{}{AUG_MARKER}{id}", source.stem);
    (
        format!("{base}{}", source.extension),
        format!("{base}{LOSSLESS_EXTENSION}"),
        format!("{base}{LOSSLESS_EXTENSION}"),
    )
}

/// Re-binarizes the mask and writes all three members under a fresh identifier.
///
/// Any failed write is returned as [`Error::Write`]; earlier members of
/// the same triple are left on disk.
pub fn emit(
    triple: SampleTriple,
    source: &SourceImage,
    targets: &EmitTargets,
) -> Result<EmittedTriple> {
    emit_with_id(triple, source, targets, new_identifier())
}

/// [`emit`] with a caller-chosen identifier.
pub fn emit_with_id(
    triple: SampleTriple,
    source: &SourceImage,
    targets: &EmitTargets,
    id: String,
) -> Result<EmittedTriple> {
    let SampleTriple { color, mut mask, gray } = triple;
    binarize_mask(&mut mask);

    targets.ensure()?;

    let (color_name, mask_name, gray_name) = output_names(source, &id);
    let emitted = EmittedTriple {
        color: targets.color_dir.join(color_name),
        mask: targets.mask_dir.join(mask_name),
        gray: targets.gray_dir.join(gray_name),
        id,
    };

    save(&color, &emitted.color)?;
    save(&mask, &emitted.mask)?;
    save(&gray, &emitted.gray)?;

    debug!("Wrote augmented triple {} for {}", emitted.id, source.key());
    Ok(emitted)
}

fn save<P>(image: &ImageBuffer<P, Vec<u8>>, path: &Path) -> Result<()>
where
    P: PixelWithColorType<Subpixel = u8>,
{
    image.save(path).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn source(dir: &Path) -> SourceImage {
        SourceImage::from_path("Apple___scab", &dir.join("Apple___scab/leaf_007.JPG")).unwrap()
    }

    fn triple() -> SampleTriple {
        SampleTriple::new(
            RgbImage::from_pixel(6, 4, Rgb([10, 200, 30])),
            GrayImage::from_fn(6, 4, |x, _| Luma([[0u8, 1, 2, 128, 254, 255][x as usize]])),
            GrayImage::from_pixel(6, 4, Luma([90])),
        )
        .unwrap()
    }

    #[test]
    fn test_binarize_threshold() {
        let mut mask = GrayImage::from_fn(4, 1, |x, _| Luma([[0u8, 1, 2, 200][x as usize]]));
        binarize_mask(&mut mask);
        let values: Vec<u8> = mask.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_identifier_shape() {
        let a = new_identifier();
        let b = new_identifier();
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_output_names() {
        let src = source(Path::new("/data/color"));
        let (color, mask, gray) = output_names(&src, "0123456789ab");
        assert_eq!(color, "leaf_007_aug_0123456789ab.JPG");
        assert_eq!(mask, "leaf_007_aug_0123456789ab.png");
        assert_eq!(gray, "leaf_007_aug_0123456789ab.png");
    }

    #[test]
    fn test_emit_writes_three_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(
            temp_dir.path().join("color"),
            temp_dir.path().join("segmented"),
            temp_dir.path().join("grayscale"),
        );
        let src = source(&layout.color_dir);
        let targets = EmitTargets::for_class(&layout, &src.class_name);

        let emitted = emit(triple(), &src, &targets).unwrap();

        assert!(emitted.color.starts_with(temp_dir.path().join("color/Apple___scab")));
        assert!(emitted.mask.starts_with(temp_dir.path().join("segmented/Apple___scab")));
        assert!(emitted.gray.starts_with(temp_dir.path().join("grayscale/Apple___scab")));

        let mask = image::open(&emitted.mask).unwrap().to_luma8();
        let values: Vec<u8> = mask.pixels().take(6).map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 0, 255, 255, 255, 255]);

        let gray = image::open(&emitted.gray).unwrap().to_luma8();
        assert!(gray.pixels().all(|p| p[0] == 90));

        let color = image::open(&emitted.color).unwrap();
        assert_eq!(color.width(), 6);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the class directory should be
        let blocked = temp_dir.path().join("segmented");
        fs::write(&blocked, b"occupied").unwrap();

        let targets = EmitTargets {
            color_dir: temp_dir.path().join("color/Apple___scab"),
            mask_dir: blocked.join("Apple___scab"),
            gray_dir: temp_dir.path().join("grayscale/Apple___scab"),
        };
        let src = source(&temp_dir.path().join("color"));

        let result = emit(triple(), &src, &targets);
        assert!(matches!(result, Err(Error::Write { .. })));
    }
}
