//! Foliage segmentation pass.
//!
//! Writes a foliage cut-out and a grayscale copy of every source image
//! under the mask and gray roots, keyed by the same class-relative path.
//! A later augmentation run picks these up as precomputed artifacts.

use std::fs;
use std::path::Path;

use image::ImageBuffer;
use plant_core::{DatasetLayout, Error, FoliageThreshold, Result};
use tracing::{info, warn};

use crate::colorspace::rgb_to_gray;
use crate::derive::{foliage_cutout, foliage_mask};
use crate::loader::ImageLoader;
use crate::statistics::SegmentReport;

/// Segments every source image of the dataset.
pub fn segment_dataset(
    layout: &DatasetLayout,
    threshold: &FoliageThreshold,
) -> Result<SegmentReport> {
    let loader = ImageLoader::new(&layout.color_dir);
    let classes = loader.scan_classes()?;
    info!("Segmenting {} classes from {}", classes.len(), layout.color_dir.display());

    let mut report = SegmentReport::new();

    for class in &classes {
        let mask_dir = layout.mask_dir.join(&class.name);
        let gray_dir = layout.gray_dir.join(&class.name);
        for dir in [&mask_dir, &gray_dir] {
            fs::create_dir_all(dir).map_err(|e| Error::Write {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }

        let mut segmented = 0;
        for source in loader.scan_images(class)? {
            let color = match loader.load_color(&source.path) {
                Ok(color) => color,
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping {}: {}", source.key(), e);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mask = foliage_mask(&color, threshold);
            save(&foliage_cutout(&color, &mask), &mask_dir.join(&source.file_name))?;
            save(&rgb_to_gray(&color), &gray_dir.join(&source.file_name))?;
            segmented += 1;
        }

        info!("{}: {} images segmented", class.name, segmented);
        report.classes += 1;
        report.segmented += segmented;
        report.per_class.insert(class.name.clone(), segmented);
    }

    report.finish();
    Ok(report)
}

fn save<P>(image: &ImageBuffer<P, Vec<u8>>, path: &Path) -> Result<()>
where
    P: image::PixelWithColorType<Subpixel = u8>,
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

    #[test]
    fn test_segment_writes_cutout_and_gray() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DatasetLayout::new(
            temp_dir.path().join("color"),
            temp_dir.path().join("segmented"),
            temp_dir.path().join("grayscale"),
        );
        let class_dir = layout.color_dir.join("Apple___scab");
        fs::create_dir_all(&class_dir).unwrap();

        let leaf = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 { Rgb([30, 170, 40]) } else { Rgb([110, 70, 40]) }
        });
        leaf.save(class_dir.join("leaf.png")).unwrap();
        fs::write(class_dir.join("broken.png"), b"not a png").unwrap();

        let report = segment_dataset(&layout, &FoliageThreshold::default()).unwrap();
        assert_eq!(report.classes, 1);
        assert_eq!(report.segmented, 1);
        assert_eq!(report.skipped, 1);

        let cutout = image::open(layout.mask_dir.join("Apple___scab/leaf.png")).unwrap().to_rgb8();
        assert_eq!(cutout.get_pixel(0, 0), &Rgb([30, 170, 40]));
        assert_eq!(cutout.get_pixel(9, 0), &Rgb([0, 0, 0]));

        let gray = image::open(layout.gray_dir.join("Apple___scab/leaf.png")).unwrap();
        assert_eq!(gray.color(), image::ColorType::L8);
    }
}
