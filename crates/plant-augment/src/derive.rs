//! Mask and grayscale derivation.
//!
//! Both derivors follow the same two-branch rule: a precomputed artifact
//! that decodes and matches the color image's size is used verbatim,
//! otherwise the representation is computed from the color image.

use std::path::Path;

use image::{GrayImage, Luma, RgbImage};
use plant_core::{AuxiliaryOrigin, AuxiliarySource, FoliageThreshold};
use tracing::{debug, warn};

use crate::colorspace::{collapse_to_gray, rgb_to_gray, rgb_to_hsv_u8};

/// Value written for foreground mask pixels
pub const MASK_FOREGROUND: u8 = 255;

/// Produces the binary foliage mask for a color image.
pub fn derive_mask(
    color: &RgbImage,
    source: &AuxiliarySource,
    threshold: &FoliageThreshold,
) -> (GrayImage, AuxiliaryOrigin) {
    if let Some(mask) = load_precomputed(source, color.dimensions()) {
        return (mask, AuxiliaryOrigin::Loaded);
    }
    (foliage_mask(color, threshold), AuxiliaryOrigin::Derived)
}

/// Produces the single-channel luminance image for a color image.
pub fn derive_gray(color: &RgbImage, source: &AuxiliarySource) -> (GrayImage, AuxiliaryOrigin) {
    if let Some(gray) = load_precomputed(source, color.dimensions()) {
        return (gray, AuxiliaryOrigin::Loaded);
    }
    (rgb_to_gray(color), AuxiliaryOrigin::Derived)
}

/// Thresholds the image in HSV space: 255 inside the band, 0 elsewhere.
pub fn foliage_mask(color: &RgbImage, threshold: &FoliageThreshold) -> GrayImage {
    let (width, height) = color.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let hsv = rgb_to_hsv_u8(color.get_pixel(x, y));
        if threshold.contains(hsv) {
            Luma([MASK_FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// Zeroes every non-foliage pixel, keeping the plant material in color.
pub fn foliage_cutout(color: &RgbImage, mask: &GrayImage) -> RgbImage {
    let mut cutout = color.clone();
    for (pixel, m) in cutout.pixels_mut().zip(mask.pixels()) {
        if m[0] == 0 {
            pixel.0 = [0, 0, 0];
        }
    }
    cutout
}

/// Loads a precomputed artifact, or `None` when derivation must take over.
fn load_precomputed(source: &AuxiliarySource, expected: (u32, u32)) -> Option<GrayImage> {
    let AuxiliarySource::Precomputed(path) = source else {
        return None;
    };

    match read_single_channel(path) {
        Ok(image) if image.dimensions() == expected => {
            debug!("Using precomputed {}", path.display());
            Some(image)
        }
        Ok(image) => {
            warn!(
                "Ignoring {}: size {:?} does not match color image {:?}",
                path.display(),
                image.dimensions(),
                expected
            );
            None
        }
        Err(e) => {
            warn!("Unreadable precomputed artifact {}, deriving instead: {}", path.display(), e);
            None
        }
    }
}

fn read_single_channel(path: &Path) -> image::ImageResult<GrayImage> {
    image::open(path).map(|decoded| collapse_to_gray(&decoded))
}
