//! Resizing of sample triples to a fixed working size.

use image::imageops::{self, FilterType};
use plant_core::{ImageDimensions, SampleTriple};

/// Filter used for the color member
pub const COLOR_FILTER: FilterType = FilterType::Triangle;

/// Filter used for mask and gray members
pub const AUXILIARY_FILTER: FilterType = FilterType::Nearest;

/// Resizes all three members to `target`.
///
/// The mask keeps its exact labels because nearest-neighbour sampling
/// never invents intermediate values.
pub fn resize_triple(triple: &SampleTriple, target: ImageDimensions) -> SampleTriple {
    let (width, height) = triple.dimensions();
    if width == target.width && height == target.height {
        return triple.clone();
    }

    SampleTriple {
        color: imageops::resize(&triple.color, target.width, target.height, COLOR_FILTER),
        mask: imageops::resize(&triple.mask, target.width, target.height, AUXILIARY_FILTER),
        gray: imageops::resize(&triple.gray, target.width, target.height, AUXILIARY_FILTER),
    }
}
