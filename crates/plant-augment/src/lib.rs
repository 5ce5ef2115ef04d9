//! Aligned augmentation of color, mask and grayscale plant images.
//!
//! Each source color image is paired with a foliage mask and a grayscale
//! image (loaded when precomputed, derived otherwise). One geometric
//! transform is sampled per repetition and applied to all three; color
//! perturbations then touch the color image only.

pub mod color;
pub mod colorspace;
pub mod derive;
pub mod emit;
pub mod geometric;
pub mod loader;
pub mod pipeline;
pub mod preprocess;
pub mod random;
pub mod segment;
pub mod statistics;

pub use color::apply_color;
pub use derive::{derive_gray, derive_mask};
pub use emit::{binarize_mask, emit, EmitTargets, EmittedTriple};
pub use geometric::{apply_geometric, GeometricParams, GeometricStep};
pub use loader::ImageLoader;
pub use pipeline::{augment_triple, AugmentationPipeline};
pub use preprocess::resize_triple;
pub use segment::segment_dataset;
pub use statistics::{AugmentationReport, ClassReport, SegmentReport};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::color::*;
    pub use crate::derive::*;
    pub use crate::emit::*;
    pub use crate::geometric::*;
    pub use crate::loader::*;
    pub use crate::pipeline::*;
    pub use crate::preprocess::*;
    pub use crate::random::*;
    pub use crate::statistics::*;
}
