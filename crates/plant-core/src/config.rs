//! Configuration structures for the augmentation pipeline.
//!
//! Every structure is TOML-loadable and fully defaulted; the defaults
//! reproduce the reference PlantVillage augmentation run (5 repetitions,
//! seed 42, the foliage HSV band `[25, 40, 40]..=[95, 255, 255]`).

use crate::error::{Error, Result};
use crate::types::ImageDimensions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration passed to the pipeline entry point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory roots
    pub layout: DatasetLayout,
    /// Augmentation parameters
    pub augmentation: AugmentationConfig,
    /// Foliage HSV band used when masks are derived
    pub foliage: FoliageThreshold,
    /// Execution options
    pub execution: ExecutionConfig,
}

impl PipelineConfig {
    /// Validates every section
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.augmentation.validate()?;
        self.foliage.validate()?;
        self.execution.validate()?;
        Ok(())
    }
}

/// Input and output directory roots, each partitioned by class directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    /// Source color images; augmented color images are written alongside
    pub color_dir: PathBuf,
    /// Output root for masks (and default precomputed mask root)
    pub mask_dir: PathBuf,
    /// Output root for grayscale images (and default precomputed gray root)
    pub gray_dir: PathBuf,
    /// Alternative root holding precomputed masks
    pub precomputed_mask_dir: Option<PathBuf>,
    /// Alternative root holding precomputed grayscale images
    pub precomputed_gray_dir: Option<PathBuf>,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            color_dir: PathBuf::from("data/plantvillage/color"),
            mask_dir: PathBuf::from("data/plantvillage/segmented"),
            gray_dir: PathBuf::from("data/plantvillage/grayscale"),
            precomputed_mask_dir: None,
            precomputed_gray_dir: None,
        }
    }
}

impl DatasetLayout {
    /// Creates a layout with the given roots and no precomputed overrides
    pub fn new(
        color_dir: impl Into<PathBuf>,
        mask_dir: impl Into<PathBuf>,
        gray_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            color_dir: color_dir.into(),
            mask_dir: mask_dir.into(),
            gray_dir: gray_dir.into(),
            precomputed_mask_dir: None,
            precomputed_gray_dir: None,
        }
    }

    /// Root searched for precomputed masks
    pub fn precomputed_mask_root(&self) -> &Path {
        self.precomputed_mask_dir.as_deref().unwrap_or(&self.mask_dir)
    }

    /// Root searched for precomputed grayscale images
    pub fn precomputed_gray_root(&self) -> &Path {
        self.precomputed_gray_dir.as_deref().unwrap_or(&self.gray_dir)
    }

    fn validate(&self) -> Result<()> {
        if self.color_dir.as_os_str().is_empty() {
            return Err(Error::Config("layout.color_dir must not be empty".to_string()));
        }
        if self.mask_dir == self.color_dir || self.gray_dir == self.color_dir {
            return Err(Error::Config(
                "mask and gray roots must differ from the color root".to_string(),
            ));
        }
        if self.mask_dir == self.gray_dir {
            return Err(Error::Config("mask and gray roots must differ".to_string()));
        }
        Ok(())
    }
}

/// Inclusive HSV band separating plant material from background.
///
/// Uses the 8-bit OpenCV scale: hue in `0..180` (degrees / 2),
/// saturation and value in `0..=255`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FoliageThreshold {
    /// Lower bound [h, s, v]
    pub lower: [u8; 3],
    /// Upper bound [h, s, v]
    pub upper: [u8; 3],
}

impl Default for FoliageThreshold {
    fn default() -> Self {
        Self {
            lower: [25, 40, 40],
            upper: [95, 255, 255],
        }
    }
}

impl FoliageThreshold {
    /// Whether an HSV triple falls inside the band
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }

    fn validate(&self) -> Result<()> {
        if (0..3).any(|i| self.lower[i] > self.upper[i]) {
            return Err(Error::Config(format!(
                "foliage lower bound {:?} exceeds upper bound {:?}",
                self.lower, self.upper
            )));
        }
        if self.lower[0] >= 180 {
            return Err(Error::Config(format!(
                "foliage hue lower bound {} outside 0..180",
                self.lower[0]
            )));
        }
        Ok(())
    }
}

/// One geometric operation, applied to color, mask and gray alike
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GeometricOp {
    /// Rotate by a uniformly chosen multiple of 90 degrees
    Rotate90 { p: f32 },
    /// Mirror left/right
    HorizontalFlip { p: f32 },
    /// Mirror top/bottom
    VerticalFlip { p: f32 },
    /// Combined shift/scale/rotation about the image centre
    ShiftScaleRotate {
        p: f32,
        /// Maximum shift as a fraction of width/height
        shift_limit: f32,
        /// Scale is drawn from `1 ± scale_limit`
        scale_limit: f32,
        /// Maximum rotation in degrees
        rotate_limit: f32,
    },
    /// Four-corner perspective warp; output keeps its size
    Perspective {
        p: f32,
        /// Range of the corner jitter standard deviation, as a fraction of size
        scale: (f32, f32),
    },
    /// Independent x/y shear about the image centre
    Shear {
        p: f32,
        /// Maximum shear angle in degrees
        limit: f32,
    },
}

impl GeometricOp {
    /// Application probability
    pub fn probability(&self) -> f32 {
        match self {
            GeometricOp::Rotate90 { p }
            | GeometricOp::HorizontalFlip { p }
            | GeometricOp::VerticalFlip { p }
            | GeometricOp::ShiftScaleRotate { p, .. }
            | GeometricOp::Perspective { p, .. }
            | GeometricOp::Shear { p, .. } => *p,
        }
    }

    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            GeometricOp::Rotate90 { .. } => "rotate90",
            GeometricOp::HorizontalFlip { .. } => "horizontal_flip",
            GeometricOp::VerticalFlip { .. } => "vertical_flip",
            GeometricOp::ShiftScaleRotate { .. } => "shift_scale_rotate",
            GeometricOp::Perspective { .. } => "perspective",
            GeometricOp::Shear { .. } => "shear",
        }
    }

    fn validate(&self) -> Result<()> {
        check_probability(self.name(), self.probability())?;
        match self {
            GeometricOp::ShiftScaleRotate {
                shift_limit,
                scale_limit,
                rotate_limit,
                ..
            } => {
                check_non_negative(self.name(), "shift_limit", *shift_limit)?;
                check_non_negative(self.name(), "rotate_limit", *rotate_limit)?;
                if !(0.0..1.0).contains(scale_limit) {
                    return Err(Error::Config(format!(
                        "shift_scale_rotate.scale_limit must be in [0, 1), got {scale_limit}"
                    )));
                }
            }
            GeometricOp::Perspective { scale, .. } => {
                check_range(self.name(), "scale", *scale)?;
                check_non_negative(self.name(), "scale", scale.0)?;
                if scale.1 >= 0.5 {
                    return Err(Error::Config(format!(
                        "perspective.scale upper bound must be below 0.5, got {}",
                        scale.1
                    )));
                }
            }
            GeometricOp::Shear { limit, .. } => {
                if !(0.0..90.0).contains(limit) {
                    return Err(Error::Config(format!(
                        "shear.limit must be in [0, 90) degrees, got {limit}"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// One photometric operation, applied to the color image only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ColorOp {
    /// Linear brightness/contrast change
    BrightnessContrast {
        p: f32,
        brightness_limit: f32,
        contrast_limit: f32,
    },
    /// Exactly one of additive Gaussian noise or JPEG recompression
    NoiseOrCompression {
        p: f32,
        /// Relative weight of the noise branch
        noise_weight: f32,
        /// Relative weight of the compression branch
        compression_weight: f32,
        /// Noise variance range (8-bit intensity units squared)
        noise_variance: (f32, f32),
        /// JPEG quality range
        quality: (u8, u8),
    },
    /// Brightness/contrast/saturation/hue micro-perturbation in random order
    ColorJitter {
        p: f32,
        brightness: f32,
        contrast: f32,
        saturation: f32,
        /// Maximum hue rotation as a fraction of a full turn (<= 0.5)
        hue: f32,
    },
}

impl ColorOp {
    /// Application probability
    pub fn probability(&self) -> f32 {
        match self {
            ColorOp::BrightnessContrast { p, .. }
            | ColorOp::NoiseOrCompression { p, .. }
            | ColorOp::ColorJitter { p, .. } => *p,
        }
    }

    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ColorOp::BrightnessContrast { .. } => "brightness_contrast",
            ColorOp::NoiseOrCompression { .. } => "noise_or_compression",
            ColorOp::ColorJitter { .. } => "color_jitter",
        }
    }

    fn validate(&self) -> Result<()> {
        check_probability(self.name(), self.probability())?;
        match self {
            ColorOp::BrightnessContrast {
                brightness_limit,
                contrast_limit,
                ..
            } => {
                check_non_negative(self.name(), "brightness_limit", *brightness_limit)?;
                check_non_negative(self.name(), "contrast_limit", *contrast_limit)?;
            }
            ColorOp::NoiseOrCompression {
                noise_weight,
                compression_weight,
                noise_variance,
                quality,
                ..
            } => {
                check_non_negative(self.name(), "noise_weight", *noise_weight)?;
                check_non_negative(self.name(), "compression_weight", *compression_weight)?;
                if noise_weight + compression_weight <= 0.0 {
                    return Err(Error::Config(
                        "noise_or_compression needs a positive branch weight".to_string(),
                    ));
                }
                check_range(self.name(), "noise_variance", *noise_variance)?;
                check_non_negative(self.name(), "noise_variance", noise_variance.0)?;
                if quality.0 == 0 || quality.1 > 100 || quality.0 > quality.1 {
                    return Err(Error::Config(format!(
                        "{}.quality must be an ordered range within 1..=100, got {quality:?}",
                        self.name()
                    )));
                }
            }
            ColorOp::ColorJitter {
                brightness,
                contrast,
                saturation,
                hue,
                ..
            } => {
                for (field, value) in [
                    ("brightness", brightness),
                    ("contrast", contrast),
                    ("saturation", saturation),
                ] {
                    check_non_negative(self.name(), field, *value)?;
                }
                if !(0.0..=0.5).contains(hue) {
                    return Err(Error::Config(format!(
                        "color_jitter.hue must be in [0, 0.5], got {hue}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Data augmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Augmented triples generated per source image
    pub repetitions: usize,
    /// Geometric operations, sampled and applied in order
    pub geometric: Vec<GeometricOp>,
    /// Color operations, applied in order to the color image
    pub color: Vec<ColorOp>,
    /// Resize every source triple before augmenting; `None` keeps the original size
    pub resize: Option<ImageDimensions>,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            repetitions: 5,
            geometric: vec![
                GeometricOp::Rotate90 { p: 0.5 },
                GeometricOp::HorizontalFlip { p: 0.5 },
                GeometricOp::VerticalFlip { p: 0.2 },
                GeometricOp::ShiftScaleRotate {
                    p: 0.7,
                    shift_limit: 0.05,
                    scale_limit: 0.15,
                    rotate_limit: 20.0,
                },
                GeometricOp::Perspective {
                    p: 0.3,
                    scale: (0.05, 0.1),
                },
                GeometricOp::Shear { p: 0.2, limit: 10.0 },
            ],
            color: vec![
                ColorOp::BrightnessContrast {
                    p: 0.5,
                    brightness_limit: 0.2,
                    contrast_limit: 0.2,
                },
                ColorOp::NoiseOrCompression {
                    p: 0.4,
                    noise_weight: 0.5,
                    compression_weight: 0.5,
                    noise_variance: (10.0, 50.0),
                    quality: (60, 100),
                },
                ColorOp::ColorJitter {
                    p: 0.4,
                    brightness: 0.2,
                    contrast: 0.2,
                    saturation: 0.2,
                    hue: 0.2,
                },
            ],
            resize: None,
            seed: 42,
        }
    }
}

impl AugmentationConfig {
    /// Create a "light" preset: flips only plus mild lighting changes
    pub fn light() -> Self {
        Self {
            geometric: vec![
                GeometricOp::HorizontalFlip { p: 0.5 },
                GeometricOp::ShiftScaleRotate {
                    p: 0.3,
                    shift_limit: 0.02,
                    scale_limit: 0.05,
                    rotate_limit: 10.0,
                },
            ],
            color: vec![ColorOp::BrightnessContrast {
                p: 0.3,
                brightness_limit: 0.1,
                contrast_limit: 0.1,
            }],
            ..Self::default()
        }
    }

    /// Create the reference preset
    pub fn medium() -> Self {
        Self::default()
    }

    /// No operations at all; every repetition reproduces its source
    pub fn none() -> Self {
        Self {
            geometric: Vec::new(),
            color: Vec::new(),
            ..Self::default()
        }
    }

    /// Looks up a preset by name
    pub fn preset(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "light" => Ok(Self::light()),
            "medium" | "default" | "reference" => Ok(Self::medium()),
            "none" => Ok(Self::none()),
            other => Err(Error::InvalidArgument(format!(
                "unknown preset '{other}', use 'light', 'medium' or 'none'"
            ))),
        }
    }

    /// Validates probabilities, ranges and sizes
    pub fn validate(&self) -> Result<()> {
        for op in &self.geometric {
            op.validate()?;
        }
        for op in &self.color {
            op.validate()?;
        }
        if let Some(dims) = self.resize {
            if dims.width == 0 || dims.height == 0 {
                return Err(Error::Config(format!("resize must be non-zero, got {dims}")));
            }
        }
        Ok(())
    }
}

/// Execution options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Process the images of a class on a rayon pool
    pub parallel: bool,
    /// Worker threads for parallel mode (default: rayon's choice)
    pub workers: Option<usize>,
    /// Ignore files whose stem already carries the `_aug_` marker
    pub skip_augmented: bool,
    /// Show per-class progress bars
    pub progress: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: None,
            skip_augmented: true,
            progress: false,
        }
    }
}

impl ExecutionConfig {
    fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::Config("execution.workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn check_probability(op: &str, p: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::Config(format!("{op}.p must be within [0, 1], got {p}")));
    }
    Ok(())
}

fn check_non_negative(op: &str, field: &str, value: f32) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(Error::Config(format!(
            "{op}.{field} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

fn check_range(op: &str, field: &str, range: (f32, f32)) -> Result<()> {
    if !(range.0.is_finite() && range.1.is_finite() && range.0 <= range.1) {
        return Err(Error::Config(format!(
            "{op}.{field} must be a finite, ordered range, got {range:?}"
        )));
    }
    Ok(())
}
