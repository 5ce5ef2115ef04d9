//! Discovery and loading of source images.
//!
//! The dataset is a two-level tree: `<root>/<class>/<image>`. Classes and
//! files are returned in lexicographic order so a seeded run always visits
//! them in the same sequence.

use std::path::{Path, PathBuf};

use image::RgbImage;
use plant_core::{AuxiliarySource, ClassDirectory, Error, Result, SourceImage};
use tracing::debug;

use crate::emit::AUG_MARKER;

/// Extensions treated as source images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Image loader for a class-per-directory dataset
pub struct ImageLoader {
    /// Root directory containing one sub-directory per class
    root_dir: PathBuf,
    /// Whether previously augmented outputs are left out of scans
    skip_augmented: bool,
}

impl ImageLoader {
    /// Creates a new image loader
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            skip_augmented: true,
        }
    }

    /// Sets whether files carrying the augmentation marker are skipped
    pub fn with_skip_augmented(mut self, skip: bool) -> Self {
        self.skip_augmented = skip;
        self
    }

    /// Lists the class directories under the root, sorted by name.
    pub fn scan_classes(&self) -> Result<Vec<ClassDirectory>> {
        if !self.root_dir.exists() {
            return Err(Error::NotFound(format!(
                "Directory not found: {}",
                self.root_dir.display()
            )));
        }

        if !self.root_dir.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "Path is not a directory: {}",
                self.root_dir.display()
            )));
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(&self.root_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                classes.push(ClassDirectory::new(name, path.clone()));
            }
        }

        classes.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Found {} classes under {}", classes.len(), self.root_dir.display());
        Ok(classes)
    }

    /// Lists the source images of one class, sorted by file name.
    pub fn scan_images(&self, class: &ClassDirectory) -> Result<Vec<SourceImage>> {
        let mut images = Vec::new();

        for entry in std::fs::read_dir(&class.path)? {
            let path = entry?.path();
            if !path.is_file() || !is_image_file(&path) {
                continue;
            }

            let Some(source) = SourceImage::from_path(class.name.clone(), &path) else {
                continue;
            };

            if self.skip_augmented && source.stem.contains(AUG_MARKER) {
                continue;
            }
            images.push(source);
        }

        images.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(images)
    }

    /// Decodes a color image, mapping any failure to [`Error::Decode`].
    pub fn load_color(&self, path: &Path) -> Result<RgbImage> {
        image::open(path)
            .map(|decoded| decoded.to_rgb8())
            .map_err(|e| Error::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

/// Looks up a precomputed artifact keyed by the same class-relative path.
pub fn resolve_auxiliary(root: &Path, source: &SourceImage) -> AuxiliarySource {
    AuxiliarySource::resolve(root.join(&source.class_name).join(&source.file_name))
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
