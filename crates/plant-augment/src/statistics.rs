//! Run statistics for augmentation and segmentation passes.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use plant_core::{AuxiliaryOrigin, Error, Result};
use serde::{Deserialize, Serialize};

/// Per-class counters of an augmentation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassReport {
    /// Source images found in the class directory
    pub sources: usize,
    /// Sources skipped because they could not be decoded
    pub skipped: usize,
    /// Triples written
    pub triples_written: usize,
}

/// Summary of one augmentation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentationReport {
    /// RFC 3339 timestamps
    pub started_at: String,
    pub finished_at: String,
    pub seed: u64,
    pub repetitions: usize,
    pub classes: usize,
    pub sources: usize,
    pub skipped: usize,
    pub triples_written: usize,
    pub masks_loaded: usize,
    pub masks_derived: usize,
    pub grays_loaded: usize,
    pub grays_derived: usize,
    /// Counters keyed by class name
    pub per_class: BTreeMap<String, ClassReport>,
}

impl AugmentationReport {
    pub fn new(seed: u64, repetitions: usize) -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            seed,
            repetitions,
            ..Self::default()
        }
    }

    /// Stamps the finish time
    pub fn finish(&mut self) {
        self.finished_at = Utc::now().to_rfc3339();
    }

    /// Records how one source's mask and gray were obtained
    pub fn record_origins(&mut self, mask: AuxiliaryOrigin, gray: AuxiliaryOrigin) {
        match mask {
            AuxiliaryOrigin::Loaded => self.masks_loaded += 1,
            AuxiliaryOrigin::Derived => self.masks_derived += 1,
        }
        match gray {
            AuxiliaryOrigin::Loaded => self.grays_loaded += 1,
            AuxiliaryOrigin::Derived => self.grays_derived += 1,
        }
    }

    /// Folds a finished class into the totals
    pub fn add_class(&mut self, name: &str, class: ClassReport) {
        self.classes += 1;
        self.sources += class.sources;
        self.skipped += class.skipped;
        self.triples_written += class.triples_written;
        self.per_class.insert(name.to_string(), class);
    }

    /// Writes the report as pretty-printed JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }
}

/// Summary of one segmentation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub started_at: String,
    pub finished_at: String,
    pub classes: usize,
    pub segmented: usize,
    pub skipped: usize,
    /// Images segmented per class
    pub per_class: BTreeMap<String, usize>,
}

impl SegmentReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            ..Self::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now().to_rfc3339();
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }
}

fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
