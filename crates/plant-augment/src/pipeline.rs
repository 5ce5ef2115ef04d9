//! Augmentation pipeline.
//!
//! Walks `<color_dir>/<class>/<image>`, builds the aligned triple for each
//! decodable source, and writes `repetitions` augmented triples per source.
//!
//! In sequential mode a single seeded stream is consumed in class, file,
//! repetition and operation order. In parallel mode each source gets its
//! own stream keyed by its class-relative path, so the output does not
//! depend on how rayon schedules the work.

use indicatif::{ProgressBar, ProgressStyle};
use plant_core::{
    AugmentationConfig, AuxiliaryOrigin, ClassDirectory, Error, PipelineConfig, Result,
    SampleTriple, SourceImage,
};
use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::color::apply_color;
use crate::derive::{derive_gray, derive_mask};
use crate::emit::{emit, EmitTargets};
use crate::geometric::apply_geometric;
use crate::loader::{resolve_auxiliary, ImageLoader};
use crate::preprocess::resize_triple;
use crate::random::{image_rng, seeded_rng};
use crate::statistics::{AugmentationReport, ClassReport};

/// A decoded source with its auxiliary images in place
#[derive(Debug, Clone)]
pub struct PreparedSource {
    pub triple: SampleTriple,
    pub mask_origin: AuxiliaryOrigin,
    pub gray_origin: AuxiliaryOrigin,
}

/// What happened to one source image
#[derive(Debug, Clone, Copy)]
struct SourceOutcome {
    mask_origin: AuxiliaryOrigin,
    gray_origin: AuxiliaryOrigin,
    written: usize,
}

/// One geometric draw shared by the triple, then color-only perturbation.
pub fn augment_triple<R: Rng + ?Sized>(
    triple: &SampleTriple,
    config: &AugmentationConfig,
    rng: &mut R,
) -> Result<SampleTriple> {
    let transformed = apply_geometric(triple, &config.geometric, rng);
    let color = apply_color(&transformed.color, &config.color, rng)?;

    let augmented = SampleTriple { color, ..transformed };
    debug_assert!(augmented.is_aligned());
    Ok(augmented)
}

/// Augmentation pipeline over a class-partitioned dataset
pub struct AugmentationPipeline {
    config: PipelineConfig,
    loader: ImageLoader,
}

impl AugmentationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let loader = ImageLoader::new(&config.layout.color_dir)
            .with_skip_augmented(config.execution.skip_augmented);
        Self { config, loader }
    }

    /// Runs the whole dataset.
    ///
    /// Undecodable sources are skipped and counted; the first write failure
    /// aborts the run.
    pub fn run(&self) -> Result<AugmentationReport> {
        self.config.validate()?;

        let augmentation = &self.config.augmentation;
        let classes = self.loader.scan_classes()?;
        info!(
            "Augmenting {} classes from {} ({} per image, seed {})",
            classes.len(),
            self.config.layout.color_dir.display(),
            augmentation.repetitions,
            augmentation.seed
        );

        let mut report = AugmentationReport::new(augmentation.seed, augmentation.repetitions);

        if self.config.execution.parallel {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.execution.workers.unwrap_or(0))
                .build()
                .map_err(|e| Error::Other(format!("Failed to build thread pool: {e}")))?;
            pool.install(|| self.run_parallel(&classes, &mut report))?;
        } else {
            self.run_sequential(&classes, &mut report)?;
        }
        report.finish();

        info!(
            "Wrote {} triples from {} sources ({} skipped)",
            report.triples_written, report.sources, report.skipped
        );
        Ok(report)
    }

    fn run_sequential(
        &self,
        classes: &[ClassDirectory],
        report: &mut AugmentationReport,
    ) -> Result<()> {
        let mut rng = seeded_rng(self.config.augmentation.seed);

        for class in classes {
            let images = self.loader.scan_images(class)?;
            let targets = EmitTargets::for_class(&self.config.layout, &class.name);
            let pb = self.progress_bar(images.len(), &class.name);

            let mut outcomes = Vec::with_capacity(images.len());
            for source in &images {
                outcomes.push(self.augment_source(source, &targets, &mut rng)?);
                pb.inc(1);
            }
            pb.finish_and_clear();

            self.finish_class(class, outcomes, report);
        }
        Ok(())
    }

    fn run_parallel(
        &self,
        classes: &[ClassDirectory],
        report: &mut AugmentationReport,
    ) -> Result<()> {
        let seed = self.config.augmentation.seed;

        for class in classes {
            let images = self.loader.scan_images(class)?;
            let targets = EmitTargets::for_class(&self.config.layout, &class.name);
            let pb = self.progress_bar(images.len(), &class.name);

            let outcomes = images
                .par_iter()
                .map(|source| {
                    let mut rng = image_rng(seed, &source.key());
                    let outcome = self.augment_source(source, &targets, &mut rng);
                    pb.inc(1);
                    outcome
                })
                .collect::<Result<Vec<_>>>()?;
            pb.finish_and_clear();

            self.finish_class(class, outcomes, report);
        }
        Ok(())
    }

    fn finish_class(
        &self,
        class: &ClassDirectory,
        outcomes: Vec<Option<SourceOutcome>>,
        report: &mut AugmentationReport,
    ) {
        let mut class_report = ClassReport {
            sources: outcomes.len(),
            ..ClassReport::default()
        };

        for outcome in outcomes {
            match outcome {
                Some(done) => {
                    report.record_origins(done.mask_origin, done.gray_origin);
                    class_report.triples_written += done.written;
                }
                None => class_report.skipped += 1,
            }
        }

        info!(
            "{}: {} sources, {} triples written, {} skipped",
            class.name, class_report.sources, class_report.triples_written, class_report.skipped
        );
        report.add_class(&class.name, class_report);
    }

    /// Prepares one source and writes all of its repetitions.
    ///
    /// Returns `Ok(None)` when the source was skipped.
    fn augment_source<R: Rng + ?Sized>(
        &self,
        source: &SourceImage,
        targets: &EmitTargets,
        rng: &mut R,
    ) -> Result<Option<SourceOutcome>> {
        let Some(prepared) = self.prepare_source(source)? else {
            return Ok(None);
        };

        let augmentation = &self.config.augmentation;
        for _ in 0..augmentation.repetitions {
            let augmented = augment_triple(&prepared.triple, augmentation, rng)?;
            emit(augmented, source, targets)?;
        }

        debug!("{}: {} triples", source.key(), augmentation.repetitions);
        Ok(Some(SourceOutcome {
            mask_origin: prepared.mask_origin,
            gray_origin: prepared.gray_origin,
            written: augmentation.repetitions,
        }))
    }

    /// Decodes the color image and obtains its mask and gray.
    ///
    /// A decode failure is logged and yields `Ok(None)`.
    pub fn prepare_source(&self, source: &SourceImage) -> Result<Option<PreparedSource>> {
        let color = match self.loader.load_color(&source.path) {
            Ok(color) => color,
            Err(e) if e.is_recoverable() => {
                warn!("Skipping {}: {}", source.key(), e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let layout = &self.config.layout;
        let mask_source = resolve_auxiliary(layout.precomputed_mask_root(), source);
        let gray_source = resolve_auxiliary(layout.precomputed_gray_root(), source);

        let (mask, mask_origin) = derive_mask(&color, &mask_source, &self.config.foliage);
        let (gray, gray_origin) = derive_gray(&color, &gray_source);

        let mut triple = SampleTriple::new(color, mask, gray)?;
        if let Some(size) = self.config.augmentation.resize {
            triple = resize_triple(&triple, size);
        }

        Ok(Some(PreparedSource {
            triple,
            mask_origin,
            gray_origin,
        }))
    }

    fn progress_bar(&self, len: usize, class_name: &str) -> ProgressBar {
        if !self.config.execution.progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(class_name.to_string());
        pb
    }
}
