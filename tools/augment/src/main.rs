//! Augmentation tool for PlantVillage-style datasets.
//!
//! Subcommands:
//! - `run`: write augmented color/mask/gray triples for every source image
//! - `segment`: precompute foliage cut-outs and grayscale copies
//! - `init-config`: write the default configuration as TOML

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use plant_augment::{segment_dataset, AugmentationPipeline};
use plant_core::{
    load_toml_config, setup_cli_logging, write_toml_config, AugmentationConfig, ImageDimensions,
    PipelineConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "augment")]
#[command(about = "Aligned color/mask/gray augmentation for PlantVillage", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Directory options shared by `run` and `segment`
#[derive(Args)]
struct LayoutArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the class-partitioned color images
    #[arg(long)]
    color_dir: Option<PathBuf>,

    /// Root for masks (also searched for precomputed masks)
    #[arg(long)]
    mask_dir: Option<PathBuf>,

    /// Root for grayscale images (also searched for precomputed grays)
    #[arg(long)]
    gray_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate augmented triples for every source image
    Run {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Augmentation preset: light, medium, none (overrides the config file's operations)
        #[arg(short, long)]
        preset: Option<String>,

        /// Augmented triples per source image
        #[arg(short = 'n', long)]
        per_image: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Resize sources before augmenting (WxH or N)
        #[arg(long)]
        size: Option<ImageDimensions>,

        /// Process the images of each class in parallel
        #[arg(long)]
        parallel: bool,

        /// Number of parallel workers (default: num_cpus)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write the run report (JSON)
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Precompute foliage cut-outs and grayscale images
    Segment {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Write the segmentation report (JSON)
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination TOML file
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            layout,
            preset,
            per_image,
            seed,
            size,
            parallel,
            workers,
            report,
        } => {
            let mut config = load_config(&layout)?;
            if let Some(name) = preset {
                let chosen = AugmentationConfig::preset(&name)?;
                config.augmentation.geometric = chosen.geometric;
                config.augmentation.color = chosen.color;
            }
            if let Some(n) = per_image {
                config.augmentation.repetitions = n;
            }
            if let Some(s) = seed {
                config.augmentation.seed = s;
            }
            if size.is_some() {
                config.augmentation.resize = size;
            }
            config.execution.parallel |= parallel;
            if workers.is_some() {
                config.execution.workers = workers;
            }
            config.execution.progress = true;

            run_augmentation(config, report.as_deref())?
        }

        Commands::Segment { layout, report } => {
            let config = load_config(&layout)?;
            run_segmentation(&config, report.as_deref())?
        }

        Commands::InitConfig { output, force } => init_config(&output, force)?,
    }

    Ok(())
}

/// Loads the config file (or defaults) and applies directory overrides
fn load_config(args: &LayoutArgs) -> Result<PipelineConfig> {
    let mut config: PipelineConfig = match &args.config {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &args.color_dir {
        config.layout.color_dir = dir.clone();
    }
    if let Some(dir) = &args.mask_dir {
        config.layout.mask_dir = dir.clone();
    }
    if let Some(dir) = &args.gray_dir {
        config.layout.gray_dir = dir.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_augmentation(config: PipelineConfig, report_path: Option<&Path>) -> Result<()> {
    info!("Color: {:?}", config.layout.color_dir);
    info!("Masks: {:?}", config.layout.mask_dir);
    info!("Gray:  {:?}", config.layout.gray_dir);

    let report = AugmentationPipeline::new(config)
        .run()
        .context("Augmentation failed")?;

    println!("\n{}\n", "Augmentation Summary".green().bold());
    println!("{:<40} {:>10} {:>10} {:>10}", "Class", "Sources", "Written", "Skipped");
    println!("{}", "=".repeat(74));
    for (class_name, class) in &report.per_class {
        println!(
            "{:<40} {:>10} {:>10} {:>10}",
            class_name, class.sources, class.triples_written, class.skipped
        );
    }
    println!("{}", "=".repeat(74));
    println!(
        "{:<40} {:>10} {:>10} {:>10}",
        "TOTAL", report.sources, report.triples_written, report.skipped
    );
    println!("\n  Masks loaded/derived: {}/{}", report.masks_loaded, report.masks_derived);
    println!("  Grays loaded/derived: {}/{}", report.grays_loaded, report.grays_derived);

    if let Some(path) = report_path {
        report
            .save_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report saved to {:?}", path);
    }

    info!("✓ Augmentation complete!");
    Ok(())
}

fn run_segmentation(config: &PipelineConfig, report_path: Option<&Path>) -> Result<()> {
    let report = segment_dataset(&config.layout, &config.foliage).context("Segmentation failed")?;

    println!("\n{}\n", "Segmentation Summary".green().bold());
    for (class_name, count) in &report.per_class {
        println!("{:<40} {:>10}", class_name, count);
    }
    println!("{}", "=".repeat(52));
    println!("{:<40} {:>10}", "TOTAL", report.segmented);
    if report.skipped > 0 {
        println!("  {}", format!("{} undecodable images skipped", report.skipped).yellow());
    }

    if let Some(path) = report_path {
        report
            .save_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report saved to {:?}", path);
    }

    info!("✓ Segmentation complete!");
    Ok(())
}

fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", output.display());
    }

    write_toml_config(output, &PipelineConfig::default())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Default configuration written to {:?}", output);
    Ok(())
}
