//! Patchprep: defect-patch dataset preparation.
//!
//! Patchprep turns a Pascal VOC style defect dataset (one XML annotation
//! per source image, split into `train` and `validation`) into a dataset for
//! conditional generative models: fixed-size grayscale patches cut from the
//! annotated boxes, plus one conditioning vector per patch built from its
//! label and box geometry.
//!
//! # Modules
//!
//! - [`annotation`]: VOC annotation reader
//! - [`plan`]: the shared extraction plan (patch identities)
//! - [`extract`]: patch cropping, resizing and storage
//! - [`metadata`]: the per-patch metadata table
//! - [`assemble`]: dataset assembly and the persisted feature encoders
//! - [`pipeline`]: stage drivers
//! - [`report`]: per-item failures and run summaries
//! - [`config`]: pipeline configuration
//! - [`error`]: error types for patchprep operations

pub mod annotation;
pub mod assemble;
pub mod config;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod pipeline;
pub mod plan;
pub mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use config::{FitScope, ImageLookup, PipelineConfig};
pub use error::{ItemError, PatchprepError};
pub use report::RunReport;

use config::{DEFAULT_BATCH_SIZE, DEFAULT_DATA_DIR, DEFAULT_IMAGE_SIZE, DEFAULT_OUT_DIR};

/// The patchprep CLI application.
#[derive(Parser)]
#[command(name = "patchprep")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Pipeline configuration shared by every subcommand.
#[derive(clap::Args)]
struct ConfigArgs {
    /// Source dataset root containing `{split}/annotations` and `{split}/images`.
    #[arg(long, env = "PATCHPREP_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Output root for patches, metadata table, dataset and encoders.
    #[arg(long, env = "PATCHPREP_OUT_DIR", default_value = DEFAULT_OUT_DIR, global = true)]
    out_dir: PathBuf,

    /// Side length of the square output patches.
    #[arg(long, env = "PATCHPREP_IMAGE_SIZE", default_value_t = DEFAULT_IMAGE_SIZE, global = true)]
    image_size: u32,

    /// Comma-separated splits to process.
    #[arg(
        long,
        env = "PATCHPREP_SPLITS",
        value_delimiter = ',',
        default_value = "train,validation",
        global = true
    )]
    splits: Vec<String>,

    /// Log extraction progress every N patches.
    #[arg(long, env = "PATCHPREP_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE, global = true)]
    batch_size: usize,

    /// Source image lookup ('recursive' or 'flat').
    #[arg(long, env = "PATCHPREP_IMAGE_LOOKUP", default_value = "recursive", global = true)]
    image_lookup: String,

    /// Rows the encoders are fitted on ('all' or 'train').
    #[arg(long, env = "PATCHPREP_FIT_SCOPE", default_value = "all", global = true)]
    fit_scope: String,
}

impl ConfigArgs {
    fn into_config(self) -> Result<PipelineConfig, PatchprepError> {
        Ok(PipelineConfig {
            data_dir: self.data_dir,
            out_dir: self.out_dir,
            image_size: self.image_size,
            splits: self.splits,
            batch_size: self.batch_size,
            image_lookup: self.image_lookup.parse()?,
            fit_scope: self.fit_scope.parse()?,
        })
    }
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: plan, extract, metadata, assemble.
    Run(StageArgs),
    /// Extract patches only.
    Extract(StageArgs),
    /// Write the patch metadata table only.
    Metadata(StageArgs),
    /// Assemble the dataset from existing patches and metadata.
    Assemble(StageArgs),
    /// Encode one conditioning vector with the saved encoders.
    Encode(EncodeArgs),
}

/// Arguments for the stage subcommands.
#[derive(clap::Args)]
struct StageArgs {
    /// Output format for the run summary ('text' or 'json').
    #[arg(long, default_value = "text")]
    report: String,
}

/// Arguments for the encode subcommand.
#[derive(clap::Args)]
struct EncodeArgs {
    /// Defect label.
    #[arg(long)]
    label: String,

    /// Box aspect ratio (width / height).
    #[arg(long)]
    aspect_ratio: f64,

    /// Box area in pixels.
    #[arg(long)]
    area: f64,

    /// Encoders file (defaults to `{out-dir}/encoders.json`).
    #[arg(long)]
    encoders: Option<PathBuf>,
}

/// Run the patchprep CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), PatchprepError> {
    let cli = Cli::parse();
    let config = cli.config.into_config()?;
    let cancel = extract::CancelToken::new();

    match cli.command {
        Some(Commands::Run(args)) => {
            let report = pipeline::run_pipeline(&config, &cancel)?;
            print_report(&report, &args.report)
        }
        Some(Commands::Extract(args)) => {
            let report = pipeline::run_extract(&config, &cancel)?;
            print_report(&report, &args.report)
        }
        Some(Commands::Metadata(args)) => {
            let report = pipeline::run_metadata(&config)?;
            print_report(&report, &args.report)
        }
        Some(Commands::Assemble(args)) => {
            let report = pipeline::run_assemble(&config)?;
            print_report(&report, &args.report)
        }
        Some(Commands::Encode(args)) => run_encode(&config, args),
        None => {
            println!("patchprep {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Defect-patch dataset preparation.");
            println!();
            println!("Run 'patchprep --help' for usage information.");
            Ok(())
        }
    }
}

fn print_report(report: &RunReport, format: &str) -> Result<(), PatchprepError> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(report).map_err(PatchprepError::ReportJson)?;
            println!("{json}");
        }
        "text" => print!("{report}"),
        other => {
            return Err(PatchprepError::InvalidConfig(format!(
                "report format '{other}' (supported: text, json)"
            )));
        }
    }
    Ok(())
}

/// Execute the encode subcommand.
fn run_encode(config: &PipelineConfig, args: EncodeArgs) -> Result<(), PatchprepError> {
    let path = args.encoders.unwrap_or_else(|| config.encoders_path());
    let encoders = assemble::FeatureEncoders::load(&path)?;
    let vector = encoders.encode(&args.label, args.aspect_ratio, args.area)?;

    let json = serde_json::to_string(&vector).map_err(PatchprepError::ReportJson)?;
    println!("{json}");
    Ok(())
}
