use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ThresholdType;

#[derive(Debug, Parser)]
#[command(
    name = "kira-fliprqc",
    version,
    about = "FLIPR calcium-response analysis, plate QC and diagnosis"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Run(RunArgs),
    Validate(ValidateArgs),
    Batch(BatchArgs),
    Qc(QcArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long, help = "Run configuration JSON")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Plate layout JSON (well labels)")]
    pub layout: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = false,
        help = "Drop the injection-artifact frames before feature extraction"
    )]
    pub remove_artifact: bool,

    #[arg(
        long,
        default_value_t = false,
        conflicts_with = "remove_artifact",
        help = "Keep the injection-artifact frames even if the config removes them"
    )]
    pub keep_artifact: bool,

    #[arg(long, help = "Diagnosis threshold in percent")]
    pub threshold: Option<f64>,

    #[arg(long, value_enum)]
    pub threshold_type: Option<ThresholdTypeArg>,

    #[arg(long, help = "Seconds per frame (overrides the plate header)")]
    pub frame_interval: Option<f64>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, help = "FLIPR export (.txt/.seq1, optionally .gz)")]
    pub data: PathBuf,

    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value_t = false)]
    pub tsv: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(long, help = "FLIPR export (.txt/.seq1, optionally .gz)")]
    pub data: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[arg(long, num_args = 1.., required = true, help = "FLIPR exports (repeatable)")]
    pub data: Vec<PathBuf>,

    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long, default_value_t = false)]
    pub tsv: bool,

    #[arg(long, default_value_t = 0, help = "Number of threads (0 = auto)")]
    pub threads: usize,
}

#[derive(Debug, Args)]
pub struct QcArgs {
    #[command(subcommand)]
    pub command: QcCommand,
}

#[derive(Debug, Subcommand)]
pub enum QcCommand {
    Show(QcShowArgs),
}

#[derive(Debug, Args)]
pub struct QcShowArgs {
    #[arg(long, help = "Run configuration JSON whose registry to show")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThresholdTypeArg {
    Ionomycin,
    PositiveControl,
}

impl From<ThresholdTypeArg> for ThresholdType {
    fn from(arg: ThresholdTypeArg) -> Self {
        match arg {
            ThresholdTypeArg::Ionomycin => ThresholdType::Ionomycin,
            ThresholdTypeArg::PositiveControl => ThresholdType::PositiveControl,
        }
    }
}
