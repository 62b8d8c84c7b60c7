use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cardioguard")]
#[command(author, version, about = "Cardiovascular risk prediction gateway")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the prediction gateway
    Serve(ServeArgs),

    /// Score a labelled dataset offline and print an evaluation report
    Evaluate(EvaluateArgs),

    /// Score a file of records offline and write per-record predictions
    Predict(PredictArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen address (overrides server.host)
    #[arg(short = 'l', long)]
    pub host: Option<String>,

    /// Listen port (overrides server.port)
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Model artifact path (overrides model.artifact_path)
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Training metadata path (overrides model.metadata_path)
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Configuration file path; its guardrails decide which rows are valid
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Model artifact to evaluate
    #[arg(short, long, default_value = "models/artifacts/best_model.json")]
    pub artifact: PathBuf,

    /// Optional training metadata
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,

    /// Labelled dataset, one `{"record": {...}, "label": 0|1}` object per line
    #[arg(short, long)]
    pub data: PathBuf,

    /// Cost of a false positive
    #[arg(long, default_value_t = 1.0)]
    pub cost_fp: f64,

    /// Cost of a false negative
    #[arg(long, default_value_t = 10.0)]
    pub cost_fn: f64,

    /// Write the report as JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Configuration file path; its guardrails decide which records are valid
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Model artifact to score with
    #[arg(short, long, default_value = "models/artifacts/best_model.json")]
    pub artifact: PathBuf,

    /// Optional training metadata
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,

    /// Records to score, one JSON object per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write predictions as JSON lines
    #[arg(short, long, default_value = "predictions/predictions.jsonl")]
    pub output: PathBuf,

    /// Drop invalid records instead of failing the run
    #[arg(long)]
    pub skip_invalid: bool,

    /// Also write `<output stem>_summary.json` with the risk distribution
    #[arg(long)]
    pub save_summary: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
