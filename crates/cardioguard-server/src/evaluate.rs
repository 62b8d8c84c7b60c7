//! Offline evaluation of a model against a labelled JSON-lines dataset

use anyhow::{bail, Context};
use cardioguard_core::{vectorize_all, ClinicalRecord, Validator};
use cardioguard_model::{ModelPaths, ModelSnapshot};
use cardioguard_telemetry::{BusinessCostSummary, EvaluationReport, MetricsEvaluator};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use tracing::{info, warn};

use crate::cli::EvaluateArgs;
use crate::config::GatewayConfig;

#[derive(Debug, Deserialize)]
struct LabelledRow {
    record: Value,
    label: u8,
}

/// Valid rows of a dataset, plus how many were skipped
#[derive(Debug, Default)]
pub struct LabelledDataset {
    pub records: Vec<ClinicalRecord>,
    pub labels: Vec<u8>,
    pub skipped: usize,
}

impl LabelledDataset {
    /// Read `{"record": {...}, "label": 0|1}` lines, skipping blank lines
    ///
    /// Unparseable lines, invalid records and labels outside {0, 1} are
    /// counted and dropped.
    pub fn read<R: BufRead>(reader: R, validator: &Validator) -> anyhow::Result<Self> {
        let mut dataset = Self::default();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.context("failed to read dataset")?;
            if line.trim().is_empty() {
                continue;
            }

            let row: LabelledRow = match serde_json::from_str(&line) {
                Ok(row) => row,
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "skipping unparseable row");
                    dataset.skipped += 1;
                    continue;
                }
            };
            if row.label > 1 {
                warn!(line = line_no + 1, label = row.label, "skipping row with non-binary label");
                dataset.skipped += 1;
                continue;
            }

            match validator.validate(&row.record) {
                Ok(record) => {
                    dataset.records.push(record);
                    dataset.labels.push(row.label);
                }
                Err(errors) => {
                    warn!(line = line_no + 1, errors = %errors, "skipping invalid record");
                    dataset.skipped += 1;
                }
            }
        }

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of one offline evaluation
#[derive(Debug)]
pub struct DatasetEvaluation {
    pub report: EvaluationReport,
    pub cost: BusinessCostSummary,
    pub skipped: usize,
}

/// Score a dataset through `snapshot` and evaluate the predictions
pub fn evaluate_dataset(
    snapshot: &ModelSnapshot,
    dataset: &LabelledDataset,
    cost_fp: f64,
    cost_fn: f64,
) -> anyhow::Result<DatasetEvaluation> {
    if dataset.is_empty() {
        bail!("dataset has no valid rows ({} skipped)", dataset.skipped);
    }

    let vectors = vectorize_all(&dataset.records);
    let predictions = snapshot.predict(&vectors)?;

    let y_pred: Vec<u8> = predictions.iter().map(|p| p.label).collect();
    let y_score: Option<Vec<f64>> = snapshot
        .capability()
        .has_probabilities()
        .then(|| predictions.iter().map(|p| p.probability).collect());

    let name = format!("{}@{}", snapshot.metadata().name, snapshot.version());
    let mut evaluator = MetricsEvaluator::new();
    let report = evaluator.evaluate(&dataset.labels, &y_pred, y_score.as_deref(), &name)?;
    let cost = BusinessCostSummary::from_confusion(&report.confusion_matrix, cost_fp, cost_fn);

    Ok(DatasetEvaluation {
        report,
        cost,
        skipped: dataset.skipped,
    })
}

/// `cardioguard evaluate`
pub fn run(args: &EvaluateArgs) -> anyhow::Result<()> {
    let mut paths = ModelPaths::new(args.artifact.clone());
    if let Some(metadata) = &args.metadata {
        paths = paths.with_metadata(metadata.clone());
    }
    let snapshot = ModelSnapshot::load(&paths)
        .with_context(|| format!("failed to load model from {}", args.artifact.display()))?;

    let file = std::fs::File::open(&args.data)
        .with_context(|| format!("failed to open dataset {}", args.data.display()))?;
    let validator = GatewayConfig::from_sources(&args.config)?.validator();
    let dataset = LabelledDataset::read(std::io::BufReader::new(file), &validator)?;
    info!(rows = dataset.len(), skipped = dataset.skipped, "dataset loaded");

    let outcome = evaluate_dataset(&snapshot, &dataset, args.cost_fp, args.cost_fn)?;

    println!("{}", outcome.report);
    println!("{}", outcome.cost);
    if outcome.skipped > 0 {
        println!("Skipped rows: {}", outcome.skipped);
    }

    if let Some(output) = &args.output {
        MetricsEvaluator::save_report(&outcome.report, output)
            .with_context(|| format!("failed to write report to {}", output.display()))?;
    }

    Ok(())
}
