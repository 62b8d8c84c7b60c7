//! Offline scoring of a JSON-lines file of records

use anyhow::{bail, Context};
use cardioguard_core::{vectorize_all, ClinicalRecord, RiskTier, Validator};
use cardioguard_model::{ModelPaths, ModelSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::cli::PredictArgs;
use crate::config::GatewayConfig;

/// A line that could not be turned into a record
#[derive(Debug, Clone)]
pub struct RejectedLine {
    /// 1-based line number in the input
    pub line: usize,
    pub reason: String,
}

/// Records read from an input file, in file order
#[derive(Debug, Default)]
pub struct RecordFile {
    pub records: Vec<ClinicalRecord>,
    pub rejected: Vec<RejectedLine>,
}

impl RecordFile {
    /// Read one record object per line, skipping blank lines
    pub fn read<R: BufRead>(reader: R, validator: &Validator) -> anyhow::Result<Self> {
        let mut file = Self::default();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.context("failed to read input")?;
            if line.trim().is_empty() {
                continue;
            }

            let candidate: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(e) => {
                    file.rejected.push(RejectedLine {
                        line: line_no + 1,
                        reason: format!("unparseable JSON: {}", e),
                    });
                    continue;
                }
            };

            match validator.validate(&candidate) {
                Ok(record) => file.records.push(record),
                Err(errors) => file.rejected.push(RejectedLine {
                    line: line_no + 1,
                    reason: errors.to_string(),
                }),
            }
        }

        Ok(file)
    }
}

/// One scored record as written to the output file
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: ClinicalRecord,
    pub prediction: u8,
    pub probability: f64,
    pub risk_level: RiskTier,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Aggregate view of a scoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub total_instances: usize,
    pub predicted_positive: usize,
    pub predicted_negative: usize,
    pub risk_distribution: RiskDistribution,
    pub timestamp: DateTime<Utc>,
}

impl PredictionSummary {
    pub fn from_scored(rows: &[ScoredRecord]) -> Self {
        let mut distribution = RiskDistribution::default();
        for row in rows {
            match row.risk_level {
                RiskTier::High => distribution.high += 1,
                RiskTier::Medium => distribution.medium += 1,
                RiskTier::Low => distribution.low += 1,
            }
        }
        let predicted_positive = rows.iter().filter(|row| row.prediction == 1).count();

        Self {
            total_instances: rows.len(),
            predicted_positive,
            predicted_negative: rows.len() - predicted_positive,
            risk_distribution: distribution,
            timestamp: Utc::now(),
        }
    }
}

/// Score records in a single batched call
pub fn score_records(
    snapshot: &ModelSnapshot,
    records: Vec<ClinicalRecord>,
) -> anyhow::Result<Vec<ScoredRecord>> {
    let vectors = vectorize_all(&records);
    let predictions = snapshot.predict(&vectors)?;
    let timestamp = Utc::now();

    Ok(records
        .into_iter()
        .zip(predictions)
        .map(|(record, raw)| ScoredRecord {
            record,
            prediction: raw.label,
            probability: raw.probability,
            risk_level: raw.risk_tier(),
            timestamp,
        })
        .collect())
}

/// `<dir>/<stem>_summary.json` next to the predictions file
pub fn summary_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("predictions");
    output.with_file_name(format!("{}_summary.json", stem))
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn write_jsonl(path: &Path, rows: &[ScoredRecord]) -> anyhow::Result<()> {
    create_parent(path)?;
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// `cardioguard predict`
pub fn run(args: &PredictArgs) -> anyhow::Result<PredictionSummary> {
    let validator = GatewayConfig::from_sources(&args.config)?.validator();

    let mut paths = ModelPaths::new(args.artifact.clone());
    if let Some(metadata) = &args.metadata {
        paths = paths.with_metadata(metadata.clone());
    }
    let snapshot = ModelSnapshot::load(&paths)
        .with_context(|| format!("failed to load model from {}", args.artifact.display()))?;

    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("failed to open input {}", args.input.display()))?;
    let input = RecordFile::read(std::io::BufReader::new(file), &validator)?;
    info!(
        valid = input.records.len(),
        rejected = input.rejected.len(),
        "input loaded"
    );

    for rejected in &input.rejected {
        warn!(line = rejected.line, reason = %rejected.reason, "invalid record");
    }
    if !input.rejected.is_empty() && !args.skip_invalid {
        bail!(
            "{} invalid record(s) in {}; rerun with --skip-invalid to drop them",
            input.rejected.len(),
            args.input.display()
        );
    }
    if input.records.is_empty() {
        bail!("no valid records in {}", args.input.display());
    }

    let scored = score_records(&snapshot, input.records)?;
    write_jsonl(&args.output, &scored)
        .with_context(|| format!("failed to write predictions to {}", args.output.display()))?;
    info!(path = %args.output.display(), rows = scored.len(), "predictions saved");

    let summary = PredictionSummary::from_scored(&scored);
    let percent = summary.predicted_positive as f64 / summary.total_instances as f64 * 100.0;
    println!("Prediction Summary:");
    println!("  Total instances: {}", summary.total_instances);
    println!(
        "  Predicted positive: {} ({:.1}%)",
        summary.predicted_positive, percent
    );
    println!("  Risk levels:");
    println!("    High:   {}", summary.risk_distribution.high);
    println!("    Medium: {}", summary.risk_distribution.medium);
    println!("    Low:    {}", summary.risk_distribution.low);

    if args.save_summary {
        let path = summary_path(&args.output);
        std::fs::write(&path, serde_json::to_vec_pretty(&summary)?)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "summary saved");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const VALID: &str = r#"{"age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1, "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 0, "ca": 0, "thal": 1}"#;
    const LOW_RISK: &str = r#"{"age": 41, "sex": 0, "cp": 1, "trestbps": 130, "chol": 204, "fbs": 0, "restecg": 0, "thalach": 172, "exang": 0, "oldpeak": 1.4, "slope": 2, "ca": 0, "thal": 2}"#;

    fn bundled_model() -> ModelPaths {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../models");
        ModelPaths::new(root.join("artifacts/best_model.json"))
    }

    fn args_for(dir: &TempDir, input: &str) -> PredictArgs {
        let input_path = dir.path().join("patients.jsonl");
        std::fs::write(&input_path, input).unwrap();
        PredictArgs {
            config: dir.path().join("absent.yaml"),
            artifact: bundled_model().artifact,
            metadata: None,
            input: input_path,
            output: dir.path().join("out/predictions.jsonl"),
            skip_invalid: false,
            save_summary: false,
            verbose: false,
        }
    }

    #[test]
    fn test_read_reports_line_numbers() {
        let data = format!("{}\n\nnot json\n{{\"age\": 63}}\n{}\n", VALID, LOW_RISK);
        let file = RecordFile::read(Cursor::new(data), &Validator::default()).unwrap();

        assert_eq!(file.records.len(), 2);
        let lines: Vec<usize> = file.rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 4]);
        assert!(file.rejected[1].reason.contains("field required"));
    }

    #[test]
    fn test_summary_counts_tiers() {
        let snapshot = ModelSnapshot::load(&bundled_model()).unwrap();
        let data = format!("{}\n{}\n{}\n", VALID, LOW_RISK, VALID);
        let file = RecordFile::read(Cursor::new(data), &Validator::default()).unwrap();

        let scored = score_records(&snapshot, file.records).unwrap();
        assert_eq!(scored.len(), 3);
        for row in &scored {
            assert_eq!(row.risk_level, RiskTier::from_probability(row.probability));
        }

        let summary = PredictionSummary::from_scored(&scored);
        let dist = &summary.risk_distribution;
        assert_eq!(summary.total_instances, 3);
        assert_eq!(dist.high + dist.medium + dist.low, 3);
        assert_eq!(summary.predicted_positive + summary.predicted_negative, 3);
    }

    #[test]
    fn test_summary_path_sits_next_to_output() {
        assert_eq!(
            summary_path(Path::new("out/predictions.jsonl")),
            PathBuf::from("out/predictions_summary.json")
        );
    }

    #[test]
    fn test_run_writes_predictions_and_summary() {
        let dir = TempDir::new().unwrap();
        let mut args = args_for(&dir, &format!("{}\n{}\n", VALID, LOW_RISK));
        args.save_summary = true;

        let summary = run(&args).unwrap();
        assert_eq!(summary.total_instances, 2);

        let written = std::fs::read_to_string(&args.output).unwrap();
        let rows: Vec<Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["age"], 63.0);
        assert_eq!(rows[1]["age"], 41.0);
        assert!(rows.iter().all(|row| row.get("risk_level").is_some()));

        let saved: PredictionSummary =
            serde_json::from_slice(&std::fs::read(summary_path(&args.output)).unwrap()).unwrap();
        assert_eq!(saved, summary);
    }

    #[test]
    fn test_run_rejects_invalid_unless_skipped() {
        let dir = TempDir::new().unwrap();
        let mut args = args_for(&dir, &format!("{}\n{{\"age\": 200}}\n", VALID));

        assert!(run(&args).is_err());
        assert!(!args.output.exists());

        args.skip_invalid = true;
        assert_eq!(run(&args).unwrap().total_instances, 1);
    }
}
