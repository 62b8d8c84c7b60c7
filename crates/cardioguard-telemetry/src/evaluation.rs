//! Offline model quality and business cost evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Errors produced while evaluating or persisting reports
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("cannot evaluate an empty label set")]
    Empty,

    #[error("label at index {index} is {value}, expected 0 or 1")]
    InvalidLabel { index: usize, value: u8 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Binary confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionCounts {
    /// Count outcomes; inputs must already be checked
    fn tally(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut counts = Self::default();
        for (truth, pred) in y_true.iter().zip(y_pred) {
            match (truth, pred) {
                (0, 0) => counts.tn += 1,
                (0, _) => counts.fp += 1,
                (_, 0) => counts.fn_ += 1,
                _ => counts.tp += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }
}

/// Quality metrics for one model on one labeled set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_name: String,
    pub timestamp: DateTime<Utc>,
    pub n_samples: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub specificity: f64,
    pub sensitivity: f64,
    pub confusion_matrix: ConfusionCounts,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_precision: Option<f64>,

    /// Score threshold maximising TPR - FPR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimal_threshold: Option<f64>,
}

impl EvaluationReport {
    /// Value of a comparable metric by name
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "accuracy" => Some(self.accuracy),
            "precision" => Some(self.precision),
            "recall" => Some(self.recall),
            "f1_score" => Some(self.f1_score),
            "roc_auc" => self.roc_auc,
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model Performance Summary: {}", self.model_name)?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Samples Evaluated: {}", self.n_samples)?;
        writeln!(f, "Timestamp: {}", self.timestamp.to_rfc3339())?;
        writeln!(f)?;
        writeln!(f, "Classification Metrics:")?;
        writeln!(f, "  - Accuracy:    {:.4}", self.accuracy)?;
        writeln!(f, "  - Precision:   {:.4}", self.precision)?;
        writeln!(f, "  - Recall:      {:.4}", self.recall)?;
        writeln!(f, "  - F1-Score:    {:.4}", self.f1_score)?;
        writeln!(f, "  - Sensitivity: {:.4}", self.sensitivity)?;
        writeln!(f, "  - Specificity: {:.4}", self.specificity)?;
        if let Some(auc) = self.roc_auc {
            writeln!(f, "  - ROC-AUC:     {:.4}", auc)?;
        }
        if let Some(ap) = self.average_precision {
            writeln!(f, "  - Avg Precision: {:.4}", ap)?;
        }
        if let Some(threshold) = self.optimal_threshold {
            writeln!(f, "  - Optimal Threshold: {:.4}", threshold)?;
        }
        writeln!(f)?;
        writeln!(f, "Confusion Matrix:")?;
        writeln!(f, "  - True Negatives:  {}", self.confusion_matrix.tn)?;
        writeln!(f, "  - False Positives: {}", self.confusion_matrix.fp)?;
        writeln!(f, "  - False Negatives: {}", self.confusion_matrix.fn_)?;
        write!(f, "  - True Positives:  {}", self.confusion_matrix.tp)
    }
}

/// Cost of misclassification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusinessCostSummary {
    pub false_positives: usize,
    pub false_negatives: usize,
    pub cost_fp: f64,
    pub cost_fn: f64,
    pub total_cost: f64,
    pub avg_cost_per_prediction: f64,
}

impl BusinessCostSummary {
    /// Default cost of an unnecessary follow-up
    pub const DEFAULT_COST_FP: f64 = 1.0;
    /// Default cost of a missed diagnosis
    pub const DEFAULT_COST_FN: f64 = 10.0;

    pub fn from_confusion(counts: &ConfusionCounts, cost_fp: f64, cost_fn: f64) -> Self {
        let total_cost = counts.fp as f64 * cost_fp + counts.fn_ as f64 * cost_fn;
        let n = counts.total();
        let avg_cost_per_prediction = if n == 0 { 0.0 } else { total_cost / n as f64 };
        Self {
            false_positives: counts.fp,
            false_negatives: counts.fn_,
            cost_fp,
            cost_fn,
            total_cost,
            avg_cost_per_prediction,
        }
    }
}

impl fmt::Display for BusinessCostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Business Cost (FP = {}, FN = {}):", self.cost_fp, self.cost_fn)?;
        writeln!(f, "  - False Positives: {}", self.false_positives)?;
        writeln!(f, "  - False Negatives: {}", self.false_negatives)?;
        writeln!(f, "  - Total Cost:      {:.2}", self.total_cost)?;
        write!(f, "  - Avg Cost/Prediction: {:.4}", self.avg_cost_per_prediction)
    }
}

/// Best model for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModel {
    pub model: String,
    pub value: f64,
}

/// Side-by-side comparison of several reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub models: Vec<String>,
    pub best_by_metric: BTreeMap<String, BestModel>,
}

/// Metrics compared across models
pub const COMPARED_METRICS: [&str; 5] = ["accuracy", "precision", "recall", "f1_score", "roc_auc"];

/// Evaluates predictions against labels and keeps a history of reports
#[derive(Debug, Default)]
pub struct MetricsEvaluator {
    history: Vec<EvaluationReport>,
}

impl MetricsEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports produced so far, oldest first
    pub fn history(&self) -> &[EvaluationReport] {
        &self.history
    }

    /// Evaluate hard predictions and optional positive-class scores
    pub fn evaluate(
        &mut self,
        y_true: &[u8],
        y_pred: &[u8],
        y_score: Option<&[f64]>,
        model_name: &str,
    ) -> Result<EvaluationReport> {
        check_labels(y_true, y_pred)?;
        if let Some(scores) = y_score {
            check_length("y_score", y_true.len(), scores.len())?;
        }

        let cm = ConfusionCounts::tally(y_true, y_pred);
        let n = cm.total();
        let precision = ratio(cm.tp, cm.tp + cm.fp);
        let recall = ratio(cm.tp, cm.tp + cm.fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let mut report = EvaluationReport {
            model_name: model_name.to_string(),
            timestamp: Utc::now(),
            n_samples: n,
            accuracy: ratio(cm.tp + cm.tn, n),
            precision,
            recall,
            f1_score,
            specificity: ratio(cm.tn, cm.tn + cm.fp),
            sensitivity: recall,
            confusion_matrix: cm,
            roc_auc: None,
            average_precision: None,
            optimal_threshold: None,
        };

        if let Some(scores) = y_score {
            let positives = y_true.iter().filter(|y| **y == 1).count();
            if positives == 0 || positives == n {
                warn!(
                    model = model_name,
                    "only one class present, skipping probability-based metrics"
                );
            } else {
                report.roc_auc = Some(roc_auc(y_true, scores));
                report.average_precision = Some(average_precision(y_true, scores));
                report.optimal_threshold = optimal_threshold(y_true, scores);
            }
        }

        info!(
            model = model_name,
            accuracy = report.accuracy,
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1_score,
            roc_auc = ?report.roc_auc,
            "model evaluated"
        );

        self.history.push(report.clone());
        Ok(report)
    }

    /// Best model per compared metric; ties go to the first report
    pub fn compare(reports: &[EvaluationReport]) -> ModelComparison {
        if reports.is_empty() {
            return ModelComparison::default();
        }

        let mut best_by_metric = BTreeMap::new();
        for metric in COMPARED_METRICS {
            let mut best: Option<BestModel> = None;
            for report in reports {
                let value = report.metric(metric).unwrap_or(0.0);
                if best.as_ref().map_or(true, |b| value > b.value) {
                    best = Some(BestModel {
                        model: report.model_name.clone(),
                        value,
                    });
                }
            }
            if let Some(best) = best {
                best_by_metric.insert(metric.to_string(), best);
            }
        }

        ModelComparison {
            models: reports.iter().map(|r| r.model_name.clone()).collect(),
            best_by_metric,
        }
    }

    /// Misclassification cost for a prediction set
    pub fn business_cost(
        y_true: &[u8],
        y_pred: &[u8],
        cost_fp: f64,
        cost_fn: f64,
    ) -> Result<BusinessCostSummary> {
        check_labels(y_true, y_pred)?;
        let cm = ConfusionCounts::tally(y_true, y_pred);
        Ok(BusinessCostSummary::from_confusion(&cm, cost_fp, cost_fn))
    }

    /// Write a report as pretty JSON, creating parent directories
    pub fn save_report(report: &EvaluationReport, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec_pretty(report)?)?;
        info!(path = %path.display(), "evaluation report saved");
        Ok(())
    }

    pub fn load_report(path: &Path) -> Result<EvaluationReport> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn check_length(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(EvaluationError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_labels(y_true: &[u8], y_pred: &[u8]) -> Result<()> {
    if y_true.is_empty() {
        return Err(EvaluationError::Empty);
    }
    check_length("y_pred", y_true.len(), y_pred.len())?;
    for (index, value) in y_true.iter().chain(y_pred).enumerate() {
        if *value > 1 {
            return Err(EvaluationError::InvalidLabel {
                index: index % y_true.len(),
                value: *value,
            });
        }
    }
    Ok(())
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Indices sorted by descending score
fn descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
    order
}

/// Cumulative (fp, tp, threshold) at each distinct score, highest first
fn threshold_counts(y_true: &[u8], scores: &[f64]) -> Vec<(usize, usize, f64)> {
    let order = descending(scores);
    let mut points = Vec::new();
    let (mut fp, mut tp) = (0, 0);
    for (pos, idx) in order.iter().enumerate() {
        if y_true[*idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |next| scores[*next] != scores[*idx]);
        if last_of_group {
            points.push((fp, tp, scores[*idx]));
        }
    }
    points
}

/// Area under the ROC curve via the rank statistic, ties averaged
fn roc_auc(y_true: &[u8], scores: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied scores share the mean rank
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        let tied_positives = order[start..=end]
            .iter()
            .filter(|idx| y_true[**idx] == 1)
            .count();
        rank_sum += mean_rank * tied_positives as f64;
        start = end + 1;
    }

    let positives = y_true.iter().filter(|y| **y == 1).count() as f64;
    let negatives = y_true.len() as f64 - positives;
    (rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

/// Step-wise area under the precision-recall curve
fn average_precision(y_true: &[u8], scores: &[f64]) -> f64 {
    let positives = y_true.iter().filter(|y| **y == 1).count() as f64;
    let mut ap = 0.0;
    let mut prev_recall = 0.0;
    for (fp, tp, _) in threshold_counts(y_true, scores) {
        let recall = tp as f64 / positives;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    ap
}

/// Threshold maximising Youden's J; `None` if no finite threshold beats the origin
fn optimal_threshold(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|y| **y == 1).count() as f64;
    let negatives = y_true.len() as f64 - positives;

    let mut best: Option<(f64, f64)> = None;
    let mut best_j = 0.0;
    for (fp, tp, threshold) in threshold_counts(y_true, scores) {
        let j = tp as f64 / positives - fp as f64 / negatives;
        if j > best_j {
            best_j = j;
            best = Some((j, threshold));
        }
    }
    best.map(|(_, threshold)| threshold)
}
