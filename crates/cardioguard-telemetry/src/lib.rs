//! CardioGuard Telemetry
//!
//! Model quality evaluation and serving metrics for CardioGuard.
//!
//! Provides:
//! - Offline quality metrics, ROC analysis and model comparison
//! - Business cost of misclassification
//! - Names and descriptions of the gateway's Prometheus metrics

pub mod evaluation;
pub mod serving;

pub use evaluation::{
    BestModel, BusinessCostSummary, ConfusionCounts, EvaluationError, EvaluationReport,
    MetricsEvaluator, ModelComparison,
};
pub use serving::describe_metrics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::evaluation::{BusinessCostSummary, EvaluationReport, MetricsEvaluator};
    pub use crate::serving;
}
