//! Local explanations for linear models
//!
//! A contribution is `|x'_i * w_i|` in the preprocessed feature space. This is
//! a lightweight proxy, not a calibrated attribution method.

use cardioguard_core::{FeatureContribution, FeatureVector};
use tracing::debug;

use crate::estimator::ModelCapability;
use crate::snapshot::ModelSnapshot;

/// Number of contributors reported per prediction
pub const TOP_CONTRIBUTORS: usize = 3;

/// Contributions at or below this magnitude count as zero
const NEGLIGIBLE: f64 = 1e-12;

/// Top contributors for one vector, or `None` when no explanation applies
pub fn explain(snapshot: &ModelSnapshot, vector: &FeatureVector) -> Option<Vec<FeatureContribution>> {
    if snapshot.capability() != ModelCapability::LinearExplainable {
        return None;
    }
    let weights = snapshot.estimator().linear_weights()?;
    let names = snapshot.preprocessor().output_names();

    let transformed = match snapshot.preprocessor().transform(vector.as_slice()) {
        Ok(row) => row,
        Err(e) => {
            debug!(error = %e, "skipping explanation");
            return None;
        }
    };
    if transformed.len() != weights.len() || names.len() != weights.len() {
        debug!(
            features = transformed.len(),
            weights = weights.len(),
            "skipping explanation on dimension mismatch"
        );
        return None;
    }

    let mut contributions: Vec<(usize, f64)> = transformed
        .iter()
        .zip(weights)
        .map(|(x, w)| (x * w).abs())
        .enumerate()
        .collect();

    if contributions.iter().all(|(_, c)| *c <= NEGLIGIBLE) {
        return None;
    }

    contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
    Some(
        contributions
            .into_iter()
            .take(TOP_CONTRIBUTORS)
            .map(|(idx, contribution)| FeatureContribution {
                feature: names[idx].clone(),
                contribution,
            })
            .collect(),
    )
}
