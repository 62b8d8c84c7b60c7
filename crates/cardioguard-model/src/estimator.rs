//! Compiled estimators
//!
//! Linear models score whole batches with a single candle matmul; forests
//! walk their trees row by row.

use candle_core::{Device, Tensor};
use cardioguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::{EstimatorSpec, TreeNode, TreeSpec};

/// What the loaded estimator can provide, fixed at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    /// Hard labels only
    ClassifierOnly,
    /// Labels and class probabilities
    ProbabilisticClassifier,
    /// Probabilities plus per-feature linear weights
    LinearExplainable,
}

impl ModelCapability {
    pub fn has_probabilities(&self) -> bool {
        !matches!(self, Self::ClassifierOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifierOnly => "classifier_only",
            Self::ProbabilisticClassifier => "probabilistic_classifier",
            Self::LinearExplainable => "linear_explainable",
        }
    }
}

impl fmt::Display for ModelCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-row estimator output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    /// Positive-class probability
    Probability(f64),
    /// Hard label
    Label(u8),
}

/// Linear decision function `x · w + b`
#[derive(Debug, Clone)]
pub struct LinearModel {
    coefficients: Vec<f64>,
    weights: Tensor,
    intercept: f64,
}

impl LinearModel {
    fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self> {
        if coefficients.iter().any(|w| !w.is_finite()) || !intercept.is_finite() {
            return Err(Error::artifact("linear coefficients must be finite"));
        }
        let weights = Tensor::from_slice(coefficients.as_slice(), (coefficients.len(), 1), &Device::Cpu)
            .map_err(|e| Error::artifact(format!("failed to build weight tensor: {}", e)))?;
        Ok(Self {
            coefficients,
            weights,
            intercept,
        })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn width(&self) -> usize {
        self.coefficients.len()
    }

    /// Decision values for a batch, as an `(n, 1)` tensor
    fn decision(&self, rows: &[Vec<f64>]) -> candle_core::Result<Tensor> {
        let flat: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
        let x = Tensor::from_vec(flat, (rows.len(), self.width()), &Device::Cpu)?;
        x.matmul(&self.weights)?.affine(1.0, self.intercept)
    }

    fn probabilities(&self, rows: &[Vec<f64>]) -> candle_core::Result<Vec<f64>> {
        // sigmoid(z) = 1 / (1 + exp(-z))
        self.decision(rows)?
            .neg()?
            .exp()?
            .affine(1.0, 1.0)?
            .recip()?
            .flatten_all()?
            .to_vec1::<f64>()
    }

    fn labels(&self, rows: &[Vec<f64>]) -> candle_core::Result<Vec<u8>> {
        let decision = self.decision(rows)?.flatten_all()?.to_vec1::<f64>()?;
        Ok(decision.into_iter().map(|z| u8::from(z > 0.0)).collect())
    }
}

/// Validated decision tree
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    fn compile(spec: &TreeSpec, width: usize) -> Result<Self> {
        if spec.nodes.is_empty() {
            return Err(Error::artifact("tree has no nodes"));
        }

        for (idx, node) in spec.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= width {
                        return Err(Error::artifact(format!(
                            "tree node {} splits on feature {} of {}",
                            idx, feature, width
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(Error::artifact(format!(
                            "tree node {} has a non-finite threshold",
                            idx
                        )));
                    }
                    // Children must follow their parent so traversal terminates
                    for child in [*left, *right] {
                        if child <= idx || child >= spec.nodes.len() {
                            return Err(Error::artifact(format!(
                                "tree node {} has invalid child index {}",
                                idx, child
                            )));
                        }
                    }
                }
                TreeNode::Leaf { probability } => {
                    if !(0.0..=1.0).contains(probability) {
                        return Err(Error::artifact(format!(
                            "tree leaf {} probability {} outside [0, 1]",
                            idx, probability
                        )));
                    }
                }
            }
        }

        Ok(Self {
            nodes: spec.nodes.clone(),
        })
    }

    fn probability(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { probability } => return *probability,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Estimator with parameters validated against the transformed width
#[derive(Debug, Clone)]
pub enum Estimator {
    Logistic(LinearModel),
    Forest { trees: Vec<Tree>, width: usize },
    LinearSvc(LinearModel),
}

impl Estimator {
    /// Validate a spec against the preprocessor's output width
    pub fn compile(spec: &EstimatorSpec, width: usize) -> Result<Self> {
        match spec {
            EstimatorSpec::LogisticRegression {
                coefficients,
                intercept,
            } => {
                check_width(coefficients.len(), width)?;
                Ok(Self::Logistic(LinearModel::new(coefficients.clone(), *intercept)?))
            }
            EstimatorSpec::LinearSvc {
                coefficients,
                intercept,
            } => {
                check_width(coefficients.len(), width)?;
                Ok(Self::LinearSvc(LinearModel::new(coefficients.clone(), *intercept)?))
            }
            EstimatorSpec::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(Error::artifact("random_forest has no trees"));
                }
                let trees = trees
                    .iter()
                    .map(|tree| Tree::compile(tree, width))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Forest { trees, width })
            }
        }
    }

    pub fn capability(&self) -> ModelCapability {
        match self {
            Self::Logistic(_) => ModelCapability::LinearExplainable,
            Self::Forest { .. } => ModelCapability::ProbabilisticClassifier,
            Self::LinearSvc(_) => ModelCapability::ClassifierOnly,
        }
    }

    /// Weights usable for local explanations, if the model is linear-explainable
    pub fn linear_weights(&self) -> Option<&[f64]> {
        match self {
            Self::Logistic(model) => Some(model.coefficients()),
            _ => None,
        }
    }

    /// Score a batch of transformed rows
    pub fn score(&self, rows: &[Vec<f64>]) -> Result<Vec<Score>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let width = self.width();
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(Error::inference(format!(
                "estimator expects {} features, got {}",
                width,
                row.len()
            )));
        }

        match self {
            Self::Logistic(model) => model
                .probabilities(rows)
                .map(|probs| probs.into_iter().map(Score::Probability).collect())
                .map_err(|e| Error::inference(format!("logistic inference failed: {}", e))),
            Self::LinearSvc(model) => model
                .labels(rows)
                .map(|labels| labels.into_iter().map(Score::Label).collect())
                .map_err(|e| Error::inference(format!("linear_svc inference failed: {}", e))),
            Self::Forest { trees, .. } => Ok(rows
                .iter()
                .map(|row| {
                    let total: f64 = trees.iter().map(|tree| tree.probability(row)).sum();
                    Score::Probability(total / trees.len() as f64)
                })
                .collect()),
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::Logistic(model) | Self::LinearSvc(model) => model.width(),
            Self::Forest { width, .. } => *width,
        }
    }
}

fn check_width(coefficients: usize, width: usize) -> Result<()> {
    if coefficients != width {
        return Err(Error::artifact(format!(
            "estimator has {} coefficients but preprocessor produces {} features",
            coefficients, width
        )));
    }
    Ok(())
}
