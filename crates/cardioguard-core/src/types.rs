//! Core types for CardioGuard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::{FEATURE_COUNT, FEATURE_ORDER};

/// One subject's validated set of input measurements
///
/// Only produced by [`crate::Validator`], so every instance satisfies the
/// per-field bounds and the cross-field guardrails in force at validation
/// time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalRecord {
    age: f64,
    sex: f64,
    cp: f64,
    trestbps: f64,
    chol: f64,
    fbs: f64,
    restecg: f64,
    thalach: f64,
    exang: f64,
    oldpeak: f64,
    slope: f64,
    ca: f64,
    thal: f64,
}

impl ClinicalRecord {
    /// Build from values in `FEATURE_ORDER`
    pub(crate) fn from_ordered(values: [f64; FEATURE_COUNT]) -> Self {
        let [age, sex, cp, trestbps, chol, fbs, restecg, thalach, exang, oldpeak, slope, ca, thal] =
            values;
        Self {
            age,
            sex,
            cp,
            trestbps,
            chol,
            fbs,
            restecg,
            thalach,
            exang,
            oldpeak,
            slope,
            ca,
            thal,
        }
    }

    /// Values in `FEATURE_ORDER`
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.age,
            self.sex,
            self.cp,
            self.trestbps,
            self.chol,
            self.fbs,
            self.restecg,
            self.thalach,
            self.exang,
            self.oldpeak,
            self.slope,
            self.ca,
            self.thal,
        ]
    }

    /// Value of a named field
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_ORDER
            .iter()
            .position(|field| *field == name)
            .map(|idx| self.values()[idx])
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn resting_bp(&self) -> f64 {
        self.trestbps
    }

    pub fn cholesterol(&self) -> f64 {
        self.chol
    }

    pub fn max_heart_rate(&self) -> f64 {
        self.thalach
    }

    pub fn st_depression(&self) -> f64 {
        self.oldpeak
    }

    pub fn vessel_count(&self) -> f64 {
        self.ca
    }
}

/// Ordered model input, produced by [`crate::vectorize`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[f64]> for FeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Discrete risk bucket derived from the positive-class probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Probabilities strictly above this are High
    pub const HIGH_THRESHOLD: f64 = 0.7;
    /// Probabilities strictly above this (and not High) are Medium
    pub const MEDIUM_THRESHOLD: f64 = 0.4;

    /// Map a probability onto a tier
    pub fn from_probability(probability: f64) -> Self {
        if probability > Self::HIGH_THRESHOLD {
            Self::High
        } else if probability > Self::MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a local explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    /// Feature name in the model's transformed space
    pub feature: String,

    /// Absolute contribution magnitude
    pub contribution: f64,
}

/// Response for a single scored record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Binary prediction (0: no disease, 1: disease)
    pub prediction: u8,

    /// Positive-class probability (0.0-1.0)
    pub probability: f64,

    /// Tier derived from `probability`
    pub risk_level: RiskTier,

    /// Model confidence (0.0-1.0)
    pub confidence: f64,

    pub timestamp: DateTime<Utc>,

    /// Correlation id of the request that produced this result
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_contributors: Option<Vec<FeatureContribution>>,
}
