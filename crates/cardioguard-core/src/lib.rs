//! CardioGuard Core
//!
//! Data model, feature schema and validation shared across CardioGuard
//! components.
//!
//! This crate provides:
//! - The 13-field clinical record schema and its declared bounds
//! - Guardrail validation producing immutable [`ClinicalRecord`]s
//! - Deterministic vectorization into model input order
//! - Risk tiers and prediction result types
//! - The error taxonomy the gateway maps onto HTTP statuses

pub mod error;
pub mod schema;
pub mod types;
pub mod validation;
pub mod vectorizer;

pub use error::{Error, Result};
pub use schema::{feature_names, FieldKind, FieldSpec, FEATURE_COUNT, FEATURE_ORDER, FIELD_SPECS};
pub use types::{ClinicalRecord, FeatureContribution, FeatureVector, PredictionResult, RiskTier};
pub use validation::{GuardrailPolicy, ValidationErrors, Validator, Violation, ViolationKind};
pub use vectorizer::{check_schema, vectorize, vectorize_all};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ClinicalRecord, FeatureVector, PredictionResult, RiskTier};
    pub use crate::validation::{GuardrailPolicy, Validator};
    pub use crate::vectorizer::{vectorize, vectorize_all};
}
