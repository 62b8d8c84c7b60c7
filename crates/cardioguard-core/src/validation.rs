//! Record validation with medical plausibility guardrails
//!
//! Validation is all-or-nothing: a candidate either becomes a
//! [`ClinicalRecord`] or is rejected with every violated field and rule.
//! Cross-field guardrails are only evaluated once all per-field checks
//! have passed, since they assume in-range inputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::schema::{FieldKind, FEATURE_COUNT, FIELD_SPECS};
use crate::types::ClinicalRecord;

/// What rule a violation broke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    /// The candidate was not a key/value object
    NotAnObject,
    Missing,
    NotNumeric,
    NotBinary,
    OutOfRange { min: f64, max: f64 },
    HemodynamicInconsistency,
    PediatricVesselCount,
    HeartRateAboveAgeCeiling,
}

/// A single field-level or cross-field violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending field (the primary field for cross-field rules)
    pub field: String,

    #[serde(flatten)]
    pub kind: ViolationKind,

    /// Human-readable explanation
    pub message: String,
}

impl Violation {
    fn new(field: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Aggregated rejection of one candidate record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether any violation is of the given kind
    pub fn contains_kind(&self, kind: &ViolationKind) -> bool {
        self.violations.iter().any(|v| &v.kind == kind)
    }

    /// Whether any violation names the given field
    pub fn contains_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Tunable constants for the cross-field guardrails
///
/// These are heuristic guardrails, not cited clinical thresholds. Changing
/// them needs product sign-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    /// Lowest acceptable `trestbps - oldpeak * st_pressure_factor`
    #[serde(default = "default_min_pulse_pressure")]
    pub min_pulse_pressure: f64,

    #[serde(default = "default_st_pressure_factor")]
    pub st_pressure_factor: f64,

    /// Ages strictly below this are pediatric
    #[serde(default = "default_pediatric_age")]
    pub pediatric_age: f64,

    /// Largest vessel count accepted for a pediatric subject
    #[serde(default = "default_pediatric_max_vessels")]
    pub pediatric_max_vessels: f64,

    /// Predicted max heart rate is `max_heart_rate_base - age`
    #[serde(default = "default_max_heart_rate_base")]
    pub max_heart_rate_base: f64,

    /// Observed max heart rate may exceed the prediction by this factor
    #[serde(default = "default_heart_rate_margin")]
    pub heart_rate_margin: f64,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            min_pulse_pressure: default_min_pulse_pressure(),
            st_pressure_factor: default_st_pressure_factor(),
            pediatric_age: default_pediatric_age(),
            pediatric_max_vessels: default_pediatric_max_vessels(),
            max_heart_rate_base: default_max_heart_rate_base(),
            heart_rate_margin: default_heart_rate_margin(),
        }
    }
}

fn default_min_pulse_pressure() -> f64 {
    30.0
}

fn default_st_pressure_factor() -> f64 {
    10.0
}

fn default_pediatric_age() -> f64 {
    18.0
}

fn default_pediatric_max_vessels() -> f64 {
    2.0
}

fn default_max_heart_rate_base() -> f64 {
    220.0
}

fn default_heart_rate_margin() -> f64 {
    1.10
}

/// Turns untyped candidates into [`ClinicalRecord`]s
#[derive(Debug, Clone, Default)]
pub struct Validator {
    policy: GuardrailPolicy,
}

impl Validator {
    /// Create a validator with the given guardrail policy
    pub fn new(policy: GuardrailPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    /// Validate a candidate record
    pub fn validate(&self, candidate: &Value) -> Result<ClinicalRecord, ValidationErrors> {
        let Some(object) = candidate.as_object() else {
            return Err(ValidationErrors {
                violations: vec![Violation::new(
                    "record",
                    ViolationKind::NotAnObject,
                    "expected an object of named numeric fields",
                )],
            });
        };

        let mut violations = Vec::new();
        let mut values = [0.0; FEATURE_COUNT];

        for (idx, spec) in FIELD_SPECS.iter().enumerate() {
            let Some(raw) = object.get(spec.name) else {
                violations.push(Violation::new(
                    spec.name,
                    ViolationKind::Missing,
                    "field required",
                ));
                continue;
            };

            let Some(value) = raw.as_f64().filter(|v| v.is_finite()) else {
                violations.push(Violation::new(
                    spec.name,
                    ViolationKind::NotNumeric,
                    format!("expected a number, got {}", raw),
                ));
                continue;
            };

            if spec.kind == FieldKind::Binary && value != 0.0 && value != 1.0 {
                violations.push(Violation::new(
                    spec.name,
                    ViolationKind::NotBinary,
                    format!("{} must be 0 or 1, got {}", spec.description, value),
                ));
                continue;
            }

            if !spec.contains(value) {
                violations.push(Violation::new(
                    spec.name,
                    ViolationKind::OutOfRange {
                        min: spec.min,
                        max: spec.max,
                    },
                    format!(
                        "value {} is out of range [{}, {}]",
                        value, spec.min, spec.max
                    ),
                ));
                continue;
            }

            values[idx] = value;
        }

        if !violations.is_empty() {
            return Err(ValidationErrors { violations });
        }

        let record = ClinicalRecord::from_ordered(values);
        let violations = self.check_guardrails(&record);
        if violations.is_empty() {
            Ok(record)
        } else {
            tracing::debug!(count = violations.len(), "record rejected by guardrails");
            Err(ValidationErrors { violations })
        }
    }

    fn check_guardrails(&self, record: &ClinicalRecord) -> Vec<Violation> {
        let policy = &self.policy;
        let mut violations = Vec::new();

        let inferred_pressure =
            record.resting_bp() - record.st_depression() * policy.st_pressure_factor;
        if inferred_pressure < policy.min_pulse_pressure {
            violations.push(Violation::new(
                "trestbps",
                ViolationKind::HemodynamicInconsistency,
                format!(
                    "hemodynamic pattern is inconsistent: inferred pulse pressure {:.1} is below {}",
                    inferred_pressure, policy.min_pulse_pressure
                ),
            ));
        }

        if record.age() < policy.pediatric_age
            && record.vessel_count() > policy.pediatric_max_vessels
        {
            violations.push(Violation::new(
                "ca",
                ViolationKind::PediatricVesselCount,
                format!(
                    "major vessel count {} is implausible for pediatric age {}",
                    record.vessel_count(),
                    record.age()
                ),
            ));
        }

        let ceiling = policy.heart_rate_margin * (policy.max_heart_rate_base - record.age());
        if record.max_heart_rate() > ceiling {
            violations.push(Violation::new(
                "thalach",
                ViolationKind::HeartRateAboveAgeCeiling,
                format!(
                    "heart rate {} seems too high for age {} (max expected ~{})",
                    record.max_heart_rate(),
                    record.age(),
                    ceiling as i64
                ),
            ));
        }

        violations
    }
}
