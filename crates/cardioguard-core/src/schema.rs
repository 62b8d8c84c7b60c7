//! Inbound record schema: field order and per-field bounds
//!
//! Bounds are deliberately wide. They reject physically impossible values
//! while letting rare clinical extremes through; they are not the ranges
//! seen in the training data.

/// Number of model input features
pub const FEATURE_COUNT: usize = 13;

/// Field order the model was trained on
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// How a field's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Continuous measurement
    Continuous,
    /// Ordinal or categorical code carried as a number
    Code,
    /// Flag that must be exactly 0 or 1
    Binary,
}

/// Declared bound for one input field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub kind: FieldKind,
    pub description: &'static str,
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        min: f64,
        max: f64,
        kind: FieldKind,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            min,
            max,
            kind,
            description,
        }
    }

    /// Inclusive range check
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Field specifications in `FEATURE_ORDER`
pub const FIELD_SPECS: [FieldSpec; FEATURE_COUNT] = [
    FieldSpec::new("age", 1.0, 120.0, FieldKind::Continuous, "Age in years"),
    FieldSpec::new("sex", 0.0, 1.0, FieldKind::Binary, "Sex (0: female, 1: male)"),
    FieldSpec::new("cp", 0.0, 3.0, FieldKind::Code, "Chest pain type"),
    FieldSpec::new("trestbps", 50.0, 300.0, FieldKind::Continuous, "Resting blood pressure (mm Hg)"),
    FieldSpec::new("chol", 50.0, 800.0, FieldKind::Continuous, "Serum cholesterol (mg/dl)"),
    FieldSpec::new("fbs", 0.0, 1.0, FieldKind::Binary, "Fasting blood sugar > 120 mg/dl"),
    FieldSpec::new("restecg", 0.0, 2.0, FieldKind::Code, "Resting ECG result"),
    FieldSpec::new("thalach", 30.0, 250.0, FieldKind::Continuous, "Maximum heart rate achieved"),
    FieldSpec::new("exang", 0.0, 1.0, FieldKind::Binary, "Exercise induced angina"),
    FieldSpec::new("oldpeak", 0.0, 10.0, FieldKind::Continuous, "ST depression induced by exercise"),
    FieldSpec::new("slope", 0.0, 2.0, FieldKind::Code, "Slope of peak exercise ST segment"),
    FieldSpec::new("ca", 0.0, 4.0, FieldKind::Code, "Number of major vessels"),
    FieldSpec::new("thal", 0.0, 3.0, FieldKind::Code, "Thalassemia code"),
];

/// Look up a field specification by name
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELD_SPECS.iter().find(|spec| spec.name == name)
}

/// Owned copy of the feature names, as reported by the info endpoint
pub fn feature_names() -> Vec<String> {
    FEATURE_ORDER.iter().map(|name| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs_follow_feature_order() {
        for (spec, name) in FIELD_SPECS.iter().zip(FEATURE_ORDER.iter()) {
            assert_eq!(spec.name, *name);
            assert!(spec.min <= spec.max);
        }
    }

    #[test]
    fn test_range_is_inclusive() {
        let age = field_spec("age").unwrap();
        assert!(age.contains(1.0));
        assert!(age.contains(120.0));
        assert!(!age.contains(0.5));
        assert!(!age.contains(120.01));
    }
}
