//! Record to model-input conversion

use crate::error::{Error, Result};
use crate::schema::{FEATURE_COUNT, FEATURE_ORDER};
use crate::types::{ClinicalRecord, FeatureVector};

/// Convert a validated record into the ordered vector the model expects
pub fn vectorize(record: &ClinicalRecord) -> FeatureVector {
    FeatureVector::new(record.values().to_vec())
}

/// Vectorize a slice of records, preserving order
pub fn vectorize_all(records: &[ClinicalRecord]) -> Vec<FeatureVector> {
    records.iter().map(vectorize).collect()
}

/// Verify that an artifact's declared inputs match `FEATURE_ORDER`
///
/// Run once per load. A mismatch means the artifact was trained on a
/// different schema and must not be served.
pub fn check_schema(expected_names: &[String]) -> Result<()> {
    if expected_names.len() != FEATURE_COUNT {
        return Err(Error::config(format!(
            "model expects {} input features, gateway provides {}",
            expected_names.len(),
            FEATURE_COUNT
        )));
    }

    for (idx, (expected, actual)) in expected_names.iter().zip(FEATURE_ORDER.iter()).enumerate() {
        if expected != actual {
            return Err(Error::config(format!(
                "feature {} mismatch: model expects '{}', gateway provides '{}'",
                idx, expected, actual
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::feature_names;
    use crate::validation::Validator;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_vectorize_preserves_order() {
        let record = Validator::default()
            .validate(&json!({
                "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
                "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 0,
                "ca": 0, "thal": 1
            }))
            .unwrap();

        let vector = vectorize(&record);
        assert_eq!(vector.len(), FEATURE_COUNT);
        assert_eq!(
            vector.as_slice(),
            &[63.0, 1.0, 3.0, 145.0, 233.0, 1.0, 0.0, 150.0, 0.0, 2.3, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_check_schema_accepts_matching_names() {
        assert!(check_schema(&feature_names()).is_ok());
    }

    #[test]
    fn test_check_schema_rejects_width_mismatch() {
        let mut names = feature_names();
        names.pop();
        assert!(matches!(check_schema(&names), Err(Error::Config(_))));
    }

    #[test]
    fn test_check_schema_rejects_reordering() {
        let mut names = feature_names();
        names.swap(0, 1);
        let err = check_schema(&names).unwrap_err();
        assert!(err.to_string().contains("feature 0 mismatch"));
    }

    fn record_strategy() -> impl Strategy<Value = ClinicalRecord> {
        (
            30.0f64..=80.0,
            0u8..=1,
            0u8..=3,
            120.0f64..=200.0,
            100.0f64..=400.0,
            0u8..=1,
            0.0f64..=4.0,
            80.0f64..=140.0,
        )
            .prop_map(|(age, sex, cp, trestbps, chol, flag, oldpeak, thalach)| {
                Validator::default()
                    .validate(&json!({
                        "age": age, "sex": sex, "cp": cp, "trestbps": trestbps,
                        "chol": chol, "fbs": flag, "restecg": 1, "thalach": thalach,
                        "exang": flag, "oldpeak": oldpeak, "slope": 1, "ca": 1, "thal": 2
                    }))
                    .unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_vectorize_is_idempotent(record in record_strategy()) {
            let first = vectorize(&record);
            let second = vectorize(&record);
            prop_assert_eq!(first.len(), FEATURE_COUNT);
            for (a, b) in first.as_slice().iter().zip(second.as_slice()) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }
}
