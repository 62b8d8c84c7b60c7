//! Column-wise preprocessing applied ahead of the estimator
//!
//! Steps are applied in declaration order and their outputs concatenated,
//! followed by any passthrough columns in input order. Output names use the
//! `num__`, `cat__` and `remainder__` prefixes so explanations are labelled
//! in the space the coefficients were fitted in.

use cardioguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declarative preprocessor as stored in an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorSpec {
    #[serde(default)]
    pub steps: Vec<StepSpec>,

    /// What happens to columns no step mentions
    #[serde(default)]
    pub remainder: Remainder,
}

/// One fitted transformation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepSpec {
    StandardScaler {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<String>,
        categories: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remainder {
    #[default]
    Drop,
    Passthrough,
}

#[derive(Debug, Clone)]
enum Step {
    Scale {
        columns: Vec<usize>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<usize>,
        categories: Vec<Vec<f64>>,
    },
}

/// Compiled preprocessor with column positions resolved against the input schema
#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_width: usize,
    steps: Vec<Step>,
    passthrough: Vec<usize>,
    output_names: Vec<String>,
}

impl Preprocessor {
    /// Identity transform over the given input names
    pub fn identity(input_names: &[String]) -> Self {
        Self {
            input_width: input_names.len(),
            steps: Vec::new(),
            passthrough: (0..input_names.len()).collect(),
            output_names: input_names.to_vec(),
        }
    }

    /// Resolve and validate a spec against the artifact's input names
    pub fn compile(spec: &PreprocessorSpec, input_names: &[String]) -> Result<Self> {
        let mut used = HashSet::new();
        let mut steps = Vec::with_capacity(spec.steps.len());
        let mut output_names = Vec::new();

        for step in &spec.steps {
            match step {
                StepSpec::StandardScaler {
                    columns,
                    mean,
                    scale,
                } => {
                    if mean.len() != columns.len() || scale.len() != columns.len() {
                        return Err(Error::artifact(format!(
                            "standard_scaler has {} columns but {} means and {} scales",
                            columns.len(),
                            mean.len(),
                            scale.len()
                        )));
                    }
                    if let Some(bad) = scale.iter().find(|s| !s.is_finite() || **s == 0.0) {
                        return Err(Error::artifact(format!(
                            "standard_scaler scale must be finite and non-zero, got {}",
                            bad
                        )));
                    }
                    if mean.iter().any(|m| !m.is_finite()) {
                        return Err(Error::artifact("standard_scaler mean must be finite"));
                    }

                    let positions = resolve_columns(columns, input_names, &mut used)?;
                    output_names.extend(columns.iter().map(|c| format!("num__{}", c)));
                    steps.push(Step::Scale {
                        columns: positions,
                        mean: mean.clone(),
                        scale: scale.clone(),
                    });
                }
                StepSpec::OneHot {
                    columns,
                    categories,
                } => {
                    if categories.len() != columns.len() {
                        return Err(Error::artifact(format!(
                            "one_hot has {} columns but {} category lists",
                            columns.len(),
                            categories.len()
                        )));
                    }
                    if categories.iter().any(|c| c.is_empty()) {
                        return Err(Error::artifact("one_hot category list must not be empty"));
                    }

                    let positions = resolve_columns(columns, input_names, &mut used)?;
                    for (column, cats) in columns.iter().zip(categories) {
                        output_names.extend(
                            cats.iter()
                                .map(|cat| format!("cat__{}_{}", column, format_category(*cat))),
                        );
                    }
                    steps.push(Step::OneHot {
                        columns: positions,
                        categories: categories.clone(),
                    });
                }
            }
        }

        let passthrough: Vec<usize> = match spec.remainder {
            Remainder::Drop => Vec::new(),
            Remainder::Passthrough => (0..input_names.len())
                .filter(|idx| !used.contains(idx))
                .collect(),
        };
        output_names.extend(
            passthrough
                .iter()
                .map(|idx| format!("remainder__{}", input_names[*idx])),
        );

        if output_names.is_empty() {
            return Err(Error::artifact("preprocessor produces no output columns"));
        }

        Ok(Self {
            input_width: input_names.len(),
            steps,
            passthrough,
            output_names,
        })
    }

    /// Names of the transformed features, in output order
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn output_width(&self) -> usize {
        self.output_names.len()
    }

    /// Transform one row
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.input_width {
            return Err(Error::inference(format!(
                "preprocessor expects {} inputs, got {}",
                self.input_width,
                row.len()
            )));
        }

        let mut out = Vec::with_capacity(self.output_names.len());
        for step in &self.steps {
            match step {
                Step::Scale {
                    columns,
                    mean,
                    scale,
                } => {
                    for ((col, m), s) in columns.iter().zip(mean).zip(scale) {
                        out.push((row[*col] - m) / s);
                    }
                }
                Step::OneHot {
                    columns,
                    categories,
                } => {
                    // Unknown categories encode as all zeros
                    for (col, cats) in columns.iter().zip(categories) {
                        let value = row[*col];
                        out.extend(cats.iter().map(|c| if *c == value { 1.0 } else { 0.0 }));
                    }
                }
            }
        }
        out.extend(self.passthrough.iter().map(|idx| row[*idx]));

        Ok(out)
    }
}

fn resolve_columns(
    columns: &[String],
    input_names: &[String],
    used: &mut HashSet<usize>,
) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|column| {
            let idx = input_names
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| Error::artifact(format!("unknown preprocessor column '{}'", column)))?;
            if !used.insert(idx) {
                return Err(Error::artifact(format!(
                    "column '{}' is transformed more than once",
                    column
                )));
            }
            Ok(idx)
        })
        .collect()
}

fn format_category(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
