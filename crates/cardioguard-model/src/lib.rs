//! CardioGuard Model
//!
//! Model artifacts and inference for the CardioGuard gateway.
//!
//! An artifact carries the input schema, an optional column preprocessor
//! and one fitted estimator. Loading resolves it into an immutable
//! [`ModelSnapshot`] whose [`ModelCapability`] decides whether predictions
//! carry probabilities and explanations. The [`ModelHost`] owns the active
//! snapshot and swaps it atomically on reload.
//!
//! Linear estimators run batched through candle tensors on the CPU.

pub mod artifact;
pub mod estimator;
pub mod explain;
pub mod host;
pub mod preprocess;
pub mod snapshot;

pub use artifact::{EstimatorSpec, ModelArtifact, TreeNode, TreeSpec};
pub use estimator::{Estimator, ModelCapability};
pub use explain::{explain, TOP_CONTRIBUTORS};
pub use host::{predict_offloaded, ModelHost, ModelStatus};
pub use preprocess::{Preprocessor, PreprocessorSpec, Remainder, StepSpec};
pub use snapshot::{ModelPaths, ModelSnapshot, RawPrediction, SnapshotMetadata};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::estimator::ModelCapability;
    pub use crate::explain::explain;
    pub use crate::host::{predict_offloaded, ModelHost};
    pub use crate::snapshot::{ModelPaths, ModelSnapshot, RawPrediction};
}
