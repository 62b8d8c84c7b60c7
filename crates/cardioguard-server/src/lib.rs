//! CardioGuard Server
//!
//! HTTP gateway serving cardiovascular risk predictions.
//!
//! Protected routes pass API key authentication and per-credential rate
//! limiting before a request reaches the prediction [`pipeline`]. The active
//! model lives in a [`cardioguard_model::ModelHost`] and can be reloaded
//! without restarting the process.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod pipeline;
pub mod predict;
pub mod rate_limit;
pub mod request_id;
pub mod routes;
pub mod state;

pub use auth::{ApiKey, API_KEY_HEADER, DEV_API_KEY};
pub use crate::config::{Environment, GatewayConfig};
pub use error::ApiError;
pub use pipeline::{BatchPrediction, MAX_BATCH, MIN_BATCH};
pub use rate_limit::RateLimiter;
pub use request_id::{RequestId, X_PROCESS_TIME, X_REQUEST_ID};
pub use routes::create_router;
pub use state::AppState;
