//! Shared application state

use cardioguard_core::{Result, Validator};
use cardioguard_model::{ModelHost, ModelPaths};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::auth::ApiKey;
use crate::config::GatewayConfig;
use crate::rate_limit::RateLimiter;

/// State handed to every handler and middleware
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<GatewayConfig>,

    /// Owner of the active model snapshot
    pub host: Arc<ModelHost>,

    /// Input validator with the configured guardrail policy
    pub validator: Arc<Validator>,

    /// Per-credential admission control
    pub rate_limiter: Arc<RateLimiter>,

    /// Credential enforced on protected routes
    pub api_key: ApiKey,

    /// Prometheus handle for `/metrics`; absent when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: GatewayConfig, host: ModelHost, api_key: ApiKey) -> Self {
        let validator = config.validator();
        let rate_limiter = RateLimiter::new(config.rate_limit.requests_per_minute);
        Self {
            config: Arc::new(config),
            host: Arc::new(host),
            validator: Arc::new(validator),
            rate_limiter: Arc::new(rate_limiter),
            api_key,
            metrics_handle: None,
        }
    }

    /// Build state from configuration, loading the model if present
    ///
    /// Fails only when the credential cannot be resolved; a missing or
    /// broken model leaves the gateway degraded instead.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;

        let mut paths = ModelPaths::new(config.model.artifact_path.clone());
        if let Some(metadata) = &config.model.metadata_path {
            paths = paths.with_metadata(metadata.clone());
        }
        let host = ModelHost::start(paths);

        Ok(Self::new(config, host, api_key))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
