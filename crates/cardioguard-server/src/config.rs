//! Gateway configuration
//!
//! Sources, lowest precedence first: built-in defaults, the YAML file,
//! `CARDIOGUARD__*` environment variables, the legacy `API_KEY`, `APP_ENV`
//! and `RATE_LIMIT_RPM` variables, then command-line flags.

use cardioguard_core::{Error, GuardrailPolicy, Validator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::auth::{ApiKey, DEV_API_KEY};
use crate::cli::ServeArgs;

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev")]
    Development,
    Test,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Cross-field guardrail constants
    #[serde(default)]
    pub guardrails: GuardrailPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Serialized model artifact (JSON or YAML)
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Optional training metadata document
    #[serde(default = "default_metadata_path")]
    pub metadata_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            metadata_path: default_metadata_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected in `X-API-Key`
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions per credential per 60-second window
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl GatewayConfig {
    /// Load from file and environment, then apply command-line overrides
    pub fn load(config_path: &Path, args: &ServeArgs) -> anyhow::Result<Self> {
        let mut config = Self::from_sources(config_path)?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Load from file and environment only
    ///
    /// Offline commands use this so they validate records with the same
    /// guardrails as the running gateway.
    pub fn from_sources(config_path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("CARDIOGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        config.apply_legacy_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Validator enforcing the configured guardrails
    pub fn validator(&self) -> Validator {
        Validator::new(self.guardrails.clone())
    }

    /// Apply the unprefixed variables older deployments set
    pub fn apply_legacy_env<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("API_KEY").filter(|k| !k.is_empty()) {
            self.auth.api_key = Some(key);
        }
        if let Some(env) = lookup("APP_ENV") {
            self.environment = Environment::parse(&env)
                .ok_or_else(|| Error::config(format!("unknown APP_ENV '{}'", env)))?;
        }
        if let Some(rpm) = lookup("RATE_LIMIT_RPM") {
            self.rate_limit.requests_per_minute = rpm
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("invalid RATE_LIMIT_RPM '{}'", rpm)))?;
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &ServeArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(artifact) = &args.artifact {
            self.model.artifact_path = artifact.clone();
        }
        if let Some(metadata) = &args.metadata {
            self.model.metadata_path = Some(metadata.clone());
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.rate_limit.requests_per_minute == 0 {
            return Err(Error::config("rate_limit.requests_per_minute must be positive"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::config("server.max_body_bytes must be positive"));
        }
        Ok(())
    }

    /// Resolve the credential to enforce
    ///
    /// Production refuses to start without a key; other environments fall
    /// back to the well-known development key.
    pub fn resolve_api_key(&self) -> Result<ApiKey, Error> {
        match self.auth.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Ok(ApiKey::new(key)),
            None if self.environment.is_production() => Err(Error::config(
                "API key must be configured in production (set API_KEY or auth.api_key)",
            )),
            None => {
                warn!(
                    environment = ?self.environment,
                    "no API key configured, using the development key '{}'",
                    DEV_API_KEY
                );
                Ok(ApiKey::new(DEV_API_KEY))
            }
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("models/artifacts/best_model.json")
}

fn default_metadata_path() -> Option<PathBuf> {
    Some(PathBuf::from("models/training_metadata.json"))
}

fn default_requests_per_minute() -> usize {
    120
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rate_limit.requests_per_minute, 120);
        assert_eq!(config.guardrails.min_pulse_pressure, 30.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_and_args() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "environment: test\nserver:\n  port: 9100\nrate_limit:\n  requests_per_minute: 5\nguardrails:\n  heart_rate_margin: 1.2\n",
        )
        .unwrap();

        let args = ServeArgs {
            host: Some("127.0.0.1".to_string()),
            ..Default::default()
        };
        let config = GatewayConfig::load(&path, &args).unwrap();

        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.rate_limit.requests_per_minute, 5);
        assert_eq!(config.guardrails.heart_rate_margin, 1.2);
        assert_eq!(config.guardrails.pediatric_age, 18.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = GatewayConfig::from_sources(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.guardrails.heart_rate_margin, 1.10);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_legacy_env_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_legacy_env(lookup(&[
                ("API_KEY", "s3cret"),
                ("APP_ENV", "prod"),
                ("RATE_LIMIT_RPM", "30"),
            ]))
            .unwrap();

        assert_eq!(config.auth.api_key.as_deref(), Some("s3cret"));
        assert!(config.environment.is_production());
        assert_eq!(config.rate_limit.requests_per_minute, 30);
    }

    #[test]
    fn test_legacy_env_rejects_garbage() {
        let mut config = GatewayConfig::default();
        assert!(config
            .apply_legacy_env(lookup(&[("RATE_LIMIT_RPM", "many")]))
            .is_err());
        assert!(config
            .apply_legacy_env(lookup(&[("APP_ENV", "staging")]))
            .is_err());
    }

    #[test]
    fn test_api_key_resolution() {
        let mut config = GatewayConfig::default();
        assert!(config.resolve_api_key().unwrap().is_dev_default());

        config.environment = Environment::Production;
        assert!(matches!(config.resolve_api_key(), Err(Error::Config(_))));

        config.auth.api_key = Some("prod-key".to_string());
        let key = config.resolve_api_key().unwrap();
        assert!(key.verify(Some("prod-key")).is_ok());
    }

    #[test]
    fn test_zero_rate_limit_is_invalid() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_minute = 0;
        assert!(config.validate().is_err());
    }
}
