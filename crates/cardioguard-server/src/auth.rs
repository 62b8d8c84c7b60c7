//! Shared-secret API key authentication

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use cardioguard_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ApiError;
use crate::request_id::RequestId;
use crate::state::AppState;

/// Header carrying the credential
pub const API_KEY_HEADER: &str = "x-api-key";

/// Well-known key used outside production when none is configured
pub const DEV_API_KEY: &str = "dev-api-key";

/// The gateway's configured credential
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Whether this is the development fallback key
    pub fn is_dev_default(&self) -> bool {
        &*self.0 == DEV_API_KEY
    }

    /// Constant-time comparison against a presented credential
    pub fn verify(&self, presented: Option<&str>) -> Result<()> {
        let presented = presented.ok_or_else(|| Error::auth("Invalid or missing API Key"))?;
        if bool::from(self.0.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(Error::auth("Invalid or missing API Key"))
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Middleware: require a valid API key, then admit through the rate limiter
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_default();

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = state.api_key.verify(presented) {
        warn!(request_id = %request_id, path = %req.uri().path(), "rejected request with invalid API key");
        return Err(ApiError::new(e, &request_id));
    }

    // Keyed by credential; with a single shared key this is a global limit
    if let Some(key) = presented {
        if let Err(e) = state.rate_limiter.check(key) {
            warn!(request_id = %request_id, "rate limit exceeded");
            return Err(ApiError::new(e, &request_id));
        }
    }

    Ok(next.run(req).await)
}
