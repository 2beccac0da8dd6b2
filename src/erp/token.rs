use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::ErpConfig;
use crate::errors::ServiceError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// In-process cache for the ERP bearer token. Refresh is single-flight:
/// the async mutex is held across the upstream call, so concurrent
/// callers that find the token stale serialize and all but the first
/// reuse the freshly fetched one.
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub async fn bearer(
        &self,
        http: &reqwest::Client,
        config: &ErpConfig,
    ) -> Result<String, ServiceError> {
        let mut guard = self.inner.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let refreshed = request_token(http, config).await?;
        let token = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(token)
    }

    /// Drops the cached token so the next call re-authenticates. Used
    /// when the ERP answers 401 with a token we believed was still valid.
    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

async fn request_token(
    http: &reqwest::Client,
    config: &ErpConfig,
) -> Result<CachedToken, ServiceError> {
    let mut form = vec![
        ("grant_type", "client_credentials".to_string()),
        ("client_id", config.client_id.clone()),
        ("client_secret", config.client_secret.clone()),
    ];
    if let Some(scope) = &config.scope {
        form.push(("scope", scope.clone()));
    }

    debug!(token_url = %config.token_url, "Requesting ERP access token");

    let response = http
        .post(&config.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, "ERP token request failed");
            ServiceError::ExternalServiceError(format!(
                "Failed to reach ERP token endpoint: {}",
                e
            ))
        })?;

    let status = response.status();
    if !status.is_success() {
        error!(status = %status, "ERP token endpoint returned an error");
        return Err(ServiceError::ExternalServiceError(format!(
            "ERP token endpoint returned {}",
            status
        )));
    }

    let token: TokenResponse = response.json().await.map_err(|e| {
        error!(error = %e, "ERP token response could not be parsed");
        ServiceError::ExternalServiceError(format!("Invalid ERP token response: {}", e))
    })?;

    let lifetime =
        Duration::from_secs(token.expires_in).saturating_sub(config.token_refresh_margin());

    Ok(CachedToken {
        access_token: token.access_token,
        expires_at: Instant::now() + lifetime,
    })
}
