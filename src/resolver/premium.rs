use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::token::{IssuedToken, TokenCache, TokenSource};
use super::{status_error, transport_error, VinResolver};
use crate::config::{PremiumCredentials, DEFAULT_TOKEN_TTL_SECS, USER_AGENT};
use crate::error::{AppError, Result};
use crate::types::{VehicleRecord, UNKNOWN};

const PROVIDER: &str = "premium";

/// Paid commercial decoder. Every lookup carries a bearer token obtained via
/// the client-credentials grant and cached in `TokenCache`.
pub struct PremiumResolver {
    client: reqwest::Client,
    api_url: String,
    tokens: TokenCache<ClientCredentials>,
}

impl PremiumResolver {
    pub fn new(creds: PremiumCredentials, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let source = ClientCredentials {
            client: client.clone(),
            auth_url: creds.auth_url,
            client_id: creds.client_id,
            client_secret: creds.client_secret,
        };
        Ok(Self {
            client,
            api_url: creds.api_url.trim_end_matches('/').to_string(),
            tokens: TokenCache::new(source),
        })
    }
}

#[async_trait]
impl VinResolver for PremiumResolver {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn resolve(&self, vin: &str) -> Result<VehicleRecord> {
        let token = self.tokens.get_valid_token().await?;

        let resp = self
            .client
            .get(format!("{}/vin/{}", self.api_url, vin))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            if matches!(status.as_u16(), 401 | 403) {
                // Next request re-authenticates; this one is not retried.
                self.tokens.invalidate().await;
            }
            warn!(vin = %vin, %status, "premium decode failed");
            return Err(status_error(PROVIDER, vin, status));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| transport_error(PROVIDER, e))?;
        let vehicle = parse_vehicle(&body)?.ok_or_else(|| AppError::NotFound(vin.to_string()))?;
        debug!(vin = %vin, make = %vehicle.make, year = ?vehicle.year, "premium decode ok");
        Ok(vehicle)
    }
}

/// Accepts either `{"vehicle": {...}}` or a bare attribute object.
/// `Ok(None)` when the provider answered but resolved nothing usable.
pub fn parse_vehicle(body: &serde_json::Value) -> Result<Option<VehicleRecord>> {
    if body.get("success").and_then(|s| s.as_bool()) == Some(false) {
        return Ok(None);
    }
    let payload = body.get("vehicle").unwrap_or(body);
    if !payload.is_object() {
        return Err(AppError::Upstream(format!(
            "{PROVIDER}: vehicle payload was not an object"
        )));
    }
    let vehicle = VehicleRecord::deserialize(payload)?;
    if vehicle.make == UNKNOWN && vehicle.year.is_none() {
        return Ok(None);
    }
    Ok(Some(vehicle))
}

// ---------------------------------------------------------------------------
// Client-credentials token source
// ---------------------------------------------------------------------------

struct ClientCredentials {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch_token(&self) -> Result<IssuedToken> {
        let resp = self
            .client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        match status.as_u16() {
            200..=299 => {}
            400 | 401 | 403 => {
                return Err(AppError::UpstreamAuth(format!(
                    "{PROVIDER} token endpoint rejected client credentials ({status})"
                )))
            }
            429 => {
                return Err(AppError::RateLimited(format!(
                    "{PROVIDER} token endpoint returned {status}"
                )))
            }
            _ => {
                return Err(AppError::Upstream(format!(
                    "{PROVIDER} token endpoint returned {status}"
                )))
            }
        }

        let token: TokenResponse = resp.json().await.map_err(|e| transport_error(PROVIDER, e))?;
        Ok(IssuedToken {
            access_token: token.access_token,
            expires_in: Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)),
        })
    }
}
