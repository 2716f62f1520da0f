//! VIN → vehicle attribute resolution.
//!
//! Two interchangeable upstream decoders sit behind the `VinResolver` trait;
//! which one backs the service is chosen by `VIN_PROVIDER`.

pub mod nhtsa;
pub mod premium;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, ProviderKind, VIN_LENGTH};
use crate::error::{AppError, Result};
use crate::types::VehicleRecord;

pub use nhtsa::NhtsaResolver;
pub use premium::PremiumResolver;

#[async_trait]
pub trait VinResolver: Send + Sync {
    /// Short provider name for logs and the health endpoint.
    fn name(&self) -> &'static str;

    /// Resolve a VIN that already passed `validate_vin`.
    /// Returns `AppError::NotFound` when the provider has no match.
    async fn resolve(&self, vin: &str) -> Result<VehicleRecord>;
}

pub fn build_resolver(cfg: &Config) -> Result<Arc<dyn VinResolver>> {
    let timeout = Duration::from_secs(cfg.upstream_timeout_secs);
    let resolver: Arc<dyn VinResolver> = match cfg.provider {
        ProviderKind::Nhtsa => Arc::new(NhtsaResolver::new(&cfg.nhtsa_api_url, timeout)?),
        ProviderKind::Premium => {
            let creds = cfg.premium.clone().ok_or_else(|| {
                AppError::Config("premium provider selected without credentials".to_string())
            })?;
            Arc::new(PremiumResolver::new(creds, timeout)?)
        }
    };
    info!(provider = resolver.name(), timeout_secs = cfg.upstream_timeout_secs, "VIN resolver ready");
    Ok(resolver)
}

/// Normalize and shape-check a VIN: trimmed, upper-cased, exactly 17
/// characters, alphanumeric, never I/O/Q.
pub fn validate_vin(raw: &str) -> Result<String> {
    let vin = raw.trim().to_ascii_uppercase();
    let len = vin.chars().count();
    if len != VIN_LENGTH {
        return Err(AppError::Validation(format!(
            "VIN must be exactly {VIN_LENGTH} characters (got {len})"
        )));
    }
    if let Some(bad) = vin
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() || matches!(c, 'I' | 'O' | 'Q'))
    {
        return Err(AppError::Validation(format!(
            "VIN contains invalid character '{bad}'"
        )));
    }
    Ok(vin)
}

/// Translate a transport failure into the upstream error taxonomy.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamTimeout(format!("{provider}: {e}"))
    } else {
        AppError::Upstream(format!("{provider}: {e}"))
    }
}

/// Error for a non-success upstream status that is not otherwise special-cased.
pub(crate) fn status_error(provider: &str, vin: &str, status: reqwest::StatusCode) -> AppError {
    match status.as_u16() {
        401 | 403 => AppError::UpstreamAuth(format!("{provider} rejected credentials ({status})")),
        404 => AppError::NotFound(vin.to_string()),
        429 => AppError::RateLimited(format!("{provider} returned {status}")),
        408 | 504 => AppError::UpstreamTimeout(format!("{provider} returned {status}")),
        _ => AppError::Upstream(format!("{provider} returned {status}")),
    }
}
