use crate::error::{AppError, Result};

pub const NHTSA_API_URL: &str = "https://vpic.nhtsa.dot.gov/api";

/// Required VIN length (ISO 3779).
pub const VIN_LENGTH: usize = 17;

/// Seconds subtracted from a token's advertised lifetime so it is refreshed
/// before the provider starts rejecting it.
pub const TOKEN_EXPIRY_SKEW_SECS: u64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Upper bound on any advertised token lifetime.
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 3600;

pub const USER_AGENT: &str = concat!("vin-offer-api/", env!("CARGO_PKG_VERSION"));

/// Which upstream decoder backs the `VinResolver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Free public NHTSA vPIC decoder.
    Nhtsa,
    /// Paid commercial decoder behind client-credentials auth.
    Premium,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nhtsa" | "" => Ok(ProviderKind::Nhtsa),
            "premium" => Ok(ProviderKind::Premium),
            other => Err(AppError::Config(format!(
                "VIN_PROVIDER must be 'nhtsa' or 'premium', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Nhtsa => "nhtsa",
            ProviderKind::Premium => "premium",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct PremiumCredentials {
    pub api_url: String,
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_port: u16,
    pub log_level: String,
    pub provider: ProviderKind,
    pub nhtsa_api_url: String,
    /// Only populated when `provider == Premium`.
    pub premium: Option<PremiumCredentials>,
    pub upstream_timeout_secs: u64,
    /// 0 disables the decoded-VIN cache (VIN_CACHE_TTL_SECS)
    pub vin_cache_ttl_secs: u64,
    /// Empty means any origin (CORS_ALLOWED_ORIGINS, comma-separated).
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let provider = ProviderKind::parse(&std::env::var("VIN_PROVIDER").unwrap_or_default())?;

        let premium = match provider {
            ProviderKind::Premium => Some(PremiumCredentials {
                api_url: required_var("PREMIUM_API_URL")?,
                auth_url: required_var("PREMIUM_AUTH_URL")?,
                client_id: required_var("PREMIUM_CLIENT_ID")?,
                client_secret: required_var("PREMIUM_CLIENT_SECRET")?,
            }),
            ProviderKind::Nhtsa => None,
        };

        Ok(Self {
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            provider,
            nhtsa_api_url: std::env::var("NHTSA_API_URL")
                .unwrap_or_else(|_| NHTSA_API_URL.to_string()),
            premium,
            upstream_timeout_secs: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse::<u64>()
                .unwrap_or(10),
            vin_cache_ttl_secs: std::env::var("VIN_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse::<u64>()
                .unwrap_or(3600),
            cors_allowed_origins: parse_origins(
                &std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default(),
            ),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::Config(format!(
            "{name} must be set when VIN_PROVIDER=premium"
        ))),
    }
}

/// `*` or an empty list means "allow any origin".
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "*")
        .collect()
}
