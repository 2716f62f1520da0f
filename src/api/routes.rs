use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencySnapshot, UpstreamLatency};
use crate::error::{AppError, Result};
use crate::resolver::{validate_vin, VinResolver};
use crate::state::VinCache;
use crate::types::{ConditionInput, OfferResult, VehicleRecord};
use crate::valuation::{appraise, calculate_offer, estimate_base_value, vehicle_age};

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<dyn VinResolver>,
    pub cache: Arc<VinCache>,
    pub health: Arc<HealthState>,
    pub latency: Arc<UpstreamLatency>,
    /// Injected so valuations are reproducible under test.
    pub current_year: fn() -> i32,
}

impl ApiState {
    /// Validate, then serve from cache or the upstream resolver.
    /// Invalid VINs return before anything upstream is touched.
    pub async fn lookup_vin(&self, raw: &str) -> Result<(String, VehicleRecord)> {
        let vin = validate_vin(raw)?;
        self.health.record_lookup();

        if let Some(vehicle) = self.cache.get(&vin) {
            self.health.record_cache_hit();
            debug!(vin = %vin, "VIN cache hit");
            return Ok((vin, vehicle));
        }

        let started = Instant::now();
        let result = self.resolver.resolve(&vin).await;
        let elapsed = started.elapsed();
        self.latency.record(elapsed);

        match result {
            Ok(vehicle) => {
                self.health.record_upstream_success(unix_secs());
                self.cache.insert(&vin, vehicle.clone());
                info!(
                    vin = %vin,
                    provider = self.resolver.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "VIN decoded: {} {} {}",
                    vehicle.year.map(|y| y.to_string()).unwrap_or_default(),
                    vehicle.make,
                    vehicle.model,
                );
                Ok((vin, vehicle))
            }
            Err(AppError::NotFound(v)) => {
                info!(vin = %vin, provider = self.resolver.name(), "VIN not found upstream");
                Err(AppError::NotFound(v))
            }
            Err(e) => {
                self.health.record_upstream_failure();
                warn!(vin = %vin, provider = self.resolver.name(), error = %e, "VIN lookup failed");
                Err(e)
            }
        }
    }
}

pub fn router(state: ApiState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/api/vin/:vin", get(decode_vin))
        .route("/api/valuation/:vin", get(value_by_vin))
        .route("/api/valuation", post(value_from_attributes))
        .route("/api/offer", post(create_offer))
        .layer(cors)
        .with_state(state)
}

/// Empty origin list means any origin may call the API.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {o}");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ValuationQuery {
    /// Kept as text so a malformed figure is ignored rather than rejected.
    pub mileage: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRequest {
    pub vehicle: VehicleRecord,
    #[serde(default)]
    pub mileage: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub vin: Option<String>,
    pub vehicle: Option<VehicleRecord>,
    #[serde(default)]
    pub base_value: Option<serde_json::Value>,
    /// Model year when no vehicle record accompanies a bare base value.
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(default)]
    pub condition: ConditionInput,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: &'static str,
    pub vin_cache_entries: usize,
    pub lookups: HealthSnapshot,
}

#[derive(Serialize)]
pub struct DecodeResponse {
    pub success: bool,
    pub vin: String,
    pub vehicle: VehicleRecord,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    pub vehicle: VehicleRecord,
    pub base_value: u32,
    pub market_value: Option<u32>,
    pub confidence: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleRecord>,
    #[serde(flatten)]
    pub offer: OfferResult,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        provider: state.resolver.name(),
        vin_cache_entries: state.cache.len(),
        lookups: state.health.snapshot(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySnapshot> {
    Json(state.latency.snapshot())
}

async fn decode_vin(
    State(state): State<ApiState>,
    Path(vin): Path<String>,
) -> Result<Json<DecodeResponse>> {
    let (vin, vehicle) = state.lookup_vin(&vin).await?;
    Ok(Json(DecodeResponse {
        success: true,
        vin,
        vehicle,
    }))
}

async fn value_by_vin(
    State(state): State<ApiState>,
    Path(vin): Path<String>,
    Query(params): Query<ValuationQuery>,
) -> Result<Json<ValuationResponse>> {
    let (vin, vehicle) = state.lookup_vin(&vin).await?;
    let mileage = params.mileage.as_deref().and_then(parse_lenient_u32_str);
    let valuation = appraise(&vehicle, mileage, (state.current_year)());

    Ok(Json(ValuationResponse {
        success: true,
        vin: Some(vin),
        vehicle,
        base_value: valuation.base_value,
        market_value: valuation.market_value,
        confidence: valuation.confidence,
    }))
}

async fn value_from_attributes(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ValuationRequest>, JsonRejection>,
) -> Result<Json<ValuationResponse>> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let mileage = req.mileage.as_ref().and_then(lenient_u32);
    let valuation = appraise(&req.vehicle, mileage, (state.current_year)());

    Ok(Json(ValuationResponse {
        success: true,
        vin: None,
        vehicle: req.vehicle,
        base_value: valuation.base_value,
        market_value: valuation.market_value,
        confidence: valuation.confidence,
    }))
}

async fn create_offer(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<OfferRequest>, JsonRejection>,
) -> Result<Json<OfferResponse>> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let current_year = (state.current_year)();

    let vehicle = match (req.vehicle, req.vin.as_deref()) {
        (Some(vehicle), Some(vin)) => {
            validate_vin(vin)?;
            Some(vehicle)
        }
        (Some(vehicle), None) => Some(vehicle),
        (None, Some(vin)) => Some(state.lookup_vin(vin).await?.1),
        (None, None) => None,
    };

    let supplied_base = req.base_value.as_ref().and_then(lenient_u32).filter(|b| *b > 0);
    let base_value = match (supplied_base, vehicle.as_ref()) {
        (Some(base), _) => base,
        (None, Some(v)) => estimate_base_value(v, current_year),
        (None, None) => {
            return Err(AppError::Validation(
                "Provide a vin, a vehicle or a baseValue".to_string(),
            ))
        }
    };

    let year = vehicle
        .as_ref()
        .and_then(|v| v.year)
        .or_else(|| req.year.as_ref().and_then(lenient_u32).map(|y| y as i32));
    let age = vehicle_age(year, current_year);

    let offer = calculate_offer(base_value, &req.condition, age);
    info!(
        base_value,
        age,
        offer = offer.offer_amount,
        deductions = offer.breakdown.condition_deductions.len(),
        mileage_penalty = offer.breakdown.mileage_penalty,
        "Offer calculated"
    );

    Ok(Json(OfferResponse {
        success: true,
        vehicle,
        offer,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lenient_u32(v: &serde_json::Value) -> Option<u32> {
    match v {
        serde_json::Value::Number(n) => n.as_f64().and_then(f64_to_u32),
        serde_json::Value::String(s) => parse_lenient_u32_str(s),
        _ => None,
    }
}

fn parse_lenient_u32_str(s: &str) -> Option<u32> {
    s.trim().replace(',', "").parse::<f64>().ok().and_then(f64_to_u32)
}

fn f64_to_u32(n: f64) -> Option<u32> {
    (n.is_finite() && n >= 0.0 && n <= f64::from(u32::MAX)).then(|| n.trunc() as u32)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
