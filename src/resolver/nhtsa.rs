use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{status_error, transport_error, VinResolver};
use crate::config::USER_AGENT;
use crate::error::{AppError, Result};
use crate::types::{VehicleRecord, UNKNOWN};

const PROVIDER: &str = "nhtsa";

/// Free public decoder (NHTSA vPIC `DecodeVinValues`).
pub struct NhtsaResolver {
    client: reqwest::Client,
    base_url: String,
}

impl NhtsaResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VinResolver for NhtsaResolver {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn resolve(&self, vin: &str) -> Result<VehicleRecord> {
        let url = format!("{}/vehicles/DecodeVinValues/{}?format=json", self.base_url, vin);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(vin = %vin, %status, "NHTSA decode failed");
            return Err(status_error(PROVIDER, vin, status));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| transport_error(PROVIDER, e))?;
        match parse_decode_values(&body) {
            Some(vehicle) => {
                debug!(vin = %vin, make = %vehicle.make, year = ?vehicle.year, "NHTSA decode ok");
                Ok(vehicle)
            }
            None => Err(AppError::NotFound(vin.to_string())),
        }
    }
}

/// Map a vPIC `DecodeVinValues` payload to a `VehicleRecord`.
/// Returns None when the decoder resolved neither make nor model year.
pub fn parse_decode_values(v: &serde_json::Value) -> Option<VehicleRecord> {
    let row = v.get("Results")?.as_array()?.first()?;

    let field = |name: &str| -> Option<String> {
        row.get(name)
            .and_then(|x| x.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("Not Applicable"))
            .map(str::to_string)
    };
    let number = |name: &str| -> Option<f64> { field(name).and_then(|s| s.parse::<f64>().ok()) };
    let text = |name: &str| field(name).unwrap_or_else(|| UNKNOWN.to_string());

    let make = field("Make");
    let year = number("ModelYear").map(|y| y as i32);
    if make.is_none() && year.is_none() {
        return None;
    }

    let plant_location = ["PlantCity", "PlantState", "PlantCountry"]
        .iter()
        .filter_map(|k| field(*k))
        .collect::<Vec<_>>()
        .join(", ");

    Some(VehicleRecord {
        year,
        make: make.unwrap_or_else(|| UNKNOWN.to_string()),
        model: text("Model"),
        trim: text("Trim"),
        body_class: text("BodyClass"),
        fuel_type: fuel_type(field("FuelTypePrimary"), field("ElectrificationLevel")),
        drive_type: text("DriveType"),
        engine_cylinders: number("EngineCylinders").map(|c| c as u32),
        displacement_l: number("DisplacementL"),
        horsepower: number("EngineHP").map(|hp| hp.round() as u32),
        gvwr: text("GVWR"),
        manufacturer: text("Manufacturer"),
        plant_location: if plant_location.is_empty() {
            UNKNOWN.to_string()
        } else {
            plant_location
        },
        msrp: number("BasePrice").filter(|p| *p > 0.0),
    })
}

/// vPIC reports hybrids as a gasoline primary fuel plus an electrification
/// level; fold the two so downstream matching sees "hybrid"/"electric".
fn fuel_type(primary: Option<String>, electrification: Option<String>) -> String {
    let level = electrification.unwrap_or_default().to_lowercase();
    match primary {
        Some(p) => {
            let lower = p.to_lowercase();
            if level.contains("hybrid") && !lower.contains("hybrid") && !lower.contains("electric") {
                format!("{p} Hybrid")
            } else {
                p
            }
        }
        None if level.contains("hybrid") => "Hybrid".to_string(),
        None if level.contains("bev") || level.contains("electric") => "Electric".to_string(),
        None => UNKNOWN.to_string(),
    }
}
