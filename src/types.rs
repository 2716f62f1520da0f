use serde::{Deserialize, Deserializer, Serialize};

pub const UNKNOWN: &str = "Unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Vehicle
// ---------------------------------------------------------------------------

/// Structured vehicle attributes, either decoded from a VIN or posted by the
/// client. Every field tolerates absence: strings fall back to "Unknown",
/// numerics to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    #[serde(default, deserialize_with = "lenient_i32")]
    pub year: Option<i32>,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub make: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub model: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub trim: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub body_class: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub fuel_type: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub drive_type: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub engine_cylinders: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub displacement_l: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub horsepower: Option<u32>,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub gvwr: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub manufacturer: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub plant_location: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub msrp: Option<f64>,
}

impl Default for VehicleRecord {
    fn default() -> Self {
        Self {
            year: None,
            make: unknown(),
            model: unknown(),
            trim: unknown(),
            body_class: unknown(),
            fuel_type: unknown(),
            drive_type: unknown(),
            engine_cylinders: None,
            displacement_l: None,
            horsepower: None,
            gvwr: unknown(),
            manufacturer: unknown(),
            plant_location: unknown(),
            msrp: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Seller-reported condition. Omitted flags count as "ok".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionInput {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub mileage: Option<u32>,
    #[serde(default = "default_true")]
    pub tires_ok: bool,
    #[serde(default = "default_true")]
    pub windshield_ok: bool,
    #[serde(default = "default_true")]
    pub lights_ok: bool,
    #[serde(default = "default_true")]
    pub accident_free: bool,
    #[serde(default)]
    pub has_photos: bool,
}

impl Default for ConditionInput {
    fn default() -> Self {
        Self {
            mileage: None,
            tires_ok: true,
            windshield_ok: true,
            lights_ok: true,
            accident_free: true,
            has_photos: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    pub base_value: u32,
    pub market_value: Option<u32>,
    pub confidence: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deduction {
    pub item: &'static str,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferBreakdown {
    pub base_value: u32,
    pub condition_deductions: Vec<Deduction>,
    pub expected_mileage: u32,
    pub actual_mileage: Option<u32>,
    pub mileage_penalty: u32,
    /// Value after condition and mileage, before the instant-purchase margin.
    pub subtotal: u32,
    pub instant_offer_multiplier: f64,
    pub margin: u32,
    pub minimum_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferResult {
    pub offer_amount: u32,
    pub confidence_band: u32,
    pub valid_days: u32,
    pub valid_miles: u32,
    pub breakdown: OfferBreakdown,
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------
//
// Front ends send numbers as strings ("2019", "") as often as numbers, and the
// engine must never reject a request over an unparsable numeric. Anything that
// does not parse becomes `None`.

fn lenient_number<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|n| n.is_finite()))
}

fn lenient_i32<'de, D>(d: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(d)?
        .filter(|n| *n >= i32::MIN as f64 && *n <= i32::MAX as f64)
        .map(|n| n.trunc() as i32))
}

fn lenient_u32<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(d)?
        .filter(|n| *n >= 0.0 && *n <= u32::MAX as f64)
        .map(|n| n.trunc() as u32))
}

fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(d)
}

fn string_or_unknown<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => unknown(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_vehicle_defaults_missing_fields() {
        let v: VehicleRecord = serde_json::from_str(r#"{"make":"Honda","year":"2019"}"#).unwrap();
        assert_eq!(v.year, Some(2019));
        assert_eq!(v.make, "Honda");
        assert_eq!(v.model, UNKNOWN);
        assert_eq!(v.body_class, UNKNOWN);
        assert_eq!(v.engine_cylinders, None);
        assert_eq!(v.msrp, None);
    }

    #[test]
    fn unparsable_numerics_become_none() {
        let v: VehicleRecord = serde_json::from_str(
            r#"{"year":"abc","engineCylinders":"","msrp":null,"horsepower":-5,"model":""}"#,
        )
        .unwrap();
        assert_eq!(v.year, None);
        assert_eq!(v.engine_cylinders, None);
        assert_eq!(v.msrp, None);
        assert_eq!(v.horsepower, None);
        assert_eq!(v.model, UNKNOWN);
    }

    #[test]
    fn omitted_condition_flags_are_ok() {
        let c: ConditionInput = serde_json::from_str(r#"{"mileage":"42000","tiresOk":false}"#).unwrap();
        assert_eq!(c.mileage, Some(42_000));
        assert!(!c.tires_ok);
        assert!(c.windshield_ok && c.lights_ok && c.accident_free);
        assert!(!c.has_photos);
    }
}
