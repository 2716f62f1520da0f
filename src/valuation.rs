//! Rule-based vehicle valuation and instant-offer arithmetic.
//!
//! Everything here is pure and total: missing or nonsensical inputs are
//! coerced to the defaults below rather than rejected.

use chrono::Datelike;

use crate::types::{ConditionInput, Deduction, OfferBreakdown, OfferResult, ValuationResult, VehicleRecord};

/// Average new-vehicle price used as the starting point when no MSRP is known.
pub const BASE_ANCHOR_VALUE: f64 = 35_000.0;

/// Floor for every base value, market value and offer.
pub const MIN_VALUE: u32 = 1_000;

/// Age assumed when the model year is missing or implausible.
pub const DEFAULT_VEHICLE_AGE: u32 = 5;

pub const MAX_DEPRECIATION: f64 = 0.85;

pub const ANNUAL_MILEAGE: u32 = 12_000;

/// Dealer margin versus full retail.
pub const INSTANT_OFFER_MULTIPLIER: f64 = 0.83;

pub mod penalties {
    pub const TIRES: u32 = 400;
    pub const WINDSHIELD: u32 = 300;
    pub const LIGHTS: u32 = 200;
    pub const ACCIDENT: u32 = 2_500;
    /// Per started 1000 miles above the age-expected baseline.
    pub const PER_1000_MILES_OVER: u32 = 100;
}

pub mod market {
    /// Dollars per 1000 miles above (penalty) or below (bonus) baseline.
    pub const MILEAGE_RATE_PER_1000: f64 = 50.0;
    /// Mileage can move the market value at most this fraction of base.
    pub const MAX_MILEAGE_SWING: f64 = 0.20;
    pub const CONFIDENCE_FRACTION: f64 = 0.10;
}

pub const CONFIDENCE_BAND_WITH_PHOTOS: u32 = 500;
pub const CONFIDENCE_BAND_WITHOUT_PHOTOS: u32 = 1_500;
pub const OFFER_VALID_DAYS: u32 = 7;
pub const OFFER_VALID_MILES: u32 = 500;

/// Oldest model year taken at face value.
const EARLIEST_MODEL_YEAR: i32 = 1900;

// ---------------------------------------------------------------------------
// Age & depreciation
// ---------------------------------------------------------------------------

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Vehicle age in whole years. Next-year models count as new; missing or
/// implausible years fall back to `DEFAULT_VEHICLE_AGE`.
pub fn vehicle_age(year: Option<i32>, current_year: i32) -> u32 {
    match year {
        Some(y) if (EARLIEST_MODEL_YEAR..=current_year + 2).contains(&y) => {
            (current_year - y).max(0) as u32
        }
        _ => DEFAULT_VEHICLE_AGE,
    }
}

/// Fraction of the anchor value lost at `age`.
/// 20% in year one, 15%/year through year five, 10%/year after, capped at 85%.
pub fn depreciation_rate(age: u32) -> f64 {
    let rate = match age {
        0 => 0.0,
        1 => 0.20,
        2..=5 => 0.20 + 0.15 * f64::from(age - 1),
        _ => 0.20 + 0.15 * 4.0 + 0.10 * f64::from(age - 5),
    };
    rate.min(MAX_DEPRECIATION)
}

/// Fraction of MSRP retained at `age`, used when the provider supplies MSRP.
pub fn msrp_retention(age: u32) -> f64 {
    match age {
        0..=1 => 0.80,
        2..=3 => 0.65,
        4..=5 => 0.50,
        6..=7 => 0.38,
        8..=10 => 0.25,
        _ => 0.15,
    }
}

// ---------------------------------------------------------------------------
// Categorical multipliers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandTier {
    Premium,
    Reliable,
    Economy,
    /// Only earns a bonus on a truck body.
    DomesticTruck,
    Standard,
}

const PREMIUM_MAKES: &[&str] = &[
    "bmw", "mercedesbenz", "mercedes", "audi", "lexus", "porsche", "jaguar", "landrover",
    "cadillac", "lincoln", "genesis", "infiniti", "acura", "volvo", "tesla", "maserati",
    "bentley",
];
const RELIABLE_MAKES: &[&str] = &["toyota", "honda", "subaru", "mazda"];
const ECONOMY_MAKES: &[&str] = &["kia", "hyundai", "mitsubishi", "nissan", "fiat"];
const DOMESTIC_TRUCK_MAKES: &[&str] = &["ford", "chevrolet", "chevy", "gmc", "ram", "dodge"];

impl BrandTier {
    /// Case-insensitive; punctuation and spacing are ignored ("Mercedes-Benz").
    pub fn from_make(make: &str) -> Self {
        let key: String = make
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let key = key.as_str();
        if PREMIUM_MAKES.contains(&key) {
            BrandTier::Premium
        } else if RELIABLE_MAKES.contains(&key) {
            BrandTier::Reliable
        } else if ECONOMY_MAKES.contains(&key) {
            BrandTier::Economy
        } else if DOMESTIC_TRUCK_MAKES.contains(&key) {
            BrandTier::DomesticTruck
        } else {
            BrandTier::Standard
        }
    }

    fn factor(self, body: BodyCategory) -> f64 {
        match self {
            BrandTier::Premium => 1.4,
            BrandTier::Reliable => 1.15,
            BrandTier::Economy => 0.85,
            BrandTier::DomesticTruck if body == BodyCategory::Truck => 1.3,
            BrandTier::DomesticTruck | BrandTier::Standard => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyCategory {
    Truck,
    Suv,
    Minivan,
    Sporty,
    Other,
}

impl BodyCategory {
    pub fn from_body_class(body_class: &str) -> Self {
        let b = body_class.to_lowercase();
        if b.contains("pickup") || b.contains("truck") {
            BodyCategory::Truck
        } else if b.contains("suv") || b.contains("sport utility") {
            BodyCategory::Suv
        } else if b.contains("minivan") {
            BodyCategory::Minivan
        } else if b.contains("coupe") || b.contains("convertible") {
            BodyCategory::Sporty
        } else {
            BodyCategory::Other
        }
    }

    fn factor(self) -> f64 {
        match self {
            BodyCategory::Truck => 1.25,
            BodyCategory::Suv => 1.15,
            BodyCategory::Minivan => 0.9,
            BodyCategory::Sporty => 1.1,
            BodyCategory::Other => 1.0,
        }
    }
}

/// Combined brand × body factor. A domestic truck brand on a truck body is
/// one truck signal, not two: the larger factor applies once.
pub fn category_multiplier(make: &str, body_class: &str) -> f64 {
    let brand = BrandTier::from_make(make);
    let body = BodyCategory::from_body_class(body_class);
    match (brand, body) {
        (BrandTier::DomesticTruck, BodyCategory::Truck) => brand.factor(body).max(body.factor()),
        _ => brand.factor(body) * body.factor(),
    }
}

pub fn fuel_multiplier(fuel_type: &str) -> f64 {
    let f = fuel_type.to_lowercase();
    // "Plug-in Hybrid Electric" is a hybrid.
    if f.contains("hybrid") {
        1.1
    } else if f.contains("electric") {
        1.2
    } else {
        1.0
    }
}

pub fn engine_multiplier(cylinders: Option<u32>) -> f64 {
    match cylinders {
        Some(c) if c >= 8 => 1.15,
        Some(6) => 1.05,
        _ => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Base & market value
// ---------------------------------------------------------------------------

fn floor_value(v: f64) -> u32 {
    if !v.is_finite() || v < f64::from(MIN_VALUE) {
        MIN_VALUE
    } else {
        v.round().min(f64::from(u32::MAX)) as u32
    }
}

/// Heuristic current worth. MSRP, when known, replaces the anchor model
/// entirely; the two paths never mix.
pub fn estimate_base_value(vehicle: &VehicleRecord, current_year: i32) -> u32 {
    let age = vehicle_age(vehicle.year, current_year);

    if let Some(msrp) = vehicle.msrp.filter(|m| m.is_finite() && *m > 0.0) {
        return floor_value(msrp * msrp_retention(age));
    }

    let value = BASE_ANCHOR_VALUE
        * (1.0 - depreciation_rate(age))
        * category_multiplier(&vehicle.make, &vehicle.body_class)
        * fuel_multiplier(&vehicle.fuel_type)
        * engine_multiplier(vehicle.engine_cylinders);

    floor_value(value)
}

pub fn expected_mileage(age: u32) -> u32 {
    age.saturating_mul(ANNUAL_MILEAGE)
}

/// Base value plus mileage signal. Without a mileage figure only the base
/// value is known; market value and confidence stay empty.
pub fn appraise(vehicle: &VehicleRecord, mileage: Option<u32>, current_year: i32) -> ValuationResult {
    let base_value = estimate_base_value(vehicle, current_year);
    let Some(mileage) = mileage else {
        return ValuationResult {
            base_value,
            market_value: None,
            confidence: None,
        };
    };

    let age = vehicle_age(vehicle.year, current_year);
    let base = f64::from(base_value);
    let delta_k = (f64::from(expected_mileage(age)) - f64::from(mileage)) / 1000.0;
    let max_swing = base * market::MAX_MILEAGE_SWING;
    let adjustment = (delta_k * market::MILEAGE_RATE_PER_1000).clamp(-max_swing, max_swing);

    let market_value = floor_value(base + adjustment);
    let confidence = (f64::from(market_value) * market::CONFIDENCE_FRACTION).round() as u32;

    ValuationResult {
        base_value,
        market_value: Some(market_value),
        confidence: Some(confidence),
    }
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// Instant cash offer from a base value, condition flags and mileage.
/// A base value below the minimum is raised to it, so the offer never exceeds
/// the (coerced) base value.
pub fn calculate_offer(base_value: u32, condition: &ConditionInput, age: u32) -> OfferResult {
    let base_value = base_value.max(MIN_VALUE);

    let mut condition_deductions = Vec::new();
    for (ok, item, amount) in [
        (condition.tires_ok, "tires", penalties::TIRES),
        (condition.windshield_ok, "windshield", penalties::WINDSHIELD),
        (condition.lights_ok, "lights", penalties::LIGHTS),
        (condition.accident_free, "accident_history", penalties::ACCIDENT),
    ] {
        if !ok {
            condition_deductions.push(Deduction { item, amount });
        }
    }
    let condition_total: u32 = condition_deductions.iter().map(|d| d.amount).sum();

    let expected = expected_mileage(age);
    let mileage_penalty = condition
        .mileage
        .map(|m| m.saturating_sub(expected).div_ceil(1000) * penalties::PER_1000_MILES_OVER)
        .unwrap_or(0);

    let subtotal = base_value
        .saturating_sub(condition_total)
        .saturating_sub(mileage_penalty);
    let discounted = (f64::from(subtotal) * INSTANT_OFFER_MULTIPLIER).round() as u32;
    let margin = subtotal - discounted;

    let minimum_applied = discounted < MIN_VALUE;
    let offer_amount = discounted.max(MIN_VALUE);

    let confidence_band = if condition.has_photos {
        CONFIDENCE_BAND_WITH_PHOTOS
    } else {
        CONFIDENCE_BAND_WITHOUT_PHOTOS
    };

    OfferResult {
        offer_amount,
        confidence_band,
        valid_days: OFFER_VALID_DAYS,
        valid_miles: OFFER_VALID_MILES,
        breakdown: OfferBreakdown {
            base_value,
            condition_deductions,
            expected_mileage: expected,
            actual_mileage: condition.mileage,
            mileage_penalty,
            subtotal,
            instant_offer_multiplier: INSTANT_OFFER_MULTIPLIER,
            margin,
            minimum_applied,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i32 = 2024;

    fn vehicle(year: Option<i32>, make: &str, body: &str) -> VehicleRecord {
        VehicleRecord {
            year,
            make: make.to_string(),
            body_class: body.to_string(),
            fuel_type: "Gasoline".to_string(),
            engine_cylinders: Some(4),
            ..VehicleRecord::default()
        }
    }

    fn plain(year: i32) -> VehicleRecord {
        vehicle(Some(year), "Buick", "Sedan/Saloon")
    }

    #[test]
    fn new_plain_vehicle_is_worth_the_anchor() {
        assert_eq!(estimate_base_value(&plain(NOW), NOW), 35_000);
    }

    #[test]
    fn one_year_old_lands_on_first_tier() {
        assert_eq!(estimate_base_value(&plain(2023), NOW), 28_000);
    }

    #[test]
    fn depreciation_tiers() {
        assert_eq!(depreciation_rate(0), 0.0);
        assert!((depreciation_rate(1) - 0.20).abs() < 1e-9);
        assert!((depreciation_rate(3) - 0.50).abs() < 1e-9);
        assert!((depreciation_rate(5) - 0.80).abs() < 1e-9);
        assert!((depreciation_rate(6) - 0.85).abs() < 1e-9);
        assert!((depreciation_rate(40) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn depreciation_is_monotonic_and_capped() {
        let mut prev = 0.0;
        for age in 0..60 {
            let rate = depreciation_rate(age);
            assert!(rate >= prev, "age {age}: {rate} < {prev}");
            assert!(rate <= MAX_DEPRECIATION);
            prev = rate;
        }
        let floor = (BASE_ANCHOR_VALUE * (1.0 - MAX_DEPRECIATION)).round() as u32;
        for year in 1950..NOW {
            assert!(estimate_base_value(&plain(year), NOW) >= floor);
        }
    }

    #[test]
    fn missing_year_uses_default_age() {
        let v = vehicle(None, "Buick", "Sedan");
        let expected = (BASE_ANCHOR_VALUE * (1.0 - depreciation_rate(DEFAULT_VEHICLE_AGE))).round() as u32;
        assert_eq!(estimate_base_value(&v, NOW), expected);
        assert_eq!(vehicle_age(Some(0), NOW), DEFAULT_VEHICLE_AGE);
        assert_eq!(vehicle_age(Some(99_999), NOW), DEFAULT_VEHICLE_AGE);
    }

    #[test]
    fn next_model_year_counts_as_new() {
        assert_eq!(vehicle_age(Some(NOW + 1), NOW), 0);
    }

    #[test]
    fn brand_tiers_scale_value() {
        let base = estimate_base_value(&vehicle(Some(NOW), "Buick", "Sedan"), NOW);
        let premium = estimate_base_value(&vehicle(Some(NOW), "Mercedes-Benz", "Sedan"), NOW);
        let reliable = estimate_base_value(&vehicle(Some(NOW), "TOYOTA", "Sedan"), NOW);
        let economy = estimate_base_value(&vehicle(Some(NOW), "kia", "Sedan"), NOW);
        assert_eq!(base, 35_000);
        assert_eq!(premium, 49_000);
        assert_eq!(reliable, 40_250);
        assert_eq!(economy, 29_750);
    }

    #[test]
    fn domestic_truck_bonus_applies_once() {
        let truck = estimate_base_value(&vehicle(Some(NOW), "Ford", "Pickup"), NOW);
        assert_eq!(truck, (BASE_ANCHOR_VALUE * 1.3).round() as u32);

        // Off a truck body the brand is neutral.
        let sedan = estimate_base_value(&vehicle(Some(NOW), "Ford", "Sedan/Saloon"), NOW);
        assert_eq!(sedan, 35_000);

        // A non-domestic pickup still gets the body factor.
        let other = estimate_base_value(&vehicle(Some(NOW), "Rivian", "Pickup"), NOW);
        assert_eq!(other, (BASE_ANCHOR_VALUE * 1.25).round() as u32);
    }

    #[test]
    fn body_classes_match_provider_strings() {
        assert_eq!(
            BodyCategory::from_body_class("Sport Utility Vehicle (SUV)/Multi-Purpose Vehicle (MPV)"),
            BodyCategory::Suv
        );
        assert_eq!(BodyCategory::from_body_class("Convertible/Cabriolet"), BodyCategory::Sporty);
        assert_eq!(BodyCategory::from_body_class("Minivan"), BodyCategory::Minivan);
        assert_eq!(BodyCategory::from_body_class("Unknown"), BodyCategory::Other);
    }

    #[test]
    fn fuel_and_engine_multipliers() {
        assert_eq!(fuel_multiplier("Electric"), 1.2);
        assert_eq!(fuel_multiplier("Gasoline Hybrid"), 1.1);
        assert_eq!(fuel_multiplier("Plug-in Hybrid Electric"), 1.1);
        assert_eq!(fuel_multiplier("Diesel"), 1.0);
        assert_eq!(engine_multiplier(Some(8)), 1.15);
        assert_eq!(engine_multiplier(Some(10)), 1.15);
        assert_eq!(engine_multiplier(Some(6)), 1.05);
        assert_eq!(engine_multiplier(Some(4)), 1.0);
        assert_eq!(engine_multiplier(None), 1.0);
    }

    #[test]
    fn msrp_path_ignores_category_model() {
        let mut v = vehicle(Some(2023), "BMW", "Pickup");
        v.msrp = Some(50_000.0);
        assert_eq!(estimate_base_value(&v, NOW), 40_000);

        v.year = Some(2010);
        assert_eq!(estimate_base_value(&v, NOW), 7_500);

        // Non-positive MSRP falls back to the anchor model.
        v.msrp = Some(0.0);
        let anchored = estimate_base_value(&VehicleRecord { msrp: None, ..v.clone() }, NOW);
        assert_eq!(estimate_base_value(&v, NOW), anchored);
    }

    #[test]
    fn base_value_never_below_minimum() {
        let mut v = VehicleRecord::default();
        assert!(estimate_base_value(&v, NOW) >= MIN_VALUE);
        v.year = Some(1950);
        v.make = "Kia".to_string();
        v.body_class = "Minivan".to_string();
        assert!(estimate_base_value(&v, NOW) >= MIN_VALUE);
        v.msrp = Some(100.0);
        assert_eq!(estimate_base_value(&v, NOW), MIN_VALUE);
    }

    #[test]
    fn appraise_without_mileage_has_no_market_value() {
        let r = appraise(&plain(2020), None, NOW);
        assert_eq!(r.market_value, None);
        assert_eq!(r.confidence, None);
    }

    #[test]
    fn appraise_mileage_moves_market_value_within_bounds() {
        let v = plain(2020);
        let base = estimate_base_value(&v, NOW);
        let at = appraise(&v, Some(expected_mileage(4)), NOW);
        assert_eq!(at.market_value, Some(base));

        let low = appraise(&v, Some(0), NOW).market_value.unwrap();
        let high = appraise(&v, Some(400_000), NOW).market_value.unwrap();
        assert!(low > base && high < base);
        assert!(f64::from(high) >= f64::from(base) * 0.8 - 1.0);

        let r = appraise(&v, Some(expected_mileage(4)), NOW);
        assert_eq!(r.confidence, Some((f64::from(base) * 0.10).round() as u32));
    }

    #[test]
    fn eight_year_old_sedan_offer_is_margin_of_base() {
        let v = plain(NOW - 8);
        let base = estimate_base_value(&v, NOW);
        let cond = ConditionInput {
            mileage: Some(expected_mileage(8)),
            ..ConditionInput::default()
        };
        let offer = calculate_offer(base, &cond, 8);
        let expected = f64::from(base) * INSTANT_OFFER_MULTIPLIER;
        assert!((f64::from(offer.offer_amount) - expected).abs() <= 1.0);
        assert_eq!(offer.breakdown.mileage_penalty, 0);
        assert!(offer.breakdown.condition_deductions.is_empty());
    }

    #[test]
    fn offer_is_bounded_by_base_and_minimum() {
        for base in [0, 500, 1_000, 1_200, 5_000, 35_000, 120_000] {
            for age in [0, 3, 12] {
                let cond = ConditionInput {
                    mileage: Some(250_000),
                    tires_ok: false,
                    accident_free: false,
                    ..ConditionInput::default()
                };
                let offer = calculate_offer(base, &cond, age);
                assert!(offer.offer_amount >= MIN_VALUE);
                assert!(offer.offer_amount <= base.max(MIN_VALUE));
            }
        }
    }

    #[test]
    fn each_false_flag_lowers_the_offer() {
        let ok = ConditionInput::default();
        let baseline = calculate_offer(20_000, &ok, 3).offer_amount;
        let variants = [
            ConditionInput { tires_ok: false, ..ok.clone() },
            ConditionInput { windshield_ok: false, ..ok.clone() },
            ConditionInput { lights_ok: false, ..ok.clone() },
            ConditionInput { accident_free: false, ..ok.clone() },
        ];
        for cond in &variants {
            let offer = calculate_offer(20_000, cond, 3);
            assert!(offer.offer_amount < baseline, "{cond:?}");
            assert_eq!(offer.breakdown.condition_deductions.len(), 1);
        }

        // Already at the floor: unchanged, never raised.
        let floored = calculate_offer(1_000, &variants[3], 3);
        assert_eq!(floored.offer_amount, MIN_VALUE);
        assert!(floored.breakdown.minimum_applied);
    }

    #[test]
    fn mileage_over_baseline_is_penalized() {
        let at = ConditionInput { mileage: Some(36_000), ..ConditionInput::default() };
        let under = ConditionInput { mileage: Some(10_000), ..ConditionInput::default() };
        let over = ConditionInput { mileage: Some(36_001), ..ConditionInput::default() };

        let at_offer = calculate_offer(20_000, &at, 3);
        assert_eq!(at_offer.breakdown.mileage_penalty, 0);
        assert_eq!(calculate_offer(20_000, &under, 3).offer_amount, at_offer.offer_amount);

        let over_offer = calculate_offer(20_000, &over, 3);
        assert_eq!(over_offer.breakdown.mileage_penalty, penalties::PER_1000_MILES_OVER);
        assert!(over_offer.offer_amount < at_offer.offer_amount);

        let far = ConditionInput { mileage: Some(46_000), ..ConditionInput::default() };
        assert_eq!(calculate_offer(20_000, &far, 3).breakdown.mileage_penalty, 1_000);
    }

    #[test]
    fn photos_only_narrow_the_band() {
        let without = calculate_offer(20_000, &ConditionInput::default(), 3);
        let with = calculate_offer(
            20_000,
            &ConditionInput { has_photos: true, ..ConditionInput::default() },
            3,
        );
        assert_eq!(with.offer_amount, without.offer_amount);
        assert!(with.confidence_band < without.confidence_band);
        assert_eq!(with.valid_days, OFFER_VALID_DAYS);
        assert_eq!(with.valid_miles, OFFER_VALID_MILES);
    }

    #[test]
    fn breakdown_adds_up() {
        let cond = ConditionInput {
            mileage: Some(40_500),
            lights_ok: false,
            ..ConditionInput::default()
        };
        let o = calculate_offer(20_000, &cond, 3);
        let b = &o.breakdown;
        assert_eq!(b.subtotal, 20_000 - penalties::LIGHTS - 5 * penalties::PER_1000_MILES_OVER);
        assert_eq!(b.subtotal - b.margin, o.offer_amount);
    }
}
