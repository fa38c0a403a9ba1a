//! Normalization of raw Vast offer objects into stored snapshot rows.
//!
//! Search results are loosely typed: the same field may arrive under several
//! names, as a number or a string, and in different units. A field that is
//! null, zero, false or empty counts as absent and falls through to the next
//! alias.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use vastwatch_core::OfferState;
use vastwatch_data::OfferSnapshotRecord;

const BYTES_THRESHOLD: f64 = 1_000_000.0;
const MEGABYTES_THRESHOLD: f64 = 200.0;

/// Truthiness of a JSON value: null, false, zero, and empty strings,
/// arrays or objects are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// First truthy value among `keys`.
fn first_of<'a>(offer: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| offer.get(*key))
        .find(|value| is_truthy(value))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lenient boolean: accepts JSON booleans, numbers, and the usual yes/no words.
#[must_use]
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f.trunc() != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Some(true),
            "0" | "false" | "no" | "n" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Total GPU memory in GB.
///
/// Values above 1e6 are read as bytes, above 200 as megabytes.
#[must_use]
pub fn normalize_vram_gb(offer: &Value) -> Option<f64> {
    ["gpu_total_ram_gb", "gpu_total_ram", "gpu_ram", "gpu_mem"]
        .iter()
        .filter_map(|key| offer.get(*key))
        .find_map(as_f64)
        .map(|v| {
            if v > BYTES_THRESHOLD {
                v / f64::from(1u32 << 30)
            } else if v > MEGABYTES_THRESHOLD {
                v / 1024.0
            } else {
                v
            }
        })
}

fn normalize_type(offer: &Value) -> Option<String> {
    if let Some(Value::String(t)) = offer.get("type") {
        if !t.is_empty() {
            return Some(t.clone());
        }
    }
    let flag = |key: &str| offer.get(key).and_then(Value::as_bool);
    if flag("interruptible") == Some(true) || flag("preemptible") == Some(true) {
        return Some("interruptible".to_string());
    }
    if flag("interruptible") == Some(false) || flag("preemptible") == Some(false) {
        return Some("on-demand".to_string());
    }
    None
}

fn normalize_geo(offer: &Value) -> Option<String> {
    if let Some(geo) = first_of(offer, &["geolocation", "country", "region"]).and_then(as_text) {
        return Some(geo);
    }
    let parts: Vec<String> = [
        first_of(offer, &["city"]),
        first_of(offer, &["country_code", "country"]),
    ]
    .into_iter()
    .flatten()
    .filter_map(as_text)
    .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Returns `(verified, deverified)`.
fn normalize_verification(offer: &Value) -> (bool, bool) {
    let verified_value = match offer.get("verified") {
        Some(Value::Null) | None => offer.get("is_verified"),
        other => other,
    };
    let mut verified = verified_value.and_then(parse_flag);
    let mut deverified = offer.get("deverified").and_then(parse_flag);

    if let Some(Value::String(label)) = offer.get("verification") {
        match label.trim().to_ascii_lowercase().as_str() {
            "verified" => {
                verified = Some(true);
                deverified = Some(false);
            }
            "deverified" => {
                verified = Some(false);
                deverified = Some(true);
            }
            _ => {}
        }
    }
    if offer.get("is_vm_deverified").and_then(Value::as_bool) == Some(true) {
        deverified = Some(true);
    }

    (verified.unwrap_or(false), deverified.unwrap_or(false))
}

/// Availability state of an offer.
///
/// Membership in a query's result wins; otherwise the raw flags decide.
#[must_use]
pub fn derive_state(
    source_state: Option<OfferState>,
    rentable: Option<bool>,
    rented: Option<bool>,
) -> OfferState {
    match source_state {
        Some(state @ (OfferState::Available | OfferState::Rented | OfferState::Unavailable)) => {
            state
        }
        _ => match (rentable, rented) {
            (Some(true), Some(false)) => OfferState::Available,
            (_, Some(true)) => OfferState::Rented,
            (Some(false), Some(false)) => OfferState::Unavailable,
            _ => OfferState::Unknown,
        },
    }
}

/// Normalizes one raw offer into a snapshot row stamped with `timestamp`.
///
/// Missing ids become 0; a missing GPU count becomes 1.
#[must_use]
pub fn normalize_offer(
    offer: &Value,
    timestamp: DateTime<Utc>,
    source_state: Option<OfferState>,
) -> OfferSnapshotRecord {
    let offer_id = first_of(offer, &["id", "offer_id"])
        .and_then(as_i64)
        .unwrap_or(0);
    let machine_id = first_of(offer, &["machine_id", "machine", "machineID"])
        .and_then(as_i64)
        .unwrap_or(0);
    let num_gpus = first_of(offer, &["num_gpus", "numgpus", "gpus"])
        .and_then(as_i64)
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(1);

    let rentable = offer.get("rentable").and_then(parse_flag);
    let rented = offer.get("rented").and_then(parse_flag);
    let (verified, deverified) = normalize_verification(offer);
    let state = derive_state(source_state, rentable, rented);

    OfferSnapshotRecord {
        timestamp,
        offer_id,
        machine_id,
        gpu_name: first_of(offer, &["gpu_name", "gpu_name_short", "gpu"]).and_then(as_text),
        num_gpus,
        gpu_frac: Some(
            first_of(offer, &["gpu_frac", "gpu_fraction"])
                .and_then(as_f64)
                .unwrap_or(1.0),
        ),
        gpu_total_ram_gb: normalize_vram_gb(offer),
        price_per_hour: first_of(offer, &["dph_total", "dollars_per_hour", "usd_per_hour"])
            .and_then(as_decimal),
        reliability: first_of(offer, &["reliability2", "reliability"]).and_then(as_f64),
        geolocation: normalize_geo(offer),
        offer_type: normalize_type(offer),
        rentable,
        rented,
        verified,
        deverified,
        state: state.to_string(),
    }
}
