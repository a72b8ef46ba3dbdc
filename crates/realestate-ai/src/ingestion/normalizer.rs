use std::collections::HashSet;

use serde_json::Value;

use super::feed::{RawItem, XML_TEXT_KEY};
use crate::search::NewListing;

const TITLE_KEYS: &[&str] = &["title", "name", "headline"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "details"];
const PRICE_KEYS: &[&str] = &[
    "price_aed",
    "price",
    "priceaed",
    "price_aed_value",
    "price_aed_amount",
];
const BED_KEYS: &[&str] = &["bedrooms", "beds", "bed_count"];
const BATH_KEYS: &[&str] = &["bathrooms", "baths", "bath_count"];
const SQFT_KEYS: &[&str] = &["sqft", "size_sqft", "square_feet", "area_sqft", "area"];
const COMMUNITY_KEYS: &[&str] = &["community", "neighbourhood", "neighborhood", "district"];
const PERMIT_KEYS: &[&str] = &[
    "permit",
    "trakheesi",
    "trakheesi_number",
    "permit_number",
    "permitNo",
];
const LAT_KEYS: &[&str] = &[
    "lat",
    "latitude",
    "location.lat",
    "location.latitude",
    "coordinates.lat",
];
const LON_KEYS: &[&str] = &[
    "lon",
    "lng",
    "longitude",
    "location.lon",
    "location.lng",
    "location.longitude",
    "coordinates.lon",
    "coordinates.lng",
];

/// Dotted candidates walk nested objects, taking the first element of any
/// array on the way; plain keys fall back to a case-insensitive match.
fn access<'a>(item: &'a RawItem, candidate: &str) -> Option<&'a Value> {
    if candidate.contains('.') {
        let mut parts = candidate.split('.');
        let mut current = item.get(parts.next()?)?;
        for part in parts {
            if let Value::Array(entries) = current {
                current = entries.first()?;
            }
            current = current.as_object()?.get(part)?;
        }
        return Some(current);
    }

    item.get(candidate).or_else(|| {
        item.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
            .map(|(_, value)| value)
    })
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(entries) => entries
            .iter()
            .map(as_text)
            .filter(|entry| !entry.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(fields) => fields.get(XML_TEXT_KEY).map(as_text).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Strips thousands separators and currency text before parsing; a string
/// that cleans down to nothing is treated as missing. XML elements that
/// carried attributes contribute their text node.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|n| n.is_finite()),
        Value::String(text) => {
            let cleaned: String = text
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        Value::Array(entries) => entries.iter().find_map(as_number),
        Value::Object(fields) => fields.get(XML_TEXT_KEY).and_then(as_number),
        _ => None,
    }
}

fn pick_text(item: &RawItem, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|candidate| access(item, candidate))
        .map(as_text)
        .find(|text| !text.is_empty())
}

fn pick_number(item: &RawItem, candidates: &[&str]) -> Option<f64> {
    candidates
        .iter()
        .filter_map(|candidate| access(item, candidate))
        .find_map(as_number)
}

/// Maps one feed record onto a listing; any missing required field rejects it.
pub fn normalise_listing(item: &RawItem) -> Option<NewListing> {
    let title = pick_text(item, TITLE_KEYS)?;
    let permit = pick_text(item, PERMIT_KEYS)?;
    let community = pick_text(item, COMMUNITY_KEYS)?;

    Some(NewListing {
        permit,
        title,
        description: pick_text(item, DESCRIPTION_KEYS),
        price_aed: pick_number(item, PRICE_KEYS)?,
        bedrooms: pick_number(item, BED_KEYS)?.round() as i64,
        bathrooms: pick_number(item, BATH_KEYS)?.round() as i64,
        sqft: pick_number(item, SQFT_KEYS)?,
        community,
        lat: pick_number(item, LAT_KEYS)?,
        lon: pick_number(item, LON_KEYS)?,
    })
}

/// Normalises a feed, keeping the first record seen for each permit
/// (compared trimmed and case-insensitively).
pub fn normalise_listings(items: &[RawItem]) -> Vec<NewListing> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(normalise_listing)
        .filter(|listing| seen.insert(listing.permit.trim().to_uppercase()))
        .collect()
}
