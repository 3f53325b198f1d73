//! Address normalization and the deterministic fallback coordinate.

use std::hash::Hasher;

use fxhash::FxHasher64;

use crate::config::BoundingBox;
use crate::model::Coordinate;

/// An address cleaned up for querying providers and keying the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedAddress {
    /// Text sent to providers: trimmed, single-spaced, region-qualified.
    pub query: String,
    /// Case-folded form of `query`.
    pub key: String,
}

/// Normalizes `raw`, returning `None` when nothing but whitespace remains.
///
/// Each qualifier is appended unless the address already mentions it.
pub fn normalize(raw: &str, qualifiers: &[String]) -> Option<NormalizedAddress> {
    let mut query = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        return None;
    }

    for qualifier in qualifiers {
        let qualifier = qualifier.trim();
        if qualifier.is_empty() {
            continue;
        }
        if !query.to_lowercase().contains(&qualifier.to_lowercase()) {
            query.push_str(", ");
            query.push_str(qualifier);
        }
    }

    let key = query.to_lowercase();
    Some(NormalizedAddress { query, key })
}

/// Stable coordinate inside `bounds` derived from the normalized key alone.
///
/// FxHash is unseeded, so the same key maps to the same point in every process.
pub fn fallback_coordinate(key: &str, bounds: &BoundingBox) -> Coordinate {
    let mut hasher = FxHasher64::default();
    hasher.write(key.as_bytes());
    let hash = hasher.finish();

    let lat_frac = (hash >> 32) as f64 / u32::MAX as f64;
    let lng_frac = (hash & 0xffff_ffff) as f64 / u32::MAX as f64;

    Coordinate::new(
        bounds.min_lat + lat_frac * (bounds.max_lat - bounds.min_lat),
        bounds.min_lng + lng_frac * (bounds.max_lng - bounds.min_lng),
    )
}

/// Last token of the address that looks like a postal code (4 to 6 digits,
/// optionally followed by a ZIP+4 suffix).
pub fn extract_postal_code(address: &str) -> Option<String> {
    address
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let digits = token.split('-').next().unwrap_or(token);
            let looks_postal = (4..=6).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
            looks_postal.then(|| digits.to_string())
        })
        .last()
}
