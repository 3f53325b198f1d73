//! Pre-solve grouping of stops into disjoint zones.
//!
//! Each zone is solved on its own, which bounds problem size and keeps routes
//! geographically contiguous. Zones are never merged afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::extract_postal_code;
use crate::model::{Coordinate, Stop};

/// Zone used when the policy finds nothing to key on.
pub const UNKNOWN_ZONE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZonePolicy {
    /// First `len` characters of the postal code.
    PostalPrefix { len: usize },
    /// NE/NW/SE/SW relative to the depot.
    Quadrant,
    /// The zone tag carried by the order.
    Tag,
    /// Everything in one zone.
    Single,
}

/// Zone key of a stop under `policy`.
pub fn zone_key(stop: &Stop, depot: Coordinate, policy: ZonePolicy) -> String {
    match policy {
        ZonePolicy::PostalPrefix { len } => stop
            .order
            .postal_code
            .as_deref()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .or_else(|| extract_postal_code(&stop.order.address))
            .map(|code| code.chars().take(len.max(1)).collect::<String>().to_uppercase())
            .unwrap_or_else(|| UNKNOWN_ZONE.to_string()),
        ZonePolicy::Quadrant => {
            let vertical = if stop.coordinate.lat >= depot.lat { 'N' } else { 'S' };
            let horizontal = if stop.coordinate.lng >= depot.lng { 'E' } else { 'W' };
            format!("{}{}", vertical, horizontal)
        }
        ZonePolicy::Tag => stop
            .order
            .zone
            .as_deref()
            .map(str::trim)
            .filter(|zone| !zone.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "untagged".to_string()),
        ZonePolicy::Single => "all".to_string(),
    }
}

/// Groups `stops` by zone, stamping each stop with its key.
///
/// Zones come out in key order and stops keep their relative input order.
pub fn partition(stops: Vec<Stop>, depot: Coordinate, policy: ZonePolicy) -> BTreeMap<String, Vec<Stop>> {
    let mut zones: BTreeMap<String, Vec<Stop>> = BTreeMap::new();
    for mut stop in stops {
        let key = zone_key(&stop, depot, policy);
        stop.zone = key.clone();
        zones.entry(key).or_default().push(stop);
    }
    zones
}
