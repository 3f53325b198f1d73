//! Tunable settings for the optimization pipeline.
//!
//! Every struct has a `Default` suitable for urban parcel delivery and can be
//! loaded from JSON; missing fields fall back to the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{Coordinate, SpecialHandling};
use crate::zones::ZonePolicy;

/// Seconds in one hour, for readable defaults.
const HOUR: i32 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub working_hours: WorkingHours,
    pub zone_policy: ZonePolicy,
    pub strategy: Strategy,
    pub sequencing: SequencingConfig,
    /// Service time used when an order carries no hint, in minutes.
    pub default_service_minutes: i32,
    /// Extra handling time for urgent stops, in minutes.
    pub urgent_extra_minutes: i32,
    pub handling_extra: HandlingExtra,
    pub traffic: TrafficConfig,
    pub scoring: ScoringConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            working_hours: WorkingHours::default(),
            zone_policy: ZonePolicy::PostalPrefix { len: 3 },
            strategy: Strategy::Savings,
            sequencing: SequencingConfig::default(),
            default_service_minutes: 5,
            urgent_extra_minutes: 5,
            handling_extra: HandlingExtra::default(),
            traffic: TrafficConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Shift boundaries, seconds from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: i32,
    pub end: i32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: 8 * HOUR,
            end: 18 * HOUR,
        }
    }
}

/// How stops are grouped into routes inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Clarke-Wright savings with best-fit vehicle assignment.
    Savings,
    /// Nearest-neighbor sweep filling one vehicle at a time.
    ZoneClustering,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencingConfig {
    /// Upper bound on applied 2-opt moves per route.
    pub max_iterations: usize,
    /// Optional wall-clock budget per route, in milliseconds.
    pub time_budget_ms: Option<u64>,
    /// Start from the most urgent stop instead of the one nearest the depot.
    pub priority_aware: bool,
}

impl Default for SequencingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            time_budget_ms: None,
            priority_aware: false,
        }
    }
}

impl SequencingConfig {
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

/// Extra minutes spent at a stop per special-handling flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlingExtra {
    pub fragile: i32,
    pub signature_required: i32,
    pub bulky: i32,
    pub refrigerated: i32,
}

impl Default for HandlingExtra {
    fn default() -> Self {
        Self {
            fragile: 3,
            signature_required: 2,
            bulky: 5,
            refrigerated: 3,
        }
    }
}

impl HandlingExtra {
    pub fn minutes_for(&self, handling: SpecialHandling) -> i32 {
        match handling {
            SpecialHandling::Fragile => self.fragile,
            SpecialHandling::SignatureRequired => self.signature_required,
            SpecialHandling::Bulky => self.bulky,
            SpecialHandling::Refrigerated => self.refrigerated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Assumed average driving speed in km/h.
    pub base_speed_kmh: f64,
    /// Multiplier (>1) applied when departing inside a peak window.
    pub peak_factor: f64,
    /// Multiplier (<1) applied when departing inside the off-peak window.
    pub off_peak_factor: f64,
    /// Peak windows as (start, end) seconds from midnight.
    pub peak_windows: Vec<(i32, i32)>,
    /// Off-peak window; may wrap past midnight.
    pub off_peak_window: (i32, i32),
    /// Floor for any non-zero leg, in seconds.
    pub min_travel_secs: i32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            base_speed_kmh: 40.0,
            peak_factor: 1.4,
            off_peak_factor: 0.85,
            peak_windows: vec![(7 * HOUR, 9 * HOUR), (16 * HOUR, 19 * HOUR)],
            off_peak_window: (21 * HOUR, 6 * HOUR),
            min_travel_secs: 60,
        }
    }
}

/// Constants of the efficiency score. See [`crate::scoring`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_score: f64,
    pub distance_threshold_km: f64,
    pub distance_penalty_per_km: f64,
    pub max_distance_penalty: f64,
    pub time_threshold_secs: f64,
    pub time_penalty_per_minute: f64,
    pub max_time_penalty: f64,
    pub zone_bonus: f64,
    pub priority_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 80.0,
            distance_threshold_km: 5.0,
            distance_penalty_per_km: 2.0,
            max_distance_penalty: 40.0,
            time_threshold_secs: 1800.0,
            time_penalty_per_minute: 0.5,
            max_time_penalty: 30.0,
            zone_bonus: 10.0,
            priority_bonus: 10.0,
        }
    }
}

/// Rectangle that plausible coordinates must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        coordinate.lat >= self.min_lat
            && coordinate.lat <= self.max_lat
            && coordinate.lng >= self.min_lng
            && coordinate.lng <= self.max_lng
    }
}

impl Default for BoundingBox {
    /// The Las Vegas valley.
    fn default() -> Self {
        Self {
            min_lat: 35.90,
            max_lat: 36.40,
            min_lng: -115.45,
            max_lng: -114.90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Appended to addresses that do not already mention them.
    pub region_qualifiers: Vec<String>,
    pub bounds: BoundingBox,
    pub cache_ttl_secs: i64,
    /// Cache size above which the soonest-expiring entries are evicted.
    pub max_cache_entries: usize,
    pub batch_size: usize,
    pub inter_group_delay_ms: u64,
    pub min_call_interval_ms: u64,
    pub max_concurrent_calls: usize,
    /// Retries after a provider timeout, before moving to the next provider.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            region_qualifiers: vec!["Las Vegas".to_string(), "NV".to_string()],
            bounds: BoundingBox::default(),
            cache_ttl_secs: 30 * 24 * 3600,
            max_cache_entries: 50_000,
            batch_size: 5,
            inter_group_delay_ms: 1000,
            min_call_interval_ms: 1000,
            max_concurrent_calls: 2,
            max_retries: 2,
            backoff_base_ms: 250,
        }
    }
}

impl ResolverConfig {
    /// Settings without any waiting, for tests and offline providers.
    pub fn without_delays() -> Self {
        Self {
            inter_group_delay_ms: 0,
            min_call_interval_ms: 0,
            backoff_base_ms: 0,
            ..Self::default()
        }
    }

    pub fn inter_group_delay(&self) -> Duration {
        Duration::from_millis(self.inter_group_delay_ms)
    }

    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }

    /// Backoff before retry number `attempt` (0-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}
