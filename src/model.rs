//! Domain types shared by every stage of the optimization pipeline.
//!
//! Times of day are seconds from midnight, durations are seconds and
//! distances are kilometers, matching the rest of the planner.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A (latitude, longitude) pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and within ±90 / ±180.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Delivery priority. Declaration order is most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Relative weight used when ranking routes competing for vehicles.
    pub fn weight(&self) -> u32 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
        }
    }
}

/// Special handling that lengthens the time spent at a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialHandling {
    Fragile,
    SignatureRequired,
    Bulky,
    Refrigerated,
}

/// Acceptable arrival interval (seconds from midnight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub earliest: i32,
    pub latest: i32,
}

impl TimeWindow {
    pub const fn new(earliest: i32, latest: i32) -> Self {
        Self { earliest, latest }
    }

    pub fn contains(&self, time: i32) -> bool {
        time >= self.earliest && time <= self.latest
    }
}

/// An order as handed over by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    pub demand: f64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Estimated service duration in minutes.
    #[serde(default)]
    pub service_minutes: Option<i32>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Pre-assigned zone tag.
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub handling: Vec<SpecialHandling>,
}

impl Order {
    pub fn new(id: impl Into<String>, address: impl Into<String>, demand: f64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            coordinate: None,
            demand,
            priority: Priority::Normal,
            time_window: None,
            service_minutes: None,
            postal_code: None,
            zone: None,
            handling: Vec::new(),
        }
    }

    pub fn with_coordinate(mut self, lat: f64, lng: f64) -> Self {
        self.coordinate = Some(Coordinate::new(lat, lng));
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_time_window(mut self, earliest: i32, latest: i32) -> Self {
        self.time_window = Some(TimeWindow::new(earliest, latest));
        self
    }

    pub fn with_service_minutes(mut self, minutes: i32) -> Self {
        self.service_minutes = Some(minutes);
        self
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_handling(mut self, handling: SpecialHandling) -> Self {
        self.handling.push(handling);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub capacity: f64,
    #[serde(default)]
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub max_duration_secs: Option<i32>,
    #[serde(default)]
    pub max_stops: Option<usize>,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            max_distance_km: None,
            max_duration_secs: None,
            max_stops: None,
        }
    }

    pub fn with_max_distance_km(mut self, km: f64) -> Self {
        self.max_distance_km = Some(km);
        self
    }

    pub fn with_max_duration_secs(mut self, secs: i32) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    pub fn with_max_stops(mut self, stops: usize) -> Self {
        self.max_stops = Some(stops);
        self
    }

    /// Whether a route with the given totals respects every limit of this vehicle.
    pub fn admits(&self, demand: f64, distance_km: f64, duration_secs: i32, stops: usize) -> bool {
        demand <= self.capacity
            && self.max_distance_km.is_none_or(|max| distance_km <= max)
            && self.max_duration_secs.is_none_or(|max| duration_secs <= max)
            && self.max_stops.is_none_or(|max| stops <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    pub coordinate: Coordinate,
}

impl Depot {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self {
            coordinate: Coordinate::new(lat, lng),
        }
    }
}

/// How trustworthy a resolved coordinate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    High,
    Medium,
    Low,
}

/// Where a stop's coordinate came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeInfo {
    pub accuracy: Accuracy,
    pub confidence: f64,
    pub provider: String,
    pub from_cache: bool,
}

impl GeocodeInfo {
    /// Info for coordinates supplied with the order itself.
    pub fn supplied() -> Self {
        Self {
            accuracy: Accuracy::High,
            confidence: 1.0,
            provider: "order".to_string(),
            from_cache: false,
        }
    }
}

/// A geocoded order ready for zoning and solving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub order: Order,
    pub coordinate: Coordinate,
    pub geocode: GeocodeInfo,
    /// Position of the order in the request, used for the naive baseline.
    pub input_index: usize,
    pub zone: String,
}

impl Stop {
    pub fn id(&self) -> &str {
        &self.order.id
    }
}

/// Timing of one stop within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEta {
    pub order_id: String,
    pub arrival: i32,
    pub departure: i32,
    pub wait_secs: i32,
    pub travel_km: f64,
    pub within_window: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_id: String,
    pub zone: String,
    pub stops: Vec<Stop>,
    pub etas: Vec<StopEta>,
    pub start_time: i32,
    pub end_time: i32,
    pub total_distance_km: f64,
    pub total_duration_secs: i32,
    pub total_demand: f64,
    pub score: f64,
    pub zones: BTreeSet<String>,
    /// False when sequencing stopped on its budget rather than converging.
    pub optimal: bool,
}

/// Reason a stop could not be placed on any route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedReason {
    NoVehicleAvailable,
    ExceedsVehicleLimits,
    TimeWindowInfeasible,
    DurationLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedStop {
    pub stop: Stop,
    pub reason: UnassignedReason,
}

/// A soft geocoding failure recorded during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeFailure {
    pub address: String,
    pub provider: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_distance_km: f64,
    pub total_duration_secs: i64,
    pub efficiency_score: f64,
    pub zones_covered: BTreeSet<String>,
    /// Share of windowed stops (routed or not) that were served inside their window.
    pub time_window_compliance: f64,
    pub baseline_distance_km: f64,
    pub baseline_duration_secs: i64,
    pub distance_saved_km: f64,
    pub time_saved_secs: i64,
    pub distance_saved_pct: f64,
    pub assigned_stops: usize,
    pub unassigned_stops: usize,
}

/// A snapshot of work to plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub orders: Vec<Order>,
    pub vehicles: Vec<Vehicle>,
    pub depot: Depot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub routes: Vec<Route>,
    pub unassigned: Vec<UnassignedStop>,
    pub metrics: Metrics,
    pub geocode_failures: Vec<GeocodeFailure>,
    /// True when any route was sequenced without converging.
    pub partial: bool,
}
