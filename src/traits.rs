//! Seams between the optimization core and its collaborators.
//!
//! Concrete providers (HTTP geocoders, routing engines, clocks) implement
//! these so the pipeline stays independent of any one vendor.

use jiff::Timestamp;

use crate::error::ProviderError;
use crate::model::{Accuracy, Coordinate};

/// A coordinate returned by a geocoding provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderHit {
    pub coordinate: Coordinate,
    pub confidence: f64,
    pub accuracy: Accuracy,
}

/// Resolves one free-text address.
///
/// Implementations should apply their own per-call timeout and report it as
/// [`ProviderError::Timeout`] so the resolver can retry.
pub trait GeocodeProvider: Send + Sync {
    /// Stable identifier recorded on cache entries.
    fn id(&self) -> &str;

    fn geocode(&self, address: &str) -> Result<ProviderHit, ProviderError>;
}

/// Provides a symmetric distance matrix (kilometers) for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Coordinate]) -> Vec<Vec<f64>>;
}

/// Orders the stops of a single route.
pub trait RouteSequencer: Sync {
    /// `points[0]` is the depot. `initial` is a visiting order over indices
    /// `1..points.len()`, and `leading` (when set) must stay first.
    fn sequence(&self, points: &[Coordinate], initial: &[usize], leading: Option<usize>) -> Sequence;
}

/// Outcome of sequencing a route.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    /// Indices into the sequenced points, depot excluded.
    pub order: Vec<usize>,
    /// Round-trip distance from the depot, in kilometers.
    pub distance_km: f64,
    /// False when the search stopped on its budget.
    pub optimal: bool,
}

/// Source of wall-clock time for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
