//! OSRM HTTP adapter delegating route sequencing to the trip service.

use serde::Deserialize;
use tracing::warn;

use crate::distance::DistanceEstimator;
use crate::model::Coordinate;
use crate::sequence::{LocalSearchSequencer, nearest_neighbor, route_distance};
use crate::traits::{DistanceMatrixProvider, RouteSequencer, Sequence};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Sequences routes with OSRM's `/trip` service.
///
/// Falls back to local search when OSRM fails, when a stop must lead, or when
/// the road-based order is longer (in straight-line terms) than the local
/// search starting point, so vehicle distance limits checked upstream still hold.
#[derive(Debug, Clone)]
pub struct OsrmTripSequencer {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
    fallback: LocalSearchSequencer,
}

impl OsrmTripSequencer {
    pub fn new(config: OsrmConfig, fallback: LocalSearchSequencer) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            fallback,
        })
    }

    fn fetch_trip(&self, locations: &[Coordinate]) -> Result<OsrmTripResponse, reqwest::Error> {
        let coords = locations
            .iter()
            .map(|location| format!("{:.6},{:.6}", location.lng, location.lat))
            .collect::<Vec<_>>()
            .join(";");

        let url = format!(
            "{}/trip/v1/{}/{}?source=first&roundtrip=true&overview=false",
            self.config.base_url, self.config.profile, coords
        );

        self.client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTripResponse>())
    }
}

impl RouteSequencer for OsrmTripSequencer {
    fn sequence(&self, points: &[Coordinate], initial: &[usize], leading: Option<usize>) -> Sequence {
        if initial.len() < 2 || leading.is_some() {
            return self.fallback.sequence(points, initial, leading);
        }

        // The trip request only carries the depot and this route's stops.
        let locations: Vec<Coordinate> = std::iter::once(points[0])
            .chain(initial.iter().map(|&node| points[node]))
            .collect();

        let trip_order = match self.fetch_trip(&locations) {
            Ok(body) => trip_order(&body, initial),
            Err(err) => {
                warn!(error = %err, "OSRM trip request failed");
                None
            }
        };

        let Some(order) = trip_order else {
            return self.fallback.sequence(points, initial, leading);
        };

        let matrix = DistanceEstimator::default().matrix_for(points);
        let distance_km = route_distance(&matrix, &order);
        let baseline = route_distance(&matrix, &nearest_neighbor(&matrix, initial, None))
            .min(route_distance(&matrix, initial));
        if distance_km > baseline + 1e-9 {
            return self.fallback.improve(&matrix, initial, leading);
        }

        Sequence {
            order,
            distance_km,
            optimal: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTripResponse {
    code: String,
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    waypoint_index: usize,
    trips_index: usize,
}

/// Maps trip positions back to node ids. Waypoint 0 is the depot and
/// waypoint `k` is `initial[k - 1]`.
fn trip_order(body: &OsrmTripResponse, initial: &[usize]) -> Option<Vec<usize>> {
    if body.code != "Ok" || body.waypoints.len() != initial.len() + 1 {
        return None;
    }
    if body.waypoints.iter().any(|waypoint| waypoint.trips_index != 0) {
        return None;
    }

    let mut stops: Vec<(usize, usize)> = body
        .waypoints
        .iter()
        .enumerate()
        .skip(1)
        .map(|(input, waypoint)| (waypoint.waypoint_index, initial[input - 1]))
        .collect();
    stops.sort();

    Some(stops.into_iter().map(|(_, node)| node).collect())
}
