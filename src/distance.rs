//! Great-circle distance and traffic-adjusted travel time.
//!
//! Uses straight-line distance and an assumed speed. Less accurate than a
//! road network (ignores roads) but always available and deterministic.

use rayon::prelude::*;

use crate::config::TrafficConfig;
use crate::model::Coordinate;
use crate::traits::DistanceMatrixProvider;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate haversine distance between two points in kilometers.
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

#[derive(Debug, Clone, Default)]
pub struct DistanceEstimator {
    traffic: TrafficConfig,
}

impl DistanceEstimator {
    pub fn new(traffic: TrafficConfig) -> Self {
        Self { traffic }
    }

    pub fn traffic(&self) -> &TrafficConfig {
        &self.traffic
    }

    pub fn distance(&self, from: Coordinate, to: Coordinate) -> f64 {
        haversine_km(from, to)
    }

    /// Time-of-day multiplier for a departure at `departure` seconds from midnight.
    pub fn traffic_multiplier(&self, departure: i32) -> f64 {
        let time = departure.rem_euclid(24 * 3600);
        let in_window = |(start, end): (i32, i32)| {
            if start <= end {
                time >= start && time < end
            } else {
                time >= start || time < end
            }
        };

        if self.traffic.peak_windows.iter().copied().any(in_window) {
            self.traffic.peak_factor
        } else if in_window(self.traffic.off_peak_window) {
            self.traffic.off_peak_factor
        } else {
            1.0
        }
    }

    /// Travel time in seconds for `distance_km`, departing at `departure`.
    ///
    /// Any non-zero distance takes at least the configured floor.
    pub fn travel_time(&self, distance_km: f64, departure: i32, traffic_aware: bool) -> i32 {
        if distance_km <= 0.0 {
            return 0;
        }

        let multiplier = if traffic_aware {
            self.traffic_multiplier(departure)
        } else {
            1.0
        };
        let hours = distance_km / self.traffic.base_speed_kmh;
        let seconds = (hours * 3600.0 * multiplier).round() as i32;

        seconds.max(self.traffic.min_travel_secs)
    }
}

impl DistanceMatrixProvider for DistanceEstimator {
    fn matrix_for(&self, locations: &[Coordinate]) -> Vec<Vec<f64>> {
        locations
            .par_iter()
            .enumerate()
            .map(|(i, from)| {
                locations
                    .iter()
                    .enumerate()
                    .map(|(j, to)| if i == j { 0.0 } else { haversine_km(*from, *to) })
                    .collect()
            })
            .collect()
    }
}
