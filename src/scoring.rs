//! Route quality scores and aggregate plan metrics.
//!
//! The efficiency score of a route starts at `base_score` and is adjusted by:
//!
//! ```text
//! - min(max(avg_km_per_stop - distance_threshold, 0) * distance_penalty_per_km, max_distance_penalty)
//! - min(max(avg_secs_per_stop - time_threshold, 0) / 60 * time_penalty_per_minute, max_time_penalty)
//! + zone_bonus / areas_on_route
//! + priority_bonus * urgent_placement
//! ```
//!
//! clamped to `[0, 100]`. Areas are full postal codes where the order has
//! one and the stop's zone key otherwise, so a route confined to its zone
//! still scores lower when it spreads over several postal areas. `urgent_placement` is 1 when urgent stops are
//! visited first and falls towards 0 as they move to the end of the route.

use std::collections::BTreeSet;

use crate::config::ScoringConfig;
use crate::model::{Coordinate, Metrics, Priority, Route, UnassignedStop};
use crate::schedule::ScheduleBuilder;

/// Components of a route's efficiency score.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteScore {
    pub avg_stop_distance_km: f64,
    pub avg_stop_secs: f64,
    pub zone_count: usize,
    pub urgent_placement: f64,
    pub efficiency: f64,
}

pub struct RouteScorer<'a> {
    config: &'a ScoringConfig,
    schedule: &'a ScheduleBuilder<'a>,
}

impl<'a> RouteScorer<'a> {
    pub fn new(config: &'a ScoringConfig, schedule: &'a ScheduleBuilder<'a>) -> Self {
        Self { config, schedule }
    }

    pub fn score(&self, route: &Route) -> RouteScore {
        let stops = route.stops.len();
        if stops == 0 {
            return RouteScore {
                avg_stop_distance_km: 0.0,
                avg_stop_secs: 0.0,
                zone_count: 0,
                urgent_placement: 1.0,
                efficiency: 0.0,
            };
        }

        let config = self.config;
        let avg_stop_distance_km = route.total_distance_km / stops as f64;
        let avg_stop_secs = f64::from(route.total_duration_secs) / stops as f64;
        let zone_count = area_count(route);
        let urgent_placement = urgent_placement(route);

        let distance_penalty = ((avg_stop_distance_km - config.distance_threshold_km).max(0.0)
            * config.distance_penalty_per_km)
            .min(config.max_distance_penalty);
        let time_penalty = ((avg_stop_secs - config.time_threshold_secs).max(0.0) / 60.0
            * config.time_penalty_per_minute)
            .min(config.max_time_penalty);

        let efficiency = (config.base_score - distance_penalty - time_penalty
            + config.zone_bonus / zone_count as f64
            + config.priority_bonus * urgent_placement)
            .clamp(0.0, 100.0);

        RouteScore {
            avg_stop_distance_km,
            avg_stop_secs,
            zone_count,
            urgent_placement,
            efficiency,
        }
    }

    /// Aggregates scored routes, comparing each against visiting its stops
    /// in request order.
    pub fn metrics(&self, depot: Coordinate, routes: &[Route], unassigned: &[UnassignedStop]) -> Metrics {
        let total_distance_km: f64 = routes.iter().map(|route| route.total_distance_km).sum();
        let total_duration_secs: i64 = routes.iter().map(|route| i64::from(route.total_duration_secs)).sum();

        let efficiency_score = if routes.is_empty() {
            0.0
        } else {
            routes.iter().map(|route| route.score).sum::<f64>() / routes.len() as f64
        };

        let zones_covered: BTreeSet<String> = routes.iter().flat_map(|route| route.zones.iter().cloned()).collect();

        let mut baseline_distance_km = 0.0;
        let mut baseline_duration_secs = 0i64;
        for route in routes {
            let mut positions: Vec<usize> = (0..route.stops.len()).collect();
            positions.sort_by_key(|&position| route.stops[position].input_index);
            let baseline = self.schedule.time_route(depot, &route.stops, &positions);
            baseline_distance_km += baseline.distance_km;
            baseline_duration_secs += i64::from(baseline.duration_secs);
        }

        let distance_saved_km = baseline_distance_km - total_distance_km;
        let distance_saved_pct = if baseline_distance_km > 0.0 {
            distance_saved_km / baseline_distance_km * 100.0
        } else {
            0.0
        };

        let assigned_stops = routes.iter().map(|route| route.stops.len()).sum();

        Metrics {
            total_distance_km,
            total_duration_secs,
            efficiency_score,
            zones_covered,
            time_window_compliance: time_window_compliance(routes, unassigned),
            baseline_distance_km,
            baseline_duration_secs,
            distance_saved_km,
            time_saved_secs: baseline_duration_secs - total_duration_secs,
            distance_saved_pct,
            assigned_stops,
            unassigned_stops: unassigned.len(),
        }
    }
}

fn area_count(route: &Route) -> usize {
    route
        .stops
        .iter()
        .map(|stop| {
            stop.order
                .postal_code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .unwrap_or(&stop.zone)
        })
        .collect::<BTreeSet<&str>>()
        .len()
        .max(1)
}

/// Mean of `1 - position / stops` over urgent stops, or 1 without any.
fn urgent_placement(route: &Route) -> f64 {
    let stops = route.stops.len() as f64;
    let positions: Vec<f64> = route
        .stops
        .iter()
        .enumerate()
        .filter(|(_, stop)| stop.order.priority == Priority::Urgent)
        .map(|(position, _)| 1.0 - position as f64 / stops)
        .collect();

    if positions.is_empty() {
        1.0
    } else {
        positions.iter().sum::<f64>() / positions.len() as f64
    }
}

fn time_window_compliance(routes: &[Route], unassigned: &[UnassignedStop]) -> f64 {
    let mut windowed = 0usize;
    let mut met = 0usize;

    for route in routes {
        for (stop, eta) in route.stops.iter().zip(&route.etas) {
            if stop.order.time_window.is_some() {
                windowed += 1;
                if eta.within_window {
                    met += 1;
                }
            }
        }
    }
    windowed += unassigned
        .iter()
        .filter(|missing| missing.stop.order.time_window.is_some())
        .count();

    if windowed == 0 { 1.0 } else { met as f64 / windowed as f64 }
}
