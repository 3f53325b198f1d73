//! Turns a visiting order into arrival and departure times.

use tracing::warn;

use crate::config::OptimizerConfig;
use crate::distance::DistanceEstimator;
use crate::model::{Coordinate, Order, Priority, Stop, StopEta, UnassignedReason, Vehicle};

/// Timing of a route after infeasible stops were taken out.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// Positions (into the scheduled stops) that stay on the route, in order.
    pub kept: Vec<usize>,
    pub etas: Vec<StopEta>,
    /// Positions that were removed and why.
    pub removed: Vec<(usize, UnassignedReason)>,
    pub start_time: i32,
    pub end_time: i32,
    pub distance_km: f64,
    pub duration_secs: i32,
}

pub struct ScheduleBuilder<'a> {
    estimator: &'a DistanceEstimator,
    config: &'a OptimizerConfig,
}

impl<'a> ScheduleBuilder<'a> {
    pub fn new(estimator: &'a DistanceEstimator, config: &'a OptimizerConfig) -> Self {
        Self { estimator, config }
    }

    /// Seconds spent at the stop: the order's hint (or the default), plus
    /// urgent handling, plus every special-handling flag.
    pub fn service_secs(&self, order: &Order) -> i32 {
        let mut minutes = order
            .service_minutes
            .unwrap_or(self.config.default_service_minutes)
            .max(0);
        if order.priority == Priority::Urgent {
            minutes += self.config.urgent_extra_minutes;
        }
        minutes += order
            .handling
            .iter()
            .map(|&handling| self.config.handling_extra.minutes_for(handling))
            .sum::<i32>();
        minutes * 60
    }

    /// Schedules `stops` in the given order from the start of working hours.
    ///
    /// A stop reached after its window closes, or after working hours end, is
    /// removed and the following stops are timed from the previous position.
    /// Trailing stops are then dropped while the vehicle's distance or duration
    /// limit is exceeded.
    pub fn build(&self, depot: Coordinate, stops: &[Stop], vehicle: Option<&Vehicle>) -> Schedule {
        let hours = self.config.working_hours;
        let mut kept: Vec<usize> = (0..stops.len()).collect();
        let mut removed = Vec::new();

        loop {
            let mut clock = hours.start;
            let mut previous = depot;
            let mut survivors = Vec::with_capacity(kept.len());

            for position in kept {
                let stop = &stops[position];
                let km = self.estimator.distance(previous, stop.coordinate);
                let arrival = clock + self.estimator.travel_time(km, clock, true);

                let too_late = arrival > hours.end
                    || stop.order.time_window.is_some_and(|window| arrival > window.latest);
                if too_late {
                    warn!(order = stop.id(), arrival, "stop cannot be reached in time, unassigning");
                    removed.push((position, UnassignedReason::TimeWindowInfeasible));
                    continue;
                }

                let begin = stop
                    .order
                    .time_window
                    .map_or(arrival, |window| arrival.max(window.earliest));
                clock = begin + self.service_secs(&stop.order);
                previous = stop.coordinate;
                survivors.push(position);
            }
            kept = survivors;

            let schedule = self.time_route(depot, stops, &kept);
            let over_limit = vehicle.and_then(|vehicle| {
                if vehicle.max_distance_km.is_some_and(|max| schedule.distance_km > max) {
                    Some(UnassignedReason::ExceedsVehicleLimits)
                } else if vehicle.max_duration_secs.is_some_and(|max| schedule.duration_secs > max) {
                    Some(UnassignedReason::DurationLimit)
                } else {
                    None
                }
            });

            match (kept.last(), over_limit) {
                (Some(&last), Some(reason)) => {
                    warn!(order = stops[last].id(), ?reason, "route exceeds vehicle limits, dropping last stop");
                    kept.pop();
                    removed.push((last, reason));
                }
                _ => {
                    return Schedule {
                        kept,
                        removed,
                        ..schedule
                    };
                }
            }
        }
    }

    /// Round-trip distance of visiting `stops` in order.
    pub fn distance_km(&self, depot: Coordinate, stops: &[Stop]) -> f64 {
        let mut distance = 0.0;
        let mut previous = depot;
        for stop in stops {
            distance += self.estimator.distance(previous, stop.coordinate);
            previous = stop.coordinate;
        }
        if !stops.is_empty() {
            distance += self.estimator.distance(previous, depot);
        }
        distance
    }

    /// Times the stops at `kept` positions in that order, removing nothing.
    pub fn time_route(&self, depot: Coordinate, stops: &[Stop], kept: &[usize]) -> Schedule {
        let start = self.config.working_hours.start;
        let mut clock = start;
        let mut previous = depot;
        let mut distance_km = 0.0;
        let mut etas = Vec::with_capacity(kept.len());

        for &position in kept {
            let stop = &stops[position];
            let km = self.estimator.distance(previous, stop.coordinate);
            let arrival = clock + self.estimator.travel_time(km, clock, true);
            let begin = stop
                .order
                .time_window
                .map_or(arrival, |window| arrival.max(window.earliest));
            let departure = begin + self.service_secs(&stop.order);

            etas.push(StopEta {
                order_id: stop.id().to_string(),
                arrival,
                departure,
                wait_secs: begin - arrival,
                travel_km: km,
                within_window: stop.order.time_window.is_none_or(|window| window.contains(begin)),
            });

            distance_km += km;
            clock = departure;
            previous = stop.coordinate;
        }

        let end_time = if kept.is_empty() {
            start
        } else {
            let km = self.estimator.distance(previous, depot);
            distance_km += km;
            clock + self.estimator.travel_time(km, clock, true)
        };

        Schedule {
            kept: Vec::new(),
            etas,
            removed: Vec::new(),
            start_time: start,
            end_time,
            distance_km,
            duration_secs: end_time - start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkingHours;
    use crate::model::{GeocodeInfo, SpecialHandling};

    const HOUR: i32 = 3600;

    fn stop(id: &str, lat: f64, lng: f64) -> Stop {
        Stop {
            order: Order::new(id, "x", 1.0),
            coordinate: Coordinate::new(lat, lng),
            geocode: GeocodeInfo::supplied(),
            input_index: 0,
            zone: "all".to_string(),
        }
    }

    fn config() -> OptimizerConfig {
        OptimizerConfig {
            working_hours: WorkingHours {
                start: 10 * HOUR,
                end: 15 * HOUR,
            },
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn service_time_is_priority_and_handling_adjusted() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);

        assert_eq!(builder.service_secs(&Order::new("a", "x", 1.0)), 5 * 60);
        assert_eq!(
            builder.service_secs(&Order::new("a", "x", 1.0).with_service_minutes(10).with_priority(Priority::Urgent)),
            15 * 60
        );
        assert_eq!(
            builder.service_secs(
                &Order::new("a", "x", 1.0)
                    .with_handling(SpecialHandling::Fragile)
                    .with_handling(SpecialHandling::Bulky)
            ),
            (5 + 3 + 5) * 60
        );
    }

    #[test]
    fn etas_accumulate_travel_and_service() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);
        let depot = Coordinate::new(36.0, -115.0);
        let stops = vec![stop("a", 36.05, -115.0), stop("b", 36.10, -115.0)];

        let schedule = builder.build(depot, &stops, None);

        assert_eq!(schedule.kept, vec![0, 1]);
        assert!(schedule.removed.is_empty());
        let a = &schedule.etas[0];
        let b = &schedule.etas[1];
        assert!(a.arrival > 10 * HOUR);
        assert_eq!(a.departure, a.arrival + 300);
        assert!(b.arrival > a.departure);
        assert!(schedule.end_time > b.departure);
        assert_eq!(schedule.duration_secs, schedule.end_time - schedule.start_time);
        assert!((schedule.distance_km - 2.0 * estimator.distance(depot, stops[1].coordinate)).abs() < 1e-6);
    }

    #[test]
    fn early_arrival_waits_for_window() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);
        let mut early = stop("a", 36.01, -115.0);
        early.order.time_window = Some(crate::model::TimeWindow::new(12 * HOUR, 13 * HOUR));

        let schedule = builder.build(Coordinate::new(36.0, -115.0), &[early], None);

        let eta = &schedule.etas[0];
        assert_eq!(eta.arrival + eta.wait_secs, 12 * HOUR);
        assert_eq!(eta.departure, 12 * HOUR + 300);
        assert!(eta.within_window);
    }

    #[test]
    fn unreachable_window_is_removed_and_rest_rechecked() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);
        let depot = Coordinate::new(36.0, -115.0);

        // "closed" shut before the shift started; "tight" is still reachable after it.
        let far = stop("far", 36.75, -115.0);
        let mut closed = stop("closed", 36.01, -115.0);
        closed.order.time_window = Some(crate::model::TimeWindow::new(8 * HOUR, 9 * HOUR));
        let mut tight = stop("tight", 36.02, -115.0);
        tight.order.time_window = Some(crate::model::TimeWindow::new(10 * HOUR, 10 * HOUR + 1800));

        let schedule = builder.build(depot, &[closed, tight, far], None);

        assert_eq!(schedule.removed, vec![(0, UnassignedReason::TimeWindowInfeasible)]);
        assert_eq!(schedule.kept, vec![1, 2]);
        assert!(schedule.etas[0].within_window);
    }

    #[test]
    fn stops_after_working_hours_are_removed() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);

        // ~222 km at 40 km/h lands after the 15:00 end of the shift.
        let schedule = builder.build(Coordinate::new(36.0, -115.0), &[stop("far", 38.0, -115.0)], None);

        assert!(schedule.kept.is_empty());
        assert_eq!(schedule.removed, vec![(0, UnassignedReason::TimeWindowInfeasible)]);
        assert_eq!(schedule.duration_secs, 0);
        assert_eq!(schedule.distance_km, 0.0);
    }

    #[test]
    fn duration_limit_drops_trailing_stops() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);
        let depot = Coordinate::new(36.0, -115.0);
        let stops = vec![stop("near", 36.05, -115.0), stop("far", 36.30, -115.0)];
        let vehicle = Vehicle::new("v", 10.0).with_max_duration_secs(HOUR);

        let schedule = builder.build(depot, &stops, Some(&vehicle));

        assert_eq!(schedule.kept, vec![0]);
        assert_eq!(schedule.removed, vec![(1, UnassignedReason::DurationLimit)]);
        assert!(schedule.duration_secs <= HOUR);
    }

    #[test]
    fn distance_limit_drops_trailing_stops() {
        let config = config();
        let estimator = DistanceEstimator::default();
        let builder = ScheduleBuilder::new(&estimator, &config);
        let depot = Coordinate::new(36.0, -115.0);
        let stops = vec![stop("near", 36.05, -115.0), stop("far", 36.30, -115.0)];
        let vehicle = Vehicle::new("v", 10.0).with_max_distance_km(20.0);

        let schedule = builder.build(depot, &stops, Some(&vehicle));

        assert_eq!(schedule.kept, vec![0]);
        assert_eq!(schedule.removed, vec![(1, UnassignedReason::ExceedsVehicleLimits)]);
        assert!(schedule.distance_km <= 20.0);
        assert!((builder.distance_km(depot, &stops[..1]) - schedule.distance_km).abs() < 1e-9);
    }
}
