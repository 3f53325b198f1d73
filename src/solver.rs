//! End-to-end optimization: validation, geocoding, zoning, route formation,
//! sequencing, scheduling and scoring.

use std::collections::BTreeSet;

use fxhash::FxHashSet;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{OptimizerConfig, Strategy};
use crate::distance::DistanceEstimator;
use crate::error::{OptimizeError, ValidationError};
use crate::model::{
    Coordinate, GeocodeInfo, OptimizationRequest, OptimizationResult, Priority, Route, Stop, UnassignedReason,
    UnassignedStop, Vehicle,
};
use crate::resolver::AddressResolver;
use crate::savings::{DemandPoint, FormedRoute, SavingsSolver};
use crate::schedule::ScheduleBuilder;
use crate::scoring::RouteScorer;
use crate::sequence::most_urgent;
use crate::traits::{DistanceMatrixProvider, RouteSequencer};
use crate::zones::partition;

/// Rejects requests that cannot be planned at all.
pub fn validate(request: &OptimizationRequest, config: &OptimizerConfig) -> Result<(), ValidationError> {
    if request.orders.is_empty() {
        return Err(ValidationError::NoOrders);
    }
    if request.vehicles.is_empty() {
        return Err(ValidationError::EmptyFleet);
    }
    if !request.depot.coordinate.is_valid() {
        return Err(ValidationError::InvalidDepot);
    }
    if config.working_hours.start >= config.working_hours.end {
        return Err(ValidationError::InvalidWorkingHours);
    }

    let mut order_ids = FxHashSet::default();
    for order in &request.orders {
        if !order_ids.insert(order.id.as_str()) {
            return Err(ValidationError::DuplicateOrder(order.id.clone()));
        }
        if !(order.demand.is_finite() && order.demand > 0.0) {
            return Err(ValidationError::NonPositiveDemand {
                id: order.id.clone(),
                demand: order.demand,
            });
        }
        match order.coordinate {
            Some(coordinate) if !coordinate.is_valid() => {
                return Err(ValidationError::InvalidCoordinate(order.id.clone()));
            }
            None if order.address.trim().is_empty() => {
                return Err(ValidationError::MissingAddress(order.id.clone()));
            }
            _ => {}
        }
        if order.time_window.is_some_and(|window| window.earliest > window.latest) {
            return Err(ValidationError::InvalidTimeWindow(order.id.clone()));
        }
    }

    let mut vehicle_ids = FxHashSet::default();
    for vehicle in &request.vehicles {
        if !vehicle_ids.insert(vehicle.id.as_str()) {
            return Err(ValidationError::DuplicateVehicle(vehicle.id.clone()));
        }
        if !(vehicle.capacity.is_finite() && vehicle.capacity > 0.0) {
            return Err(ValidationError::NonPositiveCapacity {
                id: vehicle.id.clone(),
                capacity: vehicle.capacity,
            });
        }
    }

    let demand: f64 = request.orders.iter().map(|order| order.demand).sum();
    let capacity: f64 = request.vehicles.iter().map(|vehicle| vehicle.capacity).sum();
    if demand > capacity {
        return Err(ValidationError::CapacityExceeded { demand, capacity });
    }

    Ok(())
}

/// Plans routes for `request`.
///
/// Orders carrying a coordinate skip geocoding. Zones are solved in key order
/// against one shared pool of vehicles; routes within a zone are sequenced
/// and scheduled in parallel. Cancellation is observed between geocoding
/// groups and between zones.
pub fn optimize<S>(
    request: &OptimizationRequest,
    resolver: &AddressResolver,
    sequencer: &S,
    config: &OptimizerConfig,
    cancel: &CancellationToken,
) -> Result<OptimizationResult, OptimizeError>
where
    S: RouteSequencer + ?Sized,
{
    validate(request, config)?;
    info!(
        orders = request.orders.len(),
        vehicles = request.vehicles.len(),
        "starting optimization"
    );

    resolver.cache().evict_expired();

    let stops = geocode(request, resolver, cancel)?;
    let depot = request.depot.coordinate;
    let zones = partition(stops, depot, config.zone_policy);
    info!(zones = zones.len(), "partitioned stops");

    let estimator = DistanceEstimator::new(config.traffic.clone());
    let schedule = ScheduleBuilder::new(&estimator, config);
    let formation = SavingsSolver::new(&estimator);

    let mut free = vec![true; request.vehicles.len()];
    let mut routes: Vec<Route> = Vec::new();
    let mut unassigned: Vec<UnassignedStop> = Vec::new();

    for (zone, zone_stops) in zones {
        if cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }

        let pool: Vec<usize> = (0..free.len()).filter(|&index| free[index]).collect();
        if pool.is_empty() {
            warn!(zone = %zone, stops = zone_stops.len(), "no vehicles left for zone");
            unassigned.extend(zone_stops.into_iter().map(|stop| UnassignedStop {
                stop,
                reason: UnassignedReason::NoVehicleAvailable,
            }));
            continue;
        }
        let vehicles: Vec<Vehicle> = pool.iter().map(|&index| request.vehicles[index].clone()).collect();

        let locations: Vec<Coordinate> = std::iter::once(depot)
            .chain(zone_stops.iter().map(|stop| stop.coordinate))
            .collect();
        let matrix = estimator.matrix_for(&locations);
        let points: Vec<DemandPoint> = zone_stops
            .iter()
            .map(|stop| DemandPoint {
                demand: stop.order.demand,
                service_secs: schedule.service_secs(&stop.order),
                priority: stop.order.priority,
            })
            .collect();

        let outcome = match config.strategy {
            Strategy::Savings => formation.solve(&matrix, &points, &vehicles),
            Strategy::ZoneClustering => formation.cluster(&matrix, &points, &vehicles),
        };
        debug!(
            zone = %zone,
            stops = zone_stops.len(),
            routes = outcome.routes.len(),
            unassigned = outcome.unassigned.len(),
            "formed zone routes"
        );

        for (node, reason) in &outcome.unassigned {
            unassigned.push(UnassignedStop {
                stop: zone_stops[node - 1].clone(),
                reason: *reason,
            });
        }
        for formed in &outcome.routes {
            free[pool[formed.vehicle]] = false;
        }

        let priorities: Vec<Priority> = std::iter::once(Priority::Low)
            .chain(zone_stops.iter().map(|stop| stop.order.priority))
            .collect();

        let planned: Vec<PlannedRoute> = outcome
            .routes
            .par_iter()
            .map(|formed| {
                let leading = config
                    .sequencing
                    .priority_aware
                    .then(|| most_urgent(&matrix, &formed.nodes, &priorities))
                    .flatten();
                plan_route(
                    formed,
                    &vehicles[formed.vehicle],
                    &zone,
                    &zone_stops,
                    depot,
                    leading,
                    sequencer,
                    &schedule,
                )
            })
            .collect();

        for (formed, plan) in outcome.routes.iter().zip(planned) {
            unassigned.extend(plan.removed);
            match plan.route {
                Some(route) => routes.push(route),
                // Nothing left to deliver; the vehicle can serve a later zone.
                None => free[pool[formed.vehicle]] = true,
            }
        }
    }

    let scorer = RouteScorer::new(&config.scoring, &schedule);
    for route in &mut routes {
        let score = scorer.score(route);
        route.score = score.efficiency;
        debug!(
            vehicle = %route.vehicle_id,
            stops = route.stops.len(),
            distance_km = route.total_distance_km,
            score = route.score,
            "scored route"
        );
    }

    unassigned.sort_by_key(|missing| missing.stop.input_index);
    let metrics = scorer.metrics(depot, &routes, &unassigned);
    let partial = routes.iter().any(|route| !route.optimal);
    let geocode_failures = resolver.take_failures();

    info!(
        routes = routes.len(),
        unassigned = unassigned.len(),
        distance_km = metrics.total_distance_km,
        distance_saved_pct = metrics.distance_saved_pct,
        partial,
        "optimization finished"
    );

    Ok(OptimizationResult {
        routes,
        unassigned,
        metrics,
        geocode_failures,
        partial,
    })
}

/// Turns orders into stops, resolving the ones without a coordinate.
fn geocode(
    request: &OptimizationRequest,
    resolver: &AddressResolver,
    cancel: &CancellationToken,
) -> Result<Vec<Stop>, OptimizeError> {
    let addresses: Vec<&str> = request
        .orders
        .iter()
        .filter(|order| order.coordinate.is_none())
        .map(|order| order.address.as_str())
        .collect();
    let mut resolutions = resolver.resolve_batch(&addresses, cancel)?.into_iter();

    let mut stops = Vec::with_capacity(request.orders.len());
    for (input_index, order) in request.orders.iter().enumerate() {
        let (coordinate, geocode) = match order.coordinate {
            Some(coordinate) => (coordinate, GeocodeInfo::supplied()),
            None => {
                let Some(resolution) = resolutions.next() else {
                    // resolve_batch yields one resolution per address.
                    return Err(ValidationError::MissingAddress(order.id.clone()).into());
                };
                if resolution.is_fallback() {
                    warn!(order = %order.id, address = %order.address, "using fallback coordinate");
                }
                (resolution.coordinate, resolution.info())
            }
        };

        stops.push(Stop {
            order: order.clone(),
            coordinate,
            geocode,
            input_index,
            zone: String::new(),
        });
    }

    Ok(stops)
}

struct PlannedRoute {
    route: Option<Route>,
    removed: Vec<UnassignedStop>,
}

/// Sequences and schedules one formed route.
#[allow(clippy::too_many_arguments)]
fn plan_route<S>(
    formed: &FormedRoute,
    vehicle: &Vehicle,
    zone: &str,
    zone_stops: &[Stop],
    depot: Coordinate,
    leading: Option<usize>,
    sequencer: &S,
    schedule: &ScheduleBuilder,
) -> PlannedRoute
where
    S: RouteSequencer + ?Sized,
{
    // Sequencing runs on route-local indices: 0 is the depot, k is formed.nodes[k - 1].
    let locations: Vec<Coordinate> = std::iter::once(depot)
        .chain(formed.nodes.iter().map(|&node| zone_stops[node - 1].coordinate))
        .collect();
    let initial: Vec<usize> = (1..locations.len()).collect();
    let leading = leading.and_then(|node| formed.nodes.iter().position(|&n| n == node).map(|p| p + 1));

    let in_order = |order: &[usize]| -> Vec<Stop> {
        order
            .iter()
            .map(|&local| zone_stops[formed.nodes[local - 1] - 1].clone())
            .collect()
    };

    let mut sequence = sequencer.sequence(&locations, &initial, leading);
    let mut ordered = in_order(&sequence.order);
    // Pinning a stop first can lengthen the tour past what formation admitted.
    if leading.is_some()
        && vehicle
            .max_distance_km
            .is_some_and(|max| schedule.distance_km(depot, &ordered) > max)
    {
        debug!(vehicle = %vehicle.id, "urgent-first order exceeds distance limit, sequencing freely");
        sequence = sequencer.sequence(&locations, &initial, None);
        ordered = in_order(&sequence.order);
    }

    let timed = schedule.build(depot, &ordered, Some(vehicle));
    let removed = timed
        .removed
        .iter()
        .map(|&(position, reason)| UnassignedStop {
            stop: ordered[position].clone(),
            reason,
        })
        .collect();

    if timed.kept.is_empty() {
        return PlannedRoute { route: None, removed };
    }

    let stops: Vec<Stop> = timed.kept.iter().map(|&position| ordered[position].clone()).collect();
    let route = Route {
        vehicle_id: vehicle.id.clone(),
        zone: zone.to_string(),
        total_demand: stops.iter().map(|stop| stop.order.demand).sum(),
        zones: stops.iter().map(|stop| stop.zone.clone()).collect::<BTreeSet<_>>(),
        stops,
        etas: timed.etas,
        start_time: timed.start_time,
        end_time: timed.end_time,
        total_distance_km: timed.distance_km,
        total_duration_secs: timed.duration_secs,
        score: 0.0,
        optimal: sequence.optimal,
    };

    PlannedRoute {
        route: Some(route),
        removed,
    }
}
