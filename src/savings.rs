//! Route formation: Clarke-Wright savings and zone-local clustering.
//!
//! Both work on node indices into a distance matrix where node 0 is the depot
//! and node `k` is `points[k - 1]`.
//!
//! The savings of serving `i` and `j` on one route instead of two round trips:
//!
//! ```text
//! s(i, j) = d(0, i) + d(0, j) - d(i, j)
//! ```
//!
//! Routes are merged at their endpoints in decreasing order of savings while
//! some vehicle of the fleet can still run the merged route.

use std::cmp::Ordering;

use tracing::debug;

use crate::distance::DistanceEstimator;
use crate::model::{Priority, UnassignedReason, Vehicle};

/// Savings closer than this are treated as equal.
const SAVING_EPSILON: f64 = 1e-9;

/// What the solvers need to know about a stop.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandPoint {
    pub demand: f64,
    pub service_secs: i32,
    pub priority: Priority,
}

/// A saving for merging the routes ending in `i` and `j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Saving {
    pub i: usize,
    pub j: usize,
    pub value: f64,
}

/// A route with its vehicle, before sequencing and scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct FormedRoute {
    /// Index into the vehicle slice handed to the solver.
    pub vehicle: usize,
    /// Node indices in visiting order, depot excluded.
    pub nodes: Vec<usize>,
    pub demand: f64,
    pub distance_km: f64,
    pub duration_secs: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormationOutcome {
    pub routes: Vec<FormedRoute>,
    /// Nodes that could not be placed on any vehicle.
    pub unassigned: Vec<(usize, UnassignedReason)>,
}

/// Savings for every unordered pair of nodes, largest first.
pub fn compute_savings(matrix: &[Vec<f64>]) -> Vec<Saving> {
    let n = matrix.len();
    let mut savings = Vec::with_capacity(n.saturating_sub(1) * n.saturating_sub(2) / 2);
    for i in 1..n {
        for j in (i + 1)..n {
            let value = matrix[0][i] + matrix[0][j] - matrix[i][j];
            savings.push(Saving { i, j, value });
        }
    }

    savings.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (a.i, a.j).cmp(&(b.i, b.j)))
    });
    savings
}

#[derive(Debug, Clone)]
struct Tour {
    nodes: Vec<usize>,
    demand: f64,
    distance_km: f64,
}

impl Tour {
    fn first(&self) -> Option<usize> {
        self.nodes.first().copied()
    }

    fn last(&self) -> Option<usize> {
        self.nodes.last().copied()
    }
}

/// A feasible merge of the routes holding `i` and `j`.
struct Merge {
    left: usize,
    right: usize,
    nodes: Vec<usize>,
    demand: f64,
    distance_km: f64,
}

pub struct SavingsSolver<'a> {
    estimator: &'a DistanceEstimator,
}

impl<'a> SavingsSolver<'a> {
    pub fn new(estimator: &'a DistanceEstimator) -> Self {
        Self { estimator }
    }

    /// Forms routes with the savings algorithm and assigns vehicles best-fit.
    pub fn solve(&self, matrix: &[Vec<f64>], points: &[DemandPoint], vehicles: &[Vehicle]) -> FormationOutcome {
        if points.is_empty() {
            return FormationOutcome::default();
        }

        let mut tours: Vec<Option<Tour>> = Vec::with_capacity(points.len() + 1);
        let mut route_of: Vec<usize> = vec![0; points.len() + 1];
        tours.push(None);
        for (index, point) in points.iter().enumerate() {
            let node = index + 1;
            route_of[node] = node;
            tours.push(Some(Tour {
                nodes: vec![node],
                demand: point.demand,
                distance_km: matrix[0][node] + matrix[node][0],
            }));
        }

        let savings = compute_savings(matrix);
        let mut merges = 0usize;
        let mut start = 0;
        while start < savings.len() {
            let group_value = savings[start].value;
            let end = savings[start..]
                .iter()
                .position(|saving| group_value - saving.value > SAVING_EPSILON)
                .map_or(savings.len(), |offset| start + offset);
            let group = &savings[start..end];
            let mut used = vec![false; group.len()];

            // Among equal savings, apply the merge giving the shortest route first.
            loop {
                let mut best: Option<(usize, Merge)> = None;
                for (slot, saving) in group.iter().enumerate() {
                    if used[slot] {
                        continue;
                    }
                    let Some(merge) = self.try_merge(matrix, points, vehicles, &tours, &route_of, saving) else {
                        continue;
                    };
                    let better = best.as_ref().is_none_or(|(_, current)| {
                        merge.distance_km + SAVING_EPSILON < current.distance_km
                    });
                    if better {
                        best = Some((slot, merge));
                    }
                }

                let Some((slot, merge)) = best else {
                    break;
                };
                used[slot] = true;
                for &node in &merge.nodes {
                    route_of[node] = merge.left;
                }
                tours[merge.right] = None;
                tours[merge.left] = Some(Tour {
                    nodes: merge.nodes,
                    demand: merge.demand,
                    distance_km: merge.distance_km,
                });
                merges += 1;
            }

            start = end;
        }

        let formed: Vec<Tour> = tours.into_iter().flatten().collect();
        debug!(points = points.len(), merges, routes = formed.len(), "savings merged routes");

        self.assign_vehicles(matrix, points, vehicles, formed)
    }

    /// Fills vehicles one at a time following a nearest-neighbor sweep from the depot.
    pub fn cluster(&self, matrix: &[Vec<f64>], points: &[DemandPoint], vehicles: &[Vehicle]) -> FormationOutcome {
        let mut outcome = FormationOutcome::default();
        let sweep = crate::sequence::nearest_neighbor(matrix, &(1..=points.len()).collect::<Vec<_>>(), None);

        let mut fleet: Vec<usize> = (0..vehicles.len()).collect();
        fleet.sort_by(|&a, &b| {
            vehicles[b]
                .capacity
                .partial_cmp(&vehicles[a].capacity)
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        let mut fleet = fleet.into_iter();
        let mut current: Option<(usize, Vec<usize>)> = fleet.next().map(|vehicle| (vehicle, Vec::new()));

        for node in sweep {
            let alone = [node];
            if !vehicles.iter().any(|vehicle| self.admits(matrix, points, vehicle, &alone)) {
                outcome.unassigned.push((node, UnassignedReason::ExceedsVehicleLimits));
                continue;
            }

            loop {
                let Some((vehicle, nodes)) = current.as_mut() else {
                    outcome.unassigned.push((node, UnassignedReason::NoVehicleAvailable));
                    break;
                };
                nodes.push(node);
                if self.admits(matrix, points, &vehicles[*vehicle], nodes) {
                    break;
                }
                nodes.pop();

                let (vehicle, nodes) = (*vehicle, std::mem::take(nodes));
                if !nodes.is_empty() {
                    outcome.routes.push(self.formed(matrix, points, vehicle, nodes));
                }
                current = fleet.next().map(|vehicle| (vehicle, Vec::new()));
            }
        }

        if let Some((vehicle, nodes)) = current {
            if !nodes.is_empty() {
                outcome.routes.push(self.formed(matrix, points, vehicle, nodes));
            }
        }

        debug!(points = points.len(), routes = outcome.routes.len(), "clustered zone");
        outcome
    }

    /// Round-trip distance and unhurried duration (travel plus service) of `nodes`.
    pub fn tour_cost(&self, matrix: &[Vec<f64>], points: &[DemandPoint], nodes: &[usize]) -> (f64, i32) {
        let mut distance = 0.0;
        let mut duration = 0;
        let mut previous = 0;
        for &node in nodes.iter().chain(std::iter::once(&0)) {
            let leg = matrix[previous][node];
            distance += leg;
            duration += self.estimator.travel_time(leg, 0, false);
            if node != 0 {
                duration += points[node - 1].service_secs;
            }
            previous = node;
        }
        (distance, duration)
    }

    fn admits(&self, matrix: &[Vec<f64>], points: &[DemandPoint], vehicle: &Vehicle, nodes: &[usize]) -> bool {
        let demand: f64 = nodes.iter().map(|&node| points[node - 1].demand).sum();
        let (distance, duration) = self.tour_cost(matrix, points, nodes);
        vehicle.admits(demand, distance, duration, nodes.len())
    }

    fn formed(&self, matrix: &[Vec<f64>], points: &[DemandPoint], vehicle: usize, nodes: Vec<usize>) -> FormedRoute {
        let demand = nodes.iter().map(|&node| points[node - 1].demand).sum();
        let (distance_km, duration_secs) = self.tour_cost(matrix, points, &nodes);
        FormedRoute {
            vehicle,
            nodes,
            demand,
            distance_km,
            duration_secs,
        }
    }

    /// Merges only when `i` and `j` are endpoints of two distinct routes and
    /// some vehicle of the fleet can run the result.
    fn try_merge(
        &self,
        matrix: &[Vec<f64>],
        points: &[DemandPoint],
        vehicles: &[Vehicle],
        tours: &[Option<Tour>],
        route_of: &[usize],
        saving: &Saving,
    ) -> Option<Merge> {
        let (ri, rj) = (route_of[saving.i], route_of[saving.j]);
        if ri == rj {
            return None;
        }
        let (left, right) = (tours[ri].as_ref()?, tours[rj].as_ref()?);

        // Orient so the route holding i ends in i and the route holding j starts with j.
        let mut left_nodes = left.nodes.clone();
        if left.last() != Some(saving.i) {
            if left.first() != Some(saving.i) {
                return None;
            }
            left_nodes.reverse();
        }
        let mut right_nodes = right.nodes.clone();
        if right.first() != Some(saving.j) {
            if right.last() != Some(saving.j) {
                return None;
            }
            right_nodes.reverse();
        }

        let demand = left.demand + right.demand;
        let distance_km = left.distance_km + right.distance_km - saving.value;
        left_nodes.extend(right_nodes);

        let (_, duration) = self.tour_cost(matrix, points, &left_nodes);
        let stops = left_nodes.len();
        if !vehicles
            .iter()
            .any(|vehicle| vehicle.admits(demand, distance_km, duration, stops))
        {
            return None;
        }

        Some(Merge {
            left: ri,
            right: rj,
            nodes: left_nodes,
            demand,
            distance_km,
        })
    }

    /// Routes with the most urgent and heaviest loads pick vehicles first, each
    /// taking the smallest free vehicle that can run it.
    fn assign_vehicles(
        &self,
        matrix: &[Vec<f64>],
        points: &[DemandPoint],
        vehicles: &[Vehicle],
        tours: Vec<Tour>,
    ) -> FormationOutcome {
        let mut ranked: Vec<(u32, Tour)> = tours
            .into_iter()
            .map(|tour| {
                let urgency = tour
                    .nodes
                    .iter()
                    .map(|&node| points[node - 1].priority.weight())
                    .max()
                    .unwrap_or(0);
                (urgency, tour)
            })
            .collect();
        ranked.sort_by(|(ua, a), (ub, b)| {
            ub.cmp(ua)
                .then_with(|| b.demand.partial_cmp(&a.demand).unwrap_or(Ordering::Equal))
                .then_with(|| a.nodes.first().cmp(&b.nodes.first()))
        });

        let mut free = vec![true; vehicles.len()];
        let mut outcome = FormationOutcome::default();
        for (_, tour) in ranked {
            let (distance, duration) = self.tour_cost(matrix, points, &tour.nodes);
            let stops = tour.nodes.len();
            let fits = |vehicle: &Vehicle| vehicle.admits(tour.demand, distance, duration, stops);

            let chosen = vehicles
                .iter()
                .enumerate()
                .filter(|(index, vehicle)| free[*index] && fits(*vehicle))
                .min_by(|(ia, a), (ib, b)| {
                    a.capacity
                        .partial_cmp(&b.capacity)
                        .unwrap_or(Ordering::Equal)
                        .then(ia.cmp(ib))
                })
                .map(|(index, _)| index);

            match chosen {
                Some(vehicle) => {
                    free[vehicle] = false;
                    outcome.routes.push(FormedRoute {
                        vehicle,
                        nodes: tour.nodes,
                        demand: tour.demand,
                        distance_km: distance,
                        duration_secs: duration,
                    });
                }
                None => {
                    let reason = if vehicles.iter().any(fits) {
                        UnassignedReason::NoVehicleAvailable
                    } else {
                        UnassignedReason::ExceedsVehicleLimits
                    };
                    outcome
                        .unassigned
                        .extend(tour.nodes.iter().map(|&node| (node, reason)));
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinate;
    use crate::traits::DistanceMatrixProvider;

    fn point(demand: f64) -> DemandPoint {
        DemandPoint {
            demand,
            service_secs: 300,
            priority: Priority::Normal,
        }
    }

    fn matrix(coords: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let locations: Vec<Coordinate> = coords.iter().copied().map(Coordinate::from).collect();
        DistanceEstimator::default().matrix_for(&locations)
    }

    fn assigned_nodes(outcome: &FormationOutcome) -> Vec<usize> {
        let mut nodes: Vec<usize> = outcome
            .routes
            .iter()
            .flat_map(|route| route.nodes.iter().copied())
            .chain(outcome.unassigned.iter().map(|(node, _)| *node))
            .collect();
        nodes.sort();
        nodes
    }

    #[test]
    fn savings_formula() {
        let m = matrix(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        let savings = compute_savings(&m);
        assert_eq!(savings.len(), 1);
        let expected = m[0][1] + m[0][2] - m[1][2];
        assert!((savings[0].value - expected).abs() < 1e-9);
        assert!(savings[0].value > 0.0);
    }

    #[test]
    fn merges_collinear_customers_into_one_route() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(10.0), point(10.0)], &[Vehicle::new("v", 25.0)]);

        assert_eq!(outcome.routes.len(), 1);
        assert!(outcome.unassigned.is_empty());
        let route = &outcome.routes[0];
        assert_eq!(route.demand, 20.0);
        assert!(route.nodes == vec![1, 2] || route.nodes == vec![2, 1]);
        assert!((route.distance_km - 2.0 * m[0][2]).abs() < 1e-6);
    }

    #[test]
    fn capacity_prevents_merge() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.1), (0.0, 0.2), (0.0, 0.3)]);
        let vehicles = vec![Vehicle::new("a", 25.0), Vehicle::new("b", 25.0), Vehicle::new("c", 25.0)];
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(15.0), point(15.0), point(15.0)], &vehicles);

        assert_eq!(outcome.routes.len(), 3);
        assert!(outcome.routes.iter().all(|r| r.demand <= 25.0));
        assert_eq!(assigned_nodes(&outcome), vec![1, 2, 3]);
    }

    #[test]
    fn excess_routes_become_unassigned() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.1), (0.1, 0.0), (0.0, -0.1)]);
        let vehicles = vec![Vehicle::new("a", 10.0), Vehicle::new("b", 10.0)];
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(10.0), point(10.0), point(10.0)], &vehicles);

        assert_eq!(outcome.routes.len(), 2);
        assert_eq!(outcome.unassigned.len(), 1);
        assert_eq!(outcome.unassigned[0].1, UnassignedReason::NoVehicleAvailable);
        assert_eq!(assigned_nodes(&outcome), vec![1, 2, 3]);
    }

    #[test]
    fn stop_limit_is_respected() {
        let estimator = DistanceEstimator::default();
        let coords: Vec<(f64, f64)> = std::iter::once((0.0, 0.0))
            .chain((1..=6).map(|k| (0.0, k as f64 * 0.01)))
            .collect();
        let m = matrix(&coords);
        let points = vec![point(1.0); 6];
        let vehicles = vec![Vehicle::new("a", 100.0).with_max_stops(2); 3];

        let outcome = SavingsSolver::new(&estimator).solve(&m, &points, &vehicles);

        assert_eq!(outcome.routes.len(), 3);
        assert!(outcome.routes.iter().all(|r| r.nodes.len() <= 2));
        assert_eq!(assigned_nodes(&outcome), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn distance_limit_is_respected() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.1), (0.0, -0.1)]);
        // Each round trip is ~22 km; a merged route through the depot side is ~44 km.
        let vehicles = vec![
            Vehicle::new("a", 100.0).with_max_distance_km(30.0),
            Vehicle::new("b", 100.0).with_max_distance_km(30.0),
        ];
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(1.0), point(1.0)], &vehicles);

        assert_eq!(outcome.routes.len(), 2);
        for route in &outcome.routes {
            assert!(route.distance_km <= 30.0);
        }
    }

    #[test]
    fn oversized_point_exceeds_limits() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.1)]);
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(50.0)], &[Vehicle::new("a", 10.0)]);

        assert!(outcome.routes.is_empty());
        assert_eq!(outcome.unassigned, vec![(1, UnassignedReason::ExceedsVehicleLimits)]);
    }

    #[test]
    fn urgent_routes_pick_vehicles_first() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.1), (0.0, -0.1)]);
        let mut urgent = point(10.0);
        urgent.priority = Priority::Urgent;
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(10.0), urgent], &[Vehicle::new("a", 10.0)]);

        assert_eq!(outcome.routes.len(), 1);
        assert_eq!(outcome.routes[0].nodes, vec![2]);
        assert_eq!(outcome.unassigned, vec![(1, UnassignedReason::NoVehicleAvailable)]);
    }

    #[test]
    fn best_fit_picks_smallest_vehicle() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.1)]);
        let vehicles = vec![Vehicle::new("big", 100.0), Vehicle::new("small", 20.0)];
        let outcome = SavingsSolver::new(&estimator).solve(&m, &[point(15.0)], &vehicles);

        assert_eq!(outcome.routes[0].vehicle, 1);
    }

    #[test]
    fn clustering_fills_vehicles_in_sweep_order() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.01), (0.0, 0.02), (0.0, 0.03), (0.0, 0.04)]);
        let vehicles = vec![Vehicle::new("a", 20.0), Vehicle::new("b", 20.0)];
        let outcome = SavingsSolver::new(&estimator).cluster(&m, &vec![point(10.0); 4], &vehicles);

        assert_eq!(outcome.routes.len(), 2);
        assert_eq!(outcome.routes[0].nodes, vec![1, 2]);
        assert_eq!(outcome.routes[1].nodes, vec![3, 4]);
        assert!(outcome.unassigned.is_empty());
    }

    #[test]
    fn clustering_reports_leftovers() {
        let estimator = DistanceEstimator::default();
        let m = matrix(&[(0.0, 0.0), (0.0, 0.01), (0.0, 0.02), (0.0, 0.03)]);
        let outcome = SavingsSolver::new(&estimator).cluster(
            &m,
            &[point(10.0), point(10.0), point(99.0)],
            &[Vehicle::new("a", 10.0)],
        );

        assert_eq!(outcome.routes.len(), 1);
        assert_eq!(outcome.routes[0].nodes, vec![1]);
        assert!(outcome.unassigned.contains(&(2, UnassignedReason::NoVehicleAvailable)));
        assert!(outcome.unassigned.contains(&(3, UnassignedReason::ExceedsVehicleLimits)));
    }

    #[test]
    fn interior_nodes_are_not_merge_points() {
        let estimator = DistanceEstimator::default();
        let solver = SavingsSolver::new(&estimator);
        // Route 1-2-3 bends out to 2; 4 sits right next to that middle stop.
        let m = matrix(&[(0.0, 0.0), (0.0, 0.01), (0.0, 0.05), (0.01, 0.01), (0.0, 0.051)]);
        let points = vec![point(1.0); 4];
        let vehicles = vec![Vehicle::new("v", 100.0)];
        let chain = vec![1, 2, 3];
        let tours = vec![
            None,
            Some(Tour {
                distance_km: solver.tour_cost(&m, &points, &chain).0,
                nodes: chain,
                demand: 3.0,
            }),
            None,
            None,
            Some(Tour {
                nodes: vec![4],
                demand: 1.0,
                distance_km: 2.0 * m[0][4],
            }),
        ];
        let route_of = vec![0, 1, 1, 1, 4];
        let saving = |i: usize, j: usize| Saving {
            i,
            j,
            value: m[0][i] + m[0][j] - m[i][j],
        };

        assert!(saving(2, 4).value > saving(3, 4).value);
        assert!(saving(2, 4).value > saving(1, 4).value);
        assert!(solver.try_merge(&m, &points, &vehicles, &tours, &route_of, &saving(2, 4)).is_none());

        let tail = solver
            .try_merge(&m, &points, &vehicles, &tours, &route_of, &saving(3, 4))
            .expect("tail endpoint merges");
        assert_eq!(tail.nodes, vec![1, 2, 3, 4]);
        let head = solver
            .try_merge(&m, &points, &vehicles, &tours, &route_of, &saving(1, 4))
            .expect("head endpoint merges");
        assert_eq!(head.nodes, vec![3, 2, 1, 4]);
    }

    #[test]
    fn equal_savings_prefer_the_shorter_merge() {
        let estimator = DistanceEstimator::default();
        // s(1, 2) = 3 + 1 - 3 = 1 merges into a 7 km route;
        // s(2, 3) = 1 + 1 - 1 = 1 merges into a 3 km route.
        let m = vec![
            vec![0.0, 3.0, 1.0, 1.0],
            vec![3.0, 0.0, 3.0, 3.5],
            vec![1.0, 3.0, 0.0, 1.0],
            vec![1.0, 3.5, 1.0, 0.0],
        ];
        let savings = compute_savings(&m);
        assert_eq!((savings[0].i, savings[0].j), (1, 2));
        assert_eq!(savings[0].value, savings[1].value);

        let vehicles = vec![Vehicle::new("a", 100.0).with_max_stops(2); 2];
        let outcome = SavingsSolver::new(&estimator).solve(&m, &vec![point(1.0); 3], &vehicles);

        assert_eq!(outcome.routes.len(), 2);
        let mut shapes: Vec<Vec<usize>> = outcome
            .routes
            .iter()
            .map(|route| {
                let mut nodes = route.nodes.clone();
                nodes.sort();
                nodes
            })
            .collect();
        shapes.sort();
        assert_eq!(shapes, vec![vec![1], vec![2, 3]]);
    }
}
