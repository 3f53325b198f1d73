//! Visiting order within a route: nearest-neighbor construction and 2-opt.
//!
//! Orders are node indices into a distance matrix whose node 0 is the depot;
//! every tour starts and ends there.

use std::time::Instant;

use tracing::debug;

use crate::config::{OptimizerConfig, SequencingConfig};
use crate::distance::DistanceEstimator;
use crate::model::{Coordinate, Priority};
use crate::traits::{DistanceMatrixProvider, RouteSequencer, Sequence};

/// Moves must shorten the tour by more than this to count.
const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Total length of depot → `order` → depot.
pub fn route_distance(matrix: &[Vec<f64>], order: &[usize]) -> f64 {
    let mut distance = 0.0;
    let mut previous = 0;
    for &node in order {
        distance += matrix[previous][node];
        previous = node;
    }
    distance + matrix[previous][0]
}

/// Greedy construction: repeatedly append the unvisited node nearest to the tail.
///
/// When `leading` is set it is visited first; otherwise the tour starts from
/// the node nearest the depot. Ties go to the node listed first.
pub fn nearest_neighbor(matrix: &[Vec<f64>], nodes: &[usize], leading: Option<usize>) -> Vec<usize> {
    let mut remaining: Vec<usize> = nodes.to_vec();
    let mut order = Vec::with_capacity(nodes.len());
    let mut tail = 0;

    if let Some(first) = leading {
        if let Some(position) = remaining.iter().position(|&node| node == first) {
            remaining.remove(position);
            order.push(first);
            tail = first;
        }
    }

    while !remaining.is_empty() {
        let mut best = 0;
        for (position, &node) in remaining.iter().enumerate().skip(1) {
            if matrix[tail][node] < matrix[tail][remaining[best]] {
                best = position;
            }
        }
        tail = remaining.remove(best);
        order.push(tail);
    }

    order
}

/// Most urgent node, nearest to the depot among equals.
pub fn most_urgent(matrix: &[Vec<f64>], nodes: &[usize], priorities: &[Priority]) -> Option<usize> {
    nodes.iter().copied().min_by(|&a, &b| {
        priorities[a]
            .cmp(&priorities[b])
            .then_with(|| matrix[0][a].total_cmp(&matrix[0][b]))
            .then(a.cmp(&b))
    })
}

/// Result of a 2-opt search.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoOptOutcome {
    pub order: Vec<usize>,
    pub distance_km: f64,
    pub moves: usize,
    /// False when the move or time budget ran out before convergence.
    pub converged: bool,
}

/// First-improvement 2-opt. Positions before `fixed` never move.
///
/// Reversing `order[i..=j]` replaces edges (prev, order[i]) and
/// (order[j], next) with (prev, order[j]) and (order[i], next).
pub fn two_opt(
    matrix: &[Vec<f64>],
    order: &[usize],
    fixed: usize,
    max_moves: usize,
    deadline: Option<Instant>,
) -> TwoOptOutcome {
    let mut current = order.to_vec();
    let n = current.len();
    let mut moves = 0;
    let mut converged = true;

    if n >= 2 {
        let mut improved = true;
        'search: while improved {
            improved = false;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                converged = false;
                break;
            }

            for i in fixed..n - 1 {
                for j in i + 1..n {
                    let prev = if i == 0 { 0 } else { current[i - 1] };
                    let next = if j == n - 1 { 0 } else { current[j + 1] };

                    let before = matrix[prev][current[i]] + matrix[current[j]][next];
                    let after = matrix[prev][current[j]] + matrix[current[i]][next];
                    if after + IMPROVEMENT_EPSILON < before {
                        current[i..=j].reverse();
                        moves += 1;
                        improved = true;
                        if moves >= max_moves {
                            converged = false;
                            break 'search;
                        }
                    }
                }
            }
        }
    }

    TwoOptOutcome {
        distance_km: route_distance(matrix, &current),
        order: current,
        moves,
        converged,
    }
}

/// Nearest-neighbor construction followed by 2-opt, on haversine distances.
#[derive(Debug, Clone, Default)]
pub struct LocalSearchSequencer {
    estimator: DistanceEstimator,
    config: SequencingConfig,
}

impl LocalSearchSequencer {
    pub fn new(estimator: DistanceEstimator, config: SequencingConfig) -> Self {
        Self { estimator, config }
    }

    /// Sequencer using the traffic model and search budget of `config`.
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(DistanceEstimator::new(config.traffic.clone()), config.sequencing.clone())
    }

    /// Sequences over a precomputed matrix.
    ///
    /// Starts 2-opt from the shorter of the nearest-neighbor tour and
    /// `initial`, so the result is never longer than either.
    pub fn improve(&self, matrix: &[Vec<f64>], initial: &[usize], leading: Option<usize>) -> Sequence {
        let constructed = nearest_neighbor(matrix, initial, leading);
        let mut incoming = initial.to_vec();
        if let Some(first) = leading {
            if let Some(position) = incoming.iter().position(|&node| node == first) {
                let node = incoming.remove(position);
                incoming.insert(0, node);
            }
        }

        let constructed_km = route_distance(matrix, &constructed);
        let incoming_km = route_distance(matrix, &incoming);
        let start = if incoming_km + IMPROVEMENT_EPSILON < constructed_km {
            incoming
        } else {
            constructed
        };

        let fixed = usize::from(leading.is_some());
        let deadline = self.config.time_budget().map(|budget| Instant::now() + budget);
        let outcome = two_opt(matrix, &start, fixed, self.config.max_iterations.max(1), deadline);

        debug!(
            stops = initial.len(),
            constructed_km,
            improved_km = outcome.distance_km,
            moves = outcome.moves,
            converged = outcome.converged,
            "sequenced route"
        );

        Sequence {
            order: outcome.order,
            distance_km: outcome.distance_km,
            optimal: outcome.converged,
        }
    }
}

impl RouteSequencer for LocalSearchSequencer {
    fn sequence(&self, points: &[Coordinate], initial: &[usize], leading: Option<usize>) -> Sequence {
        let matrix = self.estimator.matrix_for(points);
        self.improve(&matrix, initial, leading)
    }
}
