//! route-optimizer core
//!
//! Turns a snapshot of delivery orders, vehicles and a depot into capacity-
//! and time-window-feasible routes with schedules and quality metrics.
//!
//! The pipeline is: address resolution ([`resolver`]), zoning ([`zones`]),
//! route formation ([`savings`]), sequencing ([`sequence`], [`osrm`]),
//! scheduling ([`schedule`]) and scoring ([`scoring`]), wired together by
//! [`solver::optimize`].

pub mod address;
pub mod cancel;
pub mod config;
pub mod distance;
pub mod error;
pub mod geocode_cache;
pub mod model;
pub mod nominatim;
pub mod osrm;
pub mod resolver;
pub mod savings;
pub mod schedule;
pub mod scoring;
pub mod sequence;
pub mod solver;
pub mod traits;
pub mod zones;

pub use cancel::CancellationToken;
pub use config::OptimizerConfig;
pub use error::{OptimizeError, ProviderError, ValidationError};
pub use model::{OptimizationRequest, OptimizationResult};
pub use solver::optimize;
