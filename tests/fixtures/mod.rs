//! Test fixtures for route-optimizer.
//!
//! Provides realistic test data including:
//! - Real Las Vegas / Henderson delivery addresses (from OpenStreetMap)
//! - Builders for orders, fleets and requests
//! - Scripted geocoding providers

#![allow(dead_code)]

pub mod las_vegas;
pub mod providers;

pub use las_vegas::*;
pub use providers::*;
