//! Scripted geocoding providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use route_optimizer::config::ResolverConfig;
use route_optimizer::error::ProviderError;
use route_optimizer::geocode_cache::GeocodeCache;
use route_optimizer::model::{Accuracy, Coordinate};
use route_optimizer::resolver::AddressResolver;
use route_optimizer::traits::{GeocodeProvider, ProviderHit};

use super::las_vegas::Location;

/// Answers from a fixed table keyed by street (case-insensitive substring).
pub struct TableProvider {
    id: &'static str,
    entries: Vec<(String, Coordinate)>,
    calls: Arc<AtomicUsize>,
}

impl TableProvider {
    pub fn new(id: &'static str, locations: &[Location]) -> Self {
        Self {
            id,
            entries: locations
                .iter()
                .map(|location| (location.street.to_lowercase(), Coordinate::new(location.lat, location.lng)))
                .collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `geocode` calls, readable after the provider is boxed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl GeocodeProvider for TableProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn geocode(&self, address: &str) -> Result<ProviderHit, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = address.to_lowercase();
        self.entries
            .iter()
            .find(|(street, _)| query.contains(street.as_str()))
            .map(|(_, coordinate)| ProviderHit {
                coordinate: *coordinate,
                confidence: 0.9,
                accuracy: Accuracy::High,
            })
            .ok_or(ProviderError::NotFound)
    }
}

/// Always times out.
pub struct DownProvider;

impl GeocodeProvider for DownProvider {
    fn id(&self) -> &str {
        "down"
    }

    fn geocode(&self, _address: &str) -> Result<ProviderHit, ProviderError> {
        Err(ProviderError::Timeout)
    }
}

pub fn resolver(providers: Vec<Box<dyn GeocodeProvider>>) -> AddressResolver {
    AddressResolver::new(
        providers,
        Arc::new(GeocodeCache::new(30 * 24 * 3600, 10_000)),
        ResolverConfig::without_delays(),
    )
}
