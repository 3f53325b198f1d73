//! Address resolution: cache, provider chain, rate limiting and fallback.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fxhash::FxHashMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::{NormalizedAddress, fallback_coordinate, normalize};
use crate::cancel::CancellationToken;
use crate::config::ResolverConfig;
use crate::error::{OptimizeError, ProviderError, ValidationError};
use crate::geocode_cache::{GeocodeCache, GeocodeCacheEntry};
use crate::model::{Accuracy, Coordinate, GeocodeFailure, GeocodeInfo};
use crate::traits::{GeocodeProvider, ProviderHit};

/// Provider id recorded on hash-derived coordinates.
pub const FALLBACK_PROVIDER: &str = "fallback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub coordinate: Coordinate,
    pub accuracy: Accuracy,
    pub confidence: f64,
    pub provider: String,
    pub from_cache: bool,
}

impl Resolution {
    fn from_entry(entry: &GeocodeCacheEntry, from_cache: bool) -> Self {
        Self {
            coordinate: entry.coordinate,
            accuracy: entry.accuracy,
            confidence: entry.confidence,
            provider: entry.provider.clone(),
            from_cache,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provider == FALLBACK_PROVIDER
    }

    pub fn info(&self) -> GeocodeInfo {
        GeocodeInfo {
            accuracy: self.accuracy,
            confidence: self.confidence,
            provider: self.provider.clone(),
            from_cache: self.from_cache,
        }
    }
}

/// A resolution other callers can wait on.
#[derive(Default)]
struct InFlight {
    result: Mutex<Option<Resolution>>,
    ready: Condvar,
}

impl InFlight {
    fn wait(&self) -> Resolution {
        let mut result = self.result.lock();
        loop {
            if let Some(resolution) = result.as_ref() {
                return resolution.clone();
            }
            self.ready.wait(&mut result);
        }
    }

    fn publish(&self, resolution: Resolution) {
        *self.result.lock() = Some(resolution);
        self.ready.notify_all();
    }

    fn is_published(&self) -> bool {
        self.result.lock().is_some()
    }
}

/// The leader's claim on an in-flight address.
///
/// Dropping it wakes every waiter and clears the key, also when the provider
/// call unwinds. Waiters then get the fallback coordinate.
struct Lead<'a> {
    resolver: &'a AddressResolver,
    normalized: &'a NormalizedAddress,
    slot: Arc<InFlight>,
}

impl Drop for Lead<'_> {
    fn drop(&mut self) {
        if !self.slot.is_published() {
            warn!(address = %self.normalized.query, "resolution abandoned, releasing waiters with fallback");
            self.slot.publish(self.resolver.fallback(self.normalized));
        }
        self.resolver.in_flight.lock().remove(&self.normalized.key);
    }
}

/// Bounds concurrent outbound calls and spaces them by a minimum interval.
struct RateLimiter {
    permits: Mutex<usize>,
    released: Condvar,
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            permits: Mutex::new(max_concurrent.max(1)),
            released: Condvar::new(),
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    fn run<T>(&self, call: impl FnOnce() -> T) -> T {
        {
            let mut available = self.permits.lock();
            while *available == 0 {
                self.released.wait(&mut available);
            }
            *available -= 1;
        }
        let _permit = Permit(self);

        {
            let mut last = self.last_call.lock();
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < self.min_interval {
                    thread::sleep(self.min_interval - elapsed);
                }
            }
            *last = Some(Instant::now());
        }

        call()
    }
}

struct Permit<'a>(&'a RateLimiter);

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self.0.permits.lock() += 1;
        self.0.released.notify_one();
    }
}

pub struct AddressResolver {
    providers: Vec<Box<dyn GeocodeProvider>>,
    cache: Arc<GeocodeCache>,
    config: ResolverConfig,
    in_flight: Mutex<FxHashMap<String, Arc<InFlight>>>,
    limiter: RateLimiter,
    failures: Mutex<Vec<GeocodeFailure>>,
}

impl AddressResolver {
    /// `providers` are tried in order; the first is the primary.
    pub fn new(
        providers: Vec<Box<dyn GeocodeProvider>>,
        cache: Arc<GeocodeCache>,
        config: ResolverConfig,
    ) -> Self {
        let limiter = RateLimiter::new(config.max_concurrent_calls, config.min_call_interval());
        Self {
            providers,
            cache,
            config,
            in_flight: Mutex::new(FxHashMap::default()),
            limiter,
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Resolves `address` to a coordinate.
    ///
    /// Only an empty address is an error; provider failures degrade to the
    /// deterministic fallback coordinate and are recorded as failures.
    pub fn resolve(&self, address: &str) -> Result<Resolution, ValidationError> {
        let normalized =
            normalize(address, &self.config.region_qualifiers).ok_or(ValidationError::EmptyAddress)?;

        if let Some(entry) = self.cache.get(&normalized.key) {
            return Ok(Resolution::from_entry(&entry, true));
        }

        let (slot, leader) = {
            let mut in_flight = self.in_flight.lock();
            // A leader may have finished between the first lookup and taking the lock.
            if let Some(entry) = self.cache.get(&normalized.key) {
                return Ok(Resolution::from_entry(&entry, true));
            }
            match in_flight.get(&normalized.key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(InFlight::default());
                    in_flight.insert(normalized.key.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !leader {
            debug!(address = %normalized.query, "joining in-flight resolution");
            return Ok(slot.wait());
        }

        let lead = Lead {
            resolver: self,
            normalized: &normalized,
            slot,
        };
        let resolution = self.resolve_uncached(&normalized);
        lead.slot.publish(resolution.clone());
        drop(lead);

        Ok(resolution)
    }

    /// Resolves addresses in fixed-size groups, sequentially within a group.
    ///
    /// Groups that reached a provider are followed by the inter-group delay.
    /// Cancellation is checked before every group.
    pub fn resolve_batch<S: AsRef<str>>(
        &self,
        addresses: &[S],
        cancel: &CancellationToken,
    ) -> Result<Vec<Resolution>, OptimizeError> {
        let group_size = self.config.batch_size.max(1);
        let group_count = addresses.len().div_ceil(group_size);
        let mut resolutions = Vec::with_capacity(addresses.len());

        info!(addresses = addresses.len(), groups = group_count, "resolving address batch");

        for (group_index, group) in addresses.chunks(group_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(OptimizeError::Cancelled);
            }

            let mut reached_provider = false;
            for address in group {
                let resolution = self.resolve(address.as_ref())?;
                reached_provider |= !resolution.from_cache;
                resolutions.push(resolution);
            }

            let last_group = group_index + 1 == group_count;
            if reached_provider && !last_group {
                thread::sleep(self.config.inter_group_delay());
            }
        }

        Ok(resolutions)
    }

    /// Drains the soft failures recorded since the last call.
    pub fn take_failures(&self) -> Vec<GeocodeFailure> {
        std::mem::take(&mut *self.failures.lock())
    }

    fn resolve_uncached(&self, normalized: &NormalizedAddress) -> Resolution {
        for provider in &self.providers {
            match self.call_with_retries(provider.as_ref(), &normalized.query) {
                Ok(hit) => match self.accept(hit) {
                    Ok(hit) => {
                        let entry = self.cache.insert(
                            &normalized.key,
                            hit.coordinate,
                            hit.accuracy,
                            hit.confidence,
                            provider.id(),
                        );
                        return Resolution::from_entry(&entry, false);
                    }
                    Err(err) => self.record_failure(&normalized.query, provider.id(), &err),
                },
                Err(err) => self.record_failure(&normalized.query, provider.id(), &err),
            }
        }

        let resolution = self.fallback(normalized);
        warn!(address = %normalized.query, coordinate = %resolution.coordinate, "all providers failed, using fallback coordinate");
        resolution
    }

    fn fallback(&self, normalized: &NormalizedAddress) -> Resolution {
        Resolution {
            coordinate: fallback_coordinate(&normalized.key, &self.config.bounds),
            accuracy: Accuracy::Low,
            confidence: 0.0,
            provider: FALLBACK_PROVIDER.to_string(),
            from_cache: false,
        }
    }

    fn call_with_retries(
        &self,
        provider: &dyn GeocodeProvider,
        query: &str,
    ) -> Result<ProviderHit, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.limiter.run(|| provider.geocode(query)) {
                Err(ProviderError::Timeout) if attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    debug!(provider = provider.id(), attempt, ?delay, "provider timed out, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Rejects coordinates that are malformed or outside the service region.
    fn accept(&self, hit: ProviderHit) -> Result<ProviderHit, ProviderError> {
        if hit.coordinate.is_valid() && self.config.bounds.contains(&hit.coordinate) {
            Ok(hit)
        } else {
            Err(ProviderError::OutOfBounds {
                lat: hit.coordinate.lat,
                lng: hit.coordinate.lng,
            })
        }
    }

    fn record_failure(&self, address: &str, provider: &str, err: &ProviderError) {
        warn!(address, provider, error = %err, "geocoding provider failed");
        self.failures.lock().push(GeocodeFailure {
            address: address.to_string(),
            provider: provider.to_string(),
            reason: err.to_string(),
        });
    }
}
