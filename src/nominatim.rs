//! Nominatim HTTP adapter for geocoding.

use serde::Deserialize;

use crate::error::ProviderError;
use crate::model::{Accuracy, Coordinate};
use crate::traits::{GeocodeProvider, ProviderHit};

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Restricts results to these ISO country codes when non-empty.
    pub country_codes: Vec<String>,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("route-optimizer/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
            country_codes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    id: String,
    config: NominatimConfig,
    client: reqwest::blocking::Client,
}

impl NominatimClient {
    pub fn new(config: NominatimConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            id: "nominatim".to_string(),
            config,
            client,
        })
    }

    /// Overrides the provider id, e.g. to tell a self-hosted instance apart.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl GeocodeProvider for NominatimClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn geocode(&self, address: &str) -> Result<ProviderHit, ProviderError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let mut query = vec![
            ("q", address.to_string()),
            ("format", "jsonv2".to_string()),
            ("limit", "1".to_string()),
        ];
        if !self.config.country_codes.is_empty() {
            query.push(("countrycodes", self.config.country_codes.join(",")));
        }

        let places = self
            .client
            .get(url)
            .query(&query)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<Vec<NominatimPlace>>())
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout
                } else if err.is_decode() {
                    ProviderError::Decode(err.to_string())
                } else {
                    ProviderError::Http(err)
                }
            })?;

        places
            .into_iter()
            .next()
            .ok_or(ProviderError::NotFound)?
            .into_hit()
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    place_rank: Option<u32>,
}

impl NominatimPlace {
    fn into_hit(self) -> Result<ProviderHit, ProviderError> {
        let lat = self
            .lat
            .parse::<f64>()
            .map_err(|err| ProviderError::Decode(format!("lat {:?}: {}", self.lat, err)))?;
        let lng = self
            .lon
            .parse::<f64>()
            .map_err(|err| ProviderError::Decode(format!("lon {:?}: {}", self.lon, err)))?;

        Ok(ProviderHit {
            coordinate: Coordinate::new(lat, lng),
            confidence: self.importance.unwrap_or(0.5).clamp(0.0, 1.0),
            accuracy: accuracy_for_rank(self.place_rank.unwrap_or(0)),
        })
    }
}

/// Street and building ranks are precise, neighbourhoods and towns less so.
fn accuracy_for_rank(rank: u32) -> Accuracy {
    match rank {
        26.. => Accuracy::High,
        16..=25 => Accuracy::Medium,
        _ => Accuracy::Low,
    }
}
