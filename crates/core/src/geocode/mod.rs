//! Reverse geocoding with a fixed provider fallback chain.
//!
//! Providers are tried in order until one yields a usable city and country
//! code. Successful lookups are cached per resolver instance, keyed by the
//! coordinate rounded to four decimals (roughly one city block).

mod bigdatacloud;
mod locationiq;
mod nominatim;

pub use bigdatacloud::BigDataCloud;
pub use locationiq::LocationIq;
pub use nominatim::Nominatim;

use crate::metadata::Coordinates;
use crate::naming::Location;
use crate::sanitize::{normalize_city, normalize_country};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const CACHE_PRECISION: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLabel {
    pub city: String,
    pub country: String,
    pub provider: String,
}

impl GeoLabel {
    pub fn location(&self) -> Location {
        Location {
            city: self.city.clone(),
            country: self.country.clone(),
        }
    }
}

/// Place fields as a provider reported them, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPlace {
    pub city: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("unparsable payload: {0}")]
    Payload(String),
    #[error("no place in response")]
    NoResult,
}

pub trait GeocodeProvider {
    fn name(&self) -> &str;

    fn reverse(&self, coords: Coordinates) -> Result<RawPlace, ProviderError>;

    /// City + country code to coordinates. Providers without a search
    /// endpoint report nothing.
    fn forward(&self, _city: &str, _country: &str) -> Result<Option<Coordinates>, ProviderError> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct GeocodeSettings {
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub min_interval: Duration,
    pub user_agent: String,
    pub separator: char,
}

type CacheKey = (i64, i64);

pub struct GeocodingResolver {
    providers: Vec<Box<dyn GeocodeProvider>>,
    separator: char,
    min_interval: Duration,
    last_call: Vec<Option<Instant>>,
    cache: HashMap<CacheKey, GeoLabel>,
    forward_cache: HashMap<(String, String), Option<Coordinates>>,
    network_calls: usize,
}

impl GeocodingResolver {
    pub fn new(providers: Vec<Box<dyn GeocodeProvider>>, separator: char) -> Self {
        let last_call = vec![None; providers.len()];
        Self {
            providers,
            separator,
            min_interval: Duration::ZERO,
            last_call,
            cache: HashMap::new(),
            forward_cache: HashMap::new(),
            network_calls: 0,
        }
    }

    /// Nominatim, then LocationIQ when a key is configured, then BigDataCloud.
    pub fn standard(settings: &GeocodeSettings) -> Result<Self> {
        let client = build_client(settings.timeout, &settings.user_agent)?;
        let mut providers: Vec<Box<dyn GeocodeProvider>> =
            vec![Box::new(Nominatim::new(client.clone()))];
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            providers.push(Box::new(LocationIq::new(client.clone(), key.trim())));
        }
        providers.push(Box::new(BigDataCloud::new(client)));

        Ok(Self::new(providers, settings.separator).with_min_interval(settings.min_interval))
    }

    /// A resolver with no providers: every lookup is unresolved.
    pub fn disabled(separator: char) -> Self {
        Self::new(Vec::new(), separator)
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls
    }

    pub fn resolve(&mut self, coords: Coordinates) -> Option<GeoLabel> {
        let key = cache_key(coords);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!(
                "geocode cache hit for {:.4},{:.4}: {}",
                coords.latitude,
                coords.longitude,
                hit.city
            );
            return Some(hit.clone());
        }

        for index in 0..self.providers.len() {
            self.throttle(index);
            let provider = &self.providers[index];
            let name = provider.name().to_string();
            log::debug!(
                "reverse geocoding {:.5},{:.5} via {name}",
                coords.latitude,
                coords.longitude
            );

            match provider.reverse(coords) {
                Ok(raw) => match self.label_from(raw, &name) {
                    Some(label) => {
                        self.cache.insert(key, label.clone());
                        return Some(label);
                    }
                    None => log::warn!("{name}: response has no usable city/country"),
                },
                Err(err) => log::warn!("{name}: {err}"),
            }
        }

        log::warn!(
            "no provider resolved {:.5},{:.5}",
            coords.latitude,
            coords.longitude
        );
        None
    }

    pub fn forward(&mut self, city: &str, country: &str) -> Option<Coordinates> {
        let key = (city.to_string(), country.to_ascii_uppercase());
        if let Some(hit) = self.forward_cache.get(&key) {
            return *hit;
        }

        let mut found = None;
        for index in 0..self.providers.len() {
            self.throttle(index);
            let provider = &self.providers[index];
            match provider.forward(city, country) {
                Ok(Some(coords)) => {
                    log::debug!(
                        "{}: forward geocoded {city}, {country} to {:.4},{:.4}",
                        provider.name(),
                        coords.latitude,
                        coords.longitude
                    );
                    found = Some(coords);
                    break;
                }
                Ok(None) => {}
                Err(err) => log::warn!("{}: forward lookup failed: {err}", provider.name()),
            }
        }

        self.forward_cache.insert(key, found);
        found
    }

    fn label_from(&self, raw: RawPlace, provider: &str) -> Option<GeoLabel> {
        let city = normalize_city(raw.city.as_deref()?, self.separator)?;
        let country = normalize_country(raw.country_code.as_deref()?)?;
        Some(GeoLabel {
            city,
            country,
            provider: provider.to_string(),
        })
    }

    /// Keeps consecutive calls to one provider at least `min_interval` apart.
    fn throttle(&mut self, index: usize) {
        if let Some(last) = self.last_call[index] {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_call[index] = Some(Instant::now());
        self.network_calls += 1;
    }
}

fn cache_key(coords: Coordinates) -> CacheKey {
    (
        (coords.latitude * CACHE_PRECISION).round() as i64,
        (coords.longitude * CACHE_PRECISION).round() as i64,
    )
}

pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .context("cannot build HTTP client")
}

pub(crate) fn get_json(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, ProviderError> {
    let response = client.get(url).query(query).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }
    response
        .json::<Value>()
        .map_err(|err| ProviderError::Payload(err.to_string()))
}

/// First non-empty string among `keys` in a JSON object.
pub(crate) fn first_str(object: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}
