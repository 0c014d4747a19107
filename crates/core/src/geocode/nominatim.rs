use super::{first_str, get_json, GeocodeProvider, ProviderError, RawPlace};
use crate::metadata::Coordinates;
use reqwest::blocking::Client;
use serde_json::Value;

const REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const CITY_KEYS: &[&str] = &["city", "town", "village", "municipality", "county"];

/// OpenStreetMap Nominatim. No key; usage policy allows one request per second.
pub struct Nominatim {
    client: Client,
}

impl Nominatim {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl GeocodeProvider for Nominatim {
    fn name(&self) -> &str {
        "Nominatim"
    }

    fn reverse(&self, coords: Coordinates) -> Result<RawPlace, ProviderError> {
        let payload = get_json(
            &self.client,
            REVERSE_URL,
            &[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("format", "json".to_string()),
                ("zoom", "10".to_string()),
            ],
        )?;
        parse_address_payload(&payload)
    }

    fn forward(&self, city: &str, country: &str) -> Result<Option<Coordinates>, ProviderError> {
        let payload = get_json(
            &self.client,
            SEARCH_URL,
            &[
                ("q", format!("{city}, {country}")),
                ("format", "json".to_string()),
                ("limit", "1".to_string()),
            ],
        )?;
        parse_search_payload(&payload)
    }
}

/// Shared by Nominatim and LocationIQ, which return the same address shape.
pub(super) fn parse_address_payload(payload: &Value) -> Result<RawPlace, ProviderError> {
    if let Some(message) = payload.get("error").and_then(Value::as_str) {
        return Err(ProviderError::Payload(message.to_string()));
    }
    let address = payload.get("address").ok_or(ProviderError::NoResult)?;
    Ok(RawPlace {
        city: first_str(address, CITY_KEYS),
        country_code: first_str(address, &["country_code"]),
    })
}

fn parse_search_payload(payload: &Value) -> Result<Option<Coordinates>, ProviderError> {
    let results = payload
        .as_array()
        .ok_or_else(|| ProviderError::Payload("search result is not an array".to_string()))?;
    let Some(first) = results.first() else {
        return Ok(None);
    };
    let number = |key: &str| {
        first
            .get(key)
            .and_then(Value::as_str)
            .and_then(|v| v.parse::<f64>().ok())
    };
    match (number("lat"), number("lon")) {
        (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
        _ => Err(ProviderError::Payload(
            "search result without lat/lon".to_string(),
        )),
    }
}
