use super::{first_str, get_json, GeocodeProvider, ProviderError, RawPlace};
use crate::metadata::Coordinates;
use reqwest::blocking::Client;
use serde_json::Value;

const REVERSE_URL: &str = "https://api.bigdatacloud.net/data/reverse-geocode-client";

pub struct BigDataCloud {
    client: Client,
}

impl BigDataCloud {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl GeocodeProvider for BigDataCloud {
    fn name(&self) -> &str {
        "BigDataCloud"
    }

    fn reverse(&self, coords: Coordinates) -> Result<RawPlace, ProviderError> {
        let payload = get_json(
            &self.client,
            REVERSE_URL,
            &[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("localityLanguage", "en".to_string()),
            ],
        )?;
        parse_payload(&payload)
    }
}

fn parse_payload(payload: &Value) -> Result<RawPlace, ProviderError> {
    if !payload.is_object() {
        return Err(ProviderError::Payload("expected a JSON object".to_string()));
    }
    let place = RawPlace {
        city: first_str(payload, &["city", "locality", "principalSubdivision"]),
        country_code: first_str(payload, &["countryCode"]),
    };
    if place == RawPlace::default() {
        return Err(ProviderError::NoResult);
    }
    Ok(place)
}
