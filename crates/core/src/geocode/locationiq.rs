use super::nominatim::parse_address_payload;
use super::{get_json, GeocodeProvider, ProviderError, RawPlace};
use crate::metadata::Coordinates;
use reqwest::blocking::Client;

const REVERSE_URL: &str = "https://us1.locationiq.com/v1/reverse.php";

/// LocationIQ reverse lookup; only part of the chain when a key is configured.
pub struct LocationIq {
    client: Client,
    api_key: String,
}

impl LocationIq {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }
}

impl GeocodeProvider for LocationIq {
    fn name(&self) -> &str {
        "LocationIQ"
    }

    fn reverse(&self, coords: Coordinates) -> Result<RawPlace, ProviderError> {
        let payload = get_json(
            &self.client,
            REVERSE_URL,
            &[
                ("key", self.api_key.clone()),
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("format", "json".to_string()),
            ],
        )?;
        parse_address_payload(&payload)
    }
}
