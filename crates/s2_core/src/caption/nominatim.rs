use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Url;
use tracing::debug;

use super::geocoder::{parse_reverse_response, GeocodeError, Geocoder, ReverseResponse};
use crate::catalog::Coordinate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// English names keep captions mostly single-byte
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.8";

/// Blocking client for the Nominatim `/reverse` endpoint at country/state zoom.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    /// Create a client for the given endpoint (e.g. `https://nominatim.openstreetmap.org`).
    pub fn new(endpoint: &str, user_agent: &str) -> Result<Self, GeocodeError> {
        Self::with_timeout(endpoint, user_agent, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .map_err(|err| GeocodeError::Http(format!("failed to build geocoder client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn reverse_url(&self, coordinate: Coordinate) -> Result<Url, GeocodeError> {
        let mut url = Url::parse(&format!("{}/reverse", self.endpoint))
            .map_err(|err| GeocodeError::Http(format!("failed to build geocoder URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("lat", &format!("{:.6}", coordinate.lat))
            .append_pair("lon", &format!("{:.6}", coordinate.lng))
            .append_pair("addressdetails", "0")
            .append_pair("format", "json")
            .append_pair("zoom", "6")
            .append_pair("extratags", "0");
        Ok(url)
    }
}

impl Geocoder for NominatimGeocoder {
    fn reverse_geocode(&self, coordinate: Coordinate) -> Result<String, GeocodeError> {
        let url = self.reverse_url(coordinate)?;
        debug!(%url, "reverse geocoding");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        let parsed: ReverseResponse = response
            .json()
            .map_err(|err| GeocodeError::Decode(err.to_string()))?;
        parse_reverse_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::DEFAULT_NOMINATIM_ENDPOINT;

    #[test]
    fn reverse_url_carries_query() {
        let geocoder =
            NominatimGeocoder::new("https://nominatim.example/", "s2-test").expect("client");
        let url = geocoder
            .reverse_url(Coordinate::new(52.3, -4.9))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://nominatim.example/reverse?lat=52.300000&lon=-4.900000&addressdetails=0&format=json&zoom=6&extratags=0"
        );
    }

    #[test]
    #[ignore = "requires network access to nominatim.openstreetmap.org"]
    fn geocodes_amsterdam() {
        let geocoder =
            NominatimGeocoder::new(DEFAULT_NOMINATIM_ENDPOINT, "s2-bot-live-test").expect("client");
        let name = geocoder
            .reverse_geocode(Coordinate::new(52.37, 4.89))
            .expect("name");
        assert!(name.contains("Netherlands") || name.contains("Nederland"));
    }
}
