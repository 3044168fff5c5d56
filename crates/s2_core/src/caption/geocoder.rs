use serde::Deserialize;
use thiserror::Error;

use crate::catalog::Coordinate;

/// Reverse geocoding service turning a coordinate into a place name.
pub trait Geocoder {
    fn reverse_geocode(&self, coordinate: Coordinate) -> Result<String, GeocodeError>;
}

impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    fn reverse_geocode(&self, coordinate: Coordinate) -> Result<String, GeocodeError> {
        (**self).reverse_geocode(coordinate)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Http(String),
    #[error("geocoder response could not be decoded: {0}")]
    Decode(String),
    /// The service answered but could not place the coordinate.
    #[error("geocoder reported: {0}")]
    Service(String),
    #[error("geocoder response has no display name")]
    MissingName,
}

/// Body of a Nominatim `/reverse` answer; only the fields we read.
#[derive(Debug, Default, Deserialize)]
#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) struct ReverseResponse {
    pub(crate) display_name: Option<String>,
    pub(crate) error: Option<serde_json::Value>,
}

#[cfg_attr(not(feature = "http"), allow(dead_code))]
pub(crate) fn parse_reverse_response(resp: ReverseResponse) -> Result<String, GeocodeError> {
    if let Some(error) = resp.error {
        let message = match error {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        };
        return Err(GeocodeError::Service(message));
    }
    resp.display_name
        .filter(|name| !name.trim().is_empty())
        .ok_or(GeocodeError::MissingName)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<String, GeocodeError> {
        let resp: ReverseResponse = serde_json::from_str(body).expect("json");
        parse_reverse_response(resp)
    }

    #[test]
    fn display_name_is_returned() {
        assert_eq!(
            parse(r#"{"place_id":1,"display_name":"Noord-Holland, Nederland","lat":"52.3"}"#),
            Ok("Noord-Holland, Nederland".to_string())
        );
    }

    #[test]
    fn error_field_maps_to_service_error() {
        assert_eq!(
            parse(r#"{"error":"Unable to geocode"}"#),
            Err(GeocodeError::Service("Unable to geocode".to_string()))
        );
        assert!(matches!(
            parse(r#"{"error":{"code":400,"message":"bad"}}"#),
            Err(GeocodeError::Service(_))
        ));
    }

    #[test]
    fn blank_name_is_missing() {
        assert_eq!(parse(r#"{"display_name":"  "}"#), Err(GeocodeError::MissingName));
        assert_eq!(parse("{}"), Err(GeocodeError::MissingName));
    }
}
