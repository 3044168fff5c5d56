//! Post text: place name, rounded coordinates and acquisition date.
//!
//! The rendered caption must fit the feed's 140-byte limit measured on the
//! NFC-normalised UTF-8 text, so the place name is shortened from its most
//! specific (leading) components first.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::catalog::Coordinate;

pub mod geocoder;
#[cfg(feature = "http")]
pub mod nominatim;

pub use geocoder::{GeocodeError, Geocoder};
#[cfg(feature = "http")]
pub use nominatim::NominatimGeocoder;

pub const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org";

pub const MAX_CAPTION_BYTES: usize = 140;
/// Place names are shortened until they are strictly below this many bytes.
pub const MAX_LOCATION_BYTES: usize = 72;
pub const UNKNOWN_LOCATION: &str = "Unknown location, do you recognise it?";

// index 0 unused so chrono's 1-based month indexes directly
const MONTHS: [&str; 13] = [
    "", "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub location: String,
    pub lat_lng: String,
    pub date: String,
}

impl Caption {
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}), {}", self.location, self.lat_lng, self.date)
    }
}

pub struct CaptionBuilder<'a> {
    geocoder: &'a dyn Geocoder,
}

impl<'a> CaptionBuilder<'a> {
    pub fn new(geocoder: &'a dyn Geocoder) -> Self {
        Self { geocoder }
    }

    /// Never fails: an unreachable geocoder degrades to [`UNKNOWN_LOCATION`].
    pub fn build(&self, coordinate: Coordinate, date: NaiveDate) -> Caption {
        let location = match self.geocoder.reverse_geocode(coordinate) {
            Ok(address) => cut_location(&address, MAX_LOCATION_BYTES),
            Err(err) => {
                warn!(error = %err, "reverse geocoding failed, using fallback location");
                UNKNOWN_LOCATION.to_string()
            }
        };
        let mut caption = Caption {
            location,
            lat_lng: format_lat_lng(coordinate),
            date: format_date(date),
        };

        let overflow = normalized_len(&caption.to_string()).saturating_sub(MAX_CAPTION_BYTES);
        if overflow > 0 {
            let budget = normalized_len(&caption.location).saturating_sub(overflow);
            caption.location = cut_location(&caption.location, budget + 1);
        }
        info!(caption = %caption, "caption ready");
        caption
    }
}

/// UTF-8 byte length after NFC normalisation.
pub fn normalized_len(text: &str) -> usize {
    text.nfc().map(char::len_utf8).sum()
}

/// NFC-normalise and drop leading comma-separated components until the text is
/// shorter than `max_bytes`. A single oversized component is cut at a char
/// boundary.
pub fn cut_location(address: &str, max_bytes: usize) -> String {
    let mut text: String = address.nfc().collect();
    while text.len() >= max_bytes {
        match text.split_once(',') {
            Some((_, rest)) => {
                text = rest
                    .split(',')
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join(", ");
            }
            None => {
                let mut end = max_bytes.saturating_sub(1).min(text.len());
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
                let trimmed = text.trim_end().len();
                text.truncate(trimmed);
                break;
            }
        }
    }
    text
}

/// `52.3°N 4.9°E`; negative latitude is south, negative longitude west.
pub fn format_lat_lng(coordinate: Coordinate) -> String {
    let ns = if coordinate.lat < 0.0 { 'S' } else { 'N' };
    let ew = if coordinate.lng < 0.0 { 'W' } else { 'E' };
    format!(
        "{:.1}°{ns} {:.1}°{ew}",
        coordinate.lat.abs(),
        coordinate.lng.abs()
    )
}

pub fn format_date(date: NaiveDate) -> String {
    format!(
        "{:02} {} {}",
        date.day(),
        MONTHS[date.month() as usize],
        date.year()
    )
}

/// Find the `YYYYMMDDThhmmss` segment of a product identifier.
///
/// Works for current names (`T32TMT_20200514T103031`) and for the legacy
/// `S2A_OPER_MSI_L1C_TL_SGS__20160212T152327_A003383_T32TMT` form.
pub fn parse_acquisition_date(identifier: &str) -> Option<NaiveDate> {
    identifier
        .split('_')
        .filter(|segment| segment.len() >= 9 && segment.as_bytes()[8] == b'T')
        .filter(|segment| segment.as_bytes()[..8].iter().all(u8::is_ascii_digit))
        .find_map(|segment| NaiveDate::parse_from_str(&segment[..8], "%Y%m%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedName(Result<String, GeocodeError>);

    impl Geocoder for FixedName {
        fn reverse_geocode(&self, _coordinate: Coordinate) -> Result<String, GeocodeError> {
            self.0.clone()
        }
    }

    fn may_14() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 5, 14).expect("date")
    }

    #[test]
    fn formats_hemispheres() {
        assert_eq!(format_lat_lng(Coordinate::new(52.34, 4.91)), "52.3°N 4.9°E");
        assert_eq!(
            format_lat_lng(Coordinate::new(-33.86, -151.21)),
            "33.9°S 151.2°W"
        );
    }

    #[test]
    fn parses_current_and_legacy_identifiers() {
        assert_eq!(parse_acquisition_date("T32TMT_20200514T103031"), Some(may_14()));
        assert_eq!(
            parse_acquisition_date("S2A_OPER_MSI_L1C_TL_SGS__20160212T152327_A003383_T32TMT"),
            NaiveDate::from_ymd_opt(2016, 2, 12)
        );
        assert_eq!(parse_acquisition_date("T32TMT_2020"), None);
        assert_eq!(parse_acquisition_date("T32TMT_20201314T103031"), None);
    }

    #[test]
    fn date_uses_month_abbreviation() {
        assert_eq!(format_date(may_14()), "14 May 2020");
        assert_eq!(
            format_date(NaiveDate::from_ymd_opt(2019, 1, 3).expect("date")),
            "03 Jan 2019"
        );
    }

    #[test]
    fn long_addresses_lose_leading_components() {
        let address = "Gemeente Amsterdam, Noord-Holland, Nederland, Europe, Planet Earth, Solar System";
        let cut = cut_location(address, MAX_LOCATION_BYTES);
        assert!(cut.len() < MAX_LOCATION_BYTES);
        assert_eq!(cut, "Noord-Holland, Nederland, Europe, Planet Earth, Solar System");
        assert_eq!(cut_location("Nederland", MAX_LOCATION_BYTES), "Nederland");
    }

    #[test]
    fn single_oversized_component_is_truncated_on_char_boundary() {
        let address = "ü".repeat(50);
        let cut = cut_location(&address, MAX_LOCATION_BYTES);
        assert!(cut.len() < MAX_LOCATION_BYTES);
        assert_eq!(cut, "ü".repeat(35));
    }

    #[test]
    fn decomposed_input_is_normalized() {
        let decomposed = "Zu\u{0308}rich";
        assert_eq!(cut_location(decomposed, MAX_LOCATION_BYTES), "Zürich");
    }

    #[test]
    fn geocoder_failure_uses_fallback() {
        let geocoder = FixedName(Err(GeocodeError::Service("Unable to geocode".into())));
        let caption = CaptionBuilder::new(&geocoder).build(Coordinate::new(-10.0, 20.0), may_14());
        assert_eq!(
            caption.text(),
            "Unknown location, do you recognise it? (10.0°S 20.0°E), 14 May 2020"
        );
    }

    #[test]
    fn builds_example_caption() {
        let geocoder = FixedName(Ok("Noord-Holland, Nederland".into()));
        let caption = CaptionBuilder::new(&geocoder).build(Coordinate::new(52.3, 4.9), may_14());
        assert_eq!(caption.text(), "Noord-Holland, Nederland (52.3°N 4.9°E), 14 May 2020");
    }
}
