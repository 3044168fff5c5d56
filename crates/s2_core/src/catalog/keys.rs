use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::GridCell;

/// Reference band used to enumerate acquisitions in a listing.
pub const REFERENCE_BAND_SUFFIX: &str = "_B02.jp2";

/// Product-level metadata document holding the cloud-cover assessment.
pub const METADATA_FILE_NAME: &str = "MTD_MSIL1C.xml";

/// Number of path segments between a band file and its product directory
/// (`<product>.SAFE/GRANULE/<granule>/IMG_DATA/<band>.jp2`).
const BAND_DEPTH_BELOW_PRODUCT: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Satellite {
    #[default]
    A,
    B,
}

impl Satellite {
    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            _ => None,
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Visible spectral bands, numbered as in the band file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Blue,
    Green,
    Red,
}

impl Band {
    /// Channel order of the composite.
    pub const RGB: [Band; 3] = [Band::Red, Band::Green, Band::Blue];

    pub fn number(self) -> u8 {
        match self {
            Self::Blue => 2,
            Self::Green => 3,
            Self::Red => 4,
        }
    }
}

/// Listing prefix for all L1C products of one satellite over one cell.
pub fn tile_prefix(cell: &GridCell, satellite: Satellite) -> String {
    format!(
        "tiles/{}/{}/{}/S2{}_MSIL1C",
        cell.zone(),
        cell.band(),
        cell.square(),
        satellite.letter()
    )
}

pub fn is_reference_band(path: &str) -> bool {
    path.ends_with(REFERENCE_BAND_SUFFIX)
}

/// Product directory of a band file, i.e. the path four segments up.
pub fn product_path(band_path: &str) -> Option<String> {
    let segments: Vec<&str> = band_path.split('/').collect();
    if segments.len() <= BAND_DEPTH_BELOW_PRODUCT {
        return None;
    }
    Some(segments[..segments.len() - BAND_DEPTH_BELOW_PRODUCT].join("/"))
}

pub fn metadata_path(band_path: &str) -> Option<String> {
    product_path(band_path).map(|product| format!("{product}/{METADATA_FILE_NAME}"))
}

/// Band file path with the band number left open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BandPathTemplate {
    stem: String,
}

impl BandPathTemplate {
    /// Build from the reference band path; `None` if it is not a reference band.
    pub fn from_reference(band_path: &str) -> Option<Self> {
        band_path
            .strip_suffix(REFERENCE_BAND_SUFFIX)
            .map(|stem| Self {
                stem: stem.to_string(),
            })
    }

    pub fn band_path(&self, band: Band) -> String {
        format!("{}_B{:02}.jp2", self.stem, band.number())
    }

    /// File name stem without the band suffix, e.g. `T32TMT_20200514T103031`.
    pub fn identifier(&self) -> &str {
        self.stem.rsplit('/').next().unwrap_or(&self.stem)
    }
}

impl fmt::Display for BandPathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_B0{{band}}.jp2", self.stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: &str = "tiles/32/T/MT/S2A_MSIL1C_20200514T103031_N0209_R108_T32TMT_20200514T123640.SAFE/GRANULE/L1C_T32TMT_A025491_20200514T103220/IMG_DATA/T32TMT_20200514T103031_B02.jp2";

    #[test]
    fn builds_tile_prefix() {
        let cell: GridCell = "32/T/MT".parse().expect("cell");
        assert_eq!(tile_prefix(&cell, Satellite::A), "tiles/32/T/MT/S2A_MSIL1C");
        let cell: GridCell = "1/C/CV".parse().expect("cell");
        assert_eq!(tile_prefix(&cell, Satellite::B), "tiles/1/C/CV/S2B_MSIL1C");
    }

    #[test]
    fn walks_up_to_product_metadata() {
        assert_eq!(
            metadata_path(BAND).as_deref(),
            Some("tiles/32/T/MT/S2A_MSIL1C_20200514T103031_N0209_R108_T32TMT_20200514T123640.SAFE/MTD_MSIL1C.xml")
        );
        assert_eq!(metadata_path("a/b/c/d"), None);
    }

    #[test]
    fn template_substitutes_band_numbers() {
        let template = BandPathTemplate::from_reference(BAND).expect("reference band");
        assert!(template.band_path(Band::Red).ends_with("T32TMT_20200514T103031_B04.jp2"));
        assert!(template.band_path(Band::Green).ends_with("T32TMT_20200514T103031_B03.jp2"));
        assert_eq!(template.band_path(Band::Blue), BAND);
        assert_eq!(template.identifier(), "T32TMT_20200514T103031");
    }

    #[test]
    fn non_reference_band_has_no_template() {
        assert!(BandPathTemplate::from_reference("x/y_B03.jp2").is_none());
        assert!(!is_reference_band("x/y_B8A.jp2"));
    }

    #[test]
    fn satellite_letters_round_trip() {
        assert_eq!(Satellite::from_letter('b'), Some(Satellite::B));
        assert_eq!(Satellite::from_letter('C'), None);
        assert_eq!(Satellite::A.to_string(), "A");
    }
}
