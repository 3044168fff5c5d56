//! Grid cells and deterministic sampling from the whitelist of valid cells.
//!
//! Only a small fraction of the zone/band/square cartesian product denotes a
//! real Sentinel-2 tile, so cells are always drawn from a whitelist loaded
//! once at startup rather than synthesized from raw ranges.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Latitude band letters used by the grid (I and O are skipped).
const BAND_LETTERS: &str = "CDEFGHJKLMNPQRSTUVWX";

/// One cell of the imagery provider's grid, e.g. `32/T/MT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GridCell {
    zone: u8,
    band: char,
    square: [char; 2],
}

impl GridCell {
    /// Build a cell after checking the zone range and letter alphabets.
    pub fn new(zone: u8, band: char, square: [char; 2]) -> Result<Self, GridCellError> {
        if !(1..=60).contains(&zone) {
            return Err(GridCellError::Zone(zone));
        }
        let band = band.to_ascii_uppercase();
        if !BAND_LETTERS.contains(band) {
            return Err(GridCellError::Band(band));
        }
        let square = [square[0].to_ascii_uppercase(), square[1].to_ascii_uppercase()];
        if square.iter().any(|c| !c.is_ascii_uppercase()) {
            return Err(GridCellError::Square(square.iter().collect()));
        }
        Ok(Self { zone, band, square })
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn band(&self) -> char {
        self.band
    }

    pub fn square(&self) -> String {
        self.square.iter().collect()
    }

    /// Fixed-width whitelist form, e.g. `32TMT`.
    pub fn compact(&self) -> String {
        format!("{:02}{}{}", self.zone, self.band, self.square())
    }

    /// Parse one fixed-width whitelist record (`ZZBSS`).
    pub fn from_compact(record: &str) -> Result<Self, GridCellError> {
        let chars: Vec<char> = record.chars().take(5).collect();
        if chars.len() < 5 {
            return Err(GridCellError::Format(record.to_string()));
        }
        let zone_text: String = chars[..2].iter().collect();
        let zone = zone_text
            .parse::<u8>()
            .map_err(|_| GridCellError::Format(record.to_string()))?;
        Self::new(zone, chars[2], [chars[3], chars[4]])
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zone, self.band, self.square())
    }
}

/// Parses the pinned-cell form `zone/band/square`, e.g. `32/T/MT`.
impl FromStr for GridCell {
    type Err = GridCellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let [zone, band, square] = parts.as_slice() else {
            return Err(GridCellError::Format(s.to_string()));
        };
        let zone = zone
            .parse::<u8>()
            .map_err(|_| GridCellError::Format(s.to_string()))?;
        let mut band_chars = band.chars();
        let (Some(band), None) = (band_chars.next(), band_chars.next()) else {
            return Err(GridCellError::Format(s.to_string()));
        };
        let square: Vec<char> = square.chars().collect();
        let [a, b] = square.as_slice() else {
            return Err(GridCellError::Format(s.to_string()));
        };
        Self::new(zone, band, [*a, *b])
    }
}

impl TryFrom<String> for GridCell {
    type Error = GridCellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GridCell> for String {
    fn from(cell: GridCell) -> Self {
        cell.to_string()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridCellError {
    #[error("zone {0} is outside 1..=60")]
    Zone(u8),
    #[error("invalid latitude band letter {0:?}")]
    Band(char),
    #[error("invalid grid square {0:?}")]
    Square(String),
    #[error("malformed grid cell {0:?}")]
    Format(String),
}

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("failed to read whitelist {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("whitelist line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: GridCellError,
    },
    #[error("whitelist contains no grid cells")]
    Empty,
}

/// Read-only set of grid cells that correspond to real tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    cells: Vec<GridCell>,
}

impl Whitelist {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WhitelistError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| WhitelistError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse one `ZZBSS` record per line. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, WhitelistError> {
        let mut cells = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let record = line.trim();
            if record.is_empty() || record.starts_with('#') {
                continue;
            }
            let cell = GridCell::from_compact(record).map_err(|source| WhitelistError::Record {
                line: idx + 1,
                source,
            })?;
            cells.push(cell);
        }
        Self::from_cells(cells)
    }

    pub fn from_cells(cells: Vec<GridCell>) -> Result<Self, WhitelistError> {
        if cells.is_empty() {
            return Err(WhitelistError::Empty);
        }
        Ok(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: &GridCell) -> bool {
        self.cells.contains(cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter()
    }
}

/// Deterministic seed -> cell mapping over a shared whitelist.
#[derive(Debug, Clone)]
pub struct GridSampler {
    whitelist: Arc<Whitelist>,
}

impl GridSampler {
    pub fn new(whitelist: Arc<Whitelist>) -> Self {
        Self { whitelist }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Same seed, same cell. Indexes uniformly into the whitelist.
    pub fn sample(&self, seed: u64) -> GridCell {
        let mut rng = StdRng::seed_from_u64(seed);
        let idx = rng.gen_range(0..self.whitelist.cells.len());
        self.whitelist.cells[idx]
    }
}

/// Evolving seed plus attempt counter. Advances on every attempt, successful or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerState {
    seed: u64,
    attempts: u64,
}

impl SamplerState {
    pub fn new(seed: u64) -> Self {
        Self { seed, attempts: 0 }
    }

    /// Derive the starting seed from a user seed the way a fresh run does:
    /// one draw from an RNG seeded with it.
    pub fn from_user_seed(user_seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(user_seed);
        Self::new(rng.gen())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Move to the next seed and count the attempt. Returns the new seed.
    pub fn advance(&mut self) -> u64 {
        self.seed = self.seed.wrapping_add(1);
        self.attempts += 1;
        self.seed
    }
}
