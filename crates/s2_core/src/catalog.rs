//! Object-store catalog access: the collaborator trait, path conventions,
//! the listing cache and the concrete Google Cloud Storage client.
//!
//! Implementations:
//!
//! - **`GcsCatalog`** (feature `http`): public Sentinel-2 bucket over the GCS JSON API.
//! - **`InMemoryCatalog`** (feature `test-helpers`): fixed listing and documents for tests.

use ndarray::Array2;
use thiserror::Error;

pub mod cache;
pub mod keys;

#[cfg(feature = "http")]
pub mod gcs;

#[cfg(feature = "raster")]
pub mod raster;

pub use cache::{ListingCache, ListingKey};

pub const DEFAULT_BUCKET: &str = "gcp-public-data-sentinel-2";
pub const DEFAULT_API_BASE: &str = "https://storage.googleapis.com/storage/v1";
pub const DEFAULT_OBJECT_BASE: &str = "https://storage.googleapis.com";

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Square pixel window placed relative to the raster centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub size_px: usize,
    pub offset_x: i64,
    pub offset_y: i64,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            size_px: 2196,
            offset_x: 0,
            offset_y: 0,
        }
    }
}

/// Resolved window in raster pixel space: `(x_off, y_off, width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl WindowSpec {
    /// Place the window on a `width` x `height` raster, clamped to its bounds.
    pub fn resolve(&self, width: usize, height: usize) -> PixelWindow {
        let w = self.size_px.min(width);
        let h = self.size_px.min(height);
        let place = |extent: usize, size: usize, offset: i64| -> usize {
            let centre = ((extent / 2) as i64).saturating_add(offset);
            let start = centre.saturating_sub((size / 2) as i64);
            start.clamp(0, (extent - size) as i64) as usize
        };
        PixelWindow {
            x: place(width, w, self.offset_x),
            y: place(height, h, self.offset_y),
            width: w,
            height: h,
        }
    }
}

/// One band window plus the geolocation of its source raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWindow {
    pub pixels: Array2<u16>,
    pub center: Coordinate,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("unexpected catalog response: {0}")]
    Decode(String),
    #[error("raster error for {path}: {message}")]
    Raster { path: String, message: String },
    #[error("scratch storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not available in this build")]
    Unsupported(&'static str),
}

/// Remote object store holding the tile catalog.
pub trait CatalogClient {
    /// All object paths under `prefix`, in lexicographic order.
    fn list(&self, prefix: &str) -> Result<Vec<String>, CatalogError>;

    /// Raw bytes of a (small) object such as a metadata document.
    fn fetch(&self, path: &str) -> Result<Vec<u8>, CatalogError>;

    /// Read a pixel window out of a single-band raster object.
    fn fetch_raster_window(
        &self,
        path: &str,
        window: &WindowSpec,
    ) -> Result<RasterWindow, CatalogError>;
}

impl<C: CatalogClient + ?Sized> CatalogClient for Box<C> {
    fn list(&self, prefix: &str) -> Result<Vec<String>, CatalogError> {
        (**self).list(prefix)
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, CatalogError> {
        (**self).fetch(path)
    }

    fn fetch_raster_window(
        &self,
        path: &str,
        window: &WindowSpec,
    ) -> Result<RasterWindow, CatalogError> {
        (**self).fetch_raster_window(path, window)
    }
}
