//! Test doubles for the external services and virtual time.
//!
//! Everything here is deterministic and offline: an in-memory catalog laid out
//! like the public bucket, a geocoder with a canned answer, a publisher that
//! records posts and a clock that only moves when something sleeps.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::caption::{GeocodeError, Geocoder};
use crate::catalog::keys::{tile_prefix, Band, Satellite, METADATA_FILE_NAME, REFERENCE_BAND_SUFFIX};
use crate::catalog::{CatalogClient, CatalogError, Coordinate, RasterWindow, WindowSpec};
use crate::clock::Clock;
use crate::grid::GridCell;
use crate::publish::{Post, PublishError, Publisher};
use crate::retry::CancelToken;

/// Virtual clock: `sleep` advances time instantly and records the duration.
pub struct ManualClock {
    start: Instant,
    state: Mutex<ManualClockState>,
}

struct ManualClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
    cancel_at: Option<(CancelToken, Duration)>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            state: Mutex::new(ManualClockState {
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
                cancel_at: None,
            }),
        }
    }

    /// Cancel `token` once the clock has advanced by `after` in total.
    pub fn cancel_after(&self, token: CancelToken, after: Duration) {
        self.state.lock().expect("clock state").cancel_at = Some((token, after));
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect("clock state");
        state.elapsed += duration;
        if let Some((token, after)) = &state.cancel_at {
            if state.elapsed >= *after {
                token.cancel();
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().expect("clock state").elapsed
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().expect("clock state").sleeps.iter().sum()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().expect("clock state").sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.state.lock().expect("clock state").sleeps.push(duration);
        self.advance(duration);
    }
}

/// Paths of one fake acquisition in the bucket layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionPaths {
    pub reference_band: String,
    pub metadata: String,
    pub identifier: String,
}

impl AcquisitionPaths {
    pub fn band(&self, band: Band) -> String {
        let stem = self
            .reference_band
            .strip_suffix(REFERENCE_BAND_SUFFIX)
            .expect("reference band path");
        format!("{stem}_B{:02}.jp2", band.number())
    }
}

/// Object store held in memory, listed in lexicographic order like the real one.
#[derive(Default)]
pub struct InMemoryCatalog {
    objects: BTreeMap<String, Vec<u8>>,
    rasters: HashMap<String, RasterWindow>,
    failing_listings: Cell<usize>,
    list_calls: Cell<usize>,
    fetch_calls: Cell<usize>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&mut self, path: &str, bytes: Vec<u8>) {
        self.objects.insert(path.to_string(), bytes);
    }

    /// Register a band raster; it also shows up in listings.
    pub fn insert_raster(&mut self, path: &str, raster: RasterWindow) {
        self.objects.entry(path.to_string()).or_default();
        self.rasters.insert(path.to_string(), raster);
    }

    /// Add a product whose metadata reports `cloud_cover`. `timestamp` is the
    /// sensing time, e.g. `20200514T103031`.
    pub fn add_acquisition(
        &mut self,
        cell: GridCell,
        satellite: Satellite,
        timestamp: &str,
        cloud_cover: f64,
    ) -> AcquisitionPaths {
        self.add_acquisition_with_metadata(cell, satellite, timestamp, metadata_xml(cloud_cover))
    }

    pub fn add_acquisition_with_metadata(
        &mut self,
        cell: GridCell,
        satellite: Satellite,
        timestamp: &str,
        metadata: Vec<u8>,
    ) -> AcquisitionPaths {
        let tile = format!("T{}", cell.compact());
        let product = format!(
            "{}_{timestamp}_N0209_R108_{tile}_{timestamp}.SAFE",
            tile_prefix(&cell, satellite)
        );
        let identifier = format!("{tile}_{timestamp}");
        let reference_band = format!(
            "{product}/GRANULE/L1C_{tile}_A000001_{timestamp}/IMG_DATA/{identifier}{REFERENCE_BAND_SUFFIX}"
        );
        let metadata_path = format!("{product}/{METADATA_FILE_NAME}");

        self.objects.insert(metadata_path.clone(), metadata);
        self.objects.insert(reference_band.clone(), Vec::new());
        self.objects
            .insert(format!("{product}/manifest.safe"), Vec::new());
        AcquisitionPaths {
            reference_band,
            metadata: metadata_path,
            identifier,
        }
    }

    /// Attach red, green and blue rasters to an acquisition.
    pub fn add_scene(&mut self, paths: &AcquisitionPaths, rgb: [Array2<u16>; 3], center: Coordinate) {
        for (band, pixels) in Band::RGB.into_iter().zip(rgb) {
            self.insert_raster(&paths.band(band), RasterWindow { pixels, center });
        }
    }

    /// Make the next `count` listing calls fail with a transient error.
    pub fn fail_next_listings(&self, count: usize) {
        self.failing_listings.set(count);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }
}

impl CatalogClient for InMemoryCatalog {
    fn list(&self, prefix: &str) -> Result<Vec<String>, CatalogError> {
        self.list_calls.set(self.list_calls.get() + 1);
        let failing = self.failing_listings.get();
        if failing > 0 {
            self.failing_listings.set(failing - 1);
            return Err(CatalogError::Http("503 Service Unavailable".to_string()));
        }
        Ok(self
            .objects
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, CatalogError> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        self.objects
            .get(path)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))
    }

    fn fetch_raster_window(
        &self,
        path: &str,
        window: &WindowSpec,
    ) -> Result<RasterWindow, CatalogError> {
        let raster = self
            .rasters
            .get(path)
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        let (height, width) = raster.pixels.dim();
        let px = window.resolve(width, height);
        Ok(RasterWindow {
            pixels: raster
                .pixels
                .slice(s![px.y..px.y + px.height, px.x..px.x + px.width])
                .to_owned(),
            center: raster.center,
        })
    }
}

/// Geocoder with a fixed answer that counts its calls.
pub struct FakeGeocoder {
    answer: Result<String, GeocodeError>,
    calls: Cell<usize>,
}

impl FakeGeocoder {
    pub fn named(name: &str) -> Self {
        Self {
            answer: Ok(name.to_string()),
            calls: Cell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Err(GeocodeError::Service("Unable to geocode".to_string())),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Geocoder for FakeGeocoder {
    fn reverse_geocode(&self, _coordinate: Coordinate) -> Result<String, GeocodeError> {
        self.calls.set(self.calls.get() + 1);
        self.answer.clone()
    }
}

/// Publisher that keeps every post; can be told to fail a number of times first.
#[derive(Default)]
pub struct RecordingPublisher {
    posts: RefCell<Vec<Post>>,
    failures: Cell<usize>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures.set(count);
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.borrow().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn post(&self, post: &Post) -> Result<(), PublishError> {
        post.validate()?;
        let failures = self.failures.get();
        if failures > 0 {
            self.failures.set(failures - 1);
            return Err(PublishError::Rejected {
                status: 503,
                body: "try again later".to_string(),
            });
        }
        self.posts.borrow_mut().push(post.clone());
        Ok(())
    }
}

/// Product metadata document reporting `cloud_cover` percent.
pub fn metadata_xml(cloud_cover: f64) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-1C_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/User_Product_Level-1C.xsd">
  <n1:Quality_Indicators_Info metadataLevel="Standard">
    <Cloud_Coverage_Assessment>{cloud_cover}</Cloud_Coverage_Assessment>
  </n1:Quality_Indicators_Info>
</n1:Level-1C_User_Product>"#
    )
    .into_bytes()
}

/// Uniform reflectance noise in `[500, 5000)`, a stand-in for a textured scene.
pub fn noise_band(size: usize, seed: u64) -> Array2<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((size, size), || rng.gen_range(500..5000))
}

pub fn constant_band(size: usize, value: u16) -> Array2<u16> {
    Array2::from_elem((size, size), value)
}

/// Three independent noise bands (red, green, blue).
pub fn noise_scene(size: usize, seed: u64) -> [Array2<u16>; 3] {
    [
        noise_band(size, seed),
        noise_band(size, seed.wrapping_add(1)),
        noise_band(size, seed.wrapping_add(2)),
    ]
}

/// Zero the top `fraction` of rows in every band, like a partial acquisition.
pub fn blacken_rows(scene: &mut [Array2<u16>; 3], fraction: f64) {
    for band in scene.iter_mut() {
        let rows = (band.nrows() as f64 * fraction).round() as usize;
        band.slice_mut(s![..rows, ..]).fill(0);
    }
}
