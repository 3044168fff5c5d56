#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use s2_core::catalog::keys::Satellite;
use s2_core::catalog::Coordinate;
use s2_core::composite::ImageCompositor;
use s2_core::grid::{GridCell, GridSampler, SamplerState, Whitelist};
use s2_core::quality::QualityGate;
use s2_core::retry::{CancelToken, RetryPolicy};
use s2_core::scheduler::{Collaborators, Pipeline, PublishScheduler, SchedulerSettings};
use s2_core::selection::{AcquisitionSelector, SelectorConfig};
use s2_core::test_helpers::{
    noise_scene, AcquisitionPaths, FakeGeocoder, InMemoryCatalog, ManualClock, RecordingPublisher,
};
use tempfile::TempDir;

/// Edge length of synthetic scenes; small enough to keep tests fast.
pub const SCENE_SIZE: usize = 64;

pub fn cell(text: &str) -> GridCell {
    text.parse().expect("valid grid cell")
}

pub fn whitelist(cells: &[&str]) -> Arc<Whitelist> {
    Arc::new(Whitelist::from_cells(cells.iter().map(|c| cell(c)).collect()).expect("whitelist"))
}

/// Selector config with a bounded listing retry so failures cannot spin forever.
pub fn selector_config() -> SelectorConfig {
    SelectorConfig {
        listing_retry: RetryPolicy::bounded(Duration::from_secs(5), 3),
        ..SelectorConfig::default()
    }
}

/// Catalog entry with a textured scene centred on Amsterdam.
pub fn add_clear_scene(
    catalog: &mut InMemoryCatalog,
    cell: GridCell,
    timestamp: &str,
    seed: u64,
) -> AcquisitionPaths {
    let paths = catalog.add_acquisition(cell, Satellite::A, timestamp, 12.5);
    catalog.add_scene(&paths, noise_scene(SCENE_SIZE, seed), Coordinate::new(52.3, 4.9));
    paths
}

/// Fakes plus an output directory for end-to-end scheduler runs.
pub struct Harness {
    pub catalog: InMemoryCatalog,
    pub geocoder: FakeGeocoder,
    pub publisher: RecordingPublisher,
    pub clock: ManualClock,
    pub cancel: CancelToken,
    pub output: TempDir,
}

impl Harness {
    pub fn new(catalog: InMemoryCatalog) -> Self {
        Self {
            catalog,
            geocoder: FakeGeocoder::named("Noord-Holland, Nederland"),
            publisher: RecordingPublisher::new(),
            clock: ManualClock::new(),
            cancel: CancelToken::new(),
            output: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            output_dir: self.output.path().to_path_buf(),
            ..SchedulerSettings::default()
        }
    }

    pub fn scheduler(
        &self,
        settings: SchedulerSettings,
        whitelist: Arc<Whitelist>,
        seed: u64,
    ) -> PublishScheduler<'_> {
        let pipeline = Pipeline {
            selector: AcquisitionSelector::new(selector_config(), self.cancel.clone()),
            compositor: ImageCompositor::default(),
            gate: QualityGate::default(),
        };
        let services = Collaborators {
            catalog: &self.catalog,
            geocoder: &self.geocoder,
            publisher: &self.publisher,
            clock: &self.clock,
        };
        PublishScheduler::new(
            settings,
            GridSampler::new(whitelist),
            SamplerState::new(seed),
            pipeline,
            services,
            self.cancel.clone(),
        )
    }
}
