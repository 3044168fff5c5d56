//! The publish loop.
//!
//! One attempt walks the phases
//! `Sampling -> Compositing -> Gating -> Captioning -> Throttling -> Publishing -> Cleanup`.
//! A failure in any phase abandons the attempt and, after `attempt_delay`,
//! starts over at `Sampling` with the next seed. The loop ends after one
//! successful publish unless `loop_forever` is set; a pinned cell always runs
//! a single attempt.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::caption::{CaptionBuilder, Geocoder};
use crate::catalog::keys::Satellite;
use crate::catalog::CatalogClient;
use crate::clock::Clock;
use crate::composite::ImageCompositor;
use crate::grid::{GridCell, GridSampler, SamplerState};
use crate::output::{write_artifacts, Artifacts};
use crate::publish::{Post, Publisher};
use crate::quality::QualityGate;
use crate::retry::CancelToken;
use crate::selection::{AcquisitionSelector, SelectError};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_ATTEMPT_DELAY: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub satellite: Satellite,
    pub skip: usize,
    /// Minimum time between two posts.
    pub period: Duration,
    pub attempt_delay: Duration,
    /// Bound on consecutive failed attempts.
    pub max_attempts: Option<u32>,
    pub loop_forever: bool,
    pub clean_up: bool,
    pub output_dir: PathBuf,
    pub refresh_listing_each_iteration: bool,
    pub pinned_cell: Option<GridCell>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            satellite: Satellite::A,
            skip: 0,
            period: DEFAULT_PERIOD,
            attempt_delay: DEFAULT_ATTEMPT_DELAY,
            max_attempts: None,
            loop_forever: false,
            clean_up: false,
            output_dir: PathBuf::from("/tmp"),
            refresh_listing_each_iteration: false,
            pinned_cell: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sampling,
    Compositing,
    Gating,
    Captioning,
    Throttling,
    Publishing,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// External services the loop talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub catalog: &'a dyn CatalogClient,
    pub geocoder: &'a dyn Geocoder,
    pub publisher: &'a dyn Publisher,
    pub clock: &'a dyn Clock,
}

/// Processing stages owned by the loop.
pub struct Pipeline {
    pub selector: AcquisitionSelector,
    pub compositor: ImageCompositor,
    pub gate: QualityGate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub published: u32,
    pub attempts: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("pinned cell {cell} yielded nothing publishable: {reason}")]
    PinnedCellUnavailable { cell: GridCell, reason: String },
    #[error("gave up after {attempts} consecutive failed attempts")]
    AttemptsExhausted { attempts: u32 },
    #[error("scheduler cancelled")]
    Cancelled,
}

/// Why an attempt was abandoned.
#[derive(Debug)]
struct AttemptFailure {
    phase: Phase,
    reason: String,
}

impl AttemptFailure {
    fn new(phase: Phase, reason: impl fmt::Display) -> Self {
        Self {
            phase,
            reason: reason.to_string(),
        }
    }
}

enum AttemptError {
    Failed(AttemptFailure),
    Cancelled,
}

impl From<AttemptFailure> for AttemptError {
    fn from(failure: AttemptFailure) -> Self {
        AttemptError::Failed(failure)
    }
}

pub struct PublishScheduler<'a> {
    settings: SchedulerSettings,
    sampler: GridSampler,
    state: SamplerState,
    pipeline: Pipeline,
    services: Collaborators<'a>,
    cancel: CancelToken,
    last_publish: Option<Instant>,
}

impl<'a> PublishScheduler<'a> {
    pub fn new(
        settings: SchedulerSettings,
        sampler: GridSampler,
        state: SamplerState,
        pipeline: Pipeline,
        services: Collaborators<'a>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            settings,
            sampler,
            state,
            pipeline,
            services,
            cancel,
            last_publish: None,
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn sampler_state(&self) -> SamplerState {
        self.state
    }

    pub fn selector(&self) -> &AcquisitionSelector {
        &self.pipeline.selector
    }

    pub fn run(&mut self) -> Result<RunSummary, SchedulerError> {
        let single_shot = self.settings.pinned_cell.is_some() || !self.settings.loop_forever;
        let mut summary = RunSummary::default();
        let mut consecutive_failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            let outcome = self.attempt();
            summary.attempts = self.state.attempts();

            match outcome {
                Ok(()) => {
                    summary.published += 1;
                    consecutive_failures = 0;
                    if single_shot {
                        info!(
                            published = summary.published,
                            attempts = summary.attempts,
                            "done"
                        );
                        return Ok(summary);
                    }
                }
                Err(AttemptError::Cancelled) => return Err(SchedulerError::Cancelled),
                Err(AttemptError::Failed(failure)) => {
                    info!(
                        phase = %failure.phase,
                        reason = %failure.reason,
                        attempt = summary.attempts,
                        "attempt abandoned"
                    );
                    if let Some(cell) = self.settings.pinned_cell {
                        return Err(SchedulerError::PinnedCellUnavailable {
                            cell,
                            reason: failure.reason,
                        });
                    }
                    consecutive_failures += 1;
                    if self
                        .settings
                        .max_attempts
                        .is_some_and(|max| consecutive_failures >= max)
                    {
                        return Err(SchedulerError::AttemptsExhausted {
                            attempts: consecutive_failures,
                        });
                    }
                    if !self
                        .services
                        .clock
                        .sleep_cancellable(self.settings.attempt_delay, &self.cancel)
                    {
                        return Err(SchedulerError::Cancelled);
                    }
                }
            }
        }
    }

    fn attempt(&mut self) -> Result<(), AttemptError> {
        let services = self.services;

        // Sampling
        let seed = self.state.advance();
        let cell = self
            .settings
            .pinned_cell
            .unwrap_or_else(|| self.sampler.sample(seed));
        info!(%cell, seed, attempt = self.state.attempts(), "trying grid cell");
        let acquisition = match self.pipeline.selector.select(
            services.catalog,
            services.clock,
            cell,
            self.settings.satellite,
            self.settings.skip,
        ) {
            Ok(Some(acquisition)) => acquisition,
            Ok(None) => {
                let reason = "no acquisition below cloud threshold";
                return Err(AttemptFailure::new(Phase::Sampling, reason).into());
            }
            Err(SelectError::Cancelled) => return Err(AttemptError::Cancelled),
            Err(err) => return Err(AttemptFailure::new(Phase::Sampling, err).into()),
        };
        info!(%cell, identifier = acquisition.identifier(), "picked acquisition");

        // Compositing
        let composite = self
            .pipeline
            .compositor
            .composite(services.catalog, &acquisition)
            .map_err(|err| AttemptFailure::new(Phase::Compositing, err))?;

        // Gating
        let verdict = self.pipeline.gate.evaluate(&composite.pixels);
        if !verdict.is_accepted() {
            return Err(AttemptFailure::new(Phase::Gating, format!("{verdict:?}")).into());
        }

        // Captioning
        let caption =
            CaptionBuilder::new(services.geocoder).build(composite.center, composite.acquired);
        info!(caption = %caption, "post text");

        // Throttling
        if let Some(last) = self.last_publish {
            let elapsed = services.clock.now().saturating_duration_since(last);
            if let Some(remaining) = self.settings.period.checked_sub(elapsed) {
                if !remaining.is_zero() {
                    info!(
                        remaining_secs = remaining.as_secs(),
                        "sleeping before posting"
                    );
                    if !services.clock.sleep_cancellable(remaining, &self.cancel) {
                        return Err(AttemptError::Cancelled);
                    }
                }
            }
        }

        // Publishing
        let artifacts = write_artifacts(&composite, &self.settings.output_dir)
            .map_err(|err| AttemptFailure::new(Phase::Publishing, err))?;
        let post = Post {
            text: caption.text(),
            media_path: artifacts.small.clone(),
            coordinate: composite.center,
            display_coordinates: true,
        };
        if let Err(err) = services.publisher.post(&post) {
            self.clean_up(&artifacts);
            return Err(AttemptFailure::new(Phase::Publishing, err).into());
        }
        self.last_publish = Some(services.clock.now());

        // Cleanup
        self.clean_up(&artifacts);
        if self.settings.refresh_listing_each_iteration {
            self.pipeline.selector.clear_cache();
        }
        Ok(())
    }

    fn clean_up(&self, artifacts: &Artifacts) {
        if !self.settings.clean_up {
            return;
        }
        if let Err(err) = artifacts.remove() {
            warn!(phase = %Phase::Cleanup, error = %err, "failed to remove images");
        }
    }
}
