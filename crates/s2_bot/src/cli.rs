use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use s2_core::catalog::keys::Satellite;
use s2_core::config::BotConfig;
use s2_core::grid::GridCell;

#[derive(Debug, Parser)]
#[command(
    name = "s2-bot",
    version,
    about = "Publish true-colour Sentinel-2 tiles to a social feed"
)]
pub struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long, env = "S2_BOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed for grid cell sampling (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Actually publish (requires PUBLISH_ENDPOINT and PUBLISH_TOKEN)
    #[arg(long)]
    pub post: bool,

    /// Keep publishing, one post per period
    #[arg(long = "loop")]
    pub loop_forever: bool,

    /// Directory for the generated JPEG files
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Minimum seconds between two posts
    #[arg(long)]
    pub period: Option<u64>,

    /// Number of newer clear acquisitions to skip
    #[arg(long)]
    pub skip: Option<usize>,

    /// Use this grid cell (e.g. 32/T/MT) instead of sampling; implies a single run
    #[arg(long)]
    pub mgrs: Option<GridCell>,

    /// Remove generated files after publishing
    #[arg(long)]
    pub clean_up: bool,

    #[arg(long, value_enum)]
    pub satellite: Option<SatelliteArg>,

    /// File of whitelisted grid cells, one compact code per line
    #[arg(long)]
    pub whitelist: Option<PathBuf>,

    /// Give up after this many consecutive failed attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SatelliteArg {
    A,
    B,
}

impl From<SatelliteArg> for Satellite {
    fn from(arg: SatelliteArg) -> Self {
        match arg {
            SatelliteArg::A => Satellite::A,
            SatelliteArg::B => Satellite::B,
        }
    }
}

impl Cli {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply(&self, config: &mut BotConfig) {
        let schedule = &mut config.schedule;
        if let Some(path) = &self.whitelist {
            schedule.whitelist_path = path.clone();
        }
        if let Some(dir) = &self.output {
            schedule.output_dir = dir.clone();
        }
        if let Some(period) = self.period {
            schedule.period_secs = period;
        }
        if let Some(skip) = self.skip {
            schedule.skip = skip;
        }
        if let Some(satellite) = self.satellite {
            schedule.satellite = satellite.into();
        }
        if self.max_attempts.is_some() {
            schedule.max_attempts = self.max_attempts;
        }
        schedule.loop_forever |= self.loop_forever;
        schedule.clean_up |= self.clean_up;
        if self.mgrs.is_some() {
            schedule.loop_forever = false;
        }
    }
}
