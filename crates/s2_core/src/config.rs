//! Bot configuration, loadable from JSON.
//!
//! Every field has a default so a config file only needs the values it
//! changes; command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caption::DEFAULT_NOMINATIM_ENDPOINT;
use crate::catalog::keys::Satellite;
use crate::catalog::{WindowSpec, DEFAULT_API_BASE, DEFAULT_BUCKET, DEFAULT_OBJECT_BASE};
use crate::composite::{
    CompositorSettings, DEFAULT_GREEN_GAIN, DEFAULT_LOWER_PERCENTILE, DEFAULT_UPPER_PERCENTILE,
};
use crate::quality::{QualityGate, DEFAULT_MAX_BLACK_FRACTION, DEFAULT_MIN_CONTRAST_RATIO};
use crate::retry::RetryPolicy;
use crate::scheduler::SchedulerSettings;
use crate::selection::{SelectorConfig, DEFAULT_CLOUD_COVER_THRESHOLD};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub schedule: ScheduleConfig,
    pub selection: SelectionConfig,
    pub composite: CompositeConfig,
    pub quality: QualityConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub whitelist_path: PathBuf,
    pub output_dir: PathBuf,
    /// Minimum seconds between two posts.
    pub period_secs: u64,
    /// Pause before sampling again after an attempt found nothing.
    pub attempt_delay_ms: u64,
    pub max_attempts: Option<u32>,
    pub skip: usize,
    pub satellite: Satellite,
    pub loop_forever: bool,
    pub clean_up: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            whitelist_path: PathBuf::from("valid_mgrs"),
            output_dir: PathBuf::from("/tmp"),
            period_secs: 60 * 60,
            attempt_delay_ms: 1_500,
            max_attempts: None,
            skip: 0,
            satellite: Satellite::A,
            loop_forever: false,
            clean_up: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Percent; acquisitions must be strictly below it.
    pub cloud_cover_threshold: f64,
    pub metadata_skip_delay_ms: u64,
    pub retry_delay_secs: u64,
    pub retry_max_attempts: Option<u32>,
    pub cache_capacity: usize,
    /// `None` keeps listings until evicted by capacity.
    pub cache_ttl_secs: Option<u64>,
    pub refresh_listing_each_iteration: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cloud_cover_threshold: DEFAULT_CLOUD_COVER_THRESHOLD,
            metadata_skip_delay_ms: 500,
            retry_delay_secs: 5,
            retry_max_attempts: None,
            cache_capacity: 256,
            cache_ttl_secs: Some(12 * 60 * 60),
            refresh_listing_each_iteration: false,
        }
    }
}

impl SelectionConfig {
    pub fn selector_config(&self) -> SelectorConfig {
        let delay = Duration::from_secs(self.retry_delay_secs);
        SelectorConfig {
            cloud_cover_threshold: self.cloud_cover_threshold,
            metadata_skip_delay: Duration::from_millis(self.metadata_skip_delay_ms),
            listing_retry: match self.retry_max_attempts {
                Some(max) => RetryPolicy::bounded(delay, max),
                None => RetryPolicy {
                    delay,
                    max_attempts: None,
                },
            },
            cache_capacity: self.cache_capacity,
            cache_ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub window_size_px: usize,
    pub window_offset_x: i64,
    pub window_offset_y: i64,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub green_gain: f32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        let window = WindowSpec::default();
        Self {
            window_size_px: window.size_px,
            window_offset_x: window.offset_x,
            window_offset_y: window.offset_y,
            lower_percentile: DEFAULT_LOWER_PERCENTILE,
            upper_percentile: DEFAULT_UPPER_PERCENTILE,
            green_gain: DEFAULT_GREEN_GAIN,
        }
    }
}

impl CompositeConfig {
    pub fn settings(&self) -> CompositorSettings {
        CompositorSettings {
            window: WindowSpec {
                size_px: self.window_size_px,
                offset_x: self.window_offset_x,
                offset_y: self.window_offset_y,
            },
            lower_percentile: self.lower_percentile,
            upper_percentile: self.upper_percentile,
            green_gain: self.green_gain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub max_black_fraction: f64,
    pub min_contrast_ratio: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_black_fraction: DEFAULT_MAX_BLACK_FRACTION,
            min_contrast_ratio: DEFAULT_MIN_CONTRAST_RATIO,
        }
    }
}

impl QualityConfig {
    pub fn gate(&self) -> QualityGate {
        QualityGate::new(self.max_black_fraction, self.min_contrast_ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bucket: String,
    pub catalog_api_base: String,
    pub catalog_object_base: String,
    pub geocoder_endpoint: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            catalog_api_base: DEFAULT_API_BASE.to_string(),
            catalog_object_base: DEFAULT_OBJECT_BASE.to_string(),
            geocoder_endpoint: DEFAULT_NOMINATIM_ENDPOINT.to_string(),
            user_agent: concat!("s2-bot/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl BotConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BotConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid(message));

        let cloud = self.selection.cloud_cover_threshold;
        if !(cloud > 0.0 && cloud <= 100.0) {
            return invalid(format!("cloud_cover_threshold {cloud} must be in (0, 100]"));
        }
        if self.selection.cache_capacity == 0 {
            return invalid("cache_capacity must be positive".to_string());
        }
        if self.selection.retry_max_attempts == Some(0) {
            return invalid("retry_max_attempts must be positive when set".to_string());
        }
        if self.composite.window_size_px == 0 {
            return invalid("window_size_px must be positive".to_string());
        }
        let (lower, upper) = (self.composite.lower_percentile, self.composite.upper_percentile);
        if !(0.0 <= lower && lower < upper && upper <= 100.0) {
            return invalid(format!(
                "percentiles must satisfy 0 <= lower < upper <= 100, got {lower} and {upper}"
            ));
        }
        if !(self.composite.green_gain.is_finite() && self.composite.green_gain > 0.0) {
            return invalid("green_gain must be a positive number".to_string());
        }
        for (name, value) in [
            ("max_black_fraction", self.quality.max_black_fraction),
            ("min_contrast_ratio", self.quality.min_contrast_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} {value} must be in [0, 1]"));
            }
        }
        if self.schedule.max_attempts == Some(0) {
            return invalid("max_attempts must be positive when set".to_string());
        }
        if self.service.user_agent.trim().is_empty() {
            return invalid("user_agent must not be empty".to_string());
        }
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            satellite: self.schedule.satellite,
            skip: self.schedule.skip,
            period: Duration::from_secs(self.schedule.period_secs),
            attempt_delay: Duration::from_millis(self.schedule.attempt_delay_ms),
            max_attempts: self.schedule.max_attempts,
            loop_forever: self.schedule.loop_forever,
            clean_up: self.schedule.clean_up,
            output_dir: self.schedule.output_dir.clone(),
            refresh_listing_each_iteration: self.selection.refresh_listing_each_iteration,
            pinned_cell: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: BotConfig =
            serde_json::from_str(r#"{"selection":{"cloud_cover_threshold":40.0},"schedule":{"satellite":"B"}}"#)
                .expect("config");
        assert_eq!(config.selection.cloud_cover_threshold, 40.0);
        assert_eq!(config.selection.cache_capacity, 256);
        assert_eq!(config.schedule.satellite, Satellite::B);
        assert_eq!(config.schedule.period_secs, 3600);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = BotConfig::default();
        config.selection.cloud_cover_threshold = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BotConfig::default();
        config.composite.lower_percentile = 99.0;
        config.composite.upper_percentile = 1.0;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.quality.max_black_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn selector_config_maps_durations() {
        let selection = SelectionConfig {
            retry_max_attempts: Some(3),
            cache_ttl_secs: None,
            ..SelectionConfig::default()
        };
        let selector = selection.selector_config();
        assert_eq!(selector.metadata_skip_delay, Duration::from_millis(500));
        assert_eq!(selector.listing_retry.max_attempts, Some(3));
        assert_eq!(selector.cache_ttl, None);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            BotConfig::from_json_file("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
