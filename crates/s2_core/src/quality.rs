//! Rejects composites that are partial acquisitions or carry no detail.

use ndarray::{Array3, Axis};
use tracing::info;

use crate::composite::{percentile, sorted_values};

pub const DEFAULT_MAX_BLACK_FRACTION: f64 = 0.30;
pub const DEFAULT_MIN_CONTRAST_RATIO: f64 = 0.05;

const LUMINANCE_WEIGHTS: [f32; 3] = [0.2125, 0.7154, 0.0721];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted,
    /// Too many pixels are exactly black in every channel.
    Incomplete { black_fraction: f64 },
    /// The 1st-99th percentile luminance spread is a too small share of the range.
    LowContrast { ratio: f64 },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub max_black_fraction: f64,
    pub min_contrast_ratio: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            max_black_fraction: DEFAULT_MAX_BLACK_FRACTION,
            min_contrast_ratio: DEFAULT_MIN_CONTRAST_RATIO,
        }
    }
}

impl QualityGate {
    pub fn new(max_black_fraction: f64, min_contrast_ratio: f64) -> Self {
        Self {
            max_black_fraction,
            min_contrast_ratio,
        }
    }

    pub fn accept(&self, pixels: &Array3<f32>) -> bool {
        let verdict = self.evaluate(pixels);
        match verdict {
            Verdict::Accepted => true,
            Verdict::Incomplete { black_fraction } => {
                info!(black_fraction, "skipping image because it is incomplete");
                false
            }
            Verdict::LowContrast { ratio } => {
                info!(ratio, "skipping image because it is low contrast");
                false
            }
        }
    }

    /// Evaluate an RGB image with values in `[0, 1]`.
    /// Empty or non-RGB input is reported as fully incomplete.
    pub fn evaluate(&self, pixels: &Array3<f32>) -> Verdict {
        let (height, width, channels) = pixels.dim();
        let total = height * width;
        if total == 0 || channels != 3 {
            return Verdict::Incomplete {
                black_fraction: 1.0,
            };
        }

        let black = pixels
            .lanes(Axis(2))
            .into_iter()
            .filter(|px| px.iter().all(|&v| v == 0.0))
            .count();
        let black_fraction = black as f64 / total as f64;
        if black_fraction > self.max_black_fraction {
            return Verdict::Incomplete { black_fraction };
        }

        let luminance = sorted_values(pixels.lanes(Axis(2)).into_iter().map(|px| {
            px.iter()
                .zip(LUMINANCE_WEIGHTS)
                .map(|(v, w)| v * w)
                .sum::<f32>()
        }));
        let spread = match (percentile(&luminance, 1.0), percentile(&luminance, 99.0)) {
            (Some(low), Some(high)) => f64::from(high - low),
            _ => 0.0,
        };
        // luminance of a [0, 1] image spans [0, 1]
        let ratio = spread / 1.0;
        if ratio < self.min_contrast_ratio {
            return Verdict::LowContrast { ratio };
        }
        Verdict::Accepted
    }
}
