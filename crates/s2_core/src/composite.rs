//! Builds the true-colour composite from the red, green and blue band windows.
//!
//! Each channel is stretched on its own percentiles so that the bright tail
//! (clouds, snow) and the dark tail (water, shadow) do not dominate, then the
//! green channel gets a small gain to compensate for the blue cast of raw L1C
//! reflectances.

use chrono::NaiveDate;
use ndarray::{Array3, ArrayViewMut2, Axis};
use rayon::slice::ParallelSliceMut;
use thiserror::Error;
use tracing::{debug, info};

use crate::caption::parse_acquisition_date;
use crate::catalog::keys::Band;
use crate::catalog::{CatalogClient, CatalogError, Coordinate, RasterWindow, WindowSpec};
use crate::selection::AcquisitionTemplate;

pub const DEFAULT_LOWER_PERCENTILE: f64 = 1.0;
pub const DEFAULT_UPPER_PERCENTILE: f64 = 99.0;
pub const DEFAULT_GREEN_GAIN: f32 = 1.12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorSettings {
    pub window: WindowSpec,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub green_gain: f32,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            window: WindowSpec::default(),
            lower_percentile: DEFAULT_LOWER_PERCENTILE,
            upper_percentile: DEFAULT_UPPER_PERCENTILE,
            green_gain: DEFAULT_GREEN_GAIN,
        }
    }
}

/// Stretched RGB image, `height x width x 3`, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    pub pixels: Array3<f32>,
    pub center: Coordinate,
    pub identifier: String,
    pub acquired: NaiveDate,
}

impl CompositeImage {
    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("failed to read band {band:?}: {source}")]
    Band {
        band: Band,
        #[source]
        source: CatalogError,
    },
    #[error("band windows disagree in shape: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("band window is empty")]
    EmptyWindow,
    #[error("no acquisition date in identifier {0}")]
    UndatedIdentifier(String),
}

#[derive(Debug, Clone, Default)]
pub struct ImageCompositor {
    settings: CompositorSettings,
}

impl ImageCompositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    pub fn composite(
        &self,
        catalog: &dyn CatalogClient,
        acquisition: &AcquisitionTemplate,
    ) -> Result<CompositeImage, CompositeError> {
        let identifier = acquisition.identifier().to_string();
        let acquired = parse_acquisition_date(&identifier)
            .ok_or_else(|| CompositeError::UndatedIdentifier(identifier.clone()))?;

        let mut windows = Vec::with_capacity(Band::RGB.len());
        for band in Band::RGB {
            let path = acquisition.band_path(band);
            debug!(band = ?band, path = %path, "reading band window");
            let window = catalog
                .fetch_raster_window(&path, &self.settings.window)
                .map_err(|source| CompositeError::Band { band, source })?;
            windows.push(window);
        }
        let center = windows[0].center;
        info!(lat = center.lat, lng = center.lng, identifier = %identifier, "coordinate of the tile");

        let mut pixels = stack_channels(&windows)?;
        self.stretch(&mut pixels);
        debug!(dims = ?pixels.dim(), "composite ready");

        Ok(CompositeImage {
            pixels,
            center,
            identifier,
            acquired,
        })
    }

    /// Percentile-stretch every channel to `[0, 1]`, then apply the green gain.
    pub fn stretch(&self, pixels: &mut Array3<f32>) {
        let (lower, upper) = (self.settings.lower_percentile, self.settings.upper_percentile);
        for channel in pixels.axis_iter_mut(Axis(2)) {
            stretch_channel(channel, lower, upper);
        }
        if pixels.dim().2 > 1 {
            let gain = self.settings.green_gain;
            pixels
                .index_axis_mut(Axis(2), 1)
                .mapv_inplace(|v| (v * gain).clamp(0.0, 1.0));
        }
    }
}

/// Stack equally-shaped single-band windows along a trailing channel axis.
pub fn stack_channels(windows: &[RasterWindow]) -> Result<Array3<f32>, CompositeError> {
    let Some(first) = windows.first() else {
        return Err(CompositeError::EmptyWindow);
    };
    let expected = first.pixels.dim();
    if expected.0 == 0 || expected.1 == 0 {
        return Err(CompositeError::EmptyWindow);
    }
    if let Some(other) = windows.iter().find(|w| w.pixels.dim() != expected) {
        return Err(CompositeError::ShapeMismatch {
            expected,
            found: other.pixels.dim(),
        });
    }
    Ok(Array3::from_shape_fn(
        (expected.0, expected.1, windows.len()),
        |(y, x, c)| f32::from(windows[c].pixels[[y, x]]),
    ))
}

/// Rescale `[p_lower, p_upper]` of the channel to `[0, 1]`, clipping the tails.
/// A flat channel becomes all zero.
pub fn stretch_channel(mut channel: ArrayViewMut2<f32>, lower: f64, upper: f64) {
    let sorted = sorted_values(channel.iter().copied());
    let bounds = percentile(&sorted, lower).zip(percentile(&sorted, upper));
    match bounds {
        Some((low, high)) if high > low => {
            let span = high - low;
            channel.mapv_inplace(|v| ((v - low) / span).clamp(0.0, 1.0));
        }
        _ => channel.fill(0.0),
    }
}

pub fn sorted_values(values: impl Iterator<Item = f32>) -> Vec<f32> {
    let mut values: Vec<f32> = values.collect();
    values.par_sort_unstable_by(f32::total_cmp);
    values
}

/// Percentile `q` (0-100) of sorted data, linearly interpolated between ranks.
pub fn percentile(sorted: &[f32], q: f64) -> Option<f32> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = (rank - lo as f64) as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn window(fill: impl Fn(usize, usize) -> u16, shape: (usize, usize)) -> RasterWindow {
        RasterWindow {
            pixels: Array2::from_shape_fn(shape, |(y, x)| fill(y, x)),
            center: Coordinate::new(0.0, 0.0),
        }
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        assert_eq!(percentile(&sorted, 1.0), Some(1.0));
        assert_eq!(percentile(&sorted, 99.0), Some(99.0));
        assert_eq!(percentile(&[0.0, 10.0], 25.0), Some(2.5));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn stacking_rejects_mismatched_windows() {
        let windows = [
            window(|_, _| 1, (4, 4)),
            window(|_, _| 1, (4, 4)),
            window(|_, _| 1, (4, 3)),
        ];
        assert!(matches!(
            stack_channels(&windows),
            Err(CompositeError::ShapeMismatch {
                expected: (4, 4),
                found: (4, 3)
            })
        ));
        assert!(matches!(
            stack_channels(&[window(|_, _| 0, (0, 4))]),
            Err(CompositeError::EmptyWindow)
        ));
    }

    #[test]
    fn stretch_maps_each_channel_to_unit_range() {
        let gradient = |y: usize, x: usize| (y * 10 + x) as u16 * 100;
        let windows = [
            window(gradient, (10, 10)),
            window(|_, _| 5, (10, 10)),
            window(gradient, (10, 10)),
        ];
        let mut pixels = stack_channels(&windows).expect("stack");
        ImageCompositor::default().stretch(&mut pixels);

        let red = pixels.index_axis(Axis(2), 0);
        assert_eq!(red[[0, 0]], 0.0);
        assert_eq!(red[[9, 9]], 1.0);
        assert!(red.iter().all(|v| (0.0..=1.0).contains(v)));
        // flat green channel collapses to zero even after the gain
        assert!(pixels.index_axis(Axis(2), 1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn green_gain_is_applied_after_stretch() {
        let gradient = |y: usize, x: usize| (y * 10 + x) as u16;
        let windows = [
            window(gradient, (10, 10)),
            window(gradient, (10, 10)),
            window(gradient, (10, 10)),
        ];
        let mut pixels = stack_channels(&windows).expect("stack");
        ImageCompositor::default().stretch(&mut pixels);

        let red = pixels[[5, 0, 0]];
        let green = pixels[[5, 0, 1]];
        assert!((green - (red * DEFAULT_GREEN_GAIN).min(1.0)).abs() < 1e-6);
        assert!(green > red);
    }
}
