//! Picks the acquisition to publish for a grid cell.
//!
//! The catalog listing for a `(cell, satellite)` pair is walked from the most
//! recent product backwards. Each product's metadata is fetched to read its
//! cloud cover; products at or above the threshold are passed over, corrupt
//! metadata is skipped, and the walk stops as soon as enough clear products
//! have been seen to honour the `skip` request.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::cache::{ListingCache, DEFAULT_LISTING_CACHE_CAPACITY, DEFAULT_LISTING_TTL};
use crate::catalog::keys::{
    is_reference_band, metadata_path, product_path, tile_prefix, Band, BandPathTemplate, Satellite,
};
use crate::catalog::{CatalogClient, CatalogError};
use crate::clock::Clock;
use crate::grid::GridCell;
use crate::retry::{CancelToken, RetryError, RetryPolicy};

pub mod metadata;

pub use metadata::{parse_cloud_cover, MetadataError};

pub const DEFAULT_CLOUD_COVER_THRESHOLD: f64 = 70.0;
pub const DEFAULT_METADATA_SKIP_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    /// Acquisitions are accepted only when strictly below this percentage.
    pub cloud_cover_threshold: f64,
    /// Pause after a metadata document could not be read.
    pub metadata_skip_delay: Duration,
    pub listing_retry: RetryPolicy,
    pub cache_capacity: usize,
    pub cache_ttl: Option<Duration>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cloud_cover_threshold: DEFAULT_CLOUD_COVER_THRESHOLD,
            metadata_skip_delay: DEFAULT_METADATA_SKIP_DELAY,
            listing_retry: RetryPolicy::default(),
            cache_capacity: DEFAULT_LISTING_CACHE_CAPACITY,
            cache_ttl: Some(DEFAULT_LISTING_TTL),
        }
    }
}

/// A clear acquisition, addressed by a band-path template.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionTemplate {
    pub cell: GridCell,
    pub satellite: Satellite,
    pub template: BandPathTemplate,
    pub product_path: String,
    pub metadata_path: String,
    pub cloud_cover: f64,
}

impl AcquisitionTemplate {
    pub fn band_path(&self, band: Band) -> String {
        self.template.band_path(band)
    }

    pub fn identifier(&self) -> &str {
        self.template.identifier()
    }
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("listing {prefix} unavailable after {attempts} attempts: {source}")]
    ListingUnavailable {
        prefix: String,
        attempts: u32,
        #[source]
        source: CatalogError,
    },
    #[error("selection cancelled")]
    Cancelled,
}

/// Why a product's cloud cover could not be read.
#[derive(Debug, Error)]
pub enum CloudCoverError {
    #[error("failed to fetch metadata: {0}")]
    Fetch(#[from] CatalogError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

pub struct AcquisitionSelector {
    config: SelectorConfig,
    cache: ListingCache,
    cancel: CancelToken,
}

impl AcquisitionSelector {
    pub fn new(config: SelectorConfig, cancel: CancelToken) -> Self {
        let cache = ListingCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            config,
            cache,
            cancel,
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    /// Forget the cached listing of one cell so the next call sees new acquisitions.
    pub fn invalidate(&mut self, cell: GridCell, satellite: Satellite) {
        self.cache.invalidate(&(cell, satellite));
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Return the `skip`-th most recent clear acquisition (0 = newest), or the
    /// oldest clear one found when fewer are available.
    pub fn select(
        &mut self,
        catalog: &dyn CatalogClient,
        clock: &dyn Clock,
        cell: GridCell,
        satellite: Satellite,
        skip: usize,
    ) -> Result<Option<AcquisitionTemplate>, SelectError> {
        let listing = self.listing(catalog, clock, cell, satellite)?;
        if listing.is_empty() {
            info!(%cell, %satellite, "no catalog objects for grid cell");
            return Ok(None);
        }

        let mut accepted: Vec<AcquisitionTemplate> = Vec::new();
        for band_path in listing.iter().rev().filter(|path| is_reference_band(path)) {
            let (Some(template), Some(product_path), Some(metadata_path)) = (
                BandPathTemplate::from_reference(band_path),
                product_path(band_path),
                metadata_path(band_path),
            ) else {
                debug!(band_path = %band_path, "reference band outside a product directory");
                continue;
            };

            let cloud_cover = match read_cloud_cover(catalog, &metadata_path) {
                Ok(value) => value,
                Err(err) => {
                    warn!(metadata = %metadata_path, error = %err, "skipping unreadable metadata");
                    clock.sleep(self.config.metadata_skip_delay);
                    continue;
                }
            };
            if cloud_cover >= self.config.cloud_cover_threshold {
                debug!(metadata = %metadata_path, cloud_cover, "skipping because of cloud coverage");
                continue;
            }

            info!(
                identifier = template.identifier(),
                cloud_cover, "found acquisition below cloud threshold"
            );
            accepted.push(AcquisitionTemplate {
                cell,
                satellite,
                template,
                product_path,
                metadata_path,
                cloud_cover,
            });
            // only go back far enough to honour the skip request
            if accepted.len() > skip {
                break;
            }
        }

        if accepted.is_empty() {
            info!(%cell, %satellite, "no acquisition below cloud threshold");
            return Ok(None);
        }
        let index = skip.min(accepted.len() - 1);
        Ok(Some(accepted.swap_remove(index)))
    }

    fn listing(
        &mut self,
        catalog: &dyn CatalogClient,
        clock: &dyn Clock,
        cell: GridCell,
        satellite: Satellite,
    ) -> Result<Arc<Vec<String>>, SelectError> {
        let key = (cell, satellite);
        if let Some(paths) = self.cache.get(&key, clock.now()) {
            debug!(%cell, %satellite, "listing cache hit");
            return Ok(paths);
        }

        let prefix = tile_prefix(&cell, satellite);
        let paths = self
            .config
            .listing_retry
            .run(clock, &self.cancel, || catalog.list(&prefix))
            .map_err(|err| match err {
                RetryError::Exhausted { attempts, last } => SelectError::ListingUnavailable {
                    prefix: prefix.clone(),
                    attempts,
                    source: last,
                },
                RetryError::Cancelled => SelectError::Cancelled,
            })?;
        Ok(self.cache.put(key, paths, clock.now()))
    }
}

/// Fetch a product metadata document and read its cloud cover.
pub fn read_cloud_cover(
    catalog: &dyn CatalogClient,
    path: &str,
) -> Result<f64, CloudCoverError> {
    let document = catalog.fetch(path)?;
    Ok(parse_cloud_cover(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{metadata_xml, InMemoryCatalog};

    const PATH: &str = "tiles/32/T/MT/S2A_MSIL1C_X.SAFE/MTD_MSIL1C.xml";

    #[test]
    fn reads_cloud_cover_from_catalog() {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_object(PATH, metadata_xml(42.5));
        assert_eq!(read_cloud_cover(&catalog, PATH).ok(), Some(42.5));
    }

    #[test]
    fn missing_document_is_a_fetch_error() {
        let catalog = InMemoryCatalog::new();
        assert!(matches!(
            read_cloud_cover(&catalog, PATH),
            Err(CloudCoverError::Fetch(CatalogError::NotFound(_)))
        ));
    }

    #[test]
    fn malformed_document_keeps_metadata_error() {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_object(PATH, b"<n1:Product></n1:Product>".to_vec());
        assert!(matches!(
            read_cloud_cover(&catalog, PATH),
            Err(CloudCoverError::Metadata(MetadataError::Xml(_)))
        ));

        catalog.insert_object(PATH, b"<Product/>".to_vec());
        assert!(matches!(
            read_cloud_cover(&catalog, PATH),
            Err(CloudCoverError::Metadata(MetadataError::MissingCloudCover))
        ));
    }
}
