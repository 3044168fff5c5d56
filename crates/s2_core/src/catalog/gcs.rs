//! Blocking client for the public Sentinel-2 bucket on Google Cloud Storage.
//!
//! Listings go through the JSON API (paged via `nextPageToken`); objects are
//! downloaded from the public object endpoint.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{CatalogClient, CatalogError, RasterWindow, WindowSpec};
#[cfg(test)]
use super::{DEFAULT_API_BASE, DEFAULT_BUCKET, DEFAULT_OBJECT_BASE};

const LIST_TIMEOUT: Duration = Duration::from_secs(60);
#[cfg_attr(not(feature = "raster"), allow(dead_code))]
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct GcsCatalog {
    client: Client,
    bucket: String,
    api_base: String,
    object_base: String,
    request_timeout: Duration,
}

impl GcsCatalog {
    pub fn new(
        bucket: &str,
        api_base: &str,
        object_base: &str,
        user_agent: &str,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| CatalogError::Http(format!("failed to build GCS client: {err}")))?;
        Ok(Self {
            client,
            bucket: bucket.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            object_base: object_base.trim_end_matches('/').to_string(),
            request_timeout: LIST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn object_url(&self, path: &str) -> Result<Url, CatalogError> {
        let mut url = Url::parse(&self.object_base)
            .map_err(|err| CatalogError::Http(format!("invalid object base URL: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::Http("object base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(path.split('/'));
        Ok(url)
    }

    fn get_object(&self, path: &str, timeout: Duration) -> Result<Response, CatalogError> {
        let url = self.object_url(path)?;
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(path.to_string())),
            status if !status.is_success() => {
                Err(CatalogError::Http(format!("status {status} for {path}")))
            }
            _ => Ok(response),
        }
    }

    fn list_page(&self, prefix: &str, page_token: Option<&str>) -> Result<ListPage, CatalogError> {
        let base = format!("{}/b/{}/o", self.api_base, self.bucket);
        let mut url = Url::parse(&base)
            .map_err(|err| CatalogError::Http(format!("failed to build listing URL: {err}")))?;
        url.query_pairs_mut()
            .append_pair("prefix", prefix)
            .append_pair("fields", "items(name),nextPageToken");
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Http(format!(
                "listing {prefix} returned status {}",
                response.status()
            )));
        }
        response
            .json::<ListPage>()
            .map_err(|err| CatalogError::Decode(err.to_string()))
    }
}

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

impl CatalogClient for GcsCatalog {
    fn list(&self, prefix: &str) -> Result<Vec<String>, CatalogError> {
        let mut paths = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(prefix, token.as_deref())?;
            paths.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        paths.sort();
        debug!(prefix, objects = paths.len(), "listed catalog prefix");
        Ok(paths)
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, CatalogError> {
        let response = self.get_object(path, self.request_timeout)?;
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| CatalogError::Http(err.to_string()))
    }

    #[cfg(feature = "raster")]
    fn fetch_raster_window(
        &self,
        path: &str,
        window: &WindowSpec,
    ) -> Result<RasterWindow, CatalogError> {
        let scratch = tempfile::tempdir()?;
        let file_name = path.rsplit('/').next().unwrap_or("band.jp2");
        let local = scratch.path().join(file_name);

        let mut response = self.get_object(path, DOWNLOAD_TIMEOUT)?;
        let mut file = std::fs::File::create(&local)?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|err| CatalogError::Http(err.to_string()))?;
        debug!(path, bytes, "downloaded band raster");

        super::raster::read_window(&local, window).map_err(|message| CatalogError::Raster {
            path: path.to_string(),
            message,
        })
    }

    #[cfg(not(feature = "raster"))]
    fn fetch_raster_window(
        &self,
        _path: &str,
        _window: &WindowSpec,
    ) -> Result<RasterWindow, CatalogError> {
        Err(CatalogError::Unsupported(
            "JPEG2000 band decoding (build with the `raster` feature)",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GcsCatalog {
        GcsCatalog::new(DEFAULT_BUCKET, DEFAULT_API_BASE, DEFAULT_OBJECT_BASE, "s2-test")
            .expect("client")
    }

    #[test]
    fn object_url_keeps_path_segments() {
        let url = catalog()
            .object_url("tiles/32/T/MT/S2A_X.SAFE/MTD_MSIL1C.xml")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/gcp-public-data-sentinel-2/tiles/32/T/MT/S2A_X.SAFE/MTD_MSIL1C.xml"
        );
    }

    #[test]
    fn list_page_tolerates_missing_items() {
        let page: ListPage = serde_json::from_str("{}").expect("page");
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());

        let page: ListPage =
            serde_json::from_str(r#"{"items":[{"name":"a"}],"nextPageToken":"t"}"#).expect("page");
        assert_eq!(page.items[0].name, "a");
        assert_eq!(page.next_page_token.as_deref(), Some("t"));
    }

    #[test]
    #[ignore = "requires network access to storage.googleapis.com"]
    fn lists_public_bucket() {
        let paths = catalog()
            .list("tiles/32/T/MT/S2A_MSIL1C_2020051")
            .expect("listing");
        assert!(paths.iter().any(|p| p.ends_with("_B02.jp2")));
    }
}
