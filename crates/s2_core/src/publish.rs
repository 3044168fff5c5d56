//! Posting a caption and image to the social feed.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::caption::{normalized_len, MAX_CAPTION_BYTES};
use crate::catalog::Coordinate;

/// One feed update: caption, attached image and geotag.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub text: String,
    pub media_path: PathBuf,
    pub coordinate: Coordinate,
    pub display_coordinates: bool,
}

impl Post {
    pub fn validate(&self) -> Result<(), PublishError> {
        let bytes = normalized_len(&self.text);
        if bytes > MAX_CAPTION_BYTES {
            return Err(PublishError::CaptionTooLong { bytes });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("caption is {bytes} bytes, limit is {MAX_CAPTION_BYTES}")]
    CaptionTooLong { bytes: usize },
    #[error("cannot attach media: {0}")]
    Media(#[from] std::io::Error),
    #[error("publish request failed: {0}")]
    Http(String),
    #[error("feed rejected the post with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub trait Publisher {
    fn post(&self, post: &Post) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn post(&self, post: &Post) -> Result<(), PublishError> {
        (**self).post(post)
    }
}

/// Validates and logs the post instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunPublisher;

impl Publisher for DryRunPublisher {
    fn post(&self, post: &Post) -> Result<(), PublishError> {
        post.validate()?;
        info!(
            text = %post.text,
            media = %post.media_path.display(),
            lat = post.coordinate.lat,
            lng = post.coordinate.lng,
            "posting disabled, not publishing"
        );
        Ok(())
    }
}

#[cfg(feature = "http")]
pub use http::HttpPublisher;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use reqwest::blocking::multipart::Form;
    use reqwest::blocking::Client;

    use super::{Post, PublishError, Publisher};

    const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

    /// Sends posts as multipart forms to a status-update endpoint with a bearer token.
    #[derive(Debug, Clone)]
    pub struct HttpPublisher {
        client: Client,
        endpoint: String,
        token: String,
    }

    impl HttpPublisher {
        pub fn new(endpoint: &str, token: &str, user_agent: &str) -> Result<Self, PublishError> {
            let client = Client::builder()
                .timeout(UPLOAD_TIMEOUT)
                .user_agent(user_agent)
                .build()
                .map_err(|err| PublishError::Http(format!("failed to build client: {err}")))?;
            Ok(Self {
                client,
                endpoint: endpoint.to_string(),
                token: token.to_string(),
            })
        }

        fn form(post: &Post) -> Result<Form, PublishError> {
            let form = Form::new()
                .text("status", post.text.clone())
                .text("lat", post.coordinate.lat.to_string())
                .text("long", post.coordinate.lng.to_string())
                .text("display_coordinates", post.display_coordinates.to_string())
                .file("media", &post.media_path)?;
            Ok(form)
        }
    }

    impl Publisher for HttpPublisher {
        fn post(&self, post: &Post) -> Result<(), PublishError> {
            post.validate()?;
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.token)
                .multipart(Self::form(post)?)
                .send()
                .map_err(|err| PublishError::Http(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(PublishError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }
            tracing::info!(status = status.as_u16(), "post published");
            Ok(())
        }
    }

}
