//! Fetch images by URL and normalize them to PNG.

use bytes::{Bytes, BytesMut};
use image::{ImageFormat, ImageReader};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

use crate::constants::FETCH_USER_AGENT;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("error fetching image from URL: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image URL returned {0}")]
    Status(StatusCode),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("invalid content type: {0:?}")]
    InvalidContentType(String),
    #[error("error decoding image: {0}")]
    Decode(image::ImageError),
    #[error("error encoding image as PNG: {0}")]
    Encode(image::ImageError),
    #[error("image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct ImageFetcher {
    http: Client,
    max_bytes: usize,
}

impl ImageFetcher {
    /// `max_bytes` caps the downloaded body, the same limit uploads get
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(FETCH_USER_AGENT)
            .build()?;
        Ok(Self { http, max_bytes })
    }

    /// Download an image and re-encode it as PNG
    pub async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let resp = self.http.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.contains("image") {
            return Err(FetchError::InvalidContentType(content_type));
        }

        let body = self.read_limited(resp).await?;
        tokio::task::spawn_blocking(move || reencode_png(&body)).await?
    }

    /// Read the body chunk by chunk, giving up once it passes `max_bytes`
    async fn read_limited(&self, mut resp: reqwest::Response) -> Result<Bytes, FetchError> {
        let limit = self.max_bytes;
        if resp.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = resp.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Like `fetch`, but logs the failure and returns `None`
    pub async fn fetch_or_log(&self, url: &str) -> Option<Bytes> {
        match self.fetch(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::error!(url, "{}", e);
                None
            }
        }
    }
}

/// Decode any supported raster format and encode it as PNG
pub fn reencode_png(data: &[u8]) -> Result<Bytes, FetchError> {
    let image = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| FetchError::Decode(image::ImageError::IoError(e)))?
        .decode()
        .map_err(FetchError::Decode)?;

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(FetchError::Encode)?;

    Ok(Bytes::from(png.into_inner()))
}
