//! Shared helpers for tests: local HTTP servers, sample images and a stub Vision client.

use async_trait::async_trait;
use axum::{Form, Json, Router, http::StatusCode, routing::post};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::services::vision::{LabelAnnotation, SafetyScores, VisionClient, VisionError};

/// Serve a router on an ephemeral localhost port, returning its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A 4x3 image encoded in the given format
pub fn encoded_image(format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(4, 3, |x, y| Rgb([(x * 60) as u8, (y * 80) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub fn label(description: &str, score: f32) -> LabelAnnotation {
    LabelAnnotation {
        description: description.to_string(),
        score,
    }
}

/// Vision client returning canned results and recording what it was sent
pub struct StubVision {
    safety: SafetyScores,
    labels: Vec<LabelAnnotation>,
    fail_safety: bool,
    fail_labels: bool,
    label_calls: AtomicUsize,
    last_image: Mutex<Vec<u8>>,
}

impl StubVision {
    pub fn new(safety: SafetyScores, labels: Vec<LabelAnnotation>) -> Self {
        Self {
            safety,
            labels,
            fail_safety: false,
            fail_labels: false,
            label_calls: AtomicUsize::new(0),
            last_image: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_safety(mut self) -> Self {
        self.fail_safety = true;
        self
    }

    pub fn failing_labels(mut self) -> Self {
        self.fail_labels = true;
        self
    }

    pub fn label_calls(&self) -> usize {
        self.label_calls.load(Ordering::SeqCst)
    }

    pub fn last_image(&self) -> Vec<u8> {
        self.last_image.lock().unwrap().clone()
    }

    fn unavailable() -> VisionError {
        VisionError::Api {
            code: 14,
            message: "service unavailable".into(),
        }
    }
}

#[async_trait]
impl VisionClient for StubVision {
    async fn classify_safety(&self, image: &[u8]) -> Result<SafetyScores, VisionError> {
        *self.last_image.lock().unwrap() = image.to_vec();
        if self.fail_safety {
            return Err(Self::unavailable());
        }
        Ok(self.safety)
    }

    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<LabelAnnotation>, VisionError> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_image.lock().unwrap() = image.to_vec();
        if self.fail_labels {
            return Err(Self::unavailable());
        }
        Ok(self.labels.clone())
    }
}

pub const BOUNDARY: &str = "XyZmoderatorBoundary";

/// Build a multipart body; parts are (name, filename, data)
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let disposition = match filename {
            Some(f) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                name, f
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub const TEST_PRIVATE_KEY: &str = include_str!("../testdata/service_account_key.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../testdata/service_account_key.pub.pem");

/// Service account key JSON signed with the test key, pointing at `token_uri`
pub fn service_account_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "client_email": "svc@proj.iam.gserviceaccount.com",
        "private_key": TEST_PRIVATE_KEY,
        "token_uri": token_uri,
    })
    .to_string()
}

pub type TokenRequests = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// OAuth token endpoint answering with `status`. Successful responses issue
/// `token-1`, `token-2`, ... Returns the token URI and the recorded form posts.
pub async fn token_server(status: StatusCode, expires_in: i64) -> (String, TokenRequests) {
    let seen: TokenRequests = Arc::default();
    let recorder = seen.clone();
    let router = Router::new().route(
        "/token",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let recorder = recorder.clone();
            async move {
                let count = {
                    let mut requests = recorder.lock().unwrap();
                    requests.push(form);
                    requests.len()
                };
                if status.is_success() {
                    (
                        status,
                        Json(json!({
                            "access_token": format!("token-{}", count),
                            "expires_in": expires_in,
                            "token_type": "Bearer",
                        })),
                    )
                } else {
                    (status, Json(json!({"error": "invalid_grant"})))
                }
            }
        }),
    );
    let base = serve(router).await;
    (format!("{}/token", base), seen)
}
