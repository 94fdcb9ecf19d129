//! Upload normalization - turns any supported request shape into image bytes.
//!
//! Supported shapes, checked in order:
//! - `multipart/form-data` with a `url` form field (fetched) or a `file` upload (raw bytes)
//! - JSON with a base64 `file` key (decoded, not validated) or a `url` key (fetched)
//! - `application/x-www-form-urlencoded` with a `url` field (fetched)
//!
//! Only URL-sourced images are re-encoded to PNG.

use axum::{
    Form,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde_json::Value;
use std::collections::HashMap;

use crate::services::error::{ApiError, LogErr};
use crate::services::fetcher::ImageFetcher;

/// Standard alphabet, padding optional
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    Multipart,
    Json,
    UrlEncoded,
    Unsupported,
}

impl RequestShape {
    pub fn classify(content_type: &str) -> Self {
        if content_type.contains("multipart/form-data") {
            return RequestShape::Multipart;
        }

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json"
            || (essence.starts_with("application/") && essence.ends_with("+json"))
        {
            RequestShape::Json
        } else if content_type == "application/x-www-form-urlencoded" {
            RequestShape::UrlEncoded
        } else {
            RequestShape::Unsupported
        }
    }
}

/// Extract image bytes from the request.
///
/// `Ok(None)` means a URL was given but the image could not be fetched.
pub async fn normalize(fetcher: &ImageFetcher, request: Request) -> Result<Option<Bytes>, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    tracing::info!(%content_type, "Upload received");

    match RequestShape::classify(&content_type) {
        RequestShape::Multipart => from_multipart(fetcher, request).await,
        RequestShape::Json => from_json(fetcher, request).await,
        RequestShape::UrlEncoded => from_urlencoded(fetcher, request).await,
        RequestShape::Unsupported => Err(ApiError::UnsupportedMediaType(content_type)),
    }
}

async fn from_multipart(
    fetcher: &ImageFetcher,
    request: Request,
) -> Result<Option<Bytes>, ApiError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::from_rejection("Multipart rejected", e.status(), e.body_text()))?;

    let mut url: Option<String> = None;
    let mut file: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_rejection("Multipart field error", e.status(), e.body_text()))?
    {
        // Parts with a filename are uploads, parts without one are plain form fields
        let name = field.name().map(str::to_owned);
        let is_upload = field.file_name().is_some();
        match (name.as_deref(), is_upload) {
            (Some("url"), false) if url.is_none() => {
                url = Some(field.text().await.map_err(|e| {
                    ApiError::from_rejection("Multipart url field", e.status(), e.body_text())
                })?);
            }
            (Some("file"), true) if file.is_none() => {
                file = Some(field.bytes().await.map_err(|e| {
                    ApiError::from_rejection("Multipart file field", e.status(), e.body_text())
                })?);
            }
            _ => {}
        }
    }

    if let Some(url) = url {
        Ok(fetcher.fetch_or_log(&url).await)
    } else if let Some(file) = file {
        Ok(Some(file))
    } else {
        Err(ApiError::BadRequest("No file or URL provided in form data".into()))
    }
}

async fn from_json(fetcher: &ImageFetcher, request: Request) -> Result<Option<Bytes>, ApiError> {
    let body = Bytes::from_request(request, &())
        .await
        .map_err(|e| ApiError::from_rejection("Read JSON body", e.status(), e.body_text()))?;

    let value: Value =
        serde_json::from_slice(&body).log_bad_request("Parse JSON body", "Invalid JSON body")?;
    let Some(object) = value.as_object() else {
        return Err(ApiError::BadRequest("JSON body must be an object".into()));
    };

    if let Some(file) = object.get("file") {
        let Some(encoded) = file.as_str() else {
            return Err(ApiError::BadRequest("'file' must be a base64 string".into()));
        };
        return decode_base64(encoded).map(Some);
    }

    match object.get("url") {
        Some(Value::String(url)) => Ok(fetcher.fetch_or_log(url).await),
        Some(_) => Err(ApiError::BadRequest("'url' must be a string".into())),
        None => Err(ApiError::BadRequest("No file or URL provided in JSON".into())),
    }
}

async fn from_urlencoded(
    fetcher: &ImageFetcher,
    request: Request,
) -> Result<Option<Bytes>, ApiError> {
    let Form(form) = Form::<HashMap<String, String>>::from_request(request, &())
        .await
        .map_err(|e| ApiError::from_rejection("Read form body", e.status(), e.body_text()))?;

    match form.get("url") {
        Some(url) => Ok(fetcher.fetch_or_log(url).await),
        None => Err(ApiError::BadRequest("No URL provided in form data".into())),
    }
}

/// Decode a base64 payload, accepting an optional `data:<mime>;base64,` prefix
pub fn decode_base64(encoded: &str) -> Result<Bytes, ApiError> {
    let payload = encoded
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map_or(encoded, |(_, data)| data);

    let compact: String = payload.split_ascii_whitespace().collect();
    LENIENT_BASE64
        .decode(compact)
        .map(Bytes::from)
        .log_bad_request("Decode base64 file", "Invalid base64 in 'file'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{BOUNDARY, multipart_body};
    use axum::body::Body;
    use std::time::Duration;

    fn request(content_type: &str, body: impl Into<Body>) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request {
        request(
            &format!("multipart/form-data; boundary={}", BOUNDARY),
            multipart_body(parts),
        )
    }

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(Duration::from_secs(2), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            RequestShape::classify("multipart/form-data; boundary=abc"),
            RequestShape::Multipart
        );
        assert_eq!(RequestShape::classify("application/json"), RequestShape::Json);
        assert_eq!(
            RequestShape::classify("application/json; charset=utf-8"),
            RequestShape::Json
        );
        assert_eq!(RequestShape::classify("application/ld+json"), RequestShape::Json);
        assert_eq!(
            RequestShape::classify("application/x-www-form-urlencoded"),
            RequestShape::UrlEncoded
        );
        // Only the exact urlencoded type is accepted
        assert_eq!(
            RequestShape::classify("application/x-www-form-urlencoded; charset=utf-8"),
            RequestShape::Unsupported
        );
        assert_eq!(RequestShape::classify("text/plain"), RequestShape::Unsupported);
        assert_eq!(RequestShape::classify(""), RequestShape::Unsupported);
    }

    #[tokio::test]
    async fn test_multipart_file_bytes_unmodified() {
        let raw: &[u8] = b"\x00\x01not-even-an-image\xff\r\n--tricky";
        let bytes = normalize(&fetcher(), multipart_request(&[("file", Some("a.bin"), raw)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&bytes[..], raw);
    }

    #[tokio::test]
    async fn test_multipart_missing_fields() {
        let err = normalize(&fetcher(), multipart_request(&[("other", None, b"x".as_slice())]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No file or URL provided in form data");
    }

    #[tokio::test]
    async fn test_multipart_url_wins_over_file() {
        // Port 1 refuses connections, so a fetch attempt yields None
        let result = normalize(
            &fetcher(),
            multipart_request(&[
                ("file", Some("a.bin"), b"raw".as_slice()),
                ("url", None, b"http://127.0.0.1:1/a.png".as_slice()),
            ]),
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_multipart_parts_need_matching_kind() {
        // A `file` part without a filename is a form field, not an upload
        let err = normalize(&fetcher(), multipart_request(&[("file", None, b"raw".as_slice())]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No file or URL provided in form data");

        // A `url` part carrying a filename is an upload, so the file is used instead
        let bytes = normalize(
            &fetcher(),
            multipart_request(&[
                ("url", Some("link.txt"), b"http://127.0.0.1:1/a.png".as_slice()),
                ("file", Some("a.bin"), b"raw".as_slice()),
            ]),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&bytes[..], b"raw");
    }

    #[tokio::test]
    async fn test_multipart_without_boundary() {
        let err = normalize(&fetcher(), request("multipart/form-data", "garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_json_base64_is_not_validated() {
        let bytes = normalize(
            &fetcher(),
            request("application/json", r#"{"file": "aGVsbG8gd29ybGQ="}"#),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn test_json_file_wins_over_url() {
        let bytes = normalize(
            &fetcher(),
            request(
                "application/json",
                r#"{"url": "http://127.0.0.1:1/a.png", "file": "aGk="}"#,
            ),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(&bytes[..], b"hi");
    }

    #[tokio::test]
    async fn test_json_invalid_base64_is_client_error() {
        let err = normalize(&fetcher(), request("application/json", r#"{"file": "@@not base64@@"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(err.to_string(), "Invalid base64 in 'file'");
    }

    #[tokio::test]
    async fn test_json_missing_keys() {
        let err = normalize(&fetcher(), request("application/json", r#"{"image": "x"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No file or URL provided in JSON");
    }

    #[tokio::test]
    async fn test_json_malformed_bodies() {
        for body in ["{not json", "[1, 2]", r#"{"file": 42}"#, r#"{"url": ["a"]}"#] {
            let err = normalize(&fetcher(), request("application/json", body))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "body: {}", body);
        }
    }

    #[tokio::test]
    async fn test_urlencoded_missing_url() {
        let err = normalize(
            &fetcher(),
            request("application/x-www-form-urlencoded", "file=abc"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "No URL provided in form data");
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let err = normalize(&fetcher(), request("text/plain", "hello"))
            .await
            .unwrap_err();
        match err {
            ApiError::UnsupportedMediaType(ct) => assert_eq!(ct, "text/plain"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(&decode_base64("aGk=").unwrap()[..], b"hi");
        assert_eq!(&decode_base64("aGk").unwrap()[..], b"hi");
        assert_eq!(&decode_base64("aGVs\nbG8=").unwrap()[..], b"hello");
        assert_eq!(&decode_base64("data:image/png;base64,aGk=").unwrap()[..], b"hi");
        assert!(decode_base64("a").is_err());
    }
}
