//! Application constants

use crate::services::vision::Likelihood;

/// Labels that make an image inappropriate when detected with enough confidence.
/// Matched against the lowercased label description.
pub const DENIED_LABELS: &[&str] = &[
    "gun",
    "knife",
    "weapon",
    "nude",
    "pornography",
    "child",
    "firearm",
    "pistol",
    "sword",
    "dagger",
    "assault rifle",
    "machine gun",
    "violence",
    "blood",
    "sexual",
    "explicit",
    "adult",
    "underage",
];

/// SafeSearch likelihood (ordinal 2) at or above which adult, violence or racy flag an image
pub const SAFE_SEARCH_FLAG_THRESHOLD: Likelihood = Likelihood::Unlikely;

/// Minimum confidence for a denied label to count
pub const LABEL_SCORE_THRESHOLD: f32 = 0.5;

/// User-Agent sent when fetching images by URL
pub const FETCH_USER_AGENT: &str = "Mozilla/5.0";

pub const DEFAULT_PORT: u16 = 5000;

/// Image fetch timeout (10 seconds)
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Vision API call timeout (30 seconds)
pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 30;

/// Maximum request body size (20 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com";

/// OAuth scope requested for service-account tokens
pub const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";

pub const APPROPRIATE_MESSAGE: &str = "Image is appropriate for upload.";
pub const INAPPROPRIATE_MESSAGE: &str = "Image is inappropriate and cannot be uploaded.";

pub const SUPPORTED_CONTENT_TYPES: &str =
    "multipart/form-data, application/json, and application/x-www-form-urlencoded";
