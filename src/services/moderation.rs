//! Moderation policy - turns SafeSearch and label detection into a verdict.
//!
//! An image is inappropriate when SafeSearch rates adult, violence or racy at or
//! above `SAFE_SEARCH_FLAG_THRESHOLD`, or when any label in `DENIED_LABELS` is
//! detected with a score of at least `LABEL_SCORE_THRESHOLD`. Spoof and medical
//! scores are fetched but not used. A failed detection call is an error, never
//! an "inappropriate" verdict.

use thiserror::Error;

use crate::constants::{
    APPROPRIATE_MESSAGE, DENIED_LABELS, INAPPROPRIATE_MESSAGE, LABEL_SCORE_THRESHOLD,
    SAFE_SEARCH_FLAG_THRESHOLD,
};
use crate::services::vision::{LabelAnnotation, SafetyScores, VisionClient, VisionError};

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("safe search detection failed: {0}")]
    SafeSearch(VisionError),
    #[error("label detection failed: {0}")]
    LabelDetection(VisionError),
}

impl ModerationError {
    /// Which detection failed, without upstream detail
    pub fn stage(&self) -> &'static str {
        match self {
            ModerationError::SafeSearch(_) => "safe search detection failed",
            ModerationError::LabelDetection(_) => "label detection failed",
        }
    }
}

/// Outcome of moderating one image, with the evidence behind it
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationVerdict {
    pub is_appropriate: bool,
    pub safety: SafetyScores,
    pub safe_search_flagged: bool,
    pub denied_label: Option<LabelAnnotation>,
}

impl ModerationVerdict {
    pub fn message(&self) -> &'static str {
        if self.is_appropriate {
            APPROPRIATE_MESSAGE
        } else {
            INAPPROPRIATE_MESSAGE
        }
    }
}

pub fn safe_search_flagged(scores: &SafetyScores) -> bool {
    scores.adult >= SAFE_SEARCH_FLAG_THRESHOLD
        || scores.violence >= SAFE_SEARCH_FLAG_THRESHOLD
        || scores.racy >= SAFE_SEARCH_FLAG_THRESHOLD
}

/// First label that is both denied and confident enough
pub fn find_denied_label(labels: &[LabelAnnotation]) -> Option<&LabelAnnotation> {
    labels.iter().find(|label| {
        let description = label.description.to_lowercase();
        DENIED_LABELS.contains(&description.as_str()) && label.score >= LABEL_SCORE_THRESHOLD
    })
}

pub async fn evaluate(
    vision: &dyn VisionClient,
    image: &[u8],
) -> Result<ModerationVerdict, ModerationError> {
    let safety = vision
        .classify_safety(image)
        .await
        .map_err(ModerationError::SafeSearch)?;

    let safe_search_flagged = safe_search_flagged(&safety);
    if safe_search_flagged {
        tracing::info!(
            adult = safety.adult.ordinal(),
            violence = safety.violence.ordinal(),
            racy = safety.racy.ordinal(),
            "SafeSearch flagged image"
        );
    }

    let labels = vision
        .detect_labels(image)
        .await
        .map_err(ModerationError::LabelDetection)?;

    let denied_label = find_denied_label(&labels).cloned();
    if let Some(label) = &denied_label {
        tracing::info!(
            description = %label.description,
            score = label.score,
            "Inappropriate label detected"
        );
    }

    Ok(ModerationVerdict {
        is_appropriate: !(safe_search_flagged || denied_label.is_some()),
        safety,
        safe_search_flagged,
        denied_label,
    })
}
