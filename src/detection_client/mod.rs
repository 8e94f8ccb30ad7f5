//! DetectionClient - Threat Detector Adapter
//!
//! ## Responsibilities
//!
//! - Upload one sampled frame to the detector
//! - Parse the per-category hit lists
//! - Derive the threat/safe verdict
//!
//! Failures are returned, never retried here: the next detection tick is
//! the retry.

use crate::error::{Error, Result};
use crate::stream_manager::ImageBytes;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Label for entries in the threat log
pub const THREAT_LABEL: &str = "Threat detected";
/// Label for entries in the safe log
pub const SAFE_LABEL: &str = "Safe";

/// Detected category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Knife,
    Gun,
    Mask,
    Emotion,
}

impl ThreatCategory {
    pub const ALL: [ThreatCategory; 4] = [
        ThreatCategory::Knife,
        ThreatCategory::Gun,
        ThreatCategory::Mask,
        ThreatCategory::Emotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::Knife => "knife",
            ThreatCategory::Gun => "gun",
            ThreatCategory::Mask => "mask",
            ThreatCategory::Emotion => "emotion",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detector response (`POST /api/detection/threats/`)
///
/// Absent or null categories mean no detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatResponse {
    #[serde(default)]
    pub knife: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub gun: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub mask: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub emotion: Option<Vec<serde_json::Value>>,
}

impl ThreatResponse {
    /// Hits reported for one category
    pub fn hits(&self, category: ThreatCategory) -> usize {
        let field = match category {
            ThreatCategory::Knife => &self.knife,
            ThreatCategory::Gun => &self.gun,
            ThreatCategory::Mask => &self.mask,
            ThreatCategory::Emotion => &self.emotion,
        };
        field.as_ref().map_or(0, Vec::len)
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::from_categories(
            ThreatCategory::ALL
                .into_iter()
                .filter(|c| self.hits(*c) > 0)
                .collect(),
        )
    }
}

/// Classification of one sampled frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub is_threat: bool,
    pub categories: Vec<ThreatCategory>,
}

impl Verdict {
    /// Any detected category makes the frame a threat
    pub fn from_categories(categories: Vec<ThreatCategory>) -> Self {
        Self {
            is_threat: !categories.is_empty(),
            categories,
        }
    }

    pub fn safe() -> Self {
        Self::from_categories(Vec::new())
    }

    pub fn label(&self) -> &'static str {
        if self.is_threat {
            THREAT_LABEL
        } else {
            SAFE_LABEL
        }
    }
}

/// Remote threat detector
#[async_trait]
pub trait Detector: Send + Sync {
    /// Classify one frame; transport/server problems are `DetectionFailed`
    async fn submit(&self, image: ImageBytes) -> Result<Verdict>;
}

/// reqwest-backed detector client
pub struct DetectionClient {
    client: reqwest::Client,
    base_url: String,
}

impl DetectionClient {
    /// Create new detection client with custom timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Detector for DetectionClient {
    async fn submit(&self, image: ImageBytes) -> Result<Verdict> {
        let url = format!("{}/api/detection/threats/", self.base_url);
        let size = image.len();

        let part = Part::bytes(image)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::Internal(format!("Invalid image part: {}", e)))?;
        let form = Form::new().part("image", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::DetectionFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::DetectionFailed(format!("{} - {}", status, body.trim())));
        }

        let result: ThreatResponse = resp
            .json()
            .await
            .map_err(|e| Error::DetectionFailed(format!("Invalid detector response: {}", e)))?;

        let verdict = result.verdict();
        tracing::debug!(
            size = size,
            is_threat = verdict.is_threat,
            categories = ?verdict.categories,
            "Detection completed"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ThreatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_all_empty_is_safe() {
        let verdict = parse(r#"{"knife":[],"gun":[],"mask":[],"emotion":[]}"#).verdict();
        assert!(!verdict.is_threat);
        assert_eq!(verdict.label(), SAFE_LABEL);
    }

    #[test]
    fn test_single_gun_hit_is_threat() {
        let verdict = parse(r#"{"knife":[],"gun":["g1"],"mask":[],"emotion":[]}"#).verdict();
        assert!(verdict.is_threat);
        assert_eq!(verdict.categories, vec![ThreatCategory::Gun]);
        assert_eq!(verdict.label(), THREAT_LABEL);
    }

    #[test]
    fn test_missing_and_null_categories_default_empty() {
        let verdict = parse(r#"{"knife":[],"gun":[],"total_detections":[]}"#).verdict();
        assert!(!verdict.is_threat);

        let verdict = parse(r#"{"knife":null,"emotion":[{"label":"angry"}]}"#).verdict();
        assert_eq!(verdict.categories, vec![ThreatCategory::Emotion]);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let result: std::result::Result<ThreatResponse, _> =
            serde_json::from_str(r#"{"knife":"yes"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_prediction_objects_count_as_hits() {
        let resp = parse(
            r#"{"knife":[{"class":"knife","confidence":0.91,"x":10,"y":20}],"gun":[]}"#,
        );
        assert_eq!(resp.hits(ThreatCategory::Knife), 1);
        assert_eq!(resp.hits(ThreatCategory::Mask), 0);
        assert!(resp.verdict().is_threat);
    }
}
