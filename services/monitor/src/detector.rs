//! Detection adapter around an external object-detection capability.
//!
//! The model itself is opaque: given one frame, it returns labelled boxes.
//! The adapter bounds each call with a timeout and applies the class and
//! confidence filters the session relies on.

use crate::config::DetectorConfig;
use crate::frame_relay::Frame;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Errors that can occur while running detection.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detection request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Detection service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid detection response: {0}")]
    Decode(String),

    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// One detected object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
}

/// The external detection capability.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in one frame, optionally restricted to `classes`.
    async fn detect(&self, frame: &Frame, classes: &[String]) -> Result<Vec<Detection>, DetectorError>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Detector served over HTTP: raw frame in, JSON detections out.
pub struct HttpDetector {
    client: reqwest::Client,
    endpoint: String,
    pixel_format: String,
}

impl HttpDetector {
    pub fn new(config: &DetectorConfig, pixel_format: &str) -> Result<Self, DetectorError> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            pixel_format: pixel_format.to_string(),
        })
    }
}

#[async_trait]
impl ObjectDetector for HttpDetector {
    async fn detect(&self, frame: &Frame, classes: &[String]) -> Result<Vec<Detection>, DetectorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("width", frame.width.to_string()),
                ("height", frame.height.to_string()),
                ("format", self.pixel_format.clone()),
                ("classes", classes.join(",")),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(Bytes::from(frame.data.clone()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: DetectResponse =
            serde_json::from_slice(&bytes).map_err(|e| DetectorError::Decode(e.to_string()))?;
        Ok(parsed.detections)
    }
}

/// Wraps a detector with a timeout and class/confidence filtering.
#[derive(Clone)]
pub struct DetectionAdapter {
    detector: Arc<dyn ObjectDetector>,
    classes: Vec<String>,
    min_confidence: f32,
    timeout: Duration,
}

impl DetectionAdapter {
    pub fn new(detector: Arc<dyn ObjectDetector>, config: &DetectorConfig) -> Self {
        Self {
            detector,
            classes: config.classes.clone(),
            min_confidence: config.min_confidence,
            timeout: config.timeout(),
        }
    }

    /// Run detection and keep only wanted classes at or above the confidence floor.
    pub async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let raw = tokio::time::timeout(self.timeout, self.detector.detect(frame, &self.classes))
            .await
            .map_err(|_| DetectorError::Timeout(self.timeout))??;

        let total = raw.len();
        let kept: Vec<Detection> = raw.into_iter().filter(|d| self.accepts(d)).collect();
        trace!(total, kept = kept.len(), "Detections filtered");
        Ok(kept)
    }

    fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence >= self.min_confidence
            && (self.classes.is_empty()
                || self
                    .classes
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&detection.label)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a scripted list of detections on every call.
    #[derive(Default)]
    pub struct ScriptedDetector {
        pub detections: Mutex<Vec<Detection>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedDetector {
        pub fn returning(detections: Vec<Detection>) -> Self {
            Self {
                detections: Mutex::new(detections),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectDetector for ScriptedDetector {
        async fn detect(&self, _frame: &Frame, _classes: &[String]) -> Result<Vec<Detection>, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.lock().clone())
        }
    }

    pub fn detection(label: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bounding_box: BoundingBox::from(bbox),
        }
    }
}
