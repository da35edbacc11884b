//! Replay backend.
//!
//! Frames read from `FileSource` replay files and `load_image_file` carry the
//! detections an external model already emitted for them, as JSON. This
//! backend decodes that payload, validates it, and applies the confidence
//! threshold, so the core can be driven end to end without a model in-process.
//!
//! Accepted payloads:
//! - `{"detections": [ ... ]}` (extra keys such as `width`/`height` are ignored)
//! - `[ ... ]`

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionClass};
use crate::frame::RawFrame;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayPayload {
    Wrapped { detections: Vec<ReplayDetection> },
    Bare(Vec<ReplayDetection>),
}

#[derive(Debug, Deserialize)]
struct ReplayDetection {
    class_id: Option<u32>,
    class_name: String,
    confidence: f64,
    bounding_box: BoundingBox,
}

impl ReplayDetection {
    fn into_detection(self) -> Detection {
        let class_id = self
            .class_id
            .or_else(|| DetectionClass::from_label(&self.class_name).map(|c| c.class_id()))
            .unwrap_or(u32::MAX);
        Detection {
            class_id,
            class_name: self.class_name,
            confidence: self.confidence,
            bounding_box: self.bounding_box,
        }
    }
}

/// Decode a replay payload without thresholding.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<Detection>> {
    Ok(decode_raw(payload)?
        .into_iter()
        .map(Detection::rounded)
        .collect())
}

/// Validated detections at the producer's full precision.
fn decode_raw(payload: &[u8]) -> Result<Vec<Detection>> {
    let parsed: ReplayPayload = serde_json::from_slice(payload)
        .map_err(|e| anyhow!("invalid detection payload: {}", e))?;
    let raw = match parsed {
        ReplayPayload::Wrapped { detections } => detections,
        ReplayPayload::Bare(detections) => detections,
    };
    let mut out = Vec::with_capacity(raw.len());
    for (index, item) in raw.into_iter().enumerate() {
        let detection = item.into_detection();
        detection
            .validate()
            .map_err(|e| anyhow!("detection #{}: {}", index + 1, e))?;
        out.push(detection);
    }
    Ok(out)
}

#[derive(Debug, Default)]
pub struct ReplayBackend {
    frames_decoded: u64,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, frame: &RawFrame, conf_threshold: f64) -> Result<Vec<Detection>> {
        // threshold on raw confidence, round afterwards
        let detections = decode_raw(frame.payload())?
            .into_iter()
            .filter(|d| d.confidence >= conf_threshold)
            .map(Detection::rounded)
            .collect();
        self.frames_decoded += 1;
        Ok(detections)
    }
}
