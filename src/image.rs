//! Single-image and batch processing.
//!
//! Each image goes through the injected backend once, gets a per-class summary
//! and, on request, a compliance verdict. Persisting the outcome is left to
//! the caller's `RecordStore`.

use serde::Serialize;
use std::time::Instant;

use crate::compliance::{self, ComplianceVerdict};
use crate::detect::{round_to, Detection, DetectionSummary, DetectorBackend};
use crate::error::PipelineError;
use crate::frame::RawFrame;
use crate::generate_request_id;
use crate::ingest::ImageInput;

/// Batches larger than this are rejected outright.
pub const MAX_BATCH_IMAGES: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub size_kb: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageAnalysis {
    pub metadata: ImageMetadata,
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    pub compliance: Option<ComplianceVerdict>,
    pub processing_time_ms: f64,
}

pub fn process_image(
    backend: &mut dyn DetectorBackend,
    frame: &RawFrame,
    filename: &str,
    conf_threshold: f64,
    check_compliance: bool,
) -> Result<ImageAnalysis, PipelineError> {
    if !(0.0..=1.0).contains(&conf_threshold) {
        return Err(PipelineError::input(format!(
            "conf_threshold {} outside [0, 1]",
            conf_threshold
        )));
    }
    let started = Instant::now();

    let detections = backend
        .detect(frame, conf_threshold)
        .map_err(|e| PipelineError::collaborator("inference", e))?;
    let summary = DetectionSummary::from_detections(&detections);
    let compliance = check_compliance.then(|| compliance::evaluate(&detections));

    let metadata = ImageMetadata {
        filename: filename.to_string(),
        width: frame.width,
        height: frame.height,
        size_kb: round_to(frame.byte_len() as f64 / 1024.0, 2),
    };
    log::debug!(
        "{}: {} detections, compliant={:?}",
        filename,
        detections.len(),
        compliance.as_ref().map(|c| c.is_compliant)
    );

    Ok(ImageAnalysis {
        metadata,
        detections,
        summary,
        compliance,
        processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

/// One successfully processed image within a batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchItem {
    pub request_id: String,
    #[serde(flatten)]
    pub analysis: ImageAnalysis,
}

/// One image the batch could not process.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchReport {
    pub request_id: String,
    pub total_images: usize,
    pub processed_images: usize,
    pub failed_images: usize,
    pub results: Vec<BatchItem>,
    pub failures: Vec<BatchFailure>,
    pub total_processing_time_ms: f64,
    pub average_time_per_image_ms: f64,
}

/// Process several images. A failing image is counted and skipped; it does
/// not fail the batch.
pub fn process_batch(
    backend: &mut dyn DetectorBackend,
    inputs: &[ImageInput],
    conf_threshold: f64,
    check_compliance: bool,
) -> Result<BatchReport, PipelineError> {
    if inputs.is_empty() {
        return Err(PipelineError::input("no images provided"));
    }
    if inputs.len() > MAX_BATCH_IMAGES {
        return Err(PipelineError::input(format!(
            "maximum {} images allowed per batch, got {}",
            MAX_BATCH_IMAGES,
            inputs.len()
        )));
    }
    if !(0.0..=1.0).contains(&conf_threshold) {
        return Err(PipelineError::input(format!(
            "conf_threshold {} outside [0, 1]",
            conf_threshold
        )));
    }

    let request_id = generate_request_id();
    let started = Instant::now();
    let mut results = Vec::with_capacity(inputs.len());
    let mut failures = Vec::new();

    for input in inputs {
        match process_image(
            backend,
            &input.frame,
            &input.filename,
            conf_threshold,
            check_compliance,
        ) {
            Ok(analysis) => results.push(BatchItem {
                request_id: generate_request_id(),
                analysis,
            }),
            Err(e) => {
                log::warn!("batch {}: {} failed: {}", request_id, input.filename, e);
                failures.push(BatchFailure {
                    filename: input.filename.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let total_ms = started.elapsed().as_secs_f64() * 1000.0;
    let average = if results.is_empty() {
        0.0
    } else {
        total_ms / results.len() as f64
    };

    Ok(BatchReport {
        request_id,
        total_images: inputs.len(),
        processed_images: results.len(),
        failed_images: failures.len(),
        results,
        failures,
        total_processing_time_ms: round_to(total_ms, 2),
        average_time_per_image_ms: round_to(average, 2),
    })
}
