//! Video temporal aggregation.
//!
//! Reads frames from a `FrameSource`, runs inference on every `sample_rate`-th
//! frame, evaluates compliance per sampled frame, and reduces the stream into a
//! single `VideoReport`.
//!
//! The accumulator has two tiers:
//! - a retained list holding the first `MAX_RETAINED_FRAMES` frame reports, and
//! - running totals updated by every processed frame.
//!
//! The retained cap only bounds the report size; averages and the compliance
//! rate always cover every processed frame.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::compliance::{self, ComplianceVerdict};
use crate::detect::{round_to, Detection, DetectionSummary, DetectorBackend};
use crate::error::PipelineError;
use crate::frame::{CancelToken, FrameSource, StreamInfo};

/// Frame reports kept in a `VideoReport`.
pub const MAX_RETAINED_FRAMES: usize = 50;

pub const DEFAULT_MAX_FRAMES: u64 = 300;

/// What to do when inference fails on a sampled frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceFailurePolicy {
    /// Fail the whole job.
    #[default]
    Abort,
    /// Log the failure, count the frame as failed, and continue. Failed frames
    /// do not consume the frame budget and do not enter the aggregates.
    SkipFrame,
}

impl std::str::FromStr for InferenceFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip_frame" | "skip-frame" => Ok(Self::SkipFrame),
            other => Err(format!("unknown inference failure policy '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VideoJob {
    pub conf_threshold: f64,
    /// Run inference on every Nth frame. At least 1.
    pub sample_rate: u64,
    /// Stop after this many sampled frames. At least 1.
    pub max_frames: u64,
    pub on_inference_error: InferenceFailurePolicy,
}

impl Default for VideoJob {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            sample_rate: 1,
            max_frames: DEFAULT_MAX_FRAMES,
            on_inference_error: InferenceFailurePolicy::Abort,
        }
    }
}

impl VideoJob {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.sample_rate < 1 {
            return Err(PipelineError::input("sample_rate must be at least 1"));
        }
        if self.max_frames < 1 {
            return Err(PipelineError::input("max_frames must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(PipelineError::input(format!(
                "conf_threshold {} outside [0, 1]",
                self.conf_threshold
            )));
        }
        Ok(())
    }
}

/// Result for one sampled frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_number: u64,
    pub timestamp_seconds: f64,
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    pub compliance: ComplianceVerdict,
}

impl FrameReport {
    pub fn is_compliant(&self) -> bool {
        self.compliance.is_compliant
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub total_detections: u64,
    pub avg_person_count: f64,
    pub avg_helmet_count: f64,
    pub avg_vest_count: f64,
    pub compliant_frames: u64,
    pub non_compliant_frames: u64,
    /// Sampled frames dropped under `InferenceFailurePolicy::SkipFrame`.
    pub failed_frames: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    /// Frame count reported by the source; may differ from frames actually read.
    pub total_frames: u64,
    pub processed_frames: u64,
    pub fps: f64,
    pub duration_seconds: f64,
    pub sample_rate: u64,
    /// First `MAX_RETAINED_FRAMES` processed frames, in frame order.
    pub frame_detections: Vec<FrameReport>,
    pub overall_summary: OverallSummary,
    pub compliance_rate: f64,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Default)]
struct RunningTotals {
    processed_frames: u64,
    failed_frames: u64,
    total_detections: u64,
    persons: u64,
    helmets: u64,
    vests: u64,
    compliant_frames: u64,
    non_compliant_frames: u64,
}

impl RunningTotals {
    fn record(&mut self, report: &FrameReport) {
        self.processed_frames += 1;
        self.total_detections += report.detections.len() as u64;
        self.persons += u64::from(report.summary.person);
        self.helmets += u64::from(report.summary.helmet);
        self.vests += u64::from(report.summary.safety_vest);
        if report.is_compliant() {
            self.compliant_frames += 1;
        } else {
            self.non_compliant_frames += 1;
        }
    }

    fn mean(&self, sum: u64) -> f64 {
        if self.processed_frames == 0 {
            0.0
        } else {
            round_to(sum as f64 / self.processed_frames as f64, 2)
        }
    }

    fn compliance_rate(&self) -> f64 {
        if self.processed_frames == 0 {
            0.0
        } else {
            round_to(
                self.compliant_frames as f64 / self.processed_frames as f64 * 100.0,
                2,
            )
        }
    }

    fn summary(&self) -> OverallSummary {
        OverallSummary {
            total_detections: self.total_detections,
            avg_person_count: self.mean(self.persons),
            avg_helmet_count: self.mean(self.helmets),
            avg_vest_count: self.mean(self.vests),
            compliant_frames: self.compliant_frames,
            non_compliant_frames: self.non_compliant_frames,
            failed_frames: self.failed_frames,
        }
    }
}

/// Bounded retained list plus unbounded running totals.
#[derive(Debug, Default)]
struct FrameAccumulator {
    retained: Vec<FrameReport>,
    totals: RunningTotals,
}

impl FrameAccumulator {
    fn push(&mut self, report: FrameReport) {
        self.totals.record(&report);
        if self.retained.len() < MAX_RETAINED_FRAMES {
            self.retained.push(report);
        }
    }

    fn finish(self, info: StreamInfo, sample_rate: u64, started: Instant) -> VideoReport {
        VideoReport {
            total_frames: info.total_frames,
            processed_frames: self.totals.processed_frames,
            fps: info.fps,
            duration_seconds: round_to(info.duration_seconds(), 2),
            sample_rate,
            overall_summary: self.totals.summary(),
            compliance_rate: self.totals.compliance_rate(),
            frame_detections: self.retained,
            processing_time_seconds: round_to(started.elapsed().as_secs_f64(), 2),
        }
    }
}

fn frame_timestamp(frame_number: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        round_to(frame_number as f64 / fps, 2)
    } else {
        0.0
    }
}

/// Process a video stream into a `VideoReport`.
///
/// Frame numbers count every frame read, sampled or not, so timestamps stay on
/// the video's own timeline. The frame budget counts sampled frames only.
/// On any error no report is produced.
pub fn process_stream(
    source: &mut dyn FrameSource,
    backend: &mut dyn DetectorBackend,
    job: &VideoJob,
    cancel: &CancelToken,
) -> Result<VideoReport, PipelineError> {
    job.validate()?;
    let started = Instant::now();

    let info = source
        .connect()
        .map_err(|e| PipelineError::input(format!("frame source could not be opened: {:#}", e)))?;
    log::info!(
        "video job started: backend={}, total_frames={}, fps={}, sample_rate={}, max_frames={}",
        backend.name(),
        info.total_frames,
        info.fps,
        job.sample_rate,
        job.max_frames
    );

    let mut acc = FrameAccumulator::default();
    let mut frame_number: u64 = 0;

    while acc.totals.processed_frames < job.max_frames {
        if cancel.is_cancelled() {
            log::warn!("video job cancelled at frame {}", frame_number);
            return Err(PipelineError::Cancelled { frame_number });
        }

        let frame = source
            .next_frame()
            .map_err(|e| PipelineError::collaborator("frame read", e))?;
        let Some(frame) = frame else {
            break;
        };

        if frame_number % job.sample_rate == 0 {
            match backend.detect(&frame, job.conf_threshold) {
                Ok(detections) => {
                    let summary = DetectionSummary::from_detections(&detections);
                    let compliance = compliance::evaluate(&detections);
                    log::debug!(
                        "frame {}: {} detections, compliant={}",
                        frame_number,
                        detections.len(),
                        compliance.is_compliant
                    );
                    acc.push(FrameReport {
                        frame_number,
                        timestamp_seconds: frame_timestamp(frame_number, info.fps),
                        detections,
                        summary,
                        compliance,
                    });
                }
                Err(e) => match job.on_inference_error {
                    InferenceFailurePolicy::Abort => {
                        return Err(PipelineError::collaborator("inference", e));
                    }
                    InferenceFailurePolicy::SkipFrame => {
                        log::warn!("frame {}: inference failed, skipping: {:#}", frame_number, e);
                        acc.totals.failed_frames += 1;
                    }
                },
            }
        }

        frame_number += 1;
    }

    let report = acc.finish(info, job.sample_rate, started);
    log::info!(
        "video job finished: processed={}, compliance_rate={}%, elapsed={}s",
        report.processed_frames,
        report.compliance_rate,
        report.processing_time_seconds
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectionClass, FnBackend, ReplayBackend, StubBackend};
    use crate::frame::RawFrame;
    use crate::ingest::MemorySource;
    use anyhow::anyhow;

    fn job(sample_rate: u64, max_frames: u64) -> VideoJob {
        VideoJob {
            sample_rate,
            max_frames,
            ..VideoJob::default()
        }
    }

    fn person_only_payload() -> Vec<u8> {
        br#"[{"class_name": "person", "confidence": 0.9,
              "bounding_box": {"x1": 0.0, "y1": 0.0, "x2": 40.0, "y2": 100.0}}]"#
            .to_vec()
    }

    fn compliant_payload() -> Vec<u8> {
        br#"[{"class_name": "person", "confidence": 0.9,
              "bounding_box": {"x1": 0.0, "y1": 0.0, "x2": 40.0, "y2": 100.0}},
             {"class_name": "helmet", "confidence": 0.8,
              "bounding_box": {"x1": 5.0, "y1": 0.0, "x2": 35.0, "y2": 15.0}},
             {"class_name": "safety-vest", "confidence": 0.8,
              "bounding_box": {"x1": 0.0, "y1": 30.0, "x2": 40.0, "y2": 70.0}}]"#
            .to_vec()
    }

    #[test]
    fn sample_rate_selects_every_nth_frame() -> anyhow::Result<()> {
        let mut source = MemorySource::synthetic(10, 10.0);
        let mut backend = StubBackend::new();
        let report = process_stream(&mut source, &mut backend, &job(2, 100), &CancelToken::new())?;

        assert_eq!(report.processed_frames, 5);
        let numbers: Vec<u64> = report.frame_detections.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 2, 4, 6, 8]);
        let stamps: Vec<f64> = report
            .frame_detections
            .iter()
            .map(|f| f.timestamp_seconds)
            .collect();
        assert_eq!(stamps, vec![0.0, 0.2, 0.4, 0.6, 0.8]);
        assert_eq!(backend.frames_seen(), 5);
        Ok(())
    }

    #[test]
    fn frame_budget_stops_after_max_sampled_frames() -> anyhow::Result<()> {
        let mut source = MemorySource::synthetic(100, 25.0);
        let mut backend = StubBackend::new();
        let report = process_stream(&mut source, &mut backend, &job(1, 3), &CancelToken::new())?;

        assert_eq!(report.processed_frames, 3);
        assert_eq!(report.total_frames, 100);
        assert_eq!(source.frames_read(), 3);
        assert_eq!(report.duration_seconds, 4.0);
        Ok(())
    }

    #[test]
    fn skipped_frames_do_not_consume_budget() -> anyhow::Result<()> {
        let mut source = MemorySource::synthetic(20, 10.0);
        let mut backend = StubBackend::new();
        let report = process_stream(&mut source, &mut backend, &job(3, 4), &CancelToken::new())?;
        let numbers: Vec<u64> = report.frame_detections.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 3, 6, 9]);
        Ok(())
    }

    #[test]
    fn retained_frames_are_capped_but_aggregates_cover_all() -> anyhow::Result<()> {
        let payloads: Vec<Vec<u8>> = (0..80)
            .map(|i| if i < 60 { compliant_payload() } else { person_only_payload() })
            .collect();
        let mut source = MemorySource::new(payloads, 0.0);
        let mut backend = ReplayBackend::new();
        let report = process_stream(&mut source, &mut backend, &job(1, 1000), &CancelToken::new())?;

        assert_eq!(report.processed_frames, 80);
        assert_eq!(report.frame_detections.len(), MAX_RETAINED_FRAMES);
        assert_eq!(report.frame_detections.last().map(|f| f.frame_number), Some(49));
        assert_eq!(report.overall_summary.compliant_frames, 60);
        assert_eq!(report.overall_summary.non_compliant_frames, 20);
        assert_eq!(report.compliance_rate, 75.0);
        assert_eq!(report.overall_summary.total_detections, 60 * 3 + 20);
        assert_eq!(report.overall_summary.avg_person_count, 1.0);
        assert_eq!(report.overall_summary.avg_helmet_count, 0.75);
        assert_eq!(report.overall_summary.avg_vest_count, 0.75);
        assert!(report.frame_detections.iter().all(|f| f.timestamp_seconds == 0.0));
        Ok(())
    }

    #[test]
    fn empty_stream_yields_zero_defaults() -> anyhow::Result<()> {
        let mut source = MemorySource::new(Vec::new(), 0.0);
        let mut backend = StubBackend::new();
        let report = process_stream(&mut source, &mut backend, &job(1, 10), &CancelToken::new())?;
        assert_eq!(report.processed_frames, 0);
        assert_eq!(report.compliance_rate, 0.0);
        assert_eq!(report.overall_summary, OverallSummary::default());
        assert_eq!(report.duration_seconds, 0.0);
        Ok(())
    }

    #[test]
    fn invalid_job_parameters_are_input_errors() {
        let mut source = MemorySource::synthetic(1, 1.0);
        let mut backend = StubBackend::new();
        let err = process_stream(&mut source, &mut backend, &job(0, 1), &CancelToken::new())
            .unwrap_err();
        assert!(err.is_input());
        let err = process_stream(&mut source, &mut backend, &job(1, 0), &CancelToken::new())
            .unwrap_err();
        assert!(err.is_input());
    }

    struct UnopenableSource;

    impl FrameSource for UnopenableSource {
        fn connect(&mut self) -> anyhow::Result<StreamInfo> {
            Err(anyhow!("no such file"))
        }

        fn next_frame(&mut self) -> anyhow::Result<Option<RawFrame>> {
            Ok(None)
        }
    }

    #[test]
    fn unopenable_source_is_fatal_input_error() {
        let mut backend = StubBackend::new();
        let err = process_stream(
            &mut UnopenableSource,
            &mut backend,
            &VideoJob::default(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(err.is_input());
        assert!(err.to_string().contains("no such file"));
    }

    fn flaky_backend() -> impl DetectorBackend {
        let mut calls = 0u32;
        FnBackend::new("flaky", move |_frame: &RawFrame, _conf: f64| {
            calls += 1;
            if calls == 2 {
                Err(anyhow!("accelerator reset"))
            } else {
                Ok(vec![Detection::new(
                    DetectionClass::Person,
                    0.9,
                    BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                )])
            }
        })
    }

    #[test]
    fn inference_failure_aborts_by_default() {
        let mut source = MemorySource::synthetic(5, 10.0);
        let mut backend = flaky_backend();
        let err = process_stream(&mut source, &mut backend, &job(1, 10), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Collaborator { stage: "inference", .. }));
    }

    #[test]
    fn skip_policy_drops_failed_frame_and_continues() -> anyhow::Result<()> {
        let mut source = MemorySource::synthetic(5, 10.0);
        let mut backend = flaky_backend();
        let job = VideoJob {
            on_inference_error: InferenceFailurePolicy::SkipFrame,
            ..job(1, 10)
        };
        let report = process_stream(&mut source, &mut backend, &job, &CancelToken::new())?;
        assert_eq!(report.processed_frames, 4);
        assert_eq!(report.overall_summary.failed_frames, 1);
        let numbers: Vec<u64> = report.frame_detections.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 2, 3, 4]);
        assert_eq!(report.compliance_rate, 0.0);
        Ok(())
    }

    #[test]
    fn cancelled_job_returns_no_report() {
        let mut source = MemorySource::synthetic(5, 10.0);
        let mut backend = StubBackend::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = process_stream(&mut source, &mut backend, &job(1, 10), &cancel).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { frame_number: 0 }));
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "abort".parse::<InferenceFailurePolicy>(),
            Ok(InferenceFailurePolicy::Abort)
        );
        assert_eq!(
            "Skip".parse::<InferenceFailurePolicy>(),
            Ok(InferenceFailurePolicy::SkipFrame)
        );
        assert!("retry".parse::<InferenceFailurePolicy>().is_err());
    }
}
