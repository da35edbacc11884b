use anyhow::Result;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use ppe_compliance::{
    analytics::{self, AnalyticsWindow},
    detect::ReplayBackend,
    generate_request_id,
    image::process_image,
    ingest::image_from_bytes,
    storage::{ENDPOINT_CHECK_COMPLIANCE, ENDPOINT_PREDICT},
    DetectionRecord, InMemoryRecordStore, RecordStore, SqliteRecordStore,
};

const COMPLIANT: &str = r#"{"width": 1920, "height": 1080, "detections": [
    {"class_name": "person", "confidence": 0.91, "bounding_box": {"x1": 100, "y1": 100, "x2": 200, "y2": 400}},
    {"class_name": "helmet", "confidence": 0.87, "bounding_box": {"x1": 120, "y1": 80, "x2": 180, "y2": 120}},
    {"class_name": "safety-vest", "confidence": 0.8, "bounding_box": {"x1": 100, "y1": 180, "x2": 200, "y2": 300}}
]}"#;

const NO_VEST: &str = r#"{"width": 1920, "height": 1080, "detections": [
    {"class_name": "person", "confidence": 0.9, "bounding_box": {"x1": 100, "y1": 100, "x2": 200, "y2": 400}},
    {"class_name": "helmet", "confidence": 0.85, "bounding_box": {"x1": 120, "y1": 80, "x2": 180, "y2": 120}}
]}"#;

fn record(payload: &str, endpoint: &str, check: bool) -> Result<DetectionRecord> {
    let input = image_from_bytes("site.json", payload.as_bytes().to_vec())?;
    let analysis = process_image(
        &mut ReplayBackend::new(),
        &input.frame,
        &input.filename,
        0.25,
        check,
    )?;
    Ok(DetectionRecord::from_analysis(
        &generate_request_id(),
        endpoint,
        0.25,
        &analysis,
    ))
}

fn populate(store: &mut dyn RecordStore) -> Result<()> {
    store.append_detection(&record(COMPLIANT, ENDPOINT_CHECK_COMPLIANCE, true)?)?;
    store.append_detection(&record(NO_VEST, ENDPOINT_CHECK_COMPLIANCE, true)?)?;
    store.append_detection(&record(NO_VEST, ENDPOINT_CHECK_COMPLIANCE, true)?)?;
    store.append_detection(&record(COMPLIANT, ENDPOINT_PREDICT, false)?)?;

    let mut stale = record(NO_VEST, ENDPOINT_CHECK_COMPLIANCE, true)?;
    stale.timestamp = Utc::now() - Duration::days(10);
    store.append_detection(&stale)?;
    Ok(())
}

fn check_rollups(store: &dyn RecordStore) -> Result<()> {
    let window = AnalyticsWindow::new(7, None)?;
    let report = analytics::compute(store, &window)?;

    assert_eq!(report.total_requests, 4);
    assert_eq!(report.summary.total_detections, 3 + 2 + 2 + 3);
    assert_eq!(report.summary.total_persons, 4);
    assert_eq!(report.summary.total_vests, 2);
    assert_eq!(report.summary.avg_detections_per_request, 2.5);
    assert_eq!(report.compliance_statistics.total_checks, 3);
    assert_eq!(report.compliance_statistics.compliant, 1);
    assert_eq!(report.compliance_statistics.non_compliant, 2);
    assert_eq!(report.compliance_statistics.compliance_rate_percent, 33.33);
    assert_eq!(report.top_violations.len(), 1);
    assert_eq!(report.top_violations[0].violation, "1 PPE violation(s) detected");
    assert_eq!(report.top_violations[0].count, 2);
    let trend_requests: u64 = report.detection_trends.iter().map(|d| d.requests).sum();
    assert_eq!(trend_requests, 4);
    assert!(report.performance_metrics.min_processing_time_ms
        <= report.performance_metrics.max_processing_time_ms);

    let wide = analytics::compute(store, &AnalyticsWindow::new(30, None)?)?;
    assert_eq!(wide.total_requests, 5);
    assert_eq!(wide.top_violations[0].count, 3);

    let predict_only = analytics::compute(
        store,
        &AnalyticsWindow::new(7, Some(ENDPOINT_PREDICT.to_string()))?,
    )?;
    assert_eq!(predict_only.total_requests, 1);
    assert_eq!(predict_only.compliance_statistics.total_checks, 0);
    assert_eq!(predict_only.compliance_statistics.compliance_rate_percent, 0.0);
    assert!(predict_only.top_violations.is_empty());
    Ok(())
}

#[test]
fn sqlite_store_rollup_end_to_end() -> Result<()> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("ppe.db").display().to_string();
    let mut store = SqliteRecordStore::open(&db_path)?;
    populate(&mut store)?;
    check_rollups(&store)?;

    let recent = store.recent_detections(2, Some(ENDPOINT_CHECK_COMPLIANCE))?;
    assert_eq!(recent.len(), 2);
    assert!(recent[0].timestamp >= recent[1].timestamp);
    assert_eq!(recent[0].detections.len(), 2);
    Ok(())
}

#[test]
fn in_memory_store_rollup_matches() -> Result<()> {
    let mut store = InMemoryRecordStore::new();
    populate(&mut store)?;
    check_rollups(&store)
}

#[test]
fn empty_store_rolls_up_to_zero_defaults() -> Result<()> {
    let store = SqliteRecordStore::open(":memory:")?;
    let report = analytics::compute(&store, &AnalyticsWindow::new(1, None)?)?;
    assert_eq!(report.total_requests, 0);
    assert_eq!(report.summary.avg_detections_per_request, 0.0);
    assert_eq!(report.performance_metrics.max_processing_time_ms, 0.0);
    assert!(report.detection_trends.is_empty());
    assert_eq!(report.date_range.days, 1);
    Ok(())
}

#[test]
fn window_outside_range_is_rejected() {
    assert!(AnalyticsWindow::new(0, None).is_err());
    assert!(AnalyticsWindow::new(400, None).is_err());
}
