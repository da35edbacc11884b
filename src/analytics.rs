//! Analytics rollups over stored detection records.
//!
//! A rollup is recomputed from the window's records on every call; nothing is
//! cached or written. Filtering by time and endpoint is the store's job, the
//! engine only aggregates what it is handed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::detect::round_to;
use crate::error::PipelineError;
use crate::storage::{DetectionRecord, RecordStore};

pub const TOP_VIOLATIONS_LIMIT: usize = 5;
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Query parameters for a rollup: `[start, end)` plus an optional endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyticsWindow {
    pub days: u32,
    pub endpoint: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalyticsWindow {
    /// Window ending now.
    pub fn new(days: u32, endpoint: Option<String>) -> Result<Self, PipelineError> {
        Self::at(Utc::now(), days, endpoint)
    }

    /// Window ending at `end`.
    pub fn at(
        end: DateTime<Utc>,
        days: u32,
        endpoint: Option<String>,
    ) -> Result<Self, PipelineError> {
        if days < 1 || days > MAX_WINDOW_DAYS {
            return Err(PipelineError::input(format!(
                "days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS, days
            )));
        }
        let endpoint = endpoint.filter(|e| !e.trim().is_empty());
        Ok(Self {
            days,
            endpoint,
            start: end - Duration::days(i64::from(days)),
            end,
        })
    }

    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.start.to_rfc3339(),
            end: self.end.to_rfc3339(),
            days: self.days,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
    pub days: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_detections: u64,
    pub total_persons: u64,
    pub total_helmets: u64,
    pub total_vests: u64,
    pub avg_detections_per_request: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ComplianceStats {
    pub total_checks: u64,
    pub compliant: u64,
    pub non_compliant: u64,
    pub compliance_rate_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViolationCount {
    pub violation: String,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DailyTrend {
    pub date: String,
    pub requests: u64,
    pub detections: u64,
    pub persons: u64,
    pub helmets: u64,
    pub vests: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub avg_processing_time_ms: f64,
    pub min_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub total_requests: u64,
    pub date_range: DateRange,
    pub summary: SummaryStats,
    pub compliance_statistics: ComplianceStats,
    pub top_violations: Vec<ViolationCount>,
    pub detection_trends: Vec<DailyTrend>,
    pub performance_metrics: PerformanceStats,
}

impl AnalyticsReport {
    fn empty(window: &AnalyticsWindow) -> Self {
        Self {
            total_requests: 0,
            date_range: window.date_range(),
            summary: SummaryStats::default(),
            compliance_statistics: ComplianceStats::default(),
            top_violations: Vec::new(),
            detection_trends: Vec::new(),
            performance_metrics: PerformanceStats::default(),
        }
    }
}

/// Aggregate a window's records into a report.
pub fn rollup(records: &[DetectionRecord], window: &AnalyticsWindow) -> AnalyticsReport {
    if records.is_empty() {
        return AnalyticsReport::empty(window);
    }

    let total_requests = records.len() as u64;
    let mut summary = SummaryStats::default();
    let mut compliance = ComplianceStats::default();
    let mut time_sum = 0.0;
    let mut time_min = f64::INFINITY;
    let mut time_max = f64::NEG_INFINITY;
    let mut violation_index: HashMap<&str, usize> = HashMap::new();
    let mut violations: Vec<ViolationCount> = Vec::new();
    let mut daily: BTreeMap<String, DailyTrend> = BTreeMap::new();

    for record in records {
        summary.total_detections += u64::from(record.total_detections);
        summary.total_persons += u64::from(record.person_count);
        summary.total_helmets += u64::from(record.helmet_count);
        summary.total_vests += u64::from(record.vest_count);

        if let Some(is_compliant) = record.is_compliant {
            compliance.total_checks += 1;
            if is_compliant {
                compliance.compliant += 1;
            }
        }

        time_sum += record.processing_time_ms;
        time_min = time_min.min(record.processing_time_ms);
        time_max = time_max.max(record.processing_time_ms);

        if record.is_compliant == Some(false) {
            if let Some(message) = record.compliance_message.as_deref().filter(|m| !m.is_empty()) {
                match violation_index.get(message) {
                    Some(&i) => violations[i].count += 1,
                    None => {
                        violation_index.insert(message, violations.len());
                        violations.push(ViolationCount {
                            violation: message.to_string(),
                            count: 1,
                        });
                    }
                }
            }
        }

        let date = record.timestamp.date_naive().format("%Y-%m-%d").to_string();
        let bucket = daily.entry(date.clone()).or_insert_with(|| DailyTrend {
            date,
            ..DailyTrend::default()
        });
        bucket.requests += 1;
        bucket.detections += u64::from(record.total_detections);
        bucket.persons += u64::from(record.person_count);
        bucket.helmets += u64::from(record.helmet_count);
        bucket.vests += u64::from(record.vest_count);
    }

    summary.avg_detections_per_request =
        round_to(summary.total_detections as f64 / total_requests as f64, 2);

    compliance.non_compliant = compliance.total_checks - compliance.compliant;
    compliance.compliance_rate_percent = if compliance.total_checks == 0 {
        0.0
    } else {
        round_to(
            compliance.compliant as f64 / compliance.total_checks as f64 * 100.0,
            2,
        )
    };

    // stable: ties keep first-seen order
    violations.sort_by(|a, b| b.count.cmp(&a.count));
    violations.truncate(TOP_VIOLATIONS_LIMIT);

    AnalyticsReport {
        total_requests,
        date_range: window.date_range(),
        summary,
        compliance_statistics: compliance,
        top_violations: violations,
        detection_trends: daily.into_values().collect(),
        performance_metrics: PerformanceStats {
            avg_processing_time_ms: round_to(time_sum / total_requests as f64, 2),
            min_processing_time_ms: round_to(time_min, 2),
            max_processing_time_ms: round_to(time_max, 2),
        },
    }
}

/// Query the store for the window and roll the records up.
pub fn compute(
    store: &dyn RecordStore,
    window: &AnalyticsWindow,
) -> Result<AnalyticsReport, PipelineError> {
    let records = store
        .detections_since(window.start, window.endpoint.as_deref())
        .map_err(|e| PipelineError::collaborator("record query", e))?;
    log::debug!(
        "analytics window {}..{} ({} records)",
        window.start,
        window.end,
        records.len()
    );
    Ok(rollup(&records, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 18, 0, 0).unwrap()
    }

    fn window() -> AnalyticsWindow {
        AnalyticsWindow::at(end(), 7, None).expect("valid window")
    }

    fn record(
        id: usize,
        at: DateTime<Utc>,
        detections: u32,
        compliant: Option<bool>,
        message: Option<&str>,
        time_ms: f64,
    ) -> DetectionRecord {
        DetectionRecord {
            request_id: format!("req_{:012}", id),
            filename: "img.jpg".to_string(),
            timestamp: at,
            image_width: 640,
            image_height: 480,
            image_size_kb: 10.0,
            total_detections: detections,
            person_count: 1,
            helmet_count: detections.saturating_sub(2),
            vest_count: 1,
            confidence_threshold: 0.25,
            processing_time_ms: time_ms,
            is_compliant: compliant,
            compliance_message: message.map(String::from),
            detections: Vec::new(),
            endpoint: "predict".to_string(),
        }
    }

    #[test]
    fn empty_window_yields_zero_defaults() {
        let report = rollup(&[], &window());
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.summary, SummaryStats::default());
        assert_eq!(report.compliance_statistics, ComplianceStats::default());
        assert_eq!(report.performance_metrics, PerformanceStats::default());
        assert!(report.top_violations.is_empty());
        assert!(report.detection_trends.is_empty());
        assert_eq!(report.date_range.days, 7);
        assert!(report.date_range.start.starts_with("2026-05-03T18:00:00"));
    }

    #[test]
    fn totals_compliance_and_performance() {
        let t = end() - Duration::hours(1);
        let records = vec![
            record(1, t, 3, Some(true), Some("All 1 person(s) are wearing required PPE"), 10.0),
            record(2, t, 2, Some(false), Some("1 PPE violation(s) detected"), 20.0),
            record(3, t, 4, None, None, 30.5),
        ];
        let report = rollup(&records, &window());

        assert_eq!(report.total_requests, 3);
        assert_eq!(report.summary.total_detections, 9);
        assert_eq!(report.summary.total_persons, 3);
        assert_eq!(report.summary.total_helmets, 3);
        assert_eq!(report.summary.avg_detections_per_request, 3.0);
        assert_eq!(report.compliance_statistics.total_checks, 2);
        assert_eq!(report.compliance_statistics.compliant, 1);
        assert_eq!(report.compliance_statistics.non_compliant, 1);
        assert_eq!(report.compliance_statistics.compliance_rate_percent, 50.0);
        assert_eq!(report.performance_metrics.avg_processing_time_ms, 20.17);
        assert_eq!(report.performance_metrics.min_processing_time_ms, 10.0);
        assert_eq!(report.performance_metrics.max_processing_time_ms, 30.5);
    }

    #[test]
    fn no_compliance_checked_records_gives_zero_rate() {
        let records = vec![record(1, end(), 1, None, None, 1.0)];
        let report = rollup(&records, &window());
        assert_eq!(report.compliance_statistics, ComplianceStats::default());
    }

    #[test]
    fn top_violations_are_ranked_and_capped() {
        let t = end() - Duration::hours(2);
        let mut records = Vec::new();
        let mut id = 0;
        for (k, repeats) in [(1, 1), (2, 4), (3, 2), (4, 2), (5, 3), (6, 1), (7, 5)] {
            for _ in 0..repeats {
                id += 1;
                let message = format!("{} PPE violation(s) detected", k);
                records.push(record(id, t, 1, Some(false), Some(&message), 1.0));
            }
        }
        // compliant messages never count as violations
        let compliant = "All 2 person(s) are wearing required PPE";
        records.push(record(999, t, 1, Some(true), Some(compliant), 1.0));

        let report = rollup(&records, &window());
        let ranked: Vec<(&str, u64)> = report
            .top_violations
            .iter()
            .map(|v| (v.violation.as_str(), v.count))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("7 PPE violation(s) detected", 5),
                ("2 PPE violation(s) detected", 4),
                ("5 PPE violation(s) detected", 3),
                ("3 PPE violation(s) detected", 2),
                ("4 PPE violation(s) detected", 2),
            ]
        );
    }

    #[test]
    fn daily_trends_bucket_by_utc_date_ascending() {
        let day2 = Utc.with_ymd_and_hms(2026, 5, 9, 23, 59, 59).unwrap();
        let day1 = Utc.with_ymd_and_hms(2026, 5, 8, 0, 0, 0).unwrap();
        let records = vec![
            record(1, day2, 3, None, None, 1.0),
            record(2, day1, 2, None, None, 1.0),
            record(3, day2, 5, None, None, 1.0),
        ];
        let report = rollup(&records, &window());
        let dates: Vec<&str> = report.detection_trends.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-05-08", "2026-05-09"]);
        assert_eq!(report.detection_trends[1].requests, 2);
        assert_eq!(report.detection_trends[1].detections, 8);
        assert_eq!(report.detection_trends[1].helmets, 1 + 3);
    }

    #[test]
    fn window_validates_days() {
        assert!(AnalyticsWindow::at(end(), 0, None).unwrap_err().is_input());
        assert!(AnalyticsWindow::at(end(), 366, None).is_err());
        let w = AnalyticsWindow::at(end(), 365, Some("  ".to_string())).expect("valid window");
        assert_eq!(w.endpoint, None);
    }

    #[test]
    fn repeated_rollups_are_identical() {
        let message = Some("2 PPE violation(s) detected");
        let records = vec![record(1, end(), 2, Some(false), message, 4.0)];
        assert_eq!(rollup(&records, &window()), rollup(&records, &window()));
    }
}
