//! Record store collaborator.
//!
//! One `DetectionRecord` per image request and one `VideoProcessingRecord` per
//! video job are appended; analytics and "recent" views read them back. The
//! core never depends on a concrete store, only on `RecordStore`.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::image::ImageAnalysis;
use crate::video::VideoReport;

pub const ENDPOINT_PREDICT: &str = "predict";
pub const ENDPOINT_PREDICT_BATCH: &str = "predict-batch";
pub const ENDPOINT_CHECK_COMPLIANCE: &str = "check-compliance";

/// Persisted outcome of one image request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub request_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub image_width: u32,
    pub image_height: u32,
    pub image_size_kb: f64,
    pub total_detections: u32,
    pub person_count: u32,
    pub helmet_count: u32,
    pub vest_count: u32,
    pub confidence_threshold: f64,
    pub processing_time_ms: f64,
    /// `None` when compliance was not checked for the request.
    pub is_compliant: Option<bool>,
    pub compliance_message: Option<String>,
    pub detections: Vec<Detection>,
    pub endpoint: String,
}

impl DetectionRecord {
    pub fn from_analysis(
        request_id: &str,
        endpoint: &str,
        confidence_threshold: f64,
        analysis: &ImageAnalysis,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            filename: analysis.metadata.filename.clone(),
            timestamp: Utc::now(),
            image_width: analysis.metadata.width,
            image_height: analysis.metadata.height,
            image_size_kb: analysis.metadata.size_kb,
            total_detections: analysis.detections.len() as u32,
            person_count: analysis.summary.person,
            helmet_count: analysis.summary.helmet,
            vest_count: analysis.summary.safety_vest,
            confidence_threshold,
            processing_time_ms: analysis.processing_time_ms,
            is_compliant: analysis.compliance.as_ref().map(|c| c.is_compliant),
            compliance_message: analysis.compliance.as_ref().map(|c| c.message.clone()),
            detections: analysis.detections.clone(),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Persisted outcome of one video job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoProcessingRecord {
    pub request_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub total_frames: u64,
    pub fps: f64,
    pub duration_seconds: f64,
    pub frames_processed: u64,
    pub total_detections: u64,
    pub avg_person_count: f64,
    pub avg_helmet_count: f64,
    pub avg_vest_count: f64,
    pub compliant_frames: u64,
    pub non_compliant_frames: u64,
    pub compliance_rate: f64,
    pub processing_time_seconds: f64,
    pub confidence_threshold: f64,
    pub sample_rate: u64,
}

impl VideoProcessingRecord {
    pub fn from_report(
        request_id: &str,
        filename: &str,
        confidence_threshold: f64,
        report: &VideoReport,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            filename: filename.to_string(),
            timestamp: Utc::now(),
            total_frames: report.total_frames,
            fps: report.fps,
            duration_seconds: report.duration_seconds,
            frames_processed: report.processed_frames,
            total_detections: report.overall_summary.total_detections,
            avg_person_count: report.overall_summary.avg_person_count,
            avg_helmet_count: report.overall_summary.avg_helmet_count,
            avg_vest_count: report.overall_summary.avg_vest_count,
            compliant_frames: report.overall_summary.compliant_frames,
            non_compliant_frames: report.overall_summary.non_compliant_frames,
            compliance_rate: report.compliance_rate,
            processing_time_seconds: report.processing_time_seconds,
            confidence_threshold,
            sample_rate: report.sample_rate,
        }
    }
}

pub trait RecordStore {
    fn append_detection(&mut self, record: &DetectionRecord) -> Result<()>;

    fn append_video(&mut self, record: &VideoProcessingRecord) -> Result<()>;

    /// Detection records with `timestamp >= cutoff`, optionally for one endpoint.
    /// Order is unspecified.
    fn detections_since(
        &self,
        cutoff: DateTime<Utc>,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>>;

    /// Newest detection records first.
    fn recent_detections(&self, limit: usize, endpoint: Option<&str>)
        -> Result<Vec<DetectionRecord>>;

    /// Newest video records first.
    fn recent_videos(&self, limit: usize) -> Result<Vec<VideoProcessingRecord>>;
}

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = crate::open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detection_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              request_id TEXT NOT NULL UNIQUE,
              filename TEXT NOT NULL,
              timestamp_ms INTEGER NOT NULL,
              image_width INTEGER NOT NULL,
              image_height INTEGER NOT NULL,
              image_size_kb REAL NOT NULL,
              total_detections INTEGER NOT NULL DEFAULT 0,
              person_count INTEGER NOT NULL DEFAULT 0,
              helmet_count INTEGER NOT NULL DEFAULT 0,
              vest_count INTEGER NOT NULL DEFAULT 0,
              confidence_threshold REAL NOT NULL DEFAULT 0.25,
              processing_time_ms REAL NOT NULL,
              is_compliant INTEGER,
              compliance_message TEXT,
              detections_json TEXT NOT NULL,
              endpoint TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS video_processing_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              request_id TEXT NOT NULL UNIQUE,
              filename TEXT NOT NULL,
              timestamp_ms INTEGER NOT NULL,
              total_frames INTEGER NOT NULL,
              fps REAL NOT NULL,
              duration_seconds REAL NOT NULL,
              frames_processed INTEGER NOT NULL,
              total_detections INTEGER NOT NULL DEFAULT 0,
              avg_person_count REAL NOT NULL DEFAULT 0.0,
              avg_helmet_count REAL NOT NULL DEFAULT 0.0,
              avg_vest_count REAL NOT NULL DEFAULT 0.0,
              compliant_frames INTEGER NOT NULL DEFAULT 0,
              non_compliant_frames INTEGER NOT NULL DEFAULT 0,
              compliance_rate REAL NOT NULL DEFAULT 0.0,
              processing_time_seconds REAL NOT NULL,
              confidence_threshold REAL NOT NULL DEFAULT 0.25,
              sample_rate INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detection_records(timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_videos_timestamp
                ON video_processing_records(timestamp_ms);
            "#,
        )?;
        log::debug!("record store schema ready");
        Ok(())
    }

    /// Round-trip the connection.
    pub fn ping(&self) -> Result<()> {
        let one: Option<i64> = self
            .conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .optional()?;
        match one {
            Some(1) => Ok(()),
            _ => Err(anyhow!("record store did not answer SELECT 1")),
        }
    }

    fn query_detections(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DetectionRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(detection_from_row(row)?);
        }
        Ok(out)
    }
}

const DETECTION_COLUMNS: &str = "request_id, filename, timestamp_ms, image_width, image_height, \
     image_size_kb, total_detections, person_count, helmet_count, vest_count, \
     confidence_threshold, processing_time_ms, is_compliant, compliance_message, \
     detections_json, endpoint";

const VIDEO_COLUMNS: &str = "request_id, filename, timestamp_ms, total_frames, fps, \
     duration_seconds, frames_processed, total_detections, avg_person_count, \
     avg_helmet_count, avg_vest_count, compliant_frames, non_compliant_frames, \
     compliance_rate, processing_time_seconds, confidence_threshold, sample_rate";

fn timestamp_from_ms(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow!("corrupt record: timestamp {} out of range", ms))
}

fn count_from_sql(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("corrupt record: negative {}", column))
}

fn detection_from_row(row: &Row<'_>) -> Result<DetectionRecord> {
    let detections_json: String = row.get(14)?;
    Ok(DetectionRecord {
        request_id: row.get(0)?,
        filename: row.get(1)?,
        timestamp: timestamp_from_ms(row.get(2)?)?,
        image_width: row.get(3)?,
        image_height: row.get(4)?,
        image_size_kb: row.get(5)?,
        total_detections: row.get(6)?,
        person_count: row.get(7)?,
        helmet_count: row.get(8)?,
        vest_count: row.get(9)?,
        confidence_threshold: row.get(10)?,
        processing_time_ms: row.get(11)?,
        is_compliant: row.get(12)?,
        compliance_message: row.get(13)?,
        detections: serde_json::from_str(&detections_json)?,
        endpoint: row.get(15)?,
    })
}

fn video_from_row(row: &Row<'_>) -> Result<VideoProcessingRecord> {
    Ok(VideoProcessingRecord {
        request_id: row.get(0)?,
        filename: row.get(1)?,
        timestamp: timestamp_from_ms(row.get(2)?)?,
        total_frames: count_from_sql(row.get(3)?, "total_frames")?,
        fps: row.get(4)?,
        duration_seconds: row.get(5)?,
        frames_processed: count_from_sql(row.get(6)?, "frames_processed")?,
        total_detections: count_from_sql(row.get(7)?, "total_detections")?,
        avg_person_count: row.get(8)?,
        avg_helmet_count: row.get(9)?,
        avg_vest_count: row.get(10)?,
        compliant_frames: count_from_sql(row.get(11)?, "compliant_frames")?,
        non_compliant_frames: count_from_sql(row.get(12)?, "non_compliant_frames")?,
        compliance_rate: row.get(13)?,
        processing_time_seconds: row.get(14)?,
        confidence_threshold: row.get(15)?,
        sample_rate: count_from_sql(row.get(16)?, "sample_rate")?,
    })
}

fn count_to_sql(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{} exceeds i64 range", column))
}

impl RecordStore for SqliteRecordStore {
    fn append_detection(&mut self, record: &DetectionRecord) -> Result<()> {
        let detections_json = serde_json::to_string(&record.detections)?;
        self.conn.execute(
            &format!(
                "INSERT INTO detection_records({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                DETECTION_COLUMNS
            ),
            params![
                record.request_id,
                record.filename,
                record.timestamp.timestamp_millis(),
                record.image_width,
                record.image_height,
                record.image_size_kb,
                record.total_detections,
                record.person_count,
                record.helmet_count,
                record.vest_count,
                record.confidence_threshold,
                record.processing_time_ms,
                record.is_compliant,
                record.compliance_message,
                detections_json,
                record.endpoint,
            ],
        )?;
        Ok(())
    }

    fn append_video(&mut self, record: &VideoProcessingRecord) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO video_processing_records({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                VIDEO_COLUMNS
            ),
            params![
                record.request_id,
                record.filename,
                record.timestamp.timestamp_millis(),
                count_to_sql(record.total_frames, "total_frames")?,
                record.fps,
                record.duration_seconds,
                count_to_sql(record.frames_processed, "frames_processed")?,
                count_to_sql(record.total_detections, "total_detections")?,
                record.avg_person_count,
                record.avg_helmet_count,
                record.avg_vest_count,
                count_to_sql(record.compliant_frames, "compliant_frames")?,
                count_to_sql(record.non_compliant_frames, "non_compliant_frames")?,
                record.compliance_rate,
                record.processing_time_seconds,
                record.confidence_threshold,
                count_to_sql(record.sample_rate, "sample_rate")?,
            ],
        )?;
        Ok(())
    }

    fn detections_since(
        &self,
        cutoff: DateTime<Utc>,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        let cutoff_ms = cutoff.timestamp_millis();
        match endpoint {
            Some(endpoint) => self.query_detections(
                &format!(
                    "SELECT {} FROM detection_records WHERE timestamp_ms >= ?1 AND endpoint = ?2",
                    DETECTION_COLUMNS
                ),
                &[&cutoff_ms, &endpoint],
            ),
            None => self.query_detections(
                &format!(
                    "SELECT {} FROM detection_records WHERE timestamp_ms >= ?1",
                    DETECTION_COLUMNS
                ),
                &[&cutoff_ms],
            ),
        }
    }

    fn recent_detections(
        &self,
        limit: usize,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        let limit = limit as i64;
        match endpoint {
            Some(endpoint) => self.query_detections(
                &format!(
                    "SELECT {} FROM detection_records WHERE endpoint = ?1 \
                     ORDER BY timestamp_ms DESC, id DESC LIMIT ?2",
                    DETECTION_COLUMNS
                ),
                &[&endpoint, &limit],
            ),
            None => self.query_detections(
                &format!(
                    "SELECT {} FROM detection_records ORDER BY timestamp_ms DESC, id DESC LIMIT ?1",
                    DETECTION_COLUMNS
                ),
                &[&limit],
            ),
        }
    }

    fn recent_videos(&self, limit: usize) -> Result<Vec<VideoProcessingRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM video_processing_records ORDER BY timestamp_ms DESC, id DESC LIMIT ?1",
            VIDEO_COLUMNS
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(video_from_row(row)?);
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordStore {
    detections: Vec<DetectionRecord>,
    videos: Vec<VideoProcessingRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Request ids are unique per table, matching the SQLite schema.
fn ensure_unique<'a>(mut ids: impl Iterator<Item = &'a str>, request_id: &str) -> Result<()> {
    if ids.any(|id| id == request_id) {
        return Err(anyhow!("duplicate request_id {}", request_id));
    }
    Ok(())
}

fn endpoint_matches(record: &DetectionRecord, endpoint: Option<&str>) -> bool {
    endpoint.map_or(true, |endpoint| record.endpoint == endpoint)
}

impl RecordStore for InMemoryRecordStore {
    fn append_detection(&mut self, record: &DetectionRecord) -> Result<()> {
        ensure_unique(
            self.detections.iter().map(|r| r.request_id.as_str()),
            &record.request_id,
        )?;
        self.detections.push(record.clone());
        Ok(())
    }

    fn append_video(&mut self, record: &VideoProcessingRecord) -> Result<()> {
        ensure_unique(
            self.videos.iter().map(|r| r.request_id.as_str()),
            &record.request_id,
        )?;
        self.videos.push(record.clone());
        Ok(())
    }

    fn detections_since(
        &self,
        cutoff: DateTime<Utc>,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        Ok(self
            .detections
            .iter()
            .filter(|r| r.timestamp >= cutoff && endpoint_matches(r, endpoint))
            .cloned()
            .collect())
    }

    fn recent_detections(
        &self,
        limit: usize,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        let mut matching: Vec<(usize, &DetectionRecord)> = self
            .detections
            .iter()
            .enumerate()
            .filter(|(_, r)| endpoint_matches(r, endpoint))
            .collect();
        matching.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn recent_videos(&self, limit: usize) -> Result<Vec<VideoProcessingRecord>> {
        let mut videos: Vec<(usize, &VideoProcessingRecord)> =
            self.videos.iter().enumerate().collect();
        videos.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        Ok(videos
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }
}
