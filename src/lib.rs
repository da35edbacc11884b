//! PPE detection interpretation pipeline
//!
//! This crate turns object detections (`person`, `helmet`, `safety-vest`)
//! into compliance verdicts, aggregates per-frame results across a video, and
//! rolls persisted per-request records up into analytics.
//!
//! # Architecture
//!
//! The core is pure and single-threaded per request. Everything it talks to
//! sits behind a trait:
//!
//! - `detect::DetectorBackend`: inference, frame in, detections out
//! - `frame::FrameSource`: sequential frame reads from a video or replay file
//! - `storage::RecordStore`: append and query persisted request records
//!
//! # Module Structure
//!
//! - `compliance`: spatial person/equipment association and the verdict
//! - `video`: sampled, budgeted, cancellable frame aggregation
//! - `image`: single-image and batch processing
//! - `analytics`: windowed rollups over detection records
//! - `detect`, `frame`, `ingest`: detection types, frames and sources
//! - `storage`, `config`, `error`: collaborators and ambient plumbing

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};

pub mod analytics;
pub mod compliance;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod image;
pub mod ingest;
pub mod storage;
pub mod video;

pub use analytics::{AnalyticsReport, AnalyticsWindow};
pub use compliance::{ComplianceDetails, ComplianceVerdict};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionClass, DetectionSummary, DetectorBackend,
};
pub use error::PipelineError;
pub use frame::{CancelToken, FrameSource, RawFrame, StreamInfo};
pub use image::{BatchReport, ImageAnalysis};
pub use storage::{
    DetectionRecord, InMemoryRecordStore, RecordStore, SqliteRecordStore, VideoProcessingRecord,
};
pub use video::{InferenceFailurePolicy, VideoJob, VideoReport};

/// Opaque id attached to every request record: `req_` plus 12 hex chars.
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("req_{}", hex::encode(bytes))
}

/// Private shared in-memory database, useful for tests and dry runs.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:ppe_records_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}
