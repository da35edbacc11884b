//! Local file frame source.
//!
//! `FileSource` reads a detection replay file: JSON lines, one frame per
//! non-empty line, each line being a payload `ReplayBackend` understands.
//! An optional first line `{"stream": {"fps": .., "total_frames": .., "width": .., "height": ..}}`
//! supplies the stream hints; without it fps is unknown and the frame count
//! is taken from the file.
//!
//! `stub://<name>` paths produce synthetic empty frames instead, for tests and
//! dry runs.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use super::memory::MemorySource;
use crate::frame::{FrameSource, RawFrame, StreamInfo};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or `stub://<name>` for a synthetic stream.
    pub path: String,
    /// Number of frames a synthetic stream yields.
    pub synthetic_frames: u64,
    /// fps hint a synthetic stream reports.
    pub synthetic_fps: f64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_frames: 100,
            synthetic_fps: 10.0,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(MemorySource),
    Replay(ReplayFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(MemorySource::synthetic(
                    config.synthetic_frames,
                    config.synthetic_fps,
                )),
            })
        } else {
            Ok(Self {
                backend: FileBackend::Replay(ReplayFileSource::new(PathBuf::from(config.path))),
            })
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => FileStats {
                frames_read: source.frames_read(),
                path: "stub://".to_string(),
            },
            FileBackend::Replay(source) => FileStats {
                frames_read: source.frames_read,
                path: source.path.display().to_string(),
            },
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<StreamInfo> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => {
                log::info!("FileSource: connected (synthetic)");
                source.connect()
            }
            FileBackend::Replay(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Replay(source) => source.next_frame(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_read: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Replay file backend
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StreamHeaderLine {
    stream: StreamHeader,
}

#[derive(Debug, Default, Deserialize)]
struct StreamHeader {
    #[serde(default)]
    fps: f64,
    total_frames: Option<u64>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

struct ReplayFileSource {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    header: StreamHeader,
    frames_read: u64,
}

impl ReplayFileSource {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lines: None,
            header: StreamHeader::default(),
            frames_read: 0,
        }
    }

    fn open_lines(&self) -> Result<Lines<BufReader<File>>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open replay file {}", self.path.display()))?;
        Ok(BufReader::new(file).lines())
    }

    fn connect(&mut self) -> Result<StreamInfo> {
        let mut frame_lines = 0u64;
        let mut header = None;
        // physical line index of the header, if the first non-empty line is one
        let mut header_index = None;
        let mut seen_content = false;
        for (index, line) in self.open_lines()?.enumerate() {
            let line = line
                .with_context(|| format!("failed to read replay file {}", self.path.display()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !seen_content {
                seen_content = true;
                if let Ok(parsed) = serde_json::from_str::<StreamHeaderLine>(trimmed) {
                    header = Some(parsed.stream);
                    header_index = Some(index);
                    continue;
                }
            }
            frame_lines += 1;
        }

        self.header = header.unwrap_or_default();
        let mut lines = self.open_lines()?;
        if let Some(index) = header_index {
            lines.nth(index);
        }
        self.lines = Some(lines);
        self.frames_read = 0;

        let info = StreamInfo {
            fps: self.header.fps.max(0.0),
            total_frames: self.header.total_frames.unwrap_or(frame_lines),
        };
        log::info!(
            "FileSource: connected to {} ({} frames, {} fps)",
            self.path.display(),
            info.total_frames,
            info.fps
        );
        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| anyhow!("FileSource: next_frame called before connect"))?;
        for line in lines.by_ref() {
            let line = line
                .with_context(|| format!("failed to read replay file {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            self.frames_read += 1;
            return Ok(Some(RawFrame::new(
                line.into_bytes(),
                self.header.width,
                self.header.height,
            )));
        }
        Ok(None)
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(path: &str) -> FileConfig {
        FileConfig {
            path: path.to_string(),
            ..FileConfig::default()
        }
    }

    #[test]
    fn rejects_remote_and_empty_paths() {
        assert!(FileSource::new(config("rtsp://camera/stream")).is_err());
        assert!(FileSource::new(config("  ")).is_err());
    }

    #[test]
    fn missing_file_fails_on_connect() -> Result<()> {
        let mut source = FileSource::new(config("/nonexistent/ppe/replay.jsonl"))?;
        assert!(source.connect().is_err());
        Ok(())
    }

    #[test]
    fn next_frame_before_connect_is_an_error() -> Result<()> {
        let mut source = FileSource::new(config("/tmp/never-opened.jsonl"))?;
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn reads_header_and_frames() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{"stream": {{"fps": 25.0, "total_frames": 90, "width": 1280, "height": 720}}}}"#
        )?;
        writeln!(file, "[]")?;
        writeln!(file)?;
        writeln!(file, r#"{{"detections": []}}"#)?;

        let mut source = FileSource::new(config(&file.path().display().to_string()))?;
        let info = source.connect()?;
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.total_frames, 90);

        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.payload(), b"[]");
        assert_eq!((first.width, first.height), (1280, 720));
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_read, 2);
        Ok(())
    }

    #[test]
    fn header_after_leading_blank_lines_is_recognised() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file)?;
        writeln!(file, "   ")?;
        writeln!(file, r#"{{"stream": {{"fps": 10.0}}}}"#)?;
        writeln!(file, "[]")?;

        let mut source = FileSource::new(config(&file.path().display().to_string()))?;
        let info = source.connect()?;
        assert_eq!(info.fps, 10.0);
        assert_eq!(info.total_frames, 1);

        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.payload(), b"[]");
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn headerless_file_counts_lines_and_reports_unknown_fps() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        for _ in 0..3 {
            writeln!(file, "[]")?;
        }
        let mut source = FileSource::new(config(&file.path().display().to_string()))?;
        let info = source.connect()?;
        assert_eq!(info.fps, 0.0);
        assert_eq!(info.total_frames, 3);
        Ok(())
    }

    #[test]
    fn stub_path_yields_synthetic_frames() -> Result<()> {
        let mut source = FileSource::new(FileConfig {
            path: "stub://yard".to_string(),
            synthetic_frames: 2,
            synthetic_fps: 5.0,
        })?;
        let info = source.connect()?;
        assert_eq!(info.total_frames, 2);
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }
}
