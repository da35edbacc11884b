use anyhow::Result;
use std::collections::VecDeque;

use crate::frame::{FrameSource, RawFrame, StreamInfo};

/// In-memory frame source over pre-built payloads.
///
/// The reported `total_frames` hint defaults to the payload count but can be
/// overridden to model sources whose metadata disagrees with their content.
pub struct MemorySource {
    frames: VecDeque<Vec<u8>>,
    info: StreamInfo,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl MemorySource {
    pub fn new(payloads: Vec<Vec<u8>>, fps: f64) -> Self {
        let info = StreamInfo {
            fps,
            total_frames: payloads.len() as u64,
        };
        Self {
            frames: payloads.into(),
            info,
            width: 0,
            height: 0,
            frames_read: 0,
        }
    }

    /// `frames` empty-detection frames.
    pub fn synthetic(frames: u64, fps: f64) -> Self {
        Self::new((0..frames).map(|_| b"[]".to_vec()).collect(), fps)
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_total_frames_hint(mut self, total_frames: u64) -> Self {
        self.info.total_frames = total_frames;
        self
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for MemorySource {
    fn connect(&mut self) -> Result<StreamInfo> {
        Ok(self.info)
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        Ok(self.frames.pop_front().map(|data| {
            self.frames_read += 1;
            RawFrame::new(data, self.width, self.height)
        }))
    }
}
