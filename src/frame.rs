//! Frame boundary between the core and its media collaborators.
//!
//! - `RawFrame`: opaque payload handed from a frame source to a detector backend.
//!   The core never interprets the bytes itself.
//! - `FrameSource`: finite, ordered, non-restartable stream of frames.
//! - `StreamInfo`: fps and frame-count hints reported by a source on connect.
//! - `CancelToken`: cooperative cancellation checked at frame boundaries.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque frame payload. Only detector backends look inside `data`.
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Payload bytes, for detector backends.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Hints a source reports when it is opened.
///
/// `fps` may be 0 when unknown; `total_frames` may not match the number of
/// frames actually delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StreamInfo {
    pub fps: f64,
    pub total_frames: u64,
}

impl StreamInfo {
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Frame source collaborator.
///
/// End of stream is signalled by `Ok(None)`, never by an error.
pub trait FrameSource {
    /// Open the source and report its hints. Failure is fatal for the job.
    fn connect(&mut self) -> Result<StreamInfo>;

    /// Read the next frame in order.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<StreamInfo> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_zero_without_fps() {
        let info = StreamInfo {
            fps: 0.0,
            total_frames: 120,
        };
        assert_eq!(info.duration_seconds(), 0.0);

        let info = StreamInfo {
            fps: 30.0,
            total_frames: 120,
        };
        assert_eq!(info.duration_seconds(), 4.0);
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn debug_output_hides_payload() {
        let frame = RawFrame::new(vec![1, 2, 3], 4, 5);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("bytes: 3"));
        assert_eq!(frame.payload(), &[1, 2, 3]);
    }
}
