use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::RawFrame;

/// Stub backend for testing and dry runs. Never detects anything.
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &RawFrame, _conf_threshold: f64) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        Ok(Vec::new())
    }
}

/// Adapts a closure into a backend, for callers that already hold an
/// inference function.
pub struct FnBackend<F> {
    name: &'static str,
    infer: F,
}

impl<F> FnBackend<F>
where
    F: FnMut(&RawFrame, f64) -> Result<Vec<Detection>> + Send,
{
    pub fn new(name: &'static str, infer: F) -> Self {
        Self { name, infer }
    }
}

impl<F> DetectorBackend for FnBackend<F>
where
    F: FnMut(&RawFrame, f64) -> Result<Vec<Detection>> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&mut self, frame: &RawFrame, conf_threshold: f64) -> Result<Vec<Detection>> {
        (self.infer)(frame, conf_threshold)
    }
}
