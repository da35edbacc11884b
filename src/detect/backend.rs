use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::RawFrame;

/// Inference collaborator.
///
/// # Contract
///
/// Implementations return detections already filtered to
/// `confidence >= conf_threshold`, with boxes in the frame's pixel space.
/// The frame is read-only and must not be retained past the call.
/// Backends are handed to the core per call; the core never constructs one.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on a frame.
    fn detect(&mut self, frame: &RawFrame, conf_threshold: f64) -> Result<Vec<Detection>>;

    /// Class labels this backend can emit, indexed by class id.
    fn class_names(&self) -> Vec<&'static str> {
        crate::detect::result::DetectionClass::ALL
            .iter()
            .map(|class| class.label())
            .collect()
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &RawFrame, conf_threshold: f64) -> Result<Vec<Detection>> {
        (**self).detect(frame, conf_threshold)
    }

    fn class_names(&self) -> Vec<&'static str> {
        (**self).class_names()
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
