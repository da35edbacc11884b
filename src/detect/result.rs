use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Axis-aligned box in image-pixel space. `x1 <= x2` and `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn is_well_formed(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }

    /// Rectangle intersection with inclusive edges: touching boxes intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.x2 < other.x1 || self.x1 > other.x2 || self.y2 < other.y1 || self.y1 > other.y2)
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Coordinates rounded to two decimals, as emitted by the inference producer.
    pub fn rounded(&self) -> Self {
        Self {
            x1: round_to(self.x1, 2),
            y1: round_to(self.y1, 2),
            x2: round_to(self.x2, 2),
            y2: round_to(self.y2, 2),
        }
    }
}

/// Classes recognised by the PPE policy.
///
/// Labels outside this set still parse into a `Detection` but carry no
/// compliance meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionClass {
    Person,
    Helmet,
    SafetyVest,
}

impl DetectionClass {
    pub const ALL: [DetectionClass; 3] = [
        DetectionClass::Person,
        DetectionClass::Helmet,
        DetectionClass::SafetyVest,
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "person" => Some(Self::Person),
            "helmet" => Some(Self::Helmet),
            "safety-vest" => Some(Self::SafetyVest),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Helmet => "helmet",
            Self::SafetyVest => "safety-vest",
        }
    }

    pub fn class_id(&self) -> u32 {
        match self {
            Self::Person => 0,
            Self::Helmet => 1,
            Self::SafetyVest => 2,
        }
    }
}

/// One labeled, confidence-scored box produced by the inference collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(class: DetectionClass, confidence: f64, bounding_box: BoundingBox) -> Self {
        Self {
            class_id: class.class_id(),
            class_name: class.label().to_string(),
            confidence,
            bounding_box,
        }
    }

    /// Recognised class, or `None` for labels the policy does not know.
    pub fn class(&self) -> Option<DetectionClass> {
        DetectionClass::from_label(&self.class_name)
    }

    pub fn area(&self) -> f64 {
        self.bounding_box.area()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PipelineError::input(format!(
                "detection '{}' has confidence {} outside [0, 1]",
                self.class_name, self.confidence
            )));
        }
        if !self.bounding_box.is_well_formed() {
            return Err(PipelineError::input(format!(
                "detection '{}' has a malformed bounding box",
                self.class_name
            )));
        }
        Ok(())
    }

    /// Normalise precision the way the inference producer reports it.
    pub fn rounded(mut self) -> Self {
        self.confidence = round_to(self.confidence, 3);
        self.bounding_box = self.bounding_box.rounded();
        self
    }
}

/// Per-class detection counts for one image or frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub person: u32,
    pub helmet: u32,
    #[serde(rename = "safety-vest")]
    pub safety_vest: u32,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut summary = Self::default();
        for detection in detections {
            match detection.class() {
                Some(DetectionClass::Person) => summary.person += 1,
                Some(DetectionClass::Helmet) => summary.helmet += 1,
                Some(DetectionClass::SafetyVest) => summary.safety_vest += 1,
                None => {}
            }
        }
        summary
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
