//! PPE compliance determination for a single image or frame.
//!
//! Every detected person must be associated with at least one helmet and at
//! least one safety vest. Association is a proximity-or-overlap heuristic on
//! boxes in pixel space:
//!
//! - the rectangles intersect (touching edges count), or
//! - the distance between box centers is strictly below `ASSOCIATION_DISTANCE_PX`.
//!
//! Equipment is not assigned exclusively: one helmet may satisfy several
//! persons, and duplicate detections of the same item are not merged. The
//! threshold is in pixels, so sensitivity varies with image resolution.

use serde::{Deserialize, Serialize};

use crate::detect::{BoundingBox, Detection, DetectionClass};

/// Center distance (pixels) below which equipment counts as worn.
pub const ASSOCIATION_DISTANCE_PX: f64 = 50.0;

pub const NO_PERSONS_MESSAGE: &str = "No persons detected";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDetails {
    pub total_persons: u32,
    pub persons_with_helmet: u32,
    pub persons_with_vest: u32,
    pub fully_compliant: u32,
    pub total_helmets: u32,
    pub total_vests: u32,
}

/// Judgment of whether PPE policy holds for one detection set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub is_compliant: bool,
    pub message: String,
    pub details: ComplianceDetails,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl ComplianceVerdict {
    fn no_persons() -> Self {
        Self {
            is_compliant: true,
            message: NO_PERSONS_MESSAGE.to_string(),
            details: ComplianceDetails::default(),
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Symmetric proximity-or-overlap test between two boxes.
pub fn boxes_associated(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.intersects(b) || a.center_distance(b) < ASSOCIATION_DISTANCE_PX
}

/// Evaluate PPE compliance for one detection set. Pure and deterministic.
pub fn evaluate(detections: &[Detection]) -> ComplianceVerdict {
    let mut persons = Vec::new();
    let mut helmets = Vec::new();
    let mut vests = Vec::new();
    for detection in detections {
        match detection.class() {
            Some(DetectionClass::Person) => persons.push(&detection.bounding_box),
            Some(DetectionClass::Helmet) => helmets.push(&detection.bounding_box),
            Some(DetectionClass::SafetyVest) => vests.push(&detection.bounding_box),
            None => {}
        }
    }

    if persons.is_empty() {
        return ComplianceVerdict::no_persons();
    }

    let mut details = ComplianceDetails {
        total_persons: persons.len() as u32,
        total_helmets: helmets.len() as u32,
        total_vests: vests.len() as u32,
        ..ComplianceDetails::default()
    };
    let mut violations = Vec::new();

    for (index, person) in persons.iter().enumerate() {
        let number = index + 1;
        let has_helmet = helmets.iter().any(|helmet| boxes_associated(person, helmet));
        let has_vest = vests.iter().any(|vest| boxes_associated(person, vest));

        if has_helmet {
            details.persons_with_helmet += 1;
        } else {
            violations.push(format!("Person #{} is not wearing a helmet", number));
        }
        if has_vest {
            details.persons_with_vest += 1;
        } else {
            violations.push(format!("Person #{} is not wearing a safety vest", number));
        }
        if has_helmet && has_vest {
            details.fully_compliant += 1;
        }
    }

    let is_compliant = violations.is_empty();
    let message = if is_compliant {
        format!("All {} person(s) are wearing required PPE", persons.len())
    } else {
        format!("{} PPE violation(s) detected", violations.len())
    };

    let mut warnings = Vec::new();
    if helmets.len() > persons.len() {
        warnings.push(format!(
            "Extra helmets detected ({} helmets for {} persons)",
            helmets.len(),
            persons.len()
        ));
    }
    if vests.len() > persons.len() {
        warnings.push(format!(
            "Extra vests detected ({} vests for {} persons)",
            vests.len(),
            persons.len()
        ));
    }

    ComplianceVerdict {
        is_compliant,
        message,
        details,
        violations,
        warnings,
    }
}
