mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{decode_payload, FnBackend, ReplayBackend, StubBackend};
pub use registry::{BackendInfo, BackendRegistry};
pub use result::{BoundingBox, Detection, DetectionClass, DetectionSummary};

pub(crate) use result::round_to;
