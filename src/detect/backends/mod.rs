pub mod replay;
pub mod stub;

pub use replay::{decode_payload, ReplayBackend};
pub use stub::{FnBackend, StubBackend};
