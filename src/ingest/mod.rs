//! Frame ingestion sources.
//!
//! This module provides sources of frames for the core:
//! - Detection replay files (JSON lines, one frame per line)
//! - Single-image detection files
//! - In-memory and `stub://` synthetic sources (testing, dry runs)
//!
//! Sources only hand frames over. Decoding media and running a model are the
//! job of external producers; the payloads here already carry their output.

pub mod file;
pub mod image;
pub mod memory;

pub use file::{FileConfig, FileSource, FileStats};
pub use image::{image_from_bytes, load_image_file, ImageInput};
pub use memory::MemorySource;
