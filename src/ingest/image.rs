//! Single-image detection files.
//!
//! An image file is the JSON record an external model produced for one image:
//! `{"width": 1920, "height": 1080, "detections": [ ... ]}`. The whole file
//! becomes the frame payload; only the dimensions are read here.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::frame::RawFrame;

#[derive(Debug, Default, Deserialize)]
struct ImageHeader {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// Image loaded from disk, with the filename recorded against it.
#[derive(Debug)]
pub struct ImageInput {
    pub filename: String,
    pub frame: RawFrame,
}

pub fn load_image_file(path: &Path) -> Result<ImageInput> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow!("failed to read image file {}: {}", path.display(), e))?;
    image_from_bytes(file_name(path), bytes)
}

/// Build an image input from an in-memory payload.
pub fn image_from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<ImageInput> {
    let filename = filename.into();
    let header: ImageHeader = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => {
            serde_json::from_value(serde_json::Value::Object(map))
                .map_err(|e| anyhow!("{}: invalid image dimensions: {}", filename, e))?
        }
        Ok(serde_json::Value::Array(_)) => ImageHeader::default(),
        Ok(_) => return Err(anyhow!("{}: expected a JSON object or array", filename)),
        Err(e) => return Err(anyhow!("{}: invalid JSON: {}", filename, e)),
    };
    Ok(ImageInput {
        filename,
        frame: RawFrame::new(bytes, header.width, header.height),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
