//! Pixel dimension probing from the image header.

use std::io::Cursor;

use image::ImageReader;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Read width and height without decoding pixel data.
///
/// Returns `None` for unrecognised or truncated input; a missing size is
/// a normal state for an asset.
pub fn probe_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok((width, height)) => Some(Dimensions { width, height }),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read image dimensions");
            None
        }
    }
}
