//! Files handed over by the OS file picker or a drop.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use image::ImageFormat;

/// Stable asset identity: `"{name}-{size}-{last_modified}"`.
pub type AssetId = String;

/// A user-selected file with its bytes already read.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    /// Size in bytes as reported by the source.
    pub size: u64,
    /// Last-modified time in milliseconds since the Unix epoch.
    pub last_modified: i64,
    /// MIME type, e.g. `image/png`. Empty when unknown.
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl SelectedFile {
    pub fn new(
        name: impl Into<String>,
        mime: impl Into<String>,
        last_modified: i64,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            last_modified,
            mime: mime.into(),
            bytes,
        }
    }

    /// Read a file from disk. The MIME type is derived from the extension
    /// and left empty for formats the probe does not know.
    pub fn read(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as i64);
        let mime = ImageFormat::from_path(path)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = std::fs::read(path)?;

        let mut file = Self::new(name, mime, last_modified, bytes);
        file.size = metadata.len();
        Ok(file)
    }

    /// Deterministic id, so re-adding the same file is a no-op.
    pub fn asset_id(&self) -> AssetId {
        format!("{}-{}-{}", self.name, self.size, self.last_modified)
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}
