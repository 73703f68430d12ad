//! The most recently used watermark/export settings, kept by the service
//! so the next session can start from them.

use serde::{Deserialize, Serialize};

use crate::config::{ExportConfig, WatermarkConfig};
use crate::types::Timestamp;

/// Stored settings as returned by `GET /api/settings/last`.
///
/// Saving sends an [`ExportRequest`](crate::config::ExportRequest), which
/// has the same two halves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSettings {
    pub watermark_config: WatermarkConfig,
    pub export_config: ExportConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}
