//! Saved watermark/export presets.
//!
//! Templates are persisted by the export service; the desktop shell only
//! lists, loads, saves and deletes them.

use serde::{Deserialize, Serialize};

use crate::config::{ExportConfig, WatermarkConfig};
use crate::error::CoreError;
use crate::types::Timestamp;

/// A stored template as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub watermark_config: WatermarkConfig,
    pub export_config: ExportConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

/// Body of a save request. Omitting `id` creates a new template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub watermark_config: WatermarkConfig,
    pub export_config: ExportConfig,
}

impl TemplateRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Template name must not be empty".to_string(),
            ));
        }
        self.watermark_config.validate()?;
        self.export_config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextWatermarkConfig;

    fn request(name: &str) -> TemplateRequest {
        TemplateRequest {
            id: None,
            name: name.to_string(),
            watermark_config: WatermarkConfig::text(TextWatermarkConfig {
                content: "draft".to_string(),
                ..Default::default()
            }),
            export_config: ExportConfig::new("/out"),
        }
    }

    #[test]
    fn new_template_omits_id() {
        let json = serde_json::to_value(request("Default")).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["name"], "Default");
    }

    #[test]
    fn blank_name_rejected() {
        assert!(request("  ").validate().is_err());
        assert!(request("Studio").validate().is_ok());
    }
}
