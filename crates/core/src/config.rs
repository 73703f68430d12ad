//! Export and watermark configuration sent alongside a submission.
//!
//! The service accepts a single JSON document with two halves: how to
//! draw the watermark and how to write the output files. Both are closed
//! types here so an invalid combination (an image watermark without image
//! data, a percent resize carrying a width) cannot be built.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Largest accepted resize percentage.
pub const MAX_RESIZE_PERCENT: f64 = 1000.0;

/// Opacity is expressed as a percentage on the wire.
pub const MAX_OPACITY: f64 = 100.0;

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// The `config` part of a multipart export submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub watermark_config: WatermarkConfig,
    pub export_config: ExportConfig,
}

impl ExportRequest {
    pub fn new(watermark_config: WatermarkConfig, export_config: ExportConfig) -> Self {
        Self {
            watermark_config,
            export_config,
        }
    }

    /// Validate both halves of the request.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.watermark_config.validate()?;
        self.export_config.validate()
    }
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Watermark description: either text or an image, plus optional layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    #[serde(flatten)]
    pub kind: WatermarkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutConfig>,
}

/// Tagged on the wire by `"type": "text" | "image"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkKind {
    Text { text: TextWatermarkConfig },
    Image { image: ImageWatermarkConfig },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextWatermarkConfig {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    /// CSS-style colour, e.g. `#ffffff`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Percentage in `0..=100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<StrokeStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<ShadowStyle>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageWatermarkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Base64-encoded image bytes.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Percentage in `0..=100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStyle {
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowStyle {
    pub color: String,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default)]
    pub blur: f64,
}

/// Nine-grid anchor positions understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPreset {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Placement of the watermark. `x`/`y` are relative coordinates that
/// override the preset when present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<LayoutPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl WatermarkConfig {
    pub fn text(text: TextWatermarkConfig) -> Self {
        Self {
            kind: WatermarkKind::Text { text },
            layout: None,
        }
    }

    pub fn image(image: ImageWatermarkConfig) -> Self {
        Self {
            kind: WatermarkKind::Image { image },
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Validate the watermark half of an export request.
    ///
    /// Rules:
    /// - Text watermarks must have non-blank content.
    /// - Image watermarks must carry image data.
    /// - Opacity, when given, must be within `0..=100`.
    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.kind {
            WatermarkKind::Text { text } => {
                if text.content.trim().is_empty() {
                    return Err(CoreError::Validation(
                        "Text watermark content must not be empty".to_string(),
                    ));
                }
                if text.font_size == Some(0) {
                    return Err(CoreError::Validation(
                        "Font size must be greater than zero".to_string(),
                    ));
                }
                validate_opacity(text.opacity)
            }
            WatermarkKind::Image { image } => {
                if image.data.is_empty() {
                    return Err(CoreError::Validation(
                        "Image watermark data must not be empty".to_string(),
                    ));
                }
                if let Some(scale) = image.scale {
                    if scale <= 0.0 {
                        return Err(CoreError::Validation(
                            "Image watermark scale must be positive".to_string(),
                        ));
                    }
                }
                validate_opacity(image.opacity)
            }
        }
    }
}

fn validate_opacity(opacity: Option<f64>) -> Result<(), CoreError> {
    match opacity {
        Some(o) if !(0.0..=MAX_OPACITY).contains(&o) => Err(CoreError::Validation(format!(
            "Opacity must be between 0 and {MAX_OPACITY}"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Export output
// ---------------------------------------------------------------------------

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

/// Resize applied before the watermark is drawn, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum ResizeConfig {
    /// Scale to a fixed width, keeping aspect ratio.
    #[serde(rename = "w")]
    Width { width: u32 },
    /// Scale to a fixed height, keeping aspect ratio.
    #[serde(rename = "h")]
    Height { height: u32 },
    /// Scale both sides by a percentage (100 = unchanged).
    #[serde(rename = "pct")]
    Percent { percent: f64 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingRule {
    #[serde(default)]
    pub keep_original: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    pub output_dir: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingRule>,
}

impl ExportConfig {
    pub fn new(output_dir: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: OutputFormat::default(),
            jpeg_quality: None,
            resize: None,
            naming: None,
        }
    }

    /// Validate the output half of an export request.
    ///
    /// Rules:
    /// - `output_dir` must not be blank.
    /// - `jpeg_quality`, when given, must be in `1..=100`.
    /// - Resize width/height must be positive; percent in `(0, 1000]`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.output_dir.trim().is_empty() {
            return Err(CoreError::Validation(
                "Output directory must not be empty".to_string(),
            ));
        }
        if let Some(q) = self.jpeg_quality {
            if !(1..=100).contains(&q) {
                return Err(CoreError::Validation(
                    "JPEG quality must be between 1 and 100".to_string(),
                ));
            }
        }
        match &self.resize {
            Some(ResizeConfig::Width { width: 0 }) | Some(ResizeConfig::Height { height: 0 }) => {
                Err(CoreError::Validation(
                    "Resize dimension must be greater than zero".to_string(),
                ))
            }
            Some(ResizeConfig::Percent { percent })
                if !(*percent > 0.0 && *percent <= MAX_RESIZE_PERCENT) =>
            {
                Err(CoreError::Validation(format!(
                    "Resize percent must be in (0, {MAX_RESIZE_PERCENT}]"
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn text_watermark() -> WatermarkConfig {
        WatermarkConfig::text(TextWatermarkConfig {
            content: "(c) 2026".to_string(),
            opacity: Some(80.0),
            ..Default::default()
        })
    }

    // -- wire shape -----------------------------------------------------------

    #[test]
    fn text_watermark_serializes_with_type_tag() {
        let wm = text_watermark().with_layout(LayoutConfig {
            preset: Some(LayoutPreset::BottomRight),
            ..Default::default()
        });
        let json = serde_json::to_value(&wm).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"]["content"], "(c) 2026");
        assert_eq!(json["layout"]["preset"], "bottom-right");
        assert!(json.get("image").is_none());
    }

    #[test]
    fn image_watermark_parses_from_wire() {
        let json = serde_json::json!({
            "type": "image",
            "image": { "data": "iVBORw0KGgo=", "mime": "image/png", "scale": 0.3 },
            "layout": { "x": 0.5, "y": 0.9, "rotationDeg": 15.0 }
        });
        let wm: WatermarkConfig = serde_json::from_value(json).unwrap();
        assert_matches!(&wm.kind, WatermarkKind::Image { image } if image.scale == Some(0.3));
        assert_eq!(wm.layout.unwrap().rotation_deg, Some(15.0));
    }

    #[test]
    fn resize_modes_use_short_tags() {
        let json = serde_json::to_value(ResizeConfig::Percent { percent: 50.0 }).unwrap();
        assert_eq!(json, serde_json::json!({ "mode": "pct", "percent": 50.0 }));

        let parsed: ResizeConfig =
            serde_json::from_value(serde_json::json!({ "mode": "w", "width": 1024 })).unwrap();
        assert_eq!(parsed, ResizeConfig::Width { width: 1024 });
    }

    #[test]
    fn jpg_is_accepted_as_jpeg() {
        let f: OutputFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(f, OutputFormat::Jpeg);
    }

    #[test]
    fn request_uses_camel_case_halves() {
        let req = ExportRequest::new(text_watermark(), ExportConfig::new("/tmp/out"));
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("watermarkConfig").is_some());
        assert_eq!(json["exportConfig"]["outputDir"], "/tmp/out");
        assert_eq!(json["exportConfig"]["format"], "png");
    }

    // -- validation -----------------------------------------------------------

    #[test]
    fn valid_request_passes() {
        let req = ExportRequest::new(text_watermark(), ExportConfig::new("/tmp/out"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn blank_text_rejected() {
        let wm = WatermarkConfig::text(TextWatermarkConfig {
            content: "   ".to_string(),
            ..Default::default()
        });
        assert_matches!(wm.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn empty_image_data_rejected() {
        let wm = WatermarkConfig::image(ImageWatermarkConfig::default());
        assert_matches!(wm.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn opacity_out_of_range_rejected() {
        let wm = WatermarkConfig::text(TextWatermarkConfig {
            content: "x".to_string(),
            opacity: Some(120.0),
            ..Default::default()
        });
        assert_matches!(wm.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn blank_output_dir_rejected() {
        assert_matches!(ExportConfig::new(" ").validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn jpeg_quality_bounds() {
        let mut cfg = ExportConfig::new("/out");
        cfg.jpeg_quality = Some(0);
        assert!(cfg.validate().is_err());
        cfg.jpeg_quality = Some(100);
        assert!(cfg.validate().is_ok());
        cfg.jpeg_quality = Some(101);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn resize_bounds() {
        let mut cfg = ExportConfig::new("/out");
        cfg.resize = Some(ResizeConfig::Width { width: 0 });
        assert!(cfg.validate().is_err());
        cfg.resize = Some(ResizeConfig::Percent { percent: 0.0 });
        assert!(cfg.validate().is_err());
        cfg.resize = Some(ResizeConfig::Percent { percent: 1000.0 });
        assert!(cfg.validate().is_ok());
        cfg.resize = Some(ResizeConfig::Height { height: 720 });
        assert!(cfg.validate().is_ok());
    }
}
