//! REST API client for the export service HTTP endpoints.
//!
//! [`ExportApi`] is the seam the job tracker depends on: submit, list,
//! status and cancel. [`ExportApiClient`] implements it with [`reqwest`]
//! and additionally wraps the supporting endpoints (health, fonts,
//! templates, last-used settings) that the UI calls directly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use wmark_core::config::ExportRequest;
use wmark_core::export::ExportJobView;
use wmark_core::settings::LastSettings;
use wmark_core::template::{Template, TemplateRequest};
use wmark_core::types::Timestamp;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A file selected for export, ready to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    /// MIME type, e.g. `image/png`. Sent as the part content type.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes,
        }
    }
}

/// Response of `GET /api/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Option<Timestamp>,
}

/// Errors from the export service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ExportApiError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered `404`. For job endpoints this means the job
    /// expired or was never known.
    #[error("Resource not found")]
    NotFound,

    /// The service returned a non-2xx status code other than 404.
    #[error("Export service error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Plain-text error body returned by the service.
        body: String,
    },

    /// The request configuration could not be encoded as JSON.
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

impl ExportApiError {
    /// The message to show a user: the service's own body text when it
    /// sent one, otherwise the error description.
    pub fn user_message(&self) -> String {
        match self {
            Self::ApiError { body, .. } if !body.trim().is_empty() => body.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// Operations the job tracker needs from the export service.
#[async_trait]
pub trait ExportApi: Send + Sync {
    /// `POST /api/export` with a JSON `config` part and one `files` part
    /// per upload.
    async fn submit_export(
        &self,
        request: &ExportRequest,
        files: Vec<UploadFile>,
    ) -> Result<ExportJobView, ExportApiError>;

    /// `GET /api/export`.
    async fn list_jobs(&self) -> Result<Vec<ExportJobView>, ExportApiError>;

    /// `GET /api/export/{id}/status`. Yields [`ExportApiError::NotFound`]
    /// for expired or unknown jobs.
    async fn job_status(&self, job_id: &str) -> Result<ExportJobView, ExportApiError>;

    /// `POST /api/export/{id}/cancel`.
    async fn cancel_job(&self, job_id: &str) -> Result<ExportJobView, ExportApiError>;
}

/// HTTP client for one export service instance.
pub struct ExportApiClient {
    client: reqwest::Client,
    api_url: Url,
}

impl ExportApiClient {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8080`.
    pub fn new(api_url: Url, timeout: Duration) -> Result<Self, ExportApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: Url) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// `GET /api/health`.
    pub async fn health(&self) -> Result<HealthResponse, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "health"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /api/fonts`: font family names available to text watermarks.
    pub async fn list_fonts(&self) -> Result<Vec<String>, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "fonts"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /api/templates`.
    pub async fn list_templates(&self) -> Result<Vec<Template>, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "templates"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /api/templates/{id}`. Returns `None` when the template does
    /// not exist.
    pub async fn get_template(&self, id: &str) -> Result<Option<Template>, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "templates", id])?)
            .send()
            .await?;
        match Self::parse_response(response).await {
            Ok(template) => Ok(Some(template)),
            Err(ExportApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `POST /api/templates`: create or overwrite a template.
    pub async fn save_template(&self, request: &TemplateRequest) -> Result<Template, ExportApiError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "templates"])?)
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `DELETE /api/templates/{id}`.
    pub async fn delete_template(&self, id: &str) -> Result<(), ExportApiError> {
        let response = self
            .client
            .delete(self.endpoint(&["api", "templates", id])?)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// `GET /api/settings/last`. The service answers `204 No Content`
    /// when nothing has been saved yet; that maps to `None`.
    pub async fn last_settings(&self) -> Result<Option<LastSettings>, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "settings", "last"])?)
            .send()
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        match Self::parse_response(response).await {
            Ok(settings) => Ok(Some(settings)),
            Err(ExportApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `POST /api/settings/last`: remember `request` as the last-used
    /// settings.
    pub async fn save_last_settings(
        &self,
        request: &ExportRequest,
    ) -> Result<LastSettings, ExportApiError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "settings", "last"])?)
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `DELETE /api/settings/last`.
    pub async fn delete_last_settings(&self) -> Result<(), ExportApiError> {
        let response = self
            .client
            .delete(self.endpoint(&["api", "settings", "last"])?)
            .send()
            .await?;
        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ExportApiError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ExportApiError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, [`ExportApiError::NotFound`] on
    /// 404, or [`ExportApiError::ApiError`] with the body text otherwise.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ExportApiError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ExportApiError::NotFound);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ExportApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ExportApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ExportApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ExportApi for ExportApiClient {
    async fn submit_export(
        &self,
        request: &ExportRequest,
        files: Vec<UploadFile>,
    ) -> Result<ExportJobView, ExportApiError> {
        let config_json = serde_json::to_string(request)?;
        let mut form = Form::new().text("config", config_json);
        for file in files {
            let mut part = Part::bytes(file.bytes).file_name(file.name);
            if let Some(mime) = file.mime.as_deref() {
                part = part.mime_str(mime)?;
            }
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(self.endpoint(&["api", "export"])?)
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn list_jobs(&self) -> Result<Vec<ExportJobView>, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "export"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn job_status(&self, job_id: &str) -> Result<ExportJobView, ExportApiError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "export", job_id, "status"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn cancel_job(&self, job_id: &str) -> Result<ExportJobView, ExportApiError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "export", job_id, "cancel"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }
}
