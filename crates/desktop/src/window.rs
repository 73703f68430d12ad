//! The headless "window": its content counts as loaded once the export
//! service answers its health check.

use std::sync::Arc;

use async_trait::async_trait;
use wmark_client::{ExportApiClient, ExportApiError};
use wmark_supervisor::{LoadFailure, WindowLoader};

/// Status code reported for failures that never produced an HTTP response.
const NO_RESPONSE: i32 = -1;

pub struct HealthLoader {
    api: Arc<ExportApiClient>,
}

impl HealthLoader {
    pub fn new(api: Arc<ExportApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl WindowLoader for HealthLoader {
    async fn load(&self) -> Result<(), LoadFailure> {
        let health = self.api.health().await.map_err(load_failure)?;
        tracing::debug!(status = %health.status, "Export service healthy");
        Ok(())
    }
}

fn load_failure(err: ExportApiError) -> LoadFailure {
    let code = match &err {
        ExportApiError::NotFound => 404,
        ExportApiError::ApiError { status, .. } => i32::from(*status),
        _ => NO_RESPONSE,
    };
    LoadFailure {
        code,
        description: err.user_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_keep_their_status() {
        let failure = load_failure(ExportApiError::ApiError {
            status: 503,
            body: "starting".to_string(),
        });
        assert_eq!(failure.code, 503);
        assert_eq!(failure.description, "starting");
    }

    #[test]
    fn transport_errors_have_no_status() {
        let failure = load_failure(ExportApiError::InvalidUrl("x".to_string()));
        assert_eq!(failure.code, NO_RESPONSE);
    }
}
