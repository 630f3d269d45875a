//! OpenAI image edit client
//!
//! Implements the ImageClient trait for the `images/edits` endpoint using a
//! multipart upload and bearer authentication.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

use super::{ApiReply, EditRequest, ImageClient};
use crate::config::ApiConfig;
use crate::generate::GenerateError;

/// File name the exported canvas is uploaded under
const UPLOAD_FILE_NAME: &str = "input.png";

/// OpenAI images API client
pub struct OpenAIImageClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAIImageClient {
    /// Create a new client from configuration and a stored credential
    pub fn from_config(config: &ApiConfig, api_key: impl Into<String>) -> Result<Self, GenerateError> {
        debug!(base_url = %config.base_url, timeout_ms = config.timeout_ms, "from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GenerateError::network)?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: config.base_url.clone(),
            http,
        })
    }

    /// Full URL of the edits endpoint
    fn edits_url(&self) -> String {
        format!("{}/v1/images/edits", self.base_url.trim_end_matches('/'))
    }

    /// Text fields of the multipart form, in upload order
    fn form_fields(request: &EditRequest) -> Vec<(&'static str, String)> {
        vec![
            ("model", request.model.clone()),
            ("prompt", request.prompt.clone()),
            ("size", request.size.to_string()),
            ("quality", request.quality.clone()),
        ]
    }

    /// Build the multipart form for a request
    fn build_form(request: &EditRequest) -> Result<Form, GenerateError> {
        debug!(size = %request.size, image_len = request.image.len(), "build_form: called");
        let mut form = Form::new();
        for (name, value) in Self::form_fields(request) {
            form = form.text(name, value);
        }

        let image = Part::bytes(request.image.to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("image/png")
            .map_err(GenerateError::network)?;

        Ok(form.part("image", image))
    }
}

#[async_trait]
impl ImageClient for OpenAIImageClient {
    async fn edit(&self, request: &EditRequest) -> Result<ApiReply, GenerateError> {
        debug!(model = %request.model, size = %request.size, "edit: called");
        let form = Self::build_form(request)?;

        let response = self
            .http
            .post(self.edits_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                debug!(error = %e, "edit: network error");
                GenerateError::network(e)
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Only a success body is needed intact; an error status must still reach classification
        let body = if response.status().is_success() {
            response.text().await.map_err(GenerateError::network)?
        } else {
            response.text().await.unwrap_or_else(|e| {
                debug!(%status, error = %e, "edit: failed to read error body");
                String::new()
            })
        };
        debug!(%status, ?retry_after, body_len = body.len(), "edit: reply received");

        Ok(ApiReply {
            status,
            retry_after,
            body,
        })
    }
}
