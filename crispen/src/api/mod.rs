//! Image API client module
//!
//! Provides the transport used by the orchestrator to reach the remote
//! image-generation endpoint.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod openai;
mod types;

pub use client::ImageClient;
pub use openai::OpenAIImageClient;
pub use types::{ApiReply, EditImage, EditRequest, EditResponse, SizeToken};

use crate::config::ApiConfig;
use crate::generate::GenerateError;

/// Create an image client for the configured endpoint
pub fn create_client(config: &ApiConfig, api_key: &str) -> Result<Arc<dyn ImageClient>, GenerateError> {
    debug!(base_url = %config.base_url, model = %config.model, "create_client: called");
    Ok(Arc::new(OpenAIImageClient::from_config(config, api_key)?))
}
