//! ImageClient trait definition

use async_trait::async_trait;

use super::{ApiReply, EditRequest};
use crate::generate::GenerateError;

/// Thin transport for the image edit endpoint
///
/// One call is one HTTP round-trip: no retries, no classification. Any reply
/// that arrives (including 4xx/5xx) is returned as `Ok(ApiReply)`; only
/// transport failures become `Err(GenerateError::Network)`.
#[async_trait]
pub trait ImageClient: Send + Sync {
    /// Submit one edit request and return the raw reply
    async fn edit(&self, request: &EditRequest) -> Result<ApiReply, GenerateError>;
}
