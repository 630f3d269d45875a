//! Image edit request/response types
//!
//! These model the OpenAI `images/edits` endpoint: a multipart request with the
//! source image and a prompt, answered by a JSON body carrying base64 images.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Requested output size for an edit
///
/// `Auto` lets the API preserve the input aspect ratio; `Fixed` asks for an
/// exact `WIDTHxHEIGHT` canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SizeToken {
    #[default]
    Auto,
    Fixed { width: u32, height: u32 },
}

impl SizeToken {
    /// Square 1024x1024, the size every model accepts
    pub const SQUARE_1024: SizeToken = SizeToken::Fixed {
        width: 1024,
        height: 1024,
    };

    /// Whether this is the adaptive `auto` mode
    pub fn is_auto(&self) -> bool {
        matches!(self, SizeToken::Auto)
    }
}

impl fmt::Display for SizeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeToken::Auto => write!(f, "auto"),
            SizeToken::Fixed { width, height } => write!(f, "{}x{}", width, height),
        }
    }
}

impl FromStr for SizeToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "SizeToken::from_str: called");
        let s = s.trim().to_lowercase();
        if s == "auto" {
            return Ok(SizeToken::Auto);
        }

        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("Unknown size: {}. Use: auto or WIDTHxHEIGHT", s))?;
        let width = w.parse::<u32>().map_err(|_| format!("Invalid width in size: {}", s))?;
        let height = h.parse::<u32>().map_err(|_| format!("Invalid height in size: {}", s))?;
        if width == 0 || height == 0 {
            return Err(format!("Size dimensions must be non-zero: {}", s));
        }
        Ok(SizeToken::Fixed { width, height })
    }
}

impl TryFrom<String> for SizeToken {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeToken> for String {
    fn from(value: SizeToken) -> Self {
        value.to_string()
    }
}

/// One image edit call - everything the endpoint needs
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Model identifier (e.g. "gpt-image-1.5")
    pub model: String,

    /// Free-text instruction
    pub prompt: String,

    /// Output size for this attempt
    pub size: SizeToken,

    /// Quality token (e.g. "high")
    pub quality: String,

    /// PNG bytes of the exported canvas, shared across attempts
    pub image: Arc<[u8]>,
}

/// Raw HTTP reply from the endpoint
///
/// Classification (retry, fallback, success) is left to the orchestrator so
/// clients stay thin and the mock can script any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    /// HTTP status code
    pub status: u16,

    /// Value of the `retry-after` header, if present
    pub retry_after: Option<String>,

    /// Response body text
    pub body: String,
}

impl ApiReply {
    /// Create a reply without a retry hint
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Attach a `retry-after` header value
    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Rate limited (429) or any server error (5xx)
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

/// Success body of `images/edits`
#[derive(Debug, Deserialize)]
pub struct EditResponse {
    #[serde(default)]
    pub data: Vec<EditImage>,
}

#[derive(Debug, Deserialize)]
pub struct EditImage {
    pub b64_json: Option<String>,
}

impl EditResponse {
    /// The first image's base64 payload, if the API returned one
    pub fn first_image(&self) -> Option<&str> {
        self.data
            .first()
            .and_then(|img| img.b64_json.as_deref())
            .filter(|b64| !b64.is_empty())
    }
}
