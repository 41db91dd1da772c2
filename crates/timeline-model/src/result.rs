//! Encoding results and the API response envelope.

use serde::{Deserialize, Serialize};

use slidecast_common::error::SlidecastError;

/// A finished, published video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingResult {
    /// Public URL of the artifact.
    pub url: String,
    /// Declared duration in seconds.
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    /// Container format, e.g. `mp4`.
    pub format: String,
    /// Frames in the video stream.
    pub frame_count: u64,
    /// Backend that produced it.
    pub backend: String,
}

impl EncodingResult {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// JSON body answered to an encode request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncodeResponse {
    Success {
        ok: bool,
        url: String,
        duration: f64,
        format: String,
        resolution: String,
    },
    Failure {
        ok: bool,
        error: String,
        kind: String,
        status: u16,
    },
}

impl EncodeResponse {
    pub fn success(result: &EncodingResult) -> Self {
        Self::Success {
            ok: true,
            url: result.url.clone(),
            duration: result.duration_seconds,
            format: result.format.clone(),
            resolution: result.resolution(),
        }
    }

    pub fn failure(error: &SlidecastError) -> Self {
        Self::Failure {
            ok: false,
            error: error.to_string(),
            kind: error.kind().to_string(),
            status: error.http_status(),
        }
    }

    pub fn from_result(result: &Result<EncodingResult, SlidecastError>) -> Self {
        match result {
            Ok(ok) => Self::success(ok),
            Err(err) => Self::failure(err),
        }
    }

    /// HTTP status code for this body.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success { .. } => 200,
            Self::Failure { status, .. } => *status,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
