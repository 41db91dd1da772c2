//! Error types shared across Slidecast crates.
//!
//! Every failure inside one encoding request maps onto exactly one variant
//! here. Nothing in the pipeline retries on its own; callers decide whether
//! to resubmit the whole request.

/// Top-level error type for Slidecast operations.
#[derive(Debug, thiserror::Error)]
pub enum SlidecastError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Failed to fetch asset {url}: {cause}")]
    AssetFetch { url: String, cause: String },

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Remote render error: {message}")]
    RemoteRender { message: String },

    #[error("Render job {job_id} did not finish after {attempts} status polls")]
    Timeout { job_id: String, attempts: u32 },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SlidecastError.
pub type SlidecastResult<T> = Result<T, SlidecastError>;

impl SlidecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn asset_fetch(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::AssetFetch {
            url: url.into(),
            cause: cause.to_string(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    pub fn remote_render(msg: impl Into<String>) -> Self {
        Self::RemoteRender {
            message: msg.into(),
        }
    }

    pub fn timeout(job_id: impl Into<String>, attempts: u32) -> Self {
        Self::Timeout {
            job_id: job_id.into(),
            attempts,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::AssetFetch { .. } => "asset_fetch",
            Self::Encoding { .. } => "encoding",
            Self::RemoteRender { .. } => "remote_render",
            Self::Timeout { .. } => "timeout",
            Self::Storage { .. } => "storage",
            Self::Config { .. } => "config",
            Self::Cancelled => "cancelled",
            Self::Io(_) | Self::Json(_) | Self::Other(_) => "internal",
        }
    }

    /// HTTP status an API front-end should answer with.
    ///
    /// Only malformed requests are client errors; everything else is a
    /// server-side failure of this request.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::AssetFetch { .. } | Self::RemoteRender { .. } => 502,
            Self::Timeout { .. } => 504,
            Self::Cancelled => 503,
            _ => 500,
        }
    }

    /// Whether the caller sent a bad request (as opposed to a pipeline failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
