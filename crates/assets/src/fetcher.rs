//! Byte transports for asset URLs.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use slidecast_common::config::AssetConfig;
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::timeline::AssetBuffer;

/// Fetches the raw bytes behind one URL.
///
/// Implementations block; the resolver runs them on the blocking pool.
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> SlidecastResult<AssetBuffer>;
}

/// Fetcher backed by `ureq` for `http(s)` and the filesystem for `file`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &AssetConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build();
        Self {
            agent,
            max_bytes: config.max_asset_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn fetch_http(&self, url: &str, parsed: &url::Url) -> SlidecastResult<AssetBuffer> {
        let response = match self.agent.get(parsed.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(SlidecastError::asset_fetch(url, format!("HTTP status {code}")))
            }
            Err(error) => return Err(SlidecastError::asset_fetch(url, error)),
        };

        if let Some(declared) = response
            .header("content-length")
            .and_then(|value| value.parse::<u64>().ok())
        {
            if declared > self.max_bytes {
                return Err(SlidecastError::asset_fetch(
                    url,
                    format!("body of {declared} bytes exceeds limit of {}", self.max_bytes),
                ));
            }
        }

        let content_type = response
            .header("content-type")
            .map(|value| value.to_string());

        let mut body = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|error| SlidecastError::asset_fetch(url, error))?;
        if body.len() as u64 > self.max_bytes {
            return Err(SlidecastError::asset_fetch(
                url,
                format!("body exceeds limit of {} bytes", self.max_bytes),
            ));
        }

        let mut buffer = AssetBuffer::new(url, body);
        buffer.content_type = content_type;
        Ok(buffer)
    }

    fn fetch_file(&self, url: &str, path: &Path) -> SlidecastResult<AssetBuffer> {
        let metadata =
            std::fs::metadata(path).map_err(|error| SlidecastError::asset_fetch(url, error))?;
        if !metadata.is_file() {
            return Err(SlidecastError::asset_fetch(url, "not a regular file"));
        }
        if metadata.len() > self.max_bytes {
            return Err(SlidecastError::asset_fetch(
                url,
                format!(
                    "file of {} bytes exceeds limit of {}",
                    metadata.len(),
                    self.max_bytes
                ),
            ));
        }
        let bytes = std::fs::read(path).map_err(|error| SlidecastError::asset_fetch(url, error))?;
        Ok(AssetBuffer::new(url, bytes))
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> SlidecastResult<AssetBuffer> {
        let parsed = slidecast_timeline_model::request::validate_url(url).map_err(|reason| {
            SlidecastError::validation(format!("invalid asset url '{url}': {reason}"))
        })?;

        let started = std::time::Instant::now();
        let buffer = if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| SlidecastError::asset_fetch(url, "not a local file path"))?;
            self.fetch_file(url, &path)?
        } else {
            self.fetch_http(url, &parsed)?
        };

        tracing::debug!(
            url,
            bytes = buffer.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Asset fetched"
        );
        Ok(buffer)
    }
}
