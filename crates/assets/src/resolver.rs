//! Concurrent resolution of a request's assets.

use std::sync::Arc;

use tokio::task::JoinSet;

use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::request::validate_url;
use slidecast_timeline_model::timeline::AssetBuffer;

use crate::fetcher::AssetFetcher;

/// Resolves URLs to buffers through an [`AssetFetcher`].
///
/// Fetches of one batch run concurrently on the blocking pool. Results come
/// back in input order; the first failure aborts the batch.
#[derive(Clone)]
pub struct AssetResolver {
    fetcher: Arc<dyn AssetFetcher>,
}

impl std::fmt::Debug for AssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetResolver").finish_non_exhaustive()
    }
}

impl AssetResolver {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Arc<dyn AssetFetcher> {
        &self.fetcher
    }

    /// Fetch a single URL.
    pub async fn resolve_one(&self, url: &str) -> SlidecastResult<AssetBuffer> {
        check_url(url)?;
        let fetcher = Arc::clone(&self.fetcher);
        let owned = url.to_string();
        tokio::task::spawn_blocking(move || fetcher.fetch(&owned))
            .await
            .map_err(|e| SlidecastError::asset_fetch(url, format!("fetch task failed: {e}")))?
    }

    /// Fetch every URL; the returned buffers line up with `urls`.
    pub async fn resolve(&self, urls: &[String]) -> SlidecastResult<Vec<AssetBuffer>> {
        // Reject the whole batch before any network traffic.
        for url in urls {
            check_url(url)?;
        }

        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let url = url.clone();
            tasks.spawn_blocking(move || (index, fetcher.fetch(&url)));
        }

        let mut slots: Vec<Option<AssetBuffer>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| {
                SlidecastError::Other(anyhow::anyhow!("asset fetch task failed: {e}"))
            })?;
            match result {
                Ok(buffer) => slots[index] = Some(buffer),
                Err(error) => {
                    tracing::warn!(url = %urls[index], error = %error, "Asset fetch failed, aborting batch");
                    tasks.abort_all();
                    return Err(error);
                }
            }
        }

        let buffers: Vec<AssetBuffer> = slots.into_iter().flatten().collect();
        if buffers.len() != urls.len() {
            return Err(SlidecastError::Other(anyhow::anyhow!(
                "asset batch finished with {} of {} buffers",
                buffers.len(),
                urls.len()
            )));
        }

        tracing::info!(
            assets = buffers.len(),
            bytes = buffers.iter().map(AssetBuffer::len).sum::<usize>(),
            "Assets resolved"
        );
        Ok(buffers)
    }
}

fn check_url(url: &str) -> SlidecastResult<()> {
    validate_url(url)
        .map(|_| ())
        .map_err(|reason| SlidecastError::validation(format!("invalid asset url '{url}': {reason}")))
}
