//! Test doubles for code that depends on [`AssetFetcher`].
//!
//! Built for this crate's tests and, with the `test-util` feature, for
//! downstream crates' tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::timeline::AssetBuffer;

use crate::fetcher::AssetFetcher;

/// In-memory fetcher serving pre-registered bodies. Counts every call.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    bodies: HashMap<String, Arc<[u8]>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` as the body of `url`.
    pub fn with(mut self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.bodies.insert(url.into(), bytes.into());
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.bodies.insert(url.into(), bytes.into());
    }

    /// Number of `fetch` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> SlidecastResult<AssetBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .map(|bytes| AssetBuffer::new(url, bytes.clone()))
            .ok_or_else(|| SlidecastError::asset_fetch(url, "HTTP status 404"))
    }
}
