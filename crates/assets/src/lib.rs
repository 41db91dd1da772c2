//! Slidecast Assets
//!
//! Everything a request touches outside the process before encoding:
//! - **Fetcher:** blocking byte transport for `http(s)` and `file` URLs
//! - **Resolver:** concurrent, order-preserving resolution of a request's assets
//! - **Workspace:** the scoped scratch directory a request writes into

pub mod fetcher;
pub mod resolver;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod workspace;

pub use fetcher::{AssetFetcher, HttpFetcher};
pub use resolver::AssetResolver;
pub use workspace::RequestWorkspace;
