//! Publishing finished videos to an object store.
//!
//! Objects are write-once: publishing onto an existing path is a storage
//! error rather than an overwrite.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use slidecast_common::config::StorageConfig;
use slidecast_common::error::{SlidecastError, SlidecastResult};

use crate::backend::EncodedArtifact;

/// Destination for published artifacts.
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path` and return its public URL. Fails if `path`
    /// already exists.
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> SlidecastResult<String>;
}

/// `{prefix}/{YYYYMMDD-HHMMSS}-{sha256[..12]}.{ext}`.
pub fn object_path(prefix: &str, bytes: &[u8], extension: &str, now: DateTime<Utc>) -> String {
    let digest = hex_digest(bytes);
    let name = format!("{}-{}.{extension}", now.format("%Y%m%d-%H%M%S"), &digest[..12]);
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// A directory served under `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> SlidecastResult<String> {
        if path.split('/').any(|part| part == "..") {
            return Err(SlidecastError::storage(format!("refusing object path '{path}'")));
        }
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SlidecastError::storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    SlidecastError::storage(format!("object {path} already exists"))
                }
                _ => SlidecastError::storage(format!("cannot create {}: {e}", target.display())),
            })?;
        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            let _ = std::fs::remove_file(&target);
            return Err(SlidecastError::storage(format!(
                "failed writing {}: {e}",
                target.display()
            )));
        }
        Ok(join_url(&self.public_base_url, path))
    }
}

/// An HTTP store accepting `PUT {endpoint}/{path}`.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    agent: ureq::Agent,
    endpoint: String,
    public_base_url: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        public_base_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(120))
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
            public_base_url: public_base_url.into(),
            token,
        }
    }
}

impl ObjectStore for HttpObjectStore {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> SlidecastResult<String> {
        let url = join_url(&self.endpoint, path);
        let mut request = self
            .agent
            .put(&url)
            .set("content-type", content_type)
            .set("if-none-match", "*");
        if let Some(token) = &self.token {
            request = request.set("authorization", &format!("Bearer {token}"));
        }

        match request.send_bytes(bytes) {
            Ok(_) => Ok(join_url(&self.public_base_url, path)),
            Err(ureq::Error::Status(409 | 412, _)) => Err(SlidecastError::storage(format!(
                "object {path} already exists"
            ))),
            Err(ureq::Error::Status(code, _)) => Err(SlidecastError::storage(format!(
                "PUT {url} rejected with HTTP {code}"
            ))),
            Err(e) => Err(SlidecastError::storage(format!("PUT {url} failed: {e}"))),
        }
    }
}

/// Uploads artifacts under content-addressed, timestamped names.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        let store: Arc<dyn ObjectStore> = match config {
            StorageConfig::Local {
                root,
                public_base_url,
                ..
            } => Arc::new(LocalObjectStore::new(root.clone(), public_base_url.clone())),
            StorageConfig::Http {
                endpoint,
                public_base_url,
                token,
                ..
            } => Arc::new(HttpObjectStore::new(
                endpoint.clone(),
                public_base_url.clone(),
                token.clone(),
            )),
        };
        Self::new(store, config.path_prefix())
    }

    /// Store `bytes` and return the public URL.
    pub fn publish(&self, bytes: &[u8], extension: &str, content_type: &str) -> SlidecastResult<String> {
        if bytes.is_empty() {
            return Err(SlidecastError::storage("refusing to publish an empty artifact"));
        }
        let path = object_path(&self.prefix, bytes, extension, Utc::now());
        let url = self.store.put(&path, bytes, content_type)?;
        tracing::info!(path = %path, bytes = bytes.len(), url = %url, "Artifact published");
        Ok(url)
    }

    /// Read `artifact` from the workspace and publish it.
    pub fn publish_artifact(&self, artifact: &EncodedArtifact) -> SlidecastResult<String> {
        let bytes = std::fs::read(&artifact.path).map_err(|e| {
            SlidecastError::storage(format!("cannot read {}: {e}", artifact.path.display()))
        })?;
        self.publish(&bytes, &artifact.format, artifact.content_type())
    }
}
