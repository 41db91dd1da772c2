//! Per-request scratch directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use slidecast_common::error::SlidecastResult;
use slidecast_timeline_model::timeline::AssetBuffer;

/// A temporary directory owned by one encoding request.
///
/// Every file a request writes lives here. The directory and its contents
/// are removed when the workspace is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: TempDir,
    id: String,
}

impl RequestWorkspace {
    /// Create a workspace under the system temp directory.
    pub fn new() -> SlidecastResult<Self> {
        let dir = tempfile::Builder::new().prefix("slidecast-").tempdir()?;
        Ok(Self::from_dir(dir))
    }

    /// Create a workspace under `parent`.
    pub fn new_in(parent: impl AsRef<Path>) -> SlidecastResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("slidecast-")
            .tempdir_in(parent)?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        let id = dir
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().trim_start_matches("slidecast-").to_string())
            .unwrap_or_default();
        tracing::debug!(path = %dir.path().display(), "Request workspace created");
        Self { dir, id }
    }

    /// Short identifier, unique among live workspaces. Used in log fields.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file named `name` inside the workspace (not created).
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Where a backend writes its output container.
    pub fn output_path(&self, format: &str) -> PathBuf {
        self.file_path(&format!("output.{format}"))
    }

    /// Write `bytes` to `name` and return the path.
    pub fn write(&self, name: &str, bytes: &[u8]) -> SlidecastResult<PathBuf> {
        let path = self.file_path(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Write the buffer to `{stem}.{ext}` and record the path on it.
    ///
    /// Already materialized buffers are left alone.
    pub fn materialize(&self, buffer: &mut AssetBuffer, stem: &str) -> SlidecastResult<PathBuf> {
        if let Some(existing) = &buffer.local_path {
            if existing.starts_with(self.path()) && existing.exists() {
                return Ok(existing.clone());
            }
        }
        let ext = buffer.extension().unwrap_or_else(|| "bin".to_string());
        let path = self.write(&format!("{stem}.{ext}"), &buffer.bytes)?;
        buffer.local_path = Some(path.clone());
        Ok(path)
    }

    /// Materialize a batch as `{prefix}-000.ext`, `{prefix}-001.ext`, ...
    pub fn materialize_all(
        &self,
        buffers: &mut [AssetBuffer],
        prefix: &str,
    ) -> SlidecastResult<Vec<PathBuf>> {
        buffers
            .iter_mut()
            .enumerate()
            .map(|(i, buffer)| self.materialize(buffer, &format!("{prefix}-{i:03}")))
            .collect()
    }
}
