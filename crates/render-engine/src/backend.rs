//! The encoding backend seam and the per-request context it runs in.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use slidecast_assets::RequestWorkspace;
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::timeline::Timeline;

/// Turns a [`Timeline`] into a video artifact.
#[async_trait::async_trait]
pub trait EncodingBackend: Send + Sync {
    /// Stable backend name, as written in configuration.
    fn name(&self) -> &'static str;

    /// Whether the backend's external requirements are present.
    fn is_available(&self) -> bool {
        true
    }

    /// Encode the whole timeline. On success the artifact file lives inside
    /// `ctx.workspace`.
    async fn encode(
        &self,
        timeline: Arc<Timeline>,
        ctx: &EncodeContext,
    ) -> SlidecastResult<EncodedArtifact>;
}

/// A finished, not yet published video.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    /// Container file inside the request workspace.
    pub path: PathBuf,
    /// Where a remote service left the result, if one produced it.
    pub remote_url: Option<String>,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub frame_count: u64,
}

impl EncodedArtifact {
    /// MIME type of the container.
    pub fn content_type(&self) -> &'static str {
        match self.format.as_str() {
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mov" => "video/quicktime",
            "gif" => "image/gif",
            _ => "application/octet-stream",
        }
    }
}

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Resolving,
    Building,
    Encoding,
    RemoteRendering,
    Publishing,
    Complete,
}

/// Progress of one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// Completion of the phase in `[0, 100]`.
    pub percent: f64,
}

/// Sends progress events without ever blocking the sender.
///
/// A full or closed channel drops the event; progress is advisory.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A reporter plus the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn report(&self, phase: ProgressPhase, percent: f64) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(ProgressEvent {
                phase,
                percent: percent.clamp(0.0, 100.0),
            });
        }
    }
}

/// Sender side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver side of a cancellation signal, cloned into every stage.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_handle, signal) = Self::new();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Cancelled)` once the signal has fired.
    pub fn check(&self) -> SlidecastResult<()> {
        if self.is_cancelled() {
            Err(SlidecastError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when the signal fires. Never resolves if the handle was
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a backend needs besides the timeline.
#[derive(Debug, Clone)]
pub struct EncodeContext {
    pub workspace: Arc<RequestWorkspace>,
    pub progress: ProgressReporter,
    pub cancel: CancelSignal,
}

impl EncodeContext {
    pub fn new(workspace: Arc<RequestWorkspace>) -> Self {
        Self {
            workspace,
            progress: ProgressReporter::disabled(),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}
