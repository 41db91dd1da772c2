//! End-to-end encode: request -> assets -> timeline -> backend -> publish.

use std::path::PathBuf;
use std::sync::Arc;

use slidecast_assets::{AssetFetcher, AssetResolver, HttpFetcher, RequestWorkspace};
use slidecast_common::config::{AppConfig, BackendKind};
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::request::EncodingRequest;
use slidecast_timeline_model::result::EncodingResult;
use slidecast_timeline_model::timeline::{Timeline, TimelineBuilder};

use crate::backend::{
    CancelSignal, EncodeContext, EncodedArtifact, EncodingBackend, ProgressPhase, ProgressReporter,
};
use crate::command_line::CommandLineEncoder;
use crate::frame_capture::FrameCaptureEncoder;
use crate::process::{command_exists, measure_duration};
use crate::publisher::Publisher;
use crate::remote::{HttpRenderApi, RemoteRenderBackend};

/// One AAC packet (1024 samples at 44.1 kHz). Muxed audio may end up to
/// this much past the last video frame.
const AAC_PACKET_SECS: f64 = 1024.0 / 44_100.0;

/// Build the backend named by `config.backend`. There is no fallback: an
/// unusable backend fails the request.
pub fn backend_from_config(
    config: &AppConfig,
    fetcher: Arc<dyn AssetFetcher>,
) -> SlidecastResult<Arc<dyn EncodingBackend>> {
    let backend: Arc<dyn EncodingBackend> = match config.backend {
        BackendKind::CommandLine => Arc::new(CommandLineEncoder::new(
            config.encoder.clone(),
            &config.text,
        )?),
        BackendKind::FrameCapture => Arc::new(FrameCaptureEncoder::new(
            config.encoder.clone(),
            &config.text,
        )?),
        BackendKind::Remote => Arc::new(RemoteRenderBackend::new(
            Arc::new(HttpRenderApi::new(&config.remote)),
            fetcher,
            &config.remote,
        )),
    };
    Ok(backend)
}

/// Runs encode requests against one backend and one object store.
///
/// Each run gets its own [`RequestWorkspace`]; nothing is shared between
/// concurrent runs except the store.
#[derive(Clone)]
pub struct Pipeline {
    resolver: AssetResolver,
    backend: Arc<dyn EncodingBackend>,
    publisher: Publisher,
    workspace_root: Option<PathBuf>,
    ffprobe_bin: Option<String>,
}

impl Pipeline {
    pub fn new(
        resolver: AssetResolver,
        backend: Arc<dyn EncodingBackend>,
        publisher: Publisher,
    ) -> Self {
        Self {
            resolver,
            backend,
            publisher,
            workspace_root: None,
            ffprobe_bin: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> SlidecastResult<Self> {
        let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpFetcher::new(&config.assets));
        let backend = backend_from_config(config, Arc::clone(&fetcher))?;
        Ok(Self::new(
            AssetResolver::new(fetcher),
            backend,
            Publisher::from_config(&config.storage),
        )
        .with_ffprobe(config.encoder.ffprobe_bin.clone()))
    }

    /// Create request workspaces under `root` instead of the system temp dir.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Measure every encoded file with `ffprobe_bin` before publishing it.
    /// The check is skipped, with a warning, when the binary is missing.
    pub fn with_ffprobe(mut self, ffprobe_bin: impl Into<String>) -> Self {
        self.ffprobe_bin = Some(ffprobe_bin.into());
        self
    }

    pub fn backend(&self) -> &dyn EncodingBackend {
        self.backend.as_ref()
    }

    pub async fn run(&self, request: &EncodingRequest) -> SlidecastResult<EncodingResult> {
        self.run_with(request, ProgressReporter::disabled(), CancelSignal::never())
            .await
    }

    /// Run one request to a published result.
    ///
    /// The request is validated before anything is fetched. The workspace
    /// is removed when this returns, on every path.
    pub async fn run_with(
        &self,
        request: &EncodingRequest,
        progress: ProgressReporter,
        cancel: CancelSignal,
    ) -> SlidecastResult<EncodingResult> {
        request.validate()?;

        let backend = self.backend.name();
        if !self.backend.is_available() {
            return Err(SlidecastError::encoding(format!(
                "backend '{backend}' is not available on this host"
            )));
        }

        let workspace = Arc::new(match &self.workspace_root {
            Some(root) => RequestWorkspace::new_in(root)?,
            None => RequestWorkspace::new()?,
        });
        let request_id = workspace.id().to_string();
        let started = std::time::Instant::now();
        tracing::info!(
            request_id = %request_id,
            backend,
            images = request.images.len(),
            audio = request.audio.is_some(),
            fps = request.fps,
            "Encode request started"
        );

        progress.report(ProgressPhase::Resolving, 0.0);
        let (mut images, mut audio) = tokio::try_join!(
            self.resolver.resolve(&request.images),
            async {
                match &request.audio {
                    Some(url) => self.resolver.resolve_one(url).await.map(Some),
                    None => Ok(None),
                }
            }
        )?;
        progress.report(ProgressPhase::Resolving, 100.0);
        cancel.check()?;

        progress.report(ProgressPhase::Building, 0.0);
        workspace.materialize_all(&mut images, "image")?;
        if let Some(buffer) = audio.as_mut() {
            workspace.materialize(buffer, "audio")?;
        }
        let build_request = request.clone();
        let timeline = tokio::task::spawn_blocking(move || {
            TimelineBuilder::new().build(&build_request, &images, audio.as_ref())
        })
        .await
        .map_err(|e| SlidecastError::encoding(format!("timeline build task failed: {e}")))??;
        let timeline = Arc::new(timeline);
        progress.report(ProgressPhase::Building, 100.0);
        tracing::info!(
            request_id = %request_id,
            clips = timeline.clips().len(),
            duration = timeline.total_duration(),
            frames = timeline.frame_count(),
            "Timeline built"
        );
        cancel.check()?;

        let ctx = EncodeContext::new(Arc::clone(&workspace))
            .with_progress(progress.clone())
            .with_cancel(cancel.clone());
        let mut artifact = self.backend.encode(Arc::clone(&timeline), &ctx).await?;
        if let Some(ffprobe_bin) = &self.ffprobe_bin {
            artifact = measure_artifact(ffprobe_bin, artifact, &timeline).await?;
        }
        cancel.check()?;

        progress.report(ProgressPhase::Publishing, 0.0);
        let publisher = self.publisher.clone();
        let to_publish = artifact.clone();
        let url = tokio::task::spawn_blocking(move || publisher.publish_artifact(&to_publish))
            .await
            .map_err(|e| SlidecastError::storage(format!("publish task failed: {e}")))??;
        progress.report(ProgressPhase::Publishing, 100.0);

        let result = EncodingResult {
            url,
            duration_seconds: artifact.duration_seconds,
            width: artifact.width,
            height: artifact.height,
            format: artifact.format,
            frame_count: artifact.frame_count,
            backend: backend.to_string(),
        };
        progress.report(ProgressPhase::Complete, 100.0);
        tracing::info!(
            request_id = %request_id,
            backend,
            url = %result.url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Encode request finished"
        );
        Ok(result)
    }
}

/// Replace the declared duration with the one ffprobe measures, failing
/// when it is off by more than the allowed tolerance.
async fn measure_artifact(
    ffprobe_bin: &str,
    mut artifact: EncodedArtifact,
    timeline: &Timeline,
) -> SlidecastResult<EncodedArtifact> {
    if !command_exists(ffprobe_bin) {
        tracing::warn!(ffprobe = ffprobe_bin, "ffprobe not found, skipping duration check");
        return Ok(artifact);
    }
    let bin = ffprobe_bin.to_string();
    let path = artifact.path.clone();
    let measured = tokio::task::spawn_blocking(move || measure_duration(&bin, &path))
        .await
        .map_err(|e| SlidecastError::encoding(format!("ffprobe task failed: {e}")))??;
    check_duration(
        measured,
        timeline.total_duration(),
        timeline.fps(),
        timeline.audio().is_some(),
    )?;
    tracing::debug!(measured, expected = timeline.total_duration(), "Duration verified");
    artifact.duration_seconds = measured;
    Ok(artifact)
}

/// A file may be off by one video frame, plus one audio packet when it
/// carries audio.
fn check_duration(measured: f64, expected: f64, fps: u32, with_audio: bool) -> SlidecastResult<()> {
    let mut tolerance = 1.0 / fps as f64;
    if with_audio {
        tolerance += AAC_PACKET_SECS;
    }
    if (measured - expected).abs() > tolerance + 1e-9 {
        return Err(SlidecastError::encoding(format!(
            "encoded file is {measured:.3}s, expected {expected:.3}s"
        )));
    }
    Ok(())
}
