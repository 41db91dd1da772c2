//! Remote render service backend.
//!
//! The timeline is described as a declarative job, submitted to
//! `POST {base}/render` and driven to completion by the
//! [`RenderJobSupervisor`]. The finished file is downloaded into the
//! request workspace so publishing works the same as for local backends.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use slidecast_assets::AssetFetcher;
use slidecast_common::config::RemoteRenderConfig;
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::effect::EffectSpec;
use slidecast_timeline_model::geometry::FitMode;
use slidecast_timeline_model::job::{RemoteStatus, RenderJob};
use slidecast_timeline_model::overlay::{BandPosition, Color};
use slidecast_timeline_model::timeline::Timeline;

use crate::backend::{EncodeContext, EncodedArtifact, EncodingBackend, ProgressPhase};
use crate::supervisor::{RenderJobSupervisor, SupervisorConfig};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The render service's two endpoints.
#[async_trait::async_trait]
pub trait RenderApi: Send + Sync {
    /// Submit a job; returns the service's job id.
    async fn submit(&self, spec: &RenderJobSpec) -> SlidecastResult<String>;

    /// Current state of job `job_id`.
    async fn status(&self, job_id: &str) -> SlidecastResult<RemoteStatus>;
}

/// Declarative job body for `POST /render`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobSpec {
    /// Layers, topmost first.
    pub tracks: Vec<JobTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soundtrack: Option<JobSoundtrack>,
    pub output: JobOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTrack {
    pub clips: Vec<JobClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobClip {
    pub asset: JobAsset,
    pub start: f64,
    pub length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<JobTransition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobAsset {
    Image {
        src: String,
    },
    Title {
        text: String,
        style: String,
        position: String,
        size: f32,
        color: Color,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        background: Option<Color>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTransition {
    #[serde(rename = "in")]
    pub fade_in: String,
    #[serde(rename = "out")]
    pub fade_out: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSoundtrack {
    pub src: String,
    pub volume: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub format: String,
    /// `"WxH"`.
    pub resolution: String,
    /// Reduced `"W:H"`.
    pub aspect_ratio: String,
    pub fps: u32,
    pub size: JobSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// Preset name the service uses for `effect`, if it is a motion effect.
fn motion_preset(effect: EffectSpec) -> Option<&'static str> {
    match effect {
        EffectSpec::ZoomIn => Some("zoomIn"),
        EffectSpec::ZoomOut => Some("zoomOut"),
        EffectSpec::PanRightToLeft => Some("slideLeft"),
        EffectSpec::SlideUp => Some("slideUp"),
        EffectSpec::None | EffectSpec::Fade => None,
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Reduced aspect ratio, e.g. `1080x1920` -> `"9:16"`.
pub fn aspect_ratio(width: u32, height: u32) -> String {
    let d = gcd(width, height).max(1);
    format!("{}:{}", width / d, height / d)
}

fn remote_source(url: &str) -> SlidecastResult<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| SlidecastError::validation(format!("invalid asset url '{url}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        scheme => Err(SlidecastError::validation(format!(
            "the remote backend cannot read {scheme} URLs ({url})"
        ))),
    }
}

/// Describe `timeline` as a render job. Asset references stay the original
/// source URLs.
pub fn job_spec(timeline: &Timeline, output_format: &str) -> SlidecastResult<RenderJobSpec> {
    let total = timeline.total_duration();
    let mut tracks = Vec::new();

    let mut overlay_clips = Vec::new();
    if let Some(overlay) = timeline.overlay() {
        overlay_clips.push(JobClip {
            asset: JobAsset::Title {
                text: overlay.text.clone(),
                style: overlay.style.as_str().to_string(),
                position: overlay.position.as_str().to_string(),
                size: overlay.font_size,
                color: overlay.color,
                background: None,
            },
            start: 0.0,
            length: total,
            fit: None,
            effect: None,
            transition: None,
        });
    }
    for band in timeline.bands() {
        overlay_clips.push(JobClip {
            asset: JobAsset::Title {
                text: band.text.clone(),
                style: "band".to_string(),
                position: match band.position {
                    BandPosition::Top => "top",
                    BandPosition::Bottom => "bottom",
                }
                .to_string(),
                size: band.font_size(timeline.height()),
                color: band.color,
                background: Some(band.background),
            },
            start: 0.0,
            length: total,
            fit: None,
            effect: None,
            transition: None,
        });
    }
    if !overlay_clips.is_empty() {
        tracks.push(JobTrack {
            clips: overlay_clips,
        });
    }

    let clips = timeline
        .clips()
        .iter()
        .map(|clip| {
            Ok(JobClip {
                asset: JobAsset::Image {
                    src: remote_source(&clip.asset.source_url)?,
                },
                start: clip.start_time,
                length: clip.duration,
                fit: Some(clip.fit),
                effect: motion_preset(clip.effect).map(str::to_string),
                transition: (clip.effect == EffectSpec::Fade).then(|| JobTransition {
                    fade_in: "fade".to_string(),
                    fade_out: "fade".to_string(),
                }),
            })
        })
        .collect::<SlidecastResult<Vec<_>>>()?;
    tracks.push(JobTrack { clips });

    let soundtrack = timeline
        .audio()
        .map(|track| {
            Ok::<_, SlidecastError>(JobSoundtrack {
                src: remote_source(&track.asset.source_url)?,
                volume: track.volume,
                fade_in: track.fade_in,
                fade_out: track.fade_out,
            })
        })
        .transpose()?;

    Ok(RenderJobSpec {
        tracks,
        soundtrack,
        output: JobOutput {
            format: output_format.to_string(),
            resolution: format!("{}x{}", timeline.width(), timeline.height()),
            aspect_ratio: aspect_ratio(timeline.width(), timeline.height()),
            fps: timeline.fps(),
            size: JobSize {
                width: timeline.width(),
                height: timeline.height(),
            },
        },
    })
}

/// [`RenderApi`] over HTTP with `ureq`.
#[derive(Debug, Clone)]
pub struct HttpRenderApi {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRenderApi {
    pub fn new(config: &RemoteRenderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.api_key {
            Some(key) => request.set(API_KEY_HEADER, key),
            None => request,
        }
    }

    fn submit_blocking(&self, body: String) -> SlidecastResult<String> {
        let url = format!("{}/render", self.base_url);
        let request = self
            .authorize(self.agent.post(&url))
            .set("content-type", "application/json");
        let text = read_response(request.send_string(&body), "submit")?;
        let parsed: SubmitResponse = serde_json::from_str(&text).map_err(|e| {
            SlidecastError::remote_render(format!("unexpected submit response: {e}"))
        })?;
        Ok(parsed.id)
    }

    fn status_blocking(&self, job_id: &str) -> SlidecastResult<RemoteStatus> {
        let url = format!("{}/render/{job_id}", self.base_url);
        let text = read_response(self.authorize(self.agent.get(&url)).call(), "status")?;
        serde_json::from_str(&text).map_err(|e| {
            SlidecastError::remote_render(format!("unexpected status response for {job_id}: {e}"))
        })
    }
}

fn read_response(
    result: Result<ureq::Response, ureq::Error>,
    operation: &str,
) -> SlidecastResult<String> {
    match result {
        Ok(response) => {
            let mut text = String::new();
            response
                .into_reader()
                .take(1024 * 1024)
                .read_to_string(&mut text)
                .map_err(|e| SlidecastError::remote_render(format!("{operation}: {e}")))?;
            Ok(text)
        }
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(SlidecastError::remote_render(format!(
                "{operation} rejected with HTTP {code}: {}",
                body.trim()
            )))
        }
        Err(err) => Err(SlidecastError::remote_render(format!("{operation}: {err}"))),
    }
}

#[async_trait::async_trait]
impl RenderApi for HttpRenderApi {
    async fn submit(&self, spec: &RenderJobSpec) -> SlidecastResult<String> {
        let body = serde_json::to_string(spec)?;
        let api = self.clone();
        tokio::task::spawn_blocking(move || api.submit_blocking(body))
            .await
            .map_err(|e| SlidecastError::remote_render(format!("submit task failed: {e}")))?
    }

    async fn status(&self, job_id: &str) -> SlidecastResult<RemoteStatus> {
        let api = self.clone();
        let job_id = job_id.to_string();
        tokio::task::spawn_blocking(move || api.status_blocking(&job_id))
            .await
            .map_err(|e| SlidecastError::remote_render(format!("status task failed: {e}")))?
    }
}

/// Encodes by delegating to a remote render service.
pub struct RemoteRenderBackend {
    api: Arc<dyn RenderApi>,
    fetcher: Arc<dyn AssetFetcher>,
    supervisor: SupervisorConfig,
    output_format: String,
}

impl RemoteRenderBackend {
    pub fn new(
        api: Arc<dyn RenderApi>,
        fetcher: Arc<dyn AssetFetcher>,
        config: &RemoteRenderConfig,
    ) -> Self {
        Self {
            api,
            fetcher,
            supervisor: SupervisorConfig::from(config),
            output_format: config.output_format.clone(),
        }
    }
}

#[async_trait::async_trait]
impl EncodingBackend for RemoteRenderBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn encode(
        &self,
        timeline: Arc<Timeline>,
        ctx: &EncodeContext,
    ) -> SlidecastResult<EncodedArtifact> {
        let spec = job_spec(&timeline, &self.output_format)?;
        ctx.cancel.check()?;
        ctx.progress.report(ProgressPhase::RemoteRendering, 0.0);

        let job_id = self.api.submit(&spec).await?;
        tracing::info!(job_id = %job_id, clips = timeline.clips().len(), "Render job submitted");

        let mut job = RenderJob::new(job_id);
        let supervisor = RenderJobSupervisor::new(Arc::clone(&self.api), self.supervisor.clone());
        let result_url = supervisor
            .supervise(&mut job, &ctx.cancel, &ctx.progress)
            .await?;

        let fetcher = Arc::clone(&self.fetcher);
        let download_url = result_url.clone();
        let buffer = tokio::task::spawn_blocking(move || fetcher.fetch(&download_url))
            .await
            .map_err(|e| SlidecastError::remote_render(format!("download task failed: {e}")))??;
        if buffer.is_empty() {
            return Err(SlidecastError::remote_render(format!(
                "render result {result_url} is empty"
            )));
        }
        let path = ctx
            .workspace
            .write(&format!("output.{}", self.output_format), &buffer.bytes)?;
        tracing::info!(job_id = %job.id, bytes = buffer.len(), "Render result downloaded");

        Ok(EncodedArtifact {
            path,
            remote_url: Some(result_url),
            duration_seconds: timeline.total_duration(),
            width: timeline.width(),
            height: timeline.height(),
            format: self.output_format.clone(),
            frame_count: timeline.frame_count(),
        })
    }
}
