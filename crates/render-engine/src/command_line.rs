//! ffmpeg backend driven by a generated filter graph.
//!
//! ```text
//! img0 (looped) ─ scale(zoom) ─ overlay on black(pan/slide) ─ fade ─┐
//! img1 (looped) ─ ...                                               ├─ concat ─ text ─ bands ─ yuv420p ─► [vout]
//! imgN (looped) ─ ...                                               ┘
//! audio ─ volume ─ afade in ─ afade out ─ apad ─► [aout]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use slidecast_common::config::{EncoderConfig, TextConfig};
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_frame_synth::{layout_band, layout_overlay, TextRenderer};
use slidecast_timeline_model::effect::{
    EffectSpec, PAN_RANGE_FRACTION, SLIDE_OFFSET_FRACTION, ZOOM_AMOUNT,
};
use slidecast_timeline_model::geometry::fit_rect;
use slidecast_timeline_model::overlay::{Color, OverlayText, TextPosition, TextStyle};
use slidecast_timeline_model::timeline::{AudioTrack, Clip, Timeline};

use crate::backend::{EncodeContext, EncodedArtifact, EncodingBackend, ProgressPhase};
use crate::process::{command_exists, output_codec_args, run_ffmpeg};

const GRADIENT_STRIPS: usize = 8;
const GRADIENT_MAX_OPACITY: f64 = 180.0 / 255.0;

/// A fully resolved ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegPlan {
    pub args: Vec<String>,
    pub filter_graph: String,
    pub total_frames: u64,
    pub duration_secs: f64,
    pub output_path: PathBuf,
}

/// Encodes by running the ffmpeg binary once over all clip images.
pub struct CommandLineEncoder {
    encoder: EncoderConfig,
    font_file: Option<PathBuf>,
    text: TextRenderer,
}

impl std::fmt::Debug for CommandLineEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLineEncoder")
            .field("ffmpeg_bin", &self.encoder.ffmpeg_bin)
            .field("font_file", &self.font_file)
            .finish()
    }
}

impl CommandLineEncoder {
    pub fn new(encoder: EncoderConfig, text: &TextConfig) -> SlidecastResult<Self> {
        Ok(Self {
            encoder,
            font_file: text.font_path.clone(),
            text: TextRenderer::from_config(text)?,
        })
    }

    /// Build the invocation rendering `timeline` to `output`.
    ///
    /// Every clip (and the audio track, if any) must already be
    /// materialized to a local file.
    pub fn plan(&self, timeline: &Timeline, output: &Path) -> SlidecastResult<FfmpegPlan> {
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let fps = timeline.fps();
        for clip in timeline.clips() {
            let path = clip.asset.local_path.as_ref().ok_or_else(|| {
                SlidecastError::encoding(format!(
                    "clip {} ({}) has not been written to the workspace",
                    clip.index, clip.asset.source_url
                ))
            })?;
            args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-framerate".to_string(),
                fps.to_string(),
                "-t".to_string(),
                num(clip.duration),
                "-i".to_string(),
                path.display().to_string(),
            ]);
        }

        let audio_index = timeline.clips().len();
        if let Some(track) = timeline.audio() {
            let path = track.asset.local_path.as_ref().ok_or_else(|| {
                SlidecastError::encoding("audio track has not been written to the workspace")
            })?;
            args.push("-i".to_string());
            args.push(path.display().to_string());
        }

        let filter_graph = self.filter_graph(timeline, audio_index);

        args.push("-filter_complex".to_string());
        args.push(filter_graph.clone());
        args.push("-map".to_string());
        args.push("[vout]".to_string());
        if timeline.audio().is_some() {
            args.push("-map".to_string());
            args.push("[aout]".to_string());
        }
        args.push("-r".to_string());
        args.push(fps.to_string());
        args.push("-t".to_string());
        args.push(num(timeline.total_duration()));
        args.extend(output_codec_args(&self.encoder, timeline.audio().is_some()));
        args.push(output.display().to_string());

        Ok(FfmpegPlan {
            args,
            filter_graph,
            total_frames: timeline.frame_count(),
            duration_secs: timeline.total_duration(),
            output_path: output.to_path_buf(),
        })
    }

    fn filter_graph(&self, timeline: &Timeline, audio_index: usize) -> String {
        let mut parts: Vec<String> = timeline
            .clips()
            .iter()
            .map(|clip| clip_chain(clip, timeline))
            .collect();

        let labels: String = (0..timeline.clips().len())
            .map(|i| format!("[v{i}]"))
            .collect();
        parts.push(format!(
            "{labels}concat=n={}:v=1:a=0[vcat]",
            timeline.clips().len()
        ));

        let mut post = Vec::new();
        if let Some(overlay) = timeline.overlay() {
            post.extend(self.overlay_filters(overlay, timeline.width(), timeline.height()));
        }
        for band in timeline.bands() {
            let layout = layout_band(band, timeline.width(), timeline.height(), &self.text);
            post.push(format!(
                "drawbox=x=0:y={}:w=iw:h={}:color={}:t=fill",
                num(layout.area.y),
                num(layout.area.h),
                ffmpeg_color(band.background)
            ));
            if !layout.line.text.is_empty() {
                post.push(self.drawtext(
                    &layout.line.text,
                    layout.font_size,
                    band.color,
                    layout.line.top,
                    None,
                ));
            }
        }
        post.push("format=yuv420p".to_string());
        parts.push(format!("[vcat]{}[vout]", post.join(",")));

        if let Some(track) = timeline.audio() {
            parts.push(format!(
                "[{audio_index}:a]{}[aout]",
                audio_chain(track, timeline.total_duration())
            ));
        }

        parts.join(";")
    }

    fn overlay_filters(&self, overlay: &OverlayText, width: u32, height: u32) -> Vec<String> {
        let block = layout_overlay(overlay, width, height, &self.text);
        if block.lines.is_empty() {
            return Vec::new();
        }

        let mut filters = Vec::new();
        let border = match overlay.style {
            TextStyle::Clean => {
                filters.push(format!(
                    "drawbox=x={}:y={}:w={}:h={}:color=black@0.55:t=fill",
                    num(block.bounds.x),
                    num(block.bounds.y),
                    num(block.bounds.w),
                    num(block.bounds.h)
                ));
                None
            }
            TextStyle::Gradient => {
                let strip_h = block.bounds.h / GRADIENT_STRIPS as f64;
                for strip in 0..GRADIENT_STRIPS {
                    let along = (strip as f64 + 0.5) / GRADIENT_STRIPS as f64;
                    let weight = match overlay.position {
                        TextPosition::Top => 1.0 - along,
                        TextPosition::Center => 1.0 - (2.0 * along - 1.0).abs(),
                        TextPosition::Bottom => along,
                    };
                    filters.push(format!(
                        "drawbox=x=0:y={}:w=iw:h={}:color=black@{:.3}:t=fill",
                        num(block.bounds.y + strip as f64 * strip_h),
                        num(strip_h.ceil()),
                        GRADIENT_MAX_OPACITY * weight
                    ));
                }
                None
            }
            TextStyle::Minimalist => Some("borderw=2:bordercolor=black@0.86"),
        };

        for line in &block.lines {
            filters.push(self.drawtext(
                &line.text,
                block.font_size,
                overlay.color,
                line.top,
                border,
            ));
        }
        filters
    }

    fn drawtext(
        &self,
        text: &str,
        font_size: f32,
        color: Color,
        top: f64,
        border: Option<&str>,
    ) -> String {
        let mut filter = format!(
            "drawtext=text={}:expansion=none:fontsize={}:fontcolor={}:x=(w-text_w)/2:y={}",
            escape_filter_value(text),
            font_size.round() as u32,
            ffmpeg_color(color),
            num(top)
        );
        if let Some(font) = &self.font_file {
            filter.push_str(&format!(
                ":fontfile={}",
                escape_filter_value(&font.display().to_string())
            ));
        }
        if let Some(border) = border {
            filter.push(':');
            filter.push_str(border);
        }
        filter
    }
}

#[async_trait::async_trait]
impl EncodingBackend for CommandLineEncoder {
    fn name(&self) -> &'static str {
        "command_line"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.encoder.ffmpeg_bin)
    }

    async fn encode(
        &self,
        timeline: Arc<Timeline>,
        ctx: &EncodeContext,
    ) -> SlidecastResult<EncodedArtifact> {
        let output = ctx.workspace.output_path("mp4");
        let plan = self.plan(&timeline, &output)?;
        tracing::info!(
            workspace = ctx.workspace.id(),
            clips = timeline.clips().len(),
            frames = plan.total_frames,
            filter_len = plan.filter_graph.len(),
            "Command-line encode planned"
        );
        ctx.progress.report(ProgressPhase::Encoding, 0.0);

        let bin = self.encoder.ffmpeg_bin.clone();
        let progress = ctx.progress.clone();
        let cancel = ctx.cancel.clone();
        let args = plan.args.clone();
        let duration = plan.duration_secs;
        tokio::task::spawn_blocking(move || run_ffmpeg(&bin, &args, duration, &progress, &cancel))
            .await
            .map_err(|e| SlidecastError::encoding(format!("encoder task failed: {e}")))??;

        let written = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(SlidecastError::encoding(format!(
                "ffmpeg reported success but {} is missing or empty",
                output.display()
            )));
        }

        Ok(EncodedArtifact {
            path: output,
            remote_url: None,
            duration_seconds: timeline.total_duration(),
            width: timeline.width(),
            height: timeline.height(),
            format: "mp4".to_string(),
            frame_count: plan.total_frames,
        })
    }
}

/// `[i:v]` -> fitted, effect-animated, black-padded segment `[vi]`.
fn clip_chain(clip: &Clip, timeline: &Timeline) -> String {
    let (w, h) = (timeline.width(), timeline.height());
    let fit = fit_rect(clip.asset.width(), clip.asset.height(), w, h, clip.fit);
    let exprs = EffectExprs::new(clip.effect, clip.duration, w, h);
    let i = clip.index;
    let d = num(clip.duration);

    let mut chain = format!(
        "[{i}:v]format=rgba,scale=w='trunc({fw}*({s})/2)*2':h='trunc({fh}*({s})/2)*2':eval=frame[fg{i}];\
         color=c=black:s={w}x{h}:r={fps}:d={d}[bg{i}];\
         [bg{i}][fg{i}]overlay=x='(W-w)/2+({dx})':y='(H-h)/2+({dy})':eval=frame:shortest=1,\
         trim=duration={d},setpts=PTS-STARTPTS",
        fw = num(fit.w),
        fh = num(fit.h),
        s = exprs.scale,
        dx = exprs.dx,
        dy = exprs.dy,
        fps = timeline.fps(),
    );
    if clip.effect == EffectSpec::Fade {
        let half = num(clip.duration / 2.0);
        chain.push_str(&format!(
            ",fade=t=in:st=0:d={half}:color=black,fade=t=out:st={half}:d={half}:color=black"
        ));
    }
    chain.push_str(&format!(",format=yuv420p[v{i}]"));
    chain
}

/// ffmpeg expressions of the canonical effect formulas, in clip-local `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectExprs {
    pub scale: String,
    pub dx: String,
    pub dy: String,
}

impl EffectExprs {
    pub fn new(effect: EffectSpec, duration: f64, canvas_w: u32, canvas_h: u32) -> Self {
        let p = format!("clip(t/{},0,1)", num(duration));
        let k = num(ZOOM_AMOUNT);
        let (scale, dx, dy) = match effect {
            EffectSpec::None | EffectSpec::Fade => ("1".to_string(), "0".to_string(), "0".to_string()),
            EffectSpec::ZoomIn => (format!("1+{k}*{p}"), "0".into(), "0".into()),
            EffectSpec::ZoomOut => (format!("1+{k}*(1-{p})"), "0".into(), "0".into()),
            EffectSpec::PanRightToLeft => (
                num(1.0 + ZOOM_AMOUNT),
                format!("{}*(0.5-{p})", num(PAN_RANGE_FRACTION * canvas_w as f64)),
                "0".into(),
            ),
            EffectSpec::SlideUp => (
                "1".into(),
                "0".into(),
                format!("{}*(1-{p})", num(SLIDE_OFFSET_FRACTION * canvas_h as f64)),
            ),
        };
        Self { scale, dx, dy }
    }
}

/// `volume, afade in, afade out, apad`; the fade-out ends at `total`.
pub(crate) fn audio_chain(track: &AudioTrack, total: f64) -> String {
    let mut chain = vec![format!("volume={:.3}", track.volume)];
    if track.fade_in > 0.0 {
        chain.push(format!("afade=t=in:st=0:d={}", num(track.fade_in)));
    }
    if track.fade_out > 0.0 {
        let start = (total - track.fade_out).max(0.0);
        chain.push(format!(
            "afade=t=out:st={}:d={}",
            num(start),
            num(track.fade_out)
        ));
    }
    chain.push("apad".to_string());
    chain.join(",")
}

fn num(value: f64) -> String {
    format!("{value:.6}")
}

/// `0xRRGGBB@opacity`.
pub fn ffmpeg_color(color: Color) -> String {
    let [r, g, b, _] = color.0;
    format!("0x{r:02X}{g:02X}{b:02X}@{:.3}", color.opacity())
}

/// Escape a filter option value so it survives both passes ffmpeg makes
/// over `-filter_complex`: the graph split on `[],;`, then the option list
/// split on `:`. Each pass drops one level of backslashes.
pub fn escape_filter_value(value: &str) -> String {
    let option = escape_level(value, &['\\', '\'', ':']);
    escape_level(&option, &['\\', '\'', '[', ']', ',', ';'])
}

/// Backslash-escape `special` characters, plus leading and trailing
/// whitespace which the tokenizer would otherwise trim.
fn escape_level(text: &str, special: &[char]) -> String {
    let last = text.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(text.len() * 2);
    for (i, ch) in text.chars().enumerate() {
        let edge_space = matches!(ch, ' ' | '\n' | '\t' | '\r') && (i == 0 || i == last);
        if edge_space || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
