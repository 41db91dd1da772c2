//! Frame-capture backend: every frame is synthesized in-process and
//! streamed to a sink.
//!
//! The default sink pipes raw RGBA into an ffmpeg child
//! (`-f rawvideo -pix_fmt rgba -i pipe:0`), muxing the soundtrack as a
//! second input.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use image::RgbaImage;

use slidecast_common::config::{EncoderConfig, TextConfig};
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_frame_synth::FrameSynthesizer;
use slidecast_timeline_model::timeline::{AudioTrack, Timeline};

use crate::backend::{
    CancelSignal, EncodeContext, EncodedArtifact, EncodingBackend, ProgressPhase,
    ProgressReporter,
};
use crate::command_line::audio_chain;
use crate::process::{
    command_exists, drain_stderr, join_stderr, kill_quietly, output_codec_args, stderr_tail,
};

/// What a sink is asked to produce.
#[derive(Debug, Clone)]
pub struct SinkSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_secs: f64,
    pub audio: Option<AudioTrack>,
    pub output: PathBuf,
}

/// Consumer of synthesized frames, in presentation order.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbaImage) -> SlidecastResult<()>;

    /// Flush and close the output. Called once after the last frame.
    fn finish(self: Box<Self>) -> SlidecastResult<()>;

    /// Discard the output after a failure or cancellation.
    fn abort(self: Box<Self>);
}

/// Opens one sink per encode.
pub trait SinkFactory: Send + Sync {
    fn open(&self, spec: &SinkSpec) -> SlidecastResult<Box<dyn FrameSink>>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Sinks that pipe into the ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    encoder: EncoderConfig,
}

impl FfmpegSinkFactory {
    pub fn new(encoder: EncoderConfig) -> Self {
        Self { encoder }
    }

    pub fn args(&self, spec: &SinkSpec) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", spec.width, spec.height),
            "-r".into(),
            spec.fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
        ];
        if let Some(track) = &spec.audio {
            if let Some(path) = &track.asset.local_path {
                args.extend([
                    "-i".into(),
                    path.display().to_string(),
                    "-af".into(),
                    audio_chain(track, spec.duration_secs),
                    "-map".into(),
                    "0:v".into(),
                    "-map".into(),
                    "1:a".into(),
                ]);
            }
        }
        let with_audio = spec
            .audio
            .as_ref()
            .is_some_and(|track| track.asset.local_path.is_some());
        args.extend(["-t".into(), format!("{:.6}", spec.duration_secs)]);
        args.extend(output_codec_args(&self.encoder, with_audio));
        args.push(spec.output.display().to_string());
        args
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn open(&self, spec: &SinkSpec) -> SlidecastResult<Box<dyn FrameSink>> {
        if let Some(track) = &spec.audio {
            if track.asset.local_path.is_none() {
                return Err(SlidecastError::encoding(
                    "audio track has not been written to the workspace",
                ));
            }
        }
        let args = self.args(spec);
        tracing::debug!(args = ?args, "Starting ffmpeg frame sink");
        let mut child = Command::new(&self.encoder.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SlidecastError::encoding(format!(
                    "Failed to start {}: {e}",
                    self.encoder.ffmpeg_bin
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SlidecastError::encoding("Failed to open ffmpeg stdin"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SlidecastError::encoding("Failed to capture ffmpeg stderr"))?;

        Ok(Box::new(FfmpegPipeSink {
            child,
            stdin: Some(stdin),
            stderr: Some(drain_stderr(stderr)),
            frame_bytes: spec.width as usize * spec.height as usize * 4,
            frames_written: 0,
        }))
    }

    fn is_available(&self) -> bool {
        command_exists(&self.encoder.ffmpeg_bin)
    }
}

/// Raw RGBA frames into ffmpeg's stdin.
pub struct FfmpegPipeSink {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_bytes: usize,
    frames_written: u64,
}

impl FfmpegPipeSink {
    fn stderr_output(&mut self) -> String {
        self.stderr.take().map(join_stderr).unwrap_or_default()
    }
}

impl FrameSink for FfmpegPipeSink {
    fn write_frame(&mut self, frame: &RgbaImage) -> SlidecastResult<()> {
        if frame.as_raw().len() != self.frame_bytes {
            return Err(SlidecastError::encoding(format!(
                "frame {} has {} bytes, expected {}",
                self.frames_written,
                frame.as_raw().len(),
                self.frame_bytes
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SlidecastError::encoding("ffmpeg stdin already closed"))?;
        if let Err(err) = stdin.write_all(frame.as_raw()) {
            // ffmpeg died; its stderr says why.
            self.stdin = None;
            let _ = self.child.wait();
            let stderr = self.stderr_output();
            return Err(SlidecastError::encoding(format!(
                "ffmpeg stopped accepting frames after {} ({err}): {}",
                self.frames_written,
                stderr_tail(&stderr)
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> SlidecastResult<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| SlidecastError::encoding(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = self.stderr_output();
        if !status.success() {
            return Err(SlidecastError::encoding(format!(
                "ffmpeg failed ({status}): {}",
                stderr_tail(&stderr)
            )));
        }
        tracing::debug!(frames = self.frames_written, "ffmpeg frame sink closed");
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        drop(self.stdin.take());
        kill_quietly(&mut self.child);
        let _ = self.stderr_output();
    }
}

/// Synthesizes `frameCount` frames and streams them into a sink.
pub struct FrameCaptureEncoder {
    synth: Arc<FrameSynthesizer>,
    sinks: Arc<dyn SinkFactory>,
}

impl FrameCaptureEncoder {
    pub fn new(encoder: EncoderConfig, text: &TextConfig) -> SlidecastResult<Self> {
        Ok(Self::with_sinks(
            FrameSynthesizer::from_config(text)?,
            Arc::new(FfmpegSinkFactory::new(encoder)),
        ))
    }

    pub fn with_sinks(synth: FrameSynthesizer, sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            synth: Arc::new(synth),
            sinks,
        }
    }
}

#[async_trait::async_trait]
impl EncodingBackend for FrameCaptureEncoder {
    fn name(&self) -> &'static str {
        "frame_capture"
    }

    fn is_available(&self) -> bool {
        self.sinks.is_available()
    }

    async fn encode(
        &self,
        timeline: Arc<Timeline>,
        ctx: &EncodeContext,
    ) -> SlidecastResult<EncodedArtifact> {
        let spec = SinkSpec {
            width: timeline.width(),
            height: timeline.height(),
            fps: timeline.fps(),
            duration_secs: timeline.total_duration(),
            audio: timeline.audio().cloned(),
            output: ctx.workspace.output_path("mp4"),
        };
        let frame_count = timeline.frame_count();
        tracing::info!(
            workspace = ctx.workspace.id(),
            frames = frame_count,
            width = spec.width,
            height = spec.height,
            "Frame capture started"
        );
        ctx.progress.report(ProgressPhase::Encoding, 0.0);

        let synth = Arc::clone(&self.synth);
        let sinks = Arc::clone(&self.sinks);
        let progress = ctx.progress.clone();
        let cancel = ctx.cancel.clone();
        let job_timeline = Arc::clone(&timeline);
        let job_spec = spec.clone();
        let written = tokio::task::spawn_blocking(move || {
            capture_frames(&job_timeline, &synth, sinks.as_ref(), &job_spec, &progress, &cancel)
        })
        .await
        .map_err(|e| SlidecastError::encoding(format!("frame capture task failed: {e}")))??;

        Ok(EncodedArtifact {
            path: spec.output,
            remote_url: None,
            duration_seconds: timeline.total_duration(),
            width: timeline.width(),
            height: timeline.height(),
            format: "mp4".to_string(),
            frame_count: written,
        })
    }
}

/// Write frames `0..frame_count` at `t_i = i / fps`. Returns frames written.
pub fn capture_frames(
    timeline: &Timeline,
    synth: &FrameSynthesizer,
    sinks: &dyn SinkFactory,
    spec: &SinkSpec,
    progress: &ProgressReporter,
    cancel: &CancelSignal,
) -> SlidecastResult<u64> {
    let clock = timeline.clock();
    let frame_count = timeline.frame_count();
    let report_every = u64::from(timeline.fps().max(1));
    let mut sink = sinks.open(spec)?;
    let mut canvas = RgbaImage::new(spec.width, spec.height);

    for i in 0..frame_count {
        if cancel.is_cancelled() {
            sink.abort();
            return Err(SlidecastError::Cancelled);
        }
        synth.synthesize_into(timeline, clock.frame_time(i), &mut canvas);
        if let Err(err) = sink.write_frame(&canvas) {
            sink.abort();
            return Err(err);
        }
        if (i + 1) % report_every == 0 {
            progress.report(
                ProgressPhase::Encoding,
                (i + 1) as f64 / frame_count as f64 * 100.0,
            );
        }
    }

    sink.finish()?;
    progress.report(ProgressPhase::Encoding, 100.0);
    Ok(frame_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidecast_timeline_model::request::EncodingRequest;
    use slidecast_timeline_model::timeline::{AssetBuffer, TimelineBuilder};
    use std::io::Cursor;
    use std::sync::Mutex;

    const COLORS: [[u8; 4]; 3] = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]];

    /// Records the centre pixel of every frame.
    #[derive(Default)]
    struct RecordingSinks {
        frames: Arc<Mutex<Vec<[u8; 4]>>>,
        finished: Arc<Mutex<bool>>,
        fail_after: Option<usize>,
    }

    struct RecordingSink {
        frames: Arc<Mutex<Vec<[u8; 4]>>>,
        finished: Arc<Mutex<bool>>,
        fail_after: Option<usize>,
    }

    impl SinkFactory for RecordingSinks {
        fn open(&self, _spec: &SinkSpec) -> SlidecastResult<Box<dyn FrameSink>> {
            Ok(Box::new(RecordingSink {
                frames: Arc::clone(&self.frames),
                finished: Arc::clone(&self.finished),
                fail_after: self.fail_after,
            }))
        }
    }

    impl FrameSink for RecordingSink {
        fn write_frame(&mut self, frame: &RgbaImage) -> SlidecastResult<()> {
            let mut frames = self.frames.lock().unwrap();
            if Some(frames.len()) == self.fail_after {
                return Err(SlidecastError::encoding("sink full"));
            }
            let (w, h) = frame.dimensions();
            frames.push(frame.get_pixel(w / 2, h / 2).0);
            Ok(())
        }

        fn finish(self: Box<Self>) -> SlidecastResult<()> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }

        fn abort(self: Box<Self>) {}
    }

    fn png(rgba: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(16, 28, image::Rgba(rgba));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn timeline(colors: &[[u8; 4]], configure: impl FnOnce(&mut EncodingRequest)) -> Timeline {
        let urls: Vec<String> = (0..colors.len())
            .map(|i| format!("https://cdn.test/{i}.png"))
            .collect();
        let mut request = EncodingRequest::new(urls.clone());
        request.width = 32;
        request.height = 56;
        request.overlay.font_size = 8.0;
        configure(&mut request);
        let buffers: Vec<AssetBuffer> = urls
            .iter()
            .zip(colors)
            .map(|(url, rgba)| AssetBuffer::new(url.clone(), png(*rgba)))
            .collect();
        let audio = request
            .audio
            .as_ref()
            .map(|url| AssetBuffer::new(url.clone(), vec![0u8; 32]));
        TimelineBuilder::new()
            .build(&request, &buffers, audio.as_ref())
            .unwrap()
    }

    fn spec_for(timeline: &Timeline) -> SinkSpec {
        SinkSpec {
            width: timeline.width(),
            height: timeline.height(),
            fps: timeline.fps(),
            duration_secs: timeline.total_duration(),
            audio: timeline.audio().cloned(),
            output: PathBuf::from("/tmp/out.mp4"),
        }
    }

    #[test]
    fn test_three_clips_at_30fps() {
        let timeline = timeline(&COLORS, |_| {});
        let sinks = RecordingSinks::default();
        let written = capture_frames(
            &timeline,
            &FrameSynthesizer::default(),
            &sinks,
            &spec_for(&timeline),
            &ProgressReporter::disabled(),
            &CancelSignal::never(),
        )
        .unwrap();

        assert_eq!(written, 180);
        let frames = sinks.frames.lock().unwrap();
        assert_eq!(frames.len(), 180);
        assert_eq!(frames[0], COLORS[0]);
        assert_eq!(frames[59], COLORS[0]);
        assert_eq!(frames[60], COLORS[1]);
        assert_eq!(frames[119], COLORS[1]);
        assert_eq!(frames[120], COLORS[2]);
        assert_eq!(frames[179], COLORS[2]);
        assert!(*sinks.finished.lock().unwrap());
    }

    #[test]
    fn test_single_clip_24fps_with_audio() {
        let timeline = timeline(&COLORS[..1], |r| {
            r.fps = 24;
            r.duration_per_image = 5.0;
            r.audio = Some("https://cdn.test/song.mp3".to_string());
        });
        let sinks = RecordingSinks::default();
        let spec = spec_for(&timeline);
        assert!(spec.audio.is_some());
        let written = capture_frames(
            &timeline,
            &FrameSynthesizer::default(),
            &sinks,
            &spec,
            &ProgressReporter::disabled(),
            &CancelSignal::never(),
        )
        .unwrap();
        assert_eq!(written, 120);
    }

    #[test]
    fn test_cancel_stops_before_finish() {
        let timeline = timeline(&COLORS, |_| {});
        let sinks = RecordingSinks::default();
        let (handle, signal) = CancelSignal::new();
        handle.cancel();
        let err = capture_frames(
            &timeline,
            &FrameSynthesizer::default(),
            &sinks,
            &spec_for(&timeline),
            &ProgressReporter::disabled(),
            &signal,
        )
        .unwrap_err();
        assert!(matches!(err, SlidecastError::Cancelled));
        assert!(sinks.frames.lock().unwrap().is_empty());
        assert!(!*sinks.finished.lock().unwrap());
    }

    #[test]
    fn test_sink_error_propagates() {
        let timeline = timeline(&COLORS, |_| {});
        let sinks = RecordingSinks {
            fail_after: Some(10),
            ..Default::default()
        };
        let err = capture_frames(
            &timeline,
            &FrameSynthesizer::default(),
            &sinks,
            &spec_for(&timeline),
            &ProgressReporter::disabled(),
            &CancelSignal::never(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "encoding");
        assert_eq!(sinks.frames.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_progress_reaches_100() {
        let timeline = timeline(&COLORS, |_| {});
        let (reporter, mut rx) = ProgressReporter::channel(64);
        capture_frames(
            &timeline,
            &FrameSynthesizer::default(),
            &RecordingSinks::default(),
            &spec_for(&timeline),
            &reporter,
            &CancelSignal::never(),
        )
        .unwrap();
        let mut last = 0.0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.percent >= last);
            last = event.percent;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_pipe_args() {
        let mut timeline_spec = spec_for(&timeline(&COLORS, |_| {}));
        timeline_spec.output = PathBuf::from("/work/output.mp4");
        let args = FfmpegSinkFactory::new(EncoderConfig::default()).args(&timeline_spec);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 32x56 -r 30 -i pipe:0"));
        assert!(joined.contains("-t 6.000000"));
        assert!(joined.ends_with("-movflags +faststart /work/output.mp4"));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_pipe_args_with_audio() {
        let timeline = timeline(&COLORS[..2], |r| {
            r.duration_per_image = 3.0;
            r.audio = Some("https://cdn.test/song.mp3".to_string());
            r.audio_volume = 0.5;
            r.audio_fade_in = 1.0;
            r.audio_fade_out = 2.0;
        });
        let mut spec = spec_for(&timeline);
        spec.output = PathBuf::from("/work/output.mp4");
        if let Some(track) = spec.audio.as_mut() {
            track.asset.local_path = Some(PathBuf::from("/work/audio.mp3"));
        }
        let args = FfmpegSinkFactory::new(EncoderConfig::default()).args(&spec);
        let pos = |flag: &str, value: &str| {
            args.windows(2)
                .position(|pair| pair[0] == flag && pair[1] == value)
                .unwrap_or_else(|| panic!("missing {flag} {value} in {args:?}"))
        };

        let video_in = pos("-i", "pipe:0");
        let audio_in = pos("-i", "/work/audio.mp3");
        let filter = pos(
            "-af",
            "volume=0.500,afade=t=in:st=0:d=1.000000,afade=t=out:st=4.000000:d=2.000000,apad",
        );
        let map_video = pos("-map", "0:v");
        let map_audio = pos("-map", "1:a");
        let duration = pos("-t", "6.000000");
        let codec = pos("-c:a", "aac");
        assert!(video_in < audio_in);
        assert!(audio_in < filter);
        assert!(filter < map_video);
        assert!(map_video < map_audio);
        assert!(map_audio < duration);
        assert!(duration < codec);
        assert!(!args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "/work/output.mp4");
    }
}
