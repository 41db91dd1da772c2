//! The immutable composition of one video.
//!
//! A [`Timeline`] is built once from a validated [`EncodingRequest`] and the
//! fetched assets, then shared read-only (usually behind an `Arc`) with the
//! encoding backend. There is no mutation API.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

use slidecast_common::clock::FrameClock;
use slidecast_common::error::{SlidecastError, SlidecastResult};

use crate::effect::{clamp_progress, EffectSpec};
use crate::geometry::FitMode;
use crate::overlay::{Band, OverlayText};
use crate::request::EncodingRequest;

/// Raw bytes of one fetched asset.
#[derive(Debug, Clone)]
pub struct AssetBuffer {
    /// URL the bytes were fetched from.
    pub url: String,
    /// Body bytes.
    pub bytes: Arc<[u8]>,
    /// `Content-Type` reported by the source, if any.
    pub content_type: Option<String>,
    /// File holding the same bytes inside the request workspace, if
    /// the asset has been materialized.
    pub local_path: Option<PathBuf>,
}

impl AssetBuffer {
    pub fn new(url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: url.into(),
            bytes: bytes.into(),
            content_type: None,
            local_path: None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Best-effort file extension, from the content type or the URL path.
    pub fn extension(&self) -> Option<String> {
        let from_type = self.content_type.as_deref().and_then(|ct| {
            let mime = ct.split(';').next()?.trim();
            let ext = match mime {
                "image/jpeg" | "image/jpg" => "jpg",
                "image/png" => "png",
                "image/webp" => "webp",
                "image/gif" => "gif",
                "audio/mpeg" | "audio/mp3" => "mp3",
                "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
                "audio/aac" => "aac",
                "audio/mp4" | "audio/x-m4a" => "m4a",
                "audio/ogg" => "ogg",
                "video/mp4" => "mp4",
                _ => return None,
            };
            Some(ext.to_string())
        });
        from_type.or_else(|| {
            let path = url::Url::parse(&self.url).ok()?.path().to_string();
            let name = path.rsplit('/').next()?;
            let (_, ext) = name.rsplit_once('.')?;
            let ext = ext.to_ascii_lowercase();
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then_some(ext)
        })
    }
}

/// A decoded still image ready for composition.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Where the image came from.
    pub source_url: String,
    /// Decoded pixels.
    pub image: Arc<RgbaImage>,
    /// Encoded file inside the request workspace, if materialized.
    pub local_path: Option<PathBuf>,
}

impl ImageAsset {
    /// Decode an image buffer. A corrupt image is fatal for the request.
    pub fn decode(buffer: &AssetBuffer) -> SlidecastResult<Self> {
        let decoded = image::load_from_memory(&buffer.bytes).map_err(|e| {
            SlidecastError::encoding(format!("failed to decode image {}: {e}", buffer.url))
        })?;
        Ok(Self {
            source_url: buffer.url.clone(),
            image: Arc::new(decoded.to_rgba8()),
            local_path: buffer.local_path.clone(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// An audio asset; kept encoded, the muxer decodes it.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    pub source_url: String,
    pub local_path: Option<PathBuf>,
    pub byte_len: usize,
}

impl AudioAsset {
    pub fn from_buffer(buffer: &AssetBuffer) -> SlidecastResult<Self> {
        if buffer.is_empty() {
            return Err(SlidecastError::encoding(format!(
                "audio asset {} is empty",
                buffer.url
            )));
        }
        Ok(Self {
            source_url: buffer.url.clone(),
            local_path: buffer.local_path.clone(),
            byte_len: buffer.len(),
        })
    }
}

/// Soundtrack attached to the whole timeline.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub asset: AudioAsset,
    /// Linear gain.
    pub volume: f64,
    /// Fade-in length in seconds.
    pub fade_in: f64,
    /// Fade-out length in seconds, ending at the timeline end.
    pub fade_out: f64,
}

/// One image's placement in time.
#[derive(Debug, Clone)]
pub struct Clip {
    /// Position in the timeline.
    pub index: usize,
    pub asset: ImageAsset,
    /// Start time in seconds.
    pub start_time: f64,
    /// Duration in seconds.
    pub duration: f64,
    pub fit: FitMode,
    pub effect: EffectSpec,
}

impl Clip {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Normalized elapsed fraction at time `t`, clamped to `[0, 1]`.
    pub fn progress_at(&self, t: f64) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        clamp_progress((t - self.start_time) / self.duration)
    }
}

/// Immutable ordered composition of clips, overlay, bands and audio.
#[derive(Debug, Clone)]
pub struct Timeline {
    clips: Vec<Clip>,
    overlay: Option<OverlayText>,
    bands: Vec<Band>,
    audio: Option<AudioTrack>,
    fps: u32,
    width: u32,
    height: u32,
    duration_per_image: f64,
    total_duration: f64,
}

impl Timeline {
    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn overlay(&self) -> Option<&OverlayText> {
        self.overlay.as_ref()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn duration_per_image(&self) -> f64 {
        self.duration_per_image
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn clock(&self) -> FrameClock {
        FrameClock::new(self.fps)
    }

    /// `round(totalDuration * fps)`.
    pub fn frame_count(&self) -> u64 {
        self.clock().frame_count(self.total_duration)
    }

    /// Index of the clip visible at time `t`: `floor(t / d)` clamped to the
    /// clip range.
    pub fn clip_index_at(&self, t: f64) -> usize {
        let last = self.clips.len().saturating_sub(1);
        if t.is_nan() || t <= 0.0 {
            return 0;
        }
        // Absorb float noise so t = k*d lands on clip k, not k-1.
        let slot = ((t / self.duration_per_image) + 1e-9).floor();
        (slot as usize).min(last)
    }

    /// The clip visible at `t` and its progress.
    pub fn active_clip(&self, t: f64) -> (&Clip, f64) {
        let clip = &self.clips[self.clip_index_at(t)];
        (clip, clip.progress_at(t))
    }
}

/// Builds a [`Timeline`] from a request and its fetched assets.
#[derive(Debug, Default)]
pub struct TimelineBuilder;

impl TimelineBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Validate the request, decode images and lay out the clips.
    ///
    /// `images` must hold one buffer per request image, in request order.
    pub fn build(
        &self,
        request: &EncodingRequest,
        images: &[AssetBuffer],
        audio: Option<&AssetBuffer>,
    ) -> SlidecastResult<Timeline> {
        request.validate()?;

        if images.len() != request.images.len() {
            return Err(SlidecastError::validation(format!(
                "expected {} image assets, got {}",
                request.images.len(),
                images.len()
            )));
        }
        if request.audio.is_some() != audio.is_some() {
            return Err(SlidecastError::validation(
                "audio asset does not match the request's audio field",
            ));
        }

        let d = request.duration_per_image;
        let clips = images
            .iter()
            .enumerate()
            .map(|(index, buffer)| {
                Ok(Clip {
                    index,
                    asset: ImageAsset::decode(buffer)?,
                    start_time: index as f64 * d,
                    duration: d,
                    fit: request.fit,
                    effect: request.effect_for(index),
                })
            })
            .collect::<SlidecastResult<Vec<_>>>()?;

        let overlay = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(|title| OverlayText::from_config(title, &request.overlay));

        let audio = audio
            .map(|buffer| {
                Ok::<_, SlidecastError>(AudioTrack {
                    asset: AudioAsset::from_buffer(buffer)?,
                    volume: request.audio_volume,
                    fade_in: request.audio_fade_in,
                    fade_out: request.audio_fade_out,
                })
            })
            .transpose()?;

        let timeline = Timeline {
            clips,
            overlay,
            bands: request.bands.clone(),
            audio,
            fps: request.fps,
            width: request.width,
            height: request.height,
            duration_per_image: d,
            total_duration: request.total_duration(),
        };

        tracing::debug!(
            clips = timeline.clips.len(),
            fps = timeline.fps,
            total_duration = timeline.total_duration,
            frames = timeline.frame_count(),
            has_audio = timeline.audio.is_some(),
            has_overlay = timeline.overlay.is_some(),
            "Timeline built"
        );

        Ok(timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn request(n: usize) -> EncodingRequest {
        EncodingRequest::new(
            (0..n)
                .map(|i| format!("https://cdn.example.com/{i}.png"))
                .collect(),
        )
    }

    fn buffers(req: &EncodingRequest) -> Vec<AssetBuffer> {
        req.images
            .iter()
            .map(|url| AssetBuffer::new(url.clone(), png_bytes(8, 8)))
            .collect()
    }

    #[test]
    fn test_clips_are_contiguous() {
        let req = request(3);
        let timeline = TimelineBuilder::new()
            .build(&req, &buffers(&req), None)
            .unwrap();
        assert_eq!(timeline.clips().len(), 3);
        assert!((timeline.total_duration() - 6.0).abs() < 1e-12);
        assert_eq!(timeline.frame_count(), 180);
        for pair in timeline.clips().windows(2) {
            assert!((pair[0].end_time() - pair[1].start_time).abs() < 1e-12);
        }
        assert_eq!(timeline.clips()[2].start_time, 4.0);
    }

    #[test]
    fn test_clip_lookup_and_progress() {
        let req = request(3);
        let timeline = TimelineBuilder::new()
            .build(&req, &buffers(&req), None)
            .unwrap();
        assert_eq!(timeline.clip_index_at(0.0), 0);
        assert_eq!(timeline.clip_index_at(1.999), 0);
        assert_eq!(timeline.clip_index_at(2.0), 1);
        assert_eq!(timeline.clip_index_at(6.0), 2);
        assert_eq!(timeline.clip_index_at(100.0), 2);
        assert_eq!(timeline.clip_index_at(-1.0), 0);

        let (clip, progress) = timeline.active_clip(3.0);
        assert_eq!(clip.index, 1);
        assert!((progress - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_progress_endpoints() {
        let req = request(2);
        let timeline = TimelineBuilder::new()
            .build(&req, &buffers(&req), None)
            .unwrap();
        let clip = &timeline.clips()[1];
        assert_eq!(clip.progress_at(clip.start_time), 0.0);
        assert_eq!(clip.progress_at(clip.end_time()), 1.0);
        assert_eq!(clip.progress_at(clip.end_time() + 5.0), 1.0);
        assert_eq!(clip.progress_at(0.0), 0.0);
    }

    #[test]
    fn test_overlay_trimmed_and_skipped_when_blank() {
        let mut req = request(1);
        req.title = Some("   ".to_string());
        let timeline = TimelineBuilder::new()
            .build(&req, &buffers(&req), None)
            .unwrap();
        assert!(timeline.overlay().is_none());

        req.title = Some("  Big sale  ".to_string());
        let timeline = TimelineBuilder::new()
            .build(&req, &buffers(&req), None)
            .unwrap();
        assert_eq!(timeline.overlay().unwrap().text, "Big sale");
    }

    #[test]
    fn test_corrupt_image_is_encoding_error() {
        let req = request(1);
        let bad = vec![AssetBuffer::new(req.images[0].clone(), vec![1u8, 2, 3, 4])];
        let err = TimelineBuilder::new().build(&req, &bad, None).unwrap_err();
        assert_eq!(err.kind(), "encoding");
    }

    #[test]
    fn test_audio_attached_with_request_params() {
        let mut req = request(1);
        req.fps = 24;
        req.duration_per_image = 5.0;
        req.audio = Some("https://cdn.example.com/track.mp3".to_string());
        req.audio_volume = 0.8;
        let audio = AssetBuffer::new("https://cdn.example.com/track.mp3", vec![0u8; 64]);
        let timeline = TimelineBuilder::new()
            .build(&req, &buffers(&req), Some(&audio))
            .unwrap();
        let track = timeline.audio().unwrap();
        assert!((track.volume - 0.8).abs() < 1e-12);
        assert_eq!(track.asset.byte_len, 64);
        assert!((timeline.total_duration() - 5.0).abs() < 1e-12);
        assert_eq!(timeline.frame_count(), 120);
    }

    #[test]
    fn test_asset_count_mismatch_rejected() {
        let req = request(2);
        let mut assets = buffers(&req);
        assets.pop();
        assert!(TimelineBuilder::new().build(&req, &assets, None).is_err());
    }

    #[test]
    fn test_extension_detection() {
        let mut buffer = AssetBuffer::new("https://cdn.example.com/path/photo.JPEG?x=1", vec![1u8]);
        assert_eq!(buffer.extension().as_deref(), Some("jpeg"));
        buffer.content_type = Some("image/png; charset=binary".to_string());
        assert_eq!(buffer.extension().as_deref(), Some("png"));
        let bare = AssetBuffer::new("https://cdn.example.com/render/abc", vec![1u8]);
        assert_eq!(bare.extension(), None);
    }
}
