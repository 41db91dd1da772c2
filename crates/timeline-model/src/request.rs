//! The JSON encode request and its validation rules.

use serde::{Deserialize, Serialize};

use slidecast_common::error::{SlidecastError, SlidecastResult};

use crate::effect::EffectSpec;
use crate::geometry::FitMode;
use crate::overlay::{Band, OverlayConfig};

pub const MIN_IMAGES: usize = 1;
pub const MAX_IMAGES: usize = 30;
pub const MIN_FPS: u32 = 24;
pub const MAX_FPS: u32 = 60;
pub const MIN_DURATION_PER_IMAGE: f64 = 1.0;
pub const MAX_DURATION_PER_IMAGE: f64 = 5.0;
pub const MAX_TOTAL_DURATION_SECS: f64 = 60.0;
pub const MIN_DIMENSION: u32 = 16;
pub const MAX_DIMENSION: u32 = 4096;
pub const MAX_AUDIO_VOLUME: f64 = 2.0;
pub const MAX_TITLE_CHARS: usize = 500;

pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_DURATION_PER_IMAGE: f64 = 2.0;
pub const DEFAULT_WIDTH: u32 = 1080;
pub const DEFAULT_HEIGHT: u32 = 1920;

/// One request to turn images (and optional audio) into a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingRequest {
    /// Image URLs, in playback order.
    pub images: Vec<String>,

    /// Optional soundtrack URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Optional overlay title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Output frame rate.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Seconds each image stays on screen.
    #[serde(default = "default_duration_per_image")]
    pub duration_per_image: f64,

    /// Output width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Output height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Effect applied to every clip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectSpec>,

    /// Per-clip effects; overrides `effect` and must match `images` in length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Vec<EffectSpec>>,

    /// How images are mapped onto the canvas.
    #[serde(default)]
    pub fit: FitMode,

    /// Styling of the `title` overlay.
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Fixed title/price bands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<Band>,

    /// Soundtrack gain (1.0 = unchanged).
    #[serde(default = "default_audio_volume")]
    pub audio_volume: f64,

    /// Soundtrack fade-in length in seconds.
    #[serde(default = "default_audio_fade_in")]
    pub audio_fade_in: f64,

    /// Soundtrack fade-out length in seconds.
    #[serde(default = "default_audio_fade_out")]
    pub audio_fade_out: f64,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_duration_per_image() -> f64 {
    DEFAULT_DURATION_PER_IMAGE
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_audio_volume() -> f64 {
    1.0
}

fn default_audio_fade_in() -> f64 {
    0.5
}

fn default_audio_fade_out() -> f64 {
    1.0
}

impl EncodingRequest {
    /// A request for `images` with every other field at its default.
    pub fn new(images: Vec<String>) -> Self {
        Self {
            images,
            audio: None,
            title: None,
            fps: DEFAULT_FPS,
            duration_per_image: DEFAULT_DURATION_PER_IMAGE,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            effect: None,
            effects: None,
            fit: FitMode::default(),
            overlay: OverlayConfig::default(),
            bands: Vec::new(),
            audio_volume: default_audio_volume(),
            audio_fade_in: default_audio_fade_in(),
            audio_fade_out: default_audio_fade_out(),
        }
    }

    /// Parse a JSON request body. Malformed JSON is a validation failure.
    pub fn from_json(body: &str) -> SlidecastResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| SlidecastError::validation(format!("malformed request body: {e}")))
    }

    /// Total video length implied by the request.
    pub fn total_duration(&self) -> f64 {
        self.images.len() as f64 * self.duration_per_image
    }

    /// Effect for clip `index`, after per-clip/uniform resolution.
    pub fn effect_for(&self, index: usize) -> EffectSpec {
        self.effects
            .as_ref()
            .and_then(|effects| effects.get(index).copied())
            .or(self.effect)
            .unwrap_or_default()
    }

    /// Check every rule. Runs before any asset is fetched.
    pub fn validate(&self) -> SlidecastResult<()> {
        let count = self.images.len();
        if !(MIN_IMAGES..=MAX_IMAGES).contains(&count) {
            return Err(SlidecastError::validation(format!(
                "images must contain between {MIN_IMAGES} and {MAX_IMAGES} entries (got {count})"
            )));
        }

        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(SlidecastError::validation(format!(
                "fps must be between {MIN_FPS} and {MAX_FPS} (got {})",
                self.fps
            )));
        }

        let d = self.duration_per_image;
        if !d.is_finite() || !(MIN_DURATION_PER_IMAGE..=MAX_DURATION_PER_IMAGE).contains(&d) {
            return Err(SlidecastError::validation(format!(
                "durationPerImage must be between {MIN_DURATION_PER_IMAGE} and {MAX_DURATION_PER_IMAGE} seconds (got {d})"
            )));
        }

        let total = self.total_duration();
        if total > MAX_TOTAL_DURATION_SECS + 1e-9 {
            return Err(SlidecastError::validation(format!(
                "total duration {total:.2}s exceeds the {MAX_TOTAL_DURATION_SECS}s limit"
            )));
        }

        for (label, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(SlidecastError::validation(format!(
                    "{label} must be between {MIN_DIMENSION} and {MAX_DIMENSION} (got {value})"
                )));
            }
            if value % 2 != 0 {
                return Err(SlidecastError::validation(format!(
                    "{label} must be even for yuv420p output (got {value})"
                )));
            }
        }

        for (i, image) in self.images.iter().enumerate() {
            validate_url(image).map_err(|e| {
                SlidecastError::validation(format!("images[{i}] is not a valid URL: {e}"))
            })?;
        }
        if let Some(audio) = &self.audio {
            validate_url(audio)
                .map_err(|e| SlidecastError::validation(format!("audio is not a valid URL: {e}")))?;
        }

        if let Some(effects) = &self.effects {
            if effects.len() != count {
                return Err(SlidecastError::validation(format!(
                    "effects must list one effect per image ({} given for {count} images)",
                    effects.len()
                )));
            }
        }

        if let Some(title) = &self.title {
            if title.chars().count() > MAX_TITLE_CHARS {
                return Err(SlidecastError::validation(format!(
                    "title must be at most {MAX_TITLE_CHARS} characters"
                )));
            }
        }

        let font_size = self.overlay.font_size;
        if !font_size.is_finite() || font_size < 8.0 {
            return Err(SlidecastError::validation(format!(
                "overlay.fontSize must be at least 8 (got {font_size})"
            )));
        }
        // Only a drawn title has to fit the canvas.
        let has_title = self.title.as_deref().is_some_and(|t| !t.trim().is_empty());
        if has_title && font_size > self.height as f32 / 4.0 {
            return Err(SlidecastError::validation(format!(
                "overlay.fontSize must be between 8 and {} (got {font_size})",
                self.height / 4
            )));
        }

        if !(0.0..=MAX_AUDIO_VOLUME).contains(&self.audio_volume) {
            return Err(SlidecastError::validation(format!(
                "audioVolume must be between 0 and {MAX_AUDIO_VOLUME} (got {})",
                self.audio_volume
            )));
        }
        for (label, value) in [
            ("audioFadeIn", self.audio_fade_in),
            ("audioFadeOut", self.audio_fade_out),
        ] {
            if !value.is_finite() || value < 0.0 || value > total {
                return Err(SlidecastError::validation(format!(
                    "{label} must be between 0 and the video duration {total:.2}s (got {value})"
                )));
            }
        }

        Ok(())
    }
}

/// Syntactic URL check: parseable, with a scheme the resolver can fetch.
pub fn validate_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match parsed.scheme() {
        "http" | "https" | "file" => {}
        other => return Err(format!("unsupported scheme '{other}'")),
    }
    if parsed.scheme() != "file" && parsed.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://cdn.example.com/img-{i}.jpg"))
            .collect()
    }

    #[test]
    fn test_json_defaults() {
        let req = EncodingRequest::from_json(r#"{"images":["https://a.test/1.png"]}"#).unwrap();
        assert_eq!(req.fps, 30);
        assert_eq!(req.duration_per_image, 2.0);
        assert_eq!((req.width, req.height), (1080, 1920));
        assert_eq!(req.fit, FitMode::Cover);
        assert!(req.audio.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_camel_case_fields() {
        let req = EncodingRequest::from_json(
            r#"{"images":["https://a.test/1.png"],"durationPerImage":3.5,"fps":24,"effect":"zoomIn"}"#,
        )
        .unwrap();
        assert_eq!(req.duration_per_image, 3.5);
        assert_eq!(req.fps, 24);
        assert_eq!(req.effect_for(0), EffectSpec::ZoomIn);
    }

    #[test]
    fn test_malformed_body_is_validation_error() {
        let err = EncodingRequest::from_json(r#"{"images": "nope"}"#).unwrap_err();
        assert!(err.is_client_error());
        let err = EncodingRequest::from_json(r#"{"images":["https://a.test/1.png"],"fps":-1}"#)
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_image_count_bounds() {
        assert!(EncodingRequest::new(urls(0)).validate().is_err());
        assert!(EncodingRequest::new(urls(1)).validate().is_ok());
        let mut thirty = EncodingRequest::new(urls(30));
        thirty.duration_per_image = 2.0;
        assert!(thirty.validate().is_ok());
        assert!(EncodingRequest::new(urls(31)).validate().is_err());
    }

    #[test]
    fn test_total_duration_limit() {
        let mut req = EncodingRequest::new(urls(13));
        req.duration_per_image = 5.0;
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        req.images.truncate(12);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_fps_and_duration_bounds() {
        let mut req = EncodingRequest::new(urls(2));
        req.fps = 23;
        assert!(req.validate().is_err());
        req.fps = 61;
        assert!(req.validate().is_err());
        req.fps = 60;
        assert!(req.validate().is_ok());

        req.duration_per_image = 0.5;
        assert!(req.validate().is_err());
        req.duration_per_image = f64::NAN;
        assert!(req.validate().is_err());
        req.duration_per_image = 5.0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let mut req = EncodingRequest::new(urls(1));
        req.width = 1081;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bad_urls_rejected() {
        let mut req = EncodingRequest::new(vec!["not a url".to_string()]);
        assert!(req.validate().is_err());
        req.images = vec!["ftp://files.test/a.png".to_string()];
        assert!(req.validate().is_err());
        req.images = vec!["file:///tmp/a.png".to_string()];
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_per_clip_effects_must_match_count() {
        let mut req = EncodingRequest::new(urls(3));
        req.effects = Some(vec![EffectSpec::Fade, EffectSpec::ZoomIn]);
        assert!(req.validate().is_err());

        req.effects = Some(vec![EffectSpec::Fade, EffectSpec::ZoomIn, EffectSpec::None]);
        req.effect = Some(EffectSpec::SlideUp);
        assert!(req.validate().is_ok());
        assert_eq!(req.effect_for(0), EffectSpec::Fade);
        assert_eq!(req.effect_for(2), EffectSpec::None);
    }

    #[test]
    fn test_uniform_effect_and_default() {
        let mut req = EncodingRequest::new(urls(2));
        assert_eq!(req.effect_for(1), EffectSpec::None);
        req.effect = Some(EffectSpec::PanRightToLeft);
        assert_eq!(req.effect_for(1), EffectSpec::PanRightToLeft);
    }

    #[test]
    fn test_audio_fades_bounded_by_duration() {
        let mut req = EncodingRequest::new(urls(1));
        req.audio = Some("https://a.test/track.mp3".to_string());
        req.audio_fade_out = 2.5;
        assert!(req.validate().is_err());
        req.audio_fade_out = 2.0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_small_canvas_without_title_accepts_default_font() {
        let mut req = EncodingRequest::new(urls(1));
        req.width = 144;
        req.height = 254;
        assert!(req.validate().is_ok());

        req.title = Some("   ".to_string());
        assert!(req.validate().is_ok());

        req.title = Some("Sale".to_string());
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("overlay.fontSize"));
        req.overlay.font_size = 16.0;
        assert!(req.validate().is_ok());
    }
}
