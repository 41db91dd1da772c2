//! Per-frame composition.

use image::RgbaImage;

use slidecast_common::config::TextConfig;
use slidecast_common::error::SlidecastResult;
use slidecast_timeline_model::geometry::{fit_rect, Rect};
use slidecast_timeline_model::overlay::{Color, OverlayText, TextPosition, TextStyle};
use slidecast_timeline_model::timeline::Timeline;

use crate::layout::{layout_band, layout_overlay};
use crate::raster::{black_canvas, fill_area, fill_rect, place_image, BLACK};
use crate::text::TextRenderer;

/// Background of the `clean` overlay style.
const CLEAN_BOX: Color = Color([0, 0, 0, 140]);
/// Darkest row of the `gradient` overlay style.
const GRADIENT_MAX_ALPHA: f64 = 180.0;
/// Outline colour and width of the `minimalist` overlay style.
const STROKE: Color = Color([0, 0, 0, 220]);
const STROKE_PX: f32 = 2.0;

/// Renders timeline instants to RGBA rasters.
///
/// Output depends only on the timeline and `t`, so the same inputs always
/// produce the same bytes.
#[derive(Debug, Default)]
pub struct FrameSynthesizer {
    text: TextRenderer,
}

impl FrameSynthesizer {
    pub fn new(text: TextRenderer) -> Self {
        Self { text }
    }

    pub fn from_config(config: &TextConfig) -> SlidecastResult<Self> {
        Ok(Self::new(TextRenderer::from_config(config)?))
    }

    pub fn text(&self) -> &TextRenderer {
        &self.text
    }

    /// The frame visible at `t` seconds.
    pub fn synthesize(&self, timeline: &Timeline, t: f64) -> RgbaImage {
        let mut canvas = black_canvas(timeline.width(), timeline.height());
        self.synthesize_into(timeline, t, &mut canvas);
        canvas
    }

    /// Like [`synthesize`](Self::synthesize) but reuses `canvas`, which is
    /// resized if its dimensions do not match the timeline.
    pub fn synthesize_into(&self, timeline: &Timeline, t: f64, canvas: &mut RgbaImage) {
        let (w, h) = (timeline.width(), timeline.height());
        if canvas.dimensions() != (w, h) {
            *canvas = black_canvas(w, h);
        } else {
            canvas.pixels_mut().for_each(|p| *p = BLACK);
        }

        let (clip, progress) = timeline.active_clip(t);
        let placement = fit_rect(clip.asset.width(), clip.asset.height(), w, h, clip.fit);
        let transform = clip.effect.transform(progress, w, h);
        let dest = transform.apply(&placement, w, h);
        place_image(canvas, &clip.asset.image, &dest, transform.alpha);

        if let Some(overlay) = timeline.overlay() {
            self.draw_overlay(canvas, overlay);
        }
        for band in timeline.bands() {
            let layout = layout_band(band, w, h, &self.text);
            fill_area(canvas, &layout.area, band.background);
            self.text.draw_line(
                canvas,
                layout.line.x as f32,
                layout.line.top as f32,
                &layout.line.text,
                layout.font_size,
                band.color,
            );
        }
    }

    fn draw_overlay(&self, canvas: &mut RgbaImage, overlay: &OverlayText) {
        let block = layout_overlay(overlay, canvas.width(), canvas.height(), &self.text);
        if block.lines.is_empty() {
            return;
        }

        match overlay.style {
            TextStyle::Clean => fill_area(canvas, &block.bounds, CLEAN_BOX),
            TextStyle::Gradient => draw_gradient(canvas, &block.bounds, overlay.position),
            TextStyle::Minimalist => {
                for line in &block.lines {
                    for (ox, oy) in stroke_offsets() {
                        self.text.draw_line(
                            canvas,
                            line.x as f32 + ox,
                            line.top as f32 + oy,
                            &line.text,
                            block.font_size,
                            STROKE,
                        );
                    }
                }
            }
        }

        for line in &block.lines {
            self.text.draw_line(
                canvas,
                line.x as f32,
                line.top as f32,
                &line.text,
                block.font_size,
                overlay.color,
            );
        }
    }
}

fn stroke_offsets() -> [(f32, f32); 8] {
    let s = STROKE_PX;
    [
        (-s, -s),
        (0.0, -s),
        (s, -s),
        (-s, 0.0),
        (s, 0.0),
        (-s, s),
        (0.0, s),
        (s, s),
    ]
}

/// Full-width band behind the block, darkest toward the nearest edge.
fn draw_gradient(canvas: &mut RgbaImage, bounds: &Rect, position: TextPosition) {
    let y0 = bounds.y.round().max(0.0) as i32;
    let y1 = (bounds.bottom().round() as i32).min(canvas.height() as i32);
    let rows = (y1 - y0).max(1) as f64;
    let width = canvas.width();
    for y in y0..y1 {
        let along = (y - y0) as f64 / rows;
        let weight = match position {
            TextPosition::Top => 1.0 - along,
            TextPosition::Center => 1.0 - (2.0 * along - 1.0).abs(),
            TextPosition::Bottom => along,
        };
        let alpha = (GRADIENT_MAX_ALPHA * weight).round().clamp(0.0, 255.0) as u8;
        fill_rect(canvas, 0, y, width, 1, Color::rgba(0, 0, 0, alpha));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use slidecast_timeline_model::effect::EffectSpec;
    use slidecast_timeline_model::geometry::FitMode;
    use slidecast_timeline_model::overlay::{Band, BandPosition};
    use slidecast_timeline_model::request::EncodingRequest;
    use slidecast_timeline_model::timeline::{AssetBuffer, TimelineBuilder};
    use std::io::Cursor;

    fn png(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn timeline_with(
        images: Vec<(u32, u32)>,
        configure: impl FnOnce(&mut EncodingRequest),
    ) -> Timeline {
        let urls: Vec<String> = (0..images.len())
            .map(|i| format!("https://cdn.test/{i}.png"))
            .collect();
        let mut request = EncodingRequest::new(urls.clone());
        request.width = 64;
        request.height = 112;
        request.overlay.font_size = 16.0;
        configure(&mut request);
        let buffers: Vec<AssetBuffer> = urls
            .iter()
            .zip(images)
            .map(|(url, (w, h))| AssetBuffer::new(url.clone(), png(w, h, [220, 30, 30, 255])))
            .collect();
        TimelineBuilder::new().build(&request, &buffers, None).unwrap()
    }

    fn is_black(p: &image::Rgba<u8>) -> bool {
        p.0[0] == 0 && p.0[1] == 0 && p.0[2] == 0
    }

    #[test]
    fn test_output_matches_canvas() {
        let timeline = timeline_with(vec![(40, 40)], |_| {});
        let frame = FrameSynthesizer::default().synthesize(&timeline, 0.5);
        assert_eq!(frame.dimensions(), (64, 112));
    }

    #[test]
    fn test_cover_fills_canvas() {
        let timeline = timeline_with(vec![(200, 100)], |r| r.fit = FitMode::Cover);
        let frame = FrameSynthesizer::default().synthesize(&timeline, 1.0);
        for (x, y) in [(2, 2), (61, 2), (2, 109), (61, 109), (32, 56)] {
            assert!(!is_black(frame.get_pixel(x, y)), "black at {x},{y}");
        }
    }

    #[test]
    fn test_contain_letterboxes_wide_image() {
        let timeline = timeline_with(vec![(200, 100)], |r| r.fit = FitMode::Contain);
        let frame = FrameSynthesizer::default().synthesize(&timeline, 1.0);
        assert!(is_black(frame.get_pixel(32, 2)));
        assert!(is_black(frame.get_pixel(32, 109)));
        assert!(!is_black(frame.get_pixel(32, 56)));
    }

    #[test]
    fn test_fade_is_black_at_clip_edges() {
        let timeline = timeline_with(vec![(64, 112), (64, 112)], |r| {
            r.effect = Some(EffectSpec::Fade)
        });
        let synth = FrameSynthesizer::default();
        assert!(synth.synthesize(&timeline, 0.0).pixels().all(is_black));
        let mid = synth.synthesize(&timeline, 1.0);
        assert_eq!(mid.get_pixel(32, 56).0, [220, 30, 30, 255]);
    }

    #[test]
    fn test_clean_overlay_darkens_behind_text() {
        let timeline = timeline_with(vec![(64, 112)], |r| {
            r.title = Some("Hi".to_string());
            r.overlay.font_size = 12.0;
        });
        let with_text = FrameSynthesizer::default().synthesize(&timeline, 0.5);
        let plain = timeline_with(vec![(64, 112)], |_| {});
        let without = FrameSynthesizer::default().synthesize(&plain, 0.5);
        assert_ne!(with_text.as_raw(), without.as_raw());
        // Upper half is untouched by a bottom overlay.
        assert_eq!(with_text.get_pixel(32, 10), without.get_pixel(32, 10));
    }

    #[test]
    fn test_band_painted_at_top() {
        let timeline = timeline_with(vec![(64, 112)], |r| {
            r.bands = vec![Band {
                text: String::new(),
                position: BandPosition::Top,
                background: Color::rgba(0, 0, 255, 255),
                color: Color::WHITE,
            }]
        });
        let frame = FrameSynthesizer::default().synthesize(&timeline, 0.0);
        assert_eq!(frame.get_pixel(5, 2).0, [0, 0, 255, 255]);
        assert_ne!(frame.get_pixel(5, 60).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_synthesize_into_matches_synthesize() {
        let timeline = timeline_with(vec![(30, 50), (50, 30)], |r| {
            r.effect = Some(EffectSpec::PanRightToLeft);
            r.title = Some("Deterministic".to_string());
        });
        let synth = FrameSynthesizer::default();
        let mut reused = RgbaImage::new(1, 1);
        synth.synthesize_into(&timeline, 2.5, &mut reused);
        assert_eq!(reused.as_raw(), synth.synthesize(&timeline, 2.5).as_raw());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_synthesize_is_deterministic(
            t in 0.0f64..6.0,
            effect in prop::sample::select(EffectSpec::ALL.to_vec()),
        ) {
            let timeline = timeline_with(vec![(48, 80), (80, 48), (64, 64)], |r| {
                r.effect = Some(effect);
                r.title = Some("Same every time".to_string());
            });
            let synth = FrameSynthesizer::default();
            let a = synth.synthesize(&timeline, t);
            let b = synth.synthesize(&timeline, t);
            prop_assert_eq!(a.as_raw(), b.as_raw());
        }
    }
}
