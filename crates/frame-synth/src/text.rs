//! Glyph sources, text measurement and greedy wrapping.

use std::path::Path;

use image::RgbaImage;
use rusttype::{point, Font, Scale};

use slidecast_common::config::TextConfig;
use slidecast_common::error::{SlidecastError, SlidecastResult};
use slidecast_timeline_model::overlay::Color;

use crate::raster::{blend_coverage, fill_rect};

/// Horizontal advance of one block glyph, as a multiple of the font size.
pub const BLOCK_ADVANCE_FACTOR: f32 = 0.55;

/// Measures rendered line widths.
pub trait TextMeasure {
    /// Width in pixels of `text` on one line at `font_size`.
    fn line_width(&self, text: &str, font_size: f32) -> f32;
}

/// Greedy word wrap: words are added to the current line while it fits in
/// `max_width`. A word wider than `max_width` gets a line of its own.
/// Explicit newlines always break.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    max_width: f32,
    measure: &dyn TextMeasure,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if measure.line_width(&candidate, font_size) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

enum GlyphSource {
    TrueType(Font<'static>),
    Block,
}

/// Draws single lines of text onto a raster.
pub struct TextRenderer {
    source: GlyphSource,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            GlyphSource::TrueType(_) => "truetype",
            GlyphSource::Block => "block",
        };
        f.debug_struct("TextRenderer")
            .field("source", &source)
            .finish()
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::block()
    }
}

impl TextRenderer {
    /// Deterministic block glyphs; needs no font file.
    pub fn block() -> Self {
        Self {
            source: GlyphSource::Block,
        }
    }

    pub fn from_font_bytes(bytes: Vec<u8>) -> SlidecastResult<Self> {
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| SlidecastError::config("font data is not a valid TrueType font"))?;
        Ok(Self {
            source: GlyphSource::TrueType(font),
        })
    }

    pub fn from_font_file(path: &Path) -> SlidecastResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            SlidecastError::config(format!("failed to read font {}: {e}", path.display()))
        })?;
        Self::from_font_bytes(bytes)
    }

    /// TrueType when a font path is configured, block glyphs otherwise.
    pub fn from_config(config: &TextConfig) -> SlidecastResult<Self> {
        match &config.font_path {
            Some(path) => {
                let renderer = Self::from_font_file(path)?;
                tracing::debug!(font = %path.display(), "Loaded overlay font");
                Ok(renderer)
            }
            None => Ok(Self::block()),
        }
    }

    pub fn is_truetype(&self) -> bool {
        matches!(self.source, GlyphSource::TrueType(_))
    }

    /// Draw `text` with its line box starting at (`x`, `top`).
    pub fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        x: f32,
        top: f32,
        text: &str,
        font_size: f32,
        color: Color,
    ) {
        match &self.source {
            GlyphSource::TrueType(font) => {
                let scale = Scale::uniform(font_size);
                let ascent = font.v_metrics(scale).ascent;
                for glyph in font.layout(text, scale, point(x, top + ascent)) {
                    let Some(bounds) = glyph.pixel_bounding_box() else {
                        continue;
                    };
                    glyph.draw(|gx, gy, coverage| {
                        blend_coverage(
                            canvas,
                            bounds.min.x + gx as i32,
                            bounds.min.y + gy as i32,
                            color,
                            coverage,
                        );
                    });
                }
            }
            GlyphSource::Block => {
                let advance = font_size * BLOCK_ADVANCE_FACTOR;
                let glyph_w = font_size * 0.45;
                let glyph_top = top + font_size * 0.2;
                let glyph_h = font_size * 0.7;
                for (i, ch) in text.chars().enumerate() {
                    if ch.is_whitespace() {
                        continue;
                    }
                    let left = x + i as f32 * advance + (advance - glyph_w) / 2.0;
                    fill_rect(
                        canvas,
                        left.round() as i32,
                        glyph_top.round() as i32,
                        glyph_w.round().max(1.0) as u32,
                        glyph_h.round().max(1.0) as u32,
                        color,
                    );
                }
            }
        }
    }
}

impl TextMeasure for TextRenderer {
    fn line_width(&self, text: &str, font_size: f32) -> f32 {
        match &self.source {
            GlyphSource::TrueType(font) => {
                let scale = Scale::uniform(font_size);
                font.layout(text, scale, point(0.0, 0.0))
                    .last()
                    .map(|glyph| {
                        glyph.position().x + glyph.unpositioned().h_metrics().advance_width
                    })
                    .unwrap_or(0.0)
            }
            GlyphSource::Block => text.chars().count() as f32 * font_size * BLOCK_ADVANCE_FACTOR,
        }
    }
}
