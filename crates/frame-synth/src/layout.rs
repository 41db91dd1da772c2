//! Placement of overlay text and bands on the canvas.
//!
//! Shared by the in-process synthesizer and the filter-graph builder so
//! every backend puts text in the same place.

use slidecast_timeline_model::geometry::Rect;
use slidecast_timeline_model::overlay::{
    Band, OverlayText, TextPosition, MAX_TEXT_WIDTH_FRACTION, TEXT_EDGE_MARGIN_FRACTION,
};

use crate::text::{wrap_text, TextMeasure};

/// Padding around the text block, as a multiple of the font size.
pub const BLOCK_PADDING_FACTOR: f32 = 0.3;

/// One line of text with its line box origin.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutLine {
    pub text: String,
    /// Left edge of the line, centered horizontally.
    pub x: f64,
    /// Top of the glyph box.
    pub top: f64,
    /// Measured width.
    pub width: f64,
}

/// A wrapped, positioned overlay text block.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<LaidOutLine>,
    pub font_size: f32,
    pub line_height: f32,
    /// Padded background area, clipped to the canvas.
    pub bounds: Rect,
}

/// Wrap and position the overlay for a `canvas_w` x `canvas_h` frame.
pub fn layout_overlay(
    overlay: &OverlayText,
    canvas_w: u32,
    canvas_h: u32,
    measure: &dyn TextMeasure,
) -> TextBlock {
    let font_size = overlay.font_size;
    let line_height = overlay.line_height();
    let max_width = canvas_w as f32 * MAX_TEXT_WIDTH_FRACTION;
    let wrapped = wrap_text(&overlay.text, font_size, max_width, measure);

    let cw = canvas_w as f64;
    let ch = canvas_h as f64;
    let block_h = wrapped.len() as f64 * line_height as f64;
    let margin = ch * TEXT_EDGE_MARGIN_FRACTION as f64;
    let block_top = match overlay.position {
        TextPosition::Top => margin,
        TextPosition::Center => (ch - block_h) / 2.0,
        TextPosition::Bottom => ch - margin - block_h,
    };
    let leading = (line_height - font_size) as f64 / 2.0;

    let lines: Vec<LaidOutLine> = wrapped
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let width = measure.line_width(&text, font_size) as f64;
            LaidOutLine {
                x: (cw - width) / 2.0,
                top: block_top + i as f64 * line_height as f64 + leading,
                width,
                text,
            }
        })
        .collect();

    let widest = lines.iter().map(|line| line.width).fold(0.0f64, f64::max);
    let pad = (font_size * BLOCK_PADDING_FACTOR) as f64;
    let bounds = clip_to_canvas(
        Rect::new(
            (cw - widest) / 2.0 - pad,
            block_top - pad,
            widest + 2.0 * pad,
            block_h + 2.0 * pad,
        ),
        cw,
        ch,
    );

    TextBlock {
        lines,
        font_size,
        line_height,
        bounds,
    }
}

/// A band's box and its single centered line.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    pub area: Rect,
    pub font_size: f32,
    pub line: LaidOutLine,
}

pub fn layout_band(
    band: &Band,
    canvas_w: u32,
    canvas_h: u32,
    measure: &dyn TextMeasure,
) -> BandLayout {
    let (y, height) = band.vertical_extent(canvas_h);
    let font_size = band.font_size(canvas_h);
    let width = measure.line_width(band.text.trim(), font_size) as f64;
    BandLayout {
        area: Rect::new(0.0, y as f64, canvas_w as f64, height as f64),
        font_size,
        line: LaidOutLine {
            text: band.text.trim().to_string(),
            x: (canvas_w as f64 - width) / 2.0,
            top: y as f64 + (height as f64 - font_size as f64) / 2.0,
            width,
        },
    }
}

fn clip_to_canvas(rect: Rect, cw: f64, ch: f64) -> Rect {
    let x0 = rect.x.max(0.0);
    let y0 = rect.y.max(0.0);
    let x1 = rect.right().min(cw);
    let y1 = rect.bottom().min(ch);
    Rect::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextRenderer;
    use slidecast_timeline_model::overlay::{BandPosition, Color, OverlayConfig};

    fn overlay(text: &str, position: TextPosition) -> OverlayText {
        OverlayText::from_config(
            text,
            &OverlayConfig {
                position,
                font_size: 40.0,
                ..OverlayConfig::default()
            },
        )
    }

    #[test]
    fn test_bottom_block_sits_above_margin() {
        let block = layout_overlay(
            &overlay("Summer sale", TextPosition::Bottom),
            1080,
            1920,
            &TextRenderer::block(),
        );
        assert_eq!(block.lines.len(), 1);
        let line = &block.lines[0];
        let margin = 1920.0 * TEXT_EDGE_MARGIN_FRACTION as f64;
        assert!(line.top + 40.0 <= 1920.0 - margin + 1e-6);
        assert!((line.x + line.width / 2.0 - 540.0).abs() < 1e-6);
    }

    #[test]
    fn test_long_title_wraps_within_width() {
        let text = "an extremely long promotional title that cannot possibly fit on one line";
        let block = layout_overlay(
            &overlay(text, TextPosition::Center),
            400,
            800,
            &TextRenderer::block(),
        );
        assert!(block.lines.len() > 1);
        for line in &block.lines {
            assert!(line.width <= 400.0 * MAX_TEXT_WIDTH_FRACTION as f64 + 1e-6);
        }
        let first = block.lines[0].top;
        let second = block.lines[1].top;
        assert!((second - first - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounds_clipped_to_canvas() {
        let block = layout_overlay(
            &overlay("Top", TextPosition::Top),
            64,
            64,
            &TextRenderer::block(),
        );
        assert!(block.bounds.x >= 0.0 && block.bounds.y >= 0.0);
        assert!(block.bounds.right() <= 64.0 && block.bounds.bottom() <= 64.0);
    }

    #[test]
    fn test_band_layout_pinned_to_edge() {
        let band = Band {
            text: " $19.99 ".to_string(),
            position: BandPosition::Bottom,
            background: Color::BLACK,
            color: Color::WHITE,
        };
        let layout = layout_band(&band, 1080, 1920, &TextRenderer::block());
        assert_eq!(layout.area.bottom(), 1920.0);
        assert_eq!(layout.line.text, "$19.99");
        assert!(layout.line.top >= layout.area.y);
    }
}
