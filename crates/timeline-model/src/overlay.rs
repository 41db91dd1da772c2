//! Text overlay and band styling.

use serde::{Deserialize, Serialize};

/// An 8-bit RGBA colour, written as `#RRGGBB` or `#RRGGBBAA` in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const WHITE: Color = Color([255, 255, 255, 255]);
    pub const BLACK: Color = Color([0, 0, 0, 255]);

    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Parse `#RRGGBB` / `#RRGGBBAA` (leading `#` optional).
    pub fn parse_hex(value: &str) -> Result<Self, String> {
        let hex = value.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{value}' (expected #RRGGBB or #RRGGBBAA)"));
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
        let alpha = if hex.len() == 8 { byte(6) } else { 255 };
        Ok(Self([byte(0), byte(2), byte(4), alpha]))
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b, a] = self.0;
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }

    /// Alpha as a fraction in `[0, 1]`.
    pub fn opacity(&self) -> f64 {
        self.0[3] as f64 / 255.0
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Visual treatment of the overlay text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    /// Translucent box behind the text.
    #[default]
    Clean,
    /// Vertical dark-to-transparent band behind the text.
    Gradient,
    /// Plain fill with a thin dark stroke.
    Minimalist,
}

impl TextStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Gradient => "gradient",
            Self::Minimalist => "minimalist",
        }
    }
}

/// Vertical anchor of the overlay text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

impl TextPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Center => "center",
            Self::Bottom => "bottom",
        }
    }
}

/// Overlay styling as sent in the encode request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayConfig {
    pub style: TextStyle,
    pub position: TextPosition,
    /// Font size in output pixels.
    pub font_size: f32,
    pub color: Color,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            style: TextStyle::Clean,
            position: TextPosition::Bottom,
            font_size: 64.0,
            color: Color::WHITE,
        }
    }
}

/// Overlay text spanning the whole timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayText {
    pub text: String,
    pub style: TextStyle,
    pub position: TextPosition,
    pub font_size: f32,
    pub color: Color,
}

impl OverlayText {
    pub fn from_config(text: impl Into<String>, config: &OverlayConfig) -> Self {
        Self {
            text: text.into(),
            style: config.style,
            position: config.position,
            font_size: config.font_size,
            color: config.color,
        }
    }

    /// Distance between consecutive baselines.
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_HEIGHT_FACTOR
    }
}

/// Line height as a multiple of the font size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.25;

/// Wrapped lines may use at most this fraction of the canvas width.
pub const MAX_TEXT_WIDTH_FRACTION: f32 = 0.85;

/// Margin between the text block and the top/bottom canvas edge, as a
/// fraction of canvas height.
pub const TEXT_EDGE_MARGIN_FRACTION: f32 = 0.12;

/// Band height as a fraction of canvas height.
pub const BAND_HEIGHT_FRACTION: f32 = 0.08;

/// Edge a fixed band is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BandPosition {
    #[default]
    Top,
    Bottom,
}

/// A fixed title/price band drawn on every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub text: String,
    #[serde(default)]
    pub position: BandPosition,
    #[serde(default = "default_band_background")]
    pub background: Color,
    #[serde(default = "default_band_color")]
    pub color: Color,
}

fn default_band_background() -> Color {
    Color::rgba(0, 0, 0, 179)
}

fn default_band_color() -> Color {
    Color::WHITE
}

impl Band {
    /// Band rectangle `(y, height)` on a canvas of `canvas_h` pixels.
    pub fn vertical_extent(&self, canvas_h: u32) -> (u32, u32) {
        let height = ((canvas_h as f32 * BAND_HEIGHT_FRACTION).round() as u32).max(1);
        let y = match self.position {
            BandPosition::Top => 0,
            BandPosition::Bottom => canvas_h.saturating_sub(height),
        };
        (y, height)
    }

    /// Font size used for band text.
    pub fn font_size(&self, canvas_h: u32) -> f32 {
        let (_, height) = self.vertical_extent(canvas_h);
        height as f32 * 0.5
    }
}
