//! Slidecast Frame Synthesizer
//!
//! Renders any instant of a [`Timeline`](slidecast_timeline_model::Timeline)
//! to an RGBA raster, pure and deterministic:
//! - **Text:** glyph sources (TrueType or block fallback) and greedy wrapping
//! - **Layout:** where overlay lines and bands land on the canvas
//! - **Raster:** image placement and alpha blending primitives
//! - **Synth:** the per-frame composition itself

pub mod layout;
pub mod raster;
pub mod synth;
pub mod text;

pub use layout::{layout_band, layout_overlay, BandLayout, LaidOutLine, TextBlock};
pub use synth::FrameSynthesizer;
pub use text::{wrap_text, TextMeasure, TextRenderer, BLOCK_ADVANCE_FACTOR};
