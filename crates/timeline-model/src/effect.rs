//! Per-clip animated effects.
//!
//! Each effect is a pure function of the clip's normalized progress. The
//! constants below are the single source of truth: the frame synthesizer
//! samples them per pixel, the command-line encoder turns them into filter
//! expressions, and the remote job spec names the matching preset.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Zoom amplitude: zoom effects scale between `1.0` and `1.0 + ZOOM_AMOUNT`.
pub const ZOOM_AMOUNT: f64 = 0.1;

/// Pan overscan, as a fraction of canvas width. The image is enlarged by the
/// same fraction so the pan never reveals the canvas edge.
pub const PAN_RANGE_FRACTION: f64 = ZOOM_AMOUNT;

/// Slide-up start offset, as a fraction of canvas height.
pub const SLIDE_OFFSET_FRACTION: f64 = 0.1;

/// A time-parameterized visual transform applied to one clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EffectSpec {
    #[default]
    None,
    #[serde(alias = "pan_right_to_left", alias = "pan")]
    PanRightToLeft,
    #[serde(alias = "zoom_in")]
    ZoomIn,
    #[serde(alias = "zoom_out")]
    ZoomOut,
    Fade,
    #[serde(alias = "slide_up")]
    SlideUp,
}

impl EffectSpec {
    pub const ALL: [EffectSpec; 6] = [
        EffectSpec::None,
        EffectSpec::PanRightToLeft,
        EffectSpec::ZoomIn,
        EffectSpec::ZoomOut,
        EffectSpec::Fade,
        EffectSpec::SlideUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PanRightToLeft => "panRightToLeft",
            Self::ZoomIn => "zoomIn",
            Self::ZoomOut => "zoomOut",
            Self::Fade => "fade",
            Self::SlideUp => "slideUp",
        }
    }

    /// Scale factor applied about the canvas center.
    pub fn scale(&self, progress: f64) -> f64 {
        let p = clamp_progress(progress);
        match self {
            Self::ZoomIn => 1.0 + ZOOM_AMOUNT * p,
            Self::ZoomOut => 1.0 + ZOOM_AMOUNT * (1.0 - p),
            Self::PanRightToLeft => 1.0 + PAN_RANGE_FRACTION,
            _ => 1.0,
        }
    }

    /// Horizontal translation in canvas pixels.
    pub fn offset_x(&self, progress: f64, canvas_w: f64) -> f64 {
        match self {
            Self::PanRightToLeft => {
                let pan_range = PAN_RANGE_FRACTION * canvas_w;
                pan_range * (0.5 - clamp_progress(progress))
            }
            _ => 0.0,
        }
    }

    /// Vertical translation in canvas pixels.
    pub fn offset_y(&self, progress: f64, canvas_h: f64) -> f64 {
        match self {
            Self::SlideUp => SLIDE_OFFSET_FRACTION * canvas_h * (1.0 - clamp_progress(progress)),
            _ => 0.0,
        }
    }

    /// Global opacity of the clip over a black canvas.
    pub fn alpha(&self, progress: f64) -> f64 {
        match self {
            Self::Fade => {
                let p = clamp_progress(progress);
                (2.0 * p).min(2.0 * (1.0 - p)).clamp(0.0, 1.0)
            }
            _ => 1.0,
        }
    }

    /// The full transform at `progress` for a `canvas_w` x `canvas_h` canvas.
    pub fn transform(&self, progress: f64, canvas_w: u32, canvas_h: u32) -> EffectTransform {
        EffectTransform {
            scale: self.scale(progress),
            dx: self.offset_x(progress, canvas_w as f64),
            dy: self.offset_y(progress, canvas_h as f64),
            alpha: self.alpha(progress),
        }
    }

    /// Whether the effect changes anything over time.
    pub fn is_animated(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::str::FromStr for EffectSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown effect '{s}'"))
    }
}

/// Resolved effect parameters for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectTransform {
    /// Scale about the canvas center.
    pub scale: f64,
    /// Horizontal shift in pixels (applied after scaling).
    pub dx: f64,
    /// Vertical shift in pixels (applied after scaling).
    pub dy: f64,
    /// Opacity in `[0, 1]`.
    pub alpha: f64,
}

impl EffectTransform {
    pub const IDENTITY: EffectTransform = EffectTransform {
        scale: 1.0,
        dx: 0.0,
        dy: 0.0,
        alpha: 1.0,
    };

    /// Move a fitted placement rectangle according to this transform.
    pub fn apply(&self, placement: &Rect, canvas_w: u32, canvas_h: u32) -> Rect {
        let cx = canvas_w as f64 / 2.0;
        let cy = canvas_h as f64 / 2.0;
        placement
            .scaled_about(cx, cy, self.scale)
            .translated(self.dx, self.dy)
    }
}

/// Clamp progress into `[0, 1]`, mapping NaN to `0`.
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{fit_rect, FitMode};
    use proptest::prelude::*;

    #[test]
    fn test_zoom_in_endpoints() {
        assert!((EffectSpec::ZoomIn.scale(0.0) - 1.0).abs() < 1e-12);
        assert!((EffectSpec::ZoomIn.scale(1.0) - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_zoom_out_is_inverse_of_zoom_in() {
        for p in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let zin = EffectSpec::ZoomIn.scale(p);
            let zout = EffectSpec::ZoomOut.scale(1.0 - p);
            assert!((zin - zout).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pan_moves_right_to_left() {
        let start = EffectSpec::PanRightToLeft.offset_x(0.0, 1080.0);
        let end = EffectSpec::PanRightToLeft.offset_x(1.0, 1080.0);
        assert!(start > end);
        assert!((start - end - PAN_RANGE_FRACTION * 1080.0).abs() < 1e-9);
    }

    #[test]
    fn test_fade_in_and_out() {
        assert_eq!(EffectSpec::Fade.alpha(0.0), 0.0);
        assert!((EffectSpec::Fade.alpha(0.25) - 0.5).abs() < 1e-12);
        assert_eq!(EffectSpec::Fade.alpha(0.5), 1.0);
        assert!((EffectSpec::Fade.alpha(0.75) - 0.5).abs() < 1e-12);
        assert_eq!(EffectSpec::Fade.alpha(1.0), 0.0);
    }

    #[test]
    fn test_slide_up_lands_at_rest() {
        assert!((EffectSpec::SlideUp.offset_y(0.0, 1920.0) - 192.0).abs() < 1e-9);
        assert_eq!(EffectSpec::SlideUp.offset_y(1.0, 1920.0), 0.0);
    }

    #[test]
    fn test_none_is_identity() {
        for p in [0.0, 0.5, 1.0] {
            assert_eq!(
                EffectSpec::None.transform(p, 1080, 1920),
                EffectTransform::IDENTITY
            );
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("zoomIn".parse::<EffectSpec>().unwrap(), EffectSpec::ZoomIn);
        assert_eq!(
            "pan_right_to_left".parse::<EffectSpec>().unwrap(),
            EffectSpec::PanRightToLeft
        );
        assert!("spin".parse::<EffectSpec>().is_err());
    }

    #[test]
    fn test_clamp_progress_handles_nan() {
        assert_eq!(clamp_progress(f64::NAN), 0.0);
        assert_eq!(clamp_progress(-3.0), 0.0);
        assert_eq!(clamp_progress(7.0), 1.0);
    }

    proptest! {
        #[test]
        fn prop_pan_never_reveals_canvas(p in 0.0f64..=1.0) {
            let placement = fit_rect(1080, 1920, 1080, 1920, FitMode::Cover);
            let moved = EffectSpec::PanRightToLeft
                .transform(p, 1080, 1920)
                .apply(&placement, 1080, 1920);
            prop_assert!(moved.covers(&Rect::canvas(1080, 1920)));
        }

        #[test]
        fn prop_zoom_never_reveals_canvas_under_cover(p in 0.0f64..=1.0, iw in 100u32..4000, ih in 100u32..4000) {
            let placement = fit_rect(iw, ih, 1080, 1920, FitMode::Cover);
            for effect in [EffectSpec::ZoomIn, EffectSpec::ZoomOut] {
                let moved = effect.transform(p, 1080, 1920).apply(&placement, 1080, 1920);
                prop_assert!(moved.covers(&Rect::canvas(1080, 1920)));
            }
        }

        #[test]
        fn prop_transform_fields_bounded(p in -2.0f64..3.0) {
            for effect in EffectSpec::ALL {
                let t = effect.transform(p, 1080, 1920);
                prop_assert!((0.0..=1.0).contains(&t.alpha));
                prop_assert!(t.scale >= 1.0 && t.scale <= 1.0 + ZOOM_AMOUNT + 1e-12);
            }
        }
    }
}
