//! Canvas geometry and aspect-fit placement.
//!
//! Coordinates are canvas pixels: `(0.0, 0.0)` is the top-left corner of the
//! output frame. [`fit_rect`] is the only place that decides where a source
//! image lands on the canvas; every backend goes through it.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle covering a whole `width` x `height` canvas.
    pub fn canvas(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    /// The center point of this rectangle.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Scale by `factor` about the point `(cx, cy)`.
    pub fn scaled_about(&self, cx: f64, cy: f64, factor: f64) -> Self {
        Self {
            x: cx + (self.x - cx) * factor,
            y: cy + (self.y - cy) * factor,
            w: self.w * factor,
            h: self.h * factor,
        }
    }

    /// Shift by `(dx, dy)`.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Whether this rectangle fully covers `other`.
    pub fn covers(&self, other: &Rect) -> bool {
        const EPS: f64 = 1e-6;
        self.x <= other.x + EPS
            && self.y <= other.y + EPS
            && self.right() >= other.right() - EPS
            && self.bottom() >= other.bottom() - EPS
    }

    /// Whether this rectangle lies entirely inside `other`.
    pub fn within(&self, other: &Rect) -> bool {
        other.covers(self)
    }
}

/// Strategy for mapping a source image onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fill the canvas, cropping the overflowing axis.
    #[default]
    Cover,
    /// Show the whole image, padding the short axis.
    Contain,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Contain => "contain",
        }
    }
}

/// Width-over-height ratio, guarding against zero heights.
pub fn aspect(width: f64, height: f64) -> f64 {
    width / height.max(f64::EPSILON)
}

/// Place an `image_w` x `image_h` image on a `canvas_w` x `canvas_h` canvas.
///
/// Wider-than-canvas images are fit by height under `Cover` (width cropped)
/// and by width under `Contain` (height padded); taller images take the
/// symmetric branch. The result is always centered on the canvas.
pub fn fit_rect(image_w: u32, image_h: u32, canvas_w: u32, canvas_h: u32, fit: FitMode) -> Rect {
    let iw = image_w.max(1) as f64;
    let ih = image_h.max(1) as f64;
    let cw = canvas_w.max(1) as f64;
    let ch = canvas_h.max(1) as f64;

    let image_aspect = aspect(iw, ih);
    let canvas_aspect = aspect(cw, ch);
    let wider = image_aspect > canvas_aspect;

    let fit_by_height = match fit {
        FitMode::Cover => wider,
        FitMode::Contain => !wider,
    };

    let (w, h) = if fit_by_height {
        (ch * image_aspect, ch)
    } else {
        (cw, cw / image_aspect)
    };

    Rect::new((cw - w) / 2.0, (ch - h) / 2.0, w, h)
}

/// Round a dimension down to the nearest even number (minimum 2).
pub fn even_floor(value: u32) -> u32 {
    (value & !1).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cover_landscape_on_portrait_crops_width() {
        let rect = fit_rect(1920, 1080, 1080, 1920, FitMode::Cover);
        assert!((rect.h - 1920.0).abs() < 1e-9);
        assert!((rect.w - 1920.0 * 16.0 / 9.0).abs() < 1e-6);
        assert!(rect.x < 0.0);
        assert!((rect.center().0 - 540.0).abs() < 1e-9);
    }

    #[test]
    fn test_contain_landscape_on_portrait_pads_height() {
        let rect = fit_rect(1920, 1080, 1080, 1920, FitMode::Contain);
        assert!((rect.w - 1080.0).abs() < 1e-9);
        assert!((rect.h - 607.5).abs() < 1e-9);
        assert!((rect.y - (1920.0 - 607.5) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cover_tall_image_crops_height() {
        let rect = fit_rect(1000, 4000, 1080, 1920, FitMode::Cover);
        assert!((rect.w - 1080.0).abs() < 1e-9);
        assert!(rect.h > 1920.0);
        assert!(rect.y < 0.0);
    }

    #[test]
    fn test_same_aspect_fills_exactly() {
        for fit in [FitMode::Cover, FitMode::Contain] {
            let rect = fit_rect(540, 960, 1080, 1920, fit);
            assert!((rect.x).abs() < 1e-9);
            assert!((rect.y).abs() < 1e-9);
            assert!((rect.w - 1080.0).abs() < 1e-9);
            assert!((rect.h - 1920.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_scaled_about_center_keeps_center() {
        let rect = Rect::canvas(1080, 1920);
        let zoomed = rect.scaled_about(540.0, 960.0, 1.1);
        assert!((zoomed.center().0 - 540.0).abs() < 1e-9);
        assert!((zoomed.w - 1188.0).abs() < 1e-9);
        assert!(zoomed.covers(&rect));
    }

    #[test]
    fn test_even_floor() {
        assert_eq!(even_floor(1081), 1080);
        assert_eq!(even_floor(1080), 1080);
        assert_eq!(even_floor(1), 2);
    }

    proptest! {
        #[test]
        fn prop_cover_always_covers_canvas(
            iw in 1u32..5000, ih in 1u32..5000, cw in 16u32..4096, ch in 16u32..4096
        ) {
            let rect = fit_rect(iw, ih, cw, ch, FitMode::Cover);
            prop_assert!(rect.covers(&Rect::canvas(cw, ch)));
        }

        #[test]
        fn prop_contain_always_within_canvas(
            iw in 1u32..5000, ih in 1u32..5000, cw in 16u32..4096, ch in 16u32..4096
        ) {
            let rect = fit_rect(iw, ih, cw, ch, FitMode::Contain);
            prop_assert!(rect.within(&Rect::canvas(cw, ch)));
        }

        #[test]
        fn prop_fit_preserves_image_aspect(
            iw in 1u32..5000, ih in 1u32..5000, fit_cover in any::<bool>()
        ) {
            let fit = if fit_cover { FitMode::Cover } else { FitMode::Contain };
            let rect = fit_rect(iw, ih, 1080, 1920, fit);
            let expected = iw as f64 / ih as f64;
            prop_assert!((rect.w / rect.h - expected).abs() / expected < 1e-9);
        }
    }
}
