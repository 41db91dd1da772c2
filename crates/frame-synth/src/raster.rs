//! Raster primitives: image placement and alpha blending.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, Blend};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::rect::Rect as PixelRect;

use slidecast_timeline_model::geometry::Rect;
use slidecast_timeline_model::overlay::Color;

/// Opaque black, the pad and fade colour.
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A canvas filled with opaque black.
pub fn black_canvas(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BLACK)
}

/// Blend `color` into one pixel with the given coverage in `[0, 1]`.
/// Out-of-bounds coordinates are ignored.
pub fn blend_coverage(canvas: &mut RgbaImage, x: i32, y: i32, color: Color, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let a = coverage.clamp(0.0, 1.0) * color.0[3] as f32 / 255.0;
    if a <= 0.0 {
        return;
    }
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let dst = pixel.0[c] as f32;
        let src = color.0[c] as f32;
        pixel.0[c] = (dst + (src - dst) * a).round().clamp(0.0, 255.0) as u8;
    }
    pixel.0[3] = 255;
}

/// Fill a rectangle, alpha-blended when `color` is translucent. Clipped to
/// the canvas.
pub fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, w: u32, h: u32, color: Color) {
    if w == 0 || h == 0 || color.0[3] == 0 {
        return;
    }
    let rect = PixelRect::at(x, y).of_size(w, h);
    if color.0[3] == 255 {
        draw_filled_rect_mut(canvas, rect, Rgba(color.0));
        return;
    }
    let mut blended = Blend(std::mem::replace(canvas, RgbaImage::new(0, 0)));
    draw_filled_rect_mut(&mut blended, rect, Rgba(color.0));
    *canvas = blended.0;
}

/// Fill `rect` (fractional canvas coordinates) rounded to whole pixels.
pub fn fill_area(canvas: &mut RgbaImage, rect: &Rect, color: Color) {
    let x0 = rect.x.round() as i32;
    let y0 = rect.y.round() as i32;
    let x1 = rect.right().round() as i32;
    let y1 = rect.bottom().round() as i32;
    if x1 > x0 && y1 > y0 {
        fill_rect(canvas, x0, y0, (x1 - x0) as u32, (y1 - y0) as u32, color);
    }
}

/// Draw `source` scaled into `dest` with bilinear sampling, composited at
/// `alpha` over what is already on the canvas. Source transparency is
/// honoured.
pub fn place_image(canvas: &mut RgbaImage, source: &RgbaImage, dest: &Rect, alpha: f64) {
    let alpha = alpha.clamp(0.0, 1.0) as f32;
    if alpha <= 0.0 || source.width() == 0 || source.height() == 0 || dest.w <= 0.0 || dest.h <= 0.0
    {
        return;
    }

    let sx = (dest.w / source.width() as f64) as f32;
    let sy = (dest.h / source.height() as f64) as f32;
    let projection =
        Projection::translate(dest.x as f32, dest.y as f32) * Projection::scale(sx, sy);

    let mut layer = RgbaImage::new(canvas.width(), canvas.height());
    warp_into(
        source,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut layer,
    );

    for (dst, src) in canvas.pixels_mut().zip(layer.pixels()) {
        let a = src.0[3] as f32 / 255.0 * alpha;
        if a <= 0.0 {
            continue;
        }
        for c in 0..3 {
            let d = dst.0[c] as f32;
            dst.0[c] = (d + (src.0[c] as f32 - d) * a).round().clamp(0.0, 255.0) as u8;
        }
        dst.0[3] = 255;
    }
}
