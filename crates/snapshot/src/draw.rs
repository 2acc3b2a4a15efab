//! tiny-skia helpers shared by the rasterizer and the manual painter.

use image::RgbaImage;
use page::gradient::{resolve_stops, Gradient, LinearGradient, RadialGradient, RadialShape};
use page::{Rect, Rgba};
use tiny_skia::{
    Color, FillRule, GradientStop, Paint, Path, PathBuilder, Pixmap, Point, Shader, SpreadMode,
    Stroke, Transform,
};

use crate::error::CaptureError;

pub(crate) fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, CaptureError> {
    Pixmap::new(width, height).ok_or(CaptureError::Allocation { width, height })
}

pub(crate) fn skia_color(color: Rgba, opacity: f32) -> Color {
    let [r, g, b, _] = color.to_u8();
    let alpha = (color.a * opacity).clamp(0.0, 1.0);
    Color::from_rgba8(r, g, b, (alpha * 255.0).round() as u8)
}

/// Rounded rectangle outline built from lines and one quadratic curve per
/// corner, with the control point on the corner itself.
pub(crate) fn rounded_rect_path(rect: Rect, radius: f32) -> Option<Path> {
    if rect.is_empty() {
        return None;
    }
    let radius = radius.clamp(0.0, rect.width.min(rect.height) * 0.5);
    if radius <= 0.0 {
        return tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
            .map(PathBuilder::from_rect);
    }
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let mut builder = PathBuilder::new();
    builder.move_to(left + radius, top);
    builder.line_to(right - radius, top);
    builder.quad_to(right, top, right, top + radius);
    builder.line_to(right, bottom - radius);
    builder.quad_to(right, bottom, right - radius, bottom);
    builder.line_to(left + radius, bottom);
    builder.quad_to(left, bottom, left, bottom - radius);
    builder.line_to(left, top + radius);
    builder.quad_to(left, top, left + radius, top);
    builder.close();
    builder.finish()
}

pub(crate) fn fill_rounded(pixmap: &mut Pixmap, rect: Rect, radius: f32, shader: Shader<'_>) {
    let Some(path) = rounded_rect_path(rect, radius) else {
        return;
    };
    let mut paint = Paint::default();
    paint.shader = shader;
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
}

pub(crate) fn stroke_rounded(
    pixmap: &mut Pixmap,
    rect: Rect,
    radius: f32,
    width: f32,
    color: Color,
) {
    if width <= 0.0 {
        return;
    }
    // Stroke centred on the inset edge so the border stays inside the box.
    let inset = Rect::new(
        rect.x + width * 0.5,
        rect.y + width * 0.5,
        rect.width - width,
        rect.height - width,
    );
    let Some(path) = rounded_rect_path(inset, (radius - width * 0.5).max(0.0)) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    let stroke = Stroke {
        width,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

fn gradient_stops(
    stops: &[page::gradient::ColorStop],
    line_length: f32,
    opacity: f32,
) -> Vec<GradientStop> {
    resolve_stops(stops, line_length)
        .into_iter()
        .map(|(offset, color)| GradientStop::new(offset.clamp(0.0, 1.0), skia_color(color, opacity)))
        .collect()
}

/// Shader for a linear gradient laid out over `rect` (raster pixels).
///
/// `px_scale` converts px stop positions from CSS pixels to raster pixels.
pub(crate) fn linear_shader(
    gradient: &LinearGradient,
    rect: Rect,
    px_scale: f32,
    opacity: f32,
) -> Option<Shader<'static>> {
    let ((x0, y0), (x1, y1)) = gradient.line(&rect);
    let length = gradient.line_length(&rect) / px_scale.max(f32::EPSILON);
    tiny_skia::LinearGradient::new(
        Point::from_xy(x0, y0),
        Point::from_xy(x1, y1),
        gradient_stops(&gradient.stops, length, opacity),
        SpreadMode::Pad,
        Transform::identity(),
    )
}

pub(crate) fn radial_shader(
    gradient: &RadialGradient,
    rect: Rect,
    px_scale: f32,
    opacity: f32,
) -> Option<Shader<'static>> {
    let cx = rect.x + rect.width * gradient.center.0;
    let cy = rect.y + rect.height * gradient.center.1;
    // farthest-corner sizing
    let dx = (cx - rect.x).abs().max((rect.right() - cx).abs());
    let dy = (cy - rect.y).abs().max((rect.bottom() - cy).abs());
    let (rx, ry) = match gradient.shape {
        RadialShape::Circle => {
            let radius = (dx * dx + dy * dy).sqrt();
            (radius, radius)
        }
        RadialShape::Ellipse => (dx * std::f32::consts::SQRT_2, dy * std::f32::consts::SQRT_2),
    };
    if rx <= 0.0 || ry <= 0.0 {
        return None;
    }
    let transform = Transform::from_translate(cx, cy)
        .pre_scale(1.0, ry / rx)
        .pre_translate(-cx, -cy);
    tiny_skia::RadialGradient::new(
        Point::from_xy(cx, cy),
        Point::from_xy(cx, cy),
        rx,
        gradient_stops(&gradient.stops, rx / px_scale.max(f32::EPSILON), opacity),
        SpreadMode::Pad,
        transform,
    )
}

pub(crate) fn gradient_shader(
    gradient: &Gradient,
    rect: Rect,
    px_scale: f32,
    opacity: f32,
) -> Option<Shader<'static>> {
    match gradient {
        Gradient::Linear(linear) => linear_shader(linear, rect, px_scale, opacity),
        Gradient::Radial(radial) => radial_shader(radial, rect, px_scale, opacity),
    }
}

/// Draws an RGBA image stretched over `rect`.
pub(crate) fn draw_image(pixmap: &mut Pixmap, image: &RgbaImage, rect: Rect, opacity: f32) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || rect.is_empty() {
        return;
    }
    let Some(mut source) = Pixmap::new(width, height) else {
        return;
    };
    for (dst, src) in source.data_mut().chunks_exact_mut(4).zip(image.as_raw().chunks_exact(4)) {
        let alpha = src[3] as u16;
        dst[0] = ((src[0] as u16 * alpha + 127) / 255) as u8;
        dst[1] = ((src[1] as u16 * alpha + 127) / 255) as u8;
        dst[2] = ((src[2] as u16 * alpha + 127) / 255) as u8;
        dst[3] = src[3];
    }
    let transform = Transform::from_row(
        rect.width / width as f32,
        0.0,
        0.0,
        rect.height / height as f32,
        rect.x,
        rect.y,
    );
    let paint = tiny_skia::PixmapPaint {
        opacity,
        quality: tiny_skia::FilterQuality::Bilinear,
        ..tiny_skia::PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
}

/// Converts tiny-skia's premultiplied pixels into a straight-alpha image.
pub(crate) fn into_image(pixmap: Pixmap) -> RgbaImage {
    let (width, height) = (pixmap.width(), pixmap.height());
    let mut data = pixmap.take();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        if alpha == 0 {
            pixel[..3].fill(0);
            continue;
        }
        for channel in &mut pixel[..3] {
            *channel = ((*channel as u16 * 255 + alpha / 2) / alpha).min(255) as u8;
        }
    }
    // Dimensions come from the pixmap, so the buffer length always matches.
    RgbaImage::from_raw(width, height, data).unwrap_or_else(|| RgbaImage::new(width, height))
}
