//! Text drawing through cosmic-text. The font system is expensive to build,
//! so one instance is shared by every capture in the process.

use std::sync::{Mutex, OnceLock};

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping, Style, SwashCache, Weight};
use page::{FontSpec, Rect, Rgba};
use tiny_skia::{Paint, Pixmap, Transform};

struct TextEngine {
    font_system: FontSystem,
    cache: SwashCache,
}

fn engine() -> &'static Mutex<TextEngine> {
    static ENGINE: OnceLock<Mutex<TextEngine>> = OnceLock::new();
    ENGINE.get_or_init(|| {
        tracing::debug!("loading system fonts for snapshot text");
        Mutex::new(TextEngine {
            font_system: FontSystem::new(),
            cache: SwashCache::new(),
        })
    })
}

fn family(name: &str) -> Family<'_> {
    let first = name.split(',').next().unwrap_or(name).trim();
    match first.to_ascii_lowercase().as_str() {
        "serif" => Family::Serif,
        "monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        "sans-serif" | "system-ui" | "" => Family::SansSerif,
        _ => Family::Name(first),
    }
}

/// Draws `text` inside `rect` (raster pixels), wrapping at its width.
///
/// `scale` converts the CSS font metrics into raster pixels.
pub(crate) fn draw_text(
    pixmap: &mut Pixmap,
    text: &str,
    font: &FontSpec,
    color: Rgba,
    rect: Rect,
    scale: f32,
    opacity: f32,
) {
    if text.trim().is_empty() || rect.is_empty() {
        return;
    }
    let Ok(mut engine) = engine().lock() else {
        tracing::warn!("text engine poisoned; skipping text");
        return;
    };
    let TextEngine { font_system, cache } = &mut *engine;

    let metrics = Metrics::new(
        (font.size_px * scale).max(1.0),
        (font.line_height_px * scale).max(1.0),
    );
    let mut buffer = Buffer::new(font_system, metrics);
    buffer.set_size(font_system, Some(rect.width), Some(rect.height));
    let mut attrs = Attrs::new()
        .family(family(&font.family))
        .weight(Weight(font.weight));
    if font.italic {
        attrs = attrs.style(Style::Italic);
    }
    buffer.set_text(font_system, text, attrs, Shaping::Advanced);
    buffer.shape_until_scroll(font_system, false);

    let [r, g, b, a] = color.to_u8();
    let base = cosmic_text::Color::rgba(r, g, b, a);
    let clip = (rect.x, rect.y, rect.right(), rect.bottom());
    buffer.draw(font_system, cache, base, |x, y, w, h, glyph| {
        let alpha = glyph.a() as f32 / 255.0 * opacity;
        if alpha <= 0.0 {
            return;
        }
        let gx = rect.x + x as f32;
        let gy = rect.y + y as f32;
        if gx >= clip.2 || gy >= clip.3 || gx + w as f32 <= clip.0 || gy + h as f32 <= clip.1 {
            return;
        }
        let Some(cell) = tiny_skia::Rect::from_xywh(gx, gy, w as f32, h as f32) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(glyph.r(), glyph.g(), glyph.b(), (alpha * 255.0).round() as u8);
        pixmap.fill_rect(cell, &paint, Transform::identity(), None);
    });
}
