//! The external rasterizer tier: a full-subtree renderer that understands
//! legacy color syntax only, loaded once per process on first use.

use std::sync::OnceLock;

use image::RgbaImage;
use page::style::resolve_border_radius;
use page::{effective_z, FontSpec, Gradient, NodeId, Page, Rect, Rgba};
use tiny_skia::{Pixmap, Shader};

use crate::draw;
use crate::error::CaptureError;
use crate::scale::CaptureScale;
use crate::text::draw_text;

/// Disables the external tier when set to `off`, `0` or `false`.
pub const RASTERIZER_ENV: &str = "LIQUIDGLASS_RASTERIZER";

/// Renders a page subtree into a raster of `scale.width` x `scale.height`.
pub trait Rasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn rasterize(
        &self,
        page: &Page,
        target: NodeId,
        scale: &CaptureScale,
    ) -> Result<RgbaImage, CaptureError>;
}

/// Returns the process-wide rasterizer, loading it on first call.
///
/// The load result is memoized: a disabled or failed load stays unavailable
/// until the process restarts.
pub fn load_rasterizer() -> Option<&'static dyn Rasterizer> {
    static LOADED: OnceLock<Option<SkiaRasterizer>> = OnceLock::new();
    LOADED
        .get_or_init(|| {
            if env_disabled(std::env::var(RASTERIZER_ENV).ok().as_deref()) {
                tracing::info!(env = RASTERIZER_ENV, "external rasterizer disabled");
                return None;
            }
            tracing::debug!("external rasterizer loaded");
            Some(SkiaRasterizer::default())
        })
        .as_ref()
        .map(|rasterizer| rasterizer as &dyn Rasterizer)
}

fn env_disabled(value: Option<&str>) -> bool {
    matches!(
        value.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("off" | "0" | "false" | "no")
    )
}

#[derive(Debug, Default)]
pub struct SkiaRasterizer;

struct PaintItem {
    node: NodeId,
    z: i32,
    order: usize,
    opacity: f32,
}

impl SkiaRasterizer {
    fn collect(&self, page: &Page, target: NodeId) -> Vec<PaintItem> {
        let mut items = Vec::new();
        let mut stack = vec![(target, 1.0_f32)];
        while let Some((node, inherited)) = stack.pop() {
            let Ok(data) = page.node(node) else { continue };
            if node != target && (data.ignore || !page.is_visible(node)) {
                continue;
            }
            let opacity = inherited * page.opacity(node);
            if node != target {
                items.push(PaintItem {
                    node,
                    z: effective_z(page, node),
                    order: items.len(),
                    opacity,
                });
            }
            for child in page.children(node).iter().rev() {
                stack.push((*child, opacity));
            }
        }
        items.sort_by_key(|item| (item.z, item.order));
        items
    }

    fn paint_node(
        &self,
        pixmap: &mut Pixmap,
        page: &Page,
        node: NodeId,
        origin: (f32, f32),
        scale: f32,
        opacity: f32,
    ) -> Result<(), CaptureError> {
        let css = page.document_rect(node);
        let rect = css.translate(-origin.0, -origin.1).scale(scale);
        let radius = resolve_border_radius(
            &page.computed_style(node, "border-radius"),
            css.width,
            css.height,
        ) * scale;
        let fail = |reason: String| CaptureError::Rasterize {
            node: node.index(),
            reason,
        };

        let background = page.computed_style(node, "background-color");
        let color = legacy_color(page, node, &background)
            .ok_or_else(|| fail(format!("unsupported background-color `{background}`")))?;
        if !color.is_transparent() {
            draw::fill_rounded(
                pixmap,
                rect,
                radius,
                Shader::SolidColor(draw::skia_color(color, opacity)),
            );
        }

        let image = page.computed_style(node, "background-image");
        if image.contains("gradient(") {
            let gradient = Gradient::parse_with(&image, Rgba::parse_legacy)
                .ok_or_else(|| fail(format!("unsupported background-image `{image}`")))?;
            if let Some(shader) = draw::gradient_shader(&gradient, rect, scale, opacity) {
                draw::fill_rounded(pixmap, rect, radius, shader);
            }
        }

        if let Some(video) = page.node(node)?.video.as_ref() {
            if video.has_current_data() {
                match video.current_frame() {
                    Ok(frame) => draw::draw_image(pixmap, &frame, rect, opacity),
                    Err(err) => tracing::debug!(node = node.index(), error = %err, "video frame skipped"),
                }
            }
        }

        let border_width = page
            .computed_style(node, "border-width")
            .trim()
            .trim_end_matches("px")
            .parse::<f32>()
            .unwrap_or(0.0);
        if border_width > 0.0 && page.computed_style(node, "border-style") != "none" {
            let border = page.computed_style(node, "border-color");
            let color = legacy_color(page, node, &border)
                .ok_or_else(|| fail(format!("unsupported border-color `{border}`")))?;
            draw::stroke_rounded(
                pixmap,
                rect,
                radius,
                border_width * scale,
                draw::skia_color(color, opacity),
            );
        }

        if let Some(text) = page.node(node)?.text.as_deref() {
            let value = page.computed_style(node, "color");
            let color = legacy_color(page, node, &value)
                .ok_or_else(|| fail(format!("unsupported color `{value}`")))?;
            let font = FontSpec::parse(&page.computed_style(node, "font")).unwrap_or_default();
            draw_text(pixmap, text, &font, color, rect, scale, opacity);
        }
        Ok(())
    }
}

/// Parses a color the way a legacy-only rasterizer does, resolving `currentcolor`.
fn legacy_color(page: &Page, node: NodeId, value: &str) -> Option<Rgba> {
    if value.trim().eq_ignore_ascii_case("currentcolor") {
        let color = page.computed_style(node, "color");
        return Rgba::parse_legacy(&color);
    }
    Rgba::parse_legacy(value)
}

impl Rasterizer for SkiaRasterizer {
    fn name(&self) -> &'static str {
        "skia"
    }

    fn rasterize(
        &self,
        page: &Page,
        target: NodeId,
        scale: &CaptureScale,
    ) -> Result<RgbaImage, CaptureError> {
        let mut pixmap = draw::new_pixmap(scale.width, scale.height)?;
        let origin_rect = page.document_rect(target);
        let origin = (origin_rect.x, origin_rect.y);
        let full = Rect::new(0.0, 0.0, scale.width as f32, scale.height as f32);

        let background = page.computed_style(target, "background-color");
        let color = legacy_color(page, target, &background).ok_or_else(|| {
            CaptureError::Rasterize {
                node: target.index(),
                reason: format!("unsupported background-color `{background}`"),
            }
        })?;
        if !color.is_transparent() {
            draw::fill_rounded(
                &mut pixmap,
                full,
                0.0,
                Shader::SolidColor(draw::skia_color(color, 1.0)),
            );
        }
        let image = page.computed_style(target, "background-image");
        if image.contains("gradient(") {
            if let Some(shader) = Gradient::parse_with(&image, Rgba::parse_legacy)
                .and_then(|gradient| draw::gradient_shader(&gradient, full, scale.scale, 1.0))
            {
                draw::fill_rounded(&mut pixmap, full, 0.0, shader);
            }
        }

        let items = self.collect(page, target);
        tracing::trace!(nodes = items.len(), "rasterizing subtree");
        for item in items {
            self.paint_node(
                &mut pixmap,
                page,
                item.node,
                origin,
                scale.scale,
                item.opacity,
            )?;
        }
        Ok(draw::into_image(pixmap))
    }
}
