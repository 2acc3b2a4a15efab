//! Last-resort 2D painter: backgrounds, linear gradients, rounded corners
//! and single-run leaf text, walking the visible tree in document order.

use image::RgbaImage;
use page::style::resolve_border_radius;
use page::{FontSpec, Gradient, NodeId, Page, Rect};
use tiny_skia::{Pixmap, Shader};

use crate::draw;
use crate::error::CaptureError;
use crate::scale::CaptureScale;
use crate::text::draw_text;

pub const MAX_DEPTH: usize = 10;

pub fn paint(page: &Page, target: NodeId, scale: &CaptureScale) -> Result<RgbaImage, CaptureError> {
    page.node(target)?;
    let mut pixmap = draw::new_pixmap(scale.width, scale.height)?;
    let origin = page.document_rect(target);
    let full = Rect::new(0.0, 0.0, scale.width as f32, scale.height as f32);
    paint_box(&mut pixmap, page, target, full, 0.0, scale.scale);

    let mut painter = Painter {
        page,
        pixmap: &mut pixmap,
        origin: (origin.x, origin.y),
        scale: scale.scale,
        painted: 0,
    };
    for child in page.children(target) {
        painter.visit(*child, 1);
    }
    tracing::debug!(painted = painter.painted, "manual painter finished");
    Ok(draw::into_image(pixmap))
}

struct Painter<'a> {
    page: &'a Page,
    pixmap: &'a mut Pixmap,
    origin: (f32, f32),
    scale: f32,
    painted: usize,
}

impl Painter<'_> {
    fn visit(&mut self, node: NodeId, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let page = self.page;
        let Ok(data) = page.node(node) else {
            return;
        };
        if data.ignore || data.glass_surface || !page.is_visible(node) {
            return;
        }
        let css = page.document_rect(node);
        let rect = css
            .translate(-self.origin.0, -self.origin.1)
            .scale(self.scale);
        let radius = resolve_border_radius(
            &page.computed_style(node, "border-radius"),
            css.width,
            css.height,
        ) * self.scale;
        paint_box(self.pixmap, page, node, rect, radius, self.scale);

        if data.is_text_leaf() {
            if let (Some(text), Some(color)) =
                (data.text.as_deref(), page.computed_color(node, "color"))
            {
                let font = FontSpec::parse(&page.computed_style(node, "font")).unwrap_or_default();
                draw_text(
                    self.pixmap,
                    text,
                    &font,
                    color,
                    rect,
                    self.scale,
                    page.opacity(node),
                );
            }
        }
        self.painted += 1;
        for child in page.children(node) {
            self.visit(*child, depth + 1);
        }
    }
}

/// Background color then linear gradient; other gradients are skipped.
fn paint_box(pixmap: &mut Pixmap, page: &Page, node: NodeId, rect: Rect, radius: f32, scale: f32) {
    let opacity = page.opacity(node);
    if let Some(color) = page.computed_color(node, "background-color") {
        if !color.is_transparent() {
            draw::fill_rounded(
                pixmap,
                rect,
                radius,
                Shader::SolidColor(draw::skia_color(color, opacity)),
            );
        }
    }
    let image = page.computed_style(node, "background-image");
    if let Some(Gradient::Linear(linear)) = Gradient::parse(&image) {
        if let Some(shader) = draw::linear_shader(&linear, rect, scale, opacity) {
            draw::fill_rounded(pixmap, rect, radius, shader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page::Viewport;

    fn unit_scale(width: u32, height: u32) -> CaptureScale {
        CaptureScale {
            scale: 1.0,
            width,
            height,
        }
    }

    #[test]
    fn paints_modern_colors_and_skips_glass() {
        let mut page = Page::new(Viewport::new(100.0, 100.0, 1.0));
        let root = page.root();
        page.set_inline_style(root, "background-color", "oklch(62.8% 0.2577 29.23)")
            .unwrap();
        let glass = page.create_element("div");
        page.append_child(root, glass).unwrap();
        page.set_rect(glass, Rect::new(0.0, 0.0, 50.0, 50.0)).unwrap();
        page.set_inline_style(glass, "background-color", "#00ff00").unwrap();
        page.node_mut(glass).unwrap().glass_surface = true;

        let image = paint(&page, root, &unit_scale(100, 100)).expect("paint");
        let [r, g, _, a] = image.get_pixel(10, 10).0;
        assert!(r > 240 && g < 10 && a == 255);
    }

    #[test]
    fn depth_limit_stops_descent() {
        let mut page = Page::new(Viewport::new(100.0, 100.0, 1.0));
        let mut parent = page.root();
        let mut chain = Vec::new();
        for _ in 0..12 {
            let node = page.create_element("div");
            page.append_child(parent, node).unwrap();
            page.set_rect(node, Rect::new(0.0, 0.0, 100.0, 100.0)).unwrap();
            chain.push(node);
            parent = node;
        }
        page.set_inline_style(chain[9], "background-color", "#ff0000")
            .unwrap();
        page.set_inline_style(chain[10], "background-color", "#0000ff")
            .unwrap();
        let image = paint(&page, page.root(), &unit_scale(10, 10)).expect("paint");
        assert_eq!(image.get_pixel(5, 5).0, [255, 0, 0, 255]);
    }

    #[test]
    fn linear_gradient_backgrounds() {
        let mut page = Page::new(Viewport::new(100.0, 10.0, 1.0));
        let root = page.root();
        page.set_inline_style(
            root,
            "background-image",
            "linear-gradient(90deg, #000 0%, #fff 100%)",
        )
        .unwrap();
        let image = paint(&page, root, &unit_scale(100, 10)).expect("paint");
        assert!(image.get_pixel(2, 5).0[0] < 30);
        assert!(image.get_pixel(97, 5).0[0] > 225);
    }
}
