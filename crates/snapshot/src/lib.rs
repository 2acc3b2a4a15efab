//! Snapshot capture: renders a page subtree into the raster the glass
//! renderer samples. Tiers are tried in order (native, external rasterizer,
//! manual painter) and a placeholder guarantees an image always comes back.

mod draw;
pub mod error;
pub mod native;
pub mod normalize;
pub mod painter;
pub mod placeholder;
pub mod rasterizer;
pub mod scale;
mod text;

use image::RgbaImage;
use page::{NodeId, Page};

pub use error::CaptureError;
pub use normalize::CaptureGuard;
pub use rasterizer::{load_rasterizer, Rasterizer, SkiaRasterizer, RASTERIZER_ENV};
pub use scale::{capture_scale, CaptureScale, MOBILE_MAX_DIMENSION};

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub target: NodeId,
    pub resolution: f32,
    pub max_texture_size: u32,
    /// Overlay nodes hidden while the external rasterizer runs.
    pub hidden: Vec<NodeId>,
    pub external_rasterizer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTier {
    Native,
    External,
    Manual,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub image: RgbaImage,
    pub scale: CaptureScale,
    pub tier: CaptureTier,
    /// Document-space origin of the capture target, in CSS pixels.
    pub origin: (f32, f32),
}

/// Captures `request.target`, loading the external rasterizer when enabled.
pub fn capture(page: &mut Page, request: &CaptureRequest) -> Snapshot {
    let rasterizer = if request.external_rasterizer {
        load_rasterizer()
    } else {
        None
    };
    capture_with(page, request, rasterizer)
}

/// Captures with an explicit external rasterizer (or none). Never fails.
pub fn capture_with(
    page: &mut Page,
    request: &CaptureRequest,
    rasterizer: Option<&dyn Rasterizer>,
) -> Snapshot {
    let target = request.target;
    let (css_width, css_height) = page.scroll_size(target);
    let scale = capture_scale(
        css_width,
        css_height,
        request.resolution,
        request.max_texture_size,
        &page.device(),
    );
    let origin_rect = page.document_rect(target);
    let origin = (origin_rect.x, origin_rect.y);
    tracing::debug!(
        css_width,
        css_height,
        scale = scale.scale,
        width = scale.width,
        height = scale.height,
        "capturing snapshot"
    );

    let finish = |image: RgbaImage, tier: CaptureTier| Snapshot {
        image,
        scale,
        tier,
        origin,
    };

    match native::native_capture(page, target, &scale) {
        Ok(image) => return finish(image, CaptureTier::Native),
        Err(err) => tracing::debug!(error = %err, "native capture skipped"),
    }

    match rasterizer {
        Some(rasterizer) => {
            let result = {
                let guard = CaptureGuard::apply(page, target, &request.hidden);
                rasterizer.rasterize(guard.page(), target, &scale)
            };
            match result {
                Ok(image) => return finish(image, CaptureTier::External),
                Err(err) => tracing::warn!(
                    rasterizer = rasterizer.name(),
                    error = %err,
                    "external rasterizer failed; using manual painter"
                ),
            }
        }
        None => tracing::debug!("external rasterizer unavailable; using manual painter"),
    }

    match painter::paint(page, target, &scale) {
        Ok(image) => finish(image, CaptureTier::Manual),
        Err(err) => {
            tracing::warn!(error = %err, "manual painter failed; using placeholder");
            finish(
                placeholder::placeholder(scale.width, scale.height),
                CaptureTier::Placeholder,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page::{Rect, Viewport};

    struct Failing;

    impl Rasterizer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn rasterize(
            &self,
            page: &Page,
            target: NodeId,
            _scale: &CaptureScale,
        ) -> Result<RgbaImage, CaptureError> {
            // The guard must already have hidden the overlay.
            let overlay = page.query_selector("canvas").ok().flatten();
            assert_eq!(
                overlay.map(|node| page.computed_style(node, "display")),
                Some("none".to_string())
            );
            Err(CaptureError::Rasterize {
                node: target.index(),
                reason: "boom".into(),
            })
        }
    }

    fn sample_page() -> (Page, CaptureRequest) {
        let mut page = Page::new(Viewport::new(1000.0, 800.0, 1.0));
        let root = page.root();
        page.set_inline_style(root, "background-color", "#336699").unwrap();
        let overlay = page.create_element("canvas");
        page.append_child(root, overlay).unwrap();
        page.set_rect(overlay, Rect::new(0.0, 0.0, 1000.0, 800.0)).unwrap();
        page.node_mut(overlay).unwrap().ignore = true;
        let request = CaptureRequest {
            target: root,
            resolution: 2.0,
            max_texture_size: 4096,
            hidden: vec![overlay],
            external_rasterizer: true,
        };
        (page, request)
    }

    #[test]
    fn external_tier_produces_scaled_texture() {
        let (mut page, request) = sample_page();
        let snapshot = capture_with(&mut page, &request, Some(&SkiaRasterizer));
        assert_eq!(snapshot.tier, CaptureTier::External);
        assert_eq!(snapshot.scale.scale, 2.0);
        assert_eq!(snapshot.image.dimensions(), (2000, 1600));
        assert_eq!(snapshot.image.get_pixel(10, 10).0, [0x33, 0x66, 0x99, 255]);
    }

    #[test]
    fn failing_rasterizer_falls_back_and_restores_page() {
        let (mut page, request) = sample_page();
        let snapshot = capture_with(&mut page, &request, Some(&Failing));
        assert_eq!(snapshot.tier, CaptureTier::Manual);
        let overlay = request.hidden[0];
        assert_eq!(page.inline_style(overlay, "display"), None);
    }

    #[test]
    fn missing_target_yields_placeholder() {
        let (mut page, request) = sample_page();
        let ghost = CaptureRequest {
            target: phantom_node(&page),
            ..request
        };
        let snapshot = capture_with(&mut page, &ghost, None);
        assert_eq!(snapshot.tier, CaptureTier::Placeholder);
        assert_eq!(snapshot.image.dimensions(), (2, 2));
    }

    fn phantom_node(page: &Page) -> NodeId {
        // One past the last allocated node.
        let mut scratch = page.clone();
        scratch.create_element("div")
    }
}
