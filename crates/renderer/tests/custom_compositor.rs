use std::collections::HashMap;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use page::{Page, Rect, Viewport};
use renderer::{
    Compositor, LensDraw, LensHooks, LensOptions, MirrorId, PixelRect, Renderer, RendererConfig,
    RendererError, RevealMode,
};

const MIRROR_TINT: Rgba<u8> = Rgba([12, 200, 90, 255]);

/// CPU-only compositor that keeps each mirror as a tinted image keyed by
/// ids it mints itself.
#[derive(Default)]
struct TintCompositor {
    surface: (u32, u32),
    snapshot: Option<RgbaImage>,
    mirrors: HashMap<MirrorId, RgbaImage>,
    next_mirror: u64,
    draws: usize,
}

impl Compositor for TintCompositor {
    fn max_texture_size(&self) -> u32 {
        2048
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn replace_snapshot(&mut self, image: &RgbaImage) -> Result<(), RendererError> {
        self.snapshot = Some(image.clone());
        Ok(())
    }

    fn patch_snapshot(&mut self, x: u32, y: u32, image: &RgbaImage) -> Result<(), RendererError> {
        let snapshot = self.snapshot.as_mut().ok_or(RendererError::NoSnapshot)?;
        image::imageops::replace(snapshot, image, i64::from(x), i64::from(y));
        Ok(())
    }

    fn snapshot_dimensions(&self) -> Option<(u32, u32)> {
        self.snapshot.as_ref().map(RgbaImage::dimensions)
    }

    fn begin_frame(&mut self) {}

    fn draw_lens(&mut self, _draw: &LensDraw) {
        self.draws += 1;
    }

    fn copy_to_mirror(&mut self, _mirror: MirrorId) {}

    fn clear_region(&mut self, _region: PixelRect) {}

    fn finish_frame(&mut self) -> Result<(), RendererError> {
        Ok(())
    }

    fn allocate_mirror(&mut self) -> MirrorId {
        let id = MirrorId::new(100 + self.next_mirror);
        self.next_mirror += 1;
        let (width, height) = self.surface;
        self.mirrors
            .insert(id, RgbaImage::from_pixel(width, height, MIRROR_TINT));
        id
    }

    fn release_mirror(&mut self, mirror: MirrorId) -> bool {
        self.mirrors.remove(&mirror).is_some()
    }

    fn live_mirrors(&self) -> usize {
        self.mirrors.len()
    }

    fn read_mirror(&mut self, mirror: MirrorId) -> Result<RgbaImage, RendererError> {
        self.mirrors
            .get(&mirror)
            .cloned()
            .ok_or(RendererError::UnknownMirror(mirror.id()))
    }

    fn read_overlay(&mut self) -> Result<RgbaImage, RendererError> {
        let (width, height) = self.surface;
        Ok(RgbaImage::new(width, height))
    }
}

fn tilting_renderer() -> (Renderer, Instant) {
    let mut page = Page::new(Viewport::new(320.0, 240.0, 1.0));
    let root = page.root();
    page.set_inline_style(root, "background-color", "#204060").unwrap();
    let host = page.create_element("div");
    page.append_child(root, host).unwrap();
    page.set_rect(host, Rect::new(40.0, 40.0, 80.0, 80.0)).unwrap();

    let config = RendererConfig {
        external_rasterizer: false,
        ..RendererConfig::default()
    };
    let mut renderer = Renderer::new(page, config, Box::new(TintCompositor::default())).unwrap();
    let options = LensOptions {
        tilt: true,
        reveal: RevealMode::Instant,
        ..LensOptions::default()
    };
    renderer.add_lens(host, options, LensHooks::new()).unwrap();
    let start = Instant::now();
    assert!(renderer.capture_snapshot(start));
    renderer.start_render_loop();
    (renderer, start)
}

#[test]
fn mirrors_minted_outside_the_crate_reach_the_frame() {
    let (mut renderer, start) = tilting_renderer();

    renderer.handle_pointer_move(100.0, 80.0, start);
    renderer.on_animation_frame(start + Duration::from_millis(16));
    let frame = renderer.read_frame().unwrap();
    assert_eq!(*frame.get_pixel(40, 40), MIRROR_TINT);
    assert_eq!(*frame.get_pixel(119, 119), MIRROR_TINT);
    assert_eq!(frame.get_pixel(20, 80)[3], 0);
}

#[test]
fn released_mirrors_leave_the_frame_clear() {
    let (mut renderer, start) = tilting_renderer();

    renderer.handle_pointer_move(100.0, 80.0, start);
    renderer.on_animation_frame(start + Duration::from_millis(16));
    renderer.handle_pointer_move(5.0, 5.0, start + Duration::from_millis(32));
    renderer.on_animation_frame(start + Duration::from_millis(700));

    let frame = renderer.read_frame().unwrap();
    assert_eq!(frame.get_pixel(80, 80)[3], 0);
}

#[test]
fn mirror_ids_round_trip_their_value() {
    assert_eq!(MirrorId::new(42).id(), 42);
    assert_ne!(MirrorId::new(1), MirrorId::new(2));
}
