//! GPU side of the renderer. Everything the engine needs from the GPU goes
//! through [`Compositor`], so the frame logic can run against a recording
//! implementation in tests.

mod compositor;
mod context;
mod pipeline;
#[cfg(test)]
pub(crate) mod recording;
mod texture;
mod uniforms;

use image::RgbaImage;

use page::Rect;

use crate::error::RendererError;
use crate::geometry::{PixelRect, UvRect};

pub use compositor::WgpuCompositor;
pub use context::probe_adapter;

/// Offscreen surface backing one mirror canvas. Compositors mint these in
/// `allocate_mirror`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirrorId(u64);

impl MirrorId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// One lens draw, already resolved to device pixels and UV space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensDraw {
    /// Visible part of the lens; draws and scissoring stay inside it.
    pub viewport: PixelRect,
    /// The whole lens in overlay device pixels, before clipping. Its origin
    /// can be negative.
    pub lens_px: Rect,
    /// Snapshot window under `lens_px`.
    pub uv: UvRect,
    pub radius_px: f32,
    pub refraction: f32,
    pub bevel_depth: f32,
    pub bevel_width: f32,
    pub frost: f32,
    pub specular: bool,
    pub reveal_progress: f32,
    pub fade_reveal: bool,
    pub magnify: f32,
    /// Degrees, `(rotate_x, rotate_y)`.
    pub tilt: (f32, f32),
    pub time: f32,
}

/// The single owner of the snapshot texture and the overlay surface.
///
/// Frame calls arrive as `begin_frame`, any number of `draw_lens`,
/// `copy_to_mirror` and `clear_region` calls, then `finish_frame`; they are
/// executed in call order.
pub trait Compositor {
    fn max_texture_size(&self) -> u32;

    /// Resizes the overlay, in device pixels.
    fn resize(&mut self, width: u32, height: u32);

    fn surface_size(&self) -> (u32, u32);

    /// Uploads a whole snapshot. Same-sized uploads reuse the texture.
    fn replace_snapshot(&mut self, image: &RgbaImage) -> Result<(), RendererError>;

    /// Overwrites a sub-rectangle of the current snapshot in place.
    fn patch_snapshot(&mut self, x: u32, y: u32, image: &RgbaImage) -> Result<(), RendererError>;

    fn snapshot_dimensions(&self) -> Option<(u32, u32)>;

    fn begin_frame(&mut self);

    fn draw_lens(&mut self, draw: &LensDraw);

    /// Copies the overlay as drawn so far into a mirror surface.
    fn copy_to_mirror(&mut self, mirror: MirrorId);

    /// Clears `region` to transparent.
    fn clear_region(&mut self, region: PixelRect);

    fn finish_frame(&mut self) -> Result<(), RendererError>;

    /// Allocates a mirror surface the size of the overlay.
    fn allocate_mirror(&mut self) -> MirrorId;

    fn release_mirror(&mut self, mirror: MirrorId) -> bool;

    fn live_mirrors(&self) -> usize;

    /// Reads a mirror surface back as straight-alpha RGBA.
    fn read_mirror(&mut self, mirror: MirrorId) -> Result<RgbaImage, RendererError>;

    /// Reads the overlay back as straight-alpha RGBA.
    fn read_overlay(&mut self) -> Result<RgbaImage, RendererError>;
}

/// Returns true when a GPU adapter can be acquired on this machine.
pub fn is_gpu_supported() -> bool {
    probe_adapter().is_some()
}
