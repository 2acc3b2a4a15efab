//! Liquid-glass renderer.
//!
//! A [`Renderer`] rasterizes a page subtree into one shared snapshot texture
//! and redraws it, refracted, inside every lens on a transparent overlay that
//! sits just beneath the lens hosts. The overall flow is:
//!
//! ```text
//!   host events / frames
//!          │ on_animation_frame(now), handle_resize, handle_pointer_move
//!          ▼
//!   Renderer ──▶ CaptureSlot ──▶ snapshot::capture (worker thread)
//!      │                                  │ Snapshot
//!      │◀─────────────────────────────────┘
//!      ├─▶ Lens (reveal, tilt, shadow proxy) ── page inline styles
//!      └─▶ dyn Compositor ──▶ replace/patch snapshot ─▶ draw_lens per lens
//!                                                     └─▶ mirror copy + scissor clear
//! ```
//!
//! [`WgpuCompositor`] is the GPU implementation; everything above it is plain
//! page and timing logic driven by the `now` the host passes in.

mod capture;
mod compile;
mod engine;
mod error;
mod geometry;
mod gpu;
mod lens;
mod reveal;
mod scroll;
mod tilt;
mod types;
mod video;

pub use engine::Renderer;
pub use error::RendererError;
pub use geometry::{clamp_dpr, clamp_radius, lens_uv_at, CaptureSpace, PixelRect, UvRect};
pub use gpu::{is_gpu_supported, probe_adapter, Compositor, LensDraw, MirrorId, WgpuCompositor};
pub use reveal::RevealState;
pub use tilt::{compose_transform, tilt_angles, PERSPECTIVE_PX};
pub use types::{
    AdapterProfile, FrameStats, LensHandle, LensHooks, LensOptions, RendererConfig, RevealMode,
};
