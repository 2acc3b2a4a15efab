use std::fmt;
use std::time::Duration;

use scheduler::Curve;

/// Identifies a lens for the lifetime of its renderer. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LensHandle(pub(crate) u64);

impl LensHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LensHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lens#{}", self.0)
    }
}

/// How a lens enters once the snapshot texture is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevealMode {
    /// Joins the page-wide fade.
    #[default]
    Fade,
    /// Snaps to fully revealed.
    Instant,
}

/// Per-lens shader and interaction options, fixed when the lens is added.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensOptions {
    pub refraction: f32,
    pub bevel_depth: f32,
    pub bevel_width: f32,
    /// Frost blur radius in device pixels; zero disables the blur taps.
    pub frost: f32,
    pub shadow: bool,
    pub specular: bool,
    pub reveal: RevealMode,
    pub tilt: bool,
    /// Maximum tilt in degrees at the lens edge.
    pub tilt_factor: f32,
    pub magnify: f32,
}

impl Default for LensOptions {
    fn default() -> Self {
        Self {
            refraction: 0.69,
            bevel_depth: 0.052,
            bevel_width: 0.211,
            frost: 0.0,
            shadow: true,
            specular: true,
            reveal: RevealMode::Fade,
            tilt: false,
            tilt_factor: 5.0,
            magnify: 1.0,
        }
    }
}

type InitHook = Box<dyn FnOnce(LensHandle) + Send>;

/// Lifecycle callbacks attached to a lens.
#[derive(Default)]
pub struct LensHooks {
    pub(crate) on_init: Option<InitHook>,
}

impl LensHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs once, when the lens first becomes fully revealed.
    pub fn on_init(mut self, hook: impl FnOnce(LensHandle) + Send + 'static) -> Self {
        self.on_init = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for LensHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensHooks")
            .field("on_init", &self.on_init.is_some())
            .finish()
    }
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Selector of the subtree rasterized into the snapshot texture.
    pub capture_target: String,
    /// Requested texture pixels per CSS pixel.
    pub resolution: f32,
    /// Upper bound applied to the device pixel ratio of the overlay.
    pub max_dpr: f32,
    pub external_rasterizer: bool,
    /// Pixels added on every side of the scissor clear under mirrored lenses.
    pub scissor_expand: u32,
    pub resize_debounce: Duration,
    pub scroll_settle: Duration,
    pub reveal_duration: Duration,
    pub reveal_curve: Curve,
    pub tilt_reset: Duration,
    pub mirror_teardown_timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            capture_target: "body".to_string(),
            resolution: 2.0,
            max_dpr: 2.0,
            external_rasterizer: true,
            scissor_expand: 2,
            resize_debounce: Duration::from_millis(250),
            scroll_settle: Duration::from_millis(200),
            reveal_duration: Duration::from_millis(1000),
            reveal_curve: Curve::default(),
            tilt_reset: Duration::from_millis(400),
            mirror_teardown_timeout: Duration::from_millis(600),
        }
    }
}

/// Summary of the adapter picked for rendering.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Per-frame counters returned by `Renderer::render`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub lenses_drawn: usize,
    pub regions_cleared: usize,
    pub videos_patched: usize,
}
