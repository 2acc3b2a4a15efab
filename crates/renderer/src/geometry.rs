//! Coordinate layer: CSS viewport rects to snapshot UV space and to
//! device-pixel viewports on the overlay.

use page::Rect;

/// Clamps a reported device pixel ratio into `(0, max]`, treating nonsense as 1.
pub fn clamp_dpr(dpr: f32, max: f32) -> f32 {
    if !dpr.is_finite() || dpr <= 0.0 {
        1.0
    } else {
        dpr.min(max.max(1.0))
    }
}

/// Corner radius clamped to half the shorter side of `rect`.
pub fn clamp_radius(radius: f32, rect: &Rect) -> f32 {
    let limit = 0.5 * rect.width.min(rect.height).max(0.0);
    if radius.is_finite() {
        radius.clamp(0.0, limit)
    } else {
        0.0
    }
}

/// Normalized texture window, `(u, v)` origin plus extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub u: f32,
    pub v: f32,
    pub width: f32,
    pub height: f32,
}

impl UvRect {
    pub fn to_array(self) -> [f32; 4] {
        [self.u, self.v, self.width, self.height]
    }
}

/// Where the snapshot sits in the document and how it was scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSpace {
    /// Document-space origin of the capture target in CSS pixels.
    pub origin: (f32, f32),
    /// Texture pixels per CSS pixel.
    pub scale: f32,
    pub texture_size: (u32, u32),
}

impl CaptureSpace {
    /// Maps a viewport rect into UV space given the current document scroll.
    pub fn to_uv(&self, viewport_rect: &Rect, scroll: (f32, f32)) -> UvRect {
        let texture = self.texture_rect(viewport_rect, scroll);
        let (width, height) = self.texture_dims();
        UvRect {
            u: texture.x / width,
            v: texture.y / height,
            width: texture.width / width,
            height: texture.height / height,
        }
    }

    /// Inverse of [`CaptureSpace::to_uv`].
    pub fn from_uv(&self, uv: &UvRect, scroll: (f32, f32)) -> Rect {
        let (width, height) = self.texture_dims();
        Rect::new(
            uv.u * width / self.scale + self.origin.0 - scroll.0,
            uv.v * height / self.scale + self.origin.1 - scroll.1,
            uv.width * width / self.scale,
            uv.height * height / self.scale,
        )
    }

    /// A document rect in texture pixels (unclamped, fractional).
    pub fn document_to_texture(&self, document_rect: &Rect) -> Rect {
        document_rect
            .translate(-self.origin.0, -self.origin.1)
            .scale(self.scale)
    }

    /// Integer texture region covered by `document_rect`, clipped to the texture.
    pub fn texture_region(&self, document_rect: &Rect) -> Option<PixelRect> {
        let rect = self.document_to_texture(document_rect);
        PixelRect::from_rect(&rect, 1.0, self.texture_size)
    }

    fn texture_rect(&self, viewport_rect: &Rect, scroll: (f32, f32)) -> Rect {
        self.document_to_texture(&viewport_rect.translate(scroll.0, scroll.1))
    }

    fn texture_dims(&self) -> (f32, f32) {
        (
            self.texture_size.0.max(1) as f32,
            self.texture_size.1.max(1) as f32,
        )
    }
}

/// An integer pixel rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Scales `rect` by `factor`, rounds outward to whole pixels and clips to
    /// `bounds`. Returns `None` when nothing is left.
    pub fn from_rect(rect: &Rect, factor: f32, bounds: (u32, u32)) -> Option<PixelRect> {
        if !rect.x.is_finite() || !rect.y.is_finite() {
            return None;
        }
        let left = (rect.x * factor).round().max(0.0);
        let top = (rect.y * factor).round().max(0.0);
        let right = (rect.right() * factor).round().min(bounds.0 as f32);
        let bottom = (rect.bottom() * factor).round().min(bounds.1 as f32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(PixelRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Grows by `amount` on every side without leaving `bounds`.
    pub fn expand(&self, amount: u32, bounds: (u32, u32)) -> PixelRect {
        let x = self.x.saturating_sub(amount);
        let y = self.y.saturating_sub(amount);
        let right = self.right().saturating_add(amount).min(bounds.0);
        let bottom = self.bottom().saturating_add(amount).min(bounds.1);
        PixelRect {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Snapshot UV under overlay device pixel `point`, before refraction, for a
/// lens covering `lens_px` whose snapshot window is `uv`. This is the
/// mapping the glass shader uses.
pub fn lens_uv_at(uv: &UvRect, lens_px: &Rect, point: (f32, f32)) -> (f32, f32) {
    let fx = (point.0 - lens_px.x) / lens_px.width.max(f32::EPSILON);
    let fy = (point.1 - lens_px.y) / lens_px.height.max(f32::EPSILON);
    (uv.u + fx * uv.width, uv.v + fy * uv.height)
}

/// Device-pixel viewport of a lens on an overlay of `surface` pixels.
pub fn device_viewport(viewport_rect: &Rect, dpr: f32, surface: (u32, u32)) -> Option<PixelRect> {
    PixelRect::from_rect(viewport_rect, dpr, surface)
}
