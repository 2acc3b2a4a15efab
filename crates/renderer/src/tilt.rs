//! Pointer-driven 3D tilt. While a lens is tilted, a clipped full-viewport
//! mirror canvas carries the glass under the same transform and the overlay
//! region beneath the lens is held transparent.

use std::time::{Duration, Instant};

use page::{EventKind, ListenerId, NodeId, Page, PageError, Rect};
use scheduler::Timeout;

use crate::gpu::{Compositor, MirrorId};
use crate::types::LensHandle;

pub const PERSPECTIVE_PX: f32 = 800.0;

/// Lenses whose rect contains the pointer. Evaluated once per pointer event
/// over the whole lens list.
pub fn pointer_hits(targets: &[(LensHandle, Rect)], x: f32, y: f32) -> Vec<LensHandle> {
    targets
        .iter()
        .filter(|(_, rect)| rect.contains(x, y))
        .map(|(handle, _)| *handle)
        .collect()
}

/// `(rotate_x, rotate_y)` in degrees for a pointer at `(x, y)`; each axis
/// reaches `factor` at the lens edge.
pub fn tilt_angles(rect: &Rect, x: f32, y: f32, factor: f32) -> (f32, f32) {
    let (cx, cy) = rect.center();
    let half_w = (rect.width * 0.5).max(f32::EPSILON);
    let half_h = (rect.height * 0.5).max(f32::EPSILON);
    let dx = ((x - cx) / half_w).clamp(-1.0, 1.0);
    let dy = ((y - cy) / half_h).clamp(-1.0, 1.0);
    let rotate_x = -dy * factor;
    let rotate_y = dx * factor;
    // Adding 0.0 turns -0.0 into 0.0 so transforms never format as "-0.00deg".
    (rotate_x + 0.0, rotate_y + 0.0)
}

/// Prepends the tilt to `base`, dropping any translate functions from it.
pub fn compose_transform(base: &str, tilt: (f32, f32)) -> String {
    let rest = strip_translate(base);
    let mut out = format!(
        "perspective({PERSPECTIVE_PX}px) rotateX({:.2}deg) rotateY({:.2}deg)",
        tilt.0, tilt.1
    );
    if !rest.is_empty() {
        out.push(' ');
        out.push_str(&rest);
    }
    out
}

fn strip_translate(transform: &str) -> String {
    let trimmed = transform.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return String::new();
    }
    let mut kept = Vec::new();
    let mut rest = trimmed;
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')') else {
            break;
        };
        let function = rest[..open + close + 1].trim();
        let name = function[..function.find('(').unwrap_or(0)].trim();
        if !name.to_ascii_lowercase().starts_with("translate") {
            kept.push(function.to_string());
        }
        rest = &rest[open + close + 1..];
    }
    kept.join(" ")
}

/// Clip path exposing only `rect` (viewport coordinates) with rounded corners.
pub fn clip_path(rect: &Rect, radius: f32, viewport: (f32, f32)) -> String {
    format!(
        "inset({:.1}px {:.1}px {:.1}px {:.1}px round {:.1}px)",
        rect.y,
        viewport.0 - rect.right(),
        viewport.1 - rect.bottom(),
        rect.x,
        radius
    )
}

/// The transient canvas hosting the tilted copy of one lens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MirrorCanvas {
    pub node: NodeId,
    pub surface: MirrorId,
    pub clip_listener: ListenerId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TiltPhase {
    Idle,
    Active,
    Resetting { timeout: Timeout },
}

/// Everything a tilt transition touches outside the lens itself.
pub(crate) struct TiltContext<'a> {
    pub page: &'a mut Page,
    pub compositor: &'a mut dyn Compositor,
    pub host: NodeId,
    pub proxy: Option<NodeId>,
    pub rect: Rect,
    pub radius: f32,
    pub factor: f32,
    pub reset: Duration,
    pub teardown_timeout: Duration,
}

impl TiltContext<'_> {
    fn tilted_nodes(&self, mirror: Option<&MirrorCanvas>) -> Vec<NodeId> {
        let mut nodes = vec![self.host];
        nodes.extend(self.proxy);
        nodes.extend(mirror.map(|mirror| mirror.node));
        nodes
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TiltState {
    pub enabled: bool,
    pub angles: (f32, f32),
    pub phase: TiltPhase,
    pub mirror: Option<MirrorCanvas>,
    pub base_rect: Option<Rect>,
    /// Computed host transform the tilt is layered on.
    base_transform: String,
    /// Inline host values overwritten while tilting.
    saved_inline: Vec<(&'static str, Option<String>)>,
}

impl TiltState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            angles: (0.0, 0.0),
            phase: TiltPhase::Idle,
            mirror: None,
            base_rect: None,
            base_transform: String::new(),
            saved_inline: Vec::new(),
        }
    }

    pub fn mirror_active(&self) -> bool {
        self.mirror.is_some()
    }

    pub fn on_pointer(
        &mut self,
        cx: &mut TiltContext<'_>,
        inside: bool,
        pointer: (f32, f32),
        now: Instant,
    ) -> Result<(), PageError> {
        if !self.enabled {
            return Ok(());
        }
        match (inside, self.phase) {
            (true, TiltPhase::Idle) => {
                self.enter(cx)?;
                self.track(cx, pointer)
            }
            (true, TiltPhase::Active) => self.track(cx, pointer),
            (true, TiltPhase::Resetting { .. }) => {
                self.phase = TiltPhase::Active;
                for node in cx.tilted_nodes(self.mirror.as_ref()) {
                    cx.page.set_inline_style(node, "transition", "none")?;
                }
                self.track(cx, pointer)
            }
            (false, TiltPhase::Active) => self.leave(cx, now),
            (false, _) => Ok(()),
        }
    }

    fn enter(&mut self, cx: &mut TiltContext<'_>) -> Result<(), PageError> {
        let transform = cx.page.computed_style(cx.host, "transform");
        self.base_transform = strip_translate(&transform);
        self.saved_inline.clear();
        for property in ["transform", "transition"] {
            let previous = cx.page.set_inline_style(cx.host, property, "none")?;
            self.saved_inline.push((property, previous));
        }
        self.base_rect = Some(cx.rect);

        if self.mirror.is_none() {
            let viewport = cx.page.viewport();
            let node = cx.page.create_element("canvas");
            cx.page.append_child(cx.page.root(), node)?;
            cx.page.set_rect(node, viewport.rect())?;
            cx.page.node_mut(node)?.ignore = true;
            for (property, value) in [
                ("position", "fixed".to_string()),
                ("pointer-events", "none".to_string()),
                (
                    "z-index",
                    page::effective_z(cx.page, cx.host).to_string(),
                ),
                (
                    "clip-path",
                    clip_path(&cx.rect, cx.radius, (viewport.width, viewport.height)),
                ),
                ("transition", "none".to_string()),
            ] {
                cx.page.set_inline_style(node, property, value)?;
            }
            let clip_listener = cx
                .page
                .listeners_mut()
                .listen(EventKind::Resize, "mirror clip-path");
            let surface = cx.compositor.allocate_mirror();
            self.mirror = Some(MirrorCanvas {
                node,
                surface,
                clip_listener,
            });
            tracing::debug!(host = cx.host.index(), mirror = node.index(), "mirror canvas created");
        }
        self.phase = TiltPhase::Active;
        Ok(())
    }

    fn track(&mut self, cx: &mut TiltContext<'_>, pointer: (f32, f32)) -> Result<(), PageError> {
        let rect = self.base_rect.unwrap_or(cx.rect);
        self.angles = tilt_angles(&rect, pointer.0, pointer.1, cx.factor);
        let transform = compose_transform(&self.base_transform, self.angles);
        for node in cx.tilted_nodes(self.mirror.as_ref()) {
            cx.page.set_inline_style(node, "transform", transform.clone())?;
        }
        Ok(())
    }

    fn leave(&mut self, cx: &mut TiltContext<'_>, now: Instant) -> Result<(), PageError> {
        self.angles = (0.0, 0.0);
        let transition = format!("transform {}ms ease-out", cx.reset.as_millis());
        let neutral = compose_transform(&self.base_transform, self.angles);
        for node in cx.tilted_nodes(self.mirror.as_ref()) {
            cx.page.set_inline_style(node, "transition", transition.clone())?;
            cx.page.set_inline_style(node, "transform", neutral.clone())?;
        }
        self.phase = TiltPhase::Resetting {
            timeout: Timeout::after(now, cx.teardown_timeout),
        };
        Ok(())
    }

    /// Finishes a reset when the host or mirror reports its transition ended.
    pub fn on_transition_end(
        &mut self,
        cx: &mut TiltContext<'_>,
        node: NodeId,
    ) -> Result<bool, PageError> {
        let resetting = matches!(self.phase, TiltPhase::Resetting { .. });
        let ours = node == cx.host || self.mirror.is_some_and(|mirror| mirror.node == node);
        if resetting && ours {
            self.teardown(cx)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Safety net for a transition end that never arrives.
    pub fn poll(&mut self, cx: &mut TiltContext<'_>, now: Instant) -> Result<bool, PageError> {
        match self.phase {
            TiltPhase::Resetting { timeout } if timeout.is_expired(now) => {
                self.teardown(cx)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Removes the mirror and its listener and restores the host.
    pub fn teardown(&mut self, cx: &mut TiltContext<'_>) -> Result<(), PageError> {
        if let Some(mirror) = self.mirror.take() {
            cx.page.listeners_mut().unlisten(mirror.clip_listener);
            if cx.page.is_connected(mirror.node) {
                cx.page.remove(mirror.node)?;
            }
            cx.compositor.release_mirror(mirror.surface);
            tracing::debug!(host = cx.host.index(), mirror = mirror.node.index(), "mirror canvas removed");
        }
        if let Some(proxy) = cx.proxy {
            cx.page.remove_inline_style(proxy, "transform")?;
            cx.page.remove_inline_style(proxy, "transition")?;
        }
        for (property, previous) in self.saved_inline.drain(..).rev() {
            cx.page.restore_inline_style(cx.host, property, previous)?;
        }
        self.angles = (0.0, 0.0);
        self.base_rect = None;
        self.phase = TiltPhase::Idle;
        Ok(())
    }

    /// Re-fits the mirror to a resized viewport.
    pub fn sync_mirror(&self, page: &mut Page, radius: f32) -> Result<(), PageError> {
        let (Some(mirror), Some(rect)) = (self.mirror, self.base_rect) else {
            return Ok(());
        };
        let viewport = page.viewport();
        page.set_rect(mirror.node, viewport.rect())?;
        page.set_inline_style(
            mirror.node,
            "clip-path",
            clip_path(&rect, radius, (viewport.width, viewport.height)),
        )?;
        Ok(())
    }
}

/// The one document-level pointer listener shared by every tilting lens.
#[derive(Debug, Default)]
pub(crate) struct PointerRegistration {
    listener: Option<ListenerId>,
}

impl PointerRegistration {
    /// Registers while any lens wants tilt, unregisters otherwise.
    pub fn sync(&mut self, page: &mut Page, wanted: bool) {
        match (wanted, self.listener) {
            (true, None) => {
                self.listener = Some(page.listeners_mut().listen(EventKind::PointerMove, "lens tilt"));
            }
            (false, Some(listener)) => {
                page.listeners_mut().unlisten(listener);
                self.listener = None;
            }
            _ => {}
        }
    }

    pub fn is_registered(&self) -> bool {
        self.listener.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_are_pure_over_the_lens_list() {
        let targets = [
            (LensHandle(1), Rect::new(0.0, 0.0, 100.0, 100.0)),
            (LensHandle(2), Rect::new(50.0, 50.0, 100.0, 100.0)),
        ];
        assert_eq!(pointer_hits(&targets, 75.0, 75.0), vec![LensHandle(1), LensHandle(2)]);
        assert_eq!(pointer_hits(&targets, 10.0, 10.0), vec![LensHandle(1)]);
        assert!(pointer_hits(&targets, 400.0, 10.0).is_empty());
    }

    #[test]
    fn angles_scale_with_offset_from_center() {
        let rect = Rect::new(0.0, 0.0, 200.0, 100.0);
        assert_eq!(tilt_angles(&rect, 100.0, 50.0, 5.0), (0.0, 0.0));
        assert_eq!(tilt_angles(&rect, 200.0, 0.0, 5.0), (5.0, 5.0));
        assert_eq!(tilt_angles(&rect, 50.0, 75.0, 4.0), (-2.0, -2.0));
        assert_eq!(tilt_angles(&rect, 900.0, 50.0, 5.0), (0.0, 5.0));
    }

    #[test]
    fn transform_keeps_non_translate_functions() {
        let composed = compose_transform("translateX(10px) scale(1.1) translate(2px, 3px)", (1.0, -2.0));
        assert_eq!(
            composed,
            "perspective(800px) rotateX(1.00deg) rotateY(-2.00deg) scale(1.1)"
        );
        assert_eq!(
            compose_transform("none", (0.0, 0.0)),
            "perspective(800px) rotateX(0.00deg) rotateY(0.00deg)"
        );
    }

    #[test]
    fn clip_path_insets_to_rect() {
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(
            clip_path(&rect, 12.0, (400.0, 300.0)),
            "inset(20.0px 290.0px 230.0px 10.0px round 12.0px)"
        );
    }

    #[test]
    fn pointer_listener_registered_once() {
        let mut page = Page::new(page::Viewport::default());
        let mut registration = PointerRegistration::default();
        registration.sync(&mut page, true);
        registration.sync(&mut page, true);
        assert_eq!(page.listeners().listener_count(EventKind::PointerMove), 1);
        registration.sync(&mut page, false);
        assert_eq!(page.listeners().listener_count(EventKind::PointerMove), 0);
        assert!(!registration.is_registered());
    }
}
