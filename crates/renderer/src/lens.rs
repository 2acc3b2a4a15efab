//! One glass surface bound to a host node. The lens never owns its host: it
//! overrides a handful of inline properties and restores them on detach.

use page::style::resolve_border_radius;
use page::{effective_z, NodeId, Page, PageError, Rect};

use crate::geometry::clamp_radius;
use crate::reveal::{RevealMachine, RevealState, RevealStep};
use crate::tilt::TiltState;
use crate::types::{LensHandle, LensHooks, LensOptions};

/// Shadow used when the host declares none of its own.
pub const DEFAULT_SHADOW: &str = "0 10px 30px rgba(0, 0, 0, 0.25)";

/// Inline host properties the lens overrides while attached. `box-shadow` is
/// overridden separately, only while a shadow proxy stands in for it.
const HOST_OVERRIDES: [(&str, &str); 5] = [
    ("opacity", "0"),
    ("background-color", "transparent"),
    ("background-image", "none"),
    ("backdrop-filter", "none"),
    ("pointer-events", "none"),
];

pub(crate) struct Lens {
    pub handle: LensHandle,
    pub host: NodeId,
    pub options: LensOptions,
    pub reveal: RevealMachine,
    pub tilt: TiltState,
    pub rect_px: Rect,
    pub radius_css: f32,
    pub radius_gl: f32,
    hooks: LensHooks,
    saved_inline: Vec<(&'static str, Option<String>)>,
    saved_transition: Option<Option<String>>,
    saved_shadow: Option<Option<String>>,
    was_glass: bool,
    original_opacity: f32,
    original_shadow: String,
    shadow_proxy: Option<NodeId>,
}

impl Lens {
    /// Hides the host and, with shadows on, creates its proxy.
    pub fn attach(
        page: &mut Page,
        handle: LensHandle,
        host: NodeId,
        options: LensOptions,
        hooks: LensHooks,
    ) -> Result<Lens, PageError> {
        let was_glass = page.node(host)?.glass_surface;
        let original_opacity = page.opacity(host);
        let original_shadow = page.computed_style(host, "box-shadow");

        let mut saved_inline = Vec::with_capacity(HOST_OVERRIDES.len());
        for (property, value) in HOST_OVERRIDES {
            let previous = page.set_inline_style(host, property, value)?;
            saved_inline.push((property, previous));
        }
        page.node_mut(host)?.glass_surface = true;

        let mut lens = Lens {
            handle,
            host,
            options,
            reveal: RevealMachine::new(options.reveal),
            tilt: TiltState::new(options.tilt),
            rect_px: page.bounding_rect(host),
            radius_css: 0.0,
            radius_gl: 0.0,
            hooks,
            saved_inline,
            saved_transition: None,
            saved_shadow: None,
            was_glass,
            original_opacity,
            original_shadow,
            shadow_proxy: None,
        };
        if options.shadow {
            lens.create_shadow_proxy(page)?;
        }
        tracing::debug!(
            lens = %handle,
            host = host.index(),
            shadow = options.shadow,
            tilt = options.tilt,
            "lens attached"
        );
        Ok(lens)
    }

    pub fn shadow_proxy(&self) -> Option<NodeId> {
        self.shadow_proxy
    }

    pub fn z_index(&self, page: &Page) -> i32 {
        effective_z(page, self.host)
    }

    /// Refreshes the rect (frozen while a mirror is up) and both radii.
    /// A host that has left the document is an error.
    pub fn update_metrics(&mut self, page: &mut Page, dpr: f32) -> Result<(), PageError> {
        page.node(self.host)?;
        if !page.is_connected(self.host) {
            return Err(PageError::Detached(self.host));
        }
        self.rect_px = self
            .tilt
            .base_rect
            .unwrap_or_else(|| page.bounding_rect(self.host));
        let declared = page.computed_style(self.host, "border-radius");
        self.radius_css = clamp_radius(
            resolve_border_radius(&declared, self.rect_px.width, self.rect_px.height),
            &self.rect_px,
        );
        let device_rect = self.rect_px.scale(dpr);
        self.radius_gl = clamp_radius(self.radius_css * dpr, &device_rect);
        self.sync_shadow_proxy(page)
    }

    pub fn set_shadow(&mut self, page: &mut Page, enabled: bool) -> Result<(), PageError> {
        self.options.shadow = enabled;
        match (enabled, self.shadow_proxy) {
            (true, None) => self.create_shadow_proxy(page),
            (false, Some(_)) => self.remove_shadow_proxy(page),
            _ => Ok(()),
        }
    }

    /// Applies one reveal step to the state machine and the host styles.
    /// Returns true when the init hook fired.
    pub fn step_reveal(&mut self, page: &mut Page, step: RevealStep) -> Result<bool, PageError> {
        let fired = self.reveal.advance(step).is_some();
        match self.reveal.state() {
            RevealState::Hidden => {}
            RevealState::Revealing => {
                if self.saved_transition.is_none() {
                    self.saved_transition = Some(page.set_inline_style(self.host, "transition", "none")?);
                }
                let progress = self.reveal.progress();
                page.set_inline_style(
                    self.host,
                    "opacity",
                    format!("{:.4}", self.original_opacity * progress),
                )?;
                if let Some(proxy) = self.shadow_proxy {
                    page.set_inline_style(proxy, "opacity", format!("{progress:.4}"))?;
                }
            }
            RevealState::Revealed if fired => {
                self.restore_opacity(page)?;
                if let Some(previous) = self.saved_transition.take() {
                    page.restore_inline_style(self.host, "transition", previous)?;
                }
                if let Some(proxy) = self.shadow_proxy {
                    page.remove_inline_style(proxy, "opacity")?;
                }
            }
            RevealState::Revealed => {}
        }
        if fired {
            tracing::debug!(lens = %self.handle, "lens revealed");
            if let Some(hook) = self.hooks.on_init.take() {
                hook(self.handle);
            }
        }
        Ok(fired)
    }

    /// Restores every inline override and removes the proxy, which hands the
    /// host its own shadow back.
    pub fn detach(mut self, page: &mut Page) -> Result<(), PageError> {
        self.remove_shadow_proxy(page)?;
        if let Some(previous) = self.saved_transition.take() {
            page.restore_inline_style(self.host, "transition", previous)?;
        }
        for (property, previous) in self.saved_inline.drain(..).rev() {
            page.restore_inline_style(self.host, property, previous)?;
        }
        page.node_mut(self.host)?.glass_surface = self.was_glass;
        tracing::debug!(lens = %self.handle, "lens detached");
        Ok(())
    }

    fn restore_opacity(&mut self, page: &mut Page) -> Result<(), PageError> {
        let previous = self
            .saved_inline
            .iter()
            .find(|(property, _)| *property == "opacity")
            .and_then(|(_, previous)| previous.clone());
        page.restore_inline_style(self.host, "opacity", previous)?;
        // Keeps detach from restoring a stale value over later host edits.
        self.saved_inline.retain(|(property, _)| *property != "opacity");
        Ok(())
    }

    fn create_shadow_proxy(&mut self, page: &mut Page) -> Result<(), PageError> {
        let proxy = page.create_element("div");
        page.append_child(page.root(), proxy)?;
        page.node_mut(proxy)?.ignore = true;
        let shadow = match self.original_shadow.trim() {
            "" | "none" => DEFAULT_SHADOW.to_string(),
            declared => declared.to_string(),
        };
        let opacity = if self.reveal.state() == RevealState::Revealed {
            1.0
        } else {
            self.reveal.progress()
        };
        for (property, value) in [
            ("position", "fixed".to_string()),
            ("pointer-events", "none".to_string()),
            ("box-shadow", shadow),
            ("z-index", self.z_index(page).to_string()),
            ("opacity", format!("{opacity:.4}")),
        ] {
            page.set_inline_style(proxy, property, value)?;
        }
        self.shadow_proxy = Some(proxy);
        if self.saved_shadow.is_none() {
            self.saved_shadow = Some(page.set_inline_style(self.host, "box-shadow", "none")?);
        }
        self.sync_shadow_proxy(page)
    }

    fn remove_shadow_proxy(&mut self, page: &mut Page) -> Result<(), PageError> {
        if let Some(proxy) = self.shadow_proxy.take() {
            if page.is_connected(proxy) {
                page.remove(proxy)?;
            }
        }
        if let Some(previous) = self.saved_shadow.take() {
            page.restore_inline_style(self.host, "box-shadow", previous)?;
        }
        Ok(())
    }

    fn sync_shadow_proxy(&mut self, page: &mut Page) -> Result<(), PageError> {
        let Some(proxy) = self.shadow_proxy else {
            return Ok(());
        };
        page.set_rect(proxy, self.rect_px)?;
        page.set_inline_style(proxy, "border-radius", format!("{:.1}px", self.radius_css))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use page::Viewport;

    use crate::types::RevealMode;

    fn page_with_host() -> (Page, NodeId) {
        let mut page = Page::new(Viewport::new(800.0, 600.0, 2.0));
        let root = page.root();
        let host = page.create_element("div");
        page.append_child(root, host).unwrap();
        page.set_rect(host, Rect::new(100.0, 100.0, 200.0, 80.0)).unwrap();
        page.set_inline_style(host, "opacity", "0.9").unwrap();
        page.set_inline_style(host, "background-color", "rgba(255,255,255,0.2)")
            .unwrap();
        (page, host)
    }

    #[test]
    fn attach_hides_host_and_detach_restores() {
        let (mut page, host) = page_with_host();
        let before = page.node(host).unwrap().inline_style.clone();
        let lens = Lens::attach(
            &mut page,
            LensHandle(0),
            host,
            LensOptions::default(),
            LensHooks::new(),
        )
        .unwrap();
        assert_eq!(page.opacity(host), 0.0);
        assert_eq!(page.computed_style(host, "pointer-events"), "none");
        assert!(page.node(host).unwrap().glass_surface);
        let proxy = lens.shadow_proxy().expect("proxy");
        assert!(page.node(proxy).unwrap().ignore);
        assert_eq!(page.computed_style(proxy, "box-shadow"), DEFAULT_SHADOW);

        lens.detach(&mut page).unwrap();
        assert_eq!(page.node(host).unwrap().inline_style, before);
        assert!(!page.node(host).unwrap().glass_surface);
        assert!(!page.is_connected(proxy));
    }

    #[test]
    fn radius_is_clamped_in_both_spaces() {
        let (mut page, host) = page_with_host();
        page.set_inline_style(host, "border-radius", "500px").unwrap();
        let mut lens = Lens::attach(
            &mut page,
            LensHandle(0),
            host,
            LensOptions::default(),
            LensHooks::new(),
        )
        .unwrap();
        lens.update_metrics(&mut page, 2.0).unwrap();
        assert_eq!(lens.radius_css, 40.0);
        assert_eq!(lens.radius_gl, 80.0);
        assert!(lens.radius_gl <= 0.5 * lens.rect_px.width.min(lens.rect_px.height) * 2.0);
    }

    #[test]
    fn instant_reveal_restores_opacity_and_fires_once() {
        let (mut page, host) = page_with_host();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let options = LensOptions {
            reveal: RevealMode::Instant,
            ..LensOptions::default()
        };
        let hooks = LensHooks::new().on_init(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut lens = Lens::attach(&mut page, LensHandle(3), host, options, hooks).unwrap();
        assert!(lens.step_reveal(&mut page, RevealStep::TextureReady).unwrap());
        assert!(!lens.step_reveal(&mut page, RevealStep::TextureReady).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!((page.opacity(host) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn fade_drives_host_and_proxy_opacity() {
        let (mut page, host) = page_with_host();
        let mut lens = Lens::attach(
            &mut page,
            LensHandle(1),
            host,
            LensOptions::default(),
            LensHooks::new(),
        )
        .unwrap();
        let proxy = lens.shadow_proxy().unwrap();
        lens.step_reveal(&mut page, RevealStep::TextureReady).unwrap();
        lens.step_reveal(&mut page, RevealStep::Progress(0.5)).unwrap();
        assert!((page.opacity(host) - 0.45).abs() < 1e-3);
        assert!((page.opacity(proxy) - 0.5).abs() < 1e-3);
        assert_eq!(page.computed_style(host, "transition"), "none");
        lens.step_reveal(&mut page, RevealStep::Complete).unwrap();
        assert!((page.opacity(host) - 0.9).abs() < 1e-6);
        assert_eq!(page.opacity(proxy), 1.0);
        assert_eq!(page.inline_style(host, "transition"), None);
    }

    #[test]
    fn disabling_shadow_gives_the_host_its_shadow_back() {
        let (mut page, host) = page_with_host();
        page.set_inline_style(host, "box-shadow", "0 2px 4px black").unwrap();
        let mut lens = Lens::attach(
            &mut page,
            LensHandle(2),
            host,
            LensOptions::default(),
            LensHooks::new(),
        )
        .unwrap();
        let proxy = lens.shadow_proxy().unwrap();
        assert_eq!(page.computed_style(proxy, "box-shadow"), "0 2px 4px black");
        assert_eq!(page.computed_style(host, "box-shadow"), "none");

        lens.set_shadow(&mut page, false).unwrap();
        assert!(!page.is_connected(proxy));
        assert_eq!(page.computed_style(host, "box-shadow"), "0 2px 4px black");

        lens.set_shadow(&mut page, true).unwrap();
        let proxy = lens.shadow_proxy().unwrap();
        assert_eq!(page.computed_style(proxy, "box-shadow"), "0 2px 4px black");
        assert_eq!(page.computed_style(host, "box-shadow"), "none");

        lens.detach(&mut page).unwrap();
        assert_eq!(page.inline_style(host, "box-shadow"), Some("0 2px 4px black"));
    }

    #[test]
    fn shadowless_lens_leaves_host_shadow_alone() {
        let (mut page, host) = page_with_host();
        page.set_inline_style(host, "box-shadow", "0 2px 4px black").unwrap();
        let options = LensOptions {
            shadow: false,
            ..LensOptions::default()
        };
        let lens = Lens::attach(&mut page, LensHandle(4), host, options, LensHooks::new()).unwrap();
        assert!(lens.shadow_proxy().is_none());
        assert_eq!(page.computed_style(host, "box-shadow"), "0 2px 4px black");
        lens.detach(&mut page).unwrap();
        assert_eq!(page.inline_style(host, "box-shadow"), Some("0 2px 4px black"));
    }
}
