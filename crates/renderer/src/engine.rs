//! The renderer: owns the page, the overlay canvas node, every lens and the
//! compositor, and advances them from host-supplied frames and events.

use std::time::Instant;

use page::{EventKind, ListenerId, NodeId, Page, Viewport};
use scheduler::{Debouncer, FrameClock};
use snapshot::{CaptureRequest, Snapshot};

use crate::capture::CaptureSlot;
use crate::error::RendererError;
use crate::geometry::{clamp_dpr, device_viewport, CaptureSpace};
use crate::gpu::{Compositor, LensDraw, WgpuCompositor};
use crate::lens::Lens;
use crate::reveal::{FadeSample, RevealState, RevealStep, SharedFade};
use crate::scroll::ScrollMonitor;
use crate::tilt::{pointer_hits, PointerRegistration, TiltContext};
use crate::types::{FrameStats, LensHandle, LensHooks, LensOptions, RendererConfig, RevealMode};
use crate::video::VideoPatcher;

pub struct Renderer {
    page: Page,
    config: RendererConfig,
    compositor: Box<dyn Compositor>,
    target: NodeId,
    overlay: NodeId,
    resize_listener: Option<ListenerId>,
    lenses: Vec<Lens>,
    next_lens: u64,
    pointer: PointerRegistration,
    capture: CaptureSlot,
    space: Option<CaptureSpace>,
    video: VideoPatcher,
    scroll: ScrollMonitor,
    resize: Debouncer,
    recapture_pending: bool,
    fade: SharedFade,
    clock: FrameClock,
    dpr: f32,
    render_loop: bool,
    destroyed: bool,
}

/// Overlay size in device pixels for `viewport` at `dpr`.
fn device_size(viewport: &Viewport, dpr: f32) -> (u32, u32) {
    (
        (viewport.width * dpr).round().max(1.0) as u32,
        (viewport.height * dpr).round().max(1.0) as u32,
    )
}

fn tilt_context<'a>(
    page: &'a mut Page,
    compositor: &'a mut dyn Compositor,
    config: &RendererConfig,
    lens: &Lens,
) -> TiltContext<'a> {
    TiltContext {
        page,
        compositor,
        host: lens.host,
        proxy: lens.shadow_proxy(),
        rect: lens.rect_px,
        radius: lens.radius_css,
        factor: lens.options.tilt_factor,
        reset: config.tilt_reset,
        teardown_timeout: config.mirror_teardown_timeout,
    }
}

impl Renderer {
    /// Mounts the overlay canvas over `page` and starts tracking scroll.
    /// Fails when `config.capture_target` matches nothing.
    pub fn new(
        mut page: Page,
        config: RendererConfig,
        mut compositor: Box<dyn Compositor>,
    ) -> Result<Self, RendererError> {
        let target = page
            .query_selector(&config.capture_target)?
            .ok_or_else(|| RendererError::CaptureTarget(config.capture_target.clone()))?;

        let viewport = page.viewport();
        let overlay = page.create_element("canvas");
        page.append_child(page.root(), overlay)?;
        page.set_rect(overlay, viewport.rect())?;
        page.node_mut(overlay)?.ignore = true;
        for (property, value) in [
            ("position", "fixed"),
            ("pointer-events", "none"),
            ("z-index", "0"),
        ] {
            page.set_inline_style(overlay, property, value)?;
        }

        let dpr = clamp_dpr(viewport.device_pixel_ratio, config.max_dpr);
        let (width, height) = device_size(&viewport, dpr);
        compositor.resize(width, height);
        let resize_listener = Some(
            page.listeners_mut()
                .listen(EventKind::Resize, "renderer resize"),
        );

        tracing::info!(
            capture_target = %config.capture_target,
            width,
            height,
            dpr,
            max_texture = compositor.max_texture_size(),
            "renderer initialised"
        );

        let now = Instant::now();
        Ok(Self {
            page,
            target,
            overlay,
            resize_listener,
            lenses: Vec::new(),
            next_lens: 0,
            pointer: PointerRegistration::default(),
            capture: CaptureSlot::default(),
            space: None,
            video: VideoPatcher::default(),
            scroll: ScrollMonitor::new(config.scroll_settle),
            resize: Debouncer::new(config.resize_debounce),
            recapture_pending: false,
            fade: SharedFade::new(config.reveal_duration, config.reveal_curve),
            clock: FrameClock::new(now),
            dpr,
            render_loop: false,
            destroyed: false,
            compositor,
            config,
        })
    }

    /// Like [`Renderer::new`] with a headless `wgpu` compositor. Fails with
    /// [`RendererError::Unsupported`] when no adapter or pipeline is available.
    pub fn with_gpu(page: Page, config: RendererConfig) -> Result<Self, RendererError> {
        let viewport = page.viewport();
        let dpr = clamp_dpr(viewport.device_pixel_ratio, config.max_dpr);
        let (width, height) = device_size(&viewport, dpr);
        let compositor = WgpuCompositor::new(width, height)?;
        tracing::info!(
            adapter = %compositor.adapter().name,
            backend = ?compositor.adapter().backend,
            "using GPU adapter"
        );
        Self::new(page, config, Box::new(compositor))
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Mutable access for hosts that edit the document between frames.
    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn overlay_node(&self) -> NodeId {
        self.overlay
    }

    pub fn capture_target(&self) -> NodeId {
        self.target
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether the per-frame scroll poller is still running.
    pub fn is_tracking_scroll(&self) -> bool {
        self.scroll.is_running()
    }

    /// Device pixel ratio after clamping.
    pub fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    pub fn capture_space(&self) -> Option<CaptureSpace> {
        self.space
    }

    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.compositor.snapshot_dimensions()
    }

    /// Texture pixels per CSS pixel of the current snapshot.
    pub fn scale_factor(&self) -> Option<f32> {
        self.space.map(|space| space.scale)
    }

    pub fn lens_count(&self) -> usize {
        self.lenses.len()
    }

    pub fn lens_handles(&self) -> Vec<LensHandle> {
        self.lenses.iter().map(|lens| lens.handle).collect()
    }

    /// Turns `host` into a glass surface. A lens added after the first
    /// snapshot starts revealing immediately.
    pub fn add_lens(
        &mut self,
        host: NodeId,
        options: LensOptions,
        hooks: LensHooks,
    ) -> Result<LensHandle, RendererError> {
        if self.destroyed {
            return Err(RendererError::Destroyed);
        }
        self.page.node(host)?;
        if !self.page.is_connected(host) {
            return Err(page::PageError::Detached(host).into());
        }
        let handle = LensHandle(self.next_lens);
        self.next_lens += 1;

        let mut lens = Lens::attach(&mut self.page, handle, host, options, hooks)?;
        lens.update_metrics(&mut self.page, self.dpr)?;
        self.lenses.push(lens);
        self.sync_overlay_z();
        self.sync_pointer();

        if self.space.is_some() {
            let now = self.clock.last().unwrap_or_else(Instant::now);
            self.reveal_waiting(now);
        }
        Ok(handle)
    }

    /// Detaches a lens, tearing down any mirror and restoring its host.
    pub fn remove_lens(&mut self, handle: LensHandle) -> Result<(), RendererError> {
        let index = self.lens_index(handle)?;
        let mut lens = self.lenses.remove(index);
        {
            let mut cx = tilt_context(&mut self.page, self.compositor.as_mut(), &self.config, &lens);
            lens.tilt.teardown(&mut cx)?;
        }
        lens.detach(&mut self.page)?;
        self.sync_overlay_z();
        self.sync_pointer();
        Ok(())
    }

    pub fn set_tilt(&mut self, handle: LensHandle, enabled: bool) -> Result<(), RendererError> {
        let index = self.lens_index(handle)?;
        let lens = &mut self.lenses[index];
        lens.options.tilt = enabled;
        lens.tilt.enabled = enabled;
        if !enabled {
            let mut cx = tilt_context(&mut self.page, self.compositor.as_mut(), &self.config, lens);
            lens.tilt.teardown(&mut cx)?;
        }
        self.sync_pointer();
        Ok(())
    }

    pub fn set_shadow(&mut self, handle: LensHandle, enabled: bool) -> Result<(), RendererError> {
        let index = self.lens_index(handle)?;
        self.lenses[index].set_shadow(&mut self.page, enabled)?;
        Ok(())
    }

    pub fn update_lens_metrics(&mut self, handle: LensHandle) -> Result<(), RendererError> {
        let index = self.lens_index(handle)?;
        self.lenses[index].update_metrics(&mut self.page, self.dpr)?;
        Ok(())
    }

    /// Current `(rotate_x, rotate_y)` in degrees.
    pub fn lens_tilt(&self, handle: LensHandle) -> Result<(f32, f32), RendererError> {
        Ok(self.lens(handle)?.tilt.angles)
    }

    pub fn reveal_state(&self, handle: LensHandle) -> Result<RevealState, RendererError> {
        Ok(self.lens(handle)?.reveal.state())
    }

    pub fn reveal_progress(&self, handle: LensHandle) -> Result<f32, RendererError> {
        Ok(self.lens(handle)?.reveal.progress())
    }

    pub fn mirror_active(&self, handle: LensHandle) -> Result<bool, RendererError> {
        Ok(self.lens(handle)?.tilt.mirror_active())
    }

    pub fn lens_host(&self, handle: LensHandle) -> Result<NodeId, RendererError> {
        Ok(self.lens(handle)?.host)
    }

    /// Device-space corner radius used by the shader.
    pub fn lens_radius(&self, handle: LensHandle) -> Result<f32, RendererError> {
        Ok(self.lens(handle)?.radius_gl)
    }

    pub fn shadow_proxy(&self, handle: LensHandle) -> Result<Option<NodeId>, RendererError> {
        Ok(self.lens(handle)?.shadow_proxy())
    }

    pub fn mirror_node(&self, handle: LensHandle) -> Result<Option<NodeId>, RendererError> {
        Ok(self.lens(handle)?.tilt.mirror.map(|mirror| mirror.node))
    }

    fn lens(&self, handle: LensHandle) -> Result<&Lens, RendererError> {
        self.lenses
            .iter()
            .find(|lens| lens.handle == handle)
            .ok_or(RendererError::UnknownLens(handle))
    }

    fn lens_index(&self, handle: LensHandle) -> Result<usize, RendererError> {
        if self.destroyed {
            return Err(RendererError::Destroyed);
        }
        self.lenses
            .iter()
            .position(|lens| lens.handle == handle)
            .ok_or(RendererError::UnknownLens(handle))
    }

    /// Keeps the overlay one below the highest lens host.
    fn sync_overlay_z(&mut self) {
        let top = self
            .lenses
            .iter()
            .map(|lens| lens.z_index(&self.page))
            .max()
            .unwrap_or(0);
        let z = (top - 1).max(0);
        if let Err(err) = self
            .page
            .set_inline_style(self.overlay, "z-index", z.to_string())
        {
            tracing::warn!(error = %err, "failed to update overlay z-index");
        }
    }

    fn sync_pointer(&mut self) {
        let wanted = !self.destroyed && self.lenses.iter().any(|lens| lens.tilt.enabled);
        self.pointer.sync(&mut self.page, wanted);
    }

    fn capture_request(&self) -> CaptureRequest {
        let mut hidden = vec![self.overlay];
        for lens in &self.lenses {
            hidden.push(lens.host);
            hidden.extend(lens.shadow_proxy());
            hidden.extend(lens.tilt.mirror.map(|mirror| mirror.node));
        }
        CaptureRequest {
            target: self.target,
            resolution: self.config.resolution,
            max_texture_size: self.compositor.max_texture_size(),
            hidden,
            external_rasterizer: self.config.external_rasterizer,
        }
    }

    /// Starts a background capture. Returns false when one is already in
    /// flight or the renderer is destroyed.
    pub fn begin_capture(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let request = self.capture_request();
        self.capture.begin(&self.page, request)
    }

    pub fn is_capture_in_flight(&self) -> bool {
        self.capture.is_in_flight()
    }

    /// Captures and uploads synchronously. Returns false when another
    /// capture is in flight; otherwise true once a texture is live.
    pub fn capture_snapshot(&mut self, now: Instant) -> bool {
        if !self.begin_capture() {
            return false;
        }
        self.wait_for_capture(now)
    }

    /// Blocks on the in-flight capture and applies it.
    pub fn wait_for_capture(&mut self, now: Instant) -> bool {
        match self.capture.wait() {
            Some(snapshot) => self.apply_snapshot(snapshot, now),
            None => false,
        }
    }

    /// Requests a fresh capture on the next eligible frame.
    pub fn add_dynamic_element(&mut self, node: NodeId) -> Result<(), RendererError> {
        if self.destroyed {
            return Err(RendererError::Destroyed);
        }
        self.page.node(node)?;
        tracing::debug!(node = node.index(), "dynamic element added; recapture scheduled");
        self.recapture_pending = true;
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot, now: Instant) -> bool {
        if self.destroyed {
            tracing::debug!("renderer destroyed; discarding captured snapshot");
            return false;
        }
        let Snapshot {
            image,
            scale,
            tier,
            origin,
        } = snapshot;
        if let Err(err) = self.compositor.replace_snapshot(&image) {
            tracing::warn!(error = %err, "snapshot upload failed");
            return false;
        }
        self.space = Some(CaptureSpace {
            origin,
            scale: scale.scale,
            texture_size: image.dimensions(),
        });
        tracing::info!(
            tier = ?tier,
            width = scale.width,
            height = scale.height,
            scale = scale.scale,
            "snapshot uploaded"
        );
        self.video.set_still(image);
        self.reveal_waiting(now);
        self.render(now);
        true
    }

    /// Sends every hidden lens its texture-ready step.
    fn reveal_waiting(&mut self, now: Instant) {
        let mut fading = false;
        for lens in &mut self.lenses {
            if lens.reveal.state() != RevealState::Hidden {
                continue;
            }
            if let Err(err) = lens.step_reveal(&mut self.page, RevealStep::TextureReady) {
                tracing::warn!(lens = %lens.handle, error = %err, "reveal failed");
            }
            fading |= lens.reveal.state() == RevealState::Revealing;
        }
        if !fading {
            return;
        }
        if self.fade.is_running() {
            tracing::debug!("late lens joins the running reveal fade");
        } else if !self.fade.start(now) {
            self.finish_fade();
        }
    }

    fn step_fade(&mut self, now: Instant) {
        match self.fade.sample(now) {
            FadeSample::Idle => {}
            FadeSample::Running(progress) => {
                for lens in &mut self.lenses {
                    if lens.reveal.state() != RevealState::Revealing {
                        continue;
                    }
                    if let Err(err) = lens.step_reveal(&mut self.page, RevealStep::Progress(progress)) {
                        tracing::warn!(lens = %lens.handle, error = %err, "reveal step failed");
                    }
                }
            }
            FadeSample::Finished => self.finish_fade(),
        }
    }

    fn finish_fade(&mut self) {
        for lens in &mut self.lenses {
            if lens.reveal.state() != RevealState::Revealing {
                continue;
            }
            let result = lens
                .step_reveal(&mut self.page, RevealStep::Progress(1.0))
                .and_then(|_| lens.step_reveal(&mut self.page, RevealStep::Complete));
            if let Err(err) = result {
                tracing::warn!(lens = %lens.handle, error = %err, "reveal completion failed");
            }
        }
    }

    /// Draws every lens into the overlay. Does nothing before the first
    /// snapshot or after destroy.
    pub fn render(&mut self, now: Instant) -> FrameStats {
        let mut stats = FrameStats::default();
        if self.destroyed {
            return stats;
        }
        let Some(space) = self.space else {
            return stats;
        };
        let tick = self.clock.tick(now);
        let scrolling = self.scroll.is_scrolling(now);

        self.compositor.begin_frame();
        let top_lens_z = self.lenses.iter().map(|lens| lens.z_index(&self.page)).max();
        if let Some(top_lens_z) = top_lens_z {
            stats.videos_patched = self.video.refresh(
                &self.page,
                self.target,
                &space,
                top_lens_z,
                scrolling,
                self.compositor.as_mut(),
            );
        }

        let surface = self.compositor.surface_size();
        let scroll = self.page.scroll_offset();
        for lens in &mut self.lenses {
            if let Err(err) = lens.update_metrics(&mut self.page, self.dpr) {
                tracing::warn!(lens = %lens.handle, error = %err, "lens metrics skipped");
                continue;
            }
            let Some(viewport) = device_viewport(&lens.rect_px, self.dpr, surface) else {
                continue;
            };
            let draw = LensDraw {
                viewport,
                lens_px: lens.rect_px.scale(self.dpr),
                uv: space.to_uv(&lens.rect_px, scroll),
                radius_px: lens.radius_gl,
                refraction: lens.options.refraction,
                bevel_depth: lens.options.bevel_depth,
                bevel_width: lens.options.bevel_width,
                frost: lens.options.frost,
                specular: lens.options.specular,
                reveal_progress: lens.reveal.progress(),
                fade_reveal: lens.reveal.mode() == RevealMode::Fade,
                magnify: lens.options.magnify,
                tilt: lens.tilt.angles,
                time: tick.time,
            };
            self.compositor.draw_lens(&draw);
            stats.lenses_drawn += 1;
        }

        let mirrored: Vec<_> = self
            .lenses
            .iter()
            .filter_map(|lens| {
                let mirror = lens.tilt.mirror?;
                let region = device_viewport(&lens.rect_px, self.dpr, surface)?;
                Some((mirror.surface, region.expand(self.config.scissor_expand, surface)))
            })
            .collect();
        for (surface_id, _) in &mirrored {
            self.compositor.copy_to_mirror(*surface_id);
        }
        for (_, region) in &mirrored {
            self.compositor.clear_region(*region);
            stats.regions_cleared += 1;
        }

        if let Err(err) = self.compositor.finish_frame() {
            tracing::warn!(frame = tick.index, error = %err, "frame submission failed");
        }
        tracing::trace!(
            frame = tick.index,
            lenses = stats.lenses_drawn,
            cleared = stats.regions_cleared,
            videos = stats.videos_patched,
            "frame rendered"
        );
        stats
    }

    /// One animation frame: scroll poll, capture hand-off, debounced resize,
    /// deferred recapture, reveal fade, tilt timeouts, then a render when the
    /// loop is running.
    pub fn on_animation_frame(&mut self, now: Instant) -> FrameStats {
        if self.destroyed {
            return FrameStats::default();
        }
        self.scroll.poll(&self.page, now);
        let scrolling = self.scroll.is_scrolling(now);

        if let Some(snapshot) = self.capture.poll() {
            self.apply_snapshot(snapshot, now);
        }
        // A resize that lands mid-scroll stays pending until the page settles.
        if !scrolling && self.resize.poll(now) {
            self.apply_resize();
            self.recapture_pending = true;
        }
        if self.recapture_pending && !self.capture.is_in_flight() && !scrolling {
            self.recapture_pending = false;
            tracing::debug!("starting deferred recapture");
            self.begin_capture();
        }

        self.step_fade(now);
        self.poll_tilt(now);

        if self.render_loop {
            self.render(now)
        } else {
            FrameStats::default()
        }
    }

    /// Records the new window size. The overlay follows after the resize
    /// debounce; mirrors re-fit their clip path right away.
    pub fn handle_resize(&mut self, width: f32, height: f32, device_pixel_ratio: f32, now: Instant) {
        if self.destroyed {
            return;
        }
        self.page
            .set_viewport(Viewport::new(width, height, device_pixel_ratio));
        for lens in &self.lenses {
            if let Err(err) = lens.tilt.sync_mirror(&mut self.page, lens.radius_css) {
                tracing::warn!(lens = %lens.handle, error = %err, "mirror resize failed");
            }
        }
        self.resize.trigger(now);
    }

    fn apply_resize(&mut self) {
        let viewport = self.page.viewport();
        self.dpr = clamp_dpr(viewport.device_pixel_ratio, self.config.max_dpr);
        let (width, height) = device_size(&viewport, self.dpr);
        self.compositor.resize(width, height);
        if let Err(err) = self.page.set_rect(self.overlay, viewport.rect()) {
            tracing::warn!(error = %err, "failed to resize overlay node");
        }
        for lens in &mut self.lenses {
            if let Err(err) = lens.update_metrics(&mut self.page, self.dpr) {
                tracing::warn!(lens = %lens.handle, error = %err, "lens metrics skipped");
            }
        }
        tracing::debug!(width, height, dpr = self.dpr, "overlay resized");
    }

    /// Hit-tests every tilting lens against the pointer once.
    pub fn handle_pointer_move(&mut self, x: f32, y: f32, now: Instant) {
        if self.destroyed || !self.pointer.is_registered() {
            return;
        }
        let targets: Vec<_> = self
            .lenses
            .iter()
            .filter(|lens| lens.tilt.enabled)
            .map(|lens| (lens.handle, lens.tilt.base_rect.unwrap_or(lens.rect_px)))
            .collect();
        let hits = pointer_hits(&targets, x, y);
        for lens in &mut self.lenses {
            if !lens.tilt.enabled {
                continue;
            }
            let inside = hits.contains(&lens.handle);
            let mut cx = tilt_context(&mut self.page, self.compositor.as_mut(), &self.config, lens);
            if let Err(err) = lens.tilt.on_pointer(&mut cx, inside, (x, y), now) {
                tracing::warn!(lens = %lens.handle, error = %err, "tilt update failed");
            }
        }
    }

    /// Routes a transition-end from `node`. Returns true when it finished a
    /// tilt reset.
    pub fn handle_transition_end(&mut self, node: NodeId, _now: Instant) -> bool {
        if self.destroyed {
            return false;
        }
        let mut finished = false;
        for lens in &mut self.lenses {
            let mut cx = tilt_context(&mut self.page, self.compositor.as_mut(), &self.config, lens);
            match lens.tilt.on_transition_end(&mut cx, node) {
                Ok(done) => finished |= done,
                Err(err) => tracing::warn!(lens = %lens.handle, error = %err, "tilt teardown failed"),
            }
        }
        finished
    }

    fn poll_tilt(&mut self, now: Instant) {
        for lens in &mut self.lenses {
            let mut cx = tilt_context(&mut self.page, self.compositor.as_mut(), &self.config, lens);
            match lens.tilt.poll(&mut cx, now) {
                Ok(true) => tracing::debug!(lens = %lens.handle, "tilt reset timed out; mirror removed"),
                Ok(false) => {}
                Err(err) => tracing::warn!(lens = %lens.handle, error = %err, "tilt teardown failed"),
            }
        }
    }

    pub fn start_render_loop(&mut self) {
        if !self.destroyed {
            self.render_loop = true;
        }
    }

    pub fn stop_render_loop(&mut self) {
        self.render_loop = false;
    }

    pub fn is_render_loop_running(&self) -> bool {
        self.render_loop
    }

    /// Reads the overlay back as straight-alpha RGBA.
    pub fn read_overlay(&mut self) -> Result<image::RgbaImage, RendererError> {
        self.compositor.read_overlay()
    }

    /// The overlay with every live mirror surface laid back over the hole
    /// under its lens, clipped to the lens rect. Tilt transforms stay on the
    /// mirror nodes and are not applied here.
    pub fn read_frame(&mut self) -> Result<image::RgbaImage, RendererError> {
        let mut frame = self.compositor.read_overlay()?;
        let bounds = frame.dimensions();
        for lens in &self.lenses {
            let Some(mirror) = lens.tilt.mirror else {
                continue;
            };
            let Some(region) = device_viewport(&lens.rect_px, self.dpr, bounds) else {
                continue;
            };
            let surface = self.compositor.read_mirror(mirror.surface)?;
            if surface.width() < region.right() || surface.height() < region.bottom() {
                tracing::warn!(lens = %lens.handle, "mirror surface smaller than its lens; skipped");
                continue;
            }
            let patch =
                image::imageops::crop_imm(&surface, region.x, region.y, region.width, region.height)
                    .to_image();
            image::imageops::overlay(&mut frame, &patch, i64::from(region.x), i64::from(region.y));
        }
        Ok(frame)
    }

    /// Detaches every lens and unregisters everything the renderer added to
    /// the page. A capture still in flight completes and is discarded.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.render_loop = false;
        for mut lens in std::mem::take(&mut self.lenses) {
            let handle = lens.handle;
            let teardown = {
                let mut cx =
                    tilt_context(&mut self.page, self.compositor.as_mut(), &self.config, &lens);
                lens.tilt.teardown(&mut cx)
            };
            if let Err(err) = teardown.and_then(|()| lens.detach(&mut self.page)) {
                tracing::warn!(lens = %handle, error = %err, "lens detach failed");
            }
        }
        self.destroyed = true;
        self.pointer.sync(&mut self.page, false);
        if let Some(listener) = self.resize_listener.take() {
            self.page.listeners_mut().unlisten(listener);
        }
        if self.page.is_connected(self.overlay) {
            if let Err(err) = self.page.remove(self.overlay) {
                tracing::warn!(error = %err, "failed to remove overlay node");
            }
        }
        self.scroll.stop();
        self.resize.cancel();
        self.video.clear();
        self.recapture_pending = false;
        self.space = None;
        tracing::info!("renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use page::{Rect, Viewport};

    use crate::gpu::recording::{Journal, RecordingCompositor};

    fn config() -> RendererConfig {
        RendererConfig {
            external_rasterizer: false,
            ..RendererConfig::default()
        }
    }

    fn blank_page(width: f32, height: f32, dpr: f32) -> Page {
        let mut page = Page::new(Viewport::new(width, height, dpr));
        let root = page.root();
        page.set_inline_style(root, "background-color", "#336699").unwrap();
        page
    }

    fn host(page: &mut Page, rect: Rect) -> NodeId {
        let root = page.root();
        let node = page.create_element("div");
        page.append_child(root, node).unwrap();
        page.set_rect(node, rect).unwrap();
        node
    }

    fn renderer(page: Page, config: RendererConfig) -> (Renderer, Arc<Mutex<Journal>>) {
        let (compositor, journal) = RecordingCompositor::new(4096);
        let renderer = Renderer::new(page, config, Box::new(compositor)).unwrap();
        (renderer, journal)
    }

    fn counter() -> (Arc<AtomicUsize>, LensHooks) {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);
        let hooks = LensHooks::new().on_init(move |_| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        });
        (calls, hooks)
    }

    #[test]
    fn unknown_capture_target_is_rejected() {
        let (compositor, _) = RecordingCompositor::new(4096);
        let config = RendererConfig {
            capture_target: "#missing".into(),
            ..config()
        };
        let err = Renderer::new(blank_page(100.0, 100.0, 1.0), config, Box::new(compositor))
            .err()
            .unwrap();
        assert!(matches!(err, RendererError::CaptureTarget(selector) if selector == "#missing"));
    }

    #[test]
    fn texture_scale_follows_resolution() {
        let (mut renderer, journal) = renderer(blank_page(1000.0, 800.0, 1.0), config());
        assert!(renderer.capture_snapshot(Instant::now()));
        assert_eq!(renderer.scale_factor(), Some(2.0));
        assert_eq!(renderer.texture_size(), Some((2000, 1600)));
        assert_eq!(journal.lock().unwrap().uploads, 1);
    }

    #[test]
    fn texture_never_exceeds_max_size() {
        let (compositor, _) = RecordingCompositor::new(1024);
        let mut renderer =
            Renderer::new(blank_page(1000.0, 800.0, 1.0), config(), Box::new(compositor)).unwrap();
        assert!(renderer.capture_snapshot(Instant::now()));
        let (width, height) = renderer.texture_size().unwrap();
        assert!(width <= 1024 && height <= 1024);
        let scale = renderer.scale_factor().unwrap();
        assert!((scale * 1000.0 - width as f32).abs() <= 1.0);
    }

    #[test]
    fn instant_lens_restores_opacity_on_first_capture() {
        let mut page = blank_page(800.0, 600.0, 1.0);
        let node = host(&mut page, Rect::new(100.0, 100.0, 200.0, 100.0));
        page.set_inline_style(node, "opacity", "0.8").unwrap();
        let (mut renderer, journal) = renderer(page, config());
        let (calls, hooks) = counter();
        let options = LensOptions {
            reveal: RevealMode::Instant,
            ..LensOptions::default()
        };
        let lens = renderer.add_lens(node, options, hooks).unwrap();
        assert_eq!(renderer.page().opacity(node), 0.0);

        assert!(renderer.capture_snapshot(Instant::now()));
        assert!((renderer.page().opacity(node) - 0.8).abs() < 1e-6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.reveal_progress(lens).unwrap(), 1.0);

        assert!(renderer.capture_snapshot(Instant::now()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(journal.lock().unwrap().last_draws().len(), 1);
    }

    #[test]
    fn fade_lenses_reveal_together() {
        let mut page = blank_page(800.0, 600.0, 1.0);
        let first = host(&mut page, Rect::new(10.0, 10.0, 100.0, 100.0));
        let second = host(&mut page, Rect::new(300.0, 10.0, 100.0, 100.0));
        let (mut renderer, _) = renderer(page, config());
        let (first_calls, first_hooks) = counter();
        let (second_calls, second_hooks) = counter();
        let a = renderer
            .add_lens(first, LensOptions::default(), first_hooks)
            .unwrap();
        let b = renderer
            .add_lens(second, LensOptions::default(), second_hooks)
            .unwrap();

        let start = Instant::now();
        assert!(renderer.capture_snapshot(start));
        assert_eq!(renderer.reveal_state(a).unwrap(), RevealState::Revealing);

        renderer.on_animation_frame(start + Duration::from_millis(500));
        let half_a = renderer.reveal_progress(a).unwrap();
        assert!(half_a > 0.0 && half_a < 1.0);
        assert_eq!(half_a, renderer.reveal_progress(b).unwrap());
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);

        renderer.on_animation_frame(start + Duration::from_millis(1000));
        renderer.on_animation_frame(start + Duration::from_millis(1100));
        for handle in [a, b] {
            assert_eq!(renderer.reveal_progress(handle).unwrap(), 1.0);
            assert_eq!(renderer.reveal_state(handle).unwrap(), RevealState::Revealed);
        }
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_capture_returns_false() {
        let (mut renderer, journal) = renderer(blank_page(400.0, 300.0, 1.0), config());
        let now = Instant::now();
        assert!(renderer.begin_capture());
        assert!(!renderer.capture_snapshot(now));
        assert!(!renderer.begin_capture());
        assert!(renderer.wait_for_capture(now));
        assert_eq!(journal.lock().unwrap().uploads, 1);
    }

    #[test]
    fn resize_recapture_waits_for_in_flight_capture() {
        let (mut renderer, journal) = renderer(blank_page(400.0, 300.0, 1.0), config());
        let start = Instant::now();
        assert!(renderer.capture_snapshot(start));
        let held = renderer.capture.hold();

        renderer.handle_resize(500.0, 300.0, 1.0, start);
        renderer.on_animation_frame(start + Duration::from_millis(300));
        assert!(renderer.recapture_pending);
        assert!(renderer.is_capture_in_flight());
        assert_eq!(journal.lock().unwrap().surface, (500, 300));

        let mut clone = renderer.page().clone();
        let request = renderer.capture_request();
        held.send(snapshot::capture(&mut clone, &request)).unwrap();
        renderer.on_animation_frame(start + Duration::from_millis(320));
        assert!(!renderer.recapture_pending);
        assert!(renderer.is_capture_in_flight());
        assert!(renderer.wait_for_capture(start + Duration::from_millis(340)));
        assert_eq!(journal.lock().unwrap().uploads, 3);
    }

    #[test]
    fn resize_waits_for_scroll_to_settle() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        host(&mut page, Rect::new(0.0, 0.0, 400.0, 2000.0));
        let (mut renderer, journal) = renderer(page, config());
        let start = Instant::now();
        assert!(renderer.capture_snapshot(start));
        renderer.on_animation_frame(start);

        renderer.handle_resize(420.0, 300.0, 1.0, start);
        renderer.page_mut().scroll_to(0.0, 200.0);
        renderer.on_animation_frame(start + Duration::from_millis(260));
        assert!(renderer.resize.is_pending());
        assert!(!renderer.recapture_pending);
        assert!(!renderer.is_capture_in_flight());
        assert_eq!(journal.lock().unwrap().surface, (400, 300));

        renderer.on_animation_frame(start + Duration::from_millis(500));
        assert!(!renderer.resize.is_pending());
        assert_eq!(journal.lock().unwrap().surface, (420, 300));
        assert!(!renderer.recapture_pending);
        assert!(renderer.is_capture_in_flight());
        assert!(renderer.wait_for_capture(start + Duration::from_millis(520)));
    }

    #[test]
    fn destroy_discards_in_flight_capture() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let node = host(&mut page, Rect::new(10.0, 10.0, 100.0, 50.0));
        let before = page.node(node).unwrap().inline_style.clone();
        let (mut renderer, journal) = renderer(page, config());
        renderer
            .add_lens(node, LensOptions::default(), LensHooks::new())
            .unwrap();
        assert!(renderer.begin_capture());

        renderer.destroy();
        assert!(!renderer.wait_for_capture(Instant::now()));
        assert_eq!(journal.lock().unwrap().uploads, 0);
        assert_eq!(renderer.render(Instant::now()), FrameStats::default());

        let page = renderer.page();
        assert_eq!(page.node(node).unwrap().inline_style, before);
        assert!(!page.is_connected(renderer.overlay_node()));
        assert!(!renderer.is_tracking_scroll());
        assert_eq!(page.listeners().listener_count(EventKind::Resize), 0);
        assert_eq!(page.listeners().listener_count(EventKind::PointerMove), 0);
        assert!(matches!(
            renderer.add_lens(node, LensOptions::default(), LensHooks::new()),
            Err(RendererError::Destroyed)
        ));
    }

    #[test]
    fn overlay_sits_one_below_top_lens() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let low = host(&mut page, Rect::new(0.0, 0.0, 50.0, 50.0));
        let high = host(&mut page, Rect::new(100.0, 0.0, 50.0, 50.0));
        page.set_inline_style(high, "position", "relative").unwrap();
        page.set_inline_style(high, "z-index", "7").unwrap();
        let (mut renderer, _) = renderer(page, config());
        let overlay = renderer.overlay_node();
        assert_eq!(renderer.page().computed_style(overlay, "z-index"), "0");

        renderer
            .add_lens(low, LensOptions::default(), LensHooks::new())
            .unwrap();
        assert_eq!(renderer.page().computed_style(overlay, "z-index"), "0");
        let top = renderer
            .add_lens(high, LensOptions::default(), LensHooks::new())
            .unwrap();
        assert_eq!(renderer.page().computed_style(overlay, "z-index"), "6");
        renderer.remove_lens(top).unwrap();
        assert_eq!(renderer.page().computed_style(overlay, "z-index"), "0");
    }

    #[test]
    fn lens_draws_cover_its_device_rect() {
        let mut page = blank_page(400.0, 300.0, 3.0);
        let node = host(&mut page, Rect::new(40.0, 30.0, 100.0, 60.0));
        page.set_inline_style(node, "border-radius", "999px").unwrap();
        let (mut renderer, journal) = renderer(page, config());
        let lens = renderer
            .add_lens(node, LensOptions::default(), LensHooks::new())
            .unwrap();
        assert!(renderer.capture_snapshot(Instant::now()));

        assert_eq!(renderer.device_pixel_ratio(), 2.0);
        assert!(renderer.lens_radius(lens).unwrap() <= 0.5 * 60.0 * 2.0);
        let journal = journal.lock().unwrap();
        assert_eq!(journal.surface, (800, 600));
        let draws = journal.last_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].viewport.x, 80);
        assert_eq!(draws[0].viewport.width, 200);
        assert!((draws[0].uv.u - 0.1).abs() < 1e-4);
        assert!((draws[0].uv.width - 0.25).abs() < 1e-4);
    }

    #[test]
    fn partly_offscreen_lens_keeps_its_full_rect() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let node = host(&mut page, Rect::new(-50.0, 10.0, 100.0, 60.0));
        let (mut renderer, journal) = renderer(page, config());
        renderer
            .add_lens(node, LensOptions::default(), LensHooks::new())
            .unwrap();
        assert!(renderer.capture_snapshot(Instant::now()));

        let draw = journal.lock().unwrap().last_draws()[0];
        assert_eq!((draw.viewport.x, draw.viewport.width), (0, 50));
        assert_eq!(draw.lens_px, Rect::new(-50.0, 10.0, 100.0, 60.0));

        // The visible half samples exactly the visible half of the snapshot.
        let (texture_width, _) = renderer.texture_size().unwrap();
        let scale = renderer.scale_factor().unwrap();
        let (left, _) = crate::lens_uv_at(&draw.uv, &draw.lens_px, (0.0, 40.0));
        let (right, _) = crate::lens_uv_at(&draw.uv, &draw.lens_px, (50.0, 40.0));
        assert!(left.abs() < 1e-5);
        let sampled = (right - left) * texture_width as f32;
        assert!((sampled - draw.viewport.width as f32 * scale).abs() < 1e-2);
    }

    #[test]
    fn detached_host_does_not_stop_other_lenses() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let first = host(&mut page, Rect::new(10.0, 10.0, 80.0, 80.0));
        let second = host(&mut page, Rect::new(200.0, 100.0, 120.0, 60.0));
        let (mut renderer, journal) = renderer(page, config());
        for node in [first, second] {
            renderer
                .add_lens(node, LensOptions::default(), LensHooks::new())
                .unwrap();
        }
        let now = Instant::now();
        assert!(renderer.capture_snapshot(now));
        assert_eq!(journal.lock().unwrap().last_draws().len(), 2);

        renderer.page_mut().remove(first).unwrap();
        let stats = renderer.render(now + Duration::from_millis(16));
        assert_eq!(stats.lenses_drawn, 1);
        let draws = journal.lock().unwrap().last_draws();
        assert_eq!(draws.len(), 1);
        assert_eq!((draws[0].viewport.x, draws[0].viewport.y), (200, 100));
        assert_eq!(draws[0].lens_px, Rect::new(200.0, 100.0, 120.0, 60.0));
    }

    #[test]
    fn detached_host_cannot_get_a_lens() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let node = host(&mut page, Rect::new(10.0, 10.0, 80.0, 80.0));
        page.remove(node).unwrap();
        let (mut renderer, _) = renderer(page, config());
        let err = renderer
            .add_lens(node, LensOptions::default(), LensHooks::new())
            .unwrap_err();
        assert!(matches!(err, RendererError::Page(page::PageError::Detached(_))));
    }

    #[test]
    fn tilt_mirror_lifecycle_leaks_nothing() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let node = host(&mut page, Rect::new(100.0, 100.0, 100.0, 100.0));
        let (mut renderer, journal) = renderer(page, config());
        let options = LensOptions {
            tilt: true,
            reveal: RevealMode::Instant,
            ..LensOptions::default()
        };
        let lens = renderer.add_lens(node, options, LensHooks::new()).unwrap();
        let start = Instant::now();
        assert!(renderer.capture_snapshot(start));
        renderer.start_render_loop();
        assert_eq!(renderer.page().listeners().listener_count(EventKind::PointerMove), 1);

        for cycle in 0..3u64 {
            let t = start + Duration::from_secs(cycle * 2);
            renderer.handle_pointer_move(175.0, 150.0, t);
            assert!(renderer.mirror_active(lens).unwrap());
            assert_eq!(renderer.lens_tilt(lens).unwrap(), (0.0, 2.5));
            assert_eq!(renderer.page().listeners().listener_count(EventKind::Resize), 2);

            let stats = renderer.on_animation_frame(t + Duration::from_millis(16));
            assert_eq!(stats.regions_cleared, 1);
            let clears = journal.lock().unwrap().last_clears();
            assert_eq!(clears[0].x, 98);
            assert_eq!(clears[0].width, 104);

            renderer.handle_pointer_move(10.0, 10.0, t + Duration::from_millis(32));
            assert!(renderer.mirror_active(lens).unwrap());
            if cycle % 2 == 0 {
                let mirror = renderer.mirror_node(lens).unwrap().unwrap();
                assert!(renderer.handle_transition_end(mirror, t + Duration::from_millis(400)));
            } else {
                renderer.on_animation_frame(t + Duration::from_millis(700));
            }
            assert!(!renderer.mirror_active(lens).unwrap());
            assert_eq!(renderer.page().listeners().listener_count(EventKind::Resize), 1);
            assert_eq!(journal.lock().unwrap().live_mirrors.len(), 0);
            assert_eq!(renderer.page().inline_style(node, "transform"), None);
        }
        let stats = renderer.on_animation_frame(start + Duration::from_secs(10));
        assert_eq!(stats.regions_cleared, 0);
    }

    #[test]
    fn frame_readback_fills_mirrored_lenses() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let node = host(&mut page, Rect::new(100.0, 100.0, 100.0, 100.0));
        let (mut renderer, _journal) = renderer(page, config());
        let options = LensOptions {
            tilt: true,
            reveal: RevealMode::Instant,
            ..LensOptions::default()
        };
        renderer.add_lens(node, options, LensHooks::new()).unwrap();
        let start = Instant::now();
        assert!(renderer.capture_snapshot(start));
        renderer.start_render_loop();

        let frame = renderer.read_frame().unwrap();
        assert_eq!(frame.get_pixel(150, 150)[3], 0);

        renderer.handle_pointer_move(175.0, 150.0, start);
        renderer.on_animation_frame(start + Duration::from_millis(16));
        let frame = renderer.read_frame().unwrap();
        assert_eq!(frame.get_pixel(100, 100)[3], 255);
        assert_eq!(frame.get_pixel(199, 199)[3], 255);
        assert_eq!(frame.get_pixel(99, 150)[3], 0);
        assert_eq!(frame.get_pixel(200, 150)[3], 0);
    }

    #[test]
    fn dynamic_element_schedules_recapture() {
        let mut page = blank_page(400.0, 300.0, 1.0);
        let node = host(&mut page, Rect::new(0.0, 0.0, 10.0, 10.0));
        let (mut renderer, journal) = renderer(page, config());
        let start = Instant::now();
        assert!(renderer.capture_snapshot(start));
        renderer.add_dynamic_element(node).unwrap();
        renderer.on_animation_frame(start);
        assert!(renderer.wait_for_capture(start));
        assert_eq!(journal.lock().unwrap().uploads, 2);
    }
}
