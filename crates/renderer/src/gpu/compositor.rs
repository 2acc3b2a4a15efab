use std::collections::BTreeMap;

use anyhow::Result;
use image::RgbaImage;

use crate::error::RendererError;
use crate::geometry::PixelRect;
use crate::types::AdapterProfile;

use super::context::GpuContext;
use super::pipeline::GlassPipelines;
use super::texture::{RenderTarget, SnapshotTexture};
use super::uniforms::{uniform_stride, GlassUniforms};
use super::{Compositor, LensDraw, MirrorId};

enum FrameOp {
    Draw { viewport: PixelRect, slot: usize },
    Clear(PixelRect),
    Mirror(MirrorId),
}

/// Uniform buffer holding one aligned block per lens drawn this frame.
struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl UniformArena {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, stride: u64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lens uniforms"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lens uniform bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(super::uniforms::GLASS_UNIFORM_SIZE),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }
}

/// Headless `wgpu` compositor: the overlay is an offscreen texture that can
/// be read back, and every mirror canvas owns a texture of its own.
pub struct WgpuCompositor {
    context: GpuContext,
    pipelines: GlassPipelines,
    snapshot: Option<SnapshotTexture>,
    overlay: RenderTarget,
    mirrors: BTreeMap<MirrorId, RenderTarget>,
    next_mirror: u64,
    stride: u64,
    arena: UniformArena,
    pending_uniforms: Vec<GlassUniforms>,
    ops: Vec<FrameOp>,
}

impl WgpuCompositor {
    /// Acquires a device and compiles the shader pipelines once.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let context = GpuContext::new()?;
        let pipelines = GlassPipelines::new(&context.device)?;
        let stride = uniform_stride(context.uniform_alignment);
        let arena = UniformArena::new(&context.device, &pipelines.uniform_layout, stride, 8);
        let overlay = RenderTarget::new(&context.device, "glass overlay", (width, height));
        tracing::debug!(width, height, stride, "created glass compositor");
        Ok(Self {
            context,
            pipelines,
            snapshot: None,
            overlay,
            mirrors: BTreeMap::new(),
            next_mirror: 0,
            stride,
            arena,
            pending_uniforms: Vec::new(),
            ops: Vec::new(),
        })
    }

    pub fn adapter(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    fn ensure_arena(&mut self, needed: usize) {
        if needed <= self.arena.capacity {
            return;
        }
        let capacity = needed.next_power_of_two();
        tracing::debug!(capacity, "growing lens uniform buffer");
        self.arena = UniformArena::new(
            &self.context.device,
            &self.pipelines.uniform_layout,
            self.stride,
            capacity,
        );
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ops: &[FrameOp],
        load: wgpu::LoadOp<wgpu::Color>,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("glass pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.overlay.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        for op in ops {
            match op {
                FrameOp::Draw { viewport, slot } => {
                    let Some(snapshot) = self.snapshot.as_ref() else {
                        continue;
                    };
                    pass.set_pipeline(&self.pipelines.glass);
                    pass.set_bind_group(0, &self.arena.bind_group, &[(*slot as u64 * self.stride) as u32]);
                    pass.set_bind_group(1, &snapshot.bind_group, &[]);
                    pass.set_viewport(
                        viewport.x as f32,
                        viewport.y as f32,
                        viewport.width as f32,
                        viewport.height as f32,
                        0.0,
                        1.0,
                    );
                    pass.set_scissor_rect(viewport.x, viewport.y, viewport.width, viewport.height);
                    pass.draw(0..3, 0..1);
                }
                FrameOp::Clear(region) => {
                    pass.set_pipeline(&self.pipelines.clear);
                    pass.set_viewport(
                        0.0,
                        0.0,
                        self.overlay.size.0 as f32,
                        self.overlay.size.1 as f32,
                        0.0,
                        1.0,
                    );
                    pass.set_scissor_rect(region.x, region.y, region.width, region.height);
                    pass.draw(0..3, 0..1);
                }
                FrameOp::Mirror(_) => {}
            }
        }
    }

    fn clip(&self, region: PixelRect) -> Option<PixelRect> {
        let (width, height) = self.overlay.size;
        let right = region.right().min(width);
        let bottom = region.bottom().min(height);
        (right > region.x && bottom > region.y).then(|| PixelRect {
            x: region.x,
            y: region.y,
            width: right - region.x,
            height: bottom - region.y,
        })
    }
}

impl Compositor for WgpuCompositor {
    fn max_texture_size(&self) -> u32 {
        self.context.max_texture_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.overlay.size {
            return;
        }
        let max = self.context.max_texture_size;
        let size = (width.min(max), height.min(max));
        self.overlay = RenderTarget::new(&self.context.device, "glass overlay", size);
        for (id, mirror) in self.mirrors.iter_mut() {
            *mirror = RenderTarget::new(&self.context.device, &format!("mirror #{}", id.id()), size);
        }
        tracing::debug!(width = size.0, height = size.1, "resized overlay");
    }

    fn surface_size(&self) -> (u32, u32) {
        self.overlay.size
    }

    fn replace_snapshot(&mut self, image: &RgbaImage) -> Result<(), RendererError> {
        let dimensions = image.dimensions();
        match self.snapshot.as_ref() {
            Some(texture) if texture.size() == dimensions => {
                texture.upload(&self.context.queue, image);
            }
            _ => {
                tracing::debug!(width = dimensions.0, height = dimensions.1, "allocating snapshot texture");
                self.snapshot = Some(SnapshotTexture::new(
                    &self.context.device,
                    &self.context.queue,
                    &self.pipelines.snapshot_layout,
                    image,
                ));
            }
        }
        Ok(())
    }

    fn patch_snapshot(&mut self, x: u32, y: u32, image: &RgbaImage) -> Result<(), RendererError> {
        let texture = self.snapshot.as_ref().ok_or(RendererError::NoSnapshot)?;
        texture.patch(&self.context.queue, x, y, image)
    }

    fn snapshot_dimensions(&self) -> Option<(u32, u32)> {
        self.snapshot.as_ref().map(SnapshotTexture::size)
    }

    fn begin_frame(&mut self) {
        self.ops.clear();
        self.pending_uniforms.clear();
    }

    fn draw_lens(&mut self, draw: &LensDraw) {
        let Some(texture_size) = self.snapshot_dimensions() else {
            return;
        };
        let Some(viewport) = self.clip(draw.viewport) else {
            return;
        };
        let slot = self.pending_uniforms.len();
        let draw = LensDraw { viewport, ..*draw };
        self.pending_uniforms
            .push(GlassUniforms::from_draw(&draw, texture_size, self.overlay.size));
        self.ops.push(FrameOp::Draw { viewport, slot });
    }

    fn copy_to_mirror(&mut self, mirror: MirrorId) {
        if self.mirrors.contains_key(&mirror) {
            self.ops.push(FrameOp::Mirror(mirror));
        }
    }

    fn clear_region(&mut self, region: PixelRect) {
        if let Some(region) = self.clip(region) {
            self.ops.push(FrameOp::Clear(region));
        }
    }

    fn finish_frame(&mut self) -> Result<(), RendererError> {
        let ops = std::mem::take(&mut self.ops);
        self.ensure_arena(self.pending_uniforms.len());
        for (slot, uniforms) in self.pending_uniforms.iter().enumerate() {
            self.context.queue.write_buffer(
                &self.arena.buffer,
                slot as u64 * self.stride,
                bytemuck::bytes_of(uniforms),
            );
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glass frame encoder"),
            });
        let mut load = wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT);
        let mut start = 0;
        // Mirror copies split the frame into passes so they see the draws before them.
        for (index, op) in ops.iter().enumerate() {
            if let FrameOp::Mirror(id) = op {
                self.encode_pass(&mut encoder, &ops[start..index], load);
                load = wgpu::LoadOp::Load;
                if let Some(mirror) = self.mirrors.get(id) {
                    self.overlay.copy_into(&mut encoder, mirror);
                }
                start = index + 1;
            }
        }
        self.encode_pass(&mut encoder, &ops[start..], load);
        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.ops = ops;
        self.ops.clear();
        Ok(())
    }

    fn allocate_mirror(&mut self) -> MirrorId {
        let id = MirrorId::new(self.next_mirror);
        self.next_mirror += 1;
        let target = RenderTarget::new(
            &self.context.device,
            &format!("mirror #{}", id.id()),
            self.overlay.size,
        );
        self.mirrors.insert(id, target);
        id
    }

    fn release_mirror(&mut self, mirror: MirrorId) -> bool {
        self.mirrors.remove(&mirror).is_some()
    }

    fn live_mirrors(&self) -> usize {
        self.mirrors.len()
    }

    fn read_mirror(&mut self, mirror: MirrorId) -> Result<RgbaImage, RendererError> {
        let target = self
            .mirrors
            .get(&mirror)
            .ok_or(RendererError::UnknownMirror(mirror.id()))?;
        target.read_back(&self.context.device, &self.context.queue)
    }

    fn read_overlay(&mut self) -> Result<RgbaImage, RendererError> {
        self.overlay
            .read_back(&self.context.device, &self.context.queue)
    }
}
