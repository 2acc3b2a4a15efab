use image::RgbaImage;

use crate::error::RendererError;

use super::pipeline::OVERLAY_FORMAT;

/// The shared snapshot texture plus the bind group sampling it.
pub(crate) struct SnapshotTexture {
    texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn write_region(queue: &wgpu::Queue, texture: &wgpu::Texture, x: u32, y: u32, image: &RgbaImage) {
    let (width, height) = image.dimensions();
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        extent(width, height),
    );
}

impl SnapshotTexture {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        image: &RgbaImage,
    ) -> Self {
        let (width, height) = image.dimensions();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("snapshot texture"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_region(queue, &texture, 0, 0, image);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("snapshot sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("snapshot bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        Self {
            texture,
            bind_group,
            size: (width, height),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Re-uploads into the existing texture; caller checks the dimensions.
    pub fn upload(&self, queue: &wgpu::Queue, image: &RgbaImage) {
        write_region(queue, &self.texture, 0, 0, image);
    }

    pub fn patch(
        &self,
        queue: &wgpu::Queue,
        x: u32,
        y: u32,
        image: &RgbaImage,
    ) -> Result<(), RendererError> {
        let (width, height) = image.dimensions();
        let fits = x.checked_add(width).is_some_and(|right| right <= self.size.0)
            && y.checked_add(height).is_some_and(|bottom| bottom <= self.size.1);
        if !fits || width == 0 || height == 0 {
            return Err(RendererError::PatchBounds {
                x,
                y,
                width,
                height,
                texture_width: self.size.0,
                texture_height: self.size.1,
            });
        }
        write_region(queue, &self.texture, x, y, image);
        Ok(())
    }
}

/// A render target the overlay (or a mirror) draws into.
pub(crate) struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, label: &str, size: (u32, u32)) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size.0, size.1),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OVERLAY_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// Copies the region both targets share from `self` into `other`.
    pub fn copy_into(&self, encoder: &mut wgpu::CommandEncoder, other: &RenderTarget) {
        let width = self.size.0.min(other.size.0);
        let height = self.size.1.min(other.size.1);
        encoder.copy_texture_to_texture(
            self.texture.as_image_copy(),
            other.texture.as_image_copy(),
            extent(width, height),
        );
    }

    /// Reads the target back and converts premultiplied pixels to straight alpha.
    pub fn read_back(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<RgbaImage, RendererError> {
        let (width, height) = self.size;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = (width * 4).div_ceil(align) * align;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay readback"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("overlay readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| RendererError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| RendererError::Readback(err.to_string()))?
            .map_err(|err| RendererError::Readback(err.to_string()))?;

        let mut image = RgbaImage::new(width, height);
        {
            let data = slice.get_mapped_range();
            for (y, row) in data.chunks_exact(bytes_per_row as usize).enumerate() {
                for (x, px) in row[..(width * 4) as usize].chunks_exact(4).enumerate() {
                    image.put_pixel(x as u32, y as u32, unpremultiply([px[0], px[1], px[2], px[3]]));
                }
            }
        }
        buffer.unmap();
        Ok(image)
    }
}

fn unpremultiply([r, g, b, a]: [u8; 4]) -> image::Rgba<u8> {
    if a == 0 {
        return image::Rgba([0, 0, 0, 0]);
    }
    let scale = 255.0 / f32::from(a);
    let channel = |value: u8| (f32::from(value) * scale).round().min(255.0) as u8;
    image::Rgba([channel(r), channel(g), channel(b), a])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpremultiply_restores_straight_alpha() {
        assert_eq!(unpremultiply([64, 32, 0, 128]).0, [128, 64, 0, 128]);
        assert_eq!(unpremultiply([10, 10, 10, 0]).0, [0, 0, 0, 0]);
        assert_eq!(unpremultiply([255, 255, 255, 255]).0, [255, 255, 255, 255]);
    }
}
