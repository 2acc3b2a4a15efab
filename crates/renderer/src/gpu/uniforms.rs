use bytemuck::{Pod, Zeroable};

use super::LensDraw;

/// Per-lens uniform block. Six `vec4`s, so std140 and the Rust layout agree
/// without padding fields.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct GlassUniforms {
    pub resolution: [f32; 4],
    pub bounds: [f32; 4],
    pub glass: [f32; 4],
    pub shape: [f32; 4],
    pub motion: [f32; 4],
    pub placement: [f32; 4],
}

pub(crate) const GLASS_UNIFORM_SIZE: u64 = std::mem::size_of::<GlassUniforms>() as u64;

impl GlassUniforms {
    pub fn from_draw(draw: &LensDraw, texture_size: (u32, u32), surface_size: (u32, u32)) -> Self {
        let flag = |value: bool| if value { 1.0 } else { 0.0 };
        Self {
            resolution: [
                draw.lens_px.width,
                draw.lens_px.height,
                texture_size.0 as f32,
                texture_size.1 as f32,
            ],
            bounds: draw.uv.to_array(),
            glass: [
                draw.refraction,
                draw.bevel_depth,
                draw.bevel_width,
                draw.frost,
            ],
            shape: [
                draw.radius_px,
                flag(draw.specular),
                draw.reveal_progress,
                draw.magnify,
            ],
            motion: [draw.tilt.0, draw.tilt.1, draw.time, flag(draw.fade_reveal)],
            placement: [
                draw.lens_px.x,
                draw.lens_px.y,
                surface_size.0 as f32,
                surface_size.1 as f32,
            ],
        }
    }
}

/// Rounds the uniform size up to the device's dynamic offset alignment.
pub(crate) fn uniform_stride(alignment: u32) -> u64 {
    let alignment = u64::from(alignment.max(1));
    GLASS_UNIFORM_SIZE.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PixelRect, UvRect};
    use page::Rect;

    #[test]
    fn block_is_six_vec4() {
        assert_eq!(GLASS_UNIFORM_SIZE, 96);
        assert_eq!(uniform_stride(256), 256);
        assert_eq!(uniform_stride(32), 96);
    }

    #[test]
    fn packs_draw_fields() {
        let draw = LensDraw {
            viewport: PixelRect {
                x: 10,
                y: 20,
                width: 300,
                height: 100,
            },
            lens_px: Rect::new(-20.0, 20.0, 330.0, 100.0),
            uv: UvRect {
                u: 0.1,
                v: 0.2,
                width: 0.3,
                height: 0.4,
            },
            radius_px: 24.0,
            refraction: 0.69,
            bevel_depth: 0.052,
            bevel_width: 0.211,
            frost: 2.0,
            specular: true,
            reveal_progress: 0.5,
            fade_reveal: true,
            magnify: 1.0,
            tilt: (3.0, -2.0),
            time: 1.25,
        };
        let uniforms = GlassUniforms::from_draw(&draw, (2000, 1600), (1920, 1080));
        assert_eq!(uniforms.resolution, [330.0, 100.0, 2000.0, 1600.0]);
        assert_eq!(uniforms.bounds, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(uniforms.shape, [24.0, 1.0, 0.5, 1.0]);
        assert_eq!(uniforms.motion, [3.0, -2.0, 1.25, 1.0]);
        assert_eq!(uniforms.placement, [-20.0, 20.0, 1920.0, 1080.0]);
        assert_eq!(bytemuck::bytes_of(&uniforms).len(), 96);
    }
}
