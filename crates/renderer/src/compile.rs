use std::borrow::Cow;

use anyhow::{bail, Result};
use wgpu::naga::ShaderStage;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile(device, "fullscreen triangle vertex", VERTEX_SHADER_GLSL, ShaderStage::Vertex)
}

/// Compiles the refraction shader drawn once per lens.
pub(crate) fn compile_glass_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile(device, "glass fragment", GLASS_SHADER_GLSL, ShaderStage::Fragment)
}

/// Compiles the transparent fill used for scissor clears.
pub(crate) fn compile_clear_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile(device, "scissor clear fragment", CLEAR_SHADER_GLSL, ShaderStage::Fragment)
}

fn compile(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        bail!("failed to compile {label} shader: {error}");
    }
    tracing::debug!(label, "compiled shader");
    Ok(module)
}

/// Full-screen triangle over the current viewport. `v_uv` has a top-left
/// origin, matching the snapshot texture, which is uploaded without a flip.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[uint(gl_VertexIndex)];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// The uniform block layout must match `GlassUniforms` in `gpu/uniforms.rs`.
const GLASS_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform LensParams {
    vec4 resolution;   // unclipped lens w/h in device px, texture w/h
    vec4 bounds;       // uv origin and extent of the lens inside the snapshot
    vec4 glass;        // refraction, bevel depth, bevel width, frost radius
    vec4 shape;        // corner radius (device px), specular, reveal progress, magnify
    vec4 motion;       // tilt x, tilt y, time, fade reveal flag
    vec4 placement;    // unclipped lens origin x/y in device px, overlay w/h
} lens;

layout(set = 1, binding = 0) uniform texture2D snapshot_texture;
layout(set = 1, binding = 1) uniform sampler snapshot_sampler;

const int FROST_TAPS = 12;
const float GOLDEN_ANGLE = 2.39996323;

float rounded_box(vec2 p, vec2 half_size, float radius) {
    vec2 q = abs(p) - half_size + vec2(radius);
    return length(max(q, vec2(0.0))) + min(max(q.x, q.y), 0.0) - radius;
}

float hash(vec2 p) {
    return fract(sin(dot(p, vec2(12.9898, 78.233))) * 43758.5453);
}

vec4 sample_snapshot(vec2 uv) {
    vec2 lo = lens.bounds.xy;
    vec2 hi = lens.bounds.xy + lens.bounds.zw;
    vec2 clamped = clamp(uv, min(lo, hi), max(lo, hi));
    return textureLod(sampler2D(snapshot_texture, snapshot_sampler), clamped, 0.0);
}

void main() {
    // Lens-local position from the framebuffer, so a lens clipped by the
    // overlay edge keeps its full shape.
    vec2 size = max(lens.resolution.xy, vec2(1.0));
    vec2 local = gl_FragCoord.xy - lens.placement.xy;
    vec2 lens_pos = local / size;
    vec2 centered = local - 0.5 * size;
    float radius = min(lens.shape.x, 0.5 * min(size.x, size.y));

    float dist = rounded_box(centered, 0.5 * size, radius);
    float mask = 1.0 - smoothstep(-1.0, 0.5, dist);

    vec2 ex = vec2(1.0, 0.0);
    vec2 ey = vec2(0.0, 1.0);
    vec2 gradient = vec2(
        rounded_box(centered + ex, 0.5 * size, radius) - rounded_box(centered - ex, 0.5 * size, radius),
        rounded_box(centered + ey, 0.5 * size, radius) - rounded_box(centered - ey, 0.5 * size, radius)
    );
    float gradient_len = length(gradient);
    vec2 normal = gradient_len > 1e-5 ? gradient / gradient_len : vec2(0.0);

    float bevel_px = max(lens.glass.z * min(size.x, size.y), 1e-3);
    float rim = 1.0 - clamp(-dist / bevel_px, 0.0, 1.0);
    rim = rim * rim;

    float magnify = max(lens.shape.w, 1e-3);
    vec2 lens_uv = (lens_pos - 0.5) / magnify + 0.5;
    vec2 offset = -normal * rim * (lens.glass.x * lens.glass.y + lens.glass.y);
    vec2 tilt = vec2(lens.motion.y, -lens.motion.x) * 0.0015;
    vec2 uv = lens.bounds.xy + (lens_uv + offset + tilt) * lens.bounds.zw;

    vec4 color = sample_snapshot(uv);
    float frost = lens.glass.w;
    if (frost > 0.0) {
        vec2 texel = 1.0 / max(lens.resolution.zw, vec2(1.0));
        float spin = hash(local) * 6.2831853;
        vec4 sum = color;
        for (int i = 0; i < FROST_TAPS; i++) {
            float fi = float(i) + 0.5;
            float r = sqrt(fi / float(FROST_TAPS)) * frost;
            float a = fi * GOLDEN_ANGLE + spin;
            sum += sample_snapshot(uv + vec2(cos(a), sin(a)) * r * texel);
        }
        color = sum / float(FROST_TAPS + 1);
    }

    if (lens.shape.y > 0.5) {
        float t = lens.motion.z * 0.35;
        vec2 light = normalize(vec2(cos(t) - 0.6, sin(t) - 0.8));
        float facing = max(dot(normal, light), 0.0);
        float highlight = pow(facing, 3.0) * rim * 0.35;
        color.rgb += vec3(highlight);
    }

    float reveal = lens.motion.w > 0.5 ? clamp(lens.shape.z, 0.0, 1.0) : 1.0;
    float alpha = mask * reveal;
    outColor = vec4(clamp(color.rgb, 0.0, 1.0) * alpha, alpha);
}
";

const CLEAR_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(0.0);
}
";
