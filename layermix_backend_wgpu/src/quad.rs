// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The textured quad: vertex layout, shader and pipeline.

use bytemuck::{Pod, Zeroable};
use layermix_core::geometry::Rect;

/// Samples the bound texture across the quad.
pub(crate) const QUAD_SHADER: &str = r"
@group(0) @binding(0) var frame: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) pos: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4(pos, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(frame, frame_sampler, in.uv);
}
";

/// One corner of a quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    /// Clip-space position.
    pub(crate) position: [f32; 2],
    /// Texture coordinate, top-left origin.
    pub(crate) uv: [f32; 2],
}

/// Vertices drawn per quad (two triangles).
pub(crate) const QUAD_VERTEX_COUNT: u32 = 6;

/// Two triangles covering normalized `bounds` (top-left origin, y down).
///
/// With `flip`, texture rows are sampled bottom-up.
pub(crate) fn quad_vertices(bounds: Rect, flip: bool) -> [QuadVertex; 6] {
    let r = bounds.to_kurbo();
    #[expect(
        clippy::cast_possible_truncation,
        reason = "normalized coordinates fit comfortably in f32"
    )]
    let clip = |x: f64, y: f64| [(x * 2.0 - 1.0) as f32, (1.0 - y * 2.0) as f32];
    let (top_v, bottom_v) = if flip { (1.0, 0.0) } else { (0.0, 1.0) };

    let top_left = QuadVertex {
        position: clip(r.x0, r.y0),
        uv: [0.0, top_v],
    };
    let top_right = QuadVertex {
        position: clip(r.x1, r.y0),
        uv: [1.0, top_v],
    };
    let bottom_left = QuadVertex {
        position: clip(r.x0, r.y1),
        uv: [0.0, bottom_v],
    };
    let bottom_right = QuadVertex {
        position: clip(r.x1, r.y1),
        uv: [1.0, bottom_v],
    };
    [
        top_left,
        bottom_left,
        top_right,
        top_right,
        bottom_left,
        bottom_right,
    ]
}

pub(crate) fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("layermix frame bind group layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("layermix quad shader"),
        source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("layermix quad pipeline layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("layermix quad pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: size_of::<QuadVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 0,
                        shader_location: 0,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 8,
                        shader_location: 1,
                    },
                ],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bounds_cover_clip_space() {
        let v = quad_vertices(Rect::FULL, false);
        assert_eq!(v[0], QuadVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] });
        assert_eq!(v[5], QuadVertex { position: [1.0, -1.0], uv: [1.0, 1.0] });
    }

    #[test]
    fn bounds_map_to_clip_space_with_y_down() {
        let v = quad_vertices(Rect::new(0.5, 0.25, 0.5, 0.5), false);
        assert_eq!(v[0].position, [0.0, 0.5], "top left");
        assert_eq!(v[1].position, [0.0, -0.5], "bottom left");
        assert_eq!(v[2].position, [1.0, 0.5], "top right");
    }

    #[test]
    fn flip_swaps_texture_rows() {
        let plain = quad_vertices(Rect::FULL, false);
        let flipped = quad_vertices(Rect::FULL, true);
        for (p, f) in plain.iter().zip(&flipped) {
            assert_eq!(p.position, f.position, "positions do not move");
            assert_eq!(p.uv[0], f.uv[0], "columns do not move");
            assert_eq!(p.uv[1], 1.0 - f.uv[1], "rows are mirrored");
        }
    }

    #[test]
    fn every_triangle_is_counter_clockwise() {
        let v = quad_vertices(Rect::FULL, false);
        for tri in v.chunks(3) {
            let [a, b, c] = [tri[0].position, tri[1].position, tri[2].position];
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0, "front-facing under the default winding");
        }
    }
}
