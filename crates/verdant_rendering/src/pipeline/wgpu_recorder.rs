//! wgpu recorder and the pipelines it records with.

use std::sync::Arc;

use super::cull_draw::DrawView;
use super::recorder::{BufferBarrier, CommandRecorder, CullDispatch, IndirectDraw};
use crate::culling::CullingConstants;
use crate::instancing::DrawListKind;

/// Invocations per culling workgroup. Matches `@workgroup_size` in
/// `shaders/instance_culling.wgsl`.
pub const CULL_WORKGROUP_SIZE: u32 = 32;

const PYRAMID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn buffer_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

/// Bind group plus the binding state it was built from.
#[derive(Debug)]
struct CachedBindGroup {
    bindings_version: u64,
    pyramid_generation: u64,
    group: wgpu::BindGroup,
}

/// Compute and render pipelines of the instance renderer.
///
/// Bind groups are cached per draw list and rebuilt only when the buffer
/// synchronizer replaced a binding or the depth pyramid changed.
#[derive(Debug)]
pub struct GpuPipelines {
    cull_layout: wgpu::BindGroupLayout,
    draw_layout: wgpu::BindGroupLayout,
    cull_pipeline: wgpu::ComputePipeline,
    opaque_pipeline: wgpu::RenderPipeline,
    transparent_pipeline: wgpu::RenderPipeline,
    fallback_pyramid: wgpu::TextureView,
    pyramid: Option<wgpu::TextureView>,
    pyramid_generation: u64,
    cull_groups: [Option<CachedBindGroup>; 2],
    draw_groups: [Option<CachedBindGroup>; 2],
}

impl GpuPipelines {
    /// Builds every pipeline for the given attachment formats.
    ///
    /// Depth is reversed-Z: clear to 0.0, nearer fragments are greater.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let cull_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("verdant.instance_culling"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/instance_culling.wgsl").into()),
        });
        let draw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("verdant.instance_draw"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/instance_draw.wgsl").into()),
        });

        let compute = wgpu::ShaderStages::COMPUTE;
        let cull_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("verdant.cull_layout"),
            entries: &[
                uniform_entry(0, compute, std::mem::size_of::<CullingConstants>()),
                storage_entry(1, compute, true),
                storage_entry(2, compute, true),
                storage_entry(3, compute, true),
                storage_entry(4, compute, true),
                storage_entry(5, compute, false),
                storage_entry(6, compute, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: compute,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let vertex = wgpu::ShaderStages::VERTEX;
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("verdant.draw_layout"),
            entries: &[
                uniform_entry(0, vertex, std::mem::size_of::<DrawView>()),
                storage_entry(1, vertex, true),
                storage_entry(2, vertex, true),
                storage_entry(3, vertex, true),
                storage_entry(4, vertex | fragment, true),
                storage_entry(5, fragment, true),
                storage_entry(6, vertex, true),
                storage_entry(7, vertex, true),
            ],
        });

        let cull_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("verdant.cull_pipeline_layout"),
            bind_group_layouts: &[&cull_layout],
            push_constant_ranges: &[],
        });
        let cull_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("verdant.cull_pipeline"),
            layout: Some(&cull_pipeline_layout),
            module: &cull_shader,
            entry_point: "cull_instances",
        });

        let draw_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("verdant.draw_pipeline_layout"),
            bind_group_layouts: &[&draw_layout],
            push_constant_ranges: &[],
        });
        let draw_pipeline = |label: &str, blend: wgpu::BlendState, depth_write_enabled: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&draw_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &draw_shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &draw_shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    // Back faces are discarded per batch in the fragment stage.
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: depth_format,
                    depth_write_enabled,
                    depth_compare: wgpu::CompareFunction::Greater,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        };
        let opaque_pipeline = draw_pipeline("verdant.opaque_pipeline", wgpu::BlendState::REPLACE, true);
        let transparent_pipeline =
            draw_pipeline("verdant.transparent_pipeline", wgpu::BlendState::ALPHA_BLENDING, false);

        // Zero-initialized: reads as far plane, so nothing is occluded.
        let fallback_pyramid = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("verdant.fallback_pyramid"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PYRAMID_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            cull_layout,
            draw_layout,
            cull_pipeline,
            opaque_pipeline,
            transparent_pipeline,
            fallback_pyramid,
            pyramid: None,
            pyramid_generation: 0,
            cull_groups: [None, None],
            draw_groups: [None, None],
        }
    }

    /// Binds the caller's min-depth pyramid (`R32Float`, full mip chain),
    /// or the fallback that never occludes. The shader skips the occlusion
    /// test while the bound chain is shorter than the constants' mip count.
    pub fn set_depth_pyramid(&mut self, view: Option<wgpu::TextureView>) {
        self.pyramid = view;
        self.pyramid_generation += 1;
    }

    fn pyramid_view(&self) -> &wgpu::TextureView {
        self.pyramid.as_ref().unwrap_or(&self.fallback_pyramid)
    }

    fn prepare_cull_group(&mut self, device: &wgpu::Device, dispatch: &CullDispatch<Arc<wgpu::Buffer>>) {
        let slot = dispatch.list.index();
        if self.cull_groups[slot].as_ref().is_some_and(|cached| {
            cached.bindings_version == dispatch.bindings_version
                && cached.pyramid_generation == self.pyramid_generation
        }) {
            return;
        }
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("verdant.cull_bind_group"),
            layout: &self.cull_layout,
            entries: &[
                buffer_entry(0, &dispatch.constants),
                buffer_entry(1, &dispatch.instances),
                buffer_entry(2, &dispatch.culling_data),
                buffer_entry(3, &dispatch.draw_calls),
                buffer_entry(4, &dispatch.draw_call_data),
                buffer_entry(5, &dispatch.culled_draw_calls),
                buffer_entry(6, &dispatch.counters),
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::TextureView(self.pyramid_view()),
                },
            ],
        });
        tracing::debug!(list = dispatch.list.label(), version = dispatch.bindings_version, "rebuilt cull bind group");
        self.cull_groups[slot] = Some(CachedBindGroup {
            bindings_version: dispatch.bindings_version,
            pyramid_generation: self.pyramid_generation,
            group,
        });
    }

    fn prepare_draw_group(&mut self, device: &wgpu::Device, draw: &IndirectDraw<Arc<wgpu::Buffer>>) {
        let slot = draw.list.index();
        if self.draw_groups[slot]
            .as_ref()
            .is_some_and(|cached| cached.bindings_version == draw.bindings_version)
        {
            return;
        }
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("verdant.draw_bind_group"),
            layout: &self.draw_layout,
            entries: &[
                buffer_entry(0, &draw.view),
                buffer_entry(1, &draw.vertices),
                buffer_entry(2, &draw.instances),
                buffer_entry(3, &draw.draw_calls),
                buffer_entry(4, &draw.draw_call_data),
                buffer_entry(5, &draw.texture_units),
                buffer_entry(6, &draw.vertex_colors),
                buffer_entry(7, &draw.bone_deform),
            ],
        });
        tracing::debug!(list = draw.list.label(), version = draw.bindings_version, "rebuilt draw bind group");
        self.draw_groups[slot] = Some(CachedBindGroup {
            bindings_version: draw.bindings_version,
            pyramid_generation: self.pyramid_generation,
            group,
        });
    }

    /// Drops every cached bind group.
    pub fn invalidate_bind_groups(&mut self) {
        self.cull_groups = [None, None];
        self.draw_groups = [None, None];
    }
}

/// Attachments the draw pass renders into. Both are loaded, not cleared.
#[derive(Debug, Clone, Copy)]
pub struct RenderTargets<'a> {
    /// Colour attachment.
    pub color: &'a wgpu::TextureView,
    /// Reversed-Z depth attachment.
    pub depth: &'a wgpu::TextureView,
}

/// Records into a wgpu command encoder.
///
/// Non-zero fills go through the queue and land at the start of the next
/// submission, ahead of this encoder's commands.
pub struct WgpuRecorder<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    pipelines: &'a mut GpuPipelines,
    targets: RenderTargets<'a>,
}

impl<'a> WgpuRecorder<'a> {
    /// Wraps an encoder for one frame.
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
        pipelines: &'a mut GpuPipelines,
        targets: RenderTargets<'a>,
    ) -> Self {
        Self {
            device,
            queue,
            encoder,
            pipelines,
            targets,
        }
    }
}

impl CommandRecorder for WgpuRecorder<'_> {
    type Buffer = Arc<wgpu::Buffer>;

    fn fill_buffer(&mut self, buffer: &Self::Buffer, offset: u64, words: &[u32]) {
        if words.iter().all(|&w| w == 0) {
            let size = std::mem::size_of_val(words) as u64;
            self.encoder.clear_buffer(buffer, offset, Some(size));
        } else {
            self.queue.write_buffer(buffer, offset, bytemuck::cast_slice(words));
        }
    }

    fn dispatch_cull(&mut self, dispatch: &CullDispatch<Self::Buffer>) {
        self.pipelines.prepare_cull_group(self.device, dispatch);
        let pipelines = &*self.pipelines;
        let Some(cached) = &pipelines.cull_groups[dispatch.list.index()] else {
            return;
        };
        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("verdant.cull"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipelines.cull_pipeline);
        pass.set_bind_group(0, &cached.group, &[]);
        pass.dispatch_workgroups(dispatch.draw_count.div_ceil(CULL_WORKGROUP_SIZE), 1, 1);
    }

    fn barrier(&mut self, barrier: &BufferBarrier<Self::Buffer>) {
        // wgpu tracks buffer usage and inserts the transition itself.
        tracing::trace!(src = ?barrier.src, dst = ?barrier.dst, "barrier");
    }

    fn draw_indexed_indirect_count(&mut self, draw: &IndirectDraw<Self::Buffer>) {
        self.pipelines.prepare_draw_group(self.device, draw);
        let pipelines = &*self.pipelines;
        let Some(cached) = &pipelines.draw_groups[draw.list.index()] else {
            return;
        };
        let pipeline = match draw.list {
            DrawListKind::Opaque => &pipelines.opaque_pipeline,
            DrawListKind::Transparent => &pipelines.transparent_pipeline,
        };

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(match draw.list {
                DrawListKind::Opaque => "verdant.draw.opaque",
                DrawListKind::Transparent => "verdant.draw.transparent",
            }),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.targets.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.targets.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &cached.group, &[]);
        pass.set_index_buffer(draw.indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.multi_draw_indexed_indirect_count(&draw.arguments, 0, &draw.count, 0, draw.max_draw_count);
    }

    fn copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u64) {
        self.encoder.copy_buffer_to_buffer(src, 0, dst, 0, size);
    }
}
