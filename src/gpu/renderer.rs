//! GPU renderer for the sphere field.
//!
//! Two passes per frame. The main pass draws every sphere the occlusion
//! tracker currently considers visible. The proxy pass re-uses that pass's
//! depth buffer to run one hardware occlusion query per sphere over its
//! bounding box, nearest spheres first; results are resolved into a pooled
//! readback buffer and consumed asynchronously in a later frame.

use std::iter;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::camera::Camera;
use crate::gpu::mesh::{self, BoundingBox};
use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::occlusion::{OcclusionResources, QueryTracker};
use crate::scene::SphereField;

/// Maximum number of spheres that can be rendered per frame.
/// Each sphere needs its own uniform slot in the dynamic uniform buffer and
/// its own occlusion query slot.
pub const MAX_SPHERES: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

/// Latitude/longitude segment counts for the sphere mesh.
const SPHERE_SEGMENTS: u32 = 16;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    color: [f32; 4],
    light_dir: [f32; 4],
    // Padding to reach 256-byte alignment (160 bytes of data + 96 bytes padding)
    _padding: [f32; 24],
}

impl Uniforms {
    fn new() -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            model: glam::Mat4::IDENTITY.to_cols_array_2d(),
            color: [1.0, 0.05, 0.05, 1.0],
            light_dir: [0.0, 0.0, -1.0, 0.0],
            _padding: [0.0; 24],
        }
    }
}

/// Counters produced by one [`Renderer::render`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameReport {
    pub spheres: usize,
    pub drawn: usize,
    pub occluded: usize,
    pub queries_issued: usize,
    pub results_consumed: usize,
    pub triangles: usize,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: wgpu::Extent3d,

    sphere_pipeline: wgpu::RenderPipeline,
    proxy_pipeline: wgpu::RenderPipeline,
    #[allow(dead_code)]
    uniform_bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,

    sphere_vertex_buffer: wgpu::Buffer,
    sphere_index_buffer: wgpu::Buffer,
    num_indices: u32,

    proxy_vertex_buffer: wgpu::Buffer,
    proxy_vertex_count: u32,

    depth_view: wgpu::TextureView,

    queries: OcclusionResources,
    tracker: QueryTracker,
    frame_index: u64,
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        field: &SphereField,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let slot_count = field.len().min(MAX_SPHERES);

        // === Shared geometry ===

        let (vertices, indices) =
            mesh::create_sphere_geometry(field.radius(), SPHERE_SEGMENTS, SPHERE_SEGMENTS);
        let bounds = BoundingBox::from_vertices(&vertices);
        let proxy_positions = mesh::bounding_box_positions(&bounds);

        let sphere_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sphere_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let proxy_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Proxy Vertex Buffer"),
            contents: bytemuck::cast_slice(&proxy_positions),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // === Uniforms: one 256-byte slot per sphere, bound with dynamic offsets ===

        let uniform_buffer_size = (UNIFORM_ALIGNMENT * MAX_SPHERES) as u64;
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sphere Uniform Buffer (Dynamic)"),
            size: uniform_buffer_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<Uniforms>() as u64
                        ),
                    },
                    count: None,
                }],
                label: Some("uniform_bind_group_layout"),
            });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                }),
            }],
            label: Some("uniform_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Field Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout],
            push_constant_ranges: &[],
        });

        let sphere_pipeline = pipeline::create_sphere_pipeline(&device, &pipeline_layout, format);
        let proxy_pipeline = pipeline::create_proxy_pipeline(&device, &pipeline_layout, format);

        let depth_view = create_depth_view(&device, size);
        let queries = OcclusionResources::new(&device, slot_count as u32);
        let tracker = QueryTracker::new(slot_count);

        Self {
            device,
            queue,
            size,
            sphere_pipeline,
            proxy_pipeline,
            uniform_bind_group_layout,
            uniform_buffer,
            uniform_bind_group,
            sphere_vertex_buffer,
            sphere_index_buffer,
            num_indices: indices.len() as u32,
            proxy_vertex_buffer,
            proxy_vertex_count: proxy_positions.len() as u32,
            depth_view,
            queries,
            tracker,
            frame_index: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.size = wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            };
            self.depth_view = create_depth_view(&self.device, self.size);
        }
    }

    /// Render one frame into `target` and advance the occlusion state.
    pub fn render(
        &mut self,
        target: &wgpu::TextureView,
        field: &SphereField,
        camera: &Camera,
    ) -> FrameReport {
        debug_assert_eq!(
            field.len().min(MAX_SPHERES),
            self.tracker.len(),
            "renderer was built for a different field size"
        );
        let count = field.len().min(MAX_SPHERES);

        // 1) Consume any query results whose readback completed.
        let drained = self.queries.drain_completed(&self.device, &mut self.tracker);

        // 2) Upload per-sphere uniforms (all spheres, occluded ones included:
        //    their proxies still need a model matrix).
        let view = camera.view_matrix();
        let view_proj = camera.view_projection_matrix().to_cols_array_2d();
        let light = camera.forward();
        let mut sphere_uniforms = Vec::with_capacity(count);
        for sphere in field.spheres().iter().take(count) {
            let mut uniforms = Uniforms::new();
            uniforms.view_proj = view_proj;
            uniforms.model = sphere.model_matrix().to_cols_array_2d();
            uniforms.light_dir = [light.x, light.y, light.z, 0.0];
            sphere_uniforms.push(uniforms);
        }
        if !sphere_uniforms.is_empty() {
            self.queue.write_buffer(
                &self.uniform_buffer,
                0,
                bytemuck::cast_slice(&sphere_uniforms),
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Field Render Encoder"),
            });

        // 3) Main pass: clear and draw the spheres not currently occluded.
        let mut drawn = 0;
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sphere Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.72,
                            g: 0.72,
                            b: 0.72,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.sphere_pipeline);
            render_pass.set_vertex_buffer(0, self.sphere_vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(self.sphere_index_buffer.slice(..), wgpu::IndexFormat::Uint16);

            for index in 0..count {
                if self.tracker.is_occluded(index) {
                    continue;
                }
                let dynamic_offset = (index * UNIFORM_ALIGNMENT) as u32;
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[dynamic_offset]);
                render_pass.draw_indexed(0..self.num_indices, 0, 0..1);
                drawn += 1;
            }
        }

        // 4) Proxy pass: one occlusion query per sphere without a result
        //    pending, nearest spheres first. Skipped on the very first frame
        //    (there is no depth history to test against yet) and while the
        //    readback pool is saturated.
        let mut batch: Vec<usize> = Vec::new();
        if self.frame_index > 0 && count > 0 && self.queries.can_accept_batch() {
            batch = field
                .depth_order(&view)
                .into_iter()
                .filter(|&i| i < count && self.tracker.can_issue(i))
                .collect();
        }

        if !batch.is_empty() {
            let mut query_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Occlusion Query Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: Some(self.queries.query_set()),
            });

            query_pass.set_pipeline(&self.proxy_pipeline);
            query_pass.set_vertex_buffer(0, self.proxy_vertex_buffer.slice(..));

            for (slot, &sphere_index) in batch.iter().enumerate() {
                let dynamic_offset = (sphere_index * UNIFORM_ALIGNMENT) as u32;
                query_pass.begin_occlusion_query(slot as u32);
                query_pass.set_bind_group(0, &self.uniform_bind_group, &[dynamic_offset]);
                query_pass.draw(0..self.proxy_vertex_count, 0..1);
                query_pass.end_occlusion_query();
            }
        }

        // 5) Resolve the issued queries into a pooled readback buffer. The
        //    map is kicked off after submit and polled in later frames.
        let queries_issued = batch.len();
        let mut pending = None;
        if !batch.is_empty() {
            for &sphere_index in &batch {
                self.tracker.mark_issued(sphere_index);
            }
            match self
                .queries
                .resolve_batch(&self.device, &mut encoder, batch.clone())
            {
                Some(index) => pending = Some(index),
                None => self.tracker.abandon(&batch),
            }
        }

        self.queue.submit(iter::once(encoder.finish()));

        if let Some(index) = pending {
            self.queries.begin_map(index);
        }

        self.frame_index += 1;

        FrameReport {
            spheres: count,
            drawn,
            occluded: self.tracker.occluded_count(),
            queries_issued,
            results_consumed: drained.consumed,
            triangles: (self.num_indices as usize / 3) * count,
        }
    }
}

fn create_depth_view(device: &wgpu::Device, size: wgpu::Extent3d) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_size() {
        // Each slot must exactly fill one dynamic-offset stride.
        assert_eq!(std::mem::size_of::<Uniforms>(), UNIFORM_ALIGNMENT);
    }

    #[test]
    fn test_default_uniforms_identity() {
        let uniforms = Uniforms::new();
        assert_eq!(uniforms.view_proj, glam::Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(uniforms.color[0], 1.0);
    }
}
