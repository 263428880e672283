use anyhow::{bail, Result};
use wgpu::util::DeviceExt;

use crate::fractal::{Bounds, DrawInstanced, InstanceBackend, InstanceMatrix};
use crate::render::{RenderCtx, RenderTarget};

use super::camera::{Camera, CameraUniform};
use super::material::{Material, MaterialId, MaterialUniform};
use super::mesh::{Mesh, MeshId, MeshVertex};
use super::queue::DrawQueue;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// GPU buffer holding one level's instance matrices.
#[derive(Debug)]
pub struct InstanceBuffer {
    id: u64,
    buffer: wgpu::Buffer,
    len: usize,
}

struct GpuMesh {
    vbo: wgpu::Buffer,
    ibo: wgpu::Buffer,
    index_count: u32,
}

struct GpuMaterial {
    _ubo: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct PendingDraw {
    instances: wgpu::Buffer,
    instance_count: u32,
    mesh: MeshId,
    material: MaterialId,
    bounds: Bounds,
}

struct DepthTarget {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Renderer for instanced meshes driven by per-level instance buffers.
///
/// Implements [`InstanceBackend`]: draw requests are queued while the fractal
/// is drawn and recorded by [`render`](Self::render) into a single pass. Draws
/// whose bounds fall outside the camera frustum are skipped.
pub struct InstancedMeshRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,

    pipeline_format: Option<wgpu::TextureFormat>,
    pipeline: Option<wgpu::RenderPipeline>,

    camera: Camera,
    camera_ubo: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    camera_bgl: wgpu::BindGroupLayout,
    material_bgl: wgpu::BindGroupLayout,

    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
    depth: Option<DepthTarget>,

    pending: DrawQueue<PendingDraw>,
    next_buffer_id: u64,
}

impl InstancedMeshRenderer {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let camera_bgl = uniform_bgl(
            device,
            "fractal camera bgl",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            size_of_nonzero::<CameraUniform>(),
        );
        let material_bgl = uniform_bgl(
            device,
            "fractal material bgl",
            wgpu::ShaderStages::FRAGMENT,
            size_of_nonzero::<MaterialUniform>(),
        );

        let camera_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractal camera ubo"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal camera bind group"),
            layout: &camera_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_ubo.as_entire_binding(),
            }],
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline_format: None,
            pipeline: None,
            camera: Camera::default(),
            camera_ubo,
            camera_bind_group,
            camera_bgl,
            material_bgl,
            meshes: Vec::new(),
            materials: Vec::new(),
            depth: None,
            pending: DrawQueue::default(),
            next_buffer_id: 0,
        }
    }

    /// Uploads `mesh` and returns its handle.
    pub fn add_mesh(&mut self, mesh: &Mesh) -> Result<MeshId> {
        if mesh.indices.is_empty() {
            bail!("mesh has no triangles");
        }
        let id = MeshId(self.meshes.len() as u32);

        let vbo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fractal mesh vbo"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Index buffers must be 4-byte aligned in size.
        let mut indices = mesh.indices.clone();
        if indices.len() % 2 == 1 {
            indices.push(0);
        }
        let ibo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fractal mesh ibo"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        self.meshes.push(GpuMesh {
            vbo,
            ibo,
            index_count: mesh.index_count(),
        });
        log::debug!(
            "mesh {id:?} uploaded: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(id)
    }

    /// Registers `material` and returns its handle.
    pub fn add_material(&mut self, material: &Material) -> MaterialId {
        let id = MaterialId(self.materials.len() as u32);

        let ubo = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fractal material ubo"),
            contents: bytemuck::bytes_of(&MaterialUniform::from(material)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal material bind group"),
            layout: &self.material_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            }],
        });

        self.materials.push(GpuMaterial { _ubo: ubo, bind_group });
        id
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Records all queued draws into one depth-tested pass and clears the queue.
    ///
    /// Skipping this for a frame is harmless: each instance buffer keeps only
    /// its most recent draw request.
    pub fn render(&mut self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>) {
        if self.pending.is_empty() {
            return;
        }

        self.ensure_pipeline(ctx);
        self.ensure_depth(ctx);

        let aspect = ctx.aspect();
        ctx.queue
            .write_buffer(&self.camera_ubo, 0, bytemuck::bytes_of(&self.camera.uniform(aspect)));

        let pending = self.pending.take();

        let Some(pipeline) = self.pipeline.as_ref() else { return };
        let Some(depth) = self.depth.as_ref() else { return };

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("fractal instanced pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &self.camera_bind_group, &[]);

        let mut culled = 0usize;
        for draw in &pending {
            if !self.camera.sees(&draw.bounds, aspect) {
                culled += 1;
                continue;
            }
            let (Some(mesh), Some(material)) = (
                self.meshes.get(draw.mesh.0 as usize),
                self.materials.get(draw.material.0 as usize),
            ) else {
                log::warn!("skipping draw with unknown {:?} / {:?}", draw.mesh, draw.material);
                continue;
            };

            rpass.set_bind_group(1, &material.bind_group, &[]);
            rpass.set_vertex_buffer(0, mesh.vbo.slice(..));
            rpass.set_vertex_buffer(1, draw.instances.slice(..));
            rpass.set_index_buffer(mesh.ibo.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..mesh.index_count, 0, 0..draw.instance_count);
        }

        log::trace!("instanced pass: {} draws, {culled} culled", pending.len());
    }

    // ── private helpers ────────────────────────────────────────────────────

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline_format == Some(ctx.surface_format) && self.pipeline.is_some() {
            return;
        }

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fractal instanced mesh shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/instanced_mesh.wgsl").into()),
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fractal instanced pipeline layout"),
            bind_group_layouts: &[&self.camera_bgl, &self.material_bgl],
            immediate_size: 0,
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("fractal instanced pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[MeshVertex::layout(), instance_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        self.pipeline_format = Some(ctx.surface_format);
        self.pipeline = Some(pipeline);
    }

    fn ensure_depth(&mut self, ctx: &RenderCtx<'_>) {
        let (width, height) = (ctx.width.max(1), ctx.height.max(1));
        if self
            .depth
            .as_ref()
            .is_some_and(|d| d.width == width && d.height == height)
        {
            return;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fractal depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.depth = Some(DepthTarget { view, width, height });
    }
}

impl InstanceBackend for InstancedMeshRenderer {
    type Buffer = InstanceBuffer;

    fn create_instance_buffer(&mut self, level: usize, len: usize) -> Result<InstanceBuffer> {
        let size = (len as u64).saturating_mul(InstanceMatrix::SIZE as u64);
        let max = self.device.limits().max_buffer_size;
        if size == 0 || size > max {
            bail!("level {level} needs a {size}-byte instance buffer (device limit {max})");
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("fractal level {level} instances")),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        log::debug!("instance buffer {id} for level {level}: {len} instances, {size} bytes");

        Ok(InstanceBuffer { id, buffer, len })
    }

    fn upload_instances(&mut self, buffer: &InstanceBuffer, matrices: &[InstanceMatrix]) {
        debug_assert_eq!(buffer.len, matrices.len());
        self.queue
            .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(matrices));
    }

    fn draw_instanced(&mut self, buffer: &InstanceBuffer, draw: &DrawInstanced) {
        self.pending.push(
            buffer.id,
            PendingDraw {
                instances: buffer.buffer.clone(),
                instance_count: draw.instance_count,
                mesh: draw.mesh,
                material: draw.material,
                bounds: draw.bounds,
            },
        );
    }

    fn release_instance_buffer(&mut self, buffer: InstanceBuffer) {
        // A released buffer must not be drawn from later in this frame.
        self.pending.forget(buffer.id);
        buffer.buffer.destroy();
        log::debug!("instance buffer {} released", buffer.id);
    }
}

// ── GPU types ─────────────────────────────────────────────────────────────

/// Vertex-buffer view of [`InstanceMatrix`] (48 bytes, step mode Instance):
///
///  offset  0  col0         [f32; 3]   loc 2
///  offset 12  col1         [f32; 3]   loc 3
///  offset 24  col2         [f32; 3]   loc 4
///  offset 36  translation  [f32; 3]   loc 5
const INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    2 => Float32x3, // col0
    3 => Float32x3, // col1
    4 => Float32x3, // col2
    5 => Float32x3  // translation
];

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: InstanceMatrix::SIZE as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRS,
    }
}

fn uniform_bgl(
    device: &wgpu::Device,
    label: &str,
    visibility: wgpu::ShaderStages,
    min_size: std::num::NonZeroU64,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: Some(min_size),
            },
            count: None,
        }],
    })
}

/// Minimum binding size for a uniform struct.
fn size_of_nonzero<T>() -> std::num::NonZeroU64 {
    std::num::NonZeroU64::new(std::mem::size_of::<T>() as u64)
        .expect("uniform structs have non-zero size by construction")
}
