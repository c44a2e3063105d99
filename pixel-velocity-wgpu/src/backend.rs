//! wgpu implementation of the velocity pass backend.
//!
//! A frame is replayed in two steps. Planning walks the recorded commands, validates every
//! handle and snapshots the uniforms of each draw into its own dynamic-offset slot. Encoding
//! then turns the plan into a single command buffer: consecutive draws share one render pass
//! on the current velocity buffer, blits become texture copies or shader blits.

use std::collections::HashMap;

use glam::{Mat4, Vec4};
use pixel_velocity_gpu_shared::shaders;
use pixel_velocity_gpu_shared::uniforms::{sprite_quad, SpriteVertex, VelocityDrawUniforms, DRAW_UNIFORM_STRIDE};
use pixel_velocity_render::{
    BufferRole, ColorTargetHandle, CommandBuffer, FrameCommand, FrameResources, MaterialHandle, MeshHandle,
    RenderBackend, Result, ShaderId, TargetAllocator, TargetDescriptor, TargetRef, VelocityError, Viewport,
    VELOCITY_FORMAT,
};
use wgpu::util::DeviceExt;

use crate::handle::HandleStore;
use crate::passes::{blit, velocity};
use crate::pipeline;
use crate::render_targets::{self, RenderTexture};

const INITIAL_DRAW_SLOTS: u64 = 64;

/// GPU mesh with vertex and index buffers.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Drawn as a screen-covering triangle by `DrawFullscreen`.
    Fullscreen,
    /// Drawn with a renderer's mesh by `DrawRenderer`.
    Mesh,
}

pub struct GpuMaterial {
    pub pipeline: wgpu::RenderPipeline,
    pub kind: MaterialKind,
    pub label: String,
}

/// Values published through `SetGlobalVector` / `SetGlobalTexture`, by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedGlobals {
    vectors: HashMap<ShaderId, Vec4>,
    textures: HashMap<ShaderId, BufferRole>,
}

impl PublishedGlobals {
    pub fn vector(&self, id: ShaderId) -> Option<Vec4> {
        self.vectors.get(&id).copied()
    }

    /// Role of the velocity buffer bound to `id`.
    pub fn texture(&self, id: ShaderId) -> Option<BufferRole> {
        self.textures.get(&id).copied()
    }

    fn vector_or_zero(&self, id: ShaderId) -> [f32; 4] {
        self.vector(id).unwrap_or(Vec4::ZERO).to_array()
    }

    fn draw_uniforms(&self, view: &Mat4, projection: &Mat4, model: &Mat4, object_params: Vec4) -> VelocityDrawUniforms {
        VelocityDrawUniforms {
            camera_position_delta: self.vector_or_zero(ShaderId::CameraPositionDelta),
            simulation_params: self.vector_or_zero(ShaderId::VelocitySimulationParams),
            pixel_screen_params: self.vector_or_zero(ShaderId::PixelScreenParams),
            object_params: object_params.to_array(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
        }
    }
}

struct DrawOp {
    material: MaterialHandle,
    mesh: Option<MeshHandle>,
    slot: u32,
    viewport: Option<Viewport>,
}

enum GpuOp {
    PushDebugGroup(&'static str),
    PopDebugGroup,
    Draw(DrawOp),
    Blit { source: TargetRef, destination: TargetRef },
}

struct FramePlan {
    ops: Vec<GpuOp>,
    uniforms: Vec<VelocityDrawUniforms>,
    globals: PublishedGlobals,
}

fn create_uniform_buffer(device: &wgpu::Device, slots: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Velocity Draw Uniforms"),
        size: slots * DRAW_UNIFORM_STRIDE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Clip `viewport` to a `width` x `height` target.
fn clamp_viewport(viewport: Viewport, width: u32, height: u32) -> Viewport {
    let (w, h) = (width as f32, height as f32);
    let x = viewport.x.clamp(0.0, w);
    let y = viewport.y.clamp(0.0, h);
    Viewport {
        x,
        y,
        width: viewport.width.clamp(0.0, w - x),
        height: viewport.height.clamp(0.0, h - y),
    }
}

fn require_current(target: Option<TargetRef>) -> Result<()> {
    match target {
        Some(TargetRef::Velocity(BufferRole::Current)) => Ok(()),
        Some(other) => Err(VelocityError::backend(format!(
            "draws must target the current velocity buffer, not {other:?}"
        ))),
        None => Err(VelocityError::backend("draw issued before any render target was set")),
    }
}

pub struct WgpuVelocityBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    meshes: HandleStore<GpuMesh>,
    materials: HandleStore<GpuMaterial>,
    color_targets: HandleStore<RenderTexture>,

    velocity_bgl: wgpu::BindGroupLayout,
    preview_bgl: wgpu::BindGroupLayout,
    preview_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    uniform_slots: u64,

    globals: PublishedGlobals,
    blit_material: MaterialHandle,
    emitter_material: MaterialHandle,
    submissions: u64,
}

impl WgpuVelocityBackend {
    /// Wrap an existing device and register the built-in blit and emitter materials.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        let velocity_bgl = pipeline::create_velocity_bgl(&device);
        let preview_bgl = pipeline::create_preview_bgl(&device);
        let uniform_buffer = create_uniform_buffer(&device, INITIAL_DRAW_SLOTS);

        let mut backend = Self {
            device,
            queue,
            meshes: HandleStore::new(),
            materials: HandleStore::new(),
            color_targets: HandleStore::new(),
            velocity_bgl,
            preview_bgl,
            preview_pipelines: HashMap::new(),
            uniform_buffer,
            uniform_slots: INITIAL_DRAW_SLOTS,
            globals: PublishedGlobals::default(),
            blit_material: MaterialHandle(0),
            emitter_material: MaterialHandle(0),
            submissions: 0,
        };

        backend.blit_material =
            backend.register_fullscreen_material("Velocity Blit", shaders::VELOCITY_BLIT_FRAG, "fs_main")?;
        backend.emitter_material =
            backend.register_mesh_material("Velocity Emitter", shaders::VELOCITY_EMITTER_SHADER)?;
        Ok(backend)
    }

    /// Create a device without a surface.
    pub fn new_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| VelocityError::backend("Failed to find suitable GPU adapter"))?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Pixel Velocity Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| VelocityError::backend(format!("Failed to create device: {e}")))?;

        Self::new(device, queue)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Built-in base-pass material: decays and reprojects the previous buffer.
    pub fn blit_material(&self) -> MaterialHandle {
        self.blit_material
    }

    /// Built-in emitter override material: writes the renderable's params.
    pub fn emitter_material(&self) -> MaterialHandle {
        self.emitter_material
    }

    pub fn globals(&self) -> &PublishedGlobals {
        &self.globals
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Run `create` inside a validation error scope.
    fn validated<T>(&self, label: &str, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(VelocityError::backend(format!("{label}: {err}"))),
            None => Ok(value),
        }
    }

    /// Compile a fullscreen material from a WGSL fragment shader. The velocity prelude
    /// (`draw_data`, `previous_velocity_texture`, `velocity_sampler`) is prepended.
    pub fn register_fullscreen_material(&mut self, label: &str, frag_source: &str, entry: &str) -> Result<MaterialHandle> {
        let source = shaders::with_prelude(frag_source);
        let pipeline = self.validated(label, |device| {
            pipeline::create_fullscreen_material_pipeline(
                device,
                label,
                &source,
                entry,
                &self.velocity_bgl,
                VELOCITY_FORMAT,
            )
        })?;
        let handle = self.materials.insert(GpuMaterial {
            pipeline,
            kind: MaterialKind::Fullscreen,
            label: label.to_string(),
        });
        log::debug!("Registered fullscreen material {label} as {handle}");
        Ok(MaterialHandle(handle))
    }

    /// Compile a mesh material. `source` provides `vs_main` and `fs_main` over [`SpriteVertex`].
    pub fn register_mesh_material(&mut self, label: &str, source: &str) -> Result<MaterialHandle> {
        let source = shaders::with_prelude(source);
        let pipeline = self.validated(label, |device| {
            pipeline::create_mesh_material_pipeline(device, label, &source, &self.velocity_bgl, VELOCITY_FORMAT)
        })?;
        let handle = self.materials.insert(GpuMaterial {
            pipeline,
            kind: MaterialKind::Mesh,
            label: label.to_string(),
        });
        log::debug!("Registered mesh material {label} as {handle}");
        Ok(MaterialHandle(handle))
    }

    pub fn upload_mesh(&mut self, vertices: &[SpriteVertex], indices: &[u32]) -> MeshHandle {
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sprite VBO"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sprite IBO"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        MeshHandle(self.meshes.insert(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }))
    }

    /// Quad of `half_width` x `half_height` world units centred on the object origin.
    pub fn upload_sprite_quad(&mut self, half_width: f32, half_height: f32) -> MeshHandle {
        let (vertices, indices) = sprite_quad(half_width, half_height);
        self.upload_mesh(&vertices, &indices)
    }

    pub fn remove_mesh(&mut self, mesh: MeshHandle) -> bool {
        self.meshes.remove(mesh.0).is_some()
    }

    pub fn create_color_target(&mut self, width: u32, height: u32, format: wgpu::TextureFormat) -> ColorTargetHandle {
        let target = render_targets::create_color_target(&self.device, width, height, format);
        ColorTargetHandle(self.color_targets.insert(target))
    }

    pub fn remove_color_target(&mut self, handle: ColorTargetHandle) -> bool {
        self.color_targets.remove(handle.0).is_some()
    }

    pub fn color_target(&self, handle: ColorTargetHandle) -> Option<&RenderTexture> {
        self.color_targets.get(handle.0)
    }

    /// Blocking read-back of a velocity target.
    pub fn read_velocity(&self, target: &RenderTexture) -> Result<Vec<Vec4>> {
        render_targets::read_texture(&self.device, &self.queue, target)
    }

    /// Blocking read-back of a host colour target.
    pub fn read_color_target(&self, handle: ColorTargetHandle) -> Result<Vec<Vec4>> {
        let target = self.color_targets.get(handle.0).ok_or(VelocityError::UnknownHandle {
            kind: "color target",
            handle: handle.0,
        })?;
        render_targets::read_texture(&self.device, &self.queue, target)
    }

    fn resolve<'a>(&'a self, target: TargetRef, frame: &FrameResources<'a, RenderTexture>) -> Result<&'a RenderTexture> {
        match target {
            TargetRef::Velocity(role) => Ok(frame.velocity(role)),
            TargetRef::HostColor(handle) => self.color_targets.get(handle.0).ok_or(VelocityError::UnknownHandle {
                kind: "color target",
                handle: handle.0,
            }),
        }
    }

    fn material(&self, handle: MaterialHandle, kind: MaterialKind, usage: &'static str) -> Result<&GpuMaterial> {
        let material = self.materials.get(handle.0).ok_or(VelocityError::UnknownHandle {
            kind: "material",
            handle: handle.0,
        })?;
        if material.kind != kind {
            return Err(VelocityError::MaterialKind {
                handle: handle.0,
                usage,
            });
        }
        Ok(material)
    }

    fn ensure_preview_pipeline(&mut self, format: wgpu::TextureFormat) {
        let Self {
            device,
            preview_bgl,
            preview_pipelines,
            ..
        } = self;
        preview_pipelines.entry(format).or_insert_with(|| {
            log::debug!("Creating preview blit pipeline for {format:?}");
            pipeline::create_preview_pipeline(device, preview_bgl, format)
        });
    }

    fn ensure_uniform_capacity(&mut self, slots: u64) {
        if slots <= self.uniform_slots {
            return;
        }
        let grown = slots.next_power_of_two();
        log::debug!("Growing draw uniforms from {} to {grown} slots", self.uniform_slots);
        self.uniform_buffer = create_uniform_buffer(&self.device, grown);
        self.uniform_slots = grown;
    }

    fn plan(&mut self, commands: &CommandBuffer, frame: &FrameResources<'_, RenderTexture>) -> Result<FramePlan> {
        let mut globals = self.globals.clone();
        let mut ops = Vec::with_capacity(commands.len());
        let mut uniforms = Vec::new();

        let mut target = None;
        let mut view = Mat4::IDENTITY;
        let mut projection = Mat4::IDENTITY;
        let mut viewport = None;

        for command in commands.commands() {
            match command {
                FrameCommand::BeginSample(name) => ops.push(GpuOp::PushDebugGroup(*name)),
                FrameCommand::EndSample(_) => ops.push(GpuOp::PopDebugGroup),
                FrameCommand::SetGlobalVector { id, value } => {
                    globals.vectors.insert(*id, *value);
                }
                FrameCommand::SetGlobalTexture { id, role } => {
                    globals.textures.insert(*id, *role);
                }
                FrameCommand::SetRenderTarget(t) => {
                    self.resolve(*t, frame)?;
                    target = Some(*t);
                    viewport = None;
                }
                FrameCommand::SetViewProjection { view: v, projection: p } => {
                    view = *v;
                    projection = *p;
                }
                FrameCommand::SetViewport(vp) => viewport = Some(*vp),
                FrameCommand::DrawFullscreen { material, .. } => {
                    require_current(target)?;
                    self.material(*material, MaterialKind::Fullscreen, "fullscreen draws")?;
                    let slot = uniforms.len() as u32;
                    uniforms.push(globals.draw_uniforms(&view, &projection, &Mat4::IDENTITY, Vec4::ZERO));
                    ops.push(GpuOp::Draw(DrawOp {
                        material: *material,
                        mesh: None,
                        slot,
                        viewport,
                    }));
                }
                FrameCommand::DrawRenderer { index, material } => {
                    require_current(target)?;
                    let renderable = frame
                        .renderables
                        .get(*index)
                        .ok_or_else(|| VelocityError::backend(format!("draw set has no entry {index}")))?;
                    self.material(*material, MaterialKind::Mesh, "renderer draws")?;
                    if !self.meshes.contains(renderable.mesh.0) {
                        return Err(VelocityError::UnknownHandle {
                            kind: "mesh",
                            handle: renderable.mesh.0,
                        });
                    }
                    let slot = uniforms.len() as u32;
                    uniforms.push(globals.draw_uniforms(&view, &projection, &renderable.model, renderable.params));
                    ops.push(GpuOp::Draw(DrawOp {
                        material: *material,
                        mesh: Some(renderable.mesh),
                        slot,
                        viewport,
                    }));
                }
                FrameCommand::Blit { source, destination } => {
                    if source == destination {
                        return Err(VelocityError::backend(format!("blit from {source:?} onto itself")));
                    }
                    let src = self.resolve(*source, frame)?;
                    let dst = self.resolve(*destination, frame)?;
                    let needs_shader = !blit::can_copy(src, dst);
                    let format = dst.format;
                    if needs_shader {
                        self.ensure_preview_pipeline(format);
                    }
                    ops.push(GpuOp::Blit {
                        source: *source,
                        destination: *destination,
                    });
                }
            }
        }

        Ok(FramePlan {
            ops,
            uniforms,
            globals,
        })
    }

    fn encode(&self, label: &str, ops: &[GpuOp], frame: &FrameResources<'_, RenderTexture>) -> Result<wgpu::CommandBuffer> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Velocity Bind Group"),
            layout: &self.velocity_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(DRAW_UNIFORM_STRIDE),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&frame.previous.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&frame.previous.sampler),
                },
            ],
        });

        let mut i = 0;
        while i < ops.len() {
            match &ops[i] {
                GpuOp::PushDebugGroup(name) => encoder.push_debug_group(name),
                GpuOp::PopDebugGroup => encoder.pop_debug_group(),
                GpuOp::Blit { source, destination } => self.encode_blit(&mut encoder, *source, *destination, frame)?,
                GpuOp::Draw(_) => {
                    let run = ops[i..].iter().take_while(|op| matches!(op, GpuOp::Draw(_))).count();
                    self.encode_draws(&mut encoder, &ops[i..i + run], frame.current, &bind_group)?;
                    i += run;
                    continue;
                }
            }
            i += 1;
        }

        Ok(encoder.finish())
    }

    fn encode_draws(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ops: &[GpuOp],
        current: &RenderTexture,
        bind_group: &wgpu::BindGroup,
    ) -> Result<()> {
        let mut pass = velocity::begin_velocity_pass(encoder, &current.view);
        for op in ops {
            let GpuOp::Draw(draw) = op else { continue };
            let material = self.materials.get(draw.material.0).ok_or(VelocityError::UnknownHandle {
                kind: "material",
                handle: draw.material.0,
            })?;

            pass.set_pipeline(&material.pipeline);
            pass.set_bind_group(0, bind_group, &[draw.slot * DRAW_UNIFORM_STRIDE as u32]);
            let vp = clamp_viewport(
                draw.viewport.unwrap_or(Viewport::full(current.width, current.height)),
                current.width,
                current.height,
            );
            pass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);

            match draw.mesh {
                None => pass.draw(0..3, 0..1),
                Some(handle) => {
                    let mesh = self.meshes.get(handle.0).ok_or(VelocityError::UnknownHandle {
                        kind: "mesh",
                        handle: handle.0,
                    })?;
                    pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }
        Ok(())
    }

    fn encode_blit(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: TargetRef,
        destination: TargetRef,
        frame: &FrameResources<'_, RenderTexture>,
    ) -> Result<()> {
        let src = self.resolve(source, frame)?;
        let dst = self.resolve(destination, frame)?;
        if blit::can_copy(src, dst) {
            blit::copy_target(encoder, src, dst);
            return Ok(());
        }

        let pipeline = self
            .preview_pipelines
            .get(&dst.format)
            .ok_or_else(|| VelocityError::backend(format!("no blit pipeline for {:?}", dst.format)))?;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Velocity Blit Bind Group"),
            layout: &self.preview_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&src.sampler),
                },
            ],
        });
        blit::render_blit_pass(encoder, dst, pipeline, &bind_group);
        Ok(())
    }
}

impl TargetAllocator for WgpuVelocityBackend {
    type Target = RenderTexture;

    fn allocate(&mut self, desc: &TargetDescriptor) -> RenderTexture {
        log::debug!("Allocating {} ({}x{} {:?})", desc.label, desc.width, desc.height, desc.format);
        render_targets::create_velocity_texture(&self.device, desc)
    }
}

impl RenderBackend for WgpuVelocityBackend {
    fn submit(&mut self, commands: &CommandBuffer, frame: &FrameResources<'_, RenderTexture>) -> Result<()> {
        let plan = self.plan(commands, frame)?;

        self.ensure_uniform_capacity(plan.uniforms.len() as u64);
        if !plan.uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&plan.uniforms));
        }

        let command_buffer = self.encode(commands.name(), &plan.ops, frame)?;
        self.queue.submit(std::iter::once(command_buffer));

        self.globals = plan.globals;
        self.submissions += 1;
        log::trace!(
            "Submitted {} ({} ops, {} draw slots)",
            commands.name(),
            plan.ops.len(),
            plan.uniforms.len()
        );
        Ok(())
    }
}
