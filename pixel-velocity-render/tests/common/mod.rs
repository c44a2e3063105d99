//! CPU reference backend.
//!
//! Replays frame commands on `Vec4` images. The blit material decays the previous buffer by
//! `_PG_VelocitySimulationParams.x`; renderer draws write the object's params into the single
//! pixel under the object's origin.

#![allow(dead_code)]

use std::collections::HashMap;

use glam::{Mat4, Vec4};
use pixel_velocity_render::{
    BufferRole, ColorTargetHandle, CommandBuffer, FrameCommand, FrameResources, MaterialHandle,
    RenderBackend, Result, ShaderId, TargetAllocator, TargetDescriptor, TargetRef, VelocityError,
};

pub const EMITTER_MATERIAL: MaterialHandle = MaterialHandle(1);
pub const BLIT_MATERIAL: MaterialHandle = MaterialHandle(2);

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec4>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    fn set(&mut self, x: u32, y: u32, value: Vec4) {
        self.pixels[(y * self.width + x) as usize] = value;
    }

    /// Nearest-neighbour resample.
    fn resampled(&self, width: u32, height: u32) -> Image {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let mut out = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let sx = (x * self.width / width.max(1)).min(self.width.saturating_sub(1));
                let sy = (y * self.height / height.max(1)).min(self.height.saturating_sub(1));
                out.set(x, y, self.get(sx, sy));
            }
        }
        out
    }

    pub fn is_zero(&self) -> bool {
        self.pixels.iter().all(|p| *p == Vec4::ZERO)
    }
}

#[derive(Debug)]
pub struct SoftTarget(usize);

#[derive(Default)]
pub struct SoftBackend {
    velocity: Vec<Image>,
    hosts: HashMap<ColorTargetHandle, Image>,
    next_host: u64,
    pub globals: HashMap<ShaderId, Vec4>,
    pub submissions: Vec<Vec<FrameCommand>>,
    /// The previous buffer as the blit material saw it, one entry per frame.
    pub previous_at_base: Vec<Image>,
}

impl SoftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_host(&mut self, width: u32, height: u32) -> ColorTargetHandle {
        self.next_host += 1;
        let handle = ColorTargetHandle(self.next_host);
        self.hosts.insert(handle, Image::new(width, height));
        handle
    }

    pub fn host_image(&self, handle: ColorTargetHandle) -> Option<&Image> {
        self.hosts.get(&handle)
    }

    pub fn velocity_image(&self, target: &SoftTarget) -> &Image {
        &self.velocity[target.0]
    }

    pub fn allocations(&self) -> usize {
        self.velocity.len()
    }

    pub fn global(&self, id: ShaderId) -> Option<Vec4> {
        self.globals.get(&id).copied()
    }

    fn image(&self, target: TargetRef, frame: &FrameResources<'_, SoftTarget>) -> Result<&Image> {
        match target {
            TargetRef::Velocity(role) => Ok(&self.velocity[frame.velocity(role).0]),
            TargetRef::HostColor(handle) => self.hosts.get(&handle).ok_or(VelocityError::UnknownHandle {
                kind: "color target",
                handle: handle.0,
            }),
        }
    }

    fn image_mut(&mut self, target: TargetRef, frame: &FrameResources<'_, SoftTarget>) -> Result<&mut Image> {
        match target {
            TargetRef::Velocity(role) => Ok(&mut self.velocity[frame.velocity(role).0]),
            TargetRef::HostColor(handle) => self.hosts.get_mut(&handle).ok_or(VelocityError::UnknownHandle {
                kind: "color target",
                handle: handle.0,
            }),
        }
    }
}

impl TargetAllocator for SoftBackend {
    type Target = SoftTarget;

    fn allocate(&mut self, desc: &TargetDescriptor) -> SoftTarget {
        self.velocity.push(Image::new(desc.width, desc.height));
        SoftTarget(self.velocity.len() - 1)
    }
}

impl RenderBackend for SoftBackend {
    fn submit(&mut self, commands: &CommandBuffer, frame: &FrameResources<'_, SoftTarget>) -> Result<()> {
        let mut target: Option<TargetRef> = None;
        let mut view = Mat4::IDENTITY;
        let mut projection = Mat4::IDENTITY;
        let mut open_samples = 0i32;

        for command in commands.commands() {
            match command {
                FrameCommand::BeginSample(_) => open_samples += 1,
                FrameCommand::EndSample(_) => open_samples -= 1,
                FrameCommand::SetGlobalVector { id, value } => {
                    self.globals.insert(*id, *value);
                }
                FrameCommand::SetGlobalTexture { .. } | FrameCommand::SetViewport(_) => {}
                FrameCommand::SetRenderTarget(t) => target = Some(*t),
                FrameCommand::SetViewProjection { view: v, projection: p } => {
                    view = *v;
                    projection = *p;
                }
                FrameCommand::DrawFullscreen { material, .. } => {
                    if *material != BLIT_MATERIAL {
                        return Err(VelocityError::MaterialKind {
                            handle: material.0,
                            usage: "fullscreen draw",
                        });
                    }
                    let dest = target.ok_or_else(|| VelocityError::backend("draw without a render target"))?;
                    let previous = self.image(TargetRef::Velocity(BufferRole::Previous), frame)?.clone();
                    let decay = self.global(ShaderId::VelocitySimulationParams).map_or(1.0, |v| v.x);
                    let image = self.image_mut(dest, frame)?;
                    let mut seeded = previous.resampled(image.width, image.height);
                    for pixel in &mut seeded.pixels {
                        *pixel *= decay;
                    }
                    *image = seeded;
                    self.previous_at_base.push(previous);
                }
                FrameCommand::DrawRenderer { index, .. } => {
                    let renderable = frame
                        .renderables
                        .get(*index)
                        .ok_or_else(|| VelocityError::backend(format!("no renderable {index}")))?;
                    let dest = target.ok_or_else(|| VelocityError::backend("draw without a render target"))?;
                    let clip = projection * view * renderable.model.w_axis;
                    let image = self.image_mut(dest, frame)?;
                    let x = ((clip.x * 0.5 + 0.5) * image.width as f32).floor();
                    let y = ((0.5 - clip.y * 0.5) * image.height as f32).floor();
                    if x >= 0.0 && y >= 0.0 && (x as u32) < image.width && (y as u32) < image.height {
                        image.set(x as u32, y as u32, renderable.params);
                    }
                }
                FrameCommand::Blit { source, destination } => {
                    let source = self.image(*source, frame)?.clone();
                    let image = self.image_mut(*destination, frame)?;
                    *image = source.resampled(image.width, image.height);
                }
            }
        }

        if open_samples != 0 {
            return Err(VelocityError::backend("unbalanced profiling samples"));
        }
        self.submissions.push(commands.commands().to_vec());
        Ok(())
    }
}
