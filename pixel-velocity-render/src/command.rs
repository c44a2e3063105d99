//! Recorded GPU work for one frame.
//!
//! The pass never touches the GPU API. It records commands in program order and the backend
//! replays them; the order is the contract.

use std::ops::{Deref, DerefMut};

use glam::{Mat4, Vec4};

use crate::ids::ShaderId;
use crate::renderable::{ColorTargetHandle, MaterialHandle};
use crate::targets::BufferRole;

/// A render destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRef {
    Velocity(BufferRole),
    HostColor(ColorTargetHandle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Viewport covering a `width` x `height` target.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameCommand {
    BeginSample(&'static str),
    EndSample(&'static str),
    SetGlobalVector { id: ShaderId, value: Vec4 },
    SetGlobalTexture { id: ShaderId, role: BufferRole },
    SetRenderTarget(TargetRef),
    SetViewProjection { view: Mat4, projection: Mat4 },
    SetViewport(Viewport),
    /// Screen-covering primitive with `material`.
    DrawFullscreen { material: MaterialHandle, submesh: u32, pass: u32 },
    /// Entry `index` of the frame's draw set, drawn with `material`.
    DrawRenderer { index: usize, material: MaterialHandle },
    /// Whole-image copy.
    Blit { source: TargetRef, destination: TargetRef },
}

#[derive(Debug, Default)]
pub struct CommandBuffer {
    name: &'static str,
    commands: Vec<FrameCommand>,
}

impl CommandBuffer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            commands: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn commands(&self) -> &[FrameCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn push(&mut self, command: FrameCommand) {
        self.commands.push(command);
    }

    pub fn set_global_vector(&mut self, id: ShaderId, value: Vec4) {
        self.push(FrameCommand::SetGlobalVector { id, value });
    }

    pub fn set_global_texture(&mut self, id: ShaderId, role: BufferRole) {
        self.push(FrameCommand::SetGlobalTexture { id, role });
    }

    pub fn set_render_target(&mut self, target: TargetRef) {
        self.push(FrameCommand::SetRenderTarget(target));
    }

    pub fn set_view_projection(&mut self, view: Mat4, projection: Mat4) {
        self.push(FrameCommand::SetViewProjection { view, projection });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.push(FrameCommand::SetViewport(viewport));
    }

    pub fn draw_fullscreen(&mut self, material: MaterialHandle, submesh: u32, pass: u32) {
        self.push(FrameCommand::DrawFullscreen {
            material,
            submesh,
            pass,
        });
    }

    pub fn draw_renderer(&mut self, index: usize, material: MaterialHandle) {
        self.push(FrameCommand::DrawRenderer { index, material });
    }

    pub fn blit(&mut self, source: TargetRef, destination: TargetRef) {
        self.push(FrameCommand::Blit {
            source,
            destination,
        });
    }

    /// Open a profiling sample closed when the returned guard drops.
    pub fn profiling_scope(&mut self, name: &'static str) -> ProfilingScope<'_> {
        self.push(FrameCommand::BeginSample(name));
        ProfilingScope { buffer: self, name }
    }

    /// Number of `DrawRenderer` commands.
    pub fn renderer_draws(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, FrameCommand::DrawRenderer { .. }))
            .count()
    }
}

/// Guard returned by [`CommandBuffer::profiling_scope`].
pub struct ProfilingScope<'a> {
    buffer: &'a mut CommandBuffer,
    name: &'static str,
}

impl Deref for ProfilingScope<'_> {
    type Target = CommandBuffer;

    fn deref(&self) -> &CommandBuffer {
        &*self.buffer
    }
}

impl DerefMut for ProfilingScope<'_> {
    fn deref_mut(&mut self) -> &mut CommandBuffer {
        &mut *self.buffer
    }
}

impl Drop for ProfilingScope<'_> {
    fn drop(&mut self) {
        self.buffer.push(FrameCommand::EndSample(self.name));
    }
}

/// Reuses command buffers across frames so their storage is allocated once.
#[derive(Debug, Default)]
pub struct CommandBufferPool {
    free: Vec<CommandBuffer>,
    created: usize,
}

impl CommandBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty buffer named `name`.
    pub fn get(&mut self, name: &'static str) -> CommandBuffer {
        match self.free.pop() {
            Some(mut buffer) => {
                buffer.clear();
                buffer.name = name;
                buffer
            }
            None => {
                self.created += 1;
                CommandBuffer::new(name)
            }
        }
    }

    pub fn release(&mut self, mut buffer: CommandBuffer) {
        buffer.clear();
        self.free.push(buffer);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Buffers ever created by this pool.
    pub fn created(&self) -> usize {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiling_scope_brackets_commands() {
        let mut cmd = CommandBuffer::new("test");
        {
            let mut scope = cmd.profiling_scope("Velocity");
            scope.set_viewport(Viewport::full(4, 4));
        }
        assert_eq!(
            cmd.commands(),
            &[
                FrameCommand::BeginSample("Velocity"),
                FrameCommand::SetViewport(Viewport::full(4, 4)),
                FrameCommand::EndSample("Velocity"),
            ]
        );
    }

    #[test]
    fn pool_reuses_cleared_buffers() {
        let mut pool = CommandBufferPool::new();
        let mut cmd = pool.get("a");
        cmd.draw_renderer(0, MaterialHandle(1));
        pool.release(cmd);
        assert_eq!(pool.available(), 1);

        let cmd = pool.get("b");
        assert!(cmd.is_empty());
        assert_eq!(cmd.name(), "b");
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn counts_renderer_draws_only() {
        let mut cmd = CommandBuffer::new("test");
        cmd.draw_fullscreen(MaterialHandle(1), 0, 0);
        cmd.draw_renderer(0, MaterialHandle(2));
        cmd.draw_renderer(1, MaterialHandle(2));
        assert_eq!(cmd.renderer_draws(), 2);
    }
}
