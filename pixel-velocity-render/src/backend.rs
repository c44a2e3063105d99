//! The seam between the pass and a graphics API.

use crate::command::CommandBuffer;
use crate::error::Result;
use crate::renderable::Renderable;
use crate::targets::{BufferRole, TargetAllocator};

/// Everything a backend needs besides the commands to replay one frame.
pub struct FrameResources<'a, T> {
    pub current: &'a T,
    pub previous: &'a T,
    /// Draw set indexed by `FrameCommand::DrawRenderer`.
    pub renderables: &'a [Renderable],
}

impl<'a, T> FrameResources<'a, T> {
    pub fn velocity(&self, role: BufferRole) -> &'a T {
        match role {
            BufferRole::Current => self.current,
            BufferRole::Previous => self.previous,
        }
    }
}

/// A graphics backend: allocates velocity targets and replays recorded frames.
///
/// `submit` must execute the commands in order. GPU execution itself may be deferred.
pub trait RenderBackend: TargetAllocator {
    fn submit(&mut self, commands: &CommandBuffer, frame: &FrameResources<'_, Self::Target>) -> Result<()>;
}
