//! Velocity render target allocation.
//!
//! The pass owns two equally sized targets addressed by role. Backends create the actual
//! textures through [`TargetAllocator`]; releasing a target is dropping its handle.

use crate::error::{Result, VelocityError};

/// 4 x 16-bit float, the only format velocity buffers use.
pub const VELOCITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const SLOT_LABELS: [&str; 2] = ["PG Velocity Target A", "PG Velocity Target B"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Written this frame.
    Current,
    /// What `Current` held at the end of the previous frame.
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetDescriptor {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub filter: wgpu::FilterMode,
    pub wrap: wgpu::AddressMode,
}

impl TargetDescriptor {
    /// Colour-only velocity target: bilinear, clamp to edge, no depth.
    pub fn velocity(label: &'static str, width: u32, height: u32) -> Self {
        Self {
            label,
            width,
            height,
            format: VELOCITY_FORMAT,
            filter: wgpu::FilterMode::Linear,
            wrap: wgpu::AddressMode::ClampToEdge,
        }
    }

    /// Whether a target created from `self` can be reused for `other`.
    pub fn is_compatible(&self, other: &TargetDescriptor) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }
}

/// Creates backend textures for render targets.
pub trait TargetAllocator {
    type Target;

    fn allocate(&mut self, desc: &TargetDescriptor) -> Self::Target;
}

/// An allocated target together with the descriptor it was created from.
#[derive(Debug)]
pub struct RenderTargetHandle<T> {
    target: T,
    desc: TargetDescriptor,
}

impl<T> RenderTargetHandle<T> {
    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn descriptor(&self) -> &TargetDescriptor {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }
}

/// Replace the target in `slot` unless it already matches `desc` in size and format.
/// Returns whether a new target was allocated.
pub fn reallocate_if_needed<A: TargetAllocator>(
    slot: &mut Option<RenderTargetHandle<A::Target>>,
    desc: &TargetDescriptor,
    allocator: &mut A,
) -> bool {
    if let Some(existing) = slot.as_ref() {
        if existing.desc.is_compatible(desc) {
            return false;
        }
    }

    if let Some(old) = slot.take() {
        log::debug!(
            "Releasing {} ({}x{}) for {}x{}",
            old.desc.label,
            old.desc.width,
            old.desc.height,
            desc.width,
            desc.height
        );
    }

    let target = allocator.allocate(desc);
    *slot = Some(RenderTargetHandle { target, desc: *desc });
    true
}

/// Drop the target in `slot`, if any. Safe on an empty slot.
pub fn release<T>(slot: &mut Option<RenderTargetHandle<T>>) -> bool {
    slot.take().is_some()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// `reallocate_if_needed` calls.
    pub requests: u64,
    /// Calls that created a new target.
    pub allocations: u64,
    pub releases: u64,
}

/// Current/previous velocity buffers as two slots and a front index.
///
/// Both slots are always driven with the same size, so they never diverge.
#[derive(Debug)]
pub struct VelocityBufferPair<T> {
    slots: [Option<RenderTargetHandle<T>>; 2],
    front: usize,
    stats: AllocationStats,
}

impl<T> Default for VelocityBufferPair<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VelocityBufferPair<T> {
    pub fn new() -> Self {
        Self {
            slots: [None, None],
            front: 0,
            stats: AllocationStats::default(),
        }
    }

    fn index(&self, role: BufferRole) -> usize {
        match role {
            BufferRole::Current => self.front,
            BufferRole::Previous => 1 - self.front,
        }
    }

    pub fn get(&self, role: BufferRole) -> Option<&RenderTargetHandle<T>> {
        self.slots[self.index(role)].as_ref()
    }

    pub fn current(&self) -> Option<&RenderTargetHandle<T>> {
        self.get(BufferRole::Current)
    }

    pub fn previous(&self) -> Option<&RenderTargetHandle<T>> {
        self.get(BufferRole::Previous)
    }

    /// Both targets, or an error naming the missing role.
    pub fn targets(&self) -> Result<(&T, &T)> {
        let current = self
            .current()
            .ok_or_else(|| VelocityError::backend("current velocity target is not allocated"))?;
        let previous = self
            .previous()
            .ok_or_else(|| VelocityError::backend("previous velocity target is not allocated"))?;
        Ok((current.target(), previous.target()))
    }

    pub fn is_allocated(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.current().map(|h| (h.width(), h.height()))
    }

    /// Index of the slot currently playing `Current`.
    pub fn front(&self) -> usize {
        self.front
    }

    pub fn stats(&self) -> AllocationStats {
        self.stats
    }

    /// Make sure both slots hold `width` x `height` velocity targets.
    pub fn ensure<A>(&mut self, width: u32, height: u32, allocator: &mut A) -> bool
    where
        A: TargetAllocator<Target = T>,
    {
        let mut reallocated = false;
        for (&label, slot) in SLOT_LABELS.iter().zip(self.slots.iter_mut()) {
            let desc = TargetDescriptor::velocity(label, width, height);
            let had_target = slot.is_some();
            self.stats.requests += 1;
            if reallocate_if_needed(slot, &desc, allocator) {
                self.stats.allocations += 1;
                if had_target {
                    self.stats.releases += 1;
                }
                reallocated = true;
            }
        }
        reallocated
    }

    /// Exchange the roles of the two slots.
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    /// Release both targets. Returns whether anything was released.
    pub fn release(&mut self) -> bool {
        let mut released = false;
        for slot in self.slots.iter_mut() {
            if release(slot) {
                self.stats.releases += 1;
                released = true;
            }
        }
        self.front = 0;
        released
    }
}
