//! Host-side draw set entries and the handles they refer to.

use std::ops::RangeInclusive;

use glam::{Mat4, Vec4};

/// Backend mesh handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Backend material handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u64);

/// Host colour target. Borrowed by the pass, never released by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetHandle(pub u64);

/// Render queues considered transparent.
pub const TRANSPARENT_QUEUE: RangeInclusive<u32> = 2501..=5000;
pub const DEFAULT_TRANSPARENT_QUEUE: u32 = 3000;

/// One already-culled object of the host draw set.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub model: Mat4,
    /// Object layer, 0..=31.
    pub layer: u8,
    pub rendering_layer_mask: u32,
    pub render_queue: u32,
    pub sorting_order: i32,
    /// Distance from the camera, larger is further away.
    pub depth: f32,
    /// Shader pass the material provides.
    pub shader_tag: String,
    /// Free per-object vector forwarded to the material.
    pub params: Vec4,
}

impl Renderable {
    /// Transparent sprite on layer 0 and rendering layer 0.
    pub fn sprite(mesh: MeshHandle, material: MaterialHandle, model: Mat4) -> Self {
        Self {
            mesh,
            material,
            model,
            layer: 0,
            rendering_layer_mask: 1,
            render_queue: DEFAULT_TRANSPARENT_QUEUE,
            sorting_order: 0,
            depth: 0.0,
            shader_tag: "Universal2D".to_string(),
            params: Vec4::ZERO,
        }
    }

    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_rendering_layers(mut self, mask: u32) -> Self {
        self.rendering_layer_mask = mask;
        self
    }

    pub fn with_params(mut self, params: Vec4) -> Self {
        self.params = params;
        self
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_sorting_order(mut self, order: i32) -> Self {
        self.sorting_order = order;
        self
    }

    /// Mask bit of `layer`; layers past 31 match nothing.
    pub fn layer_bit(&self) -> u32 {
        1u32.checked_shl(u32::from(self.layer)).unwrap_or(0)
    }
}
