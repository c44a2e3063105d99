//! wgpu backend for the pixel velocity pass.
//!
//! [`WgpuVelocityBackend`] implements `RenderBackend`: it allocates `Rgba16Float` velocity
//! targets, compiles velocity materials from WGSL and replays the pass's command buffers on a
//! `wgpu::Queue`. A headless constructor and blocking read-back make it usable from tools and
//! tests without a window.

pub mod backend;
mod handle;
pub mod passes;
pub mod pipeline;
pub mod render_targets;

pub use backend::{GpuMaterial, GpuMesh, MaterialKind, PublishedGlobals, WgpuVelocityBackend};
pub use render_targets::RenderTexture;
