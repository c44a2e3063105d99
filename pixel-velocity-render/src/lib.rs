//! Pixel velocity pass: the platform-independent core.
//!
//! Each frame the pass measures how far the camera moved, (re)allocates a pair of
//! `Rgba16Float` velocity buffers, publishes the frame's shader globals, seeds the current
//! buffer with a fullscreen blit, draws emitter objects into it and makes the result
//! available as next frame's "previous" buffer.
//!
//! Nothing here talks to a GPU directly. The pass records [`command::FrameCommand`]s and hands
//! them to a [`backend::RenderBackend`], which also allocates the render targets.

pub mod backend;
pub mod camera;
pub mod command;
pub mod emitter;
pub mod error;
pub mod ids;
pub mod pass;
pub mod renderable;
pub mod settings;
pub mod targets;
pub mod tracker;

pub use backend::{FrameResources, RenderBackend};
pub use camera::CameraFrameState;
pub use command::{CommandBuffer, CommandBufferPool, FrameCommand, TargetRef, Viewport};
pub use emitter::{DrawingSettings, EmitterSelection, FilteringSettings};
pub use error::{Result, VelocityError};
pub use ids::ShaderId;
pub use pass::{FrameReport, RenderPassEvent, VelocityRenderPass};
pub use renderable::{ColorTargetHandle, MaterialHandle, MeshHandle, Renderable};
pub use settings::{BufferPropagation, SimulationSettings, VelocityConfig, VelocityPassSettings};
pub use targets::{
    AllocationStats, BufferRole, RenderTargetHandle, TargetAllocator, TargetDescriptor,
    VelocityBufferPair, VELOCITY_FORMAT,
};
pub use tracker::DisplacementTracker;
