use bytemuck::{Pod, Zeroable};

/// Byte distance between two draw uniform slots in the dynamic uniform buffer.
/// Matches WebGPU's default minUniformBufferOffsetAlignment.
pub const DRAW_UNIFORM_STRIDE: u64 = 256;

/// Per-draw uniform data for velocity materials: bind group 0, binding 0 (dynamic offset).
///
/// Every draw gets its own slot so the identity matrices of the fullscreen pass and the
/// camera matrices of the emitter pass can live in the same submission.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct VelocityDrawUniforms {
    /// Clip-space camera displacement, already halved.
    pub camera_position_delta: [f32; 4],
    pub simulation_params: [f32; 4],
    /// (world width, world height, pixels per unit, 1 / pixels per unit)
    pub pixel_screen_params: [f32; 4],
    /// Free per-object vector (emitter velocity for the built-in emitter material).
    pub object_params: [f32; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

/// Vertex layout for emitter meshes: position + uv.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl SpriteVertex {
    pub const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }
}

/// Axis-aligned quad centred on the origin, two counter-clockwise triangles.
pub fn sprite_quad(half_width: f32, half_height: f32) -> ([SpriteVertex; 4], [u32; 6]) {
    (
        [
            SpriteVertex::new([-half_width, -half_height, 0.0], [0.0, 1.0]),
            SpriteVertex::new([half_width, -half_height, 0.0], [1.0, 1.0]),
            SpriteVertex::new([half_width, half_height, 0.0], [1.0, 0.0]),
            SpriteVertex::new([-half_width, half_height, 0.0], [0.0, 0.0]),
        ],
        [0, 1, 2, 0, 2, 3],
    )
}
