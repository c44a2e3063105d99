//! Data layouts and shader sources shared between the velocity pass and its GPU backends.

pub mod shaders;
pub mod uniforms;
