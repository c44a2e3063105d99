/// Embedded WGSL shader sources for the velocity pass.
/// Velocity materials are compiled as `VELOCITY_PRELUDE` followed by their own source.

pub const VELOCITY_PRELUDE: &str = include_str!("../shaders/velocity_prelude.wgsl");
pub const FULLSCREEN_QUAD_VERT: &str = include_str!("../shaders/fullscreen_quad.wgsl");
pub const VELOCITY_BLIT_FRAG: &str = include_str!("../shaders/velocity_blit.wgsl");
pub const VELOCITY_EMITTER_SHADER: &str = include_str!("../shaders/velocity_emitter.wgsl");
pub const VELOCITY_PREVIEW_FRAG: &str = include_str!("../shaders/velocity_preview.wgsl");

/// Prefix a material source with the shared uniform and binding declarations.
pub fn with_prelude(source: &str) -> String {
    let mut out = String::with_capacity(VELOCITY_PRELUDE.len() + source.len() + 1);
    out.push_str(VELOCITY_PRELUDE);
    out.push('\n');
    out.push_str(source);
    out
}
