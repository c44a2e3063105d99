//! Render pass encoders used when replaying a velocity frame.

pub mod blit;
pub mod velocity;
