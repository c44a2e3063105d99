//! Camera displacement between consecutive frames.

use glam::{Mat4, Vec2, Vec4};

/// Remembers where the camera was last frame.
///
/// The first frame measures against the origin, so a camera that starts away from it reports
/// a one-frame spike equal to its starting position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DisplacementTracker {
    previous_position: Vec2,
}

impl DisplacementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_position(&self) -> Vec2 {
        self.previous_position
    }

    /// Clip-space displacement since the last call. The delta is a direction (`w = 0`), so the
    /// view translation does not leak into it.
    pub fn compute_delta(&mut self, position: Vec2, view: &Mat4, projection: &Mat4) -> Vec4 {
        let delta = position - self.previous_position;
        let screen_delta = *projection * *view * Vec4::new(delta.x, delta.y, 0.0, 0.0);
        self.previous_position = position;
        screen_delta
    }

    /// Forget the history and measure the next frame against `position`.
    pub fn reset(&mut self, position: Vec2) {
        self.previous_position = position;
    }
}

/// Value published to shaders: clip space spans [-1, 1], so half the delta is the UV shift.
pub fn published_delta(screen_delta: Vec4) -> Vec4 {
    screen_delta / 2.0
}
