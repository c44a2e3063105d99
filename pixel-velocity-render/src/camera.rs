//! Per-frame camera state supplied by the host.

use glam::{Mat4, Vec2, Vec3};

/// Distance between an orthographic camera built by [`CameraFrameState::orthographic`] and the
/// sprite plane.
pub const CAMERA_DISTANCE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrameState {
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Half the vertical extent of the view, in world units.
    pub orthographic_size: f32,
    pub aspect: f32,
    pub view: Mat4,
    pub projection: Mat4,
    pub is_preview_camera: bool,
    pub is_scene_view_camera: bool,
}

impl CameraFrameState {
    /// Orthographic game camera looking down -Z at `position`.
    pub fn orthographic(pixel_width: u32, pixel_height: u32, orthographic_size: f32, position: Vec2) -> Self {
        let aspect = pixel_width as f32 / pixel_height.max(1) as f32;
        Self::with_aspect(pixel_width, pixel_height, orthographic_size, aspect, position)
    }

    /// Same as [`orthographic`](Self::orthographic) with an explicit aspect ratio.
    pub fn with_aspect(
        pixel_width: u32,
        pixel_height: u32,
        orthographic_size: f32,
        aspect: f32,
        position: Vec2,
    ) -> Self {
        let half_height = orthographic_size;
        let half_width = orthographic_size * aspect;
        Self {
            pixel_width,
            pixel_height,
            orthographic_size,
            aspect,
            view: Mat4::from_translation(Vec3::new(-position.x, -position.y, -CAMERA_DISTANCE)),
            projection: Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                0.1,
                CAMERA_DISTANCE * 10.0,
            ),
            is_preview_camera: false,
            is_scene_view_camera: false,
        }
    }

    /// Translation column of the view matrix, projected to 2D.
    ///
    /// This is the world origin seen from the camera, so it moves opposite to the camera and
    /// the derived displacement follows the on-screen motion of the scene.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.view.w_axis.x, self.view.w_axis.y)
    }

    /// Size of the view in pixel-art pixels: `height = 2 * ortho * ppu`, `width = height * aspect`.
    pub fn world_size(&self, pixels_per_unit: f32) -> Vec2 {
        let height = 2.0 * self.orthographic_size * pixels_per_unit;
        Vec2::new(height * self.aspect, height)
    }

    /// Preview and scene-view cameras never draw emitters.
    pub fn skips_emitters(&self) -> bool {
        self.is_preview_camera || self.is_scene_view_camera
    }
}
