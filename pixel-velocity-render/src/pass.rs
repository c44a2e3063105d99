//! The velocity render pass: lifecycle hooks and per-frame composition.

use glam::{Mat4, Vec2, Vec4};

use crate::backend::{FrameResources, RenderBackend};
use crate::camera::CameraFrameState;
use crate::command::{CommandBuffer, CommandBufferPool, TargetRef, Viewport};
use crate::emitter::{self, DrawingSettings};
use crate::error::{Result, VelocityError};
use crate::ids::ShaderId;
use crate::renderable::{ColorTargetHandle, MaterialHandle, Renderable};
use crate::settings::{BufferPropagation, SimulationSettings, VelocityPassSettings};
use crate::targets::{BufferRole, RenderTargetHandle, VelocityBufferPair};
use crate::tracker::{published_delta, DisplacementTracker};

const PROFILING_NAME: &str = "VelocityRenderPass";

/// Where in the host frame the pass wants to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPassEvent {
    #[default]
    BeforeRenderingOpaques,
    AfterRenderingOpaques,
    BeforeRenderingTransparents,
    BeforeRenderingPostProcessing,
}

/// Summary of one executed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Zero-based index of the frame.
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    /// View size in pixel-art pixels.
    pub world_size: Vec2,
    /// Un-halved clip-space camera displacement.
    pub screen_delta: Vec4,
    pub reallocated: bool,
    pub emitter_draws: usize,
    pub previewed: bool,
}

pub struct VelocityRenderPass<T> {
    emitter_material: MaterialHandle,
    blit_material: MaterialHandle,
    pass_settings: VelocityPassSettings,
    simulation_settings: SimulationSettings,
    drawing: DrawingSettings,
    tracker: DisplacementTracker,
    buffers: VelocityBufferPair<T>,
    host_color: Option<ColorTargetHandle>,
    pool: CommandBufferPool,
    editor_context: bool,
    event: RenderPassEvent,
    frame: u64,
}

impl<T> VelocityRenderPass<T> {
    pub fn new(emitter_material: MaterialHandle, blit_material: MaterialHandle) -> Self {
        Self {
            emitter_material,
            blit_material,
            pass_settings: VelocityPassSettings::default(),
            simulation_settings: SimulationSettings::default(),
            drawing: DrawingSettings::default(),
            tracker: DisplacementTracker::new(),
            buffers: VelocityBufferPair::new(),
            host_color: None,
            pool: CommandBufferPool::new(),
            editor_context: false,
            event: RenderPassEvent::default(),
            frame: 0,
        }
    }

    /// Whether the host is an interactive editor. Preview blits only happen there.
    pub fn with_editor_context(mut self, editor: bool) -> Self {
        self.editor_context = editor;
        self
    }

    pub fn with_drawing_settings(mut self, drawing: DrawingSettings) -> Self {
        self.drawing = drawing;
        self
    }

    pub fn with_render_pass_event(mut self, event: RenderPassEvent) -> Self {
        self.event = event;
        self
    }

    /// Replace the configuration wholesale.
    pub fn setup(&mut self, pass_settings: VelocityPassSettings, simulation_settings: SimulationSettings) -> Result<()> {
        pass_settings.validate()?;
        log::info!(
            "Velocity pass setup: scale {} ppu {} layers {:#x} rendering layers {:#x} preview {} ({:?})",
            pass_settings.texture_scale,
            pass_settings.pixels_per_unit,
            pass_settings.layer_mask,
            pass_settings.rendering_layer_mask,
            pass_settings.preview,
            pass_settings.propagation,
        );
        self.pass_settings = pass_settings;
        self.simulation_settings = simulation_settings;
        Ok(())
    }

    pub fn settings(&self) -> &VelocityPassSettings {
        &self.pass_settings
    }

    pub fn simulation(&self) -> &SimulationSettings {
        &self.simulation_settings
    }

    pub fn render_pass_event(&self) -> RenderPassEvent {
        self.event
    }

    /// Bind the host colour target for this camera. Call once per camera per frame, before
    /// [`execute`](Self::execute).
    pub fn on_camera_setup(&mut self, host_color: ColorTargetHandle) {
        self.host_color = Some(host_color);
    }

    /// The output the pass declared to the host pipeline.
    pub fn configured_target(&self) -> Option<ColorTargetHandle> {
        self.host_color
    }

    /// Release the velocity targets when the camera goes away. Safe to repeat.
    pub fn on_camera_cleanup(&mut self) -> bool {
        let released = self.buffers.release();
        self.host_color = None;
        if released {
            log::debug!("Velocity targets released");
        }
        released
    }

    pub fn buffers(&self) -> &VelocityBufferPair<T> {
        &self.buffers
    }

    /// Velocity target currently playing `role`, for downstream effects.
    pub fn velocity_target(&self, role: BufferRole) -> Option<&T> {
        self.buffers.get(role).map(RenderTargetHandle::target)
    }

    pub fn tracker(&self) -> &DisplacementTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut DisplacementTracker {
        &mut self.tracker
    }

    /// Record and submit one frame for `camera`.
    pub fn execute<B>(&mut self, camera: &CameraFrameState, renderables: &[Renderable], backend: &mut B) -> Result<FrameReport>
    where
        B: RenderBackend<Target = T>,
    {
        let (width, height) = self.pass_settings.target_size(camera.pixel_width, camera.pixel_height);
        if width == 0 || height == 0 {
            return Err(VelocityError::EmptyTarget { width, height });
        }
        let world_size = camera.world_size(self.pass_settings.pixels_per_unit);

        let screen_delta = self.tracker.compute_delta(camera.position(), &camera.view, &camera.projection);

        if self.pass_settings.propagation == BufferPropagation::Swap && self.buffers.is_allocated() {
            self.buffers.swap();
        }
        let reallocated = self.buffers.ensure(width, height, backend);
        if reallocated {
            log::debug!("Velocity targets allocated at {width}x{height}");
        }

        let mut cmd = self.pool.get(PROFILING_NAME);
        let (emitter_draws, previewed) = {
            let mut scope = cmd.profiling_scope(PROFILING_NAME);
            self.record_frame(&mut scope, camera, renderables, width, height, world_size, screen_delta)
        };

        let submitted = self.buffers.targets().and_then(|(current, previous)| {
            let frame = FrameResources {
                current,
                previous,
                renderables,
            };
            backend.submit(&cmd, &frame)
        });
        self.pool.release(cmd);
        submitted?;

        let report = FrameReport {
            frame: self.frame,
            width,
            height,
            world_size,
            screen_delta,
            reallocated,
            emitter_draws,
            previewed,
        };
        log::trace!("{report:?}");
        self.frame += 1;
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_frame(
        &self,
        cmd: &mut CommandBuffer,
        camera: &CameraFrameState,
        renderables: &[Renderable],
        width: u32,
        height: u32,
        world_size: Vec2,
        screen_delta: Vec4,
    ) -> (usize, bool) {
        let ppu = self.pass_settings.pixels_per_unit;
        let current = TargetRef::Velocity(BufferRole::Current);

        cmd.set_global_vector(ShaderId::CameraPositionDelta, published_delta(screen_delta));
        cmd.set_global_texture(ShaderId::VelocityTexture, BufferRole::Current);
        cmd.set_global_texture(ShaderId::PreviousVelocityTexture, BufferRole::Previous);
        cmd.set_global_vector(ShaderId::VelocitySimulationParams, self.simulation_settings.value);
        cmd.set_global_vector(
            ShaderId::PixelScreenParams,
            Vec4::new(world_size.x, world_size.y, ppu, 1.0 / ppu),
        );

        // Base pass: seed the current buffer.
        cmd.set_render_target(current);
        cmd.set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
        cmd.set_viewport(Viewport::full(width, height));
        cmd.draw_fullscreen(self.blit_material, 0, 0);
        cmd.set_view_projection(camera.view, camera.projection);

        let emitter_draws = if camera.skips_emitters() {
            0
        } else {
            emitter::record_emitters(
                cmd,
                renderables,
                &self.pass_settings,
                &self.drawing,
                self.emitter_material,
            )
        };

        if self.pass_settings.propagation == BufferPropagation::Copy {
            cmd.blit(current, TargetRef::Velocity(BufferRole::Previous));
        }

        let mut previewed = false;
        if self.editor_context && self.pass_settings.preview {
            match self.host_color {
                Some(host) => {
                    cmd.blit(current, TargetRef::HostColor(host));
                    previewed = true;
                }
                None => log::warn!("Velocity preview requested without a host colour target"),
            }
        }

        match self.host_color {
            Some(host) => cmd.set_render_target(TargetRef::HostColor(host)),
            None => log::warn!("No host colour target bound; on_camera_setup was not called"),
        }

        (emitter_draws, previewed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FrameCommand;
    use crate::renderable::MeshHandle;
    use crate::targets::{TargetAllocator, TargetDescriptor};

    const EMITTER: MaterialHandle = MaterialHandle(1);
    const BLIT: MaterialHandle = MaterialHandle(2);
    const HOST: ColorTargetHandle = ColorTargetHandle(7);

    #[derive(Default)]
    struct RecordingBackend {
        allocations: u32,
        frames: Vec<(Vec<FrameCommand>, u32, u32)>,
    }

    impl TargetAllocator for RecordingBackend {
        type Target = u32;

        fn allocate(&mut self, _desc: &TargetDescriptor) -> u32 {
            self.allocations += 1;
            self.allocations
        }
    }

    impl RenderBackend for RecordingBackend {
        fn submit(&mut self, commands: &CommandBuffer, frame: &FrameResources<'_, u32>) -> Result<()> {
            self.frames.push((commands.commands().to_vec(), *frame.current, *frame.previous));
            Ok(())
        }
    }

    fn camera(position: Vec2) -> CameraFrameState {
        CameraFrameState::orthographic(320, 180, 5.0, position)
    }

    fn pass(settings: VelocityPassSettings) -> VelocityRenderPass<u32> {
        let mut pass = VelocityRenderPass::new(EMITTER, BLIT);
        pass.setup(settings, SimulationSettings::new(Vec4::new(0.9, 0.0, 0.0, 0.0))).unwrap();
        pass.on_camera_setup(HOST);
        pass
    }

    fn sprites() -> Vec<Renderable> {
        vec![
            Renderable::sprite(MeshHandle(1), MaterialHandle(5), Mat4::IDENTITY).with_layer(0),
            Renderable::sprite(MeshHandle(1), MaterialHandle(5), Mat4::IDENTITY).with_rendering_layers(0b10),
        ]
    }

    fn position_of(commands: &[FrameCommand], pred: impl Fn(&FrameCommand) -> bool) -> usize {
        commands.iter().position(pred).expect("command not recorded")
    }

    #[test]
    fn records_steps_in_order() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings {
            layer_mask: 1,
            propagation: BufferPropagation::Copy,
            ..Default::default()
        });
        pass.execute(&camera(Vec2::ZERO), &sprites(), &mut backend).unwrap();

        let commands = &backend.frames[0].0;
        assert_eq!(commands.first(), Some(&FrameCommand::BeginSample(PROFILING_NAME)));
        assert_eq!(commands.last(), Some(&FrameCommand::EndSample(PROFILING_NAME)));

        let last_global = commands
            .iter()
            .rposition(|c| matches!(c, FrameCommand::SetGlobalVector { .. } | FrameCommand::SetGlobalTexture { .. }))
            .unwrap();
        let base = position_of(commands, |c| matches!(c, FrameCommand::DrawFullscreen { .. }));
        let emitter = position_of(commands, |c| matches!(c, FrameCommand::DrawRenderer { .. }));
        let copy = position_of(commands, |c| {
            matches!(c, FrameCommand::Blit { destination: TargetRef::Velocity(BufferRole::Previous), .. })
        });
        let restore = position_of(commands, |c| *c == FrameCommand::SetRenderTarget(TargetRef::HostColor(HOST)));

        assert!(last_global < base);
        assert!(base < emitter);
        assert!(emitter < copy);
        assert!(copy < restore);
        assert_eq!(commands[base], FrameCommand::DrawFullscreen { material: BLIT, submesh: 0, pass: 0 });
        assert_eq!(
            commands[base - 1],
            FrameCommand::SetViewport(Viewport::full(320, 180))
        );
        assert_eq!(
            commands[base - 2],
            FrameCommand::SetViewProjection { view: Mat4::IDENTITY, projection: Mat4::IDENTITY }
        );
        let cam = camera(Vec2::ZERO);
        assert_eq!(
            commands[base + 1],
            FrameCommand::SetViewProjection { view: cam.view, projection: cam.projection }
        );
    }

    #[test]
    fn publishes_screen_params() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings {
            pixels_per_unit: 8.0,
            ..Default::default()
        });
        pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();

        let aspect = 320.0 / 180.0;
        let expected = Vec4::new(80.0 * aspect, 80.0, 8.0, 0.125);
        assert!(backend.frames[0].0.contains(&FrameCommand::SetGlobalVector {
            id: ShaderId::PixelScreenParams,
            value: expected,
        }));
    }

    #[test]
    fn zero_masks_issue_no_emitter_draws() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings::default());
        let report = pass.execute(&camera(Vec2::ZERO), &sprites(), &mut backend).unwrap();
        assert_eq!(report.emitter_draws, 0);
        assert!(!backend.frames[0].0.iter().any(|c| matches!(c, FrameCommand::DrawRenderer { .. })));
    }

    #[test]
    fn preview_and_scene_cameras_skip_emitters() {
        let settings = VelocityPassSettings {
            layer_mask: u32::MAX,
            rendering_layer_mask: u32::MAX,
            ..Default::default()
        };
        let mut backend = RecordingBackend::default();
        let mut pass = pass(settings);

        let mut preview = camera(Vec2::ZERO);
        preview.is_preview_camera = true;
        assert_eq!(pass.execute(&preview, &sprites(), &mut backend).unwrap().emitter_draws, 0);

        let mut scene = camera(Vec2::ZERO);
        scene.is_scene_view_camera = true;
        assert_eq!(pass.execute(&scene, &sprites(), &mut backend).unwrap().emitter_draws, 0);

        assert_eq!(pass.execute(&camera(Vec2::ZERO), &sprites(), &mut backend).unwrap().emitter_draws, 4);
    }

    #[test]
    fn preview_requires_editor_context() {
        let settings = VelocityPassSettings {
            preview: true,
            ..Default::default()
        };
        let is_preview_blit =
            |c: &FrameCommand| matches!(c, FrameCommand::Blit { destination: TargetRef::HostColor(_), .. });

        let mut backend = RecordingBackend::default();
        let mut game = pass(settings);
        assert!(!game.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap().previewed);
        assert!(!backend.frames[0].0.iter().any(is_preview_blit));

        let mut backend = RecordingBackend::default();
        let mut editor = pass(settings).with_editor_context(true);
        assert!(editor.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap().previewed);
        assert!(backend.frames[0].0.iter().any(is_preview_blit));
    }

    #[test]
    fn swap_mode_alternates_slots_without_copy() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings::default());
        for _ in 0..3 {
            pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();
        }

        let slots: Vec<(u32, u32)> = backend.frames.iter().map(|(_, c, p)| (*c, *p)).collect();
        assert_eq!(slots, vec![(1, 2), (2, 1), (1, 2)]);
        assert!(!backend
            .frames
            .iter()
            .flat_map(|(commands, _, _)| commands)
            .any(|c| matches!(c, FrameCommand::Blit { .. })));
    }

    #[test]
    fn copy_mode_keeps_slots_fixed() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings {
            propagation: BufferPropagation::Copy,
            ..Default::default()
        });
        for _ in 0..3 {
            pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();
        }
        assert!(backend.frames.iter().all(|(_, c, p)| (*c, *p) == (1, 2)));
    }

    #[test]
    fn unchanged_size_does_not_reallocate() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings {
            texture_scale: 0.5,
            ..Default::default()
        });
        let first = pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();
        let second = pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();

        assert!(first.reallocated);
        assert!(!second.reallocated);
        assert_eq!((second.width, second.height), (160, 90));
        let stats = pass.buffers().stats();
        assert_eq!(stats.requests, 4);
        assert_eq!(stats.allocations, 2);
        assert_eq!(backend.allocations, 2);
    }

    #[test]
    fn resize_reallocates_both_targets() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings::default());
        pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();

        let wide = CameraFrameState::orthographic(640, 360, 5.0, Vec2::ZERO);
        let report = pass.execute(&wide, &[], &mut backend).unwrap();
        assert!(report.reallocated);
        assert_eq!(pass.buffers().size(), Some((640, 360)));
        assert_eq!(backend.allocations, 4);
    }

    #[test]
    fn empty_target_is_refused_before_any_state_changes() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings {
            texture_scale: 0.001,
            ..Default::default()
        });
        let err = pass.execute(&camera(Vec2::new(3.0, 0.0)), &[], &mut backend).unwrap_err();
        assert!(matches!(err, VelocityError::EmptyTarget { width: 0, height: 0 }));
        assert_eq!(pass.tracker().previous_position(), Vec2::ZERO);
        assert!(backend.frames.is_empty());
    }

    #[test]
    fn setup_rejects_invalid_settings_and_keeps_old_ones() {
        let mut pass = pass(VelocityPassSettings {
            texture_scale: 0.5,
            ..Default::default()
        });
        let bad = VelocityPassSettings {
            texture_scale: -1.0,
            ..Default::default()
        };
        assert!(pass.setup(bad, SimulationSettings::default()).is_err());
        assert_eq!(pass.settings().texture_scale, 0.5);
    }

    #[test]
    fn cleanup_twice_is_a_no_op() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings::default());
        pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();

        assert!(pass.on_camera_cleanup());
        assert!(!pass.on_camera_cleanup());
        assert!(!pass.buffers().is_allocated());
        assert!(pass.velocity_target(BufferRole::Current).is_none());
        assert!(pass.configured_target().is_none());
        assert_eq!(pass.buffers().stats().releases, 2);
    }

    #[test]
    fn cleanup_before_any_frame_is_safe() {
        let mut pass: VelocityRenderPass<u32> = VelocityRenderPass::new(EMITTER, BLIT);
        assert!(!pass.on_camera_cleanup());
    }

    #[test]
    fn frames_after_cleanup_reallocate() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings::default());
        pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();
        pass.on_camera_cleanup();
        pass.on_camera_setup(HOST);

        let report = pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();
        assert!(report.reallocated);
        assert_eq!(report.frame, 1);
    }

    #[test]
    fn pool_buffer_is_reused_across_frames() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(VelocityPassSettings::default());
        for _ in 0..4 {
            pass.execute(&camera(Vec2::ZERO), &[], &mut backend).unwrap();
        }
        assert_eq!(pass.pool.created(), 1);
        assert_eq!(pass.pool.available(), 1);
    }

    #[test]
    fn declares_before_opaques_by_default() {
        let pass: VelocityRenderPass<u32> = VelocityRenderPass::new(EMITTER, BLIT);
        assert_eq!(pass.render_pass_event(), RenderPassEvent::BeforeRenderingOpaques);
    }
}
