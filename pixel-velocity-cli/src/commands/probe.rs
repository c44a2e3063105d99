use std::path::Path;

use anyhow::Context;
use glam::{Mat4, Vec2, Vec3, Vec4};
use pixel_velocity_render::{
    BufferRole, CameraFrameState, Renderable, SimulationSettings, VelocityConfig, VelocityPassSettings,
    VelocityRenderPass,
};
use pixel_velocity_wgpu::WgpuVelocityBackend;

use crate::cli::ProbeArgs;

/// Emitter speed in world units per frame.
const EMITTER_SPEED: f32 = 0.5;

/// Defaults when no config file is given: draw rendering layer 0, decay 10% per frame.
fn probe_defaults() -> VelocityConfig {
    VelocityConfig {
        pass: VelocityPassSettings {
            rendering_layer_mask: 1,
            ..Default::default()
        },
        simulation: SimulationSettings::new(Vec4::new(0.9, 0.0, 0.0, 0.0)),
    }
}

/// Config file (or probe defaults) with command-line overrides applied.
pub fn resolve_config(args: &ProbeArgs) -> anyhow::Result<VelocityConfig> {
    let mut config = match &args.config {
        Some(path) => VelocityConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => probe_defaults(),
    };

    if let Some(scale) = args.scale {
        config.pass.texture_scale = scale;
    }
    if let Some(ppu) = args.ppu {
        config.pass.pixels_per_unit = ppu;
    }
    if let Some(decay) = args.decay {
        config.simulation.value.x = decay;
    }
    if let Some(mask) = args.rendering_layers {
        config.pass.rendering_layer_mask = mask;
    }
    if let Some(propagation) = args.propagation {
        config.pass.propagation = propagation.into();
    }
    config.pass.preview |= args.preview;

    config.pass.validate()?;
    Ok(config)
}

/// Map signed velocity to 8-bit RGBA: XY around mid-grey, magnitude in blue.
pub fn encode_velocity_rgba8(pixels: &[Vec4]) -> Vec<u8> {
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    pixels
        .iter()
        .flat_map(|p| {
            let speed = Vec2::new(p.x, p.y).length();
            [to_byte(p.x * 0.5 + 0.5), to_byte(p.y * 0.5 + 0.5), to_byte(speed), 255]
        })
        .collect()
}

fn write_png(path: &Path, width: u32, height: u32, pixels: &[Vec4]) -> anyhow::Result<()> {
    let image = image::RgbaImage::from_raw(width, height, encode_velocity_rgba8(pixels))
        .context("velocity read-back has the wrong size")?;
    image.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn run(args: ProbeArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let mut backend = WgpuVelocityBackend::new_headless()?;

    let quad = backend.upload_sprite_quad(0.5, 0.5);
    let emitter_material = backend.emitter_material();
    let host = backend.create_color_target(args.width, args.height, wgpu::TextureFormat::Rgba8Unorm);

    let mut pass = VelocityRenderPass::new(emitter_material, backend.blit_material())
        .with_editor_context(config.pass.preview);
    pass.setup(config.pass, config.simulation)?;
    pass.on_camera_setup(host);

    println!(
        "Probing {} frames at {}x{} (scale {}, {:?})",
        args.frames, args.width, args.height, config.pass.texture_scale, config.pass.propagation
    );

    for frame in 0..args.frames {
        let t = frame as f32;
        let camera = CameraFrameState::orthographic(
            args.width,
            args.height,
            args.ortho_size,
            Vec2::new(args.pan * t, 0.0),
        );
        let emitter = Renderable::sprite(
            quad,
            emitter_material,
            Mat4::from_translation(Vec3::new(EMITTER_SPEED * t - 2.0, 0.0, 0.0)),
        )
        .with_params(Vec4::new(EMITTER_SPEED, 0.0, 0.0, 1.0));

        let report = pass.execute(&camera, &[emitter], &mut backend)?;
        log::info!(
            "frame {}: {}x{} delta ({:.4}, {:.4}) draws {}{}",
            report.frame,
            report.width,
            report.height,
            report.screen_delta.x,
            report.screen_delta.y,
            report.emitter_draws,
            if report.reallocated { " [allocated]" } else { "" },
        );
    }

    if let Some(path) = &args.output {
        let target = pass
            .velocity_target(BufferRole::Current)
            .context("no frame was rendered")?;
        let pixels = backend.read_velocity(target)?;
        write_png(path, target.width, target.height, &pixels)?;
        println!("Wrote velocity buffer to {}", path.display());
    }

    let stats = pass.buffers().stats();
    println!(
        "Allocation requests {}, allocations {}, releases {}",
        stats.requests, stats.allocations, stats.releases
    );
    pass.on_camera_cleanup();
    backend.remove_color_target(host);
    Ok(())
}
