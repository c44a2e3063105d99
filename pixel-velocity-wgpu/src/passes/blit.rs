//! Whole-image blits between velocity buffers and host colour targets.

use crate::render_targets::RenderTexture;

/// Whether `source` can be copied into `destination` without a shader.
pub fn can_copy(source: &RenderTexture, destination: &RenderTexture) -> bool {
    source.format == destination.format
        && source.width == destination.width
        && source.height == destination.height
}

/// Texture-to-texture copy. Both targets must match in size and format.
pub fn copy_target(encoder: &mut wgpu::CommandEncoder, source: &RenderTexture, destination: &RenderTexture) {
    encoder.copy_texture_to_texture(
        wgpu::ImageCopyTexture {
            texture: &source.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyTexture {
            texture: &destination.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width: source.width,
            height: source.height,
            depth_or_array_layers: 1,
        },
    );
}

/// Fullscreen shader blit, for targets of another size or format.
pub fn render_blit_pass(
    encoder: &mut wgpu::CommandEncoder,
    destination: &RenderTexture,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Velocity Blit"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &destination.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        ..Default::default()
    });

    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}
