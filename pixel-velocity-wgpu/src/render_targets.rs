//! Texture creation and CPU read-back for velocity and host colour targets.

use glam::Vec4;
use half::f16;
use pixel_velocity_render::{Result, TargetDescriptor, VelocityError};

/// Velocity targets are sampled by the next frame, copied for propagation and read back.
const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// A colour-only render target with the sampler it is read through.
pub struct RenderTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl std::fmt::Debug for RenderTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

fn create_render_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    filter: wgpu::FilterMode,
    wrap: wgpu::AddressMode,
) -> RenderTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: TARGET_USAGE,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wrap,
        address_mode_v: wrap,
        address_mode_w: wrap,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    RenderTexture {
        texture,
        view,
        sampler,
        width,
        height,
        format,
    }
}

/// Create a velocity target from a pass descriptor.
pub fn create_velocity_texture(device: &wgpu::Device, desc: &TargetDescriptor) -> RenderTexture {
    create_render_texture(
        device,
        desc.label,
        desc.width,
        desc.height,
        desc.format,
        desc.filter,
        desc.wrap,
    )
}

/// Create a host colour target (the camera's output).
pub fn create_color_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> RenderTexture {
    create_render_texture(
        device,
        "Host Color Target",
        width,
        height,
        format,
        wgpu::FilterMode::Linear,
        wgpu::AddressMode::ClampToEdge,
    )
}

fn bytes_per_pixel(format: wgpu::TextureFormat) -> Result<u32> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Ok(4),
        wgpu::TextureFormat::Rgba16Float => Ok(8),
        wgpu::TextureFormat::Rgba32Float => Ok(16),
        other => Err(VelocityError::backend(format!("read-back of {other:?} is not supported"))),
    }
}

/// Row pitch of a `width`-pixel row padded to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Decode tightly packed `Rgba16Float` texels.
pub fn decode_rgba16f(bytes: &[u8]) -> Vec<Vec4> {
    bytes
        .chunks_exact(8)
        .map(|texel| {
            let channel = |i: usize| f16::from_le_bytes([texel[i * 2], texel[i * 2 + 1]]).to_f32();
            Vec4::new(channel(0), channel(1), channel(2), channel(3))
        })
        .collect()
}

fn decode_texels(format: wgpu::TextureFormat, bytes: &[u8]) -> Vec<Vec4> {
    match format {
        wgpu::TextureFormat::Rgba16Float => decode_rgba16f(bytes),
        wgpu::TextureFormat::Rgba32Float => bytes
            .chunks_exact(16)
            .map(|texel| {
                let channel = |i: usize| {
                    f32::from_le_bytes([texel[i * 4], texel[i * 4 + 1], texel[i * 4 + 2], texel[i * 4 + 3]])
                };
                Vec4::new(channel(0), channel(1), channel(2), channel(3))
            })
            .collect(),
        _ => bytes
            .chunks_exact(4)
            .map(|texel| Vec4::new(texel[0] as f32, texel[1] as f32, texel[2] as f32, texel[3] as f32) / 255.0)
            .collect(),
    }
}

/// Copy `target` into a staging buffer and decode it to `f32` RGBA, row-major from the top.
/// Blocks until the GPU is done.
pub fn read_texture(device: &wgpu::Device, queue: &wgpu::Queue, target: &RenderTexture) -> Result<Vec<Vec4>> {
    let bpp = bytes_per_pixel(target.format)?;
    let bytes_per_row = padded_bytes_per_row(target.width, bpp);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Velocity Readback"),
        size: u64::from(bytes_per_row) * u64::from(target.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Velocity Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(target.height),
            },
        },
        wgpu::Extent3d {
            width: target.width,
            height: target.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(VelocityError::backend)?
        .map_err(VelocityError::backend)?;

    let data = slice.get_mapped_range();
    let row_bytes = (target.width * bpp) as usize;
    let mut tight = Vec::with_capacity(row_bytes * target.height as usize);
    for row in 0..target.height as usize {
        let start = row * bytes_per_row as usize;
        tight.extend_from_slice(&data[start..start + row_bytes]);
    }
    drop(data);
    staging.unmap();

    Ok(decode_texels(target.format, &tight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(32, 8), 256);
        assert_eq!(padded_bytes_per_row(33, 8), 512);
        assert_eq!(padded_bytes_per_row(960, 8), 7680);
        assert_eq!(padded_bytes_per_row(1, 4), 256);
    }

    #[test]
    fn decodes_half_floats() {
        let mut bytes = Vec::new();
        for value in [1.0f32, -0.5, 0.25, 0.0] {
            bytes.extend_from_slice(&f16::from_f32(value).to_le_bytes());
        }
        assert_eq!(decode_rgba16f(&bytes), vec![Vec4::new(1.0, -0.5, 0.25, 0.0)]);
    }

    #[test]
    fn decodes_unorm_bytes() {
        let texels = decode_texels(wgpu::TextureFormat::Rgba8Unorm, &[255, 0, 51, 255]);
        assert_eq!(texels, vec![Vec4::new(1.0, 0.0, 0.2, 1.0)]);
    }

    #[test]
    fn unsupported_formats_are_rejected() {
        assert!(bytes_per_pixel(wgpu::TextureFormat::Depth32Float).is_err());
    }
}
