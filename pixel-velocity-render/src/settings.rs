//! Pass configuration, handed to the pass once per activation through `setup`.

use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VelocityError};

/// How last frame's velocity reaches the `previous` buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferPropagation {
    /// Toggle which slot plays `current` at the start of every frame. No copy.
    #[default]
    Swap,
    /// Blit `current` into `previous` after the draws.
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityPassSettings {
    /// Velocity buffer size relative to the camera's pixel size.
    pub texture_scale: f32,
    pub pixels_per_unit: f32,
    /// Object layers drawn with their own materials. Bit `n` selects layer `n`.
    pub layer_mask: u32,
    /// Rendering layers drawn with the emitter material.
    pub rendering_layer_mask: u32,
    /// Overwrite the host color target with the velocity buffer (editor context only).
    pub preview: bool,
    pub propagation: BufferPropagation,
}

impl Default for VelocityPassSettings {
    fn default() -> Self {
        Self {
            texture_scale: 1.0,
            pixels_per_unit: 16.0,
            layer_mask: 0,
            rendering_layer_mask: 0,
            preview: false,
            propagation: BufferPropagation::Swap,
        }
    }
}

impl VelocityPassSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.texture_scale.is_finite() && self.texture_scale > 0.0) {
            return Err(VelocityError::InvalidTextureScale(self.texture_scale));
        }
        if !(self.pixels_per_unit.is_finite() && self.pixels_per_unit > 0.0) {
            return Err(VelocityError::InvalidPixelsPerUnit(self.pixels_per_unit));
        }
        Ok(())
    }

    /// Velocity buffer size for a camera of `pixel_width` x `pixel_height`.
    pub fn target_size(&self, pixel_width: u32, pixel_height: u32) -> (u32, u32) {
        let scale = |pixels: u32| (pixels as f32 * self.texture_scale).floor().max(0.0) as u32;
        (scale(pixel_width), scale(pixel_height))
    }

    pub fn has_emitters(&self) -> bool {
        self.layer_mask != 0 || self.rendering_layer_mask != 0
    }
}

/// Parameters forwarded untouched to the velocity materials.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub value: Vec4,
}

impl SimulationSettings {
    pub fn new(value: Vec4) -> Self {
        Self { value }
    }
}

/// On-disk form of a pass configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub pass: VelocityPassSettings,
    pub simulation: SimulationSettings,
}

impl VelocityConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.pass.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(VelocityError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_size_floors() {
        let settings = VelocityPassSettings {
            texture_scale: 0.5,
            ..Default::default()
        };
        assert_eq!(settings.target_size(1920, 1080), (960, 540));
        assert_eq!(settings.target_size(1921, 1081), (960, 540));

        let third = VelocityPassSettings {
            texture_scale: 1.0 / 3.0,
            ..Default::default()
        };
        assert_eq!(third.target_size(100, 10), (33, 3));
    }

    #[test]
    fn tiny_scale_yields_empty_target() {
        let settings = VelocityPassSettings {
            texture_scale: 0.001,
            ..Default::default()
        };
        assert_eq!(settings.target_size(320, 180), (0, 0));
    }

    #[test]
    fn validate_rejects_non_positive_values() {
        let zero_scale = VelocityPassSettings {
            texture_scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(zero_scale.validate(), Err(VelocityError::InvalidTextureScale(_))));

        let nan_ppu = VelocityPassSettings {
            pixels_per_unit: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(nan_ppu.validate(), Err(VelocityError::InvalidPixelsPerUnit(_))));

        assert!(VelocityPassSettings::default().validate().is_ok());
    }

    #[test]
    fn config_parses_partial_toml() {
        let config = VelocityConfig::from_toml_str(
            r#"
            [pass]
            texture_scale = 0.5
            layer_mask = 3
            propagation = "copy"

            [simulation]
            value = [0.9, 2.0, 0.0, 0.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.pass.texture_scale, 0.5);
        assert_eq!(config.pass.layer_mask, 3);
        assert_eq!(config.pass.pixels_per_unit, 16.0);
        assert_eq!(config.pass.propagation, BufferPropagation::Copy);
        assert_eq!(config.simulation.value, Vec4::new(0.9, 2.0, 0.0, 0.0));
    }

    #[test]
    fn config_rejects_invalid_scale() {
        let err = VelocityConfig::from_toml_str("[pass]\ntexture_scale = -1.0\n").unwrap_err();
        assert!(matches!(err, VelocityError::InvalidTextureScale(_)));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = VelocityConfig {
            pass: VelocityPassSettings {
                preview: true,
                rendering_layer_mask: 0b100,
                ..Default::default()
            },
            simulation: SimulationSettings::new(Vec4::new(0.5, 0.0, 0.0, 1.0)),
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(VelocityConfig::from_toml_str(&text).unwrap(), config);
    }
}
