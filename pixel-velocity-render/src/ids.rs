//! Stable identifiers of the globals the pass publishes each frame.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    /// Halved clip-space camera displacement.
    CameraPositionDelta,
    VelocityTexture,
    PreviousVelocityTexture,
    VelocitySimulationParams,
    /// (world width, world height, pixels per unit, 1 / pixels per unit)
    PixelScreenParams,
}

impl ShaderId {
    pub const ALL: [ShaderId; 5] = [
        ShaderId::CameraPositionDelta,
        ShaderId::VelocityTexture,
        ShaderId::PreviousVelocityTexture,
        ShaderId::VelocitySimulationParams,
        ShaderId::PixelScreenParams,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ShaderId::CameraPositionDelta => "_PG_CameraPositionDelta",
            ShaderId::VelocityTexture => "_PG_VelocityTexture",
            ShaderId::PreviousVelocityTexture => "_PG_PreviousVelocityTexture",
            ShaderId::VelocitySimulationParams => "_PG_VelocitySimulationParams",
            ShaderId::PixelScreenParams => "_PG_PixelScreenParams",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
