//! Error type shared by the velocity pass and its backends.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VelocityError>;

#[derive(Error, Debug)]
pub enum VelocityError {
    #[error("texture scale must be positive and finite, got {0}")]
    InvalidTextureScale(f32),

    #[error("pixels per unit must be positive and finite, got {0}")]
    InvalidPixelsPerUnit(f32),

    #[error("velocity target would be empty ({width}x{height})")]
    EmptyTarget { width: u32, height: u32 },

    #[error("unknown {kind} handle {handle}")]
    UnknownHandle { kind: &'static str, handle: u64 },

    #[error("material {handle} cannot be used for {usage}")]
    MaterialKind { handle: u64, usage: &'static str },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VelocityError {
    pub fn backend<T: ToString>(msg: T) -> Self {
        VelocityError::Backend(msg.to_string())
    }
}
