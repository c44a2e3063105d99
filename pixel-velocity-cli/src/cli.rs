use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pixel_velocity_render::BufferPropagation;

#[derive(Parser)]
#[command(
    name = "pvprobe",
    about = "Run the pixel velocity pass headless and inspect its output",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render frames with a panning camera and a moving emitter
    Probe(ProbeArgs),
    /// Print the default pass configuration as TOML
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Number of frames to render
    #[arg(short = 'n', long, default_value_t = 8)]
    pub frames: u32,
    /// Camera width in pixels
    #[arg(long, default_value_t = 320)]
    pub width: u32,
    /// Camera height in pixels
    #[arg(long, default_value_t = 180)]
    pub height: u32,
    /// Half the vertical view extent, in world units
    #[arg(long, default_value_t = 5.0)]
    pub ortho_size: f32,
    /// Camera movement per frame along X, in world units
    #[arg(long, default_value_t = 0.25)]
    pub pan: f32,
    /// Pass configuration file (TOML); flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Velocity buffer scale relative to the camera size
    #[arg(long)]
    pub scale: Option<f32>,
    /// Pixels per world unit
    #[arg(long)]
    pub ppu: Option<f32>,
    /// Per-frame decay written to simulation params X
    #[arg(long)]
    pub decay: Option<f32>,
    /// Rendering layers drawn with the emitter material
    #[arg(long)]
    pub rendering_layers: Option<u32>,
    /// How previous velocity is propagated
    #[arg(long, value_enum)]
    pub propagation: Option<Propagation>,
    /// Blit the velocity buffer onto the host colour target each frame
    #[arg(long)]
    pub preview: bool,
    /// Write the final velocity buffer to this PNG
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Propagation {
    Swap,
    Copy,
}

impl From<Propagation> for BufferPropagation {
    fn from(value: Propagation) -> Self {
        match value {
            Propagation::Swap => BufferPropagation::Swap,
            Propagation::Copy => BufferPropagation::Copy,
        }
    }
}
