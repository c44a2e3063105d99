use std::path::PathBuf;

use anyhow::Context;
use pixel_velocity_render::VelocityConfig;

pub fn run(output: Option<PathBuf>) -> anyhow::Result<()> {
    let text = VelocityConfig::default().to_toml_string()?;
    match output {
        Some(path) => {
            std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
