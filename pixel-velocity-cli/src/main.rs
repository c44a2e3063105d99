mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    match cli.command {
        cli::Command::Probe(args) => commands::probe::run(args),
        cli::Command::Config { output } => commands::config::run(output),
    }
}
