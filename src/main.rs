//! Song-X CLI
//!
//! Command-line front end for the Song-X engine.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use songx::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Song-X v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Song-X v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Render {
            input,
            effects,
            location,
        } => commands::render(&input, &effects, &location)
            .with_context(|| format!("rendering {}", input.display())),
        Commands::List { location } => commands::list(&location).context("listing rendered songs"),
        Commands::Info { input } => {
            commands::show_info(&input).with_context(|| format!("reading {}", input.display()))
        }
        Commands::Presets => commands::show_presets().map_err(Into::into),
        Commands::Play {
            input,
            effects,
            seconds,
            output,
            location,
        } => commands::play(&input, &effects, seconds, &output, &location)
            .with_context(|| format!("playing {}", input.display())),
        Commands::Delete { name, location } => {
            commands::delete(&name, &location).with_context(|| format!("deleting {}", name))
        }
    }
}
