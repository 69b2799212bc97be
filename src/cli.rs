use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "knobedit", about = "Terminal synthesizer editor with knob controller mapping")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List available MIDI ports
    Enumerate,
    /// Load a layout and synth definition and print what they bind
    Describe {
        /// UI description (.toml)
        ui: PathBuf,
        /// Synth definition (.toml)
        synth: PathBuf,
    },
    /// Open the editor
    Run(RunArgs),
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// UI description (.toml)
    pub ui: PathBuf,

    /// Synth definition (.toml)
    pub synth: PathBuf,

    /// Synthesizer MIDI port name filter (default: from config, else offline)
    #[arg(long)]
    pub device: Option<String>,

    /// Knob controller MIDI input name filter (default: from config, else none)
    #[arg(long)]
    pub knobs: Option<String>,

    /// Config file (.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
