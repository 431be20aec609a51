pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sdm")]
#[command(about = "Mount catalogue datasets through FUSE or a remote mount service")]
#[command(version)]
pub struct Args {
    /// Path to the sdm config directory (defaults to ~/.sdm)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: crate::Command,
}
