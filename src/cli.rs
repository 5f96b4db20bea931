use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "channel-reposter", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    /// File with source channels, one per line. Overrides `sources.channel_file`.
    #[arg(long)]
    pub channel_file: Option<PathBuf>,

    /// Channel to repost into. Overrides `platform.destination`.
    #[arg(long)]
    pub destination: Option<String>,

    /// Run a single sync cycle and exit.
    #[arg(long)]
    pub once: bool,
}
