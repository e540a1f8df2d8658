use std::path::PathBuf;

use clap::Parser;

/// Tweet relay CLI arguments
#[derive(Debug, Default, Parser)]
#[command(
    name = "tweet-relay",
    version,
    about = "Relay new posts from monitored accounts to a push channel"
)]
pub struct Cli {
    /// JSON config file (defaults to ./config.json when present)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Run a single pass and exit (the default)
    #[arg(long)]
    pub once: bool,

    /// Keep running, one pass per poll interval, until Ctrl+C
    #[arg(long, conflicts_with = "once")]
    pub daemon: bool,

    /// State file path
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Seconds between passes in daemon mode
    #[arg(long)]
    pub poll_interval: Option<u64>,
}
