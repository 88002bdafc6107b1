use clap::Parser;
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Parser)]
#[command(
    name = "agentdeck-daemon",
    version = VERSION,
    about = "Runs and supervises AI coding agent sessions across projects"
)]
pub struct Cli {
    /// Settings file; defaults to $AGENTDECK_CONFIG or the platform config dir
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Session history database; overrides the settings file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Project to prepare a session manager for at startup (repeatable)
    #[arg(long = "project", value_name = "DIR")]
    pub projects: Vec<PathBuf>,

    /// Log filter such as `info` or `agentdeck=debug`; RUST_LOG wins when set
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Restart sessions left running by a previous daemon
    #[arg(long)]
    pub resume_orphans: bool,
}
