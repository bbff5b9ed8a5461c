//! Command-line interface.

mod config;
mod replay;

pub use config::{ConfigCommand, effective_policy, policy_rows, run_config_command};
pub use replay::{
    Replay, ReplayArgs, ReplayEvent, ReplayLine, ReplayRecord, parse_script, run_replay,
};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "antispam", version, about = "Chat spam scoring and mitigation")]
pub struct Cli {
    /// Path to antispamconfig.json
    #[arg(long, global = true, env = crate::config::CONFIG_PATH_ENV)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Config file path, falling back to the default location.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::default_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect or initialize the policy file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Replay a JSON-lines event script and print one verdict per event
    Replay(ReplayArgs),
}
