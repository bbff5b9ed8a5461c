use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use antispam::cli::{Cli, Command, run_config_command, run_replay};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config_path = cli.config_path();
    tracing::debug!("Using config file {}", config_path.display());

    match cli.command {
        Command::Config(cmd) => run_config_command(cmd, &config_path),
        Command::Replay(args) => run_replay(args, &config_path).await,
    }
}

/// Logs go to stderr so command output on stdout stays machine readable.
fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("antispam=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
