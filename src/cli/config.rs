//! Configuration management CLI commands.
//!
//! Commands for viewing, checking and initializing the policy file.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Subcommand;

use crate::config::{PolicyFile, SpamPolicy, load_or_init, read_policy};

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Show the effective policy
    Show {
        /// Show only keys starting with this prefix (e.g., "Caps", "Disable")
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Validate the policy file without changing it
    Check,

    /// Create the policy file with defaults, or rewrite it with missing keys filled in
    Init,

    /// Show the policy file path
    Path,
}

/// Run a config command against the file at `path`.
pub fn run_config_command(cmd: ConfigCommand, path: &Path) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { filter } => show_policy(path, filter),
        ConfigCommand::Check => check_policy(path),
        ConfigCommand::Init => init_policy(path),
        ConfigCommand::Path => show_path(path),
    }
}

/// Policy from `path`, or the defaults if the file does not exist yet.
pub fn effective_policy(path: &Path) -> anyhow::Result<SpamPolicy> {
    if path.exists() {
        Ok(read_policy(path)?)
    } else {
        Ok(SpamPolicy::default())
    }
}

/// Flatten a policy into `(key, value)` rows using the file's key names.
pub fn policy_rows(policy: &SpamPolicy) -> anyhow::Result<Vec<(String, String)>> {
    let value = serde_json::to_value(PolicyFile::from(policy))?;
    let rows = match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let shown = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, shown)
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(rows)
}

fn show_policy(path: &Path, filter: Option<String>) -> anyhow::Result<()> {
    let policy = effective_policy(path)?;
    let rows = policy_rows(&policy)?;

    let max_key_len = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    println!("Antispam policy ({}):", path.display());
    println!();

    for (key, value) in rows {
        if let Some(ref f) = filter {
            if !key.starts_with(f.as_str()) {
                continue;
            }
        }
        println!("  {:width$}  {}", key, value, width = max_key_len);
    }

    Ok(())
}

fn check_policy(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    read_policy(path)?;
    println!("{} is valid", path.display());
    Ok(())
}

fn init_policy(path: &Path) -> anyhow::Result<()> {
    let existed = path.exists();
    load_or_init(path)?;
    if existed {
        println!("Rewrote {}", path.display());
    } else {
        println!("Wrote default config to {}", path.display());
    }
    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("{}", path.display());
    match file_summary(path)? {
        Some(summary) => println!("  {}", summary),
        None => println!("  (does not exist, using defaults)"),
    }
    Ok(())
}

/// Size and modification time of the file, or `None` if it is missing.
fn file_summary(path: &Path) -> anyhow::Result<Option<String>> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };
    let modified = metadata
        .modified()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|_| "unknown".to_string());
    Ok(Some(format!(
        "{} bytes, modified {}",
        metadata.len(),
        modified
    )))
}
