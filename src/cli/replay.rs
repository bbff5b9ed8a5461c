//! Replay a scripted event stream through the dispatcher.
//!
//! Each non-empty script line is a JSON object. `at` is seconds since the
//! start of the replay, `slot` the client slot:
//!
//! ```text
//! {"at": 0, "slot": 1, "chat": "hi"}
//! {"at": 1, "slot": 1, "command": "w", "line": "w Alice hello there"}
//! {"at": 2, "slot": 1, "leave": true}
//! {"at": 3, "reload": true}
//! ```
//!
//! Lines starting with `#` are comments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::cli::config::effective_policy;
use crate::config::{MitigationAction, SpamPolicy, read_policy};
use crate::dispatch::{
    AntiSpam, EventOutcome, EventSource, ExemptSlots, IGNORE_MESSAGE, KICK_REASON, ManualClock,
    Mitigator,
};

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Event script (JSON lines)
    pub script: PathBuf,

    /// Slots holding the exemption permission (repeatable)
    #[arg(long = "exempt", value_name = "SLOT")]
    pub exempt: Vec<usize>,
}

fn yes() -> bool {
    true
}

/// One scripted event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayLine {
    /// Seconds since the start of the replay.
    #[serde(default)]
    pub at: f64,
    #[serde(default)]
    pub slot: usize,
    #[serde(flatten)]
    pub event: ReplayEvent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplayEvent {
    Chat {
        chat: String,
    },
    Command {
        command: String,
        line: String,
        #[serde(default = "yes")]
        real: bool,
    },
    Leave {
        leave: bool,
    },
    Reload {
        reload: bool,
    },
}

/// One line of replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ReplayRecord {
    Scored {
        at: f64,
        slot: usize,
        source: &'static str,
        class: &'static str,
        weight: f64,
        score: f64,
        decayed: bool,
        exempt: bool,
        action: Option<&'static str>,
    },
    Skipped {
        at: f64,
        slot: usize,
    },
    Left {
        at: f64,
        slot: usize,
    },
    Reloaded {
        at: f64,
        ok: bool,
        message: String,
    },
}

impl ReplayRecord {
    fn scored(at: f64, slot: usize, outcome: EventOutcome) -> Self {
        Self::Scored {
            at,
            slot,
            source: match outcome.source {
                EventSource::Chat => "chat",
                EventSource::Whisper => "whisper",
            },
            class: outcome.verdict.class.as_str(),
            weight: outcome.verdict.weight,
            score: outcome.verdict.score,
            decayed: outcome.verdict.decayed,
            exempt: outcome.exempt,
            action: outcome.mitigated.map(|a| a.as_str()),
        }
    }
}

/// Mitigator that reports what a host would do.
struct LogMitigator;

impl Mitigator for LogMitigator {
    fn apply(&self, slot: usize, action: MitigationAction) {
        match action {
            MitigationAction::Ignore => {
                tracing::info!(slot, "Sending to client: {}", IGNORE_MESSAGE)
            }
            MitigationAction::Kick => tracing::info!(slot, "Kicking client: {}", KICK_REASON),
        }
    }
}

/// Drives an [`AntiSpam`] instance on a manual clock.
pub struct Replay {
    spam: AntiSpam,
    clock: Arc<ManualClock>,
    start: DateTime<Utc>,
    config_path: PathBuf,
}

impl Replay {
    pub fn new(
        policy: SpamPolicy,
        exempt: &[usize],
        config_path: impl Into<PathBuf>,
        start: DateTime<Utc>,
    ) -> crate::Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let spam = AntiSpam::builder(policy, Arc::new(LogMitigator))
            .permissions(Arc::new(ExemptSlots::new(exempt.iter().copied())))
            .clock(clock.clone())
            .build()?;
        Ok(Self {
            spam,
            clock,
            start,
            config_path: config_path.into(),
        })
    }

    pub fn antispam(&self) -> &AntiSpam {
        &self.spam
    }

    /// Wall-clock time of an event `at` seconds into the replay.
    fn event_time(&self, at: f64) -> anyhow::Result<DateTime<Utc>> {
        if !at.is_finite() || at < 0.0 {
            anyhow::bail!("Event time {} is not a non-negative number of seconds", at);
        }
        // `as` saturates; overflow is caught by the checked steps below
        let millis = (at * 1000.0).round() as i64;
        Duration::try_milliseconds(millis)
            .and_then(|offset| self.start.checked_add_signed(offset))
            .with_context(|| format!("Event time {} is out of range", at))
    }

    /// Apply one event. Store errors and bad event times abort the replay; a
    /// rejected reload does not.
    pub fn step(&self, line: &ReplayLine) -> anyhow::Result<ReplayRecord> {
        self.clock.set(self.event_time(line.at)?);

        let outcome = match &line.event {
            ReplayEvent::Chat { chat } => self.spam.chat_event(line.slot, chat, false)?,
            ReplayEvent::Command {
                command,
                line: command_line,
                real,
            } => self
                .spam
                .whisper_event(line.slot, command, command_line, *real)?,
            ReplayEvent::Leave { .. } => {
                self.spam.on_disconnect(line.slot)?;
                return Ok(ReplayRecord::Left {
                    at: line.at,
                    slot: line.slot,
                });
            }
            ReplayEvent::Reload { .. } => return Ok(self.reload(line.at)),
        };

        Ok(match outcome {
            Some(outcome) => ReplayRecord::scored(line.at, line.slot, outcome),
            None => ReplayRecord::Skipped {
                at: line.at,
                slot: line.slot,
            },
        })
    }

    fn reload(&self, at: f64) -> ReplayRecord {
        let result = read_policy(&self.config_path).and_then(|p| self.spam.on_config_reload(p));
        match result {
            Ok(()) => ReplayRecord::Reloaded {
                at,
                ok: true,
                message: "Reloaded antispam config.".to_string(),
            },
            Err(e) => ReplayRecord::Reloaded {
                at,
                ok: false,
                message: e.to_string(),
            },
        }
    }
}

/// Parse a script, skipping blank lines and `#` comments.
pub fn parse_script(raw: &str) -> anyhow::Result<Vec<ReplayLine>> {
    raw.lines()
        .enumerate()
        .filter(|(_, l)| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .map(|(n, l)| {
            let line: ReplayLine = serde_json::from_str(l)
                .with_context(|| format!("Invalid event on line {}", n + 1))?;
            if !line.at.is_finite() || line.at < 0.0 {
                anyhow::bail!("Invalid event on line {}: bad time {}", n + 1, line.at);
            }
            Ok(line)
        })
        .collect()
}

/// Run the `replay` command.
pub async fn run_replay(args: ReplayArgs, config_path: &Path) -> anyhow::Result<()> {
    let policy = effective_policy(config_path)?;
    let raw = tokio::fs::read_to_string(&args.script)
        .await
        .with_context(|| format!("Failed to read {}", args.script.display()))?;
    let script = parse_script(&raw)?;

    tracing::info!(
        "Replaying {} events from {}",
        script.len(),
        args.script.display()
    );

    let replay = Replay::new(policy, &args.exempt, config_path, Utc::now())?;
    let mut mitigations = 0usize;
    for (n, line) in script.iter().enumerate() {
        let record = replay
            .step(line)
            .with_context(|| format!("Replay stopped at event {}", n + 1))?;
        if let ReplayRecord::Scored {
            action: Some(_), ..
        } = record
        {
            mitigations += 1;
        }
        println!("{}", serde_json::to_string(&record)?);
    }

    tracing::info!("Replay finished: {} mitigations", mitigations);
    Ok(())
}
