//! Spam policy configuration.
//!
//! The policy is validated once when it is loaded and then shared as an
//! immutable snapshot. Reloading swaps the whole snapshot, so an evaluation
//! always sees every field from the same policy.
//!
//! On disk the policy lives in `antispamconfig.json`:
//!
//! ```text
//! {
//!   "Action": "ignore",
//!   "CapsRatio": 0.66,
//!   "CapsWeight": 2.0,
//!   "DisableBossMessages": false,
//!   "DisableOrbMessages": false,
//!   "MaxSlots": 256,
//!   "NormalWeight": 1.0,
//!   "ShortLength": 4,
//!   "ShortWeight": 1.5,
//!   "Threshold": 5.0,
//!   "Time": 5.0
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "antispamconfig.json";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "ANTISPAM_CONFIG";

/// What happens to a client whose score crosses the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MitigationAction {
    /// Drop the message and warn the client.
    #[default]
    Ignore,
    /// Disconnect the client.
    Kick,
}

impl MitigationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Kick => "kick",
        }
    }
}

impl fmt::Display for MitigationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MitigationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(MitigationAction::Ignore),
            "kick" => Ok(MitigationAction::Kick),
            _ => Err(format!(
                "invalid action '{}', expected 'ignore' or 'kick'",
                s
            )),
        }
    }
}

/// Validated spam policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SpamPolicy {
    /// Seconds of inactivity after which a score is forgotten.
    pub decay_window_secs: f64,
    /// Messages whose trimmed length is at most this many chars count as short.
    pub short_length: usize,
    /// Weight added for a short message.
    pub short_weight: f64,
    /// Uppercase fraction at or above which a message counts as shouting.
    pub caps_ratio_threshold: f64,
    /// Weight added for a shouting message.
    pub caps_weight: f64,
    /// Weight added for any other message.
    pub normal_weight: f64,
    /// Score above which the client is mitigated.
    pub threshold: f64,
    /// Mitigation applied once the threshold is crossed.
    pub action: MitigationAction,
    /// Suppress boss spawn/defeat broadcasts.
    pub disable_boss_broadcast: bool,
    /// Suppress shadow orb / crimson heart broadcasts.
    pub disable_orb_broadcast: bool,
    /// Number of client slots tracked by the score store.
    pub capacity: usize,
}

impl Default for SpamPolicy {
    fn default() -> Self {
        Self {
            decay_window_secs: 5.0,
            short_length: 4,
            short_weight: 1.5,
            caps_ratio_threshold: 0.66,
            caps_weight: 2.0,
            normal_weight: 1.0,
            threshold: 5.0,
            action: MitigationAction::Ignore,
            disable_boss_broadcast: false,
            disable_orb_broadcast: false,
            capacity: 256,
        }
    }
}

impl SpamPolicy {
    /// Check every field invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("Time", self.decay_window_secs)?;
        non_negative("ShortWeight", self.short_weight)?;
        non_negative("CapsRatio", self.caps_ratio_threshold)?;
        non_negative("CapsWeight", self.caps_weight)?;
        non_negative("NormalWeight", self.normal_weight)?;

        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::invalid(
                "Threshold",
                format!("must be a positive number, got {}", self.threshold),
            ));
        }
        if self.capacity == 0 {
            return Err(ConfigError::invalid("MaxSlots", "must be at least 1"));
        }

        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a non-negative number, got {}", value),
        ))
    }
}

/// On-disk shape of the policy. Field names follow the config file keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PolicyFile {
    pub action: String,
    pub caps_ratio: f64,
    pub caps_weight: f64,
    pub disable_boss_messages: bool,
    pub disable_orb_messages: bool,
    pub max_slots: usize,
    pub normal_weight: f64,
    pub short_length: i64,
    pub short_weight: f64,
    pub threshold: f64,
    pub time: f64,
}

impl Default for PolicyFile {
    fn default() -> Self {
        PolicyFile::from(&SpamPolicy::default())
    }
}

impl From<&SpamPolicy> for PolicyFile {
    fn from(policy: &SpamPolicy) -> Self {
        Self {
            action: policy.action.as_str().to_string(),
            caps_ratio: policy.caps_ratio_threshold,
            caps_weight: policy.caps_weight,
            disable_boss_messages: policy.disable_boss_broadcast,
            disable_orb_messages: policy.disable_orb_broadcast,
            max_slots: policy.capacity,
            normal_weight: policy.normal_weight,
            short_length: policy.short_length as i64,
            short_weight: policy.short_weight,
            threshold: policy.threshold,
            time: policy.decay_window_secs,
        }
    }
}

impl TryFrom<PolicyFile> for SpamPolicy {
    type Error = ConfigError;

    fn try_from(file: PolicyFile) -> Result<Self, Self::Error> {
        let action = file
            .action
            .parse::<MitigationAction>()
            .map_err(|e| ConfigError::invalid("Action", e))?;
        let short_length = usize::try_from(file.short_length).map_err(|_| {
            ConfigError::invalid(
                "ShortLength",
                format!("must not be negative, got {}", file.short_length),
            )
        })?;

        let policy = SpamPolicy {
            decay_window_secs: file.time,
            short_length,
            short_weight: file.short_weight,
            caps_ratio_threshold: file.caps_ratio,
            caps_weight: file.caps_weight,
            normal_weight: file.normal_weight,
            threshold: file.threshold,
            action,
            disable_boss_broadcast: file.disable_boss_messages,
            disable_orb_broadcast: file.disable_orb_messages,
            capacity: file.max_slots,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Shared, reloadable policy snapshot.
pub struct PolicyHandle {
    current: RwLock<Arc<SpamPolicy>>,
}

impl PolicyHandle {
    /// Wrap an initial policy. Fails if it does not validate.
    pub fn new(policy: SpamPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(policy)),
        })
    }

    /// The active policy. Holds no lock once returned.
    pub fn snapshot(&self) -> Arc<SpamPolicy> {
        let current = self.current.read();
        Arc::clone(&*current)
    }

    /// Install a new policy and return the one it replaced.
    ///
    /// An invalid policy is rejected and the active one stays in place.
    pub fn replace(&self, policy: SpamPolicy) -> Result<Arc<SpamPolicy>, ConfigError> {
        policy.validate()?;
        let mut current = self.current.write();
        Ok(std::mem::replace(&mut *current, Arc::new(policy)))
    }
}

/// Resolve the config file path: `ANTISPAM_CONFIG`, then the user config dir.
pub fn default_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("antispam")
        .join(CONFIG_FILE_NAME)
}

/// Read and validate a policy file.
pub fn read_policy(path: &Path) -> Result<SpamPolicy, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: PolicyFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    SpamPolicy::try_from(file)
}

/// Write a policy in file form, creating parent directories as needed.
pub fn write_policy(path: &Path, policy: &SpamPolicy) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let json = serde_json::to_string_pretty(&PolicyFile::from(policy)).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    std::fs::write(path, json).map_err(io_err)
}

/// Read the policy if the file exists, fall back to defaults otherwise, and
/// write the effective policy back so missing keys show up with defaults.
///
/// An invalid file is an error and is left untouched on disk.
pub fn load_or_init(path: &Path) -> Result<SpamPolicy, ConfigError> {
    let policy = if path.exists() {
        read_policy(path)?
    } else {
        SpamPolicy::default()
    };
    write_policy(path, &policy)?;
    Ok(policy)
}
