//! Antispam
//!
//! Scores chat messages per client slot with a decaying score and mitigates
//! clients whose score crosses a threshold.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs       - Crate root with re-exports
//! ├── main.rs      - CLI entrypoint
//! ├── config.rs    - Policy, validation, reloadable snapshot, config file
//! ├── error.rs     - Store and config errors
//! ├── spam/        - Scoring core
//! │   ├── store.rs      - Per-slot score registry
//! │   ├── classifier.rs - Short / caps / normal weighting
//! │   └── evaluator.rs  - Decay, add, threshold verdict
//! ├── dispatch/    - Host-facing service
//! │   ├── hooks.rs      - Permission, mitigation and clock traits
//! │   └── command.rs    - Command specifiers and whisper argument text
//! ├── broadcast.rs - Boss/orb broadcast suppression
//! └── cli/         - `config` and `replay` commands
//! ```

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod spam;

pub use broadcast::{BroadcastKind, SmartText};
pub use config::{MitigationAction, PolicyHandle, SpamPolicy};
pub use dispatch::{
    AntiSpam, AntiSpamBuilder, Clock, EventOutcome, EventSource, ManualClock, Mitigator,
    PermissionCheck, SystemClock,
};
pub use error::{ConfigError, Error, Result, StoreError};
pub use spam::{Evaluator, MessageClass, ScoreStore, SlotState, Verdict};
