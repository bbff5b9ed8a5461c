//! Decaying spam score core.
//!
//! ```text
//! text event ──► classify ──► weight
//!                               │
//!                               ▼
//!        ┌──────────────── ScoreStore (slot lock) ───────────────┐
//!        │  idle > window ? score = 0                            │
//!        │  score += weight, last_activity = now                 │
//!        └───────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                 Verdict { score, mitigate: score > threshold }
//! ```
//!
//! Nothing here logs, blocks on I/O, or knows about exemptions. Those belong
//! to the dispatcher.

mod classifier;
mod evaluator;
mod store;

pub use classifier::{MessageClass, caps_ratio, classify};
pub use evaluator::{Evaluator, Verdict};
pub use store::{ScoreStore, SlotState};
