//! Cosmetic broadcast suppression.
//!
//! Servers can hide the world-wide boss and orb announcements. These are plain
//! string matches on colored broadcast text and have nothing to do with the
//! spam score.

use std::sync::LazyLock;

use aho_corasick::{AhoCorasick, Anchored, Input, StartKind};

use crate::config::SpamPolicy;

/// Color of boss spawn/defeat announcements.
pub const BOSS_COLOR: (u8, u8, u8) = (175, 75, 255);

/// Color of shadow orb / crimson heart announcements.
pub const ORB_COLOR: (u8, u8, u8) = (50, 255, 130);

const BOSS_PREFIXES: &[&str] = &[
    "Eye of Cthulhu",
    "Eater of Worlds",
    "Skeletron",
    "King Slime",
    "The Destroyer",
    "The Twins",
    "Skeletron Prime",
    "Wall of Flesh",
    "Plantera",
    "Golem",
    "Brain of Cthulhu",
    "Queen Bee",
    "Duke Fishron",
];

const ORB_MESSAGES: &[&str] = &[
    "A horrible chill goes down your spine...",
    "Screams echo around you...",
];

static BOSS_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .start_kind(StartKind::Anchored)
        .build(BOSS_PREFIXES)
        .expect("Failed to build boss prefix matcher")
});

/// A colored server broadcast about to be sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartText {
    pub text: String,
    pub color: (u8, u8, u8),
}

impl SmartText {
    pub fn new(text: impl Into<String>, color: (u8, u8, u8)) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Which cosmetic category a broadcast belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    Boss,
    Orb,
}

/// Identify a boss or orb announcement.
pub fn broadcast_kind(msg: &SmartText) -> Option<BroadcastKind> {
    if msg.color == BOSS_COLOR
        && BOSS_MATCHER.is_match(Input::new(&msg.text).anchored(Anchored::Yes))
    {
        return Some(BroadcastKind::Boss);
    }
    if msg.color == ORB_COLOR && ORB_MESSAGES.contains(&msg.text.as_str()) {
        return Some(BroadcastKind::Orb);
    }
    None
}

/// Whether `policy` asks for this broadcast to be dropped.
pub fn should_suppress(msg: &SmartText, policy: &SpamPolicy) -> bool {
    match broadcast_kind(msg) {
        Some(BroadcastKind::Boss) => policy.disable_boss_broadcast,
        Some(BroadcastKind::Orb) => policy.disable_orb_broadcast,
        None => false,
    }
}
