//! Three-bucket message weighting.

use std::fmt;

use crate::config::SpamPolicy;

/// Bucket a message falls into. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Trimmed length at or below the short limit.
    Short,
    /// Uppercase ratio at or above the caps threshold.
    Caps,
    Normal,
}

impl MessageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Caps => "caps",
            Self::Normal => "normal",
        }
    }

    /// Weight this class carries under `policy`.
    pub fn weight(&self, policy: &SpamPolicy) -> f64 {
        match self {
            Self::Short => policy.short_weight,
            Self::Caps => policy.caps_weight,
            Self::Normal => policy.normal_weight,
        }
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `text`. The short check runs first, so empty or whitespace-only
/// text is always `Short` and never reaches the caps ratio.
pub fn classify(text: &str, policy: &SpamPolicy) -> MessageClass {
    if text.trim().chars().count() <= policy.short_length {
        return MessageClass::Short;
    }

    match caps_ratio(text) {
        Some(ratio) if ratio >= policy.caps_ratio_threshold => MessageClass::Caps,
        _ => MessageClass::Normal,
    }
}

/// Fraction of uppercase chars among all chars, `None` for empty text.
pub fn caps_ratio(text: &str) -> Option<f64> {
    let (upper, total) = text.chars().fold((0usize, 0usize), |(upper, total), c| {
        (upper + usize::from(c.is_uppercase()), total + 1)
    });
    if total == 0 {
        None
    } else {
        Some(upper as f64 / total as f64)
    }
}
