//! Boundary checks applied to user text before it reaches the engine.

use serde::{Deserialize, Serialize};

/// How submitted text is prepared for classification.
///
/// Blank input is always rejected. Length limiting is opt-in: engines
/// enforce their own token limits, so `max_chars` is only a guard for
/// callers that want to cap what gets submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPolicy {
    pub max_chars: Option<usize>,
}

impl InputPolicy {
    pub fn with_max_chars(max_chars: Option<usize>) -> Self {
        Self { max_chars }
    }

    /// Trim `text` and apply the length cap.
    ///
    /// Returns `None` for empty or whitespace-only input. Truncation counts
    /// characters, so a multi-byte code point is never split.
    pub fn prepare<'a>(&self, text: &'a str) -> Option<&'a str> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let Some(max) = self.max_chars else {
            return Some(trimmed);
        };
        match trimmed.char_indices().nth(max) {
            Some((byte_idx, _)) => Some(&trimmed[..byte_idx]),
            None => Some(trimmed),
        }
    }
}
