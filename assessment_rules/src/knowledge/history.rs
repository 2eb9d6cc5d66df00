//! Pattern usage history - the ordered log of which patterns fired when.
//!
//! Cooldown filtering and reactive triggers ("same pattern fired N times in
//! a row") both query this log.

use serde::{Deserialize, Serialize};

/// A single pattern firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternUse {
    pub pattern_id: String,
    pub category: String,
    pub turn: u32,
}

/// Ordered log of pattern firings for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternHistory {
    entries: Vec<PatternUse>,
}

impl PatternHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pattern firing. Entries are expected in turn order.
    pub fn record(&mut self, pattern_id: impl Into<String>, category: impl Into<String>, turn: u32) {
        self.entries.push(PatternUse {
            pattern_id: pattern_id.into(),
            category: category.into(),
            turn,
        });
    }

    /// The turn the given pattern last fired, if ever.
    pub fn last_fired(&self, pattern_id: &str) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.pattern_id == pattern_id)
            .map(|e| e.turn)
    }

    /// The turn a pattern of the given category last fired, if ever.
    pub fn last_fired_category(&self, category: &str) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.category == category)
            .map(|e| e.turn)
    }

    /// The most recent pattern and the length of its trailing run of
    /// consecutive firings.
    pub fn trailing_run(&self) -> Option<(&str, u32)> {
        let last = self.entries.last()?;
        let run = self
            .entries
            .iter()
            .rev()
            .take_while(|e| e.pattern_id == last.pattern_id)
            .count() as u32;
        Some((last.pattern_id.as_str(), run))
    }

    /// Iterate all entries in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &PatternUse> {
        self.entries.iter()
    }

    /// Number of recorded firings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_fired() {
        let mut history = PatternHistory::new();
        history.record("explain_process", "education", 1);
        history.record("capture_goal", "discovery", 2);
        history.record("explain_process", "education", 4);

        assert_eq!(history.last_fired("explain_process"), Some(4));
        assert_eq!(history.last_fired("capture_goal"), Some(2));
        assert_eq!(history.last_fired("never_fired"), None);
    }

    #[test]
    fn test_last_fired_category() {
        let mut history = PatternHistory::new();
        history.record("explain_process", "education", 1);
        history.record("capture_goal", "discovery", 3);

        assert_eq!(history.last_fired_category("education"), Some(1));
        assert_eq!(history.last_fired_category("discovery"), Some(3));
        assert_eq!(history.last_fired_category("navigation"), None);
    }

    #[test]
    fn test_trailing_run() {
        let mut history = PatternHistory::new();
        assert_eq!(history.trailing_run(), None);

        history.record("capture_goal", "discovery", 1);
        history.record("explain_process", "education", 2);
        history.record("explain_process", "education", 3);
        history.record("explain_process", "education", 4);

        assert_eq!(history.trailing_run(), Some(("explain_process", 3)));
    }
}
