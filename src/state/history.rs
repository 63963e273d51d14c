//! Append-only record of recognized commands

use std::time::SystemTime;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub text: String,
    pub recorded_at: SystemTime,
}

/// Commands heard during this process's lifetime, oldest first
#[derive(Debug, Default)]
pub struct CommandHistory {
    entries: Vec<HistoryEntry>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, text: &str) {
        self.entries.push(HistoryEntry {
            text: text.to_string(),
            recorded_at: SystemTime::now(),
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(|e| e.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keeps_order() {
        let mut history = CommandHistory::new();
        assert!(history.entries().is_empty());

        history.record("open calendar");
        history.record("turn off notifications");

        let texts: Vec<_> = history.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["open calendar", "turn off notifications"]);
        assert_eq!(history.last(), Some("turn off notifications"));
    }
}
