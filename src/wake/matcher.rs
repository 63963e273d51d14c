//! Wake phrase matching on recognizer transcripts

use crate::config::MatchPolicy;

/// Case- and trim-insensitive matcher over a set of wake phrases
#[derive(Debug, Clone)]
pub struct WakeMatcher {
    phrases: Vec<String>,
    policy: MatchPolicy,
}

impl WakeMatcher {
    pub fn new<I, S>(phrases: I, policy: MatchPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases, policy }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Whether one transcript wakes the assistant
    pub fn matches(&self, transcript: &str) -> bool {
        let text = normalize(transcript);
        if text.is_empty() {
            return false;
        }

        self.phrases.iter().any(|phrase| match self.policy {
            MatchPolicy::Exact => text == *phrase,
            MatchPolicy::Prefix => text.starts_with(phrase.as_str()),
            MatchPolicy::Contains => text.contains(phrase.as_str()),
        })
    }

    /// Whether any alternative from a recognizer result matches
    pub fn matches_any<S: AsRef<str>>(&self, transcripts: &[S]) -> bool {
        transcripts.iter().any(|t| self.matches(t.as_ref()))
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
