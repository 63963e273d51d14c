//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Wake phrases used when `VOICE_WAKE_PHRASES` is unset
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["hey charlie", "hi charlie", "hey charly", "ok charlie"];

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Phrases that wake the assistant, stored lower-cased and trimmed
    pub wake_phrases: Vec<String>,

    /// How permissive wake phrase matching is
    pub match_policy: MatchPolicy,

    /// Platform the recognizer tuning is chosen for
    pub platform: Platform,

    /// Locale handed to the recognizer and the speech synthesizer
    pub locale: String,

    /// Utterance spoken right after a wake phrase is heard
    pub acknowledgement: String,

    /// Voice parameters for spoken responses
    pub voice: VoiceParams,

    /// Every delay and timeout the controller uses
    pub timings: Timings,
}

/// How a transcript has to relate to a wake phrase to count as a hit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Transcript equals a phrase
    Exact,
    /// Transcript equals or starts with a phrase
    Prefix,
    /// Transcript equals, starts with or contains a phrase
    #[default]
    Contains,
}

impl std::str::FromStr for MatchPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "contains" | "substring" => Ok(Self::Contains),
            other => bail!("unknown wake match policy: {other}"),
        }
    }
}

/// Target platform of the speech recognition capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Android,
    Ios,
}

impl std::str::FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => bail!("unknown platform: {other}"),
        }
    }
}

impl Platform {
    /// How many times a single arm attempts to start the recognizer.
    /// Android's recognizer regularly rejects the first start after a stop.
    pub fn start_attempts(self) -> u32 {
        match self {
            Platform::Android => 3,
            Platform::Ios => 1,
        }
    }

    /// Recognizer tuning while waiting for the wake phrase
    pub fn passive_options(self) -> RecognizerOptions {
        match self {
            Platform::Android => RecognizerOptions {
                partial_results: true,
                complete_silence_ms: 1_000,
                possibly_complete_silence_ms: 800,
                minimum_length_ms: 300,
            },
            Platform::Ios => RecognizerOptions {
                partial_results: true,
                complete_silence_ms: 1_200,
                possibly_complete_silence_ms: 1_000,
                minimum_length_ms: 0,
            },
        }
    }

    /// Recognizer tuning while capturing a command
    pub fn active_options(self) -> RecognizerOptions {
        match self {
            Platform::Android => RecognizerOptions {
                partial_results: false,
                complete_silence_ms: 2_000,
                possibly_complete_silence_ms: 1_500,
                minimum_length_ms: 1_000,
            },
            Platform::Ios => RecognizerOptions {
                partial_results: false,
                complete_silence_ms: 2_000,
                possibly_complete_silence_ms: 1_500,
                minimum_length_ms: 0,
            },
        }
    }
}

/// Platform-specific recognizer tuning passed on every start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerOptions {
    pub partial_results: bool,
    pub complete_silence_ms: u64,
    pub possibly_complete_silence_ms: u64,
    pub minimum_length_ms: u64,
}

/// Voice parameters for speech synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            rate: 0.5,
            pitch: 1.0,
        }
    }
}

/// Delays used by the wake detector and session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Pause between recognizer start attempts within one arm
    pub start_retry_delay: Duration,
    /// Re-arm delay after every start attempt failed
    pub arm_failure_backoff: Duration,
    /// How long a started recognizer may stay silent before it is considered dead
    pub warm_up: Duration,
    /// Re-arm delay after the recognizer ended on its own
    pub end_rearm: Duration,
    /// Re-arm delay after a recognizer error
    pub error_rearm: Duration,
    /// Period of the passive-listening watchdog
    pub watchdog: Duration,
    /// Re-arm delay after an active session finished
    pub done_rearm: Duration,
    /// Delay between the wake acknowledgement and `startListening`
    pub start_listening_delay: Duration,
    /// How long a listening session waits for a command
    pub inactivity: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            start_retry_delay: Duration::from_millis(400),
            arm_failure_backoff: Duration::from_millis(2_000),
            warm_up: Duration::from_millis(1_500),
            end_rearm: Duration::from_millis(800),
            error_rearm: Duration::from_millis(1_200),
            watchdog: Duration::from_secs(15),
            done_rearm: Duration::from_millis(1_000),
            start_listening_delay: Duration::from_millis(500),
            inactivity: Duration::from_secs(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("/tmp").join("voice-wake");
        Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            wake_phrases: DEFAULT_WAKE_PHRASES.iter().map(|p| p.to_string()).collect(),
            match_policy: MatchPolicy::default(),
            platform: Platform::default(),
            locale: "en-US".to_string(),
            acknowledgement: "Yes?".to_string(),
            voice: VoiceParams::default(),
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-wake");

        let socket_path = data_dir.join("daemon.sock");

        let wake_phrases = match var("VOICE_WAKE_PHRASES") {
            Some(raw) => parse_phrases(&raw)?,
            None => DEFAULT_WAKE_PHRASES.iter().map(|p| p.to_string()).collect(),
        };

        let match_policy = match var("VOICE_WAKE_MATCH") {
            Some(raw) => raw.parse()?,
            None => MatchPolicy::default(),
        };

        let platform = match var("VOICE_WAKE_PLATFORM") {
            Some(raw) => raw.parse()?,
            None => Platform::default(),
        };

        let locale = var("VOICE_WAKE_LOCALE").unwrap_or_else(|| "en-US".to_string());
        let acknowledgement = var("VOICE_WAKE_ACK").unwrap_or_else(|| "Yes?".to_string());

        Ok(Self {
            socket_path,
            data_dir,
            wake_phrases,
            match_policy,
            platform,
            voice: VoiceParams {
                language: locale.clone(),
                ..VoiceParams::default()
            },
            locale,
            acknowledgement,
            timings: Timings::default(),
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_phrases(raw: &str) -> Result<Vec<String>> {
    let phrases: Vec<String> = raw
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    if phrases.is_empty() {
        bail!("VOICE_WAKE_PHRASES contains no phrases");
    }
    Ok(phrases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_vars(lookup(&[("HOME", "/home/test")])).unwrap();
        assert!(config.socket_path.to_string_lossy().contains("voice-wake"));
        assert_eq!(config.match_policy, MatchPolicy::Contains);
        assert_eq!(config.platform, Platform::Android);
        assert_eq!(config.acknowledgement, "Yes?");
        assert!(config.wake_phrases.contains(&"hey charlie".to_string()));
    }

    #[test]
    fn test_config_requires_home() {
        assert!(Config::from_vars(lookup(&[])).is_err());
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_vars(lookup(&[
            ("HOME", "/home/test"),
            ("VOICE_WAKE_PHRASES", " Hey Wardrobe , ,computer"),
            ("VOICE_WAKE_MATCH", "prefix"),
            ("VOICE_WAKE_PLATFORM", "iOS"),
            ("VOICE_WAKE_LOCALE", "en-GB"),
        ]))
        .unwrap();

        assert_eq!(config.wake_phrases, vec!["hey wardrobe", "computer"]);
        assert_eq!(config.match_policy, MatchPolicy::Prefix);
        assert_eq!(config.platform, Platform::Ios);
        assert_eq!(config.voice.language, "en-GB");
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(Config::from_vars(lookup(&[("HOME", "/h"), ("VOICE_WAKE_MATCH", "fuzzy")])).is_err());
        assert!(Config::from_vars(lookup(&[("HOME", "/h"), ("VOICE_WAKE_PHRASES", " , ")])).is_err());
    }

    #[test]
    fn test_platform_start_attempts() {
        assert_eq!(Platform::Android.start_attempts(), 3);
        assert_eq!(Platform::Ios.start_attempts(), 1);
        assert!(Platform::Android.passive_options().partial_results);
    }
}
