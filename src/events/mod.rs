//! Events module for the assistant event bus
//!
//! Provides the typed events that couple the wake detector, the session
//! manager and UI observers, plus the bus that dispatches them.

pub mod bus;

use serde::{Deserialize, Serialize};

use crate::state::AssistantState;

pub use bus::EventBus;

/// Recording indicator shown by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Transcript to display, empty while waiting for speech
    pub speech: String,
    /// Whether a command is being captured
    pub is_recording: bool,
}

impl StatusPayload {
    pub fn recording() -> Self {
        Self {
            speech: String::new(),
            is_recording: true,
        }
    }

    pub fn stopped() -> Self {
        Self {
            speech: String::new(),
            is_recording: false,
        }
    }

    pub fn transcript(speech: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            is_recording: false,
        }
    }
}

/// Events carried on the assistant bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum AssistantEvent {
    /// Wake acknowledged, open an active session
    #[serde(rename = "startListening")]
    StartListening,

    /// A command captured during an active session
    #[serde(rename = "voiceCommand")]
    VoiceCommand(String),

    /// Text to speak back to the user
    #[serde(rename = "assistant:speak")]
    Speak(String),

    /// The active session finished, passive listening may resume
    #[serde(rename = "assistant:done")]
    Done,

    /// Recording indicator update
    #[serde(rename = "status")]
    Status(StatusPayload),

    /// Session manager moved to a new state
    #[serde(rename = "assistant:stateChange")]
    StateChange(AssistantState),

    /// Wake detector's UI hint, e.g. "listening"
    #[serde(rename = "assistant:state")]
    Indicator(String),

    /// The command router asked the UI to open a screen
    #[serde(rename = "assistant:navigate")]
    Navigate { screen: String },
}

/// Names handlers subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StartListening,
    VoiceCommand,
    Speak,
    Done,
    Status,
    StateChange,
    Indicator,
    Navigate,
}

impl EventKind {
    /// Every kind, in declaration order
    pub const ALL: [EventKind; 8] = [
        EventKind::StartListening,
        EventKind::VoiceCommand,
        EventKind::Speak,
        EventKind::Done,
        EventKind::Status,
        EventKind::StateChange,
        EventKind::Indicator,
        EventKind::Navigate,
    ];

    /// Canonical event name
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::StartListening => "startListening",
            EventKind::VoiceCommand => "voiceCommand",
            EventKind::Speak => "assistant:speak",
            EventKind::Done => "assistant:done",
            EventKind::Status => "status",
            EventKind::StateChange => "assistant:stateChange",
            EventKind::Indicator => "assistant:state",
            EventKind::Navigate => "assistant:navigate",
        }
    }

    /// Whether UI clients are interested in this kind
    pub fn is_ui_facing(self) -> bool {
        matches!(
            self,
            EventKind::Status | EventKind::StateChange | EventKind::Indicator | EventKind::Navigate
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AssistantEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AssistantEvent::StartListening => EventKind::StartListening,
            AssistantEvent::VoiceCommand(_) => EventKind::VoiceCommand,
            AssistantEvent::Speak(_) => EventKind::Speak,
            AssistantEvent::Done => EventKind::Done,
            AssistantEvent::Status(_) => EventKind::Status,
            AssistantEvent::StateChange(_) => EventKind::StateChange,
            AssistantEvent::Indicator(_) => EventKind::Indicator,
            AssistantEvent::Navigate { .. } => EventKind::Navigate,
        }
    }
}

impl std::fmt::Display for AssistantEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssistantEvent::StartListening | AssistantEvent::Done => write!(f, "{}", self.kind()),
            AssistantEvent::VoiceCommand(text) | AssistantEvent::Speak(text) => {
                write!(f, "{} ({:?})", self.kind(), text)
            }
            AssistantEvent::Status(status) => write!(
                f,
                "status (speech={:?}, recording={})",
                status.speech, status.is_recording
            ),
            AssistantEvent::StateChange(state) => write!(f, "{} ({})", self.kind(), state),
            AssistantEvent::Indicator(label) => write!(f, "{} ({})", self.kind(), label),
            AssistantEvent::Navigate { screen } => write!(f, "{} ({})", self.kind(), screen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AssistantEvent::Status(StatusPayload::recording());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"status""#));
        assert!(json.contains(r#""isRecording":true"#));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"event":"assistant:stateChange","payload":"thinking"}"#;
        let event: AssistantEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AssistantEvent::StateChange(AssistantState::Thinking));

        let json = r#"{"event":"assistant:done"}"#;
        let event: AssistantEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AssistantEvent::Done);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(AssistantEvent::StartListening.kind().as_str(), "startListening");
        assert_eq!(
            AssistantEvent::Indicator("listening".into()).kind().as_str(),
            "assistant:state"
        );
        assert!(EventKind::Status.is_ui_facing());
        assert!(!EventKind::Done.is_ui_facing());
    }
}
