//! Platform capabilities the controller drives
//!
//! The recognizer, synthesizer, haptics and command router are consumed
//! through these traits. Recognizer callbacks come back through
//! `RecognizerCallbacks`, which feeds the controller's input queue.

pub mod console;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{RecognizerOptions, VoiceParams};
use crate::events::{AssistantEvent, EventBus};

/// Failures reported by capabilities. None of them is fatal to the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("recognizer failed to start: {0}")]
    Start(String),

    #[error("speech synthesis failed: {0}")]
    Speech(String),

    #[error("command routing failed: {0}")]
    Routing(String),

    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

/// Exclusive speech recognizer
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start(&self, locale: &str, options: RecognizerOptions) -> Result<(), CapabilityError>;

    async fn stop(&self) -> Result<(), CapabilityError>;

    /// Tear the recognizer down completely, used when it appears wedged
    async fn destroy(&self) -> Result<(), CapabilityError>;
}

/// Speech synthesis and playback
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Interrupt any playback in progress
    async fn stop(&self) -> Result<(), CapabilityError>;

    /// Speak `text`, resolving when playback ends or is interrupted
    async fn speak(&self, text: &str, voice: &VoiceParams) -> Result<(), CapabilityError>;
}

/// Options for a haptic effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HapticOptions {
    pub enable_vibrate_fallback: bool,
    pub ignore_system_settings: bool,
}

impl Default for HapticOptions {
    fn default() -> Self {
        Self {
            enable_vibrate_fallback: true,
            ignore_system_settings: false,
        }
    }
}

/// Fire-and-forget haptic feedback
pub trait Haptics: Send + Sync {
    fn trigger(&self, effect: &str, options: HapticOptions);
}

/// Resolves a recognized utterance to an application action
#[async_trait]
pub trait CommandRouter: Send + Sync {
    async fn route_voice_command(&self, text: &str, navigator: &Navigator) -> Result<(), CapabilityError>;
}

/// Handed to the command router so it can steer the UI and answer out loud
#[derive(Clone)]
pub struct Navigator {
    bus: Arc<EventBus>,
}

impl Navigator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Ask the UI to open a screen
    pub fn navigate(&self, screen: &str) {
        self.bus.emit(AssistantEvent::Navigate {
            screen: screen.to_string(),
        });
    }

    /// Queue a spoken response
    pub fn speak(&self, text: &str) {
        self.bus.emit(AssistantEvent::Speak(text.to_string()));
    }
}

/// Error payload from the recognizer, e.g. `{"error":"timeout"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RecognitionError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }
}

/// Notifications raised by the recognizer
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Start,
    End,
    Error(RecognitionError),
    Results(Vec<String>),
    PartialResults(Vec<String>),
}

type Sink = Arc<dyn Fn(RecognizerEvent) + Send + Sync>;

/// Callback surface handed to a recognizer implementation
#[derive(Clone)]
pub struct RecognizerCallbacks {
    sink: Sink,
}

impl RecognizerCallbacks {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(RecognizerEvent) + Send + Sync + 'static,
    {
        Self { sink: Arc::new(sink) }
    }

    pub fn on_speech_start(&self) {
        (self.sink)(RecognizerEvent::Start);
    }

    pub fn on_speech_end(&self) {
        (self.sink)(RecognizerEvent::End);
    }

    pub fn on_speech_error(&self, error: RecognitionError) {
        (self.sink)(RecognizerEvent::Error(error));
    }

    pub fn on_speech_results(&self, transcripts: Vec<String>) {
        (self.sink)(RecognizerEvent::Results(transcripts));
    }

    pub fn on_speech_partial_results(&self, transcripts: Vec<String>) {
        (self.sink)(RecognizerEvent::PartialResults(transcripts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::Mutex;

    #[test]
    fn test_callbacks_forward_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callbacks = RecognizerCallbacks::new(move |event| sink.lock().unwrap().push(event));

        callbacks.on_speech_start();
        callbacks.on_speech_partial_results(vec!["hey".into()]);
        callbacks.on_speech_error(RecognitionError::new("timeout"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RecognizerEvent::Start,
                RecognizerEvent::PartialResults(vec!["hey".into()]),
                RecognizerEvent::Error(RecognitionError::new("timeout")),
            ]
        );
    }

    #[test]
    fn test_recognition_error_shape() {
        let err: RecognitionError = serde_json::from_str(r#"{"error":"timeout"}"#).unwrap();
        assert_eq!(err, RecognitionError::new("timeout"));
    }

    #[test]
    fn test_navigator_publishes_on_bus() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on_each(&[EventKind::Navigate, EventKind::Speak], move |event| {
            sink.lock().unwrap().push(event.clone())
        });

        let navigator = Navigator::new(Arc::clone(&bus));
        navigator.navigate("calendar");
        navigator.speak("Opening calendar");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                AssistantEvent::Navigate {
                    screen: "calendar".into()
                },
                AssistantEvent::Speak("Opening calendar".into()),
            ]
        );
    }
}
