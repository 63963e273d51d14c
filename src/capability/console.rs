//! Terminal-backed capabilities for running the daemon without a device
//!
//! Lines typed on stdin stand in for recognized speech, speech and haptics
//! are written to the log. A line starting with `!` is reported as a
//! recognizer error with that code, e.g. `!no_match`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{RecognizerOptions, VoiceParams};

use super::{
    CapabilityError, CommandRouter, HapticOptions, Haptics, Navigator, RecognitionError,
    RecognizerCallbacks, SpeechRecognizer, TextToSpeech,
};

/// Playback time simulated per word
const WORD_DURATION: Duration = Duration::from_millis(250);

/// Recognizer fed by text lines. Each line is one final result followed by
/// an end of speech, like a platform recognizer that stops after a phrase.
/// When the session asked for partial results, the growing word prefixes of
/// the line are reported first.
pub struct ConsoleRecognizer {
    open: Arc<AtomicBool>,
    partial_results: Arc<AtomicBool>,
    callbacks: RecognizerCallbacks,
}

impl ConsoleRecognizer {
    pub fn new(callbacks: RecognizerCallbacks) -> Self {
        Self {
            open: Arc::new(AtomicBool::new(false)),
            partial_results: Arc::new(AtomicBool::new(false)),
            callbacks,
        }
    }

    /// Deliver lines from `reader` while the recognizer is open. Lines
    /// arriving while it is closed are dropped.
    pub fn feed<R>(&self, reader: R) -> JoinHandle<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let open = Arc::clone(&self.open);
        let partial_results = Arc::clone(&self.partial_results);
        let callbacks = self.callbacks.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%e, "console input failed");
                        if open.swap(false, Ordering::SeqCst) {
                            callbacks.on_speech_error(RecognitionError {
                                error: "audio".to_string(),
                                message: Some(e.to_string()),
                            });
                        }
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if !open.swap(false, Ordering::SeqCst) {
                    debug!(%line, "microphone closed, input dropped");
                    continue;
                }

                if let Some(code) = line.strip_prefix('!') {
                    callbacks.on_speech_error(RecognitionError::new(code.trim()));
                    continue;
                }
                if partial_results.load(Ordering::SeqCst) {
                    let words: Vec<&str> = line.split_whitespace().collect();
                    for n in 1..words.len() {
                        callbacks.on_speech_partial_results(vec![words[..n].join(" ")]);
                    }
                }
                callbacks.on_speech_results(vec![line.to_string()]);
                callbacks.on_speech_end();
            }
            debug!("console input closed");
        })
    }
}

#[async_trait]
impl SpeechRecognizer for ConsoleRecognizer {
    async fn start(&self, locale: &str, options: RecognizerOptions) -> Result<(), CapabilityError> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(CapabilityError::Start("console recognizer already open".into()));
        }
        debug!(locale, ?options, "console recognizer open");
        self.partial_results
            .store(options.partial_results, Ordering::SeqCst);
        self.callbacks.on_speech_start();
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), CapabilityError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Speech synthesis that logs the utterance and takes as long as reading it
#[derive(Default)]
pub struct LogSpeaker {
    interrupt: Notify,
}

#[async_trait]
impl TextToSpeech for LogSpeaker {
    async fn stop(&self) -> Result<(), CapabilityError> {
        self.interrupt.notify_waiters();
        Ok(())
    }

    async fn speak(&self, text: &str, voice: &VoiceParams) -> Result<(), CapabilityError> {
        if voice.rate <= 0.0 || !voice.rate.is_finite() {
            return Err(CapabilityError::Speech(format!(
                "unusable speech rate {}",
                voice.rate
            )));
        }
        info!(%text, language = %voice.language, "speaking");
        let words = text.split_whitespace().count().max(1) as u32;

        tokio::select! {
            _ = tokio::time::sleep(WORD_DURATION * words) => {}
            _ = self.interrupt.notified() => debug!("speech interrupted"),
        }
        Ok(())
    }
}

pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn trigger(&self, effect: &str, options: HapticOptions) {
        info!(effect, ?options, "haptic feedback");
    }
}

/// Understands "open <screen>" and echoes everything else
pub struct ConsoleRouter;

#[async_trait]
impl CommandRouter for ConsoleRouter {
    async fn route_voice_command(&self, text: &str, navigator: &Navigator) -> Result<(), CapabilityError> {
        let lower = text.trim().to_lowercase();
        let screen = match lower.strip_prefix("open") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
            _ => {
                navigator.speak(&format!("You said {text}"));
                return Ok(());
            }
        };
        if screen.is_empty() {
            return Err(CapabilityError::Routing("no screen named".into()));
        }

        navigator.navigate(screen);
        navigator.speak(&format!("Opening {screen}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::capability::RecognizerEvent;
    use crate::config::Platform;
    use crate::events::{AssistantEvent, EventBus, EventKind};

    fn recording_recognizer() -> (ConsoleRecognizer, Arc<Mutex<Vec<RecognizerEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callbacks = RecognizerCallbacks::new(move |event| sink.lock().unwrap().push(event));
        (ConsoleRecognizer::new(callbacks), seen)
    }

    #[tokio::test]
    async fn test_line_is_result_then_end() {
        let (recognizer, seen) = recording_recognizer();
        recognizer
            .start("en-US", Platform::Android.active_options())
            .await
            .unwrap();

        recognizer.feed(&b"open calendar\n"[..]).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RecognizerEvent::Start,
                RecognizerEvent::Results(vec!["open calendar".into()]),
                RecognizerEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_passive_session_reports_partials_first() {
        let (recognizer, seen) = recording_recognizer();
        recognizer
            .start("en-US", Platform::Android.passive_options())
            .await
            .unwrap();

        recognizer.feed(&b"hey charlie there\n"[..]).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RecognizerEvent::Start,
                RecognizerEvent::PartialResults(vec!["hey".into()]),
                RecognizerEvent::PartialResults(vec!["hey charlie".into()]),
                RecognizerEvent::Results(vec!["hey charlie there".into()]),
                RecognizerEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_bang_line_is_recognizer_error() {
        let (recognizer, seen) = recording_recognizer();
        recognizer
            .start("en-US", Platform::Ios.passive_options())
            .await
            .unwrap();

        recognizer.feed(&b"!no_match\nhey charlie\n"[..]).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RecognizerEvent::Start,
                RecognizerEvent::Error(RecognitionError::new("no_match")),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (recognizer, _seen) = recording_recognizer();
        let options = Platform::Android.passive_options();

        recognizer.start("en-US", options).await.unwrap();
        let err = recognizer.start("en-US", options).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Start(_)));

        recognizer.destroy().await.unwrap();
        assert!(recognizer.start("en-US", options).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_recognizer_drops_input() {
        let (recognizer, seen) = recording_recognizer();
        recognizer
            .start("en-US", Platform::Android.passive_options())
            .await
            .unwrap();
        recognizer.stop().await.unwrap();

        recognizer.feed(&b"hey charlie\n"[..]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![RecognizerEvent::Start]);
    }

    #[tokio::test]
    async fn test_router_opens_screens() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on_each(&[EventKind::Navigate, EventKind::Speak], move |event| {
            sink.lock().unwrap().push(event.clone())
        });
        let navigator = Navigator::new(bus);

        ConsoleRouter
            .route_voice_command("Open Calendar", &navigator)
            .await
            .unwrap();
        ConsoleRouter
            .route_voice_command("what time is it", &navigator)
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                AssistantEvent::Navigate {
                    screen: "calendar".into()
                },
                AssistantEvent::Speak("Opening calendar".into()),
                AssistantEvent::Speak("You said what time is it".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_without_screen_fails_routing() {
        let navigator = Navigator::new(Arc::new(EventBus::new()));

        let err = ConsoleRouter
            .route_voice_command("open", &navigator)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Routing(_)));
        assert!(ConsoleRouter
            .route_voice_command("opener", &navigator)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unusable_rate_is_speech_error() {
        let voice = VoiceParams {
            rate: 0.0,
            ..VoiceParams::default()
        };
        let err = LogSpeaker::default().speak("hello", &voice).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Speech(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_speech() {
        let speaker = Arc::new(LogSpeaker::default());
        let voice = VoiceParams::default();
        let started = tokio::time::Instant::now();

        let playing = {
            let speaker = Arc::clone(&speaker);
            tokio::spawn(async move { speaker.speak("a fairly long sentence", &voice).await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        speaker.stop().await.unwrap();

        assert!(playing.await.unwrap().is_ok());
        assert!(started.elapsed() < WORD_DURATION);
    }
}
