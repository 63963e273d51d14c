//! Recording capability mocks shared by unit tests

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::capability::{
    CapabilityError, CommandRouter, HapticOptions, Haptics, Navigator, SpeechRecognizer,
    TextToSpeech,
};
use crate::config::{Config, RecognizerOptions, VoiceParams};
use crate::events::{AssistantEvent, EventBus, EventKind};
use crate::runtime::{AssistantContext, Input};

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerCall {
    Start(RecognizerOptions),
    Stop,
    Destroy,
}

impl RecognizerCall {
    pub fn kind(&self) -> &'static str {
        match self {
            RecognizerCall::Start(_) => "start",
            RecognizerCall::Stop => "stop",
            RecognizerCall::Destroy => "destroy",
        }
    }
}

#[derive(Default)]
pub struct MockRecognizer {
    calls: Mutex<Vec<RecognizerCall>>,
    failing_starts: AtomicU32,
}

impl MockRecognizer {
    pub fn calls(&self) -> Vec<RecognizerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.calls().iter().map(RecognizerCall::kind).collect()
    }

    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecognizerCall::Start(_)))
            .count()
    }

    pub fn fail_next_starts(&self, count: u32) {
        self.failing_starts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn start(&self, _locale: &str, options: RecognizerOptions) -> Result<(), CapabilityError> {
        self.calls.lock().unwrap().push(RecognizerCall::Start(options));
        let failing = self.failing_starts.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_starts.store(failing - 1, Ordering::SeqCst);
            return Err(CapabilityError::Start("recognizer busy".into()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.calls.lock().unwrap().push(RecognizerCall::Stop);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), CapabilityError> {
        self.calls.lock().unwrap().push(RecognizerCall::Destroy);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSpeaker {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
    fail_speak: AtomicBool,
    fail_stop: AtomicBool,
    playback: Mutex<Duration>,
}

impl MockSpeaker {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn fail_speak(&self, fail: bool) {
        self.fail_speak.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make every utterance take `duration` to play
    pub fn play_for(&self, duration: Duration) {
        *self.playback.lock().unwrap() = duration;
    }
}

#[async_trait]
impl TextToSpeech for MockSpeaker {
    async fn stop(&self) -> Result<(), CapabilityError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CapabilityError::Speech("bridge not ready".into()));
        }
        Ok(())
    }

    async fn speak(&self, text: &str, _voice: &VoiceParams) -> Result<(), CapabilityError> {
        self.spoken.lock().unwrap().push(text.to_string());
        let playback = *self.playback.lock().unwrap();
        if !playback.is_zero() {
            tokio::time::sleep(playback).await;
        }
        if self.fail_speak.load(Ordering::SeqCst) {
            return Err(CapabilityError::Speech("engine unavailable".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockHaptics {
    count: AtomicUsize,
}

impl MockHaptics {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Haptics for MockHaptics {
    fn trigger(&self, _effect: &str, _options: HapticOptions) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockRouter {
    commands: Mutex<Vec<String>>,
    fail: AtomicBool,
    reply: Mutex<Option<String>>,
}

impl MockRouter {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Speak `reply` through the navigator while routing
    pub fn reply_with(&self, reply: &str) {
        *self.reply.lock().unwrap() = Some(reply.to_string());
    }
}

#[async_trait]
impl CommandRouter for MockRouter {
    async fn route_voice_command(&self, text: &str, navigator: &Navigator) -> Result<(), CapabilityError> {
        self.commands.lock().unwrap().push(text.to_string());
        let reply = self.reply.lock().unwrap().clone();
        if let Some(reply) = reply {
            navigator.speak(&reply);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CapabilityError::Routing("no route".into()));
        }
        Ok(())
    }
}

/// Records every event published on a bus
pub fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<AssistantEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.on_each(&EventKind::ALL, move |event| {
        sink.lock().unwrap().push(event.clone())
    });
    seen
}

/// A context wired to mocks, for component-level tests
pub struct Fixture {
    pub ctx: AssistantContext,
    pub inputs: mpsc::UnboundedReceiver<Input>,
    pub recognizer: Arc<MockRecognizer>,
    pub tts: Arc<MockSpeaker>,
    pub haptics: Arc<MockHaptics>,
    pub router: Arc<MockRouter>,
    events: Arc<Mutex<Vec<AssistantEvent>>>,
}

impl Fixture {
    pub fn new() -> Self {
        let (tx, inputs) = mpsc::unbounded_channel();
        let bus = Arc::new(EventBus::new());
        let events = record_events(&bus);
        let recognizer = Arc::new(MockRecognizer::default());
        let tts = Arc::new(MockSpeaker::default());
        let haptics = Arc::new(MockHaptics::default());

        let ctx = AssistantContext::new(
            Arc::new(Config::default()),
            bus,
            tx,
            recognizer.clone(),
            tts.clone(),
            haptics.clone(),
        );

        Self {
            ctx,
            inputs,
            recognizer,
            tts,
            haptics,
            router: Arc::new(MockRouter::default()),
            events,
        }
    }

    pub fn events(&self) -> Vec<AssistantEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drain queued inputs without dispatching them
    pub fn drain_inputs(&mut self) -> Vec<Input> {
        let mut drained = Vec::new();
        while let Ok(input) = self.inputs.try_recv() {
            drained.push(input);
        }
        drained
    }
}
