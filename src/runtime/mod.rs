//! Controller run loop
//!
//! A single task owns the wake detector, the session manager and their
//! shared context. Recognizer callbacks, internal bus events, timer firings
//! and capability completions all arrive as `Input`s on one queue and are
//! handled one at a time, so every check-then-mutate step is atomic with
//! respect to the others.

mod context;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::capability::{
    CapabilityError, CommandRouter, Haptics, Navigator, RecognizerCallbacks, RecognizerEvent,
    SpeechRecognizer, TextToSpeech,
};
use crate::config::Config;
use crate::events::{AssistantEvent, EventBus, EventKind};
use crate::state::{AssistantSessionManager, AssistantState};
use crate::timer::{TimerFired, TimerId};
use crate::wake::{MicHolder, WakeMatcher, WakeState, WakeWordDetector};

pub use context::AssistantContext;

/// Bus events the controller consumes itself
const INTERNAL_EVENTS: [EventKind; 5] = [
    EventKind::StartListening,
    EventKind::VoiceCommand,
    EventKind::Speak,
    EventKind::StateChange,
    EventKind::Done,
];

/// Everything the controller reacts to
#[derive(Debug)]
pub enum Input {
    Recognizer(RecognizerEvent),
    Event(AssistantEvent),
    Timer(TimerFired),
    ArmOutcome {
        epoch: u64,
        result: Result<(), CapabilityError>,
    },
    RouteSettled(Result<(), CapabilityError>),
    SpeechFinished {
        generation: u64,
        result: Result<(), CapabilityError>,
    },
    Control(Control),
}

impl From<TimerFired> for Input {
    fn from(fired: TimerFired) -> Self {
        Input::Timer(fired)
    }
}

/// Requests from outside the controller
#[derive(Debug)]
pub enum Control {
    Status(oneshot::Sender<AssistantStatus>),
    ToggleMute(oneshot::Sender<bool>),
    Shutdown,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantStatus {
    pub state: AssistantState,
    pub wake_state: String,
    pub passive: bool,
    /// Who has the recognizer open, if anyone
    pub microphone: Option<MicHolder>,
    pub muted: bool,
    pub commands: usize,
    pub last_command: Option<String>,
}

impl Default for AssistantStatus {
    fn default() -> Self {
        Self {
            state: AssistantState::default(),
            wake_state: WakeState::default().to_string(),
            passive: false,
            microphone: None,
            muted: false,
            commands: 0,
            last_command: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("voice assistant is no longer running")]
    Closed,
}

/// Cloneable handle for talking to a running controller
#[derive(Clone)]
pub struct AssistantHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl AssistantHandle {
    pub async fn status(&self) -> Result<AssistantStatus, HandleError> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::Status(reply))?;
        rx.await.map_err(|_| HandleError::Closed)
    }

    pub async fn toggle_mute(&self) -> Result<bool, HandleError> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::ToggleMute(reply))?;
        rx.await.map_err(|_| HandleError::Closed)
    }

    pub fn shutdown(&self) -> Result<(), HandleError> {
        self.send(Control::Shutdown)
    }

    fn send(&self, control: Control) -> Result<(), HandleError> {
        self.tx
            .send(Input::Control(control))
            .map_err(|_| HandleError::Closed)
    }
}

/// The controller's input queue, created before the capabilities so the
/// recognizer can be given its callbacks
pub struct InputChannel {
    tx: mpsc::UnboundedSender<Input>,
    rx: mpsc::UnboundedReceiver<Input>,
}

impl InputChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn callbacks(&self) -> RecognizerCallbacks {
        let tx = self.tx.clone();
        RecognizerCallbacks::new(move |event| {
            let _ = tx.send(Input::Recognizer(event));
        })
    }
}

impl Default for InputChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform capabilities handed to the controller
pub struct Capabilities {
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub tts: Arc<dyn TextToSpeech>,
    pub haptics: Arc<dyn Haptics>,
    pub router: Arc<dyn CommandRouter>,
}

pub struct VoiceAssistant {
    ctx: AssistantContext,
    detector: WakeWordDetector,
    manager: AssistantSessionManager,
    tx: mpsc::UnboundedSender<Input>,
    rx: mpsc::UnboundedReceiver<Input>,
    started: bool,
}

impl VoiceAssistant {
    pub fn new(config: Config, capabilities: Capabilities, channel: InputChannel) -> Self {
        let InputChannel { tx, rx } = channel;
        let bus = Arc::new(EventBus::new());

        let forward = tx.clone();
        bus.on_each(&INTERNAL_EVENTS, move |event| {
            let _ = forward.send(Input::Event(event.clone()));
        });

        let matcher = WakeMatcher::new(&config.wake_phrases, config.match_policy);
        let manager = AssistantSessionManager::new(capabilities.router, Navigator::new(Arc::clone(&bus)));
        let ctx = AssistantContext::new(
            Arc::new(config),
            bus,
            tx.clone(),
            capabilities.recognizer,
            capabilities.tts,
            capabilities.haptics,
        );

        Self {
            ctx,
            detector: WakeWordDetector::new(matcher),
            manager,
            tx,
            rx,
            started: false,
        }
    }

    /// Bus for UI observers; handlers run on the controller task
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.ctx.bus)
    }

    pub fn handle(&self) -> AssistantHandle {
        AssistantHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn status(&self) -> AssistantStatus {
        let wake_state = self.detector.state();
        AssistantStatus {
            state: self.manager.state(),
            wake_state: wake_state.to_string(),
            passive: self.detector.flags().passive,
            microphone: wake_state.mic_holder(),
            muted: self.manager.is_muted(),
            commands: self.manager.history().entries().len(),
            last_command: self.manager.history().last().map(str::to_string),
        }
    }

    /// Arm passive listening and start the watchdog
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(platform = ?self.ctx.config.platform, "voice assistant starting");

        let period = self.ctx.config.timings.watchdog;
        self.ctx.scheduler.schedule_every(TimerId::Watchdog, period);
        self.detector.arm(&mut self.ctx, false);
    }

    /// Process inputs until shutdown is requested
    pub async fn run(&mut self) {
        self.start();

        while let Some(input) = self.rx.recv().await {
            if !self.dispatch(input) {
                break;
            }
        }

        info!("voice assistant loop stopped");
    }

    /// Release the recognizer and stop everything that is pending
    pub async fn shutdown(&mut self) {
        self.ctx.scheduler.cancel_all();
        if let Some(release) = self.detector.shutdown(&mut self.ctx) {
            let _ = release.await;
        }
        if let Err(e) = self.ctx.tts.stop().await {
            debug!(%e, "speech stop failed during shutdown");
        }
        info!("voice assistant shut down");
    }

    /// Handle one input. Returns false once shutdown was requested.
    fn dispatch(&mut self, input: Input) -> bool {
        let ctx = &mut self.ctx;

        match input {
            Input::Recognizer(event) => match event {
                RecognizerEvent::Start => self.detector.on_speech_start(ctx),
                RecognizerEvent::End => self.detector.on_recognition_end(ctx),
                RecognizerEvent::Error(error) => self.detector.on_recognition_error(ctx, &error),
                RecognizerEvent::Results(transcripts) => {
                    self.detector.on_final_transcript(ctx, &transcripts)
                }
                RecognizerEvent::PartialResults(transcripts) => {
                    self.detector.on_partial_transcript(ctx, &transcripts)
                }
            },
            Input::Event(event) => match event {
                AssistantEvent::StartListening => self.manager.handle_start_listening(ctx),
                AssistantEvent::VoiceCommand(text) => self.manager.handle_voice_command(ctx, &text),
                AssistantEvent::Speak(text) => self.manager.speak(ctx, &text),
                AssistantEvent::StateChange(AssistantState::Listening) => {
                    self.detector.on_session_listening(ctx)
                }
                AssistantEvent::Done => self.detector.on_session_done(ctx),
                other => debug!(event = %other, "event not handled by controller"),
            },
            Input::Timer(fired) => {
                if !ctx.scheduler.accept(fired) {
                    return true;
                }
                match fired.id {
                    TimerId::ReArm => self.detector.on_rearm_due(ctx),
                    TimerId::WarmUp => self.detector.on_warm_up_expired(ctx),
                    TimerId::StartListening => self.detector.on_start_listening_due(ctx),
                    TimerId::Watchdog => self.detector.on_watchdog(ctx),
                    TimerId::Inactivity => self.manager.on_inactivity_timeout(ctx),
                }
            }
            Input::ArmOutcome { epoch, result } => self.detector.on_arm_outcome(ctx, epoch, result),
            Input::RouteSettled(result) => self.manager.on_route_settled(ctx, result),
            Input::SpeechFinished { generation, result } => {
                self.manager.on_speech_finished(ctx, generation, result)
            }
            Input::Control(control) => match control {
                Control::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                Control::ToggleMute(reply) => {
                    let _ = reply.send(self.manager.toggle_mute());
                }
                Control::Shutdown => {
                    warn!("shutdown requested");
                    return false;
                }
            },
        }

        true
    }
}
