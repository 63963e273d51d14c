//! Core session state machine implementation
//!
//! Handles transitions between Idle, Listening, Thinking and Speaking for
//! one wake-to-response cycle. Every failure path ends back in Idle, so the
//! machine cannot stay in Thinking or Speaking.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityError, CommandRouter, Navigator};
use crate::events::{AssistantEvent, StatusPayload};
use crate::runtime::{AssistantContext, Input};
use crate::timer::TimerId;

use super::history::CommandHistory;

/// The four states of an assistant session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantState {
    /// Waiting for a wake
    #[default]
    Idle,
    /// Capturing a command
    Listening,
    /// Command handed to the router
    Thinking,
    /// Playing back a response
    Speaking,
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssistantState::Idle => write!(f, "idle"),
            AssistantState::Listening => write!(f, "listening"),
            AssistantState::Thinking => write!(f, "thinking"),
            AssistantState::Speaking => write!(f, "speaking"),
        }
    }
}

/// Owns the active part of an interaction once the wake fired
pub struct AssistantSessionManager {
    /// Current state
    state: AssistantState,
    /// Time when the current non-Idle state was entered
    state_entered_at: Option<Instant>,
    muted: bool,
    history: CommandHistory,
    router: Arc<dyn CommandRouter>,
    navigator: Navigator,
    /// Identifies the latest `speak`; older completions are ignored
    speech_generation: u64,
    speech_in_flight: bool,
    /// Current utterance began outside a session, like the wake
    /// acknowledgement. Its completion returns to idle without ending one.
    idle_speech: bool,
    /// `startListening` arrived while an utterance was still playing
    pending_listen: bool,
}

impl AssistantSessionManager {
    pub fn new(router: Arc<dyn CommandRouter>, navigator: Navigator) -> Self {
        Self {
            state: AssistantState::Idle,
            state_entered_at: None,
            muted: false,
            history: CommandHistory::new(),
            router,
            navigator,
            speech_generation: 0,
            speech_in_flight: false,
            idle_speech: false,
            pending_listen: false,
        }
    }

    /// Get the current state
    pub fn state(&self) -> AssistantState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Flip the mute flag and return its new value. Only `speak` reads it.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        info!(muted = self.muted, "mute toggled");
        self.muted
    }

    /// `startListening`: open a listening window if nothing else is going on
    pub fn handle_start_listening(&mut self, ctx: &mut AssistantContext) {
        match self.state {
            AssistantState::Idle => self.begin_listening(ctx),
            AssistantState::Speaking if self.speech_in_flight => {
                debug!("start listening deferred until speech finishes");
                self.pending_listen = true;
            }
            state => debug!(%state, "start listening ignored"),
        }
    }

    /// `voiceCommand`: hand a captured command to the router
    pub fn handle_voice_command(&mut self, ctx: &mut AssistantContext, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("blank voice command ignored");
            return;
        }
        if self.state != AssistantState::Listening {
            debug!(state = %self.state, "voice command outside listening ignored");
            return;
        }

        self.history.record(text);
        ctx.scheduler.cancel(TimerId::Inactivity);
        self.transition_to(ctx, AssistantState::Thinking);
        ctx.bus
            .emit(AssistantEvent::Status(StatusPayload::transcript(text)));

        let router = Arc::clone(&self.router);
        let navigator = self.navigator.clone();
        let inputs = ctx.inputs.clone();
        let command = text.to_string();
        tokio::spawn(async move {
            let result = router.route_voice_command(&command, &navigator).await;
            let _ = inputs.send(Input::RouteSettled(result));
        });
    }

    /// The router returned, successfully or not
    pub fn on_route_settled(&mut self, ctx: &mut AssistantContext, result: Result<(), CapabilityError>) {
        if let Err(e) = result {
            warn!(%e, "command routing failed");
        }

        match self.state {
            AssistantState::Thinking => {
                self.transition_to(ctx, AssistantState::Speaking);
                if self.speech_in_flight {
                    ctx.bus.emit(AssistantEvent::Done);
                } else {
                    self.reset_to_idle(ctx);
                }
            }
            // The router started a response; its completion resets.
            AssistantState::Speaking => ctx.bus.emit(AssistantEvent::Done),
            state => debug!(%state, "route settled after session ended"),
        }
    }

    /// Speak `text`, then return to idle whatever the outcome
    pub fn speak(&mut self, ctx: &mut AssistantContext, text: &str) {
        if self.muted {
            debug!("muted, speech skipped");
            return;
        }
        if text.trim().is_empty() {
            debug!("blank speech skipped");
            return;
        }

        self.idle_speech = match self.state {
            AssistantState::Idle => true,
            AssistantState::Speaking => self.idle_speech,
            _ => false,
        };
        self.speech_generation += 1;
        self.speech_in_flight = true;
        ctx.scheduler.cancel(TimerId::Inactivity);
        self.transition_to(ctx, AssistantState::Speaking);

        let generation = self.speech_generation;
        let tts = Arc::clone(&ctx.tts);
        let voice = ctx.config.voice.clone();
        let inputs = ctx.inputs.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = tts.stop().await {
                debug!(%e, "non-fatal error stopping previous speech");
            }
            let result = tts.speak(&text, &voice).await;
            let _ = inputs.send(Input::SpeechFinished { generation, result });
        });
    }

    pub fn on_speech_finished(
        &mut self,
        ctx: &mut AssistantContext,
        generation: u64,
        result: Result<(), CapabilityError>,
    ) {
        if generation != self.speech_generation {
            debug!(generation, "interrupted speech finished");
            return;
        }
        self.speech_in_flight = false;
        if let Err(e) = result {
            warn!(%e, "speech playback failed");
        }

        if self.pending_listen {
            self.pending_listen = false;
            self.transition_to(ctx, AssistantState::Idle);
            self.begin_listening(ctx);
        } else if self.state == AssistantState::Speaking {
            if self.idle_speech {
                self.transition_to(ctx, AssistantState::Idle);
            } else {
                self.reset_to_idle(ctx);
            }
        }
    }

    /// Nothing was said within the listening window
    pub fn on_inactivity_timeout(&mut self, ctx: &mut AssistantContext) {
        if self.state == AssistantState::Listening {
            info!("no command received, closing session");
            self.reset_to_idle(ctx);
        }
    }

    /// Return to idle and let the wake detector re-arm
    pub fn reset_to_idle(&mut self, ctx: &mut AssistantContext) {
        ctx.scheduler.cancel(TimerId::Inactivity);
        self.pending_listen = false;
        self.transition_to(ctx, AssistantState::Idle);
        ctx.bus.emit(AssistantEvent::Status(StatusPayload::stopped()));
        ctx.bus.emit(AssistantEvent::Done);
    }

    fn begin_listening(&mut self, ctx: &mut AssistantContext) {
        self.transition_to(ctx, AssistantState::Listening);
        ctx.bus.emit(AssistantEvent::Status(StatusPayload::recording()));
        ctx.scheduler
            .schedule_once(TimerId::Inactivity, ctx.config.timings.inactivity);
    }

    /// Perform a state transition
    fn transition_to(&mut self, ctx: &AssistantContext, new_state: AssistantState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "assistant state transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != AssistantState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        ctx.bus.emit(AssistantEvent::StateChange(new_state));
    }
}
