//! Passive wake phrase listener
//!
//! Keeps a recognizer session open while passive, hands the microphone to
//! the active session when a wake phrase is heard and takes it back once the
//! session is done. Recovery is layered: bounded retries inside one arm,
//! delayed re-arms after the recognizer ends or errors, a warm-up check after
//! every start, and the periodic watchdog as the last backstop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::capability::{CapabilityError, HapticOptions, RecognitionError, SpeechRecognizer};
use crate::config::RecognizerOptions;
use crate::events::AssistantEvent;
use crate::runtime::{AssistantContext, Input};
use crate::timer::TimerId;

use super::matcher::WakeMatcher;
use super::state::{WakeFlags, WakeState};

/// Haptic effect played on a wake
pub const WAKE_HAPTIC: &str = "impactMedium";

/// UI hint published on a wake
pub const LISTENING_INDICATOR: &str = "listening";

#[derive(Debug, Clone, Copy)]
enum Release {
    Stop,
    Destroy,
}

pub struct WakeWordDetector {
    state: WakeState,
    matcher: WakeMatcher,
    /// Bumped on every recognizer start so late outcomes can be told apart
    arm_epoch: u64,
    start_task: Option<JoinHandle<()>>,
    /// Pending stop/destroy; the next start waits for it
    release_task: Option<JoinHandle<()>>,
    /// Active session is still waiting for its command
    capturing: bool,
}

impl WakeWordDetector {
    pub fn new(matcher: WakeMatcher) -> Self {
        info!(phrases = ?matcher.phrases(), policy = ?matcher.policy(), "wake matcher ready");
        Self {
            state: WakeState::Idle,
            matcher,
            arm_epoch: 0,
            start_task: None,
            release_task: None,
            capturing: false,
        }
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn flags(&self) -> WakeFlags {
        self.state.flags()
    }

    /// Open the recognizer for passive listening. Returns whether a start
    /// was issued. `force` restarts a recognizer that is already open.
    pub fn arm(&mut self, ctx: &mut AssistantContext, force: bool) -> bool {
        match self.state {
            WakeState::WakeTriggered | WakeState::ActiveSession => {
                debug!(state = %self.state, "arm skipped, session owns the recognizer");
                return false;
            }
            WakeState::ArmingPassive | WakeState::PassiveActive if !force => {
                debug!(state = %self.state, "arm skipped, recognizer already open");
                return false;
            }
            _ => {}
        }

        let reopen = self.state.is_passive();
        if !self.transition_to(WakeState::ArmingPassive) {
            return false;
        }

        if reopen {
            info!("tearing down recognizer before forced restart");
            self.release_recognizer(ctx, Release::Destroy);
        }

        ctx.scheduler.cancel(TimerId::ReArm);
        ctx.scheduler
            .schedule_once(TimerId::WarmUp, ctx.config.timings.warm_up);

        let options = ctx.config.platform.passive_options();
        self.start_recognizer(ctx, options);
        true
    }

    /// Outcome of the start task spawned by the latest arm
    pub fn on_arm_outcome(
        &mut self,
        ctx: &mut AssistantContext,
        epoch: u64,
        result: Result<(), CapabilityError>,
    ) {
        if epoch != self.arm_epoch {
            trace!(epoch, current = self.arm_epoch, "stale start outcome ignored");
            return;
        }
        self.start_task = None;

        match (result, self.state) {
            (Ok(()), state) => debug!(%state, "recognizer start accepted"),
            (Err(e), WakeState::ArmingPassive) => {
                let backoff = ctx.config.timings.arm_failure_backoff;
                warn!(%e, ?backoff, "recognizer failed to start, backing off");
                ctx.scheduler.cancel(TimerId::WarmUp);
                if self.transition_to(WakeState::Recovering) {
                    ctx.scheduler.schedule_once(TimerId::ReArm, backoff);
                }
            }
            (Err(e), WakeState::ActiveSession) => {
                warn!(%e, "command capture could not start");
                self.capturing = false;
            }
            (Err(e), state) => debug!(%e, %state, "start failure after state moved on"),
        }
    }

    pub fn on_speech_start(&mut self, ctx: &mut AssistantContext) {
        match self.state {
            WakeState::ArmingPassive => {
                ctx.scheduler.cancel(TimerId::WarmUp);
                self.transition_to(WakeState::PassiveActive);
            }
            WakeState::ActiveSession => debug!("command capture started"),
            state => debug!(%state, "unexpected recognizer start"),
        }
    }

    pub fn on_final_transcript(&mut self, ctx: &mut AssistantContext, transcripts: &[String]) {
        match self.state {
            state if state.listens_for_wake() => {
                if self.matcher.matches_any(transcripts) {
                    self.trigger_wake(ctx);
                } else {
                    debug!(?transcripts, "no wake phrase in final result");
                }
            }
            WakeState::ActiveSession => self.capture_command(ctx, transcripts),
            state => debug!(%state, "final result ignored"),
        }
    }

    /// Partial results only matter while passive, they cut wake latency
    pub fn on_partial_transcript(&mut self, ctx: &mut AssistantContext, transcripts: &[String]) {
        if self.state.listens_for_wake() && self.matcher.matches_any(transcripts) {
            self.trigger_wake(ctx);
        }
    }

    /// Release passive listening and announce the wake. Returns false if the
    /// detector was not passive, so repeated hits are ignored.
    pub fn trigger_wake(&mut self, ctx: &mut AssistantContext) -> bool {
        if !self.state.listens_for_wake() {
            debug!(state = %self.state, "wake already handled");
            return false;
        }
        if !self.transition_to(WakeState::WakeTriggered) {
            return false;
        }

        info!("wake phrase detected");
        ctx.scheduler.cancel(TimerId::WarmUp);
        ctx.scheduler.cancel(TimerId::ReArm);
        self.release_recognizer(ctx, Release::Stop);

        ctx.haptics.trigger(WAKE_HAPTIC, HapticOptions::default());
        ctx.bus
            .emit(AssistantEvent::Indicator(LISTENING_INDICATOR.to_string()));
        ctx.bus
            .emit(AssistantEvent::Speak(ctx.config.acknowledgement.clone()));

        ctx.scheduler.schedule_once(
            TimerId::StartListening,
            ctx.config.timings.start_listening_delay,
        );
        true
    }

    /// The acknowledgement delay elapsed: hand the session to the manager.
    /// The recognizer stays closed until the manager is actually listening.
    pub fn on_start_listening_due(&mut self, ctx: &mut AssistantContext) {
        if self.state != WakeState::WakeTriggered {
            debug!(state = %self.state, "start listening no longer wanted");
            return;
        }
        if !self.transition_to(WakeState::ActiveSession) {
            return;
        }

        ctx.bus.emit(AssistantEvent::StartListening);
    }

    /// The session manager entered listening: open the recognizer for the
    /// command
    pub fn on_session_listening(&mut self, ctx: &mut AssistantContext) {
        if self.state != WakeState::ActiveSession || self.capturing {
            debug!(state = %self.state, capturing = self.capturing, "capture not opened");
            return;
        }

        self.capturing = true;
        let options = ctx.config.platform.active_options();
        self.start_recognizer(ctx, options);
    }

    pub fn on_recognition_end(&mut self, ctx: &mut AssistantContext) {
        match self.state {
            state if state.listens_for_wake() => {
                let delay = ctx.config.timings.end_rearm;
                self.recover(ctx, delay, "recognizer ended");
            }
            WakeState::ActiveSession => debug!("command capture ended"),
            state => trace!(%state, "recognizer end ignored"),
        }
    }

    pub fn on_recognition_error(&mut self, ctx: &mut AssistantContext, error: &RecognitionError) {
        match self.state {
            state if state.listens_for_wake() => {
                warn!(error = %error.error, "passive recognizer error");
                let delay = ctx.config.timings.error_rearm;
                self.recover(ctx, delay, "recognizer error");
            }
            WakeState::ActiveSession => {
                warn!(error = %error.error, "command capture error");
            }
            state => debug!(%state, error = %error.error, "recognizer error ignored"),
        }
    }

    pub fn on_rearm_due(&mut self, ctx: &mut AssistantContext) {
        self.arm(ctx, false);
    }

    /// A start that never reported back is treated as a dead recognizer
    pub fn on_warm_up_expired(&mut self, ctx: &mut AssistantContext) {
        if self.state == WakeState::ArmingPassive {
            warn!("recognizer never reported start, forcing restart");
            self.arm(ctx, true);
        }
    }

    /// Periodic backstop for failures that raise neither end nor error
    pub fn on_watchdog(&mut self, ctx: &mut AssistantContext) {
        if self.state == WakeState::Recovering {
            let rearm_pending = ctx.scheduler.is_scheduled(TimerId::ReArm);
            info!(rearm_pending, "watchdog re-arming passive listener");
            self.arm(ctx, false);
        } else {
            trace!(state = %self.state, "watchdog check passed");
        }
    }

    /// The session manager finished; take the microphone back
    pub fn on_session_done(&mut self, ctx: &mut AssistantContext) {
        match self.state {
            WakeState::ActiveSession => {
                if self.capturing {
                    self.capturing = false;
                    self.release_recognizer(ctx, Release::Stop);
                }
                let delay = ctx.config.timings.done_rearm;
                self.recover(ctx, delay, "session done");
            }
            WakeState::WakeTriggered => debug!("session not open yet, done ignored"),
            state => debug!(%state, "done ignored"),
        }
    }

    /// Stop every timer and tear the recognizer down. The returned handle
    /// completes once the teardown call has returned.
    pub fn shutdown(&mut self, ctx: &mut AssistantContext) -> Option<JoinHandle<()>> {
        for id in [TimerId::ReArm, TimerId::WarmUp, TimerId::StartListening] {
            ctx.scheduler.cancel(id);
        }
        self.capturing = false;
        self.release_recognizer(ctx, Release::Destroy);
        self.transition_to(WakeState::Idle);
        self.release_task.take()
    }

    fn capture_command(&mut self, ctx: &mut AssistantContext, transcripts: &[String]) {
        if !self.capturing {
            debug!("capture not open, transcript ignored");
            return;
        }
        let Some(command) = transcripts.iter().map(|t| t.trim()).find(|t| !t.is_empty()) else {
            debug!("empty command result");
            return;
        };
        let command = command.to_string();

        self.capturing = false;
        self.release_recognizer(ctx, Release::Stop);
        info!(%command, "command captured");
        ctx.bus.emit(AssistantEvent::VoiceCommand(command));
    }

    fn recover(&mut self, ctx: &mut AssistantContext, delay: Duration, reason: &str) {
        ctx.scheduler.cancel(TimerId::WarmUp);
        if let Some(task) = self.start_task.take() {
            task.abort();
        }
        if self.transition_to(WakeState::Recovering) {
            info!(reason, delay_ms = delay.as_millis() as u64, "re-arm scheduled");
            ctx.scheduler.schedule_once(TimerId::ReArm, delay);
        }
    }

    fn transition_to(&mut self, to: WakeState) -> bool {
        match self.state.transition(to) {
            Ok(next) => {
                if next != self.state {
                    info!(from = %self.state, to = %next, "wake state transition");
                }
                self.state = next;
                true
            }
            Err(e) => {
                warn!(%e, "rejected wake state transition");
                false
            }
        }
    }

    fn start_recognizer(&mut self, ctx: &AssistantContext, options: RecognizerOptions) {
        if let Some(task) = self.start_task.take() {
            task.abort();
        }
        self.arm_epoch += 1;
        let epoch = self.arm_epoch;

        let recognizer = Arc::clone(&ctx.recognizer);
        let inputs = ctx.inputs.clone();
        let release = self.release_task.take();
        let locale = ctx.config.locale.clone();
        let attempts = ctx.config.platform.start_attempts();
        let retry_delay = ctx.config.timings.start_retry_delay;

        self.start_task = Some(tokio::spawn(async move {
            if let Some(release) = release {
                let _ = release.await;
            }
            let result =
                start_with_retry(recognizer.as_ref(), &locale, options, attempts, retry_delay)
                    .await;
            let _ = inputs.send(Input::ArmOutcome { epoch, result });
        }));
    }

    fn release_recognizer(&mut self, ctx: &AssistantContext, release: Release) {
        if let Some(task) = self.start_task.take() {
            task.abort();
        }
        let previous = self.release_task.take();
        let recognizer = Arc::clone(&ctx.recognizer);

        self.release_task = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = match release {
                Release::Stop => recognizer.stop().await,
                Release::Destroy => recognizer.destroy().await,
            };
            if let Err(e) = result {
                warn!(%e, ?release, "recognizer release failed");
            }
        }));
    }
}

async fn start_with_retry(
    recognizer: &dyn SpeechRecognizer,
    locale: &str,
    options: RecognizerOptions,
    attempts: u32,
    retry_delay: Duration,
) -> Result<(), CapabilityError> {
    let mut last_error = None;

    for attempt in 1..=attempts {
        match recognizer.start(locale, options).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, attempts, %e, "recognizer start attempt failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| CapabilityError::Unavailable("no start attempts configured".into())))
}
