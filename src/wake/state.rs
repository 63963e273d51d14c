//! Wake detector lifecycle state
//!
//! One enum replaces the passive / in-session / wake-triggered flags.
//! `flags()` projects it back onto them for status reporting and tests.

use serde::{Deserialize, Serialize};

/// Who currently holds the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicHolder {
    Passive,
    Session,
}

/// Lifecycle of the passive listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeState {
    /// Never armed, or shut down
    #[default]
    Idle,
    /// Passive listening wanted, recognizer closed, waiting to re-arm
    Recovering,
    /// Recognizer start issued, not yet confirmed
    ArmingPassive,
    /// Recognizer running and matching wake phrases
    PassiveActive,
    /// Wake phrase heard, recognizer released, session not yet opened
    WakeTriggered,
    /// Active session holds the recognizer
    ActiveSession,
}

impl std::fmt::Display for WakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WakeState::Idle => write!(f, "Idle"),
            WakeState::Recovering => write!(f, "Recovering"),
            WakeState::ArmingPassive => write!(f, "ArmingPassive"),
            WakeState::PassiveActive => write!(f, "PassiveActive"),
            WakeState::WakeTriggered => write!(f, "WakeTriggered"),
            WakeState::ActiveSession => write!(f, "ActiveSession"),
        }
    }
}

/// Boolean view of a `WakeState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WakeFlags {
    pub passive: bool,
    pub in_session: bool,
    pub wake_triggered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal wake state transition {from} -> {to}")]
pub struct TransitionError {
    pub from: WakeState,
    pub to: WakeState,
}

impl WakeState {
    pub fn flags(self) -> WakeFlags {
        let (passive, in_session, wake_triggered) = match self {
            WakeState::Idle => (false, false, false),
            WakeState::Recovering => (true, false, false),
            WakeState::ArmingPassive | WakeState::PassiveActive => (true, true, false),
            WakeState::WakeTriggered => (false, false, true),
            WakeState::ActiveSession => (false, true, true),
        };
        WakeFlags {
            passive,
            in_session,
            wake_triggered,
        }
    }

    /// Whether the passive recognizer is open or being opened
    pub fn is_passive(self) -> bool {
        matches!(self, WakeState::ArmingPassive | WakeState::PassiveActive)
    }

    /// Whether a transcript may still trigger a wake. Recognizers commonly
    /// report end of speech before the final results, so `Recovering` counts.
    pub fn listens_for_wake(self) -> bool {
        self.flags().passive
    }

    pub fn mic_holder(self) -> Option<MicHolder> {
        match self {
            WakeState::ArmingPassive | WakeState::PassiveActive => Some(MicHolder::Passive),
            WakeState::ActiveSession => Some(MicHolder::Session),
            _ => None,
        }
    }

    pub fn can_transition(self, to: WakeState) -> bool {
        use WakeState::*;

        matches!(
            (self, to),
            (Idle | Recovering, ArmingPassive)
                | (ArmingPassive | PassiveActive, ArmingPassive)
                | (ArmingPassive, PassiveActive)
                | (ArmingPassive | PassiveActive, Recovering)
                | (Recovering, Recovering)
                | (ArmingPassive | PassiveActive | Recovering, WakeTriggered)
                | (WakeTriggered, ActiveSession)
                | (ActiveSession, Recovering)
                | (_, Idle)
        )
    }

    /// Validate a move, returning the new state
    pub fn transition(self, to: WakeState) -> Result<WakeState, TransitionError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }
}
