//! Shared context handed to the wake detector and session manager

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::capability::{Haptics, SpeechRecognizer, TextToSpeech};
use crate::config::Config;
use crate::events::EventBus;
use crate::timer::Scheduler;

use super::Input;

/// Everything both components share, built once per controller
pub struct AssistantContext {
    pub config: Arc<Config>,
    pub bus: Arc<EventBus>,
    pub scheduler: Scheduler<Input>,
    /// Where spawned capability calls report back
    pub inputs: mpsc::UnboundedSender<Input>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub tts: Arc<dyn TextToSpeech>,
    pub haptics: Arc<dyn Haptics>,
}

impl AssistantContext {
    pub fn new(
        config: Arc<Config>,
        bus: Arc<EventBus>,
        inputs: mpsc::UnboundedSender<Input>,
        recognizer: Arc<dyn SpeechRecognizer>,
        tts: Arc<dyn TextToSpeech>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        Self {
            config,
            bus,
            scheduler: Scheduler::new(inputs.clone()),
            inputs,
            recognizer,
            tts,
            haptics,
        }
    }
}
