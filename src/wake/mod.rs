//! Wake word detection
//!
//! The detector owns passive listening. It decides when the recognizer is
//! open for wake phrases and when it is handed to the active session.

mod detector;
mod matcher;
mod state;

pub use detector::WakeWordDetector;
pub use matcher::WakeMatcher;
pub use state::{MicHolder, WakeState};
