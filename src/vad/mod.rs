//! Voice activity detection: a shared event contract over two interchangeable
//! engines (neural, preferred; RMS, fallback). See §4.2.

pub mod neural;
pub mod rms;

use crate::config::VadConfig;
use crate::types::PcmFrame;

/// Emitted by a VAD as frames are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStart,
    SpeechEnd,
    /// No state transition this frame.
    None,
}

/// Per-user voice activity detector. Implementations own their own state and run
/// a one-way downgrade to RMS on any internal failure (§4.2, §7).
pub trait Vad: Send {
    fn process(&mut self, frame: &PcmFrame) -> VadEvent;

    /// Idempotent; awaits any pending async initialization before returning.
    fn dispose(&mut self);
}

/// Builds the configured VAD, falling back to RMS when the neural engine is
/// unavailable (feature-gated or failed to load). The fallback is silent per §4.2/§7.
pub fn build(config: &VadConfig) -> Box<dyn Vad> {
    match config.engine {
        crate::config::VadEngineKind::Neural => match neural::NeuralVad::try_load(config) {
            Some(vad) => Box::new(vad),
            None => Box::new(rms::RmsVad::new(config)),
        },
        crate::config::VadEngineKind::Rms => Box::new(rms::RmsVad::new(config)),
    }
}
