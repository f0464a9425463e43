//! Provider polymorphism (§9): STT, TTS, and S2S each expose a small capability
//! set. Streaming and batch methods are both optional on the trait, with a
//! runtime capability check, so a caller doesn't need to downcast to find out
//! what a provider supports.

pub mod s2s;
pub mod stt;
pub mod tts;

pub use s2s::SpeechToSpeechProvider;
pub use stt::SttProvider;
pub use tts::TtsProvider;
