//! Engine polymorphism (§9): pipeline and speech-to-speech engines share one
//! abstract contract. Modeled as a trait plus a tagged event enum rather than
//! dynamic `on`-string dispatch, matching this codebase's typed-channel
//! components.

pub mod pipeline;
pub mod s2s;
pub mod sentence_splitter;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::types::{ConversationTurn, EngineMode, PcmFrame};

/// Events an engine emits, in delivery order (§5 "Ordering guarantees").
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A chunk of synthesized/provider audio ready for playback.
    AudioOut { pcm: PcmFrame },
    /// A (possibly partial) user transcript.
    TranscriptIn { user_id: String, text: String, is_final: bool },
    /// Assistant reply text, as produced incrementally.
    AssistantText { text: String },
    /// The current turn has finished (all audio emitted, assistant done speaking).
    TurnEnd,
    /// A provider or pipeline stage reported an error; session-fatal unless noted.
    Error { message: String },
}

/// Shared contract for both the pipeline and speech-to-speech engines (§4.5, §4.6).
#[async_trait]
pub trait Engine: Send {
    async fn start(&mut self) -> Result<()>;

    /// Feeds one 16kHz mono frame of continuously-arriving user audio.
    async fn feed_audio(&mut self, user_id: &str, frame: PcmFrame) -> Result<()>;

    /// Signals VAD-detected end of a user utterance.
    async fn end_of_speech(&mut self, user_id: &str) -> Result<()>;

    /// Injects text directly into the conversation (e.g. from `voice.speak`).
    async fn inject_text(&mut self, text: &str) -> Result<()>;

    /// Idempotent; cancels in-flight synthesis/provider streams (§5 "Cancellation").
    async fn interrupt(&mut self);

    async fn stop(&mut self) -> Result<()>;

    /// Pulls the next event, or `None` once the engine has fully stopped.
    async fn next_event(&mut self) -> Option<EngineEvent>;

    /// Snapshot of this engine's conversation so far, oldest first. Used by the
    /// session manager's end-of-session summary dispatch (§4.8). Engines with
    /// no conversation tracking of their own may leave this empty.
    async fn conversation_history(&self) -> Vec<ConversationTurn> {
        Vec::new()
    }
}

/// Resolves the configured mode against provider credential availability
/// (§8 property 6): `auto` picks S2S iff a configured S2S provider has
/// credentials, `speech-to-speech` downgrades to pipeline without credentials,
/// `pipeline` is never upgraded.
pub fn resolve_mode(config: &Config) -> EngineMode {
    let s2s_has_creds = config.s2s.openai_realtime.resolved_api_key().is_some()
        || config.s2s.gemini_live.resolved_api_key().is_some();

    match config.mode.0 {
        EngineMode::Pipeline => EngineMode::Pipeline,
        EngineMode::SpeechToSpeech => {
            if s2s_has_creds {
                EngineMode::SpeechToSpeech
            } else {
                tracing::warn!("speech-to-speech requested without provider credentials, downgrading to pipeline");
                EngineMode::Pipeline
            }
        }
        EngineMode::Auto => {
            if s2s_has_creds {
                EngineMode::SpeechToSpeech
            } else {
                EngineMode::Pipeline
            }
        }
    }
}

pub fn new_call_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, OpenAiRealtimeConfig};

    fn base_config() -> Config {
        Config::default()
    }

    #[test]
    fn auto_picks_pipeline_without_credentials() {
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("GEMINI_API_KEY");
        let config = base_config();
        assert_eq!(resolve_mode(&config), EngineMode::Pipeline);
    }

    #[test]
    fn auto_picks_s2s_with_inline_credentials() {
        let mut config = base_config();
        config.s2s.openai_realtime = OpenAiRealtimeConfig {
            model: "gpt-4o-realtime-preview".into(),
            api_key: Some("sk-test".into()),
        };
        assert_eq!(resolve_mode(&config), EngineMode::SpeechToSpeech);
    }

    #[test]
    fn pipeline_is_never_upgraded() {
        let mut config = base_config();
        config.mode.0 = EngineMode::Pipeline;
        config.s2s.openai_realtime.api_key = Some("sk-test".into());
        assert_eq!(resolve_mode(&config), EngineMode::Pipeline);
    }

    #[test]
    fn speech_to_speech_without_credentials_downgrades() {
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("GEMINI_API_KEY");
        let mut config = base_config();
        config.mode.0 = EngineMode::SpeechToSpeech;
        assert_eq!(resolve_mode(&config), EngineMode::Pipeline);
    }
}
