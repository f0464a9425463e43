//! Speech-to-speech engine family (§4.6): a bidirectional WebSocket to a
//! provider that performs STT, reasoning, and TTS natively. Provider-specific
//! wire handling lives in the `openai_realtime`/`gemini_live` submodules; this
//! module holds the shared demultiplexed event shape and tool-call bridging.

pub mod gemini_live;
pub mod openai_realtime;

use crate::types::ToolCall;

/// Provider events, demultiplexed to a common shape before reaching the session
/// (§4.6 "Events demultiplexed").
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    AudioDelta { pcm: Vec<i16>, sample_rate: u32 },
    AssistantTranscriptDelta { text: String },
    UserTranscriptionCompleted { text: String },
    ToolCallRequested { call: ToolCall },
    Interrupted,
    TurnDone,
    Error { message: String },
}
