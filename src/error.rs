//! Crate-wide error type.
//!
//! Library boundaries return `VoiceError` so callers across the RPC surface get a
//! stable, matchable shape; internal composition code (session wiring, RPC handlers)
//! uses `anyhow::Result` and converts at the edge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tool execution error: {0}")]
    ToolExecution(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("no active session for guild {0}")]
    NoSession(String),

    #[error("session already active for guild {0}")]
    SessionExists(String),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
