//! Speech-to-text providers (§4.5, §6): streaming providers accept frames
//! progressively and emit partial/final transcripts; batch providers receive
//! the accumulated utterance PCM on end-of-speech and return one final string.

use async_trait::async_trait;

use crate::error::{Result, VoiceError};
use crate::types::PcmFrame;

#[async_trait]
pub trait SttStream: Send {
    async fn feed(&mut self, frame: PcmFrame) -> Result<()>;
    /// Finalizes the stream and returns the transcript.
    async fn finish(self: Box<Self>) -> Result<String>;
}

#[async_trait]
pub trait SttProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn start_stream(&self) -> Result<Box<dyn SttStream>> {
        Err(VoiceError::Provider {
            provider: self.name().to_string(),
            message: "streaming not supported by this provider".to_string(),
        })
    }

    /// Batch transcription of a complete utterance.
    async fn transcribe_batch(&self, _pcm: &PcmFrame) -> Result<String> {
        Err(VoiceError::Provider {
            provider: self.name().to_string(),
            message: "batch transcription not supported by this provider".to_string(),
        })
    }
}
