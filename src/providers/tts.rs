//! Text-to-speech providers (§4.5, §6). `synthesize` returns a stream directly
//! consumable by the playback queue.

use async_trait::async_trait;

use crate::error::{Result, VoiceError};
use crate::playback::TtsStream;

#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool {
        true
    }

    /// Begins synthesizing `text`; the returned stream is enqueued into the
    /// playback queue immediately, before synthesis completes (§4.5).
    async fn synthesize(&self, text: &str) -> Result<Box<dyn TtsStream>>;
}

/// A TTS provider that only exposes a single blocking REST call: wraps the full
/// response as one pre-buffered stream so it can still satisfy `TtsProvider`.
pub struct BufferedTtsStream {
    chunks: std::collections::VecDeque<crate::types::PcmFrame>,
    cancelled: bool,
}

impl BufferedTtsStream {
    pub fn new(chunks: Vec<crate::types::PcmFrame>) -> Self {
        Self { chunks: chunks.into(), cancelled: false }
    }
}

#[async_trait]
impl TtsStream for BufferedTtsStream {
    async fn next_chunk(&mut self) -> Option<crate::types::PcmFrame> {
        if self.cancelled {
            return None;
        }
        self.chunks.pop_front()
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.chunks.clear();
    }
}

pub fn unsupported(provider: &str) -> VoiceError {
    VoiceError::Provider {
        provider: provider.to_string(),
        message: "synthesis not supported".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PcmFrame;

    #[tokio::test]
    async fn buffered_stream_yields_chunks_then_none() {
        let mut stream = BufferedTtsStream::new(vec![
            PcmFrame::processing(vec![1, 2]),
            PcmFrame::processing(vec![3, 4]),
        ]);
        assert!(stream.next_chunk().await.is_some());
        assert!(stream.next_chunk().await.is_some());
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn cancel_drains_remaining_chunks() {
        let mut stream = BufferedTtsStream::new(vec![PcmFrame::processing(vec![1, 2])]);
        stream.cancel();
        assert!(stream.next_chunk().await.is_none());
    }
}
