//! Narrow interfaces to the Discord voice transport.
//!
//! Opus decode/encode, RTP, and gateway handshake are out of scope (§1) and
//! assumed to live in a collaborator crate; the session only needs these two
//! traits, grounded in the `AudioSource`/`AudioReceiver` split used for transport
//! abstraction in the pack's own Discord-voice example.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::PcmFrame;

/// A source of per-user decoded PCM frames from the voice transport.
#[async_trait]
pub trait AudioReceiver: Send + Sync {
    /// Blocks until the next frame from any user is available.
    async fn recv(&mut self) -> Option<(String, PcmFrame)>;
}

/// A sink accepting PCM frames for playback over the voice transport.
#[async_trait]
pub trait AudioSender: Send + Sync {
    async fn send(&mut self, frame: PcmFrame) -> Result<()>;

    /// Stops emitting audio immediately (used by barge-in).
    async fn stop(&mut self) -> Result<()>;

    /// True once all submitted audio has drained and no new frame is pending.
    fn is_idle(&self) -> bool;
}

#[async_trait]
impl AudioSender for Box<dyn AudioSender> {
    async fn send(&mut self, frame: PcmFrame) -> Result<()> {
        (**self).send(frame).await
    }

    async fn stop(&mut self) -> Result<()> {
        (**self).stop().await
    }

    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }
}
