//! Pure functions over PCM buffers: resampling, channel conversion, byte framing.

pub mod pipeline;
pub mod transport;

pub use pipeline::{
    bytes_to_pcm, decode_for_processing, pcm_to_bytes, resample, to_transport_format,
};
pub use transport::{AudioReceiver, AudioSender};
