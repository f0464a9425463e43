//! Speech-to-speech provider capability description (§4.6). The connection
//! lifecycle itself lives in `engine::s2s`; this trait is what mode resolution
//! (§8 property 6) checks credentials against.

pub trait SpeechToSpeechProvider {
    fn name(&self) -> &str;

    /// PCM sample rate expected for audio sent to the provider.
    fn input_sample_rate(&self) -> u32;

    /// PCM sample rate of audio the provider emits.
    fn output_sample_rate(&self) -> u32;

    /// Whether credentials are present for this provider; `auto` mode resolution
    /// downgrades to pipeline when this is false (§8 property 6).
    fn has_credentials(&self) -> bool;
}
