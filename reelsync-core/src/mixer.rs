//! Audio output contract exposed to the presentation host.

/// Receives due audio frames from the tick loop, in presentation order.
pub trait AudioMixer: Send {
    /// Mix `frame_count` interleaved frames from `samples`, starting at
    /// audio frame `offset`.
    fn mix_audio(&mut self, frame_count: usize, samples: &[f32], offset: usize);
}
