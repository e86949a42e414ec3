use crate::order::AmbisonicOrder;

/// Planar block of ambisonic samples.
///
/// Samples are stored channel after channel, each channel holding
/// [`frames`](AmbisonicFrame::frames) samples, channels in ACN order.
#[derive(Clone, Debug, PartialEq)]
pub struct AmbisonicFrame {
    order: AmbisonicOrder,
    frames: usize,
    data: Box<[f32]>,
}

impl AmbisonicFrame {
    /// Silent frame of `frames` samples per channel.
    pub fn new(order: AmbisonicOrder, frames: usize) -> Self {
        Self {
            order,
            frames,
            data: vec![0.0; order.num_channels() * frames].into_boxed_slice(),
        }
    }

    /// Copy interleaved samples, `(N + 1)²` per sample frame, into a new
    /// planar frame.
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `interleaved.len()` is not a multiple of the channel count
    pub fn from_interleaved(order: AmbisonicOrder, interleaved: &[f32]) -> Self {
        let channels = order.num_channels();
        assert_eq!(interleaved.len() % channels, 0);

        let mut frame = Self::new(order, interleaved.len() / channels);
        frame.copy_from_interleaved(interleaved);
        frame
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    pub fn num_channels(&self) -> usize {
        self.order.num_channels()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.data[channel * self.frames..(channel + 1) * self.frames]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.data[channel * self.frames..(channel + 1) * self.frames]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact(0) panics, an empty frame simply has empty channels
        let frames = self.frames.max(1);
        self.data
            .chunks_exact(frames)
            .chain(std::iter::repeat(&[][..]))
            .take(self.num_channels())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Overwrite the frame from interleaved samples.
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `interleaved.len() != self.num_channels() * self.frames()`
    pub fn copy_from_interleaved(&mut self, interleaved: &[f32]) {
        let channels = self.num_channels();
        assert_eq!(interleaved.len(), channels * self.frames);

        for (t, samples) in interleaved.chunks_exact(channels).enumerate() {
            for (k, sample) in samples.iter().enumerate() {
                self.data[k * self.frames + t] = *sample;
            }
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }
}
