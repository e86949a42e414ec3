//! Binaural decoding of ambisonic sound fields.
//!
//! Every ambisonic channel is convolved with its left and right impulse
//! response and the results are summed per ear. Convolution uses the uniformly
//! partitioned overlap-save algorithm, see Chapter 5 of Partitioned
//! convolution algorithms for real-time auralization: [`Book`]
//!
//! The input spectrum of a channel is shared by both ears, and all channels
//! are accumulated in the frequency domain, so a block costs one forward
//! transform per channel and one inverse transform per ear.
//!
//! [`Book`]: https://publications.rwth-aachen.de/record/466561/files/466561.pdf

use std::sync::Arc;

use filters::{Ear, FilterStore};
use log::info;
use realfft::num_complex::Complex;
use realfft::num_traits::Zero;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::Error;
use crate::frame::AmbisonicFrame;
use crate::hrir::HrirSet;
use crate::order::AmbisonicOrder;

pub(crate) const DEFAULT_SAMPLE_RATE: f32 = 48000.0;
pub(crate) const DEFAULT_PARTITION_LEN: usize = 256;

#[derive(Clone, Debug)]
struct Channel {
    /// left ear impulse response split into partition blocks
    h_left: Box<[Complex<f32>]>,
    /// right ear impulse response split into partition blocks
    h_right: Box<[Complex<f32>]>,
    /// input blocks frequency domain delay line
    x_fdl: Box<[Complex<f32>]>,
    /// input blocks time domain delay line
    x_tdl: Box<[f32]>,
}

impl Channel {
    fn new(fft_len: usize, spectra_len: usize, partitions: usize) -> Self {
        let zero = Complex::new(0.0, 0.0);

        Channel {
            h_left: vec![zero; spectra_len * partitions].into_boxed_slice(),
            h_right: vec![zero; spectra_len * partitions].into_boxed_slice(),
            x_fdl: vec![zero; spectra_len * partitions].into_boxed_slice(),
            x_tdl: vec![0.0; fft_len].into_boxed_slice(),
        }
    }

    fn reset(&mut self) {
        self.x_tdl.fill(0.0);
        self.x_fdl.fill(Complex::zero());
    }
}

#[must_use]
pub struct DecoderBuilder {
    order: usize,
    sample_rate: f32,
    partition_len: usize,
}

impl DecoderBuilder {
    fn new(order: usize) -> DecoderBuilder {
        DecoderBuilder {
            order,
            sample_rate: DEFAULT_SAMPLE_RATE,
            partition_len: DEFAULT_PARTITION_LEN,
        }
    }

    /// Set sampling rate of the filter sets. Default value is 48_000.0.
    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set partition size for uniformly partitioned convolution algorithm.
    /// Frames passed to [`BinauralDecoder::process`] must be a multiple of it.
    pub fn with_partition_len(mut self, partition_len: usize) -> Self {
        self.partition_len = partition_len;
        self
    }

    /// Try to build [BinauralDecoder](crate::decoder::BinauralDecoder),
    /// fetching the filter sets of the configured order from `store`.
    ///
    /// This will fail if the order is not in `1..=7`, the sampling rate or
    /// partition length is invalid, or the filter sets are missing or do not
    /// match the order and sampling rate.
    pub fn build<S>(self, store: &S) -> Result<BinauralDecoder, Error>
    where
        S: FilterStore + ?Sized,
    {
        let order = AmbisonicOrder::new(self.order)?;

        if !(self.sample_rate.is_normal() && self.sample_rate.is_sign_positive()) {
            return Err(Error::InvalidSampleRate(self.sample_rate));
        }

        if self.partition_len == 0 {
            return Err(Error::InvalidPartitionLen(self.partition_len));
        }

        let hrirs = HrirSet::from_store(store, order, self.sample_rate.round() as u32)?;
        let decoder = BinauralDecoder::new(&hrirs, self.sample_rate, self.partition_len)?;

        info!(
            "Binaural decoder ready: order {}, {} taps, {} partitions of {} samples",
            order.get(),
            decoder.state.filter_len,
            decoder.state.partitions,
            decoder.state.partition_len,
        );

        Ok(decoder)
    }
}

/// Streaming ambisonic to binaural decoder of a fixed order.
#[derive(Clone)]
pub struct BinauralDecoder {
    /// common state
    state: State,
    /// per ambisonic channel data, ACN order
    channels: Box<[Channel]>,
}

impl BinauralDecoder {
    /// Get default [`decoder builder`](crate::decoder::DecoderBuilder)
    pub fn builder(order: usize) -> DecoderBuilder {
        DecoderBuilder::new(order)
    }

    fn new(hrirs: &HrirSet, sample_rate: f32, partition_len: usize) -> Result<Self, Error> {
        let filter_len = hrirs.filter_len();
        let partitions = (filter_len + partition_len - 1) / partition_len;

        let fft_len = partition_len * 2;
        let spectra_len = fft_len / 2 + 1;
        let zero = Complex::new(0.0, 0.0);

        let mut planner = RealFftPlanner::<f32>::new();
        let rfft = planner.plan_fft_forward(fft_len);
        let ifft = planner.plan_fft_inverse(fft_len);

        let rfft_scratch = rfft.make_scratch_vec();
        let ifft_scratch = ifft.make_scratch_vec();

        let mut state = State {
            rfft,
            ifft,
            fft_len,
            partitions,
            sample_rate,
            filter_len,
            partition_len,
            order: hrirs.order(),
            rfft_scratch,
            ifft_scratch,
            scratch: vec![0.0; fft_len].into_boxed_slice(),
            filt_pad: vec![0.0; fft_len].into_boxed_slice(),
            acc_left: vec![zero; spectra_len].into_boxed_slice(),
            acc_right: vec![zero; spectra_len].into_boxed_slice(),
        };

        let mut channels = Vec::with_capacity(hrirs.num_channels());

        for pair in hrirs.pairs() {
            let mut channel = Channel::new(fft_len, spectra_len, partitions);

            state.filt_split(pair.left, &mut channel.h_left)?;
            state.filt_split(pair.right, &mut channel.h_right)?;

            channels.push(channel);
        }

        Ok(BinauralDecoder {
            state,
            channels: channels.into_boxed_slice(),
        })
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.state.order
    }

    pub fn sample_rate(&self) -> f32 {
        self.state.sample_rate
    }

    /// Taps per impulse response.
    pub fn filter_len(&self) -> usize {
        self.state.filter_len
    }

    pub fn partition_len(&self) -> usize {
        self.state.partition_len
    }

    /// Decode a frame and write the stereo result to `left` and `right`.
    ///
    /// The frame length must be a multiple of the partition length. See
    /// [`DecoderBuilder::with_partition_len()`].
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `frame.order() != self.order()`
    /// - `frame.frames() != left.len()`
    /// - `frame.frames() != right.len()`
    pub fn process<O: AsMut<[f32]>>(
        &mut self,
        frame: &AmbisonicFrame,
        mut left: O,
        mut right: O,
    ) -> Result<(), Error> {
        let (left, right) = (left.as_mut(), right.as_mut());

        assert_eq!(frame.order(), self.state.order);
        assert_eq!(left.len(), frame.frames());
        assert_eq!(right.len(), frame.frames());

        if usize::rem_euclid(frame.frames(), self.state.partition_len) != 0 {
            return Err(Error::InvalidFrameLen(
                frame.frames(),
                self.state.partition_len,
            ));
        }

        let block_len = self.state.partition_len;
        let mut off = 0;

        while off < frame.frames() {
            self.state.conv(
                &mut self.channels,
                frame,
                off,
                &mut left[off..off + block_len],
                &mut right[off..off + block_len],
            )?;

            // update offset
            off += block_len;
        }

        Ok(())
    }

    /// Reset all internals buffers
    pub fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.reset();
        }
    }
}

#[derive(Clone)]
struct State {
    /// Sample rate
    sample_rate: f32,
    /// Ambisonic order
    order: AmbisonicOrder,
    /// Length of the filter
    filter_len: usize,
    /// Length of the processing partition in samples
    partition_len: usize,
    /// Number of the partitions for uniformly partitioned convolution
    partitions: usize,
    /// FFT size
    fft_len: usize,
    /// Real FFT module
    rfft: Arc<dyn RealToComplex<f32>>,
    /// Inverse FFT module
    ifft: Arc<dyn ComplexToReal<f32>>,
    /// RFFT scratch memory
    rfft_scratch: Vec<Complex<f32>>,
    /// IFFT scratch memory
    ifft_scratch: Vec<Complex<f32>>,
    /// mutable internal scratch for fft input
    scratch: Box<[f32]>,
    /// filter padding to block_size * 2
    filt_pad: Box<[f32]>,
    /// left ear accumulator for point wise multiplication
    acc_left: Box<[Complex<f32>]>,
    /// right ear accumulator for point wise multiplication
    acc_right: Box<[Complex<f32>]>,
}

impl State {
    /// Convolve one block of `frame` starting at `off`, summing all channels
    /// into `left` and `right`.
    fn conv(
        &mut self,
        channels: &mut [Channel],
        frame: &AmbisonicFrame,
        off: usize,
        left: &mut [f32],
        right: &mut [f32],
    ) -> Result<(), Error> {
        let spectra_len = self.fft_len / 2 + 1;
        let block_len = self.partition_len;

        self.acc_left.fill(Complex::zero());
        self.acc_right.fill(Complex::zero());

        for (k, channel) in channels.iter_mut().enumerate() {
            let x = &frame.channel(k)[off..off + block_len];

            // shift right part of the buffer to the left
            channel.x_tdl.copy_within(block_len.., 0);
            // store new data in right part
            channel.x_tdl[block_len..].copy_from_slice(x);
            // shift up the fdl content by one slot
            channel.x_fdl.rotate_right(spectra_len);
            // move data to processing scratch
            self.scratch.copy_from_slice(&channel.x_tdl);
            // take real to complex fft of input block and store it in the first fdl slot
            self.rfft.process_with_scratch(
                &mut self.scratch,
                &mut channel.x_fdl[..spectra_len],
                &mut self.rfft_scratch,
            )?;

            // point wise multiply with both ears' filters and accumulate
            for p_off in (0..self.partitions).map(|p| p * spectra_len) {
                let x_fdl = &channel.x_fdl[p_off..p_off + spectra_len];
                let h_left = &channel.h_left[p_off..p_off + spectra_len];
                let h_right = &channel.h_right[p_off..p_off + spectra_len];

                for (i, x) in x_fdl.iter().enumerate() {
                    self.acc_left[i] += x * h_left[i];
                    self.acc_right[i] += x * h_right[i];
                }
            }
        }

        self.inverse(Ear::Left, left)?;
        self.inverse(Ear::Right, right)?;

        Ok(())
    }

    /// Take complex to real transform of one ear's accumulator, discard the
    /// left part and write the right part as the next output block.
    fn inverse(&mut self, ear: Ear, y: &mut [f32]) -> Result<(), Error> {
        let block_len = self.partition_len;
        let scale = self.fft_len as f32;

        let acc = match ear {
            Ear::Left => &mut self.acc_left,
            Ear::Right => &mut self.acc_right,
        };

        self.ifft
            .process_with_scratch(acc, &mut self.scratch, &mut self.ifft_scratch)?;

        for (y, x) in Iterator::zip(y.iter_mut(), self.scratch[block_len..].iter()) {
            *y = x / scale;
        }

        Ok(())
    }

    fn filt_split(&mut self, taps: &[f32], h: &mut [Complex<f32>]) -> Result<(), Error> {
        let spectra_len = self.fft_len / 2 + 1;
        let block_len = self.partition_len;

        assert!(taps.len() <= block_len * h.len() / spectra_len);

        for (partition, h) in Iterator::zip(taps.chunks(block_len), h.chunks_exact_mut(spectra_len)) {
            // the forward transform clobbers its input, pad from scratch every time
            self.filt_pad[..partition.len()].copy_from_slice(partition);
            self.filt_pad[partition.len()..].fill(0.0);

            self.rfft
                .process_with_scratch(&mut self.filt_pad, h, &mut self.rfft_scratch)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{convolve_from_definition, filter_store, hrir_taps, SAMPLE_RATE};

    use assert_approx_eq::assert_approx_eq;
    use filters::MemoryStore;
    use rand::{Rng, SeedableRng};

    fn random_frame(order: AmbisonicOrder, frames: usize, seed: u64) -> AmbisonicFrame {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut frame = AmbisonicFrame::new(order, frames);

        frame
            .as_mut_slice()
            .iter_mut()
            .for_each(|s| *s = rng.gen_range(-1.0..1.0));

        frame
    }

    /// Sum over channels of the direct convolution of each channel with its
    /// impulse response.
    fn decode_from_definition(frame: &AmbisonicFrame, filter_len: usize) -> (Vec<f32>, Vec<f32>) {
        let order = frame.order();
        let mut left = vec![0.0; frame.frames()];
        let mut right = vec![0.0; frame.frames()];

        for (k, x) in frame.channels().enumerate() {
            let yl = convolve_from_definition(x, &hrir_taps(order, Ear::Left, k, filter_len));
            let yr = convolve_from_definition(x, &hrir_taps(order, Ear::Right, k, filter_len));

            for t in 0..frame.frames() {
                left[t] += yl[t];
                right[t] += yr[t];
            }
        }

        (left, right)
    }

    #[must_use]
    struct DecodeTest {
        order: usize,
        filter_len: usize,
        partition_len: usize,
        frame_len: usize,
        frames: usize,
    }

    impl Default for DecodeTest {
        fn default() -> Self {
            Self {
                order: 1,
                filter_len: 256,
                partition_len: 64,
                frame_len: 128,
                frames: 1,
            }
        }
    }

    impl DecodeTest {
        fn order(mut self, order: usize) -> Self {
            self.order = order;
            self
        }

        fn filter_len(mut self, filter_len: usize) -> Self {
            self.filter_len = filter_len;
            self
        }

        fn partition_len(mut self, partition_len: usize) -> Self {
            self.partition_len = partition_len;
            self
        }

        fn frame_len(mut self, frame_len: usize) -> Self {
            self.frame_len = frame_len;
            self
        }

        fn frames(mut self, frames: usize) -> Self {
            self.frames = frames;
            self
        }

        fn run(&self) {
            let order = AmbisonicOrder::new(self.order).unwrap();
            let store = filter_store(order, self.filter_len);

            let mut decoder = BinauralDecoder::builder(self.order)
                .with_partition_len(self.partition_len)
                .build(&store)
                .expect("decoder");

            let total = self.frame_len * self.frames;
            let input = random_frame(order, total, 11);
            let (expected_left, expected_right) = decode_from_definition(&input, self.filter_len);

            let mut left = vec![0.0; total];
            let mut right = vec![0.0; total];

            // feed the same signal frame by frame to cross frame boundaries
            let mut chunk = AmbisonicFrame::new(order, self.frame_len);

            for f in 0..self.frames {
                let span = f * self.frame_len..(f + 1) * self.frame_len;

                for k in 0..order.num_channels() {
                    chunk.channel_mut(k).copy_from_slice(&input.channel(k)[span.clone()]);
                }

                decoder
                    .process(&chunk, &mut left[span.clone()], &mut right[span])
                    .expect("decode frame");
            }

            for (a, b) in std::iter::zip(expected_left.iter(), left.iter()) {
                assert_approx_eq!(a, b, 1e-3);
            }

            for (a, b) in std::iter::zip(expected_right.iter(), right.iter()) {
                assert_approx_eq!(a, b, 1e-3);
            }
        }
    }

    #[test]
    fn decode_default() {
        DecodeTest::default().run();
    }

    #[test]
    fn decode_long_kernel() {
        DecodeTest::default()
            .filter_len(1024)
            .partition_len(64)
            .frame_len(256)
            .run();
    }

    #[test]
    fn decode_short_kernel() {
        DecodeTest::default()
            .filter_len(16)
            .partition_len(4)
            .frame_len(64)
            .frames(4)
            .run();
    }

    #[test]
    fn decode_kernel_and_block_same_length() {
        DecodeTest::default()
            .filter_len(16)
            .partition_len(16)
            .frame_len(32)
            .frames(3)
            .run();
    }

    #[test]
    fn decode_odd_kernel() {
        DecodeTest::default()
            .order(2)
            .filter_len(257)
            .partition_len(16)
            .frame_len(64)
            .frames(6)
            .run();
    }

    #[test]
    fn decode_third_order_across_frames() {
        DecodeTest::default()
            .order(3)
            .filter_len(100)
            .partition_len(32)
            .frame_len(32)
            .frames(8)
            .run();
    }

    #[test]
    fn decode_seventh_order() {
        DecodeTest::default()
            .order(7)
            .filter_len(64)
            .partition_len(32)
            .frame_len(64)
            .frames(2)
            .run();
    }

    #[test]
    fn linearity() {
        let order = AmbisonicOrder::new(2).unwrap();
        let store = filter_store(order, 96);
        let builder = || BinauralDecoder::builder(2).with_partition_len(32).build(&store).unwrap();

        let a = random_frame(order, 128, 1);
        let b = random_frame(order, 128, 2);
        let mut sum = a.clone();
        for (s, b) in Iterator::zip(sum.as_mut_slice().iter_mut(), b.as_slice().iter()) {
            *s += b;
        }

        let decode = |frame: &AmbisonicFrame| {
            let (mut left, mut right) = (vec![0.0; 128], vec![0.0; 128]);
            builder().process(frame, &mut left, &mut right).unwrap();
            (left, right)
        };

        let (al, ar) = decode(&a);
        let (bl, br) = decode(&b);
        let (sl, sr) = decode(&sum);

        for t in 0..128 {
            assert_approx_eq!(sl[t], al[t] + bl[t], 1e-4);
            assert_approx_eq!(sr[t], ar[t] + br[t], 1e-4);
        }
    }

    #[test]
    fn deterministic() {
        let order = AmbisonicOrder::new(3).unwrap();
        let store = filter_store(order, 64);
        let frame = random_frame(order, 64, 5);

        let outputs = (0..2)
            .map(|_| {
                let mut decoder = BinauralDecoder::builder(3).with_partition_len(64).build(&store).unwrap();
                let (mut left, mut right) = (vec![0.0; 64], vec![0.0; 64]);
                decoder.process(&frame, &mut left, &mut right).unwrap();
                (left, right)
            })
            .collect::<Vec<_>>();

        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn reset_clears_history() {
        let order = AmbisonicOrder::new(1).unwrap();
        let store = filter_store(order, 128);
        let mut decoder = BinauralDecoder::builder(1).with_partition_len(32).build(&store).unwrap();

        let noise = random_frame(order, 64, 9);
        let silence = AmbisonicFrame::new(order, 64);
        let (mut left, mut right) = (vec![0.0; 64], vec![0.0; 64]);

        decoder.process(&noise, &mut left, &mut right).unwrap();
        decoder.process(&silence, &mut left, &mut right).unwrap();
        assert!(left.iter().any(|s| s.abs() > 1e-3));

        decoder.reset();
        decoder.process(&silence, &mut left, &mut right).unwrap();
        assert!(left.iter().chain(right.iter()).all(|s| *s == 0.0));
    }

    #[test]
    fn frame_len_must_fill_partitions() {
        let order = AmbisonicOrder::new(1).unwrap();
        let store = filter_store(order, 64);
        let mut decoder = BinauralDecoder::builder(1).with_partition_len(32).build(&store).unwrap();

        let frame = AmbisonicFrame::new(order, 48);
        let (mut left, mut right) = (vec![0.0; 48], vec![0.0; 48]);

        let err = decoder.process(&frame, &mut left, &mut right).unwrap_err();
        assert!(matches!(err, Error::InvalidFrameLen(48, 32)));
    }

    #[test]
    fn configuration_errors() {
        let order = AmbisonicOrder::new(1).unwrap();
        let store = filter_store(order, 64);

        assert!(matches!(
            BinauralDecoder::builder(0).build(&store),
            Err(Error::UnsupportedOrder(0))
        ));
        assert!(matches!(
            BinauralDecoder::builder(8).build(&store),
            Err(Error::UnsupportedOrder(8))
        ));
        assert!(matches!(
            BinauralDecoder::builder(1).with_sample_rate(-1.0).build(&store),
            Err(Error::InvalidSampleRate(_))
        ));
        assert!(matches!(
            BinauralDecoder::builder(1).with_partition_len(0).build(&store),
            Err(Error::InvalidPartitionLen(0))
        ));
        assert!(matches!(
            BinauralDecoder::builder(2).build(&store),
            Err(Error::MissingFilter(_))
        ));
        assert!(matches!(
            BinauralDecoder::builder(1).build(&MemoryStore::new()),
            Err(Error::MissingFilter(_))
        ));
    }

    #[test]
    fn accessors() {
        let order = AmbisonicOrder::new(2).unwrap();
        let store = filter_store(order, 300);
        let decoder = BinauralDecoder::builder(2)
            .with_sample_rate(SAMPLE_RATE as f32)
            .with_partition_len(128)
            .build(&store)
            .unwrap();

        assert_eq!(decoder.order(), order);
        assert_eq!(decoder.filter_len(), 300);
        assert_eq!(decoder.partition_len(), 128);
        assert_eq!(decoder.sample_rate(), 48000.0);
    }

    #[test]
    #[should_panic]
    fn mismatched_order_panics() {
        let store = filter_store(AmbisonicOrder::new(1).unwrap(), 64);
        let mut decoder = BinauralDecoder::builder(1).with_partition_len(32).build(&store).unwrap();

        let frame = AmbisonicFrame::new(AmbisonicOrder::new(2).unwrap(), 32);
        let (mut left, mut right) = (vec![0.0; 32], vec![0.0; 32]);
        let _ = decoder.process(&frame, &mut left, &mut right);
    }
}
